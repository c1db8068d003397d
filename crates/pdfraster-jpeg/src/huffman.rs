//! Canonical Huffman tables for entropy decoding.
//!
//! A DHT segment carries sixteen per-length code counts followed by the
//! symbol values. Codes are derived per T.81 Figures C.1 and C.2 and
//! compiled into a two-level structure: an 8-bit lookup table for the short
//! codes that dominate real streams, and an ordered scan for the rest.

use crate::bitread::BitReader;
use crate::error::{JpegError, Result};

/// Table class as declared in DHT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableClass {
    /// DC difference categories.
    Dc,
    /// AC run/size symbols.
    Ac,
}

impl TableClass {
    pub fn label(self) -> &'static str {
        match self {
            TableClass::Dc => "DC",
            TableClass::Ac => "AC",
        }
    }
}

/// A Huffman table as parsed from a DHT segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    /// DC or AC.
    pub class: TableClass,
    /// Table slot 0-3.
    pub id: u8,
    /// Number of codes of each length 1-16.
    pub code_lengths: [u8; 16],
    /// Symbol values in code order.
    pub symbols: Vec<u8>,
}

const LUT_BITS: u8 = 8;
const LUT_SIZE: usize = 1 << LUT_BITS;

/// Compiled Huffman table for fast decoding.
#[derive(Debug, Clone)]
pub struct HuffmanLookup {
    /// `(symbol, code_length)` for codes of 8 bits or fewer; `(0, 0)` marks
    /// entries covered only by longer codes.
    lut: Box<[(u8, u8); LUT_SIZE]>,
    /// Canonical codes, ascending.
    codes: Vec<u16>,
    /// Code lengths matching `codes`.
    sizes: Vec<u8>,
    /// Symbols matching `codes`.
    symbols: Vec<u8>,
}

impl HuffmanLookup {
    /// Compile the lookup structure from a parsed table.
    pub fn build(table: &HuffmanTable) -> Result<Self> {
        let (sizes, codes) = derive_codes(&table.code_lengths)?;
        if table.symbols.len() < sizes.len() {
            return Err(JpegError::Format(format!(
                "Huffman table declares {} codes but carries {} symbols",
                sizes.len(),
                table.symbols.len()
            )));
        }

        let mut lut = Box::new([(0u8, 0u8); LUT_SIZE]);
        for (idx, (&code, &len)) in codes.iter().zip(sizes.iter()).enumerate() {
            if len <= LUT_BITS {
                let shift = LUT_BITS - len;
                let base = (code as usize) << shift;
                for k in 0..(1usize << shift) {
                    lut[base + k] = (table.symbols[idx], len);
                }
            }
        }

        let symbols = table.symbols[..sizes.len()].to_vec();
        Ok(HuffmanLookup { lut, codes, sizes, symbols })
    }

    /// Decode one symbol from the bit stream.
    ///
    /// A bit pattern matching no code fails the current block with
    /// [`JpegError::HuffmanMiss`]; the driver decides whether the image dies.
    pub fn decode(&self, bits: &mut BitReader<'_>) -> Result<u8> {
        let peek = bits.peek_bits(LUT_BITS);
        let (symbol, len) = self.lut[peek as usize];
        if len > 0 {
            bits.consume_bits(len);
            return Ok(symbol);
        }

        // Longer codes, in ascending canonical order
        for (idx, (&code, &size)) in self.codes.iter().zip(self.sizes.iter()).enumerate() {
            if size > LUT_BITS && bits.peek_bits(size) as u16 == code {
                bits.consume_bits(size);
                return Ok(self.symbols[idx]);
            }
        }

        Err(JpegError::HuffmanMiss)
    }
}

/// Derive canonical codes from per-length counts (T.81 C.1/C.2).
fn derive_codes(code_lengths: &[u8; 16]) -> Result<(Vec<u8>, Vec<u16>)> {
    let total: usize = code_lengths.iter().map(|&n| n as usize).sum();
    if total > 256 {
        return Err(JpegError::Format(format!(
            "Huffman table declares {total} codes, more than the 256 allowed"
        )));
    }

    let mut sizes = Vec::with_capacity(total);
    for (len, &count) in code_lengths.iter().enumerate() {
        for _ in 0..count {
            sizes.push((len + 1) as u8);
        }
    }

    let mut codes = Vec::with_capacity(total);
    let mut code: u32 = 0;
    let mut si = sizes.first().copied().unwrap_or(0);
    for &size in &sizes {
        while si < size {
            code <<= 1;
            si += 1;
        }
        if code >= (1u32 << size) {
            return Err(JpegError::Format(
                "Huffman code space overflow in table definition".to_string(),
            ));
        }
        codes.push(code as u16);
        code += 1;
    }

    Ok((sizes, codes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_dc_luma() -> HuffmanTable {
        HuffmanTable {
            class: TableClass::Dc,
            id: 0,
            code_lengths: [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0],
            symbols: vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    #[test]
    fn derives_canonical_codes() {
        let lengths = [0u8, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let (sizes, codes) = derive_codes(&lengths).unwrap();
        assert_eq!(sizes, vec![2, 3]);
        assert_eq!(codes, vec![0b00, 0b010]);
    }

    #[test]
    fn standard_dc_table_has_twelve_codes() {
        let (sizes, codes) = derive_codes(&standard_dc_luma().code_lengths).unwrap();
        assert_eq!(sizes.len(), 12);
        assert_eq!(codes.len(), 12);
        assert_eq!(sizes[0], 2);
    }

    #[test]
    fn rejects_overfull_code_space() {
        // Three codes of length 1 cannot exist.
        let lengths = [3u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(derive_codes(&lengths).is_err());
    }

    #[test]
    fn decodes_short_codes_through_lut() {
        let lookup = HuffmanLookup::build(&standard_dc_luma()).unwrap();
        // Symbol 0 is code 00, symbol 1 is code 010.
        let data = [0b0001_0000];
        let mut bits = BitReader::new(&data);
        assert_eq!(lookup.decode(&mut bits).unwrap(), 0);
        assert_eq!(lookup.decode(&mut bits).unwrap(), 1);
    }

    #[test]
    fn decodes_long_codes_past_the_lut() {
        // One code of every length 9 and 10.
        let table = HuffmanTable {
            class: TableClass::Ac,
            id: 0,
            code_lengths: [0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0],
            symbols: vec![0xAB, 0xCD],
        };
        let lookup = HuffmanLookup::build(&table).unwrap();

        // Codes: 9 bits 000000000, 10 bits 0000000010; the trailing five
        // bits are padding ones.
        let data = [0b0000_0000, 0b0000_0000, 0b0101_1111];
        let mut bits = BitReader::new(&data);
        assert_eq!(lookup.decode(&mut bits).unwrap(), 0xAB);
        assert_eq!(lookup.decode(&mut bits).unwrap(), 0xCD);
    }

    #[test]
    fn unmatched_pattern_is_a_miss() {
        let table = HuffmanTable {
            class: TableClass::Dc,
            id: 0,
            code_lengths: [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            symbols: vec![7],
        };
        let lookup = HuffmanLookup::build(&table).unwrap();
        // The single code is 0; an all-ones stream matches nothing.
        let data = [0xFF, 0x00];
        let mut bits = BitReader::new(&data);
        assert_eq!(lookup.decode(&mut bits), Err(JpegError::HuffmanMiss));
    }
}
