//! Fixture builders: assemble JPEG streams segment by segment and encode
//! entropy-coded data bit by bit, with byte stuffing.

use std::collections::HashMap;

/// A Huffman table definition shared between the DHT segment writer and the
/// entropy encoder.
pub struct TableSpec {
    /// 0 = DC, 1 = AC.
    pub class: u8,
    pub id: u8,
    pub lengths: [u8; 16],
    pub symbols: Vec<u8>,
}

impl TableSpec {
    /// The standard luminance DC table: categories 0..=11.
    pub fn standard_dc() -> Self {
        TableSpec {
            class: 0,
            id: 0,
            lengths: [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0],
            symbols: (0..=11).collect(),
        }
    }

    /// A small AC table carrying the handful of symbols fixtures use:
    /// EOB, (0,1), (0,2), (1,1) and ZRL.
    pub fn minimal_ac() -> Self {
        TableSpec {
            class: 1,
            id: 0,
            lengths: [0, 2, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            symbols: vec![0x00, 0x01, 0x02, 0x11, 0xF0],
        }
    }

    /// Canonical `symbol -> (code, length)` mapping (T.81 C.1/C.2).
    pub fn codes(&self) -> HashMap<u8, (u16, u8)> {
        let mut map = HashMap::new();
        let mut code: u32 = 0;
        let mut idx = 0;
        for (len_minus_1, &count) in self.lengths.iter().enumerate() {
            for _ in 0..count {
                map.insert(self.symbols[idx], (code as u16, (len_minus_1 + 1) as u8));
                code += 1;
                idx += 1;
            }
            code <<= 1;
        }
        map
    }
}

/// Category and magnitude bits of a coefficient, the encoder-side inverse
/// of receive/extend.
pub fn coefficient_bits(value: i32) -> (u8, u16) {
    if value == 0 {
        return (0, 0);
    }
    let magnitude = value.unsigned_abs() as u16;
    let size = (16 - magnitude.leading_zeros()) as u8;
    let bits = if value < 0 { ((1u16 << size) - 1) - magnitude } else { magnitude };
    (size, bits)
}

/// MSB-first bit packer with JPEG byte stuffing and one-fill padding.
pub struct EntropyEncoder {
    out: Vec<u8>,
    bits: u32,
    count: u8,
}

impl EntropyEncoder {
    pub fn new() -> Self {
        EntropyEncoder { out: Vec::new(), bits: 0, count: 0 }
    }

    pub fn put_bits(&mut self, value: u32, n: u8) {
        debug_assert!(n <= 16);
        self.bits = (self.bits << n) | (value & ((1u32 << n) - 1));
        self.count += n;
        while self.count >= 8 {
            self.count -= 8;
            let byte = (self.bits >> self.count) as u8;
            self.out.push(byte);
            if byte == 0xFF {
                self.out.push(0x00);
            }
        }
        self.bits &= (1u32 << self.count) - 1;
    }

    pub fn put_symbol(&mut self, table: &TableSpec, symbol: u8) {
        let (code, len) = table.codes()[&symbol];
        self.put_bits(u32::from(code), len);
    }

    /// Pad to a byte boundary with ones and emit RSTn unstuffed.
    pub fn put_restart(&mut self, n: u8) {
        self.pad();
        self.out.push(0xFF);
        self.out.push(0xD0 + n);
    }

    fn pad(&mut self) {
        if self.count > 0 {
            let fill = 8 - self.count;
            self.put_bits((1u32 << fill) - 1, fill);
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.pad();
        self.out
    }
}

/// Encode one block that carries only a DC difference: category, magnitude
/// bits, then end-of-block.
pub fn dc_only_block(enc: &mut EntropyEncoder, dc: &TableSpec, ac: &TableSpec, diff: i32) {
    let (size, bits) = coefficient_bits(diff);
    enc.put_symbol(dc, size);
    if size > 0 {
        enc.put_bits(u32::from(bits), size);
    }
    enc.put_symbol(ac, 0x00);
}

/// Assembles marker segments around entropy-coded data.
pub struct JpegBuilder {
    bytes: Vec<u8>,
}

impl JpegBuilder {
    pub fn new() -> Self {
        JpegBuilder { bytes: vec![0xFF, 0xD8] }
    }

    fn segment(&mut self, marker: u8, payload: &[u8]) {
        self.bytes.push(0xFF);
        self.bytes.push(marker);
        let len = (payload.len() + 2) as u16;
        self.bytes.extend_from_slice(&len.to_be_bytes());
        self.bytes.extend_from_slice(payload);
    }

    pub fn jfif_app0(&mut self) -> &mut Self {
        let mut p = Vec::new();
        p.extend_from_slice(b"JFIF\0");
        p.extend_from_slice(&[1, 1, 0, 0, 72, 0, 72, 0, 0]);
        self.segment(0xE0, &p);
        self
    }

    pub fn adobe_app14(&mut self, transform: u8) -> &mut Self {
        let mut p = Vec::new();
        p.extend_from_slice(b"Adobe");
        p.extend_from_slice(&[0x00, 0x64, 0x00, 0x00, 0x00, 0x00, transform]);
        self.segment(0xEE, &p);
        self
    }

    pub fn dqt(&mut self, id: u8, values: &[u8; 64]) -> &mut Self {
        let mut p = vec![id];
        p.extend_from_slice(values);
        self.segment(0xDB, &p);
        self
    }

    pub fn dht(&mut self, table: &TableSpec) -> &mut Self {
        let mut p = vec![(table.class << 4) | table.id];
        p.extend_from_slice(&table.lengths);
        p.extend_from_slice(&table.symbols);
        self.segment(0xC4, &p);
        self
    }

    /// Components are `(id, h, v, quant_id)`.
    pub fn sof(
        &mut self,
        progressive: bool,
        width: u16,
        height: u16,
        comps: &[(u8, u8, u8, u8)],
    ) -> &mut Self {
        let mut p = vec![8];
        p.extend_from_slice(&height.to_be_bytes());
        p.extend_from_slice(&width.to_be_bytes());
        p.push(comps.len() as u8);
        for &(id, h, v, tq) in comps {
            p.push(id);
            p.push((h << 4) | v);
            p.push(tq);
        }
        self.segment(if progressive { 0xC2 } else { 0xC0 }, &p);
        self
    }

    pub fn dri(&mut self, interval: u16) -> &mut Self {
        self.segment(0xDD, &interval.to_be_bytes());
        self
    }

    /// Components are `(id, dc_table, ac_table)`; the entropy bytes follow
    /// the segment immediately.
    pub fn sos(
        &mut self,
        comps: &[(u8, u8, u8)],
        spectral: (u8, u8),
        approx: (u8, u8),
        entropy: &[u8],
    ) -> &mut Self {
        let mut p = vec![comps.len() as u8];
        for &(id, td, ta) in comps {
            p.push(id);
            p.push((td << 4) | ta);
        }
        p.push(spectral.0);
        p.push(spectral.1);
        p.push((approx.0 << 4) | approx.1);
        self.segment(0xDA, &p);
        self.bytes.extend_from_slice(entropy);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.bytes.extend_from_slice(&[0xFF, 0xD9]);
        self.bytes
    }
}
