//! Baseline 8x8 block decoding.
//!
//! One block is a differential DC coefficient followed by run-length coded
//! AC coefficients, all in zig-zag order. AC symbols pack a zero-run count
//! in the high nibble and a magnitude category in the low nibble; `(0,0)`
//! ends the block and `(15,0)` skips sixteen zeros.

use crate::bitread::BitReader;
use crate::error::{JpegError, Result};
use crate::huffman::HuffmanLookup;

/// Decode one block into `block` (zig-zag order), updating the component's
/// running DC predictor.
pub fn decode_block(
    bits: &mut BitReader<'_>,
    dc_table: &HuffmanLookup,
    ac_table: &HuffmanLookup,
    predictor: &mut i32,
    block: &mut [i32; 64],
) -> Result<()> {
    block.fill(0);

    let dc_size = dc_table.decode(bits)?;
    if dc_size > 11 {
        return Err(JpegError::Scan(format!("DC category {dc_size} out of range")));
    }
    let diff = bits.receive_extend(dc_size);
    *predictor = predictor.wrapping_add(diff);
    block[0] = *predictor;

    let mut k = 1;
    while k < 64 {
        let symbol = ac_table.decode(bits)?;
        let run = symbol >> 4;
        let size = symbol & 0x0F;
        if size == 0 {
            match run {
                0 => break,       // end of block
                0x0F => k += 16,  // sixteen zeros
                _ => {
                    return Err(JpegError::Scan(format!(
                        "invalid AC run/size symbol {symbol:#04x}"
                    )));
                }
            }
        } else {
            k += run as usize;
            if k >= 64 {
                return Err(JpegError::Scan(
                    "AC coefficient index past end of block".to_string(),
                ));
            }
            block[k] = bits.receive_extend(size);
            k += 1;
        }
    }

    Ok(())
}
