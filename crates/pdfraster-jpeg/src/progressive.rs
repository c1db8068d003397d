//! Progressive scan decoding: spectral selection and successive
//! approximation.
//!
//! Coefficients live in natural order across the whole image for the
//! duration of the decode; spectral indices in the stream are zig-zag and
//! are translated per symbol. Four pass kinds exist:
//!
//! - DC first pass: category + signed diff, scaled up by `Al`
//! - DC refinement: one bit ORed into the `Al` bit plane
//! - AC first pass: run/size symbols over the `[Ss, Se]` band, with EOB
//!   runs spanning whole blocks
//! - AC refinement: one correction bit per existing nonzero coefficient,
//!   new coefficients placed relative to zero-history positions only
//!
//! DC predictors reset at every scan start; the EOB run never crosses a
//! scan boundary. Both live in the driver's per-scan state.

use crate::bitread::BitReader;
use crate::error::{JpegError, Result};
use crate::huffman::HuffmanLookup;
use crate::quant::ZIGZAG_TO_NATURAL;

/// DC first pass (`Ss=Se=0, Ah=0`): differential category decode shifted
/// into position `Al`.
pub fn dc_first(
    bits: &mut BitReader<'_>,
    table: &HuffmanLookup,
    predictor: &mut i32,
    al: u8,
    block: &mut [i32; 64],
) -> Result<()> {
    let size = table.decode(bits)?;
    if size > 11 {
        return Err(JpegError::Scan(format!("DC category {size} out of range")));
    }
    let diff = bits.receive_extend(size);
    *predictor = predictor.wrapping_add(diff);
    block[0] = *predictor << al;
    Ok(())
}

/// DC refinement (`Ah != 0`): append the next lower magnitude bit.
pub fn dc_refine(bits: &mut BitReader<'_>, al: u8, block: &mut [i32; 64]) -> Result<()> {
    if bits.read_bit() == 1 {
        block[0] |= 1 << al;
    }
    Ok(())
}

/// AC first pass over the band `[ss, se]`.
///
/// `eob_run` counts whole blocks that are already finished; when positive
/// the block is consumed without touching the stream.
pub fn ac_first(
    bits: &mut BitReader<'_>,
    table: &HuffmanLookup,
    ss: u8,
    se: u8,
    al: u8,
    eob_run: &mut u32,
    block: &mut [i32; 64],
) -> Result<()> {
    if *eob_run > 0 {
        *eob_run -= 1;
        return Ok(());
    }

    let mut k = ss as usize;
    while k <= se as usize {
        let symbol = table.decode(bits)?;
        let run = (symbol >> 4) as usize;
        let size = symbol & 0x0F;
        if size == 0 {
            if run != 15 {
                // EOBn: this block plus (eob_run) more are finished.
                *eob_run = (1 << run) - 1;
                if run > 0 {
                    *eob_run += bits.read_bits(run as u8);
                }
                break;
            }
            k += 16;
        } else {
            k += run;
            if k > se as usize {
                return Err(JpegError::Scan(
                    "AC coefficient lands past the spectral band".to_string(),
                ));
            }
            block[ZIGZAG_TO_NATURAL[k]] = bits.receive_extend(size) << al;
            k += 1;
        }
    }
    Ok(())
}

/// AC refinement pass over the band `[ss, se]`.
///
/// Existing nonzero coefficients each consume one correction bit wherever
/// the band is traversed; zero-history positions count against the run of a
/// new coefficient. EOB runs refine the remainder of the block as well.
pub fn ac_refine(
    bits: &mut BitReader<'_>,
    table: &HuffmanLookup,
    ss: u8,
    se: u8,
    al: u8,
    eob_run: &mut u32,
    block: &mut [i32; 64],
) -> Result<()> {
    let p1 = 1i32 << al;
    let mut k = ss as usize;

    if *eob_run == 0 {
        while k <= se as usize {
            let symbol = table.decode(bits)?;
            let mut run = (symbol >> 4) as usize;
            let size = symbol & 0x0F;
            let mut coeff = 0i32;
            if size == 0 {
                if run != 15 {
                    *eob_run = 1 << run;
                    if run > 0 {
                        *eob_run += bits.read_bits(run as u8);
                    }
                    break;
                }
                // run == 15 skips sixteen zero-history positions below.
            } else {
                if size != 1 {
                    return Err(JpegError::Scan(format!(
                        "refinement symbol {symbol:#04x} carries more than one new bit"
                    )));
                }
                coeff = if bits.read_bit() == 1 { p1 } else { -p1 };
            }

            while k <= se as usize {
                let cur = &mut block[ZIGZAG_TO_NATURAL[k]];
                if *cur != 0 {
                    if bits.read_bit() == 1 && (*cur & p1) == 0 {
                        *cur += if *cur >= 0 { p1 } else { -p1 };
                    }
                } else {
                    if run == 0 {
                        if coeff != 0 {
                            *cur = coeff;
                        }
                        k += 1;
                        break;
                    }
                    run -= 1;
                }
                k += 1;
            }
        }
    }

    if *eob_run > 0 {
        while k <= se as usize {
            let cur = &mut block[ZIGZAG_TO_NATURAL[k]];
            if *cur != 0 && bits.read_bit() == 1 && (*cur & p1) == 0 {
                *cur += if *cur >= 0 { p1 } else { -p1 };
            }
            k += 1;
        }
        *eob_run -= 1;
    }
    Ok(())
}
