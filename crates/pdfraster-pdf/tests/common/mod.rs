//! Shared fixture helpers: a zlib-backed filter service and tiny JPEG
//! payloads with analytically known output.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use pdfraster_pdf::{FilterChain, FilterService, PdfError};

/// Compress with zlib, the encoding FlateDecode expects.
pub fn flate(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).expect("in-memory compression");
    enc.finish().expect("in-memory compression")
}

/// A filter service speaking FlateDecode only.
pub struct FlateService;

impl FilterService for FlateService {
    fn decode_stream(&self, raw: &[u8], chain: &FilterChain) -> pdfraster_pdf::Result<Vec<u8>> {
        let mut data = raw.to_vec();
        for f in &chain.filters {
            match f.name.as_slice() {
                b"FlateDecode" | b"Fl" => {
                    let mut out = Vec::new();
                    ZlibDecoder::new(&data[..]).read_to_end(&mut out).map_err(|e| {
                        PdfError::Filter {
                            filter: "FlateDecode".to_string(),
                            message: e.to_string(),
                        }
                    })?;
                    data = out;
                }
                other => {
                    return Err(PdfError::Filter {
                        filter: String::from_utf8_lossy(other).into_owned(),
                        message: "not implemented by the test service".to_string(),
                    })
                }
            }
        }
        Ok(data)
    }
}

/// Common JPEG segments for flat DC-only fixtures: one-code DC and AC
/// tables (category 0 and EOB both encode as a single zero bit).
fn push_flat_tables(v: &mut Vec<u8>) {
    let mut lengths = [0u8; 16];
    lengths[0] = 1;
    v.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x14, 0x00]);
    v.extend_from_slice(&lengths);
    v.push(0x00);
    v.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x14, 0x10]);
    v.extend_from_slice(&lengths);
    v.push(0x00);
}

/// 8x8 single-component baseline JPEG; every pixel decodes to 128.
pub fn flat_gray_jpeg() -> Vec<u8> {
    let mut v = vec![0xFF, 0xD8];
    v.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
    v.extend(std::iter::repeat(1u8).take(64));
    v.extend_from_slice(&[
        0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00,
    ]);
    push_flat_tables(&mut v);
    v.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    // DC category 0 and EOB, one zero bit each, padded with ones.
    v.push(0b0011_1111);
    v.extend_from_slice(&[0xFF, 0xD9]);
    v
}

/// 8x8 YCbCr baseline JPEG with neutral chroma; every RGB pixel decodes
/// to (128, 128, 128).
pub fn flat_ycbcr_jpeg() -> Vec<u8> {
    let mut v = vec![0xFF, 0xD8];
    // JFIF marks this as a plain YCbCr stream.
    v.extend_from_slice(&[
        0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x48,
        0x00, 0x48, 0x00, 0x00,
    ]);
    v.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
    v.extend(std::iter::repeat(1u8).take(64));
    v.extend_from_slice(&[
        0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x08, 0x00, 0x08, 0x03, 0x01, 0x11, 0x00, 0x02,
        0x11, 0x00, 0x03, 0x11, 0x00,
    ]);
    push_flat_tables(&mut v);
    v.extend_from_slice(&[
        0xFF, 0xDA, 0x00, 0x0C, 0x03, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x3F, 0x00,
    ]);
    // Three blocks of (DC cat 0, EOB): six zero bits, padded with ones.
    v.push(0b0000_0011);
    v.extend_from_slice(&[0xFF, 0xD9]);
    v
}
