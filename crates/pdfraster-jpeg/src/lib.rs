//! Baseline and progressive JPEG decoding with a row-by-row pull API.
//!
//! This crate turns a complete DCT byte stream (ITU T.81, SOF0 or SOF2,
//! 8-bit precision) into interleaved pixel rows. It exists to decode the
//! `/DCTDecode` image payloads a PDF loader digs out of a document, so it
//! takes resident bytes rather than a reader and lets the caller pull one
//! row at a time.
//!
//! # Usage
//!
//! ```ignore
//! use pdfraster_jpeg::Decoder;
//!
//! let data = std::fs::read("photo.jpg")?;
//! let mut decoder = Decoder::new(&data)?;
//! let stride = decoder.output_stride();
//!
//! let mut row = vec![0u8; stride];
//! while decoder.read_row(&mut row)? {
//!     // row holds width * components interleaved samples
//! }
//! ```
//!
//! For lower-level access the segment parser, Huffman tables, bit reader
//! and IDCT are public as well:
//!
//! ```ignore
//! let header = pdfraster_jpeg::parse(&data)?;
//! println!("{}x{}, progressive: {}", header.width, header.height, header.progressive);
//! ```
//!
//! Colour handling follows JFIF APP0 and Adobe APP14: grayscale copies,
//! YCbCr converts per ITU T.871, RGB-tagged streams pass through, and
//! four-component streams come out as CMYK (inverting YCCK when tagged).

mod bitread;
mod block;
mod decoder;
mod error;
mod huffman;
mod idct;
mod marker;
mod mcu;
mod parser;
mod progressive;
mod quant;
mod restart;

pub use bitread::{BitReader, BitReaderState};
pub use decoder::Decoder;
pub use error::{JpegError, Result};
pub use huffman::{HuffmanLookup, HuffmanTable, TableClass};
pub use idct::{idct_block, CoefOrder};
pub use marker::Marker;
pub use mcu::{
    writer_for, BandContext, BandWrite, CmykWriter, GrayWriter, McuWriter, RgbWriter, Tile,
    YcckWriter,
};
pub use parser::{
    parse, Adobe, ColorModel, Component, Jfif, JpegHeader, ScanComponent, ScanSpec,
};
pub use quant::{QuantTable, NATURAL_TO_ZIGZAG, ZIGZAG_TO_NATURAL};
pub use restart::RestartTracker;
