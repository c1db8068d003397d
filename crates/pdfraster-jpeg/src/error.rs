//! Error types for JPEG decoding.

use std::fmt;
use thiserror::Error;

/// Result type alias for decode operations.
pub type Result<T> = std::result::Result<T, JpegError>;

/// Errors that can occur while parsing or decoding a JPEG stream.
///
/// The decoder fails fast: once a scan cannot be decoded correctly there is
/// no pixel-exact output to salvage, so errors abort the current image.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum JpegError {
    /// The stream ended before a structural element was complete.
    #[error("unexpected end of data while {context}")]
    Truncated { context: &'static str },

    /// Sample precision other than 8 bits.
    #[error("unsupported sample precision {precision} (only 8-bit samples are supported)")]
    UnsupportedPrecision { precision: u8 },

    /// A frame type other than baseline (SOF0) or progressive (SOF2).
    #[error("unsupported frame type SOF{sof}")]
    UnsupportedFrame { sof: u8 },

    /// Component counts other than 1, 3 or 4.
    #[error("unsupported component count {count}")]
    UnsupportedComponents { count: u8 },

    /// A bit pattern that matches no code in the active Huffman table.
    #[error("invalid Huffman code in entropy-coded data")]
    HuffmanMiss,

    /// A scan referenced a Huffman table slot that was never defined.
    #[error("{class} Huffman table {id} referenced but never defined")]
    MissingHuffmanTable { class: &'static str, id: u8 },

    /// A component referenced a quantisation table slot that was never defined.
    #[error("quantisation table {id} referenced but never defined")]
    MissingQuantTable { id: u8 },

    /// A scan that violates frame or entropy structure: bad spectral
    /// selection, coefficients running past their band, components that do
    /// not belong to the frame.
    #[error("{0}")]
    Scan(String),

    /// Any other structural violation, with a human-readable description.
    #[error("{0}")]
    Format(String),
}

impl fmt::Debug for JpegError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Use Display for Debug so unwrap() shows user-friendly messages
        write!(f, "{self}")
    }
}
