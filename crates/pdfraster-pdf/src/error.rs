//! Error types for document loading.

use std::fmt;
use thiserror::Error;

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Errors surfaced while loading a document or one of its streams.
///
/// The loader is deliberately tolerant: most malformed constructs degrade to
/// "object unavailable" (`Option::None`) rather than an error. These
/// variants cover the conditions a caller has to know about.
#[derive(Error)]
pub enum PdfError {
    /// The file does not start with a usable `%PDF-M.m` header.
    #[error("missing or malformed PDF header")]
    Header,

    /// The header declares a version this loader does not accept.
    #[error("PDF version {major}.{minor} is not supported")]
    Version { major: u8, minor: u8 },

    /// Fewer bytes than a structural element requires.
    #[error("unexpected end of input while {context}")]
    Truncated { context: &'static str },

    /// No usable cross-reference information could be recovered.
    #[error("{0}")]
    Structure(String),

    /// A feature outside this loader's scope.
    #[error("unsupported PDF feature: {0}")]
    Unsupported(String),

    /// `/Encrypt` is present but no decryptor could be built for it.
    #[error("document is encrypted and no decryptor is available")]
    Encrypted,

    /// The external filter service failed or met a filter it cannot run.
    #[error("stream filter {filter} failed: {message}")]
    Filter { filter: String, message: String },

    /// An embedded image failed to decode.
    #[error("embedded image failed to decode")]
    Image(#[from] pdfraster_jpeg::JpegError),
}

impl fmt::Debug for PdfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Use Display for Debug so unwrap() shows user-friendly messages
        write!(f, "{self}")
    }
}
