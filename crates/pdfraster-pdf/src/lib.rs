//! PDF object-graph loading and embedded-image decoding.
//!
//! This crate reconstructs the object database of a PDF file from a
//! resident byte buffer: it locates the cross-reference information
//! (classic tables and 1.5+ cross-reference streams), follows the
//! incremental-update chain newest-first, materialises indirect objects
//! lazily (including objects packed into compressed object streams), and
//! surfaces the page tree with inherited attributes. Image XObjects whose
//! filter chain ends in `DCTDecode` decode to pixel rows through the
//! companion `pdfraster-jpeg` crate.
//!
//! Filter decoding (FlateDecode and friends) and encryption primitives are
//! external collaborators: the embedder supplies a [`FilterService`] and,
//! for encrypted files, a [`DecryptorProvider`] via [`LoadOptions`].
//!
//! # Usage
//!
//! ```ignore
//! use pdfraster_pdf::{Document, LoadOptions, NoFilterService};
//!
//! let bytes = std::fs::read("report.pdf")?;
//! let mut doc = Document::load(bytes, Box::new(NoFilterService), LoadOptions::default())?;
//!
//! for page in doc.pages()?.to_vec() {
//!     for image in pdfraster_pdf::page_images(&mut doc, &page) {
//!         let pixels = pdfraster_pdf::decode_jpeg_image(&mut doc, &image)?;
//!         println!("{}: {}x{}", String::from_utf8_lossy(&image.name), pixels.width, pixels.height);
//!     }
//! }
//! ```
//!
//! The loader is tolerant by design: malformed values degrade, damaged
//! cross-reference chains keep whatever was recovered, and only conditions
//! that make the document unusable surface as errors.

mod cursor;
mod document;
mod error;
mod images;
mod lexer;
mod object;
mod objstm;
mod pages;
mod parser;
mod services;
mod xref;

pub use cursor::{ByteRuns, Cursor};
pub use document::Document;
pub use error::{PdfError, Result};
pub use images::{decode_jpeg_image, image_payload, page_images, DecodedImage, ImageXObject};
pub use lexer::{Lexer, Token};
pub use object::{decode_hex_digits, Dict, IndirectObject, ObjRef, StreamInfo, Value};
pub use objstm::{ObjStmCache, ObjStmPayload};
pub use pages::{PageRecord, DEFAULT_MEDIA_BOX};
pub use parser::Parser;
pub use services::{
    Decryptor, DecryptorProvider, FilterChain, FilterService, FilterSpec, ImageEncoding,
    LoadOptions, NoFilterService,
};
pub use xref::{load_xref, rebuild_by_scanning, EntryKind, XrefEntry, XrefLoad, XrefTable};

pub use pdfraster_jpeg as jpeg;
