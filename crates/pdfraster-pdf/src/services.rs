//! Interfaces to external collaborators: filter decoding and decryption.
//!
//! Filter decoding is a byte-in/byte-out service the embedder supplies;
//! this crate only parses the `/Filter` and `/DecodeParms` entries into a
//! chain and hands the raw bytes over. Image codecs (`DCTDecode`,
//! `JPXDecode`) are never sent to the service: a chain ending in one marks
//! the stream as an image payload and the preceding filters, if any, are
//! decoded first.
//!
//! Decryption is an opaque per-object transformation built once from the
//! `/Encrypt` dictionary by a caller-supplied provider.

use crate::error::{PdfError, Result};
use crate::object::{Dict, ObjRef, Value};

/// One entry of a stream's filter chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    /// Filter name without the slash, e.g. `FlateDecode`.
    pub name: Vec<u8>,
    /// The matching `/DecodeParms` entry, when present.
    pub parms: Option<Dict>,
}

/// Image codecs recognised at the end of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// `DCTDecode`: baseline or progressive JPEG.
    Dct,
    /// `JPXDecode`: JPEG 2000, decoded elsewhere.
    Jpx,
}

/// The parsed `/Filter` + `/DecodeParms` of a stream, in application order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    pub filters: Vec<FilterSpec>,
}

impl FilterChain {
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Build the chain from a stream dictionary. `resolve` dereferences
    /// indirect `/Filter` or `/DecodeParms` values.
    pub fn from_stream_dict(
        dict: &Dict,
        mut resolve: impl FnMut(ObjRef) -> Option<Value>,
    ) -> FilterChain {
        let deref = |v: &Value, resolve: &mut dyn FnMut(ObjRef) -> Option<Value>| match v {
            Value::Reference(r) => resolve(*r).unwrap_or(Value::Null),
            other => other.clone(),
        };

        let filter = dict
            .get(b"Filter")
            .map(|v| deref(v, &mut resolve))
            .unwrap_or(Value::Null);
        let parms = dict
            .get(b"DecodeParms")
            .or_else(|| dict.get(b"DP"))
            .map(|v| deref(v, &mut resolve))
            .unwrap_or(Value::Null);

        let names: Vec<Vec<u8>> = match &filter {
            Value::Name(n) => vec![n.clone()],
            Value::Array(items) => items
                .iter()
                .map(|v| deref(v, &mut resolve))
                .filter_map(|v| v.as_name().map(<[u8]>::to_vec))
                .collect(),
            _ => Vec::new(),
        };

        let parm_at = |i: usize| -> Option<Dict> {
            match &parms {
                Value::Dict(d) if i == 0 => Some(d.clone()),
                Value::Array(items) => match items.get(i) {
                    Some(Value::Dict(d)) => Some(d.clone()),
                    _ => None,
                },
                _ => None,
            }
        };

        let filters = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| FilterSpec { parms: parm_at(i), name })
            .collect();
        FilterChain { filters }
    }

    /// Split off a trailing image codec. Returns the chain that still goes
    /// to the filter service and the image encoding, if any.
    pub fn split_image_tail(mut self) -> (FilterChain, Option<ImageEncoding>) {
        let encoding = match self.filters.last().map(|f| f.name.as_slice()) {
            Some(b"DCTDecode") | Some(b"DCT") => Some(ImageEncoding::Dct),
            Some(b"JPXDecode") => Some(ImageEncoding::Jpx),
            _ => None,
        };
        if encoding.is_some() {
            self.filters.pop();
        }
        (self, encoding)
    }
}

/// Byte-in/byte-out stream decoding, supplied by the embedder. Must be
/// idempotent: decoding the same bytes twice yields the same output.
pub trait FilterService {
    fn decode_stream(&self, raw: &[u8], chain: &FilterChain) -> Result<Vec<u8>>;
}

/// A service for documents that carry no filtered streams: passes
/// unfiltered bytes through and refuses everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilterService;

impl FilterService for NoFilterService {
    fn decode_stream(&self, raw: &[u8], chain: &FilterChain) -> Result<Vec<u8>> {
        match chain.filters.first() {
            None => Ok(raw.to_vec()),
            Some(f) => Err(PdfError::Filter {
                filter: String::from_utf8_lossy(&f.name).into_owned(),
                message: "no filter service is configured".to_string(),
            }),
        }
    }
}

/// Opaque per-object decryption. Implementations derive the object key
/// from the binding reference; this crate only routes bytes through.
pub trait Decryptor {
    fn decrypt(&self, data: &[u8], binding: ObjRef) -> Vec<u8>;
}

/// Builds a [`Decryptor`] from the document's `/Encrypt` dictionary and
/// file identifier. Returning `None` leaves the document unreadable where
/// encryption applies.
pub trait DecryptorProvider {
    fn build(&self, encrypt: &Dict, file_id: Option<&Value>) -> Option<Box<dyn Decryptor>>;
}

/// Options for [`crate::Document::load`].
#[derive(Default)]
pub struct LoadOptions {
    /// Hook constructing the decryptor when `/Encrypt` is present.
    pub decryptor_provider: Option<Box<dyn DecryptorProvider>>,
}
