//! The document façade: lazy object materialisation over the object index.
//!
//! `get_object` dispatches on the index entry: uncompressed objects parse
//! at their recorded offset, compressed ones come out of their object
//! stream container, free entries are absent. Materialised objects are
//! cached behind `Rc`; a reference that is already being materialised
//! resolves to a Null placeholder instead of recursing.
//!
//! The document also owns the external collaborators: the filter service
//! for stream decoding and the decryptor built from `/Encrypt` by the
//! caller's provider. When `/Encrypt` is present and no decryptor could be
//! built, object materialisation is unavailable across the board.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::warn;

use crate::cursor::{ByteRuns, Cursor};
use crate::error::{PdfError, Result};
use crate::lexer::Lexer;
use crate::object::{decode_hex_digits, Dict, IndirectObject, ObjRef, Value};
use crate::objstm::{ObjStmCache, ObjStmPayload};
use crate::pages::{self, PageRecord};
use crate::parser::Parser;
use crate::services::{Decryptor, FilterChain, FilterService, ImageEncoding, LoadOptions};
use crate::xref::{self, EntryKind, XrefTable};

/// A loaded PDF document over a resident byte buffer.
pub struct Document {
    runs: Rc<ByteRuns>,
    filters: Box<dyn FilterService>,
    index: XrefTable,
    trailer: Dict,
    root: Option<ObjRef>,
    decryptor: Option<Rc<dyn Decryptor>>,
    encrypted: bool,
    version: (u8, u8),
    cache: HashMap<u32, Rc<IndirectObject>>,
    in_flight: HashSet<u32>,
    objstm: ObjStmCache,
    pages: Option<Vec<PageRecord>>,
}

impl Document {
    /// Load a document from one contiguous buffer.
    pub fn load(
        data: Vec<u8>,
        filters: Box<dyn FilterService>,
        options: LoadOptions,
    ) -> Result<Document> {
        Self::load_runs(ByteRuns::single(data), filters, options)
    }

    /// Load a document whose bytes arrive as multiple runs.
    pub fn load_runs(
        runs: ByteRuns,
        filters: Box<dyn FilterService>,
        options: LoadOptions,
    ) -> Result<Document> {
        let version = parse_header(&runs)?;
        let load = match xref::load_xref(&runs, filters.as_ref()) {
            Ok(load) => load,
            Err(e) => {
                warn!("cross-reference load failed ({e}); rebuilding by scanning");
                match xref::rebuild_by_scanning(&runs) {
                    Some(rebuilt) => rebuilt,
                    None => return Err(e),
                }
            }
        };

        let mut doc = Document {
            runs: Rc::new(runs),
            filters,
            index: load.table,
            trailer: load.trailer,
            root: load.root,
            decryptor: None,
            // Stays false until the decryptor question is settled so the
            // /Encrypt dictionary itself can be resolved.
            encrypted: false,
            version,
            cache: HashMap::new(),
            in_flight: HashSet::new(),
            objstm: ObjStmCache::new(),
            pages: None,
        };

        if let Some(encrypt) = load.encrypt {
            let encrypt_dict = match encrypt {
                Value::Dict(d) => Some(d),
                Value::Reference(r) => {
                    doc.get_object(r).and_then(|o| o.value.as_dict().cloned())
                }
                _ => None,
            };
            if let (Some(dict), Some(provider)) =
                (encrypt_dict.as_ref(), options.decryptor_provider.as_ref())
            {
                doc.decryptor = provider.build(dict, load.file_id.as_ref()).map(Rc::from);
            }
            if doc.decryptor.is_none() {
                warn!("/Encrypt is present but no decryptor could be built");
            }
            doc.encrypted = true;
            // Objects materialised before the decryptor existed carry
            // undecrypted strings.
            doc.cache.clear();
        }

        Ok(doc)
    }

    /// Header version as `(major, minor)`.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// The newest trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// The `/Root` reference from the newest section carrying one.
    pub fn root_ref(&self) -> Option<ObjRef> {
        self.root
    }

    /// The document catalog.
    pub fn root_object(&mut self) -> Option<Rc<IndirectObject>> {
        let root = self.root?;
        self.get_object(root)
    }

    /// The per-object decryptor, when one was built.
    pub fn decryptor(&self) -> Option<&dyn Decryptor> {
        self.decryptor.as_deref()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// The object index.
    pub fn xref(&self) -> &XrefTable {
        &self.index
    }

    /// Materialise an indirect object. Pure: repeated calls return the
    /// same structural value. Unavailable objects (free entries, header
    /// mismatches, malformed containers) come back as `None`.
    pub fn get_object(&mut self, r: ObjRef) -> Option<Rc<IndirectObject>> {
        if let Some(hit) = self.cache.get(&r.num) {
            if hit.reference.gen == r.gen {
                return Some(Rc::clone(hit));
            }
            return None;
        }
        if self.in_flight.contains(&r.num) {
            // Cycle: hand out a placeholder rather than recursing.
            return Some(Rc::new(IndirectObject {
                reference: r,
                value: Value::Null,
                stream: None,
            }));
        }
        if self.encrypted && self.decryptor.is_none() {
            return None;
        }

        let entry = *self.index.get(r.num)?;
        self.in_flight.insert(r.num);
        let result = match entry.kind {
            EntryKind::Free { .. } => None,
            EntryKind::Uncompressed { offset, gen } => {
                if gen != r.gen {
                    warn!(
                        "object {} generation {} requested but index holds {gen}",
                        r.num, r.gen
                    );
                    None
                } else {
                    self.read_at(offset, r)
                }
            }
            EntryKind::Compressed { container, index } => {
                self.read_compressed(container, index, r)
            }
        };
        self.in_flight.remove(&r.num);

        if let Some(obj) = &result {
            self.cache.insert(r.num, Rc::clone(obj));
        }
        result
    }

    /// Dereference a value once: references resolve (missing objects read
    /// as Null), everything else clones through.
    pub fn resolve(&mut self, v: &Value) -> Value {
        match v {
            Value::Reference(r) => self
                .get_object(*r)
                .map(|o| o.value.clone())
                .unwrap_or(Value::Null),
            other => other.clone(),
        }
    }

    /// Integer value of an object, for `/Length`-style lookups.
    pub fn get_int(&mut self, r: ObjRef) -> Option<i32> {
        self.get_object(r)?.value.as_int()
    }

    /// String payload of a value with hex decoding and decryption applied.
    /// Literal strings were already decrypted at parse time.
    pub fn string_bytes(&mut self, v: &Value, binding: ObjRef) -> Option<Vec<u8>> {
        match v {
            Value::LiteralString(s) => Some(s.clone()),
            Value::HexString(digits) => {
                let mut bytes = decode_hex_digits(digits);
                if self.encrypted {
                    if let Some(dec) = &self.decryptor {
                        bytes = dec.decrypt(&bytes, binding);
                    }
                }
                Some(bytes)
            }
            _ => None,
        }
    }

    /// Decrypt a stream payload and run its filter chain, stopping before
    /// a trailing image codec. Returns the bytes plus the image encoding
    /// when the stream is an image payload.
    pub fn stream_payload(
        &mut self,
        obj: &IndirectObject,
    ) -> Result<(Vec<u8>, Option<ImageEncoding>)> {
        let Some(info) = obj.stream else {
            return Err(PdfError::Structure(format!(
                "object {} carries no stream",
                obj.reference.num
            )));
        };
        let mut raw = self.runs.slice(info.offset, info.len).into_owned();
        if self.encrypted {
            if let Some(dec) = &self.decryptor {
                raw = dec.decrypt(&raw, obj.reference);
            }
        }

        let dict = obj.value.as_dict().cloned().unwrap_or_default();
        let chain = FilterChain::from_stream_dict(&dict, |r| {
            self.get_object(r).map(|o| o.value.clone())
        });
        let (chain, image) = chain.split_image_tail();

        let bytes = if chain.is_empty() {
            raw
        } else {
            self.filters.decode_stream(&raw, &chain)?
        };
        Ok((bytes, image))
    }

    /// Fully decoded bytes of a non-image stream (content streams, object
    /// streams and the like).
    pub fn decode_stream_data(&mut self, obj: &IndirectObject) -> Result<Vec<u8>> {
        let (bytes, image) = self.stream_payload(obj)?;
        if image.is_some() {
            return Err(PdfError::Unsupported(
                "stream is an image payload, not byte data".to_string(),
            ));
        }
        Ok(bytes)
    }

    /// The page list, extracted on first use.
    pub fn pages(&mut self) -> Result<&[PageRecord]> {
        if self.pages.is_none() {
            let pages = pages::collect_pages(self)?;
            self.pages = Some(pages);
        }
        match &self.pages {
            Some(p) => Ok(p),
            None => Ok(&[]),
        }
    }

    fn read_at(&mut self, offset: usize, expected: ObjRef) -> Option<Rc<IndirectObject>> {
        let runs = Rc::clone(&self.runs);
        let decryptor = self.decryptor.clone();

        let mut cur = Cursor::new(&runs);
        cur.set_position(offset);
        let mut parser = Parser::new(Lexer::new(cur));
        if let Some(dec) = decryptor.as_deref() {
            parser = parser.with_decryptor(Some(dec), expected);
        }

        let obj = parser.read_indirect_object(expected, |len_ref| self.get_int(len_ref))?;
        Some(Rc::new(obj))
    }

    fn read_compressed(
        &mut self,
        container: u32,
        index: u32,
        expected: ObjRef,
    ) -> Option<Rc<IndirectObject>> {
        let payload = match self.objstm.get(container) {
            Some(p) => p,
            None => {
                let container_ref = ObjRef::new(container, 0);
                match self.index.get(container) {
                    Some(entry) if matches!(entry.kind, EntryKind::Uncompressed { .. }) => {}
                    _ => {
                        warn!("object stream container {container} is not an uncompressed object");
                        return None;
                    }
                }
                let cobj = self.get_object(container_ref)?;
                let dict = cobj.value.as_dict()?;
                if !dict.has_type(b"ObjStm") {
                    warn!("container {container} is not /Type /ObjStm");
                    return None;
                }
                let decoded = match self.decode_stream_data(&cobj) {
                    Ok(d) => d,
                    Err(e) => {
                        warn!("object stream {container} failed to decode: {e}");
                        return None;
                    }
                };
                let payload = ObjStmPayload::parse(dict, decoded)?;
                self.objstm.insert(container, payload)
            }
        };
        payload.extract(index, expected).map(Rc::new)
    }
}

/// Recognise `%PDF-M.m` in the first 16 bytes. Versions past 2.0 are
/// rejected. A buffer too short to carry the magic at all is a header
/// error; a present-but-garbled header is tolerated as 1.4, since the
/// cross-reference machinery may still recover the document.
fn parse_header(runs: &ByteRuns) -> Result<(u8, u8)> {
    if runs.len() < 5 {
        return Err(PdfError::Header);
    }
    let head = runs.slice(0, 16);
    if !head.starts_with(b"%PDF-") {
        warn!("no %PDF header at offset 0");
        return Ok((1, 4));
    }
    let digits = &head[5..];
    let version = match (digits.first(), digits.get(1), digits.get(2)) {
        (Some(&maj), Some(b'.'), Some(&min))
            if maj.is_ascii_digit() && min.is_ascii_digit() =>
        {
            (maj - b'0', min - b'0')
        }
        _ => {
            warn!("unparseable PDF version in header");
            return Ok((1, 4));
        }
    };
    if version > (2, 0) {
        return Err(PdfError::Version { major: version.0, minor: version.1 });
    }
    Ok(version)
}
