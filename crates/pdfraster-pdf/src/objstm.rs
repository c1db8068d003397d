//! Object streams: several indirect objects packed into one compressed
//! container (PDF 1.5).
//!
//! The container's decoded payload starts with `/N` pairs of
//! `object-number relative-offset` integers; bodies begin at `/First`.
//! Decoding a container is cached per container object; individual objects
//! materialise by index. Strings inside an object stream are not
//! separately encrypted, so extraction runs without a decryptor.

use std::collections::HashMap;
use std::rc::Rc;

use log::warn;

use crate::cursor::{ByteRuns, Cursor};
use crate::lexer::Lexer;
use crate::object::{Dict, IndirectObject, ObjRef};
use crate::parser::Parser;

/// A decoded object-stream container.
#[derive(Debug)]
pub struct ObjStmPayload {
    runs: ByteRuns,
    /// `(object-number, offset-relative-to-first)` pairs in stream order.
    pairs: Vec<(u32, usize)>,
    first: usize,
}

impl ObjStmPayload {
    /// Parse the pair prefix of a decoded container payload.
    /// Malformed containers yield `None`.
    pub fn parse(dict: &Dict, decoded: Vec<u8>) -> Option<ObjStmPayload> {
        let n = dict.get_int(b"N").filter(|&n| n >= 0)?;
        let first = dict.get_int(b"First").filter(|&f| f >= 0)? as usize;
        if first > decoded.len() {
            warn!("object stream /First {first} is past the decoded payload");
            return None;
        }

        let runs = ByteRuns::single(decoded);
        let mut parser = Parser::new(Lexer::new(Cursor::new(&runs))).without_refs();
        let mut pairs = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let num = parser.parse_value().as_int()?;
            let off = parser.parse_value().as_int()?;
            if num < 0 || off < 0 {
                return None;
            }
            pairs.push((num as u32, off as usize));
        }
        if parser.lexer.cur.position() > first {
            warn!("object stream pair table runs past /First");
            return None;
        }
        drop(parser);
        Some(ObjStmPayload { runs, pairs, first })
    }

    /// Number of objects the container declares.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Object number stored at a given index.
    pub fn object_number(&self, index: u32) -> Option<u32> {
        self.pairs.get(index as usize).map(|&(num, _)| num)
    }

    /// Materialise the object at `index` under the caller's reference.
    ///
    /// Compressed objects always have generation 0; the parsed body is a
    /// single value and never a nested stream.
    pub fn extract(&self, index: u32, expected: ObjRef) -> Option<IndirectObject> {
        if expected.gen != 0 {
            return None;
        }
        let &(num, off) = self.pairs.get(index as usize)?;
        if num != expected.num {
            warn!(
                "object stream index {index} holds object {num}, not {}",
                expected.num
            );
            return None;
        }
        let start = self.first.checked_add(off)?;
        if start > self.runs.len() {
            return None;
        }

        let mut cur = Cursor::new(&self.runs);
        cur.set_position(start);
        let mut parser = Parser::new(Lexer::new(cur));
        let value = parser.parse_value();
        Some(IndirectObject { reference: expected, value, stream: None })
    }
}

/// Insert-once cache of decoded containers, keyed by container object
/// number.
#[derive(Default)]
pub struct ObjStmCache {
    containers: HashMap<u32, Rc<ObjStmPayload>>,
}

impl ObjStmCache {
    pub fn new() -> Self {
        ObjStmCache::default()
    }

    pub fn get(&self, container: u32) -> Option<Rc<ObjStmPayload>> {
        self.containers.get(&container).cloned()
    }

    pub fn insert(&mut self, container: u32, payload: ObjStmPayload) -> Rc<ObjStmPayload> {
        let rc = Rc::new(payload);
        self.containers.entry(container).or_insert_with(|| Rc::clone(&rc));
        rc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Value;

    fn container_dict(n: i32, first: i32) -> Dict {
        let mut d = Dict::new();
        d.insert(b"Type".to_vec(), Value::Name(b"ObjStm".to_vec()));
        d.insert(b"N".to_vec(), Value::Integer(n));
        d.insert(b"First".to_vec(), Value::Integer(first));
        d
    }

    /// Prefix `8 0 9 50 10 100`, bodies at /First 16: object 8 is `42`,
    /// object 9 a dictionary at +50, object 10 a string at +100.
    fn payload() -> (Dict, Vec<u8>) {
        // Pair prefix is 16 bytes, so /First is 16 here.
        let mut data = vec![b' '; 16 + 110];
        data[..15].copy_from_slice(b"8 0 9 50 10 100");
        data[16..18].copy_from_slice(b"42");
        data[16 + 50..16 + 60].copy_from_slice(b"<< /A 1 >>");
        data[16 + 100..16 + 103].copy_from_slice(b"(x)");
        (container_dict(3, 16), data)
    }

    #[test]
    fn extracts_objects_by_index() {
        let (dict, data) = payload();
        let p = ObjStmPayload::parse(&dict, data).expect("container");
        assert_eq!(p.len(), 3);
        assert_eq!(p.object_number(1), Some(9));

        let obj = p.extract(0, ObjRef::new(8, 0)).expect("object 8");
        assert_eq!(obj.value, Value::Integer(42));

        let obj = p.extract(1, ObjRef::new(9, 0)).expect("object 9");
        let d = obj.value.as_dict().expect("dict body");
        assert_eq!(d.get_int(b"A"), Some(1));
        assert!(obj.stream.is_none());

        let obj = p.extract(2, ObjRef::new(10, 0)).expect("object 10");
        assert_eq!(obj.value, Value::LiteralString(b"x".to_vec()));
    }

    #[test]
    fn wrong_object_number_is_unavailable() {
        let (dict, data) = payload();
        let p = ObjStmPayload::parse(&dict, data).unwrap();
        assert!(p.extract(1, ObjRef::new(8, 0)).is_none());
    }

    #[test]
    fn nonzero_generation_is_unavailable() {
        let (dict, data) = payload();
        let p = ObjStmPayload::parse(&dict, data).unwrap();
        assert!(p.extract(1, ObjRef::new(9, 1)).is_none());
    }

    #[test]
    fn malformed_containers_are_rejected() {
        // /First past the payload.
        let (_, data) = payload();
        assert!(ObjStmPayload::parse(&container_dict(3, 100_000), data.clone()).is_none());
        // Pair table is not numeric.
        assert!(ObjStmPayload::parse(&container_dict(3, 16), b"x y z".to_vec()).is_none());
        // Missing /N.
        let mut d = Dict::new();
        d.insert(b"First".to_vec(), Value::Integer(4));
        assert!(ObjStmPayload::parse(&d, data).is_none());
    }

    #[test]
    fn cache_inserts_once() {
        let (dict, data) = payload();
        let mut cache = ObjStmCache::new();
        assert!(cache.get(15).is_none());
        let p = ObjStmPayload::parse(&dict, data).unwrap();
        cache.insert(15, p);
        let first = cache.get(15).unwrap();
        assert_eq!(first.len(), 3);
    }
}
