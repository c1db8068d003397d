//! Cross-reference loading: classic tables, cross-reference streams, and
//! the /Prev chain across incremental updates.
//!
//! Discovery starts from the `startxref` pointer at the end of the file.
//! Sections are walked newest first and an object number is only populated
//! once, so the newest revision always wins. Classic trailers may point at
//! a companion cross-reference stream through `/XRefStm` (hybrid-reference
//! files); that stream is merged with the same first-seen-wins rule.
//!
//! The loader is maximally tolerant: a parse failure mid-chain degrades to
//! whatever index has been built, with a warning. Only a completely empty
//! index is an error.

use std::collections::{HashMap, HashSet};

use byteorder::{BigEndian, ByteOrder};
use log::warn;

use crate::cursor::{ByteRuns, Cursor};
use crate::error::{PdfError, Result};
use crate::lexer::{is_delimiter, is_whitespace, Lexer};
use crate::object::{Dict, ObjRef, Value};
use crate::parser::Parser;
use crate::services::{FilterChain, FilterService};

/// Where an object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// On the free list.
    Free { next: u32, gen: u16 },
    /// At a byte offset in the file.
    Uncompressed { offset: usize, gen: u16 },
    /// Packed into an object stream.
    Compressed { container: u32, index: u32 },
}

/// One index entry, with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrefEntry {
    pub kind: EntryKind,
    /// True when the entry came from a cross-reference stream.
    pub from_stream: bool,
}

/// The object index: object number to location.
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    entries: HashMap<u32, XrefEntry>,
}

impl XrefTable {
    pub fn new() -> Self {
        XrefTable::default()
    }

    pub fn get(&self, num: u32) -> Option<&XrefEntry> {
        self.entries.get(&num)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XrefEntry)> {
        self.entries.iter()
    }

    /// Populate an entry unless a newer section already claimed it.
    fn insert_if_absent(&mut self, num: u32, entry: XrefEntry) {
        self.entries.entry(num).or_insert(entry);
    }
}

/// Everything the xref walk recovers.
#[derive(Debug, Clone, Default)]
pub struct XrefLoad {
    pub table: XrefTable,
    /// The newest trailer dictionary.
    pub trailer: Dict,
    /// `/Root` from the newest section carrying one.
    pub root: Option<ObjRef>,
    /// `/Encrypt` from the newest section carrying one (dict or reference).
    pub encrypt: Option<Value>,
    /// `/ID` from the newest section carrying one.
    pub file_id: Option<Value>,
}

struct Section {
    trailer: Dict,
    prev: Option<usize>,
    xref_stm: Option<usize>,
}

/// Walk the cross-reference chain and build the object index.
pub fn load_xref(runs: &ByteRuns, filters: &dyn FilterService) -> Result<XrefLoad> {
    let mut load = XrefLoad::default();

    let Some(start) = find_startxref(runs) else {
        return Err(PdfError::Structure("no startxref pointer found".to_string()));
    };

    let mut visited: HashSet<usize> = HashSet::new();
    let mut next = Some(start);
    let mut have_trailer = false;
    let mut first_error: Option<PdfError> = None;

    while let Some(offset) = next {
        if !visited.insert(offset) {
            warn!("cross-reference chain revisits offset {offset}; stopping");
            break;
        }
        let section = match parse_section(runs, filters, offset, &mut load.table) {
            Ok(s) => s,
            Err(e) => {
                warn!("cross-reference section at {offset} failed ({e}); keeping partial index");
                first_error.get_or_insert(e);
                break;
            }
        };

        if !have_trailer {
            load.trailer = section.trailer.clone();
            have_trailer = true;
        }
        apply_trailer(&section.trailer, &mut load);

        if let Some(stm) = section.xref_stm {
            if visited.insert(stm) {
                match parse_section(runs, filters, stm, &mut load.table) {
                    Ok(hybrid) => apply_trailer(&hybrid.trailer, &mut load),
                    Err(e) => warn!("hybrid cross-reference stream at {stm} failed ({e})"),
                }
            }
        }

        next = section.prev;
    }

    if load.table.is_empty() {
        // Nothing was recovered; the first failure is the most telling.
        return Err(first_error.unwrap_or_else(|| {
            PdfError::Structure("no usable cross-reference information recovered".to_string())
        }));
    }
    Ok(load)
}

/// A parse failure at the current cursor: a clean truncation when the
/// buffer simply ran out, structural otherwise.
fn structural_or_truncated(
    parser: &Parser<'_, '_>,
    context: &'static str,
    message: String,
) -> PdfError {
    if parser.lexer.cur.at_end() {
        PdfError::Truncated { context }
    } else {
        PdfError::Structure(message)
    }
}

fn apply_trailer(trailer: &Dict, load: &mut XrefLoad) {
    if load.root.is_none() {
        load.root = trailer.get_reference(b"Root");
    }
    if load.encrypt.is_none() {
        load.encrypt = trailer.get(b"Encrypt").cloned();
    }
    if load.file_id.is_none() {
        load.file_id = trailer.get(b"ID").cloned();
    }
}

/// Locate the `startxref` closest to the end of the file and read the
/// offset that follows it.
fn find_startxref(runs: &ByteRuns) -> Option<usize> {
    const TAIL: usize = 2048;
    let len = runs.len();
    let tail_len = len.min(TAIL);
    let tail_start = len - tail_len;
    let tail = runs.slice(tail_start, tail_len);

    let needle = b"startxref";
    let hit = tail
        .windows(needle.len())
        .rposition(|w| w == needle)?;

    let mut cur = Cursor::new(runs);
    cur.set_position(tail_start + hit + needle.len());
    let mut lexer = Lexer::new(cur);
    lexer.skip_whitespace();
    let mut value: usize = 0;
    let mut digits = 0;
    while lexer.cur.peek(0).is_ascii_digit() {
        value = value.saturating_mul(10).saturating_add((lexer.cur.read_byte() - b'0') as usize);
        digits += 1;
    }
    (digits > 0 && value < runs.len()).then_some(value)
}

fn parse_section(
    runs: &ByteRuns,
    filters: &dyn FilterService,
    offset: usize,
    table: &mut XrefTable,
) -> Result<Section> {
    if offset >= runs.len() {
        return Err(PdfError::Truncated { context: "seeking a cross-reference section" });
    }
    let mut cur = Cursor::new(runs);
    cur.set_position(offset);
    let mut lexer = Lexer::new(cur);

    if lexer.try_keyword(b"xref") {
        parse_classic_table(runs, lexer, table)
    } else {
        parse_xref_stream(runs, filters, offset, table)
    }
}

/// Classic `xref` table: subsections of `first count` followed by
/// whitespace-separated `offset generation status` triples.
fn parse_classic_table(
    runs: &ByteRuns,
    lexer: Lexer<'_>,
    table: &mut XrefTable,
) -> Result<Section> {
    let mut parser = Parser::new(lexer).without_refs();

    loop {
        if parser.lexer.try_keyword(b"trailer") {
            break;
        }
        let first = parser.parse_value().as_int().ok_or_else(|| {
            structural_or_truncated(
                &parser,
                "reading a cross-reference subsection header",
                "expected a subsection start".to_string(),
            )
        })?;
        let count = parser.parse_value().as_int().ok_or_else(|| {
            structural_or_truncated(
                &parser,
                "reading a cross-reference subsection header",
                "expected a subsection count".to_string(),
            )
        })?;
        if first < 0 || count < 0 {
            return Err(PdfError::Structure("negative subsection bounds".to_string()));
        }

        for i in 0..count as u32 {
            let offset = parser.parse_value();
            let gen = parser.parse_value();
            let status = parser.parse_value();
            let (Some(offset), Some(gen)) = (offset.as_int(), gen.as_int()) else {
                return Err(structural_or_truncated(
                    &parser,
                    "reading cross-reference table entries",
                    "malformed table entry".to_string(),
                ));
            };
            let num = first as u32 + i;
            let gen = gen.clamp(0, i32::from(u16::MAX)) as u16;
            let kind = if status.is_operator(b"n") {
                if offset < 0 || offset as usize >= runs.len() {
                    warn!("object {num} offset {offset} is outside the file; skipping");
                    continue;
                }
                EntryKind::Uncompressed { offset: offset as usize, gen }
            } else if status.is_operator(b"f") {
                EntryKind::Free { next: offset.max(0) as u32, gen }
            } else {
                return Err(PdfError::Structure(format!(
                    "table entry status is {status:?}, expected n or f"
                )));
            };
            table.insert_if_absent(num, XrefEntry { kind, from_stream: false });
        }
    }

    let trailer = match parser.parse_value() {
        Value::Dict(d) => d,
        other => {
            return Err(structural_or_truncated(
                &parser,
                "reading the trailer dictionary",
                format!("trailer is {other:?}, expected a dictionary"),
            ))
        }
    };

    let prev = positive_offset(trailer.get_int(b"Prev"));
    let xref_stm = positive_offset(trailer.get_int(b"XRefStm"));
    Ok(Section { trailer, prev, xref_stm })
}

fn positive_offset(v: Option<i32>) -> Option<usize> {
    v.filter(|&n| n > 0).map(|n| n as usize)
}

/// Last-resort index reconstruction for files whose cross-reference chain
/// is unusable: scan the whole buffer for `N G obj` headers and record the
/// newest occurrence of each object (incremental updates append, so later
/// wins). The trailer is recovered from the last `trailer` keyword; when
/// none survives, the catalog is found by materialising candidates.
pub fn rebuild_by_scanning(runs: &ByteRuns) -> Option<XrefLoad> {
    let data = runs.slice(0, runs.len());
    let mut load = XrefLoad::default();

    let mut i = 0;
    while i + 3 <= data.len() {
        let Some(hit) = data[i..].windows(3).position(|w| w == b"obj") else { break };
        let at = i + hit;
        i = at + 3;
        if let Some((offset, num, gen)) = header_before(&data, at) {
            // Later occurrences overwrite: the newest revision wins.
            load.table.entries.insert(
                num,
                XrefEntry { kind: EntryKind::Uncompressed { offset, gen }, from_stream: false },
            );
        }
    }
    if load.table.is_empty() {
        return None;
    }

    if let Some(hit) = data.windows(7).rposition(|w| w == b"trailer") {
        let mut cur = Cursor::new(runs);
        cur.set_position(hit + 7);
        let mut parser = Parser::new(Lexer::new(cur));
        if let Value::Dict(trailer) = parser.parse_value() {
            apply_trailer(&trailer, &mut load);
            load.trailer = trailer;
        }
    }

    if load.root.is_none() {
        load.root = find_catalog(runs, &load.table);
    }
    Some(load)
}

/// Validate and read the `N G ` prefix ending at the `obj` keyword.
/// Returns the header's byte offset and the two numbers.
fn header_before(data: &[u8], obj_at: usize) -> Option<(usize, u32, u16)> {
    // The keyword itself must be terminated.
    match data.get(obj_at + 3) {
        Some(&b) if !is_whitespace(b) && !is_delimiter(b) => return None,
        _ => {}
    }
    let gen_end = back_over_whitespace(data, obj_at)?;
    let (gen_start, gen) = back_over_digits(data, gen_end)?;
    let num_end = back_over_whitespace(data, gen_start)?;
    let (num_start, num) = back_over_digits(data, num_end)?;
    // The object number must start a token.
    if num_start > 0 && !is_whitespace(data[num_start - 1]) && !is_delimiter(data[num_start - 1]) {
        return None;
    }
    if gen > u64::from(u16::MAX) || num > u64::from(u32::MAX) {
        return None;
    }
    Some((num_start, num as u32, gen as u16))
}

fn back_over_whitespace(data: &[u8], end: usize) -> Option<usize> {
    let mut start = end;
    while start > 0 && is_whitespace(data[start - 1]) {
        start -= 1;
    }
    (start < end).then_some(start)
}

fn back_over_digits(data: &[u8], end: usize) -> Option<(usize, u64)> {
    let mut start = end;
    while start > 0 && data[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start == end || end - start > 10 {
        return None;
    }
    let mut value = 0u64;
    for &b in &data[start..end] {
        value = value * 10 + u64::from(b - b'0');
    }
    Some((start, value))
}

/// Materialise recovered objects until one turns out to be the catalog.
fn find_catalog(runs: &ByteRuns, table: &XrefTable) -> Option<ObjRef> {
    let mut candidates: Vec<(u32, u16, usize)> = table
        .iter()
        .filter_map(|(&num, entry)| match entry.kind {
            EntryKind::Uncompressed { offset, gen } => Some((num, gen, offset)),
            _ => None,
        })
        .collect();
    candidates.sort();

    for (num, gen, offset) in candidates {
        let mut cur = Cursor::new(runs);
        cur.set_position(offset);
        let mut parser = Parser::new(Lexer::new(cur));
        let reference = ObjRef::new(num, gen);
        if let Some(obj) = parser.read_indirect_object(reference, |_| None) {
            if obj.value.as_dict().is_some_and(|d| d.has_type(b"Catalog")) {
                return Some(reference);
            }
        }
    }
    None
}

/// A `/Type /XRef` stream: fixed-width binary entries described by `/W`,
/// ranges described by `/Index`.
fn parse_xref_stream(
    runs: &ByteRuns,
    filters: &dyn FilterService,
    offset: usize,
    table: &mut XrefTable,
) -> Result<Section> {
    // Read the header numbers first so the object reader can verify them.
    let mut cur = Cursor::new(runs);
    cur.set_position(offset);
    let mut probe = Parser::new(Lexer::new(cur)).without_refs();
    let (num, gen) = match (probe.parse_value().as_int(), probe.parse_value().as_int()) {
        (Some(n), Some(g)) if n >= 0 && g >= 0 => (n as u32, g as u16),
        _ => {
            return Err(structural_or_truncated(
                &probe,
                "reading a cross-reference object header",
                "neither an xref table nor an indirect object here".to_string(),
            ))
        }
    };

    let mut cur = Cursor::new(runs);
    cur.set_position(offset);
    let mut parser = Parser::new(Lexer::new(cur));
    // /Length must be direct in a cross-reference stream.
    let Some(obj) = parser.read_indirect_object(ObjRef::new(num, gen), |_| None) else {
        return Err(PdfError::Structure("malformed cross-reference object".to_string()));
    };
    let Some(dict) = obj.value.as_dict() else {
        return Err(PdfError::Structure("cross-reference object has no dictionary".to_string()));
    };
    if !dict.has_type(b"XRef") {
        return Err(PdfError::Structure("object at startxref is not /Type /XRef".to_string()));
    }
    let Some(info) = obj.stream else {
        return Err(PdfError::Structure("cross-reference stream has no payload".to_string()));
    };

    let raw = runs.slice(info.offset, info.len);
    let chain = FilterChain::from_stream_dict(dict, |_| None);
    let data = filters.decode_stream(&raw, &chain)?;

    let widths = dict
        .get_array(b"W")
        .ok_or_else(|| PdfError::Structure("cross-reference stream lacks /W".to_string()))?;
    if widths.len() != 3 {
        return Err(PdfError::Structure(format!("/W has {} elements", widths.len())));
    }
    let mut w = [0usize; 3];
    for (i, v) in widths.iter().enumerate() {
        let n = v.as_int().unwrap_or(-1);
        if !(0..=8).contains(&n) {
            return Err(PdfError::Unsupported(format!("/W field width {n}")));
        }
        w[i] = n as usize;
    }
    let row = w.iter().sum::<usize>();
    if row == 0 {
        return Err(PdfError::Structure("/W describes empty entries".to_string()));
    }

    let size = dict.get_int(b"Size").unwrap_or(0).max(0) as u32;
    let ranges: Vec<(u32, u32)> = match dict.get_array(b"Index") {
        Some(items) => items
            .chunks(2)
            .filter_map(|pair| match pair {
                [a, b] => Some((a.as_int()? as u32, b.as_int()? as u32)),
                _ => None,
            })
            .collect(),
        None => vec![(0, size)],
    };

    let read_field = |data: &[u8], pos: usize, width: usize| -> u64 {
        if width == 0 {
            0
        } else {
            BigEndian::read_uint(&data[pos..pos + width], width)
        }
    };

    let mut pos = 0;
    for (start, count) in ranges {
        for i in 0..count {
            if pos + row > data.len() {
                warn!("cross-reference stream data ends early at object {}", start + i);
                break;
            }
            // A zero-width type field means every entry is uncompressed.
            let kind_code = if w[0] == 0 { 1 } else { read_field(&data, pos, w[0]) };
            let f1 = read_field(&data, pos + w[0], w[1]);
            let f2 = read_field(&data, pos + w[0] + w[1], w[2]);
            pos += row;

            let num = start + i;
            let kind = match kind_code {
                0 => EntryKind::Free { next: f1 as u32, gen: f2.min(u64::from(u16::MAX)) as u16 },
                1 => {
                    if f1 as usize >= runs.len() {
                        warn!("object {num} offset {f1} is outside the file; skipping");
                        continue;
                    }
                    EntryKind::Uncompressed {
                        offset: f1 as usize,
                        gen: f2.min(u64::from(u16::MAX)) as u16,
                    }
                }
                2 => EntryKind::Compressed { container: f1 as u32, index: f2 as u32 },
                other => {
                    warn!("unknown cross-reference entry type {other} for object {num}; skipping");
                    continue;
                }
            };
            table.insert_if_absent(num, XrefEntry { kind, from_stream: true });
        }
    }

    let prev = positive_offset(dict.get_int(b"Prev"));
    Ok(Section { trailer: dict.clone(), prev, xref_stm: None })
}
