//! The value parser and indirect-object reader.
//!
//! Driven by the token scanner. The parser never fails on bad bytes:
//! malformed numbers come out as integer 0, unterminated strings, arrays
//! and dictionaries end at the buffer, and structural consumers validate
//! what they got. Reference speculation (`int int R`) restores the cursor
//! exactly when it does not pan out.
//!
//! Literal strings are decrypted as they are parsed when a decryptor and a
//! target reference are in scope; hex strings keep their raw digits so the
//! decryption path downstream sees the original bytes.

use crate::lexer::{is_delimiter, is_whitespace, Lexer, Token};
use crate::object::{Dict, IndirectObject, ObjRef, StreamInfo, Value};
use crate::services::Decryptor;

/// Recursion guard for deeply nested arrays and dictionaries.
const MAX_DEPTH: u32 = 100;

/// Parser over one cursor range.
pub struct Parser<'a, 'd> {
    pub lexer: Lexer<'a>,
    decryptor: Option<&'d dyn Decryptor>,
    target: Option<ObjRef>,
    allow_refs: bool,
    content_stream: bool,
    depth: u32,
}

impl<'a, 'd> Parser<'a, 'd> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Parser {
            lexer,
            decryptor: None,
            target: None,
            allow_refs: true,
            content_stream: false,
            depth: 0,
        }
    }

    /// Disable `int int R` speculation (xref tables, object stream bodies
    /// use plain integers heavily).
    pub fn without_refs(mut self) -> Self {
        self.allow_refs = false;
        self
    }

    /// Enable content-stream tokens (`ID` inline images).
    pub fn for_content_stream(mut self) -> Self {
        self.content_stream = true;
        self
    }

    /// Attach the per-object decryption binding.
    pub fn with_decryptor(mut self, decryptor: Option<&'d dyn Decryptor>, target: ObjRef) -> Self {
        self.decryptor = decryptor;
        self.target = Some(target);
        self
    }

    /// Parse the next value. Never fails; see the module policy.
    pub fn parse_value(&mut self) -> Value {
        let token = self.lexer.classify();
        match token {
            Token::End => Value::Null,
            Token::Number => self.parse_number_or_reference(),
            Token::Name => Value::Name(self.parse_name()),
            Token::LiteralOpen => self.parse_literal_string(),
            Token::HexStringOpen => self.parse_hex_string(),
            Token::DictOpen => self.parse_dict_value(),
            Token::ArrayOpen => self.parse_array_value(),
            Token::Keyword => self.parse_keyword(),
            // A stray closer is consumed so scanning always makes progress.
            Token::DictClose => {
                self.lexer.cur.advance(2);
                Value::Null
            }
            Token::ArrayClose | Token::CloseAngle | Token::LiteralClose => {
                self.lexer.cur.advance(1);
                Value::Null
            }
        }
    }

    fn parse_array_value(&mut self) -> Value {
        if self.depth >= MAX_DEPTH {
            self.lexer.cur.advance(1);
            return Value::Null;
        }
        self.depth += 1;
        self.lexer.cur.advance(1); // [
        let mut items = Vec::new();
        loop {
            match self.lexer.classify() {
                Token::ArrayClose => {
                    self.lexer.cur.advance(1);
                    break;
                }
                Token::End => break,
                _ => items.push(self.parse_value()),
            }
        }
        self.depth -= 1;
        Value::Array(items)
    }

    fn parse_dict_value(&mut self) -> Value {
        if self.depth >= MAX_DEPTH {
            self.lexer.cur.advance(2);
            return Value::Null;
        }
        self.depth += 1;
        self.lexer.cur.advance(2); // <<
        let mut dict = Dict::new();
        loop {
            match self.lexer.classify() {
                Token::DictClose => {
                    self.lexer.cur.advance(2);
                    break;
                }
                Token::Name => {
                    let key = self.parse_name();
                    let value = self.parse_value();
                    dict.insert(key, value);
                }
                // A non-name where a key belongs ends the dictionary.
                _ => break,
            }
        }
        self.depth -= 1;
        Value::Dict(dict)
    }

    /// Numbers, with `int int R` speculation when references are enabled.
    fn parse_number_or_reference(&mut self) -> Value {
        let value = self.parse_number();
        let Value::Integer(num) = value else { return value };
        if !self.allow_refs || num < 0 {
            return value;
        }

        // Speculate: whitespace, a bare unsigned integer, whitespace, `R`.
        let mark = self.lexer.cur.position();
        self.lexer.skip_whitespace();
        let mut gen: u32 = 0;
        let mut digits = 0;
        while self.lexer.cur.peek(0).is_ascii_digit() {
            gen = gen.wrapping_mul(10).wrapping_add(u32::from(self.lexer.cur.read_byte() - b'0'));
            digits += 1;
        }
        if digits > 0 && self.lexer.try_keyword(b"R") {
            return Value::Reference(ObjRef::new(num as u32, gen as u16));
        }
        self.lexer.cur.set_position(mark);
        value
    }

    /// Sign, integer digits, optional fraction. Integer overflow wraps;
    /// a token with no digits at all degrades to integer 0.
    fn parse_number(&mut self) -> Value {
        let cur = &mut self.lexer.cur;
        let mut negative = false;
        match cur.peek(0) {
            b'+' => {
                cur.advance(1);
            }
            b'-' => {
                negative = true;
                cur.advance(1);
            }
            _ => {}
        }

        let mut int_wrapped: i32 = 0;
        let mut magnitude: f64 = 0.0;
        let mut saw_digit = false;
        while cur.peek(0).is_ascii_digit() {
            let d = i32::from(cur.read_byte() - b'0');
            int_wrapped = int_wrapped.wrapping_mul(10).wrapping_add(d);
            magnitude = magnitude * 10.0 + f64::from(d);
            saw_digit = true;
        }

        if cur.peek(0) == b'.' {
            cur.advance(1);
            let mut scale = 0.1;
            while cur.peek(0).is_ascii_digit() {
                magnitude += f64::from(cur.read_byte() - b'0') * scale;
                scale /= 10.0;
                saw_digit = true;
            }
            if !saw_digit {
                return Value::Integer(0);
            }
            let real = if negative { -magnitude } else { magnitude };
            return Value::Real(real as f32);
        }

        if !saw_digit {
            return Value::Integer(0);
        }
        Value::Integer(if negative { int_wrapped.wrapping_neg() } else { int_wrapped })
    }

    /// Name bytes after `/`, with `#XX` decoded. A malformed escape keeps
    /// its bytes literally.
    fn parse_name(&mut self) -> Vec<u8> {
        let cur = &mut self.lexer.cur;
        cur.advance(1); // /
        let mut out = Vec::new();
        loop {
            let b = cur.peek(0);
            if cur.at_end() || is_whitespace(b) || is_delimiter(b) {
                break;
            }
            cur.advance(1);
            if b == b'#' {
                let hi = hex_nibble(cur.peek(0));
                let lo = hex_nibble(cur.peek(1));
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    cur.advance(2);
                    out.push((hi << 4) | lo);
                    continue;
                }
            }
            out.push(b);
        }
        out
    }

    /// Balanced-parenthesis literal string with escape processing.
    fn parse_literal_string(&mut self) -> Value {
        let cur = &mut self.lexer.cur;
        cur.advance(1); // (
        let mut out = Vec::new();
        let mut depth = 1u32;
        while !cur.at_end() {
            let b = cur.read_byte();
            match b {
                b'\\' => {
                    let e = cur.read_byte();
                    match e {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'(' | b')' | b'\\' => out.push(e),
                        b'0'..=b'7' => {
                            let mut v = u32::from(e - b'0');
                            for _ in 0..2 {
                                let d = cur.peek(0);
                                if !(b'0'..=b'7').contains(&d) {
                                    break;
                                }
                                cur.advance(1);
                                v = v * 8 + u32::from(d - b'0');
                            }
                            out.push(v as u8);
                        }
                        b'\r' => {
                            // Line continuation; CR LF counts as one EOL.
                            if cur.peek(0) == b'\n' {
                                cur.advance(1);
                            }
                        }
                        b'\n' => {}
                        // A backslash before anything else disappears.
                        other => out.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(b);
                }
                _ => out.push(b),
            }
        }

        if let (Some(decryptor), Some(target)) = (self.decryptor, self.target) {
            out = decryptor.decrypt(&out, target);
        }
        Value::LiteralString(out)
    }

    /// Hex string: raw digits collected until `>`; whitespace skipped,
    /// anything else dropped.
    fn parse_hex_string(&mut self) -> Value {
        let cur = &mut self.lexer.cur;
        cur.advance(1); // <
        let mut digits = Vec::new();
        while !cur.at_end() {
            let b = cur.read_byte();
            if b == b'>' {
                break;
            }
            if b.is_ascii_hexdigit() {
                digits.push(b);
            }
        }
        Value::HexString(digits)
    }

    fn parse_keyword(&mut self) -> Value {
        let kw = self.lexer.read_keyword();
        if kw.is_empty() {
            // `{`, `}` or other unclassified delimiter: consume and move on.
            self.lexer.cur.advance(1);
            return Value::Null;
        }
        match kw.as_slice() {
            b"true" => Value::Bool(true),
            b"false" => Value::Bool(false),
            b"null" => Value::Null,
            b"ID" if self.content_stream => self.parse_inline_stream(),
            _ => Value::Operator(kw),
        }
    }

    /// Inline-image payload between `ID` and `EI`, kept opaque.
    fn parse_inline_stream(&mut self) -> Value {
        let cur = &mut self.lexer.cur;
        if is_whitespace(cur.peek(0)) {
            cur.advance(1);
        }
        let start = cur.position();
        let mut p = start;
        let end = loop {
            if p + 2 > cur.len() {
                break cur.len();
            }
            if cur.match_at(p, b"EI")
                && (p == start || is_whitespace(cur.slice(p - 1, 1)[0]))
                && (p + 2 == cur.len() || {
                    let after = cur.slice(p + 2, 1)[0];
                    is_whitespace(after) || is_delimiter(after)
                })
            {
                break p;
            }
            p += 1;
        };

        let mut payload_end = end;
        while payload_end > start && is_whitespace(cur.slice(payload_end - 1, 1)[0]) {
            payload_end -= 1;
        }
        let payload = cur.slice(start, payload_end - start).into_owned();
        cur.set_position((end + 2).min(cur.len()));
        Value::InlineStream(payload)
    }

    /// Read `N G obj <value> [stream ... endstream] endobj` at the cursor.
    ///
    /// The header must match `expected` exactly; otherwise the cursor is
    /// restored and the object is unavailable. `/Length` may be indirect,
    /// in which case `resolve_length` supplies it; a missing or wrong
    /// length falls back to scanning for `endstream`.
    pub fn read_indirect_object(
        &mut self,
        expected: ObjRef,
        mut resolve_length: impl FnMut(ObjRef) -> Option<i32>,
    ) -> Option<IndirectObject> {
        let start = self.lexer.cur.position();
        self.target = Some(expected);

        let num = self.parse_number_header();
        let gen = self.parse_number_header();
        let header_ok = num == Some(expected.num as i64)
            && gen == Some(i64::from(expected.gen))
            && self.lexer.try_keyword(b"obj");
        if !header_ok {
            self.lexer.cur.set_position(start);
            return None;
        }

        let value = self.parse_value();

        let stream = if self.lexer.try_keyword(b"stream") {
            Some(self.capture_stream(&value, &mut resolve_length)?)
        } else {
            None
        };

        // endobj is advisory; a missing one does not invalidate the object.
        let _ = self.lexer.try_keyword(b"endobj");

        Some(IndirectObject { reference: expected, value, stream })
    }

    /// A plain unsigned integer for object headers; `None` when the next
    /// token is not one.
    fn parse_number_header(&mut self) -> Option<i64> {
        self.lexer.skip_whitespace();
        let cur = &mut self.lexer.cur;
        let mut v: i64 = 0;
        let mut digits = 0;
        while cur.peek(0).is_ascii_digit() && digits < 12 {
            v = v * 10 + i64::from(cur.read_byte() - b'0');
            digits += 1;
        }
        (digits > 0).then_some(v)
    }

    fn capture_stream(
        &mut self,
        value: &Value,
        resolve_length: &mut impl FnMut(ObjRef) -> Option<i32>,
    ) -> Option<StreamInfo> {
        // Exactly one EOL after the stream keyword.
        let cur = &mut self.lexer.cur;
        match cur.peek(0) {
            b'\r' => {
                cur.advance(1);
                if cur.peek(0) == b'\n' {
                    cur.advance(1);
                }
            }
            b'\n' => cur.advance(1),
            _ => {}
        }
        let offset = cur.position();

        let declared = value.as_dict().and_then(|d| match d.get(b"Length") {
            Some(Value::Integer(n)) => Some(*n),
            Some(Value::Reference(r)) => resolve_length(*r),
            _ => None,
        });

        if let Some(len) = declared {
            if len > 0 && offset + len as usize <= self.lexer.cur.len() {
                let end = offset + len as usize;
                self.lexer.cur.set_position(end);
                if self.lexer.try_keyword(b"endstream") {
                    return Some(StreamInfo { offset, len: len as usize });
                }
                // Declared length does not land on endstream; rescan.
                self.lexer.cur.set_position(offset);
            }
        }

        // Recovery: find the next endstream keyword and trim trailing
        // whitespace off the payload.
        let mut p = offset;
        let total = self.lexer.cur.len();
        let found = loop {
            if p + b"endstream".len() > total {
                break None;
            }
            if self.lexer.cur.match_at(p, b"endstream") {
                break Some(p);
            }
            p += 1;
        };
        let end = found?;

        let mut payload_end = end;
        while payload_end > offset && is_whitespace(self.lexer.cur.slice(payload_end - 1, 1)[0]) {
            payload_end -= 1;
        }
        self.lexer.cur.set_position(end);
        let _ = self.lexer.try_keyword(b"endstream");
        Some(StreamInfo { offset, len: payload_end - offset })
    }
}

fn hex_nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
