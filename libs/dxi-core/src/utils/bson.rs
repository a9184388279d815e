//! Minimal BSON document building and parsing.
//!
//! Only the subset needed by the instance codec is implemented.  The
//! writer appends elements to a growing buffer and patches the length
//! prefix of every enclosing document when it is closed, so building a
//! sub-document in place (`begin_subdoc` / `end_subdoc`) and appending a
//! separately built document (`append_document`) produce identical bytes.

use crate::errors::{ensure_or, raise, ErrorKind, Result};

/// Element type tags (as defined by bsonspec.org).
pub const DOUBLE: u8 = 0x01;
pub const STRING: u8 = 0x02;
pub const DOCUMENT: u8 = 0x03;
pub const ARRAY: u8 = 0x04;
pub const BINARY: u8 = 0x05;
pub const BOOL: u8 = 0x08;
pub const NULL: u8 = 0x0a;
pub const INT32: u8 = 0x10;
pub const UINT64: u8 = 0x11;
pub const INT64: u8 = 0x12;
pub const DECIMAL128: u8 = 0x13;

/// Generic binary subtype.
pub const SUBTYPE_GENERIC: u8 = 0x00;

/// Returns the name of an element type tag.
pub fn typename(ty: u8) -> &'static str {
    match ty {
        DOUBLE => "double",
        STRING => "string",
        DOCUMENT => "document",
        ARRAY => "array",
        BINARY => "binary",
        BOOL => "bool",
        NULL => "null",
        INT32 => "int32",
        UINT64 => "uint64",
        INT64 => "int64",
        DECIMAL128 => "decimal128",
        _ => "unknown",
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Incremental BSON document writer.
pub struct Writer {
    buf: Vec<u8>,
    /// Offsets of the length prefixes of every unfinished document (the
    /// root at index 0) or partially built binary element.
    open: Vec<usize>,
}

impl Writer {
    pub fn new() -> Writer {
        Writer {
            buf: vec![0; 4],
            open: vec![0],
        }
    }

    fn element_header(&mut self, ty: u8, ename: &str) {
        debug_assert!(!ename.as_bytes().contains(&0), "element name with NUL");
        self.buf.push(ty);
        self.buf.extend_from_slice(ename.as_bytes());
        self.buf.push(0);
    }

    fn patch_len(&mut self, start: usize, len: u32) {
        self.buf[start..start + 4].copy_from_slice(&len.to_le_bytes());
    }

    pub fn append_double(&mut self, ename: &str, v: f64) {
        self.element_header(DOUBLE, ename);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn append_string(&mut self, ename: &str, v: &str) {
        self.element_header(STRING, ename);
        self.buf
            .extend_from_slice(&(v.len() as u32 + 1).to_le_bytes());
        self.buf.extend_from_slice(v.as_bytes());
        self.buf.push(0);
    }

    pub fn append_bool(&mut self, ename: &str, v: bool) {
        self.element_header(BOOL, ename);
        self.buf.push(v as u8);
    }

    pub fn append_null(&mut self, ename: &str) {
        self.element_header(NULL, ename);
    }

    pub fn append_int32(&mut self, ename: &str, v: i32) {
        self.element_header(INT32, ename);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn append_int64(&mut self, ename: &str, v: i64) {
        self.element_header(INT64, ename);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn append_uint64(&mut self, ename: &str, v: u64) {
        self.element_header(UINT64, ename);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn append_binary(&mut self, ename: &str, subtype: u8, data: &[u8]) {
        self.element_header(BINARY, ename);
        self.buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.buf.push(subtype);
        self.buf.extend_from_slice(data);
    }

    /// Appends a separately built document (or array) verbatim.
    pub fn append_document(&mut self, ename: &str, ty: u8, doc: &[u8]) {
        debug_assert!(ty == DOCUMENT || ty == ARRAY);
        self.element_header(ty, ename);
        self.buf.extend_from_slice(doc);
    }

    /// Starts a sub-document built in place; pair with
    /// [`end_subdoc`](Self::end_subdoc).
    pub fn begin_subdoc(&mut self, ename: &str) {
        self.element_header(DOCUMENT, ename);
        self.open.push(self.buf.len());
        self.buf.extend_from_slice(&[0; 4]);
    }

    /// Starts an array built in place; elements are appended with their
    /// decimal index as name.  Pair with [`end_subdoc`](Self::end_subdoc).
    pub fn begin_array(&mut self, ename: &str) {
        self.element_header(ARRAY, ename);
        self.open.push(self.buf.len());
        self.buf.extend_from_slice(&[0; 4]);
    }

    pub fn end_subdoc(&mut self) {
        let start = self.open.pop().expect("end_subdoc without begin");
        self.buf.push(0);
        let len = (self.buf.len() - start) as u32;
        self.patch_len(start, len);
    }

    /// Starts a binary element filled piecewise; pair with
    /// [`end_binary`](Self::end_binary).
    pub fn begin_binary(&mut self, ename: &str, subtype: u8) {
        self.element_header(BINARY, ename);
        self.open.push(self.buf.len());
        self.buf.extend_from_slice(&[0; 4]);
        self.buf.push(subtype);
    }

    pub fn append_binary_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn end_binary(&mut self) {
        let start = self.open.pop().expect("end_binary without begin");
        let len = (self.buf.len() - start - 5) as u32;
        self.patch_len(start, len);
    }

    /// Closes the root document and returns its bytes.
    pub fn finish(mut self) -> Vec<u8> {
        assert_eq!(self.open.len(), 1, "unclosed sub-document");
        self.buf.push(0);
        let len = self.buf.len() as u32;
        self.patch_len(0, len);
        self.buf
    }
}

impl Default for Writer {
    fn default() -> Self {
        Writer::new()
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// One parsed element: its type tag, name and raw payload.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
    pub ty: u8,
    pub name: &'a str,
    pub data: &'a [u8],
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    match data.get(at..at + 4) {
        Some(b) => Ok(u32::from_le_bytes(b.try_into().expect("4-byte slice"))),
        None => raise!(ErrorKind::Parse, "truncated BSON document"),
    }
}

/// Total size of the document starting at `doc`.
pub fn doc_size(doc: &[u8]) -> Result<usize> {
    let len = read_u32(doc, 0)? as usize;
    ensure_or!(
        len >= 5 && len <= doc.len(),
        ErrorKind::Parse,
        "invalid BSON document length {len}"
    );
    Ok(len)
}

/// Sequential element parser over one document.
pub struct Parser<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(doc: &'a [u8]) -> Result<Parser<'a>> {
        let len = doc_size(doc)?;
        ensure_or!(
            doc[len - 1] == 0,
            ErrorKind::Parse,
            "BSON document without terminator"
        );
        Ok(Parser {
            body: &doc[..len - 1],
            pos: 4,
        })
    }

    /// Parses the next element, or `None` at the end of the document.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<std::option::Option<Element<'a>>> {
        if self.pos >= self.body.len() {
            return Ok(None);
        }
        let ty = self.body[self.pos];
        self.pos += 1;
        let name_start = self.pos;
        let name_end = match self.body[name_start..].iter().position(|b| *b == 0) {
            Some(i) => name_start + i,
            None => raise!(ErrorKind::Parse, "unterminated BSON element name"),
        };
        let name = std::str::from_utf8(&self.body[name_start..name_end])
            .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))?;
        self.pos = name_end + 1;

        let at = self.pos;
        let datasize = match ty {
            DOUBLE | INT64 | UINT64 => 8,
            INT32 => 4,
            BOOL => 1,
            NULL => 0,
            DECIMAL128 => 16,
            STRING => 4 + read_u32(self.body, at)? as usize,
            DOCUMENT | ARRAY => read_u32(self.body, at)? as usize,
            BINARY => 5 + read_u32(self.body, at)? as usize,
            other => raise!(ErrorKind::Parse, "unsupported BSON element type {other:#04x}"),
        };
        let data = match self.body.get(at..at + datasize) {
            Some(d) => d,
            None => raise!(ErrorKind::Parse, "truncated BSON element \"{name}\""),
        };
        self.pos += datasize;
        Ok(Some(Element { ty, name, data }))
    }
}

/// Scans a document for the element named `ename`.
pub fn scan<'a>(doc: &'a [u8], ename: &str) -> Result<std::option::Option<Element<'a>>> {
    let mut parser = Parser::new(doc)?;
    while let Some(elem) = parser.next()? {
        if elem.name == ename {
            return Ok(Some(elem));
        }
    }
    Ok(None)
}

impl<'a> Element<'a> {
    fn type_error(&self, wanted: &str) -> crate::errors::Error {
        crate::errors::Error::new(
            ErrorKind::Type,
            format!(
                "BSON element \"{}\" is {}, not {wanted}",
                self.name,
                typename(self.ty)
            ),
        )
    }

    pub fn as_str(&self) -> Result<&'a str> {
        if self.ty != STRING {
            return Err(self.type_error("string"));
        }
        let len = read_u32(self.data, 0)? as usize;
        ensure_or!(
            len >= 1 && 4 + len <= self.data.len(),
            ErrorKind::Parse,
            "invalid BSON string length {len}"
        );
        std::str::from_utf8(&self.data[4..4 + len - 1])
            .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))
    }

    pub fn as_bool(&self) -> Result<bool> {
        if self.ty != BOOL {
            return Err(self.type_error("bool"));
        }
        Ok(self.data[0] != 0)
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self.ty {
            INT32 => Ok(i32::from_le_bytes(self.data[..4].try_into().expect("4 bytes")) as i64),
            INT64 => Ok(i64::from_le_bytes(self.data[..8].try_into().expect("8 bytes"))),
            UINT64 => {
                let v = u64::from_le_bytes(self.data[..8].try_into().expect("8 bytes"));
                i64::try_from(v).map_err(|_| {
                    crate::errors::Error::new(ErrorKind::Value, format!("{v} overflows int64"))
                })
            }
            _ => Err(self.type_error("an integer")),
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        match self.ty {
            UINT64 => Ok(u64::from_le_bytes(self.data[..8].try_into().expect("8 bytes"))),
            INT32 | INT64 => {
                let v = self.as_i64()?;
                u64::try_from(v).map_err(|_| {
                    crate::errors::Error::new(ErrorKind::Value, format!("{v} is negative"))
                })
            }
            _ => Err(self.type_error("an unsigned integer")),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self.ty {
            DOUBLE => Ok(f64::from_le_bytes(self.data[..8].try_into().expect("8 bytes"))),
            INT32 | INT64 => Ok(self.as_i64()? as f64),
            _ => Err(self.type_error("a double")),
        }
    }

    /// Binary payload as `(subtype, bytes)`.
    pub fn as_binary(&self) -> Result<(u8, &'a [u8])> {
        if self.ty != BINARY {
            return Err(self.type_error("binary"));
        }
        let len = read_u32(self.data, 0)? as usize;
        ensure_or!(
            5 + len <= self.data.len(),
            ErrorKind::Parse,
            "invalid BSON binary length {len}"
        );
        Ok((self.data[4], &self.data[5..5 + len]))
    }

    /// Embedded document (or array) bytes, length prefix included.
    pub fn as_doc(&self) -> Result<&'a [u8]> {
        if self.ty != DOCUMENT && self.ty != ARRAY {
            return Err(self.type_error("a document"));
        }
        Ok(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        let mut w = Writer::new();
        w.append_string("name", "value");
        w.append_int32("i32", -42);
        w.append_int64("i64", 1 << 40);
        w.append_uint64("u64", u64::MAX);
        w.append_double("f", 3.5);
        w.append_bool("b", true);
        w.append_null("nothing");
        w.append_binary("bin", SUBTYPE_GENERIC, &[1, 2, 3]);
        let doc = w.finish();

        assert_eq!(doc_size(&doc).unwrap(), doc.len());
        assert_eq!(scan(&doc, "name").unwrap().unwrap().as_str().unwrap(), "value");
        assert_eq!(scan(&doc, "i32").unwrap().unwrap().as_i64().unwrap(), -42);
        assert_eq!(scan(&doc, "i64").unwrap().unwrap().as_i64().unwrap(), 1 << 40);
        assert_eq!(scan(&doc, "u64").unwrap().unwrap().as_u64().unwrap(), u64::MAX);
        assert_eq!(scan(&doc, "f").unwrap().unwrap().as_f64().unwrap(), 3.5);
        assert!(scan(&doc, "b").unwrap().unwrap().as_bool().unwrap());
        assert_eq!(scan(&doc, "nothing").unwrap().unwrap().ty, NULL);
        assert_eq!(
            scan(&doc, "bin").unwrap().unwrap().as_binary().unwrap(),
            (SUBTYPE_GENERIC, [1u8, 2, 3].as_slice())
        );
        assert!(scan(&doc, "absent").unwrap().is_none());
    }

    #[test]
    fn empty_document_is_five_bytes() {
        let doc = Writer::new().finish();
        assert_eq!(doc, vec![5, 0, 0, 0, 0]);
    }

    #[test]
    fn nested_and_direct_construction_agree() {
        // In-place sub-document...
        let mut a = Writer::new();
        a.append_string("uuid", "x");
        a.begin_subdoc("dims");
        a.append_int32("n", 3);
        a.append_int32("m", 4);
        a.end_subdoc();
        a.append_bool("tail", false);
        let a = a.finish();

        // ...versus appending a separately built document.
        let mut sub = Writer::new();
        sub.append_int32("n", 3);
        sub.append_int32("m", 4);
        let sub = sub.finish();
        let mut b = Writer::new();
        b.append_string("uuid", "x");
        b.append_document("dims", DOCUMENT, &sub);
        b.append_bool("tail", false);
        let b = b.finish();

        assert_eq!(a, b);
    }

    #[test]
    fn piecewise_binary_matches_direct() {
        let mut a = Writer::new();
        a.begin_binary("payload", SUBTYPE_GENERIC);
        a.append_binary_bytes(b"one\0");
        a.append_binary_bytes(b"two\0");
        a.end_binary();
        let a = a.finish();

        let mut b = Writer::new();
        b.append_binary("payload", SUBTYPE_GENERIC, b"one\0two\0");
        let b = b.finish();

        assert_eq!(a, b);
    }

    #[test]
    fn parser_walks_all_elements() {
        let mut w = Writer::new();
        w.append_int32("a", 1);
        w.begin_array("arr");
        w.append_string("0", "x");
        w.append_string("1", "y");
        w.end_subdoc();
        w.append_int32("z", 2);
        let doc = w.finish();

        let mut names = Vec::new();
        let mut parser = Parser::new(&doc).unwrap();
        while let Some(elem) = parser.next().unwrap() {
            names.push(elem.name.to_owned());
        }
        assert_eq!(names, vec!["a", "arr", "z"]);

        let arr = scan(&doc, "arr").unwrap().unwrap();
        let inner = arr.as_doc().unwrap();
        let mut parser = Parser::new(inner).unwrap();
        assert_eq!(parser.next().unwrap().unwrap().as_str().unwrap(), "x");
        assert_eq!(parser.next().unwrap().unwrap().as_str().unwrap(), "y");
        assert!(parser.next().unwrap().is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(doc_size(&[1, 2]).is_err());
        assert!(Parser::new(&[200, 0, 0, 0, 0]).is_err());
        let elem = {
            let mut w = Writer::new();
            w.append_int32("a", 1);
            w.finish()
        };
        assert!(scan(&elem, "a").unwrap().unwrap().as_str().is_err());
    }
}
