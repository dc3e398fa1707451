//! Loader for NumPy `.npy` files.
//!
//! The element bytes are decoded in file order and never transposed. A
//! Fortran-ordered array becomes a column-major cube, a C-ordered array a
//! row-major one, and [`flat_index`](crate::data::flat_index) resolves
//! element positions from there.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::constants::NPY_MAGIC;
use crate::data::Cube;
use crate::data::error::LoadError;
use crate::data::loader::CubeLoader;
use crate::data::storage::{ByteOrder, ScalarKind, TypedStorage};

/// Loader for NumPy `.npy` files.
///
/// **Accepted arrays**: 2D `(d0, d1)` arrays, promoted to `(d0, d1, 1)`,
/// and 3D `(d0, d1, d2)` arrays.
///
/// Supported dtypes: `u1 u2 u4 u8 i1 i2 i4 i8 f4 f8`, either byte order.
pub struct NpyLoader;

/// Decoded `.npy` preamble.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyHeader {
    /// Format version `(major, minor)`
    pub version: (u8, u8),
    pub kind: ScalarKind,
    pub byte_order: ByteOrder,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
    /// Offset of the first element byte
    pub data_offset: usize,
}

impl NpyHeader {
    /// Read the magic, version, header length and header dictionary,
    /// leaving `reader` at the first element byte.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, LoadError> {
        let mut preamble = [0u8; 8];
        reader
            .read_exact(&mut preamble)
            .map_err(|_| LoadError::corrupted("file too short for a NumPy header"))?;
        if &preamble[..6] != NPY_MAGIC {
            return Err(LoadError::corrupted("missing NumPy magic bytes"));
        }

        let version = (preamble[6], preamble[7]);
        let header_len = match version.0 {
            1 => {
                let mut len = [0u8; 2];
                reader
                    .read_exact(&mut len)
                    .map_err(|_| LoadError::corrupted("truncated NumPy header length"))?;
                usize::from(u16::from_le_bytes(len))
            }
            2 | 3 => {
                let mut len = [0u8; 4];
                reader
                    .read_exact(&mut len)
                    .map_err(|_| LoadError::corrupted("truncated NumPy header length"))?;
                u32::from_le_bytes(len) as usize
            }
            major => {
                return Err(LoadError::corrupted(format!(
                    "unsupported NumPy format version {}.{}",
                    major, version.1
                )));
            }
        };
        let length_field = if version.0 == 1 { 2 } else { 4 };

        let mut text = Vec::new();
        reader
            .by_ref()
            .take(header_len as u64)
            .read_to_end(&mut text)
            .map_err(|e| LoadError::read(e.to_string()))?;
        if text.len() != header_len {
            return Err(LoadError::corrupted(format!(
                "NumPy header declares {} bytes, only {} present",
                header_len,
                text.len()
            )));
        }
        let text = String::from_utf8(text)
            .map_err(|_| LoadError::corrupted("NumPy header is not valid UTF-8"))?;

        let dict = DictParser::new(&text).parse_dict()?;

        let descr = match dict.get("descr") {
            Some(PyValue::Str(s)) => s.as_str(),
            Some(_) => return Err(LoadError::unsupported_type("structured NumPy dtype")),
            None => return Err(LoadError::corrupted("NumPy header has no 'descr'")),
        };
        let (kind, byte_order) = parse_descr(descr)?;

        let fortran_order = match dict.get("fortran_order") {
            Some(PyValue::Bool(b)) => *b,
            Some(_) => return Err(LoadError::corrupted("'fortran_order' is not a boolean")),
            None => false,
        };

        let shape = match dict.get("shape") {
            Some(PyValue::Tuple(shape)) => shape.clone(),
            Some(_) => return Err(LoadError::corrupted("'shape' is not a tuple")),
            None => return Err(LoadError::corrupted("NumPy header has no 'shape'")),
        };

        let header = Self {
            version,
            kind,
            byte_order,
            fortran_order,
            shape,
            data_offset: NPY_MAGIC.len() + 2 + length_field + header_len,
        };
        log::debug!("NpyLoader: header {:?}", header);
        Ok(header)
    }

    /// Cube extents: 3D shapes as-is, 2D shapes with a trailing 1.
    pub fn cube_dims(&self) -> Result<[usize; 3], LoadError> {
        let dims = match self.shape.as_slice() {
            &[d0, d1] => [d0, d1, 1],
            &[d0, d1, d2] => [d0, d1, d2],
            other => return Err(LoadError::NotA3DCube(other.len())),
        };
        if dims.contains(&0) {
            return Err(LoadError::invalid_dimensions(format!(
                "NumPy shape {:?} has an empty axis",
                self.shape
            )));
        }
        Ok(dims)
    }

    /// Number of payload bytes the header calls for.
    pub fn payload_bytes(&self) -> Result<usize, LoadError> {
        self.cube_dims()?
            .iter()
            .try_fold(self.kind.bytes(), |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| LoadError::invalid_dimensions(format!("{:?} overflows", self.shape)))
    }
}

impl NpyLoader {
    /// Load a cube from an in-memory `.npy` buffer.
    pub fn load_bytes(&self, data: &[u8]) -> Result<Cube, LoadError> {
        let mut reader = data;
        let header = NpyHeader::read(&mut reader)?;
        let needed = header.payload_bytes()?;
        if reader.len() < needed {
            return Err(LoadError::corrupted(format!(
                "NumPy payload has {} bytes, shape {:?} of {} needs {}",
                reader.len(),
                header.shape,
                header.kind,
                needed
            )));
        }
        Self::read_cube(&header, &mut reader)
    }

    fn read_cube<R: Read>(header: &NpyHeader, reader: &mut R) -> Result<Cube, LoadError> {
        let dims = header.cube_dims()?;
        let count = dims.iter().product();
        let storage = TypedStorage::read_from(reader, header.kind, count, header.byte_order)?;

        Ok(Cube::new(dims, storage, header.fortran_order)?.with_source_format(format!(
            "NumPy (.npy v{}.{})",
            header.version.0, header.version.1
        )))
    }
}

impl CubeLoader for NpyLoader {
    fn id(&self) -> &'static str {
        "npy"
    }

    fn display_name(&self) -> &'static str {
        "NumPy Array (.npy)"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["npy"]
    }

    fn can_load(&self, data: &[u8]) -> bool {
        data.starts_with(NPY_MAGIC)
    }

    fn load_file(&self, path: &Path) -> Result<Cube, LoadError> {
        let file = File::open(path).map_err(|e| LoadError::io(path, e))?;
        let file_len = file.metadata().map_err(|e| LoadError::io(path, e))?.len();
        let mut reader = BufReader::new(file);

        let header = NpyHeader::read(&mut reader)?;
        let needed = header.payload_bytes()?;
        let available = file_len.saturating_sub(header.data_offset as u64);
        if available < needed as u64 {
            return Err(LoadError::corrupted(format!(
                "NumPy payload has {} bytes, needs {}",
                available, needed
            )));
        }
        Self::read_cube(&header, &mut reader)
    }
}

/// Map a dtype string such as `<f4` or `|u1` to a kind and byte order.
fn parse_descr(descr: &str) -> Result<(ScalarKind, ByteOrder), LoadError> {
    let (order, code) = match descr.chars().next() {
        Some('<') => (ByteOrder::Little, &descr[1..]),
        Some('>') => (ByteOrder::Big, &descr[1..]),
        Some('|') | Some('=') => (ByteOrder::native(), &descr[1..]),
        _ => (ByteOrder::native(), descr),
    };
    let kind = match code {
        "f8" => ScalarKind::F64,
        "f4" => ScalarKind::F32,
        "i8" => ScalarKind::I64,
        "i4" => ScalarKind::I32,
        "i2" => ScalarKind::I16,
        "i1" => ScalarKind::I8,
        "u8" => ScalarKind::U64,
        "u4" => ScalarKind::U32,
        "u2" => ScalarKind::U16,
        "u1" => ScalarKind::U8,
        _ => return Err(LoadError::unsupported_type(format!("NumPy dtype '{}'", descr))),
    };
    Ok((kind, order))
}

/// Values that can appear in a `.npy` header dictionary.
#[derive(Debug, Clone, PartialEq)]
enum PyValue {
    Str(String),
    Bool(bool),
    Tuple(Vec<usize>),
    List,
}

/// Parser for the Python dict literal of a `.npy` header, e.g.
/// `{'descr': '<f4', 'fortran_order': False, 'shape': (3, 4), }`.
struct DictParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DictParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, what: &str) -> LoadError {
        LoadError::corrupted(format!("NumPy header: {} at byte {}", what, self.pos))
    }

    fn skip_ws(&mut self) {
        while self.bytes.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), LoadError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_dict(mut self) -> Result<HashMap<String, PyValue>, LoadError> {
        let mut dict = HashMap::new();
        self.expect(b'{')?;
        while !self.eat(b'}') {
            let key = self.parse_string()?;
            self.expect(b':')?;
            let value = self.parse_value()?;
            dict.insert(key, value);
            if !self.eat(b',') {
                self.expect(b'}')?;
                break;
            }
        }
        Ok(dict)
    }

    fn parse_value(&mut self) -> Result<PyValue, LoadError> {
        match self.peek() {
            Some(b'\'') | Some(b'"') => self.parse_string().map(PyValue::Str),
            Some(b'(') => self.parse_tuple().map(PyValue::Tuple),
            Some(b'[') => {
                self.skip_balanced(b'[', b']')?;
                Ok(PyValue::List)
            }
            Some(b'T') | Some(b'F') => self.parse_bool().map(PyValue::Bool),
            _ => Err(self.error("unexpected value")),
        }
    }

    fn parse_string(&mut self) -> Result<String, LoadError> {
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => q,
            _ => return Err(self.error("expected a string")),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b == quote {
                let s = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                self.pos += 1;
                return Ok(s);
            }
            self.pos += 1;
        }
        Err(self.error("unterminated string"))
    }

    fn parse_bool(&mut self) -> Result<bool, LoadError> {
        let rest = &self.bytes[self.pos..];
        if rest.starts_with(b"True") {
            self.pos += 4;
            Ok(true)
        } else if rest.starts_with(b"False") {
            self.pos += 5;
            Ok(false)
        } else {
            Err(self.error("expected True or False"))
        }
    }

    fn parse_tuple(&mut self) -> Result<Vec<usize>, LoadError> {
        self.expect(b'(')?;
        let mut items = Vec::new();
        while !self.eat(b')') {
            self.skip_ws();
            let start = self.pos;
            while self.bytes.get(self.pos).is_some_and(u8::is_ascii_digit) {
                self.pos += 1;
            }
            if start == self.pos {
                return Err(self.error("expected a non-negative integer"));
            }
            let digits = std::str::from_utf8(&self.bytes[start..self.pos])
                .map_err(|_| self.error("invalid integer"))?;
            let value = digits
                .parse::<usize>()
                .map_err(|_| self.error("integer out of range"))?;
            // Python 2 long suffix
            if self.bytes.get(self.pos) == Some(&b'L') {
                self.pos += 1;
            }
            items.push(value);
            if !self.eat(b',') {
                self.expect(b')')?;
                break;
            }
        }
        Ok(items)
    }

    fn skip_balanced(&mut self, open: u8, close: u8) -> Result<(), LoadError> {
        let mut depth = 0usize;
        while let Some(&b) = self.bytes.get(self.pos) {
            self.pos += 1;
            if b == open {
                depth += 1;
            } else if b == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
        Err(self.error("unbalanced brackets"))
    }
}
