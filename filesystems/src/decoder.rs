// Structure decoder
// Turns raw sector bytes into owned, immutable records. Byte order is a
// per-call parameter; nothing here keeps a "current endianness" around.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use relic_core::ProbeError;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    pub fn other(self) -> Self {
        match self {
            Endian::Big => Endian::Little,
            Endian::Little => Endian::Big,
        }
    }
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endian::Big => f.write_str("big-endian"),
            Endian::Little => f.write_str("little-endian"),
        }
    }
}

/// Reassemble a 64-bit value stored as separate 32-bit halves
pub fn join_split_u64(high: u32, low: u32) -> u64 {
    (u64::from(high) << 32) | u64::from(low)
}

/// Decode on-disk text. Legacy volumes are not reliably UTF-8, so bytes
/// that are not valid UTF-8 are taken as Latin-1.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Bounds-checked field access over a borrowed buffer
pub struct FieldReader<'a> {
    buf: &'a [u8],
    endian: Endian,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8], endian: Endian) -> Self {
        Self { buf, endian }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn field(&self, offset: usize, len: usize) -> Result<&'a [u8], ProbeError> {
        offset
            .checked_add(len)
            .and_then(|end| self.buf.get(offset..end))
            .ok_or_else(|| {
                ProbeError::malformed(format!(
                    "field at {:#x} (+{}) lies outside a {}-byte structure",
                    offset,
                    len,
                    self.buf.len()
                ))
            })
    }

    pub fn u8(&self, offset: usize) -> Result<u8, ProbeError> {
        Ok(self.field(offset, 1)?[0])
    }

    pub fn u16(&self, offset: usize) -> Result<u16, ProbeError> {
        let bytes = self.field(offset, 2)?;
        Ok(match self.endian {
            Endian::Big => BigEndian::read_u16(bytes),
            Endian::Little => LittleEndian::read_u16(bytes),
        })
    }

    pub fn u32(&self, offset: usize) -> Result<u32, ProbeError> {
        let bytes = self.field(offset, 4)?;
        Ok(match self.endian {
            Endian::Big => BigEndian::read_u32(bytes),
            Endian::Little => LittleEndian::read_u32(bytes),
        })
    }

    pub fn u64(&self, offset: usize) -> Result<u64, ProbeError> {
        let bytes = self.field(offset, 8)?;
        Ok(match self.endian {
            Endian::Big => BigEndian::read_u64(bytes),
            Endian::Little => LittleEndian::read_u64(bytes),
        })
    }

    pub fn i32(&self, offset: usize) -> Result<i32, ProbeError> {
        Ok(self.u32(offset)? as i32)
    }

    pub fn i64(&self, offset: usize) -> Result<i64, ProbeError> {
        Ok(self.u64(offset)? as i64)
    }

    /// Fixed-width byte array, copied out
    pub fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N], ProbeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.field(offset, N)?);
        Ok(out)
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>, ProbeError> {
        Ok(self.field(offset, len)?.to_vec())
    }

    /// Zero-terminated string in a fixed `len`-byte field; a field with no
    /// terminator uses all `len` bytes
    pub fn c_string(&self, offset: usize, len: usize) -> Result<String, ProbeError> {
        let raw = self.field(offset, len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(decode_text(&raw[..end]))
    }

    /// Length-prefixed string of at most `max` characters
    pub fn pascal_string(&self, offset: usize, max: usize) -> Result<String, ProbeError> {
        let len = self.u8(offset)? as usize;
        if len > max {
            return Err(ProbeError::malformed(format!(
                "string at {:#x} claims {} characters, field holds {}",
                offset, len, max
            )));
        }
        Ok(decode_text(self.field(offset + 1, len)?))
    }

    /// 128-bit identifier, taken verbatim
    pub fn uuid(&self, offset: usize) -> Result<Uuid, ProbeError> {
        Ok(Uuid::from_bytes(self.array::<16>(offset)?))
    }

    /// 64-bit value whose halves live at separate offsets
    pub fn split_u64(&self, high: usize, low: usize) -> Result<u64, ProbeError> {
        Ok(join_split_u64(self.u32(high)?, self.u32(low)?))
    }
}

/// Shape of one field in a declarative layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    U32,
    U64,
    I32,
    I64,
    Bytes(usize),
    /// Zero-terminated string in a field of this many bytes
    CString(usize),
    /// Length byte followed by at most this many characters
    PascalString(usize),
    Uuid,
    /// High half at the field offset, low half at `low`
    SplitU64 { low: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, offset: usize, kind: FieldKind) -> Self {
        Self { name, offset, kind }
    }
}

/// A structure description: total size plus its fields
#[derive(Debug)]
pub struct Layout {
    pub name: &'static str,
    pub size: usize,
    pub fields: &'static [FieldSpec],
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Bytes(Vec<u8>),
    Text(String),
    Uuid(Uuid),
}

/// A decoded structure. Owns its values; never borrows the sector buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    layout: &'static str,
    endian: Endian,
    values: Vec<(&'static str, Value)>,
}

impl Record {
    pub fn layout(&self) -> &'static str {
        self.layout
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    fn missing(&self, name: &str, wanted: &str) -> ProbeError {
        ProbeError::malformed(format!("{} has no {} field '{}'", self.layout, wanted, name))
    }

    pub fn unsigned(&self, name: &str) -> Result<u64, ProbeError> {
        match self.get(name) {
            Some(Value::Unsigned(v)) => Ok(*v),
            _ => Err(self.missing(name, "unsigned")),
        }
    }

    pub fn signed(&self, name: &str) -> Result<i64, ProbeError> {
        match self.get(name) {
            Some(Value::Signed(v)) => Ok(*v),
            _ => Err(self.missing(name, "signed")),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str, ProbeError> {
        match self.get(name) {
            Some(Value::Text(v)) => Ok(v),
            _ => Err(self.missing(name, "text")),
        }
    }

    pub fn bytes(&self, name: &str) -> Result<&[u8], ProbeError> {
        match self.get(name) {
            Some(Value::Bytes(v)) => Ok(v),
            _ => Err(self.missing(name, "byte array")),
        }
    }

    pub fn uuid(&self, name: &str) -> Result<Uuid, ProbeError> {
        match self.get(name) {
            Some(Value::Uuid(v)) => Ok(*v),
            _ => Err(self.missing(name, "uuid")),
        }
    }
}

/// Decode `buffer` against `layout` in the given byte order.
///
/// The structure is copied out of the buffer first, so the record is
/// independent of the sector buffer it came from.
pub fn decode(
    buffer: &[u8],
    layout: &'static Layout,
    endian: Endian,
) -> Result<Record, ProbeError> {
    let Some(raw) = buffer.get(..layout.size) else {
        return Err(ProbeError::malformed(format!(
            "{} needs {} bytes, buffer holds {}",
            layout.name,
            layout.size,
            buffer.len()
        )));
    };
    let copy = raw.to_vec();
    let reader = FieldReader::new(&copy, endian);

    let mut values = Vec::with_capacity(layout.fields.len());
    for spec in layout.fields {
        let value = match spec.kind {
            FieldKind::U8 => Value::Unsigned(reader.u8(spec.offset)? as u64),
            FieldKind::U16 => Value::Unsigned(reader.u16(spec.offset)? as u64),
            FieldKind::U32 => Value::Unsigned(reader.u32(spec.offset)? as u64),
            FieldKind::U64 => Value::Unsigned(reader.u64(spec.offset)?),
            FieldKind::I32 => Value::Signed(reader.i32(spec.offset)? as i64),
            FieldKind::I64 => Value::Signed(reader.i64(spec.offset)?),
            FieldKind::Bytes(len) => Value::Bytes(reader.bytes(spec.offset, len)?),
            FieldKind::CString(len) => Value::Text(reader.c_string(spec.offset, len)?),
            FieldKind::PascalString(max) => Value::Text(reader.pascal_string(spec.offset, max)?),
            FieldKind::Uuid => Value::Uuid(reader.uuid(spec.offset)?),
            FieldKind::SplitU64 { low } => Value::Unsigned(reader.split_u64(spec.offset, low)?),
        };
        values.push((spec.name, value));
    }

    Ok(Record {
        layout: layout.name,
        endian,
        values,
    })
}

/// Decode with `first`, and if `is_valid` rejects the result, with the
/// opposite byte order. The byte order of the returned record is the
/// detected one.
pub fn decode_either_endian<F>(
    buffer: &[u8],
    layout: &'static Layout,
    first: Endian,
    is_valid: F,
) -> Result<Record, ProbeError>
where
    F: Fn(&Record) -> bool,
{
    for endian in [first, first.other()] {
        let record = decode(buffer, layout, endian)?;
        if is_valid(&record) {
            return Ok(record);
        }
    }
    Err(ProbeError::malformed(format!(
        "no byte order yields a valid {}",
        layout.name
    )))
}
