//! Data section values and their canonical encoding
//!
//! Implements the MaxMind DB data types. Every value has exactly
//! one byte encoding: integers are written big-endian with leading zero bytes
//! stripped, map entries are written in ascending key order, and floats use
//! their fixed IEEE 754 width. Two values are equal exactly when their
//! canonical encodings are byte-identical.
//!
//! # Supported Types
//!
//! - **String**: UTF-8 text data
//! - **Double**: 64-bit floating point (IEEE 754)
//! - **Bytes**: Raw byte arrays
//! - **Uint16** / **Uint32** / **Uint64** / **Uint128**: Unsigned integers
//! - **Map**: Key-value pairs (string keys)
//! - **Int32**: Signed 32-bit integers
//! - **Array**: Ordered lists of values
//! - **Bool**: Boolean values
//! - **Float**: 32-bit floating point (IEEE 754)
//!
//! Pointers are part of the wire format but never part of [`DataValue`]: the
//! serializer emits them when a repeated value is cheaper to reference than to
//! rewrite, and [`DataDecoder`] resolves them transparently.
//!
//! # Format
//!
//! Control byte: type (3 bits) and size (5 bits). Types above 7 store 0 in
//! the type bits and `type - 7` in the following byte. Sizes of 29 and up
//! spill into 1, 2 or 3 extra bytes.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::error::{Result, WriterError};
use std::collections::HashMap;
use std::fmt;
use xxhash_rust::xxh3::xxh3_128;

/// Content hash of a value's canonical encoding
pub type ContentKey = u128;

/// Largest size field the control byte encoding can express
pub const MAX_ENCODED_SIZE: usize = 65_821 + 0xFF_FFFF;

const MAX_DECODE_DEPTH: usize = 512;

/// Type numbers of the MaxMind DB format
pub(crate) mod type_id {
    pub const EXTENDED: u8 = 0;
    pub const POINTER: u8 = 1;
    pub const STRING: u8 = 2;
    pub const DOUBLE: u8 = 3;
    pub const BYTES: u8 = 4;
    pub const UINT16: u8 = 5;
    pub const UINT32: u8 = 6;
    pub const MAP: u8 = 7;
    pub const INT32: u8 = 8;
    pub const UINT64: u8 = 9;
    pub const UINT128: u8 = 10;
    pub const ARRAY: u8 = 11;
    pub const BOOL: u8 = 14;
    pub const FLOAT: u8 = 15;
}

/// Data value that can be stored in the data section
#[derive(Debug, Clone)]
pub enum DataValue {
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map (string keys only)
    Map(HashMap<String, DataValue>),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl DataValue {
    /// MMDB type number of this value
    pub fn type_id(&self) -> u8 {
        match self {
            DataValue::String(_) => type_id::STRING,
            DataValue::Double(_) => type_id::DOUBLE,
            DataValue::Bytes(_) => type_id::BYTES,
            DataValue::Uint16(_) => type_id::UINT16,
            DataValue::Uint32(_) => type_id::UINT32,
            DataValue::Map(_) => type_id::MAP,
            DataValue::Int32(_) => type_id::INT32,
            DataValue::Uint64(_) => type_id::UINT64,
            DataValue::Uint128(_) => type_id::UINT128,
            DataValue::Array(_) => type_id::ARRAY,
            DataValue::Bool(_) => type_id::BOOL,
            DataValue::Float(_) => type_id::FLOAT,
        }
    }

    /// Value carried in the size field of the control byte
    fn size_field(&self) -> usize {
        match self {
            DataValue::String(s) => s.len(),
            DataValue::Double(_) => 8,
            DataValue::Bytes(b) => b.len(),
            DataValue::Uint16(n) => significant_bytes(*n as u128),
            DataValue::Uint32(n) => significant_bytes(*n as u128),
            DataValue::Map(m) => m.len(),
            DataValue::Int32(n) => significant_bytes(*n as u32 as u128),
            DataValue::Uint64(n) => significant_bytes(*n as u128),
            DataValue::Uint128(n) => significant_bytes(*n),
            DataValue::Array(a) => a.len(),
            DataValue::Bool(b) => *b as usize,
            DataValue::Float(_) => 4,
        }
    }

    /// Length of the canonical encoding in bytes (no pointers)
    pub fn encoded_len(&self) -> usize {
        let size = self.size_field();
        let head = control_len(self.type_id(), size);
        let body = match self {
            DataValue::Map(m) => m
                .iter()
                .map(|(k, v)| control_len(type_id::STRING, k.len()) + k.len() + v.encoded_len())
                .sum(),
            DataValue::Array(a) => a.iter().map(DataValue::encoded_len).sum(),
            DataValue::Bool(_) => 0,
            _ => size,
        };
        head + body
    }

    /// Append the canonical encoding of this value to `buf`
    pub fn write_canonical(&self, buf: &mut Vec<u8>) -> Result<()> {
        self.write_head(buf)?;
        match self {
            DataValue::Map(m) => {
                for (key, value) in sorted_entries(m) {
                    write_string(key, buf)?;
                    value.write_canonical(buf)?;
                }
            }
            DataValue::Array(a) => {
                for value in a {
                    value.write_canonical(buf)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Canonical encoding as a fresh buffer
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.write_canonical(&mut buf)?;
        Ok(buf)
    }

    /// Content key used for deduplication
    ///
    /// Equal keys are trusted to mean equal values; there is no byte-level
    /// tie-break on a hash match.
    pub fn content_key(&self) -> Result<ContentKey> {
        Ok(xxh3_128(&self.to_canonical_bytes()?))
    }

    /// Write the control byte(s) and, for scalars, the payload.
    /// Containers only get their header; entries are written by the caller.
    pub(crate) fn write_head(&self, buf: &mut Vec<u8>) -> Result<()> {
        write_control(self.type_id(), self.size_field(), buf)?;
        match self {
            DataValue::String(s) => buf.extend_from_slice(s.as_bytes()),
            DataValue::Double(d) => buf.extend_from_slice(&d.to_be_bytes()),
            DataValue::Bytes(b) => buf.extend_from_slice(b),
            DataValue::Uint16(n) => buf.extend_from_slice(strip_leading_zeros(&n.to_be_bytes())),
            DataValue::Uint32(n) => buf.extend_from_slice(strip_leading_zeros(&n.to_be_bytes())),
            DataValue::Int32(n) => {
                buf.extend_from_slice(strip_leading_zeros(&(*n as u32).to_be_bytes()))
            }
            DataValue::Uint64(n) => buf.extend_from_slice(strip_leading_zeros(&n.to_be_bytes())),
            DataValue::Uint128(n) => buf.extend_from_slice(strip_leading_zeros(&n.to_be_bytes())),
            DataValue::Float(f) => buf.extend_from_slice(&f.to_be_bytes()),
            DataValue::Map(_) | DataValue::Array(_) | DataValue::Bool(_) => {}
        }
        Ok(())
    }

    /// Look up a key if this value is a map
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        match self {
            DataValue::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Borrow the string if this value is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Widen any unsigned integer variant to u64
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DataValue::Uint16(n) => Some(*n as u64),
            DataValue::Uint32(n) => Some(*n as u64),
            DataValue::Uint64(n) => Some(*n),
            DataValue::Uint128(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }
}

/// Equality of canonical encodings: floats compare by bit pattern and maps
/// ignore insertion order.
impl PartialEq for DataValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DataValue::String(a), DataValue::String(b)) => a == b,
            (DataValue::Double(a), DataValue::Double(b)) => a.to_bits() == b.to_bits(),
            (DataValue::Bytes(a), DataValue::Bytes(b)) => a == b,
            (DataValue::Uint16(a), DataValue::Uint16(b)) => a == b,
            (DataValue::Uint32(a), DataValue::Uint32(b)) => a == b,
            (DataValue::Map(a), DataValue::Map(b)) => a == b,
            (DataValue::Int32(a), DataValue::Int32(b)) => a == b,
            (DataValue::Uint64(a), DataValue::Uint64(b)) => a == b,
            (DataValue::Uint128(a), DataValue::Uint128(b)) => a == b,
            (DataValue::Array(a), DataValue::Array(b)) => a == b,
            (DataValue::Bool(a), DataValue::Bool(b)) => a == b,
            (DataValue::Float(a), DataValue::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for DataValue {}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<&str> for DataValue {
    fn from(s: &str) -> Self {
        DataValue::String(s.to_string())
    }
}

impl From<String> for DataValue {
    fn from(s: String) -> Self {
        DataValue::String(s)
    }
}

impl From<bool> for DataValue {
    fn from(b: bool) -> Self {
        DataValue::Bool(b)
    }
}

impl From<u16> for DataValue {
    fn from(n: u16) -> Self {
        DataValue::Uint16(n)
    }
}

impl From<u32> for DataValue {
    fn from(n: u32) -> Self {
        DataValue::Uint32(n)
    }
}

impl From<u64> for DataValue {
    fn from(n: u64) -> Self {
        DataValue::Uint64(n)
    }
}

impl From<u128> for DataValue {
    fn from(n: u128) -> Self {
        DataValue::Uint128(n)
    }
}

impl From<i32> for DataValue {
    fn from(n: i32) -> Self {
        DataValue::Int32(n)
    }
}

impl From<f32> for DataValue {
    fn from(f: f32) -> Self {
        DataValue::Float(f)
    }
}

impl From<f64> for DataValue {
    fn from(d: f64) -> Self {
        DataValue::Double(d)
    }
}

impl From<Vec<DataValue>> for DataValue {
    fn from(items: Vec<DataValue>) -> Self {
        DataValue::Array(items)
    }
}

impl From<HashMap<String, DataValue>> for DataValue {
    fn from(map: HashMap<String, DataValue>) -> Self {
        DataValue::Map(map)
    }
}

impl<K: Into<String>, V: Into<DataValue>, const N: usize> From<[(K, V); N]> for DataValue {
    fn from(pairs: [(K, V); N]) -> Self {
        DataValue::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Map entries in ascending key order
pub(crate) fn sorted_entries(map: &HashMap<String, DataValue>) -> Vec<(&String, &DataValue)> {
    let mut pairs: Vec<_> = map.iter().collect();
    pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));
    pairs
}

/// Write a string value (used for map keys)
pub(crate) fn write_string(s: &str, buf: &mut Vec<u8>) -> Result<()> {
    write_control(type_id::STRING, s.len(), buf)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Content key of a string, identical to `DataValue::String(s).content_key()`
pub(crate) fn string_content_key(s: &str) -> Result<ContentKey> {
    let mut buf = Vec::with_capacity(s.len() + 4);
    write_string(s, &mut buf)?;
    Ok(xxh3_128(&buf))
}

/// Encode control byte(s) for a type and size
pub(crate) fn write_control(type_id: u8, size: usize, buffer: &mut Vec<u8>) -> Result<()> {
    if size > MAX_ENCODED_SIZE {
        return Err(WriterError::encoding_limit(format!(
            "size {} exceeds the maximum encodable size {}",
            size, MAX_ENCODED_SIZE
        )));
    }

    let inline_type = if type_id > 7 { 0 } else { type_id };
    let type_bits = inline_type << 5;

    let tier = size_tier(size);
    buffer.push(type_bits | tier);
    if type_id > 7 {
        buffer.push(type_id - 7);
    }

    match tier {
        29 => buffer.push((size - 29) as u8),
        30 => buffer.extend_from_slice(&((size - 285) as u16).to_be_bytes()),
        31 => buffer.extend_from_slice(&((size - 65_821) as u32).to_be_bytes()[1..]),
        _ => {}
    }
    Ok(())
}

/// Number of control bytes for a type and size
pub(crate) fn control_len(type_id: u8, size: usize) -> usize {
    let extended = usize::from(type_id > 7);
    let extra = match size_tier(size) {
        29 => 1,
        30 => 2,
        31 => 3,
        _ => 0,
    };
    1 + extended + extra
}

fn size_tier(size: usize) -> u8 {
    if size < 29 {
        size as u8
    } else if size < 285 {
        29
    } else if size < 65_821 {
        30
    } else {
        31
    }
}

/// Encoded length of a pointer to `offset`
pub(crate) fn pointer_len(offset: u32) -> usize {
    if offset < 0x800 {
        2
    } else if offset < 0x80800 {
        3
    } else if offset < 0x8080800 {
        4
    } else {
        5
    }
}

/// Append a pointer to a data-section-relative offset
pub(crate) fn write_pointer(offset: u32, buffer: &mut Vec<u8>) {
    let ctrl = type_id::POINTER << 5;
    match pointer_len(offset) {
        2 => {
            buffer.push(ctrl | ((offset >> 8) & 0x7) as u8);
            buffer.push(offset as u8);
        }
        3 => {
            let adjusted = offset - 0x800;
            buffer.push(ctrl | 0x08 | ((adjusted >> 16) & 0x7) as u8);
            buffer.extend_from_slice(&adjusted.to_be_bytes()[2..]);
        }
        4 => {
            let adjusted = offset - 0x80800;
            buffer.push(ctrl | 0x10 | ((adjusted >> 24) & 0x7) as u8);
            buffer.extend_from_slice(&adjusted.to_be_bytes()[1..]);
        }
        _ => {
            buffer.push(ctrl | 0x18);
            buffer.extend_from_slice(&offset.to_be_bytes());
        }
    }
}

fn significant_bytes(n: u128) -> usize {
    (128 - n.leading_zeros() as usize).div_ceil(8)
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

// JSON bridge used by source readers and the CLI

impl DataValue {
    /// Convert a JSON document into a data value
    ///
    /// Non-negative integers become `Uint32` (or `Uint64` when larger),
    /// negative integers `Int32` when they fit, everything else `Double`.
    /// JSON `null` has no MMDB representation.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Null => Err(WriterError::Format(
                "JSON null has no MMDB representation".to_string(),
            )),
            serde_json::Value::Bool(b) => Ok(DataValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Ok(match u32::try_from(u) {
                        Ok(small) => DataValue::Uint32(small),
                        Err(_) => DataValue::Uint64(u),
                    })
                } else if let Some(i) = n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                    Ok(DataValue::Int32(i))
                } else {
                    n.as_f64().map(DataValue::Double).ok_or_else(|| {
                        WriterError::Format(format!("Unsupported JSON number {}", n))
                    })
                }
            }
            serde_json::Value::String(s) => Ok(DataValue::String(s.clone())),
            serde_json::Value::Array(arr) => Ok(DataValue::Array(
                arr.iter().map(DataValue::from_json).collect::<Result<_>>()?,
            )),
            serde_json::Value::Object(obj) => Ok(DataValue::Map(
                obj.iter()
                    .map(|(k, v)| Ok((k.clone(), DataValue::from_json(v)?)))
                    .collect::<Result<_>>()?,
            )),
        }
    }

    /// Convert into JSON for display
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            DataValue::String(s) => json!(s),
            DataValue::Double(d) => json!(d),
            DataValue::Bytes(b) => json!(b),
            DataValue::Uint16(u) => json!(u),
            DataValue::Uint32(u) => json!(u),
            DataValue::Uint64(u) => json!(u),
            DataValue::Uint128(u) => json!(u.to_string()),
            DataValue::Int32(i) => json!(i),
            DataValue::Bool(b) => json!(b),
            DataValue::Float(f) => json!(f),
            DataValue::Map(entries) => {
                let mut map = serde_json::Map::new();
                for (k, v) in sorted_entries(entries) {
                    map.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
            DataValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(DataValue::to_json).collect())
            }
        }
    }
}

/// Data section decoder
///
/// Decodes values from an encoded data section buffer. Pointers are
/// resolved relative to the start of `buffer`.
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder over a data (or metadata) section
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Decode a value at the given section-relative offset
    pub fn decode(&self, offset: usize) -> std::result::Result<DataValue, &'static str> {
        let mut cursor = offset;
        self.decode_at(&mut cursor, 0)
    }

    fn decode_at(
        &self,
        cursor: &mut usize,
        depth: usize,
    ) -> std::result::Result<DataValue, &'static str> {
        if depth > MAX_DECODE_DEPTH {
            return Err("Data nesting too deep");
        }

        let ctrl = self.read_byte(cursor)?;
        let mut type_num = ctrl >> 5;

        if type_num == type_id::POINTER {
            let target = self.decode_pointer(cursor, ctrl)? as usize;
            match self.buffer.get(target) {
                Some(b) if b >> 5 == type_id::POINTER => return Err("Pointer to pointer"),
                Some(_) => {}
                None => return Err("Pointer out of bounds"),
            }
            let mut target_cursor = target;
            return self.decode_at(&mut target_cursor, depth + 1);
        }

        if type_num == type_id::EXTENDED {
            let ext = self.read_byte(cursor)?;
            if ext == 0 || ext > 8 {
                return Err("Invalid extended type");
            }
            type_num = ext + 7;
        }

        let size = self.decode_size(cursor, ctrl & 0x1F)?;

        match type_num {
            type_id::STRING => {
                let bytes = self.take(cursor, size)?;
                let s = std::str::from_utf8(bytes).map_err(|_| "Invalid UTF-8")?;
                Ok(DataValue::String(s.to_string()))
            }
            type_id::DOUBLE => {
                if size != 8 {
                    return Err("Invalid double size");
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(self.take(cursor, 8)?);
                Ok(DataValue::Double(f64::from_be_bytes(bytes)))
            }
            type_id::BYTES => Ok(DataValue::Bytes(self.take(cursor, size)?.to_vec())),
            type_id::UINT16 => Ok(DataValue::Uint16(self.read_uint(cursor, size, 2)? as u16)),
            type_id::UINT32 => Ok(DataValue::Uint32(self.read_uint(cursor, size, 4)? as u32)),
            type_id::MAP => {
                let mut map = HashMap::with_capacity(size.min(1024));
                for _ in 0..size {
                    let key = match self.decode_at(cursor, depth + 1)? {
                        DataValue::String(s) => s,
                        _ => return Err("Map key must be string"),
                    };
                    let value = self.decode_at(cursor, depth + 1)?;
                    map.insert(key, value);
                }
                Ok(DataValue::Map(map))
            }
            type_id::INT32 => Ok(DataValue::Int32(self.read_uint(cursor, size, 4)? as u32 as i32)),
            type_id::UINT64 => Ok(DataValue::Uint64(self.read_uint(cursor, size, 8)? as u64)),
            type_id::UINT128 => Ok(DataValue::Uint128(self.read_uint(cursor, size, 16)?)),
            type_id::ARRAY => {
                let mut array = Vec::with_capacity(size.min(1024));
                for _ in 0..size {
                    array.push(self.decode_at(cursor, depth + 1)?);
                }
                Ok(DataValue::Array(array))
            }
            type_id::BOOL => match size {
                0 => Ok(DataValue::Bool(false)),
                1 => Ok(DataValue::Bool(true)),
                _ => Err("Invalid bool size"),
            },
            type_id::FLOAT => {
                if size != 4 {
                    return Err("Invalid float size");
                }
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(self.take(cursor, 4)?);
                Ok(DataValue::Float(f32::from_be_bytes(bytes)))
            }
            _ => Err("Unsupported data type"),
        }
    }

    fn decode_pointer(&self, cursor: &mut usize, ctrl: u8) -> std::result::Result<u32, &'static str> {
        let size_bits = (ctrl >> 3) & 0x3;
        let high = (ctrl & 0x7) as u32;
        let bytes = self.take(cursor, size_bits as usize + 1)?;
        let offset = match size_bits {
            0 => (high << 8) | bytes[0] as u32,
            1 => 0x800 + ((high << 16) | (bytes[0] as u32) << 8 | bytes[1] as u32),
            2 => {
                0x80800
                    + ((high << 24)
                        | (bytes[0] as u32) << 16
                        | (bytes[1] as u32) << 8
                        | bytes[2] as u32)
            }
            _ => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        };
        Ok(offset)
    }

    fn decode_size(&self, cursor: &mut usize, size_bits: u8) -> std::result::Result<usize, &'static str> {
        match size_bits {
            0..=28 => Ok(size_bits as usize),
            29 => Ok(29 + self.read_byte(cursor)? as usize),
            30 => {
                let b = self.take(cursor, 2)?;
                Ok(285 + u16::from_be_bytes([b[0], b[1]]) as usize)
            }
            _ => {
                let b = self.take(cursor, 3)?;
                Ok(65_821 + u32::from_be_bytes([0, b[0], b[1], b[2]]) as usize)
            }
        }
    }

    fn read_uint(
        &self,
        cursor: &mut usize,
        size: usize,
        max: usize,
    ) -> std::result::Result<u128, &'static str> {
        if size > max {
            return Err("Integer size exceeds type width");
        }
        Ok(self
            .take(cursor, size)?
            .iter()
            .fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }

    fn read_byte(&self, cursor: &mut usize) -> std::result::Result<u8, &'static str> {
        let b = *self.buffer.get(*cursor).ok_or("Cursor out of bounds")?;
        *cursor += 1;
        Ok(b)
    }

    fn take(&self, cursor: &mut usize, len: usize) -> std::result::Result<&'a [u8], &'static str> {
        let end = cursor.checked_add(len).ok_or("Length overflow")?;
        let bytes = self
            .buffer
            .get(*cursor..end)
            .ok_or("Data out of bounds")?;
        *cursor = end;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(value: &DataValue) -> Vec<u8> {
        value.to_canonical_bytes().unwrap()
    }

    #[test]
    fn test_integers_strip_leading_zeros() {
        assert_eq!(canonical(&DataValue::Uint32(0)), vec![0xC0]);
        assert_eq!(canonical(&DataValue::Uint32(0x1234)), vec![0xC2, 0x12, 0x34]);
        assert_eq!(canonical(&DataValue::Uint16(0xFF)), vec![0xA1, 0xFF]);
        // Uint64 is extended type 9: control byte carries size, next byte 9 - 7
        assert_eq!(canonical(&DataValue::Uint64(1)), vec![0x01, 0x02, 0x01]);
        // Negative Int32 keeps all four bytes
        assert_eq!(
            canonical(&DataValue::Int32(-1)),
            vec![0x04, 0x01, 0xFF, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(
            canonical(&DataValue::Uint128(1 << 64)),
            vec![0x09, 0x03, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_fixed_width_and_bool_encodings() {
        assert_eq!(canonical(&DataValue::Bool(true)), vec![0x01, 0x07]);
        assert_eq!(canonical(&DataValue::Bool(false)), vec![0x00, 0x07]);
        assert_eq!(
            canonical(&DataValue::Float(1.0)),
            vec![0x04, 0x08, 0x3F, 0x80, 0x00, 0x00]
        );
        let double = canonical(&DataValue::Double(0.0));
        assert_eq!(double.len(), 9);
        assert_eq!(double[0], 0x68);
    }

    #[test]
    fn test_size_tiers() {
        for (len, header) in [(28usize, 1usize), (29, 2), (284, 2), (285, 3), (65_820, 3), (65_821, 4)] {
            let value = DataValue::Bytes(vec![0xAB; len]);
            let bytes = canonical(&value);
            assert_eq!(bytes.len(), len + header, "length {}", len);
            assert_eq!(value.encoded_len(), bytes.len());
        }
    }

    #[test]
    fn test_size_limit_is_an_error() {
        let mut buf = Vec::new();
        assert!(write_control(type_id::BYTES, MAX_ENCODED_SIZE, &mut buf).is_ok());
        let err = write_control(type_id::BYTES, MAX_ENCODED_SIZE + 1, &mut buf).unwrap_err();
        assert!(matches!(err, WriterError::EncodingLimit(_)));
    }

    #[test]
    fn test_map_encoding_is_order_independent() {
        let mut a = HashMap::new();
        a.insert("zeta".to_string(), DataValue::Uint16(1));
        a.insert("alpha".to_string(), DataValue::from("x"));
        a.insert("mid".to_string(), DataValue::Bool(true));

        let mut b = HashMap::new();
        b.insert("mid".to_string(), DataValue::Bool(true));
        b.insert("zeta".to_string(), DataValue::Uint16(1));
        b.insert("alpha".to_string(), DataValue::from("x"));

        let a = DataValue::Map(a);
        let b = DataValue::Map(b);
        assert_eq!(canonical(&a), canonical(&b));
        assert_eq!(a.content_key().unwrap(), b.content_key().unwrap());

        // First key written must be "alpha"
        let bytes = canonical(&a);
        assert_eq!(bytes[0], 0xE3);
        assert_eq!(&bytes[1..7], b"\x45alpha");
    }

    #[test]
    fn test_equality_follows_canonical_bytes() {
        assert_eq!(DataValue::Double(f64::NAN), DataValue::Double(f64::NAN));
        assert_ne!(DataValue::Double(0.0), DataValue::Double(-0.0));
        assert_ne!(DataValue::Uint16(5), DataValue::Uint32(5));
    }

    #[test]
    fn test_pointer_lengths() {
        for (offset, len) in [(0u32, 2usize), (2047, 2), (2048, 3), (526_335, 3), (526_336, 4), (134_744_063, 4), (134_744_064, 5), (u32::MAX, 5)] {
            let mut buf = Vec::new();
            write_pointer(offset, &mut buf);
            assert_eq!(buf.len(), len, "offset {}", offset);
            assert_eq!(pointer_len(offset), len);

            let decoder = DataDecoder::new(&buf);
            let mut cursor = 1;
            assert_eq!(decoder.decode_pointer(&mut cursor, buf[0]).unwrap(), offset);
        }
    }

    #[test]
    fn test_decode_all_types() {
        let values = vec![
            DataValue::from("hello"),
            DataValue::Uint16(12345),
            DataValue::Uint32(0xDEADBEEF),
            DataValue::Uint64(0x123456789ABCDEF0),
            DataValue::Uint128(0x0123456789ABCDEF0123456789ABCDEF),
            DataValue::Int32(-42),
            DataValue::Int32(7),
            DataValue::Double(3.14159265359),
            DataValue::Float(2.71828),
            DataValue::Bool(true),
            DataValue::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF]),
        ];

        for expected in values {
            let bytes = canonical(&expected);
            let decoded = DataDecoder::new(&bytes).decode(0).unwrap();
            assert_eq!(decoded, expected);
        }
    }

    #[test]
    fn test_decode_nested_structure() {
        let value = DataValue::from([
            ("threat_level", DataValue::from("high")),
            ("confidence", DataValue::Float(0.98)),
            (
                "indicators",
                DataValue::from([("ip_count", 42u32), ("domain_count", 15u32)]),
            ),
            (
                "tags",
                DataValue::Array(vec![DataValue::from("botnet"), DataValue::from("c2")]),
            ),
        ]);
        let bytes = canonical(&value);
        assert_eq!(DataDecoder::new(&bytes).decode(0).unwrap(), value);
    }

    #[test]
    fn test_decode_follows_pointers() {
        // "abc" at 0, then an array holding a pointer back to it
        let mut buf = canonical(&DataValue::from("abc"));
        let array_offset = buf.len();
        write_control(type_id::ARRAY, 1, &mut buf).unwrap();
        write_pointer(0, &mut buf);

        let decoded = DataDecoder::new(&buf).decode(array_offset).unwrap();
        assert_eq!(decoded, DataValue::Array(vec![DataValue::from("abc")]));
    }

    #[test]
    fn test_decode_rejects_truncated_input() {
        let bytes = canonical(&DataValue::from("truncated string"));
        let decoder = DataDecoder::new(&bytes[..5]);
        assert!(decoder.decode(0).is_err());
        assert!(DataDecoder::new(&[]).decode(0).is_err());
    }

    #[test]
    fn test_json_bridge() {
        let json: serde_json::Value = serde_json::json!({
            "city": "Berlin",
            "asn": 3320,
            "offset": -5,
            "big": 5_000_000_000u64,
            "score": 0.5,
            "tags": ["a", true],
        });
        let value = DataValue::from_json(&json).unwrap();
        assert_eq!(value.get("city"), Some(&DataValue::from("Berlin")));
        assert_eq!(value.get("asn"), Some(&DataValue::Uint32(3320)));
        assert_eq!(value.get("offset"), Some(&DataValue::Int32(-5)));
        assert_eq!(value.get("big"), Some(&DataValue::Uint64(5_000_000_000)));
        assert_eq!(value.get("score"), Some(&DataValue::Double(0.5)));
        assert_eq!(value.to_json(), json);

        assert!(DataValue::from_json(&serde_json::Value::Null).is_err());
    }
}
