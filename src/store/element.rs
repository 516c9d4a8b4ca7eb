//! Typed elements and scalar attributes stored in the container.
//!
//! Every array carries an [`ElementType`] tag in its header; reading with a
//! Rust type whose [`Element::TYPE`] differs is a type mismatch. Encoding is
//! little-endian; variable-size elements carry a `u32` length prefix.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;

use crate::util::{StoreError, StoreResult};

/// Element type of an array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementType {
    /// Unsigned 16-bit integer
    Uint16 = 3,
    /// Signed 16-bit integer
    Int16 = 4,
    /// Unsigned 64-bit integer
    Uint64 = 7,
    /// 64-bit floating point
    Float64 = 11,
    /// UTF-8 string (variable size)
    String = 12,
    /// Multipath component record: type, id, delay, real, imag
    Component = 64,
    /// Component category record: id, name (variable size)
    ComponentType = 65,
}

impl ElementType {
    /// Parse from the header tag.
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            3 => Some(Self::Uint16),
            4 => Some(Self::Int16),
            7 => Some(Self::Uint64),
            11 => Some(Self::Float64),
            12 => Some(Self::String),
            64 => Some(Self::Component),
            65 => Some(Self::ComponentType),
            _ => None,
        }
    }

    /// Encoded size of one element, `None` for variable-size types.
    #[inline]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Uint16 | Self::Int16 => Some(2),
            Self::Uint64 | Self::Float64 => Some(8),
            Self::Component => Some(2 + 8 + 8 + 8 + 8),
            Self::String | Self::ComponentType => None,
        }
    }

    /// Returns the name of this type as a string.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uint16 => "uint16_t",
            Self::Int16 => "int16_t",
            Self::Uint64 => "uint64_t",
            Self::Float64 => "float64_t",
            Self::String => "string",
            Self::Component => "component",
            Self::ComponentType => "component_type",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value that can be stored as an array element.
pub trait Element: Sized + Clone + Send + Sync {
    /// Stored element type.
    const TYPE: ElementType;

    /// Append the encoded element to `buf`.
    fn encode(&self, buf: &mut Vec<u8>);

    /// Decode one element from the front of `buf`, advancing it.
    fn decode(buf: &mut &[u8]) -> StoreResult<Self>;
}

fn truncated(_: std::io::Error) -> StoreError {
    StoreError::corrupt("element data truncated")
}

impl Element for u16 {
    const TYPE: ElementType = ElementType::Uint16;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &mut &[u8]) -> StoreResult<Self> {
        buf.read_u16::<LittleEndian>().map_err(truncated)
    }
}

impl Element for i16 {
    const TYPE: ElementType = ElementType::Int16;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &mut &[u8]) -> StoreResult<Self> {
        buf.read_i16::<LittleEndian>().map_err(truncated)
    }
}

impl Element for u64 {
    const TYPE: ElementType = ElementType::Uint64;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &mut &[u8]) -> StoreResult<Self> {
        buf.read_u64::<LittleEndian>().map_err(truncated)
    }
}

impl Element for f64 {
    const TYPE: ElementType = ElementType::Float64;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &mut &[u8]) -> StoreResult<Self> {
        buf.read_f64::<LittleEndian>().map_err(truncated)
    }
}

impl Element for String {
    const TYPE: ElementType = ElementType::String;

    fn encode(&self, buf: &mut Vec<u8>) {
        encode_str(self, buf);
    }

    fn decode(buf: &mut &[u8]) -> StoreResult<Self> {
        decode_str(buf)
    }
}

pub(crate) fn encode_str(s: &str, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

pub(crate) fn decode_str(buf: &mut &[u8]) -> StoreResult<String> {
    let len = buf.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    if buf.len() < len {
        return Err(StoreError::corrupt("string data truncated"));
    }
    let (bytes, rest) = buf.split_at(len);
    *buf = rest;
    Ok(String::from_utf8(bytes.to_vec())?)
}

/// On-disk layout of one multipath component.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ComponentRecord {
    pub kind: u16,
    pub id: u64,
    pub delay: f64,
    pub real: f64,
    pub imag: f64,
}

impl Element for ComponentRecord {
    const TYPE: ElementType = ElementType::Component;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.delay.to_le_bytes());
        buf.extend_from_slice(&self.real.to_le_bytes());
        buf.extend_from_slice(&self.imag.to_le_bytes());
    }

    fn decode(buf: &mut &[u8]) -> StoreResult<Self> {
        Ok(Self {
            kind: buf.read_u16::<LittleEndian>().map_err(truncated)?,
            id: buf.read_u64::<LittleEndian>().map_err(truncated)?,
            delay: buf.read_f64::<LittleEndian>().map_err(truncated)?,
            real: buf.read_f64::<LittleEndian>().map_err(truncated)?,
            imag: buf.read_f64::<LittleEndian>().map_err(truncated)?,
        })
    }
}

/// On-disk layout of one component category (id -> name).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComponentTypeRecord {
    pub id: u16,
    pub name: String,
}

impl Element for ComponentTypeRecord {
    const TYPE: ElementType = ElementType::ComponentType;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.id.to_le_bytes());
        encode_str(&self.name, buf);
    }

    fn decode(buf: &mut &[u8]) -> StoreResult<Self> {
        let id = buf.read_u16::<LittleEndian>().map_err(truncated)?;
        let name = decode_str(buf)?;
        Ok(Self { id, name })
    }
}

/// Scalar attribute value attached to a group.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    Float64(f64),
    Uint64(u64),
    Text(String),
}

impl ScalarValue {
    const TAG_FLOAT64: u8 = 0;
    const TAG_UINT64: u8 = 1;
    const TAG_TEXT: u8 = 2;

    /// Type name used in mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Float64(_) => "float64_t",
            Self::Uint64(_) => "uint64_t",
            Self::Text(_) => "string",
        }
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Float64(v) => {
                buf.push(Self::TAG_FLOAT64);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Self::Uint64(v) => {
                buf.push(Self::TAG_UINT64);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Self::Text(s) => {
                buf.push(Self::TAG_TEXT);
                encode_str(s, buf);
            }
        }
    }

    pub(crate) fn decode(buf: &mut &[u8]) -> StoreResult<Self> {
        match buf.read_u8().map_err(truncated)? {
            Self::TAG_FLOAT64 => Ok(Self::Float64(
                buf.read_f64::<LittleEndian>().map_err(truncated)?,
            )),
            Self::TAG_UINT64 => Ok(Self::Uint64(
                buf.read_u64::<LittleEndian>().map_err(truncated)?,
            )),
            Self::TAG_TEXT => Ok(Self::Text(decode_str(buf)?)),
            tag => Err(StoreError::corrupt(format!("unknown scalar tag {}", tag))),
        }
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<u64> for ScalarValue {
    fn from(v: u64) -> Self {
        Self::Uint64(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Rust types readable from a [`ScalarValue`].
pub trait ScalarType: Sized {
    /// Name used in mismatch errors.
    const NAME: &'static str;

    /// Extract from a stored value, `None` on a type mismatch.
    fn from_value(value: &ScalarValue) -> Option<Self>;
}

impl ScalarType for f64 {
    const NAME: &'static str = "float64_t";

    fn from_value(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Float64(v) => Some(*v),
            _ => None,
        }
    }
}

impl ScalarType for u64 {
    const NAME: &'static str = "uint64_t";

    fn from_value(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Uint64(v) => Some(*v),
            _ => None,
        }
    }
}

impl ScalarType for String {
    const NAME: &'static str = "string";

    fn from_value(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Encode a slice of elements into one contiguous buffer.
pub(crate) fn encode_all<T: Element>(data: &[T]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() * T::TYPE.fixed_size().unwrap_or(16));
    for item in data {
        item.encode(&mut buf);
    }
    buf
}

/// Decode exactly `count` elements from `buf`.
pub(crate) fn decode_n<T: Element>(mut buf: &[u8], count: usize) -> StoreResult<Vec<T>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(T::decode(&mut buf)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_tags() {
        for ty in [
            ElementType::Uint16,
            ElementType::Int16,
            ElementType::Uint64,
            ElementType::Float64,
            ElementType::String,
            ElementType::Component,
            ElementType::ComponentType,
        ] {
            assert_eq!(ElementType::from_u8(ty as u8), Some(ty));
        }
        assert_eq!(ElementType::from_u8(200), None);
    }

    #[test]
    fn test_component_record_size() {
        let rec = ComponentRecord {
            kind: 3,
            id: 42,
            delay: 1.5e-6,
            real: 0.25,
            imag: -0.5,
        };
        let mut buf = Vec::new();
        rec.encode(&mut buf);
        assert_eq!(Some(buf.len()), ElementType::Component.fixed_size());

        let mut slice = buf.as_slice();
        assert_eq!(ComponentRecord::decode(&mut slice).unwrap(), rec);
        assert!(slice.is_empty());
    }

    #[test]
    fn test_truncated_string() {
        let mut buf = Vec::new();
        encode_str("line-of-sight", &mut buf);
        buf.truncate(buf.len() - 3);
        let mut slice = buf.as_slice();
        assert!(matches!(String::decode(&mut slice), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_scalar_type_extraction() {
        let v = ScalarValue::from(299_792_458.0);
        assert_eq!(f64::from_value(&v), Some(299_792_458.0));
        assert_eq!(u64::from_value(&v), None);
        assert_eq!(v.type_name(), "float64_t");
    }
}
