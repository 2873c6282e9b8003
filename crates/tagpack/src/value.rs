//! The polymorphic value model.
//!
//! A decoded value is a tree of scalars, strings, byte runs, typed
//! arrays, lists, and ordered maps. Arrays keep their payload as a raw
//! row-major buffer in host byte order plus an element tag and shape,
//! so large payloads move through the codec without per-element boxing.

use crate::error::Error;
use crate::error::Result;
use crate::types::Tag;
use crate::types::f16_to_f32;

/// A decoded map key.
///
/// The writer coerces every key to its string form; these variants exist
/// because foreign writers may emit numeric or array-typed keys, which
/// decode to integers, floats, and nested tuples.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Str(String),
    Int(i128),
    Float(f64),
    Tuple(Vec<Key>),
}

impl Key {
    /// The string form the writer emits for this key.
    pub fn coerced(&self) -> String {
        match self {
            Key::Str(s) => s.clone(),
            other => format!("{}", other),
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Str(s) => write!(f, "{}", s),
            Key::Int(v) => write!(f, "{}", v),
            Key::Float(v) => write!(f, "{}", v),
            Key::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i128> for Key {
    fn from(v: i128) -> Self {
        Key::Int(v)
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v.into())
    }
}

/// One value of the format's logical universe.
///
/// Integers are held as `i128` so the whole encodable range
/// `[-2^63, 2^64-1]` round-trips through a single variant; the writer
/// picks the narrowest tag that fits. Maps preserve file order;
/// duplicate keys are resolved last-wins by the reader.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Array(Array),
    List(Vec<Value>),
    Map(Vec<(Key, Value)>),
}

impl Value {
    /// Map lookup by key. `None` for missing keys and non-map values.
    pub fn get(&self, key: impl Into<Key>) -> Option<&Value> {
        let key = key.into();
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// List lookup by position. `None` for non-lists and misses.
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self {
            Value::List(items) => items.get(index),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v.into())
    }
}

impl From<i128> for Value {
    fn from(v: i128) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

/// Replaces an existing entry for `key` or appends a new one.
pub(crate) fn insert_entry(entries: &mut Vec<(Key, Value)>, key: Key, value: Value) {
    if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
        slot.1 = value;
    } else {
        entries.push((key, value));
    }
}

/// A homogeneous n-dimensional array: element tag, shape, and a raw
/// row-major data buffer in host byte order.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    tag: Tag,
    shape: Vec<usize>,
    data: Vec<u8>,
}

macro_rules! array_scalar_impls {
    ($(($from:ident, $as:ident, $ty:ty, $tag:expr);)+) => {
        $(
            /// Builds an array of this element type from host-order values.
            pub fn $from(values: &[$ty], shape: &[usize]) -> Result<Array> {
                let mut data = Vec::with_capacity(values.len() * size_of::<$ty>());
                for v in values {
                    data.extend_from_slice(&v.to_ne_bytes());
                }
                Array::new($tag, shape.to_vec(), data)
            }

            /// Reads the buffer back as host-order values of this type.
            pub fn $as(&self) -> Result<Vec<$ty>> {
                if self.tag != $tag {
                    return Err(Error::DtypeMismatch { expected: $tag, found: self.tag });
                }
                Ok(self
                    .data
                    .chunks_exact(size_of::<$ty>())
                    .map(|c| <$ty>::from_ne_bytes(c.try_into().unwrap()))
                    .collect())
            }
        )+
    };
}

impl Array {
    /// Wraps a raw buffer. The buffer length must equal the product of
    /// the shape times the element size.
    pub fn new(tag: Tag, shape: Vec<usize>, data: Vec<u8>) -> Result<Array> {
        let elems: usize = shape.iter().product();
        let expected = elems
            .checked_mul(tag.elem_size())
            .ok_or(Error::ValueTooLarge)?;
        if data.len() != expected {
            return Err(Error::ShapeMismatch {
                expected: shape,
                found: vec![data.len() / tag.elem_size().max(1)],
            });
        }
        Ok(Array { tag, shape, data })
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    array_scalar_impls! {
        (from_i8, as_i8, i8, Tag::I8);
        (from_i16, as_i16, i16, Tag::I16);
        (from_i32, as_i32, i32, Tag::I32);
        (from_i64, as_i64, i64, Tag::I64);
        (from_u8, as_u8, u8, Tag::U8);
        (from_u16, as_u16, u16, Tag::U16);
        (from_u32, as_u32, u32, Tag::U32);
        (from_u64, as_u64, u64, Tag::U64);
        (from_f32, as_f32, f32, Tag::F32);
        (from_f64, as_f64, f64, Tag::F64);
    }

    /// Builds a boolean array. Elements encode as `0xFF`/`0x00`.
    pub fn from_bool(values: &[bool], shape: &[usize]) -> Result<Array> {
        let data = values.iter().map(|&b| if b { 0xFF } else { 0x00 }).collect();
        Array::new(Tag::Bool, shape.to_vec(), data)
    }

    /// Reads a boolean array; any nonzero byte is `true`.
    pub fn as_bool(&self) -> Result<Vec<bool>> {
        if self.tag != Tag::Bool {
            return Err(Error::DtypeMismatch { expected: Tag::Bool, found: self.tag });
        }
        Ok(self.data.iter().map(|&b| b != 0).collect())
    }

    /// Reads a binary16 array, widening to f32.
    pub fn as_f16(&self) -> Result<Vec<f32>> {
        if self.tag != Tag::F16 {
            return Err(Error::DtypeMismatch { expected: Tag::F16, found: self.tag });
        }
        Ok(self
            .data
            .chunks_exact(2)
            .map(|c| f16_to_f32(u16::from_ne_bytes([c[0], c[1]])))
            .collect())
    }

    /// Builds a fixed-width UTF-8 string array. `shape` excludes the
    /// width axis; each string is zero-padded to `width` bytes. The
    /// stored shape carries the width as its last dimension.
    pub fn from_fixed_utf8(strings: &[&str], shape: &[usize], width: usize) -> Result<Array> {
        let mut data = Vec::with_capacity(strings.len() * width);
        for s in strings {
            let bytes = s.as_bytes();
            if bytes.len() > width {
                return Err(Error::ValueTooLarge);
            }
            data.extend_from_slice(bytes);
            data.resize(data.len() + width - bytes.len(), 0);
        }
        let mut full_shape = shape.to_vec();
        full_shape.push(width);
        Array::new(Tag::Utf8, full_shape, data)
    }

    /// Reads one fixed-width string by flat position, trailing padding
    /// stripped. Only meaningful for rank >= 2 `Utf8` arrays.
    pub fn fixed_utf8_at(&self, index: usize) -> Result<String> {
        if self.tag != Tag::Utf8 || self.shape.len() < 2 {
            return Err(Error::DtypeMismatch { expected: Tag::Utf8, found: self.tag });
        }
        let width = self.shape[self.shape.len() - 1];
        let count = self.elem_count() / width.max(1);
        if index >= count {
            return Err(Error::IndexOutOfRange { index: index as i64, len: count });
        }
        let chunk = &self.data[index * width..(index + 1) * width];
        let trimmed = chunk.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        String::from_utf8(chunk[..trimmed].to_vec())
            .map_err(|_| Error::invalid_data("fixed-width string is not valid UTF-8"))
    }
}
