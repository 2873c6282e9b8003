//! Stream writer for the tagpack grammar.

use std::io::Write;

use byteordered::Endian;
use byteordered::Endianness;

use crate::error::Error;
use crate::error::Result;
use crate::length::write_length;
use crate::types::BOM_VALUE;
use crate::types::Tag;
use crate::types::host_order;
use crate::types::swap_bytes;
use crate::value::Array;
use crate::value::Key;
use crate::value::Value;

/// Emits values as a well-formed byte stream in the configured byte
/// order. The writer is append-only; container nesting is the caller's
/// concern (see the file layer's scope stack for incremental use).
pub struct Writer<W> {
    out: W,
    endian: Endianness,
}

impl<W: Write> Writer<W> {
    pub fn new(out: W, endian: Endianness) -> Self {
        Writer { out, endian }
    }

    pub fn endian(&self) -> Endianness {
        self.endian
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Emits the byte-order mark: the canonical `*j` footnote carrying
    /// the int16 1234 in the file's byte order.
    pub fn write_bom(&mut self) -> Result<()> {
        self.out.write_all(b"*j")?;
        self.endian.write_i16(&mut self.out, BOM_VALUE)?;
        Ok(())
    }

    /// Emits one complete value, recursing through containers.
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => Ok(self.out.write_all(b"n")?),
            Value::Bool(true) => Ok(self.out.write_all(b"T")?),
            Value::Bool(false) => Ok(self.out.write_all(b"F")?),
            Value::Int(v) => self.write_int(*v),
            Value::Float(v) => {
                self.out.write_all(b"d")?;
                self.endian.write_f64(&mut self.out, *v)?;
                Ok(())
            }
            Value::Str(s) => self.write_str(s),
            Value::Bytes(b) => self.write_bytes(b),
            Value::Array(a) => self.write_array(a),
            Value::List(items) => {
                self.open_list()?;
                for item in items {
                    self.write_value(item)?;
                }
                self.close_list()
            }
            Value::Map(entries) => {
                self.open_map()?;
                for (key, item) in entries {
                    self.write_key(key)?;
                    self.write_value(item)?;
                }
                self.close_map()
            }
        }
    }

    /// Emits a map key, coercing non-string keys to their string form.
    pub fn write_key(&mut self, key: &Key) -> Result<()> {
        match key {
            Key::Str(s) => self.write_str(s),
            other => self.write_str(&other.coerced()),
        }
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        write_length(&mut self.out, self.endian, bytes.len() as u64)?;
        self.out.write_all(b"s")?;
        self.out.write_all(bytes)?;
        Ok(())
    }

    pub fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        write_length(&mut self.out, self.endian, b.len() as u64)?;
        self.out.write_all(b"x")?;
        self.out.write_all(b)?;
        Ok(())
    }

    /// Emits an integer with the narrowest tag that fits its sign and
    /// magnitude. Observable in the bytes; invisible after a round-trip.
    pub fn write_int(&mut self, v: i128) -> Result<()> {
        if v >= 0 {
            if v <= i128::from(u8::MAX) {
                self.out.write_all(&[b'I', v as u8])?;
            } else if v <= i128::from(u16::MAX) {
                self.out.write_all(b"J")?;
                self.endian.write_u16(&mut self.out, v as u16)?;
            } else if v <= i128::from(u32::MAX) {
                self.out.write_all(b"K")?;
                self.endian.write_u32(&mut self.out, v as u32)?;
            } else if v <= i128::from(u64::MAX) {
                self.out.write_all(b"L")?;
                self.endian.write_u64(&mut self.out, v as u64)?;
            } else {
                return Err(Error::ValueTooLarge);
            }
        } else if v >= i128::from(i8::MIN) {
            self.out.write_all(&[b'i', (v as i8) as u8])?;
        } else if v >= i128::from(i16::MIN) {
            self.out.write_all(b"j")?;
            self.endian.write_i16(&mut self.out, v as i16)?;
        } else if v >= i128::from(i32::MIN) {
            self.out.write_all(b"k")?;
            self.endian.write_i32(&mut self.out, v as i32)?;
        } else if v >= i128::from(i64::MIN) {
            self.out.write_all(b"l")?;
            self.endian.write_i64(&mut self.out, v as i64)?;
        } else {
            return Err(Error::ValueTooLarge);
        }
        Ok(())
    }

    /// Emits a typed array: one length per dimension, the element tag,
    /// then the contiguous row-major payload in file byte order.
    pub fn write_array(&mut self, a: &Array) -> Result<()> {
        for dim in a.shape() {
            write_length(&mut self.out, self.endian, *dim as u64)?;
        }
        self.out.write_all(&[a.tag() as u8])?;
        let width = a.tag().elem_size();
        if width > 1 && self.endian != host_order() {
            let mut data = a.data().to_vec();
            swap_bytes(&mut data, width);
            self.out.write_all(&data)?;
        } else {
            self.out.write_all(a.data())?;
        }
        Ok(())
    }

    pub fn open_list(&mut self) -> Result<()> {
        Ok(self.out.write_all(b"[")?)
    }

    pub fn close_list(&mut self) -> Result<()> {
        Ok(self.out.write_all(b"]")?)
    }

    pub fn open_map(&mut self) -> Result<()> {
        Ok(self.out.write_all(b"{")?)
    }

    pub fn close_map(&mut self) -> Result<()> {
        Ok(self.out.write_all(b"}")?)
    }

    /// Pushes buffered bytes to the underlying stream. Idempotent.
    pub fn flush(&mut self) -> Result<()> {
        Ok(self.out.flush()?)
    }
}

/// Encodes one scalar as raw payload bytes for `tag`, in file byte
/// order. Used for in-place array cell assignment.
pub fn scalar_bytes(endian: Endianness, tag: Tag, value: &Value) -> Result<Vec<u8>> {
    fn int_of(value: &Value) -> Result<i128> {
        match value {
            Value::Int(v) => Ok(*v),
            _ => Err(Error::UnsupportedType("integer scalar expected")),
        }
    }
    fn float_of(value: &Value) -> Result<f64> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            _ => Err(Error::UnsupportedType("numeric scalar expected")),
        }
    }
    fn fit<T: TryFrom<i128>>(v: i128) -> Result<T> {
        T::try_from(v).map_err(|_| Error::ValueTooLarge)
    }

    let mut buf = Vec::with_capacity(tag.elem_size());
    match tag {
        Tag::Bool => match value {
            Value::Bool(b) => buf.push(if *b { 0xFF } else { 0x00 }),
            _ => return Err(Error::UnsupportedType("boolean scalar expected")),
        },
        Tag::I8 => buf.push(fit::<i8>(int_of(value)?)? as u8),
        Tag::U8 => buf.push(fit::<u8>(int_of(value)?)?),
        Tag::I16 => endian.write_i16(&mut buf, fit(int_of(value)?)?)?,
        Tag::U16 => endian.write_u16(&mut buf, fit(int_of(value)?)?)?,
        Tag::I32 => endian.write_i32(&mut buf, fit(int_of(value)?)?)?,
        Tag::U32 => endian.write_u32(&mut buf, fit(int_of(value)?)?)?,
        Tag::I64 => endian.write_i64(&mut buf, fit(int_of(value)?)?)?,
        Tag::U64 => endian.write_u64(&mut buf, fit(int_of(value)?)?)?,
        Tag::F32 => endian.write_f32(&mut buf, float_of(value)? as f32)?,
        Tag::F64 => endian.write_f64(&mut buf, float_of(value)?)?,
        Tag::F16 => {
            let bits = crate::types::f32_to_f16(float_of(value)? as f32);
            endian.write_u16(&mut buf, bits)?;
        }
        Tag::Utf8 | Tag::Utf16 | Tag::Bytes | Tag::Struct => {
            return Err(Error::UnsupportedType("scalar assignment into a text array"));
        }
    }
    Ok(buf)
}
