//! Value materializer (the layer above the scanner).

use std::io::Read;
use std::io::Seek;

use byteordered::Endian;
use byteordered::Endianness;

use crate::error::Error;
use crate::error::Result;
use crate::scan::Header;
use crate::scan::HeaderKind;
use crate::scan::Scanner;
use crate::types::Tag;
use crate::types::f16_to_f32;
use crate::types::swap_bytes;
use crate::value::Array;
use crate::value::Key;
use crate::value::Value;
use crate::value::insert_entry;

/// What one pull from the stream produced.
pub enum Node {
    Value(Value),
    ListClose,
    MapClose,
    End,
}

/// Recursive reader over a borrowed scanner.
///
/// Containers recurse; scalars decode per tag and byte order; arrays
/// come back as typed buffers byte-swapped to host order.
pub struct Reader<'a, R> {
    scan: &'a mut Scanner<R>,
}

impl<'a, R: Read + Seek> Reader<'a, R> {
    pub fn new(scan: &'a mut Scanner<R>) -> Self {
        Reader { scan }
    }

    /// Reads one value. `None` when the stream ends (or a stray closer
    /// sits at the cursor) instead of a value.
    pub fn read_value(&mut self) -> Result<Option<Value>> {
        match self.read_node()? {
            Node::Value(v) => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    pub fn read_node(&mut self) -> Result<Node> {
        let header = self.scan.next_header()?;
        self.node_from_header(&header)
    }

    pub fn node_from_header(&mut self, header: &Header) -> Result<Node> {
        match header.kind {
            HeaderKind::End => Ok(Node::End),
            HeaderKind::ListClose => Ok(Node::ListClose),
            HeaderKind::MapClose => Ok(Node::MapClose),
            HeaderKind::True => Ok(Node::Value(Value::Bool(true))),
            HeaderKind::False => Ok(Node::Value(Value::Bool(false))),
            HeaderKind::Null => Ok(Node::Value(Value::Null)),
            HeaderKind::ListOpen => Ok(Node::Value(Value::List(self.read_list()?))),
            HeaderKind::MapOpen => Ok(Node::Value(Value::Map(self.read_map()?))),
            HeaderKind::Element(tag) => {
                Ok(Node::Value(self.element_value(tag, &header.shape)?))
            }
        }
    }

    fn read_list(&mut self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            match self.read_node()? {
                Node::Value(v) => items.push(v),
                // EOF closure is legal at any depth.
                Node::ListClose | Node::End => return Ok(items),
                Node::MapClose => return Err(Error::BadTag(b'}')),
            }
        }
    }

    fn read_map(&mut self) -> Result<Vec<(Key, Value)>> {
        let mut entries = Vec::new();
        loop {
            let header = self.scan.next_header()?;
            let key = match header.kind {
                HeaderKind::MapClose | HeaderKind::End => return Ok(entries),
                HeaderKind::Element(tag) => self.decode_key(tag, &header.shape)?,
                // A `}` may occur only in the key position; containers
                // and bare booleans/null may not.
                _ => return Err(Error::BadKey),
            };
            match self.read_node()? {
                Node::Value(v) => insert_entry(&mut entries, key, v),
                Node::End => return Err(Error::Truncated),
                Node::ListClose => return Err(Error::BadTag(b']')),
                Node::MapClose => return Err(Error::BadTag(b'}')),
            }
        }
    }

    /// Decodes a map key element. Strings stay text; numbers become
    /// numeric keys; numeric arrays become nested tuples.
    pub fn read_key(&mut self, header: &Header) -> Result<Key> {
        match header.kind {
            HeaderKind::Element(tag) => self.decode_key(tag, &header.shape),
            _ => Err(Error::BadKey),
        }
    }

    fn decode_key(&mut self, tag: Tag, shape: &[usize]) -> Result<Key> {
        let endian = self.scan.endian();
        let data = self.scan.read_payload()?;
        match tag {
            Tag::Utf8 => Ok(Key::Str(utf8(data)?)),
            Tag::Utf16 => Ok(Key::Str(utf16(&data, endian)?)),
            _ if tag.is_int() && shape.is_empty() => {
                Ok(Key::Int(int_from(endian, tag, &data)?))
            }
            _ if tag.is_float() && shape.is_empty() => {
                Ok(Key::Float(float_from(endian, tag, &data)?))
            }
            _ if tag.is_int() || tag.is_float() => deep_tuple(endian, tag, shape, &data),
            _ => Err(Error::BadKey),
        }
    }

    fn element_value(&mut self, tag: Tag, shape: &[usize]) -> Result<Value> {
        let endian = self.scan.endian();
        if shape.is_empty() {
            let data = self.scan.read_payload()?;
            return scalar_value(endian, tag, &data);
        }
        if shape.len() == 1 && tag.is_run() {
            let data = self.scan.read_payload()?;
            return match tag {
                Tag::Utf8 => Ok(Value::Str(utf8(data)?)),
                Tag::Utf16 => Ok(Value::Str(utf16(&data, endian)?)),
                _ => Ok(Value::Bytes(data)),
            };
        }
        let mut data = self.scan.read_payload()?;
        if self.scan.need_byteswap() {
            swap_bytes(&mut data, tag.elem_size());
        }
        if tag == Tag::Bool {
            for b in &mut data {
                *b = if *b != 0 { 0xFF } else { 0x00 };
            }
        }
        Ok(Value::Array(Array::new(tag, shape.to_vec(), data)?))
    }
}

fn utf8(data: Vec<u8>) -> Result<String> {
    String::from_utf8(data).map_err(|_| Error::invalid_data("string is not valid UTF-8"))
}

fn utf16(data: &[u8], endian: Endianness) -> Result<String> {
    if data.len() % 2 != 0 {
        return Err(Error::Truncated);
    }
    let mut units = Vec::with_capacity(data.len() / 2);
    let mut src = data;
    while !src.is_empty() {
        units.push(endian.read_u16(&mut src).map_err(Error::from_read)?);
    }
    String::from_utf16(&units).map_err(|_| Error::invalid_data("string is not valid UTF-16"))
}

pub(crate) fn scalar_value(endian: Endianness, tag: Tag, data: &[u8]) -> Result<Value> {
    match tag {
        Tag::Bool => Ok(Value::Bool(data.first().copied().unwrap_or(0) != 0)),
        _ if tag.is_int() => Ok(Value::Int(int_from(endian, tag, data)?)),
        _ if tag.is_float() => Ok(Value::Float(float_from(endian, tag, data)?)),
        Tag::Utf8 => Ok(Value::Str(utf8(data.to_vec())?)),
        Tag::Utf16 => Ok(Value::Str(utf16(data, endian)?)),
        Tag::Bytes | Tag::Struct => Ok(Value::Bytes(data.to_vec())),
        _ => Err(Error::BadTag(tag as u8)),
    }
}

fn int_from(endian: Endianness, tag: Tag, data: &[u8]) -> Result<i128> {
    let mut src = data;
    let value = match tag {
        Tag::I8 => i128::from(data.first().copied().ok_or(Error::Truncated)? as i8),
        Tag::U8 => i128::from(data.first().copied().ok_or(Error::Truncated)?),
        Tag::I16 => i128::from(endian.read_i16(&mut src).map_err(Error::from_read)?),
        Tag::U16 => i128::from(endian.read_u16(&mut src).map_err(Error::from_read)?),
        Tag::I32 => i128::from(endian.read_i32(&mut src).map_err(Error::from_read)?),
        Tag::U32 => i128::from(endian.read_u32(&mut src).map_err(Error::from_read)?),
        Tag::I64 => i128::from(endian.read_i64(&mut src).map_err(Error::from_read)?),
        Tag::U64 => i128::from(endian.read_u64(&mut src).map_err(Error::from_read)?),
        _ => return Err(Error::BadTag(tag as u8)),
    };
    Ok(value)
}

fn float_from(endian: Endianness, tag: Tag, data: &[u8]) -> Result<f64> {
    let mut src = data;
    let value = match tag {
        Tag::F16 => {
            let bits = endian.read_u16(&mut src).map_err(Error::from_read)?;
            f64::from(f16_to_f32(bits))
        }
        Tag::F32 => f64::from(endian.read_f32(&mut src).map_err(Error::from_read)?),
        Tag::F64 => endian.read_f64(&mut src).map_err(Error::from_read)?,
        _ => return Err(Error::BadTag(tag as u8)),
    };
    Ok(value)
}

/// Nests a flat numeric payload into tuples-of-tuples per `shape`, for
/// use as a map key.
fn deep_tuple(endian: Endianness, tag: Tag, shape: &[usize], data: &[u8]) -> Result<Key> {
    let width = tag.elem_size();
    let mut leaves = Vec::with_capacity(data.len() / width.max(1));
    for chunk in data.chunks_exact(width) {
        if tag.is_int() {
            leaves.push(Key::Int(int_from(endian, tag, chunk)?));
        } else {
            leaves.push(Key::Float(float_from(endian, tag, chunk)?));
        }
    }
    fn nest(shape: &[usize], leaves: &[Key]) -> Key {
        if shape.len() <= 1 {
            return Key::Tuple(leaves.to_vec());
        }
        let inner: usize = shape[1..].iter().product();
        Key::Tuple(
            leaves
                .chunks(inner.max(1))
                .map(|chunk| nest(&shape[1..], chunk))
                .collect(),
        )
    }
    Ok(nest(shape, &leaves))
}
