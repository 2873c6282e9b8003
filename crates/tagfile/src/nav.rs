//! Positional navigation without materialization.
//!
//! A `Nav` is a cheap value: a file offset plus the header cached at
//! construction (kind, shape, payload size, payload start, footnote
//! offsets). Payload bytes are re-read on every call, so edits made
//! through other navigators stay observable. Every operation seeks
//! explicitly, so navigators never disturb each other's cursor state.

use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;

use tracing::trace;

use tagpack::Error;
use tagpack::HeaderKind;
use tagpack::Key;
use tagpack::Reader;
use tagpack::Result;
use tagpack::Scanner;
use tagpack::Skip;
use tagpack::Tag;
use tagpack::Value;
use tagpack::types::host_order;
use tagpack::types::swap_bytes;
use tagpack::value::Array;

use crate::file::OpenMode;
use crate::file::Shared;
use crate::slice::AxisSel;
use crate::slice::build_plan;

/// What a lookup produced: a plain value for scalars and short runs, a
/// navigator for containers and arrays, so chains like
/// `nav.get("a")?.node()?.at(3)?` never force intermediate
/// materialization.
#[derive(Debug)]
pub enum Item {
    Value(Value),
    Node(Nav),
}

impl Item {
    /// The value, materializing a node if necessary.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Item::Value(v) => Ok(v),
            Item::Node(nav) => nav.materialize(),
        }
    }

    /// The navigator, failing for plain values.
    pub fn node(self) -> Result<Nav> {
        match self {
            Item::Node(nav) => Ok(nav),
            Item::Value(_) => Err(Error::NotIndexable),
        }
    }
}

/// Kind of the value a navigator points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKind {
    List,
    Map,
    Element(Tag),
    True,
    False,
    Null,
}

pub struct Nav {
    shared: Shared,
    offset: u64,
    kind: NavKind,
    shape: Vec<usize>,
    payload_start: u64,
    footnotes: Vec<u64>,
}

impl Nav {
    /// Reads and caches the header at `offset`. `Ok(None)` when the
    /// offset holds a closer or end of stream instead of a value.
    pub(crate) fn new(shared: Shared, offset: u64) -> Result<Option<Nav>> {
        let (kind, shape, payload_start, footnotes) = {
            let mut inner = shared.borrow_mut();
            let (file, endian) = inner.reader_parts()?;
            let mut scan = Scanner::new(file, endian);
            scan.seek_to(offset)?;
            let header = scan.next_header()?;
            let kind = match header.kind {
                HeaderKind::End | HeaderKind::ListClose | HeaderKind::MapClose => {
                    return Ok(None);
                }
                HeaderKind::ListOpen => NavKind::List,
                HeaderKind::MapOpen => NavKind::Map,
                HeaderKind::True => NavKind::True,
                HeaderKind::False => NavKind::False,
                HeaderKind::Null => NavKind::Null,
                HeaderKind::Element(tag) => NavKind::Element(tag),
            };
            (kind, header.shape, scan.position()?, header.footnotes)
        };
        Ok(Some(Nav { shared, offset, kind, shape, payload_start, footnotes }))
    }

    pub fn kind(&self) -> NavKind {
        self.kind
    }

    pub fn tag(&self) -> Option<Tag> {
        match self.kind {
            NavKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    /// Length fields of the element header, in file order.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Byte offset of this value (footnotes included).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_list(&self) -> bool {
        self.kind == NavKind::List
    }

    pub fn is_map(&self) -> bool {
        self.kind == NavKind::Map
    }

    /// True when lookups hand out a navigator rather than a value: any
    /// container, and any array other than a plain string or byte run.
    pub fn is_node(&self) -> bool {
        match self.kind {
            NavKind::List | NavKind::Map => true,
            NavKind::Element(tag) => {
                !self.shape.is_empty()
                    && (self.shape.len() > 1
                        || !matches!(tag, Tag::Utf8 | Tag::Utf16 | Tag::Bytes))
            }
            _ => false,
        }
    }

    fn is_sliceable(&self) -> bool {
        matches!(self.kind, NavKind::Element(tag)
            if !self.shape.is_empty()
                && (self.shape.len() > 1 || !matches!(tag, Tag::Utf8 | Tag::Utf16 | Tag::Bytes)))
    }

    /// Navigators over the footnotes attached to this value.
    pub fn footnotes(&self) -> Result<Vec<Nav>> {
        let mut out = Vec::new();
        for &offset in &self.footnotes {
            if let Some(nav) = Nav::new(self.shared.clone(), offset)? {
                out.push(nav);
            }
        }
        Ok(out)
    }

    /// Recursively reads the value at this offset into memory.
    pub fn materialize(&self) -> Result<Value> {
        let mut inner = self.shared.borrow_mut();
        let (file, endian) = inner.reader_parts()?;
        let mut scan = Scanner::new(file, endian);
        scan.seek_to(self.offset)?;
        Reader::new(&mut scan).read_value()?.ok_or(Error::Truncated)
    }

    /// Entry count for containers; leading extent for arrays and runs.
    pub fn len(&self) -> Result<usize> {
        match self.kind {
            NavKind::List => {
                let mut inner = self.shared.borrow_mut();
                let (file, endian) = inner.reader_parts()?;
                let mut scan = Scanner::new(file, endian);
                scan.seek_to(self.payload_start)?;
                let mut count = 0;
                while scan.skip_value()? == Skip::Value {
                    count += 1;
                }
                Ok(count)
            }
            NavKind::Map => {
                let mut inner = self.shared.borrow_mut();
                let (file, endian) = inner.reader_parts()?;
                let mut scan = Scanner::new(file, endian);
                scan.seek_to(self.payload_start)?;
                let mut count = 0;
                loop {
                    match scan.next_header()?.kind {
                        HeaderKind::MapClose | HeaderKind::End => break,
                        HeaderKind::Element(_) => {}
                        _ => return Err(Error::BadKey),
                    }
                    if scan.skip_value()? != Skip::Value {
                        break;
                    }
                    count += 1;
                }
                Ok(count)
            }
            NavKind::Element(_) if !self.shape.is_empty() => Ok(self.shape[0]),
            _ => Err(Error::NotSized),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Keys of a map, in file order.
    pub fn keys(&self) -> Result<Vec<Key>> {
        if self.kind != NavKind::Map {
            return Err(Error::NotSized);
        }
        let mut inner = self.shared.borrow_mut();
        let (file, endian) = inner.reader_parts()?;
        let mut scan = Scanner::new(file, endian);
        scan.seek_to(self.payload_start)?;
        let mut keys = Vec::new();
        loop {
            let header = scan.next_header()?;
            match header.kind {
                HeaderKind::MapClose | HeaderKind::End => break,
                HeaderKind::Element(_) => {}
                _ => return Err(Error::BadKey),
            }
            keys.push(Reader::new(&mut scan).read_key(&header)?);
            if scan.skip_value()? != Skip::Value {
                break;
            }
        }
        Ok(keys)
    }

    /// Map lookup by key: linear scan in file order.
    pub fn get(&self, key: impl Into<Key>) -> Result<Item> {
        if self.kind != NavKind::Map {
            return Err(Error::NotIndexable);
        }
        let key = key.into();
        let value_offset = {
            let mut inner = self.shared.borrow_mut();
            let (file, endian) = inner.reader_parts()?;
            let mut scan = Scanner::new(file, endian);
            scan.seek_to(self.payload_start)?;
            loop {
                let header = scan.next_header()?;
                match header.kind {
                    HeaderKind::MapClose | HeaderKind::End => {
                        return Err(Error::KeyNotFound(key));
                    }
                    HeaderKind::Element(_) => {}
                    _ => return Err(Error::BadKey),
                }
                let found = Reader::new(&mut scan).read_key(&header)?;
                if found == key {
                    break scan.position()?;
                }
                if scan.skip_value()? != Skip::Value {
                    return Err(Error::KeyNotFound(key));
                }
            }
        };
        self.item_at(value_offset)
    }

    /// List lookup by position: skips `index` values.
    pub fn at(&self, index: usize) -> Result<Item> {
        if self.kind != NavKind::List {
            return Err(Error::NotIndexable);
        }
        let item_offset = {
            let mut inner = self.shared.borrow_mut();
            let (file, endian) = inner.reader_parts()?;
            let mut scan = Scanner::new(file, endian);
            scan.seek_to(self.payload_start)?;
            for skipped in 0..index {
                if scan.skip_value()? != Skip::Value {
                    return Err(Error::IndexOutOfRange { index: index as i64, len: skipped });
                }
            }
            scan.position()?
        };
        match self.item_at(item_offset) {
            Err(Error::Truncated) => Err(Error::IndexOutOfRange { index: index as i64, len: index }),
            other => other,
        }
    }

    /// List slice with python range semantics: non-negative bounds,
    /// positive step, clamped by the end of the list.
    pub fn range(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> Result<Vec<Value>> {
        if self.kind != NavKind::List {
            return Err(Error::NotIndexable);
        }
        let step = step.unwrap_or(1);
        if step <= 0 {
            return Err(Error::UnsupportedType("list slice step must be positive"));
        }
        let start = start.unwrap_or(0);
        if start < 0 {
            return Err(Error::IndexOutOfRange { index: start, len: 0 });
        }
        if let Some(stop) = stop {
            if stop < 0 {
                return Err(Error::IndexOutOfRange { index: stop, len: 0 });
            }
        }

        let mut inner = self.shared.borrow_mut();
        let (file, endian) = inner.reader_parts()?;
        let mut scan = Scanner::new(file, endian);
        scan.seek_to(self.payload_start)?;

        let mut out = Vec::new();
        for _ in 0..start {
            if scan.skip_value()? != Skip::Value {
                return Ok(out);
            }
        }
        let mut index = start;
        while stop.is_none_or(|s| index < s) {
            match Reader::new(&mut scan).read_value()? {
                Some(v) => out.push(v),
                None => break,
            }
            let mut ended = false;
            for _ in 0..step - 1 {
                if scan.skip_value()? != Skip::Value {
                    ended = true;
                    break;
                }
            }
            if ended {
                break;
            }
            index += step;
        }
        Ok(out)
    }

    /// Iterator over a list, yielding materialized values in order.
    pub fn iter(&self) -> Result<NavIter> {
        if self.kind != NavKind::List {
            return Err(Error::NotIterable);
        }
        Ok(NavIter {
            shared: self.shared.clone(),
            pos: self.payload_start,
            done: false,
        })
    }

    fn item_at(&self, offset: u64) -> Result<Item> {
        let nav = Nav::new(self.shared.clone(), offset)?.ok_or(Error::Truncated)?;
        if nav.is_node() {
            Ok(Item::Node(nav))
        } else {
            Ok(Item::Value(nav.materialize()?))
        }
    }

    // ------------------------------------------------------------------
    // Array slicing
    // ------------------------------------------------------------------

    fn slice_target(&self) -> Result<Tag> {
        if !self.is_sliceable() {
            return Err(Error::NotIndexable);
        }
        let tag = self.tag().expect("sliceable implies element");
        if matches!(tag, Tag::Utf8 | Tag::Utf16 | Tag::Bytes | Tag::Struct) {
            return Err(Error::UnsupportedType("slicing a string or byte array"));
        }
        Ok(tag)
    }

    /// Multi-axis selection. Axes beyond the provided selectors are
    /// implicit full slices. Contiguous trailing runs collapse into
    /// single block reads; the result is bit-identical to the naive
    /// per-element plan.
    pub fn select(&self, sels: &[AxisSel]) -> Result<Array> {
        let tag = self.slice_target()?;
        let plan = build_plan(&self.shape, tag.elem_size(), sels)?;
        trace!(shape = ?self.shape, chunks = plan.point_count(), chunk_bytes = plan.chunk_bytes, "slice read");

        if plan.is_empty() {
            return Array::new(tag, plan.result_shape.clone(), Vec::new());
        }

        let mut inner = self.shared.borrow_mut();
        let (file, endian) = inner.reader_parts()?;
        let mut data = vec![0u8; plan.point_count() * plan.chunk_bytes];
        let mut written = 0;
        plan.for_each_offset(|elem_offset| {
            let at = self.payload_start + elem_offset * plan.elem_size as u64;
            file.seek(SeekFrom::Start(at))?;
            file.read_exact(&mut data[written..written + plan.chunk_bytes])
                .map_err(Error::from_read)?;
            written += plan.chunk_bytes;
            Ok(())
        })?;

        if endian != host_order() {
            swap_bytes(&mut data, plan.elem_size);
        }
        if tag == Tag::Bool {
            for b in &mut data {
                *b = if *b != 0 { 0xFF } else { 0x00 };
            }
        }
        Array::new(tag, plan.result_shape.clone(), data)
    }

    /// In-place assignment through the same plan as `select`. The
    /// right-hand side is either an array matching the selected shape
    /// and element tag, or a scalar broadcast across the selection.
    pub fn assign(&self, sels: &[AxisSel], rhs: &Value) -> Result<()> {
        let tag = self.slice_target()?;
        {
            let inner = self.shared.borrow();
            if inner.mode() != OpenMode::ReadWrite {
                return Err(Error::ReadOnly);
            }
        }
        let plan = build_plan(&self.shape, tag.elem_size(), sels)?;

        let mut inner = self.shared.borrow_mut();
        let (file, endian) = inner.reader_parts()?;

        let chunk: Vec<u8> = match rhs {
            Value::Array(a) => {
                if a.tag() != tag {
                    return Err(Error::DtypeMismatch { expected: tag, found: a.tag() });
                }
                if a.shape() != plan.result_shape.as_slice() {
                    return Err(Error::ShapeMismatch {
                        expected: plan.result_shape.clone(),
                        found: a.shape().to_vec(),
                    });
                }
                let mut data = a.data().to_vec();
                if endian != host_order() {
                    swap_bytes(&mut data, plan.elem_size);
                }
                data
            }
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => {
                let one = tagpack::write::scalar_bytes(endian, tag, rhs)?;
                let mut buf = Vec::with_capacity(plan.chunk_bytes);
                for _ in 0..plan.chunk_elems {
                    buf.extend_from_slice(&one);
                }
                buf
            }
            _ => return Err(Error::UnsupportedType("array or scalar right-hand side expected")),
        };

        if plan.is_empty() {
            return Ok(());
        }

        trace!(shape = ?self.shape, chunks = plan.point_count(), chunk_bytes = plan.chunk_bytes, "slice write");
        let scalar = !matches!(rhs, Value::Array(_));
        let mut consumed = 0;
        plan.for_each_offset(|elem_offset| {
            let at = self.payload_start + elem_offset * plan.elem_size as u64;
            file.seek(SeekFrom::Start(at))?;
            if scalar {
                file.write_all(&chunk)?;
            } else {
                file.write_all(&chunk[consumed..consumed + plan.chunk_bytes])?;
                consumed += plan.chunk_bytes;
            }
            Ok(())
        })?;
        file.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for Nav {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.kind {
            NavKind::List => "list",
            NavKind::Map => "map",
            NavKind::True => "true",
            NavKind::False => "false",
            NavKind::Null => "null",
            NavKind::Element(tag) => tag.name(),
        };
        if self.is_node() && !matches!(self.kind, NavKind::List | NavKind::Map) {
            write!(f, "<Nav type='{}' shape={:?}>", name, self.shape)
        } else {
            write!(f, "<Nav type='{}'>", name)
        }
    }
}

/// Iterator over a list navigator. Each step reads one value; the
/// underlying cursor is re-seeked per step, so interleaved navigator
/// use cannot corrupt the walk.
pub struct NavIter {
    shared: Shared,
    pos: u64,
    done: bool,
}

impl Iterator for NavIter {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Result<Value>> {
        if self.done {
            return None;
        }
        let step: Result<(Option<Value>, u64)> = (|| {
            let mut inner = self.shared.borrow_mut();
            let (file, endian) = inner.reader_parts()?;
            let mut scan = Scanner::new(file, endian);
            scan.seek_to(self.pos)?;
            let value = Reader::new(&mut scan).read_value()?;
            let pos = scan.position()?;
            Ok((value, pos))
        })();
        match step {
            Ok((Some(value), pos)) => {
                self.pos = pos;
                Some(Ok(value))
            }
            Ok((None, _)) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
