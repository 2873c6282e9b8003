//! File handles over the tagpack codec.
//!
//! A `TagFile` owns one OS file and its cursor. Whole values go through
//! `write`/`read`; incremental construction goes through the scope stack
//! (`add`, `set`, and the `*_list`/`*_map` scope openers); positional
//! access goes through navigators (`root`, `get`, `at`).

use std::cell::RefCell;
use std::fs;
use std::fs::OpenOptions;
use std::path::Path;
use std::rc::Rc;

use byteordered::Endianness;
use tracing::debug;
use tracing::trace;

use tagpack::ByteOrder;
use tagpack::Error;
use tagpack::Key;
use tagpack::Reader;
use tagpack::Result;
use tagpack::Scanner;
use tagpack::Value;
use tagpack::Writer;

use crate::dump;
use crate::dump::DumpOptions;
use crate::nav::Item;
use crate::nav::Nav;
use crate::nav::NavIter;

/// Access mode of a handle.
///
/// `Write` builds a fresh file and supports the structural write API.
/// `ReadWrite` opens an existing file for navigation plus in-place array
/// cell assignment. `Read` is navigation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

/// Kind of an open container scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    List,
    Map,
}

/// A generation-checked handle to an open scope.
///
/// Cheap to copy; becomes stale once the scope is closed (explicitly,
/// by a write to an ancestor, or by file close), after which any use
/// fails with `ScopeClosed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeRef {
    depth: usize,
    generation: u64,
}

struct Scope {
    kind: ScopeKind,
    generation: u64,
}

pub(crate) struct Inner {
    file: Option<fs::File>,
    endian: Endianness,
    mode: OpenMode,
    scopes: Vec<Scope>,
    next_generation: u64,
    root: Option<ScopeKind>,
}

pub(crate) type Shared = Rc<RefCell<Inner>>;

impl Inner {
    pub(crate) fn reader_parts(&mut self) -> Result<(&mut fs::File, Endianness)> {
        let endian = self.endian;
        let file = self.file.as_mut().ok_or(Error::Reopened)?;
        Ok((file, endian))
    }

    pub(crate) fn mode(&self) -> OpenMode {
        self.mode
    }

    fn close_to(&mut self, depth: usize) -> Result<()> {
        while self.scopes.len() > depth {
            let scope = self.scopes.pop().expect("scope stack underflow");
            let (file, endian) = self.reader_parts()?;
            let mut w = Writer::new(file, endian);
            match scope.kind {
                ScopeKind::List => w.close_list()?,
                ScopeKind::Map => w.close_map()?,
            }
            trace!(depth = self.scopes.len(), kind = ?scope.kind, "closed scope");
        }
        Ok(())
    }

    /// Opens the root container on first use, or closes back down to it.
    fn ensure_root(&mut self, kind: ScopeKind) -> Result<()> {
        match self.root {
            None => {
                let generation = self.bump_generation();
                let (file, endian) = self.reader_parts()?;
                let mut w = Writer::new(file, endian);
                w.write_bom()?;
                match kind {
                    ScopeKind::List => w.open_list()?,
                    ScopeKind::Map => w.open_map()?,
                }
                self.scopes.push(Scope { kind, generation });
                self.root = Some(kind);
                trace!(kind = ?kind, "opened root scope");
                Ok(())
            }
            Some(k) if k != kind => Err(Error::WrongContainerKind),
            Some(_) => self.close_to(1),
        }
    }

    /// Validates a scope handle and closes every scope nested inside it.
    fn resolve(&mut self, scope: ScopeRef) -> Result<ScopeKind> {
        let live = self
            .scopes
            .get(scope.depth)
            .is_some_and(|s| s.generation == scope.generation);
        if !live {
            return Err(Error::ScopeClosed);
        }
        self.close_to(scope.depth + 1)?;
        Ok(self.scopes[scope.depth].kind)
    }

    fn open_child(&mut self, kind: ScopeKind) -> Result<ScopeRef> {
        let generation = self.bump_generation();
        let (file, endian) = self.reader_parts()?;
        let mut w = Writer::new(file, endian);
        match kind {
            ScopeKind::List => w.open_list()?,
            ScopeKind::Map => w.open_map()?,
        }
        self.scopes.push(Scope { kind, generation });
        trace!(depth = self.scopes.len() - 1, kind = ?kind, "opened scope");
        Ok(ScopeRef { depth: self.scopes.len() - 1, generation })
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn check_structural_write(&self) -> Result<()> {
        if self.file.is_none() {
            return Err(Error::Reopened);
        }
        if self.mode != OpenMode::Write {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        let (file, endian) = self.reader_parts()?;
        Writer::new(file, endian).write_value(value)
    }

    fn write_key(&mut self, key: &str) -> Result<()> {
        let (file, endian) = self.reader_parts()?;
        Writer::new(file, endian).write_str(key)
    }

    fn close(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        if self.mode == OpenMode::Write {
            self.close_to(0)?;
        }
        if let Some(file) = self.file.take() {
            file.sync_all().ok();
        }
        debug!("closed tagpack file");
        Ok(())
    }
}

/// A tagpack file on disk.
pub struct TagFile {
    shared: Shared,
}

impl TagFile {
    /// Creates (or truncates) a file for writing, byte order `Auto`
    /// (host order).
    pub fn create(path: impl AsRef<Path>) -> Result<TagFile> {
        TagFile::create_with(path, ByteOrder::Auto)
    }

    pub fn create_with(path: impl AsRef<Path>, order: ByteOrder) -> Result<TagFile> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        let endian = order.for_write();
        debug!(path = %path.as_ref().display(), ?endian, "created tagpack file");
        Ok(TagFile::from_parts(file, endian, OpenMode::Write))
    }

    /// Opens an existing file read-only, byte order `Auto` (byte-order
    /// mark, big-endian if absent).
    pub fn open(path: impl AsRef<Path>) -> Result<TagFile> {
        TagFile::open_with(path, ByteOrder::Auto)
    }

    pub fn open_with(path: impl AsRef<Path>, order: ByteOrder) -> Result<TagFile> {
        let mut file = OpenOptions::new().read(true).open(path.as_ref())?;
        let endian = order.for_read(&mut file)?;
        debug!(path = %path.as_ref().display(), ?endian, "opened tagpack file");
        Ok(TagFile::from_parts(file, endian, OpenMode::Read))
    }

    /// Opens an existing file for navigation and in-place array edits.
    pub fn open_rw(path: impl AsRef<Path>) -> Result<TagFile> {
        TagFile::open_rw_with(path, ByteOrder::Auto)
    }

    pub fn open_rw_with(path: impl AsRef<Path>, order: ByteOrder) -> Result<TagFile> {
        let mut file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let endian = order.for_read(&mut file)?;
        debug!(path = %path.as_ref().display(), ?endian, "opened tagpack file read-write");
        Ok(TagFile::from_parts(file, endian, OpenMode::ReadWrite))
    }

    fn from_parts(file: fs::File, endian: Endianness, mode: OpenMode) -> TagFile {
        TagFile {
            shared: Rc::new(RefCell::new(Inner {
                file: Some(file),
                endian,
                mode,
                scopes: Vec::new(),
                next_generation: 0,
                root: None,
            })),
        }
    }

    /// Effective byte order of the file.
    pub fn endianness(&self) -> Endianness {
        self.shared.borrow().endian
    }

    pub fn mode(&self) -> OpenMode {
        self.shared.borrow().mode
    }

    // ------------------------------------------------------------------
    // Whole-value writing
    // ------------------------------------------------------------------

    /// Writes one complete top-level value, byte-order mark first.
    pub fn write(&self, value: &Value) -> Result<()> {
        let mut inner = self.shared.borrow_mut();
        inner.check_structural_write()?;
        let (file, endian) = inner.reader_parts()?;
        let mut w = Writer::new(file, endian);
        w.write_bom()?;
        w.write_value(value)?;
        w.flush()
    }

    // ------------------------------------------------------------------
    // Incremental writing
    // ------------------------------------------------------------------

    /// Appends a value to the root list. The first root operation fixes
    /// the root container kind; any scopes open above the root close
    /// first.
    pub fn add(&self, value: &Value) -> Result<()> {
        let mut inner = self.shared.borrow_mut();
        inner.check_structural_write()?;
        inner.ensure_root(ScopeKind::List)?;
        inner.write_value(value)
    }

    /// Writes a key-value pair into the root map.
    pub fn set(&self, key: &str, value: &Value) -> Result<()> {
        let mut inner = self.shared.borrow_mut();
        inner.check_structural_write()?;
        inner.ensure_root(ScopeKind::Map)?;
        inner.write_key(key)?;
        inner.write_value(value)
    }

    /// Opens a nested list in the root list.
    pub fn add_list(&self) -> Result<ScopeRef> {
        let mut inner = self.shared.borrow_mut();
        inner.check_structural_write()?;
        inner.ensure_root(ScopeKind::List)?;
        inner.open_child(ScopeKind::List)
    }

    /// Opens a nested map in the root list.
    pub fn add_map(&self) -> Result<ScopeRef> {
        let mut inner = self.shared.borrow_mut();
        inner.check_structural_write()?;
        inner.ensure_root(ScopeKind::List)?;
        inner.open_child(ScopeKind::Map)
    }

    /// Opens a nested list under `key` in the root map.
    pub fn set_list(&self, key: &str) -> Result<ScopeRef> {
        let mut inner = self.shared.borrow_mut();
        inner.check_structural_write()?;
        inner.ensure_root(ScopeKind::Map)?;
        inner.write_key(key)?;
        inner.open_child(ScopeKind::List)
    }

    /// Opens a nested map under `key` in the root map.
    pub fn set_map(&self, key: &str) -> Result<ScopeRef> {
        let mut inner = self.shared.borrow_mut();
        inner.check_structural_write()?;
        inner.ensure_root(ScopeKind::Map)?;
        inner.write_key(key)?;
        inner.open_child(ScopeKind::Map)
    }

    /// Appends a value to an open list scope. Scopes nested inside it
    /// close first; writes land in call order.
    pub fn add_to(&self, scope: ScopeRef, value: &Value) -> Result<()> {
        let mut inner = self.shared.borrow_mut();
        inner.check_structural_write()?;
        if inner.resolve(scope)? != ScopeKind::List {
            return Err(Error::WrongContainerKind);
        }
        inner.write_value(value)
    }

    /// Writes a key-value pair into an open map scope.
    pub fn set_in(&self, scope: ScopeRef, key: &str, value: &Value) -> Result<()> {
        let mut inner = self.shared.borrow_mut();
        inner.check_structural_write()?;
        if inner.resolve(scope)? != ScopeKind::Map {
            return Err(Error::WrongContainerKind);
        }
        inner.write_key(key)?;
        inner.write_value(value)
    }

    /// Opens a list nested in an open list scope.
    pub fn add_list_to(&self, scope: ScopeRef) -> Result<ScopeRef> {
        self.open_in(scope, ScopeKind::List, None)
    }

    /// Opens a map nested in an open list scope.
    pub fn add_map_to(&self, scope: ScopeRef) -> Result<ScopeRef> {
        self.open_in(scope, ScopeKind::Map, None)
    }

    /// Opens a list under `key` in an open map scope.
    pub fn set_list_in(&self, scope: ScopeRef, key: &str) -> Result<ScopeRef> {
        self.open_in(scope, ScopeKind::List, Some(key))
    }

    /// Opens a map under `key` in an open map scope.
    pub fn set_map_in(&self, scope: ScopeRef, key: &str) -> Result<ScopeRef> {
        self.open_in(scope, ScopeKind::Map, Some(key))
    }

    fn open_in(&self, scope: ScopeRef, kind: ScopeKind, key: Option<&str>) -> Result<ScopeRef> {
        let mut inner = self.shared.borrow_mut();
        inner.check_structural_write()?;
        let parent_kind = inner.resolve(scope)?;
        match (parent_kind, key) {
            (ScopeKind::List, None) | (ScopeKind::Map, Some(_)) => {}
            _ => return Err(Error::WrongContainerKind),
        }
        if let Some(key) = key {
            inner.write_key(key)?;
        }
        inner.open_child(kind)
    }

    /// Closes one open scope (and anything nested inside it).
    pub fn close_scope(&self, scope: ScopeRef) -> Result<()> {
        let mut inner = self.shared.borrow_mut();
        inner.check_structural_write()?;
        inner.resolve(scope)?;
        inner.close_to(scope.depth)
    }

    /// The most deeply nested scope currently open, if any.
    pub fn last(&self) -> Option<ScopeRef> {
        let inner = self.shared.borrow();
        let depth = inner.scopes.len().checked_sub(1)?;
        Some(ScopeRef { depth, generation: inner.scopes[depth].generation })
    }

    /// Pushes buffered bytes to disk. Idempotent.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.shared.borrow_mut();
        let (file, endian) = inner.reader_parts()?;
        Writer::new(file, endian).flush()
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// Materializes the whole file. `Ok(None)` for an empty file.
    pub fn read(&self) -> Result<Option<Value>> {
        let mut inner = self.shared.borrow_mut();
        let (file, endian) = inner.reader_parts()?;
        let mut scan = Scanner::new(file, endian);
        scan.seek_to(0)?;
        Reader::new(&mut scan).read_value()
    }

    /// Navigator over the top-level value. `Ok(None)` for an empty file.
    pub fn root(&self) -> Result<Option<Nav>> {
        Nav::new(self.shared.clone(), 0)
    }

    /// Key lookup through the root navigator.
    pub fn get(&self, key: impl Into<Key>) -> Result<Item> {
        let key = key.into();
        match self.root()? {
            Some(nav) => nav.get(key),
            None => Err(Error::KeyNotFound(key)),
        }
    }

    /// Index lookup through the root navigator.
    pub fn at(&self, index: usize) -> Result<Item> {
        match self.root()? {
            Some(nav) => nav.at(index),
            None => Err(Error::IndexOutOfRange { index: index as i64, len: 0 }),
        }
    }

    /// Keys of the root map, in file order.
    pub fn keys(&self) -> Result<Vec<Key>> {
        match self.root()? {
            Some(nav) => nav.keys(),
            None => Err(Error::NotSized),
        }
    }

    /// Entry count of the root container (or leading array extent).
    pub fn len(&self) -> Result<usize> {
        match self.root()? {
            Some(nav) => nav.len(),
            None => Err(Error::NotSized),
        }
    }

    /// Iterates the root list, materializing each item.
    pub fn iter(&self) -> Result<NavIter> {
        match self.root()? {
            Some(nav) => nav.iter(),
            None => Err(Error::NotIterable),
        }
    }

    /// Line-per-atom dump of the raw token stream; see `DumpOptions`.
    pub fn debug_dump(&self, opts: DumpOptions) -> Result<Vec<String>> {
        let mut inner = self.shared.borrow_mut();
        let (file, endian) = inner.reader_parts()?;
        let mut scan = Scanner::new(file, endian);
        scan.seek_to(0)?;
        dump::dump(&mut scan, opts)
    }

    /// Closes every open scope innermost-first and releases the file.
    /// Idempotent; all later operations (including through navigators)
    /// fail with `Reopened`.
    pub fn close(&self) -> Result<()> {
        self.shared.borrow_mut().close()
    }
}

impl Drop for TagFile {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.shared.try_borrow_mut() {
            let _ = inner.close();
        }
    }
}
