//! # Tagfile
//!
//! File handles for the tagpack format: whole-value read/write,
//! incremental container construction through a scope stack, positional
//! navigation without materialization, n-D array slicing with
//! contiguous-run coalescing, and in-place array cell edits.
//!
//! ## Handles and navigators
//!
//! A [`TagFile`] owns one OS file and its cursor; it is single-threaded
//! by design. A [`Nav`] is a cheap pointer into the file (an offset plus
//! a cached header) handed out by lookups; closing the file invalidates
//! every navigator, which then fail with `Reopened`.
//!
//! ## Write modes
//!
//! Structural writes (`write`, `add`, `set`, scope openers) need a
//! `create`d handle. In-place array assignment needs `open_rw`. A
//! read-only handle refuses both with `ReadOnly`.

pub mod dump;
pub mod file;
pub mod nav;
pub mod slice;

#[cfg(test)]
mod tests;

pub use dump::DumpOptions;

pub use file::OpenMode;
pub use file::ScopeKind;
pub use file::ScopeRef;
pub use file::TagFile;

pub use nav::Item;
pub use nav::Nav;
pub use nav::NavIter;
pub use nav::NavKind;

pub use slice::AxisSel;

pub use tagpack::Array;
pub use tagpack::ByteOrder;
pub use tagpack::Error;
pub use tagpack::Key;
pub use tagpack::Result;
pub use tagpack::Value;
