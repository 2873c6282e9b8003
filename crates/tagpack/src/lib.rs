//! # Tagpack
//!
//! A self-describing binary container format for tree-shaped data.
//!
//! ## Format
//!
//! - **Elements**: `[length*][tag][payload]`: zero length fields for a
//!   scalar, one per dimension for an array, with payloads stored as
//!   contiguous row-major blocks in the file's byte order.
//! - **Containers**: `'['` value* `']'` lists and `'{'` (key value)* `'}'`
//!   maps, closed explicitly or by end of stream.
//! - **Footnotes**: `'*'` value pairs attach out-of-band metadata to the
//!   value that follows; the leading byte-order mark is one.
//!
//! Tags are single ASCII bytes. Lengths up to 9 are one digit; larger
//! lengths use `M`/`N`/`O`/`P` plus an unsigned integer in file order.

pub mod error;
pub mod length;
pub mod read;
pub mod scan;
pub mod types;
pub mod value;
pub mod write;

pub use error::Error;
pub use error::Result;

pub use types::ByteOrder;
pub use types::Tag;

pub use value::Array;
pub use value::Key;
pub use value::Value;

pub use scan::Header;
pub use scan::HeaderKind;
pub use scan::Scanner;
pub use scan::Skip;
pub use scan::Term;
pub use scan::Token;

pub use read::Reader;
pub use write::Writer;

pub use byteordered::Endianness;
