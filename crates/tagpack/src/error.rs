//! # Error Definitions
//!
//! The central ledger of codec and file-layer failures.

use crate::types::Tag;
use crate::value::Key;

#[derive(Debug)]
pub enum Error {
    /// The underlying stream failed.
    Io(std::io::Error),
    /// EOF inside a length field or payload.
    Truncated,
    /// Unknown or disallowed tag byte at the current position.
    BadTag(u8),
    /// A container or boolean tag appeared in map-key position.
    BadKey,
    /// The writer was asked to encode something with no tag mapping.
    UnsupportedType(&'static str),
    /// A length or integer exceeds the representable range of its tag.
    ValueTooLarge,
    /// List, array, or gather index out of bounds.
    IndexOutOfRange { index: i64, len: usize },
    /// Map lookup miss.
    KeyNotFound(Key),
    /// The value does not have a length.
    NotSized,
    /// The value does not support key or index lookup.
    NotIndexable,
    /// The value cannot be iterated.
    NotIterable,
    /// Assignment right-hand side does not match the selected shape.
    ShapeMismatch { expected: Vec<usize>, found: Vec<usize> },
    /// Assignment right-hand side does not match the target element type.
    DtypeMismatch { expected: Tag, found: Tag },
    /// Write through a scope that has already been closed.
    ScopeClosed,
    /// List operation on a map scope, or vice versa.
    WrongContainerKind,
    /// Mutation on a handle without write access.
    ReadOnly,
    /// Operation on a handle that has been closed.
    Reopened,
}

impl Error {
    /// Maps a failed payload read: a short read is a truncated file,
    /// anything else is an I/O fault.
    pub fn from_read(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Truncated
        } else {
            Error::Io(e)
        }
    }

    /// Malformed payload contents (e.g. text that is not valid UTF-8).
    pub(crate) fn invalid_data(msg: &'static str) -> Self {
        Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::BadTag(b) => write!(f, "invalid tag byte: {:#04x}", b),
            Error::UnsupportedType(what) => write!(f, "unsupported type: {}", what),
            Error::IndexOutOfRange { index, len } => {
                write!(f, "index {} out of range for length {}", index, len)
            }
            Error::KeyNotFound(k) => write!(f, "key not found: {}", k),
            Error::ShapeMismatch { expected, found } => {
                write!(f, "shape mismatch: expected {:?}, found {:?}", expected, found)
            }
            Error::DtypeMismatch { expected, found } => {
                write!(f, "dtype mismatch: expected {:?}, found {:?}", expected, found)
            }
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Specialized `Result` for tagpack operations.
pub type Result<T> = std::result::Result<T, Error>;
