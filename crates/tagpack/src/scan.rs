//! Pull-based tokenizer and header combiner.
//!
//! The scanner never reads a payload on its own: a `Type` token leaves
//! its payload bytes pending, and the next pull seeks past whatever the
//! caller did not consume. This is what lets the same machinery serve
//! full materialization, positional skipping, and the debug dump.

use std::io::ErrorKind;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

use byteordered::Endianness;

use crate::error::Error;
use crate::error::Result;
use crate::length;
use crate::types::Tag;
use crate::types::host_order;

/// Structural terminal with no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    ListOpen,
    ListClose,
    MapOpen,
    MapClose,
    True,
    False,
    Null,
    Footnote,
}

impl Term {
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'[' => Some(Term::ListOpen),
            b']' => Some(Term::ListClose),
            b'{' => Some(Term::MapOpen),
            b'}' => Some(Term::MapClose),
            b'T' => Some(Term::True),
            b'F' => Some(Term::False),
            b'n' => Some(Term::Null),
            b'*' => Some(Term::Footnote),
            _ => None,
        }
    }

    pub const fn as_byte(self) -> u8 {
        match self {
            Term::ListOpen => b'[',
            Term::ListClose => b']',
            Term::MapOpen => b'{',
            Term::MapClose => b'}',
            Term::True => b'T',
            Term::False => b'F',
            Term::Null => b'n',
            Term::Footnote => b'*',
        }
    }
}

/// One lexical atom of the grammar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    Term(Term),
    /// One length field: the tag byte it was written with and its value.
    /// Consecutive lengths multiply into the next `Type` token's payload.
    Length { tag: u8, value: u64 },
    /// A type tag; `payload` bytes of raw data follow and are left
    /// pending until read or skipped.
    Type { tag: Tag, payload: u64 },
}

/// A combined value header: footnotes skipped, shape gathered.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub kind: HeaderKind,
    /// Length fields preceding the type tag, in file order.
    pub shape: Vec<usize>,
    /// Total payload bytes for `Element` headers.
    pub payload: usize,
    /// Offsets of the content of each footnote attached to this value.
    pub footnotes: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    ListOpen,
    MapOpen,
    ListClose,
    MapClose,
    True,
    False,
    Null,
    Element(Tag),
    /// Physical end of stream, or the 0x00 framing byte.
    End,
}

/// What `skip_value` found instead of (or at the end of) a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// One complete value was skipped.
    Value,
    ListClose,
    MapClose,
    End,
}

enum Bare {
    Term(Term),
    Typed { tag: Tag, shape: Vec<usize>, payload: u64 },
    End,
}

pub struct Scanner<R> {
    src: R,
    endian: Endianness,
    pending: u64,
    mult: u64,
}

impl<R: Read + Seek> Scanner<R> {
    pub fn new(src: R, endian: Endianness) -> Self {
        Scanner { src, endian, pending: 0, mult: 1 }
    }

    pub fn endian(&self) -> Endianness {
        self.endian
    }

    pub fn need_byteswap(&self) -> bool {
        self.endian != host_order()
    }

    /// Moves the cursor and discards any pending payload or length run.
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.src.seek(SeekFrom::Start(pos))?;
        self.pending = 0;
        self.mult = 1;
        Ok(())
    }

    /// Current stream position. With a payload pending this is where the
    /// payload starts.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.src.stream_position()?)
    }

    /// Unread bytes of the last `Type` token's payload.
    pub fn payload_remaining(&self) -> u64 {
        self.pending
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        loop {
            match self.src.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(b[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn skip_pending(&mut self) -> Result<()> {
        if self.pending > 0 {
            let n = i64::try_from(self.pending).map_err(|_| Error::ValueTooLarge)?;
            self.src.seek(SeekFrom::Current(n))?;
            self.pending = 0;
        }
        Ok(())
    }

    /// Layer A: yields the next token, seeking past any unread payload.
    /// `None` is end of stream (physical, or the 0x00 framing byte).
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_pending()?;
        let byte = match self.next_byte()? {
            None | Some(0x00) => return Ok(None),
            Some(b) => b,
        };
        if let Some(term) = Term::from_byte(byte) {
            return Ok(Some(Token::Term(term)));
        }
        if length::is_length_tag(byte) {
            let value = length::read_length(&mut self.src, self.endian, byte)?;
            self.mult = self.mult.checked_mul(value).ok_or(Error::ValueTooLarge)?;
            return Ok(Some(Token::Length { tag: byte, value }));
        }
        if let Some(tag) = Tag::from_u8(byte) {
            let payload = self
                .mult
                .checked_mul(tag.elem_size() as u64)
                .ok_or(Error::ValueTooLarge)?;
            self.pending = payload;
            self.mult = 1;
            return Ok(Some(Token::Type { tag, payload }));
        }
        Err(Error::BadTag(byte))
    }

    fn next_bare(&mut self) -> Result<Bare> {
        let mut shape = Vec::new();
        loop {
            match self.next_token()? {
                None => {
                    if !shape.is_empty() {
                        // Lengths with no terminal type tag.
                        return Err(Error::Truncated);
                    }
                    return Ok(Bare::End);
                }
                Some(Token::Term(t)) => {
                    if !shape.is_empty() {
                        return Err(Error::BadTag(t.as_byte()));
                    }
                    return Ok(Bare::Term(t));
                }
                Some(Token::Length { value, .. }) => {
                    shape.push(usize::try_from(value).map_err(|_| Error::ValueTooLarge)?);
                }
                Some(Token::Type { tag, payload }) => {
                    return Ok(Bare::Typed { tag, shape, payload });
                }
            }
        }
    }

    /// Layer B: collects length runs into a shape and pairs them with
    /// the terminal tag, transparently skipping `*`-introduced footnotes
    /// (their content offsets are reported on the header).
    pub fn next_header(&mut self) -> Result<Header> {
        let mut footnotes = Vec::new();
        loop {
            match self.next_bare()? {
                Bare::Term(Term::Footnote) => {
                    footnotes.push(self.position()?);
                    match self.skip_value()? {
                        Skip::Value => {}
                        Skip::ListClose => return Err(Error::BadTag(b']')),
                        Skip::MapClose => return Err(Error::BadTag(b'}')),
                        Skip::End => return Err(Error::Truncated),
                    }
                }
                Bare::Term(t) => {
                    let kind = match t {
                        Term::ListOpen => HeaderKind::ListOpen,
                        Term::ListClose => HeaderKind::ListClose,
                        Term::MapOpen => HeaderKind::MapOpen,
                        Term::MapClose => HeaderKind::MapClose,
                        Term::True => HeaderKind::True,
                        Term::False => HeaderKind::False,
                        Term::Null => HeaderKind::Null,
                        Term::Footnote => unreachable!(),
                    };
                    return Ok(Header { kind, shape: Vec::new(), payload: 0, footnotes });
                }
                Bare::Typed { tag, shape, payload } => {
                    let payload = usize::try_from(payload).map_err(|_| Error::ValueTooLarge)?;
                    return Ok(Header { kind: HeaderKind::Element(tag), shape, payload, footnotes });
                }
                Bare::End => {
                    return Ok(Header {
                        kind: HeaderKind::End,
                        shape: Vec::new(),
                        payload: 0,
                        footnotes,
                    });
                }
            }
        }
    }

    /// Skips one whole value, nested containers and footnotes included.
    /// A container closed by EOF still counts as one skipped value.
    pub fn skip_value(&mut self) -> Result<Skip> {
        let mut depth = 0usize;
        loop {
            let header = self.next_header()?;
            match header.kind {
                HeaderKind::ListOpen | HeaderKind::MapOpen => depth += 1,
                HeaderKind::ListClose => {
                    if depth == 0 {
                        return Ok(Skip::ListClose);
                    }
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Skip::Value);
                    }
                }
                HeaderKind::MapClose => {
                    if depth == 0 {
                        return Ok(Skip::MapClose);
                    }
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Skip::Value);
                    }
                }
                HeaderKind::End => {
                    return Ok(if depth == 0 { Skip::End } else { Skip::Value });
                }
                HeaderKind::True | HeaderKind::False | HeaderKind::Null | HeaderKind::Element(_) => {
                    self.skip_pending()?;
                    if depth == 0 {
                        return Ok(Skip::Value);
                    }
                }
            }
        }
    }

    /// Reads the entire pending payload.
    pub fn read_payload(&mut self) -> Result<Vec<u8>> {
        let len = usize::try_from(self.pending).map_err(|_| Error::ValueTooLarge)?;
        let mut buf = vec![0u8; len];
        self.src.read_exact(&mut buf).map_err(Error::from_read)?;
        self.pending = 0;
        Ok(buf)
    }

    /// Reads at most `max` bytes of the pending payload; the remainder
    /// stays pending and is skipped on the next pull.
    pub fn read_payload_limit(&mut self, max: usize) -> Result<Vec<u8>> {
        let len = usize::try_from(self.pending.min(max as u64)).unwrap_or(max);
        let mut buf = vec![0u8; len];
        self.src.read_exact(&mut buf).map_err(Error::from_read)?;
        self.pending -= len as u64;
        Ok(buf)
    }
}
