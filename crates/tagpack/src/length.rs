//! Variable-width length fields.
//!
//! A length of 9 or less is a single ASCII digit. Larger values are an
//! `M`/`N`/`O`/`P` tag followed by a u8/u16/u32/u64 in the file's byte
//! order. The writer always picks the smallest form; the reader accepts
//! any form, including a padded `P` for a small number.

use std::io::Read;
use std::io::Write;

use byteordered::Endian;
use byteordered::Endianness;

use crate::error::Error;
use crate::error::Result;

/// Largest length encodable as a single digit.
pub const MAX_INLINE: u64 = 9;

/// True for any byte that can begin a length field.
pub const fn is_length_tag(b: u8) -> bool {
    b.is_ascii_digit() || matches!(b, b'M' | b'N' | b'O' | b'P')
}

/// Emits `n` in its canonical (smallest) encoding.
pub fn write_length<W: Write>(out: &mut W, endian: Endianness, n: u64) -> Result<()> {
    if n <= MAX_INLINE {
        out.write_all(&[b'0' + n as u8])?;
    } else if n <= u64::from(u8::MAX) {
        out.write_all(&[b'M', n as u8])?;
    } else if n <= u64::from(u16::MAX) {
        out.write_all(b"N")?;
        endian.write_u16(&mut *out, n as u16)?;
    } else if n <= u64::from(u32::MAX) {
        out.write_all(b"O")?;
        endian.write_u32(&mut *out, n as u32)?;
    } else {
        out.write_all(b"P")?;
        endian.write_u64(&mut *out, n)?;
    }
    Ok(())
}

/// Decodes the length whose tag byte has already been consumed.
pub fn read_length<R: Read>(src: &mut R, endian: Endianness, tag: u8) -> Result<u64> {
    let value = match tag {
        b'0'..=b'9' => u64::from(tag - b'0'),
        b'M' => {
            let mut b = [0u8; 1];
            src.read_exact(&mut b).map_err(Error::from_read)?;
            u64::from(b[0])
        }
        b'N' => u64::from(endian.read_u16(&mut *src).map_err(Error::from_read)?),
        b'O' => u64::from(endian.read_u32(&mut *src).map_err(Error::from_read)?),
        b'P' => endian.read_u64(&mut *src).map_err(Error::from_read)?,
        other => return Err(Error::BadTag(other)),
    };
    Ok(value)
}
