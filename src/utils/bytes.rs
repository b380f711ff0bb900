//! Byte-slice utilities for bounds-oriented parsing.
//!
//! This module is intentionally tiny and *boring*: it provides a consistent way to read
//! big-endian primitives out of `&[u8]` at fixed offsets, with minimal overhead.
//!
//! There are two layers:
//! - **Option layer** (`read_*`): zero-cost helpers that return `Option<T>`.
//! - **Result layer** (`*_r`): wrappers that map `None` to [`OutOfBounds`], carrying the
//!   offset and what was being read.
//!
//! Design notes:
//! - All numeric reads are **big-endian** (every FDT field is BE).
//! - Offsets are `usize` and are interpreted relative to the slice you pass in.
//!
//! Example (fixed-size header parsing):
//!
//! ```ignore
//! use crate::utils::bytes;
//!
//! let _ = bytes::slice_r(buf, 0, 40, "FDT header")?;
//! let magic = bytes::read_u32_be_r(buf, 0, "header.magic")?;
//! ```

use byteorder::{BigEndian, ByteOrder};

use crate::err::OutOfBounds;

/// Read `N` raw bytes at `offset`.
///
/// Returns `None` if the range is out of bounds.
pub(crate) fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    let bytes: [u8; N] = buf.get(offset..end)?.try_into().ok()?;
    Some(bytes)
}

/// Read a `u32` (big-endian) at `offset`.
pub(crate) fn read_u32_be(buf: &[u8], offset: usize) -> Option<u32> {
    Some(BigEndian::read_u32(&read_array::<4>(buf, offset)?))
}

/// Read a `u64` (big-endian) at `offset`.
pub(crate) fn read_u64_be(buf: &[u8], offset: usize) -> Option<u64> {
    Some(BigEndian::read_u64(&read_array::<8>(buf, offset)?))
}

/// Position of the first NUL at or after `offset`, if any.
pub(crate) fn find_nul(buf: &[u8], offset: usize) -> Option<usize> {
    buf.get(offset..)?
        .iter()
        .position(|b| *b == 0)
        .map(|rel| offset + rel)
}

#[inline]
pub(crate) fn out_of_bounds(what: &'static str, offset: usize, need: usize, len: usize) -> OutOfBounds {
    OutOfBounds {
        what,
        offset: offset as u64,
        need,
        have: len.saturating_sub(offset),
    }
}

pub(crate) fn slice_r<'a>(
    buf: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], OutOfBounds> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| out_of_bounds(what, offset, len, buf.len()))?;
    buf.get(offset..end)
        .ok_or_else(|| out_of_bounds(what, offset, len, buf.len()))
}

/// Read a `u32` (big-endian) at `offset`, or return [`OutOfBounds`].
pub(crate) fn read_u32_be_r(buf: &[u8], offset: usize, what: &'static str) -> Result<u32, OutOfBounds> {
    read_u32_be(buf, offset).ok_or_else(|| out_of_bounds(what, offset, 4, buf.len()))
}

/// Read a `u64` (big-endian) at `offset`, or return [`OutOfBounds`].
pub(crate) fn read_u64_be_r(buf: &[u8], offset: usize, what: &'static str) -> Result<u64, OutOfBounds> {
    read_u64_be(buf, offset).ok_or_else(|| out_of_bounds(what, offset, 8, buf.len()))
}

/// Round `n` up to the next multiple of 4 (FDT token alignment).
#[inline]
pub(crate) const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_are_big_endian() {
        let buf = [0xd0, 0x0d, 0xfe, 0xed, 0, 0, 0, 0, 0, 0, 0, 1];
        assert_eq!(read_u32_be(&buf, 0), Some(0xd00d_feed));
        assert_eq!(read_u64_be(&buf, 4), Some(1));
        assert_eq!(read_u32_be(&buf, 9), None);
    }

    #[test]
    fn test_result_layer_reports_what_and_have() {
        let buf = [0u8; 6];
        let err = read_u32_be_r(&buf, 4, "prop.len").unwrap_err();
        assert_eq!(
            err,
            OutOfBounds {
                what: "prop.len",
                offset: 4,
                need: 4,
                have: 2,
            }
        );

        let err = slice_r(&buf, usize::MAX, 2, "huge").unwrap_err();
        assert_eq!(err.have, 0);
    }

    #[test]
    fn test_find_nul() {
        let buf = b"ab\0cd\0";
        assert_eq!(find_nul(buf, 0), Some(2));
        assert_eq!(find_nul(buf, 3), Some(5));
        assert_eq!(find_nul(b"abc", 0), None);
        assert_eq!(find_nul(b"abc", 10), None);
    }

    #[test]
    fn test_align4() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(13), 16);
    }
}
