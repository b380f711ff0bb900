use crate::err::OutOfBounds;
use crate::utils::bytes;

/// A lightweight cursor over an immutable byte slice.
///
/// This is the slice/offset equivalent of `Cursor<&[u8]>`, intended for parsing where:
/// - the data is already in memory, and
/// - we want explicit bounds/offset control without IO-style error plumbing.
///
/// All reads are big-endian and advance the cursor on success. A failed read leaves the
/// cursor where it was.
///
/// Positions are always relative to the *start* of the backing slice, so a cursor created over
/// `&blob[..end]` reports absolute blob offsets while refusing to read past `end`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    #[inline]
    pub(crate) fn with_pos(buf: &'a [u8], pos: usize) -> Result<Self, OutOfBounds> {
        // Allow pos == len (EOF), reject pos > len.
        let _ = bytes::slice_r(buf, pos, 0, "cursor.position")?;
        Ok(Self { buf, pos })
    }

    #[inline]
    pub(crate) fn position(&self) -> u64 {
        self.pos as u64
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    #[inline]
    pub(crate) fn is_eof(&self) -> bool {
        self.remaining() == 0
    }

    #[inline]
    pub(crate) fn is_aligned(&self, alignment: usize) -> bool {
        self.pos % alignment == 0
    }

    #[inline]
    pub(crate) fn take_bytes(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], OutOfBounds> {
        let out = bytes::slice_r(self.buf, self.pos, len, what)?;
        self.pos += len;
        Ok(out)
    }

    #[inline]
    pub(crate) fn u32_named(&mut self, what: &'static str) -> Result<u32, OutOfBounds> {
        let v = bytes::read_u32_be_r(self.buf, self.pos, what)?;
        self.pos += 4;
        Ok(v)
    }

    #[inline]
    pub(crate) fn u64_named(&mut self, what: &'static str) -> Result<u64, OutOfBounds> {
        let v = bytes::read_u64_be_r(self.buf, self.pos, what)?;
        self.pos += 8;
        Ok(v)
    }

    /// Read bytes up to (not including) the next NUL, leaving the cursor just past the NUL.
    pub(crate) fn null_terminated(&mut self, what: &'static str) -> Result<&'a [u8], OutOfBounds> {
        let start = self.pos;
        let nul = bytes::find_nul(self.buf, start)
            .ok_or_else(|| bytes::out_of_bounds(what, start, self.remaining() + 1, self.buf.len()))?;
        self.pos = nul + 1;
        Ok(&self.buf[start..nul])
    }

    /// Advance to the next 4-byte boundary.
    ///
    /// Landing exactly on the end of the buffer is allowed; the padding itself is never
    /// inspected.
    pub(crate) fn align4(&mut self, what: &'static str) -> Result<(), OutOfBounds> {
        let aligned = bytes::align4(self.pos);
        if aligned > self.buf.len() {
            return Err(bytes::out_of_bounds(
                what,
                self.pos,
                aligned - self.pos,
                self.buf.len(),
            ));
        }
        self.pos = aligned;
        Ok(())
    }
}
