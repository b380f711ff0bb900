use crate::err::{DecodeError, Result};
use crate::fdt_header::FdtHeader;
use crate::utils::ByteCursor;

use log::debug;
use serde::Serialize;

/// A single entry of the memory reservation block.
///
/// Gives the physical address and size in bytes of a region of memory that is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ReservationEntry {
    pub address: u64,
    pub size: u64,
}

impl ReservationEntry {
    pub fn new(address: u64, size: u64) -> Self {
        ReservationEntry { address, size }
    }

    fn is_terminator(&self) -> bool {
        self.address == 0 && self.size == 0
    }
}

/// Lazily walks the memory reservation block.
///
/// Yields entries in stream order until the `(0, 0)` terminator. Running out of bytes before the
/// terminator yields a single `TruncatedBuffer` error and ends iteration.
#[derive(Debug, Clone)]
pub struct MemoryReservationBlock<'a> {
    cursor: ByteCursor<'a>,
    done: bool,
}

impl<'a> MemoryReservationBlock<'a> {
    /// The block starts at `mem_rsvmap_offset` and may extend up to `total_size`.
    pub fn new(blob: &'a [u8], header: &FdtHeader) -> Result<Self> {
        let region = header.mem_rsvmap_region();
        let limited = blob.get(..region.end).ok_or(DecodeError::TruncatedBuffer {
            what: "memory reservation block",
            offset: region.start as u64,
            need: region.end as u64,
            have: blob.len() as u64,
        })?;

        let cursor = ByteCursor::with_pos(limited, region.start).map_err(DecodeError::truncated)?;

        Ok(MemoryReservationBlock {
            cursor,
            done: false,
        })
    }

    /// Reads the whole block, stopping at the first error.
    pub fn parse(blob: &'a [u8], header: &FdtHeader) -> Result<Vec<ReservationEntry>> {
        let entries = Self::new(blob, header)?.collect::<Result<Vec<_>>>()?;
        debug!("read {} memory reservation(s)", entries.len());
        Ok(entries)
    }

    fn read_entry(&mut self) -> Result<ReservationEntry> {
        let mut cursor = self.cursor;
        let address = cursor
            .u64_named("reservation.address")
            .map_err(DecodeError::truncated)?;
        let size = cursor
            .u64_named("reservation.size")
            .map_err(DecodeError::truncated)?;
        self.cursor = cursor;

        Ok(ReservationEntry::new(address, size))
    }
}

impl Iterator for MemoryReservationBlock<'_> {
    type Item = Result<ReservationEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.read_entry() {
            Ok(entry) if entry.is_terminator() => {
                self.done = true;
                None
            }
            Ok(entry) => Some(Ok(entry)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
