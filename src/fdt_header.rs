use crate::ParserSettings;
use crate::err::{DecodeError, Result};
use crate::utils::ByteCursor;

use log::debug;
use serde::Serialize;
use std::ops::Range;

pub const FDT_MAGIC: u32 = 0xd00d_feed;
pub const FDT_HEADER_SIZE: usize = 40;
pub const FDT_RESERVATION_ENTRY_SIZE: u64 = 16;

// Byte offsets of the header fields, used to point errors at the field that caused them.
const OFF_TOTAL_SIZE: u64 = 0x04;
const OFF_STRUCT_OFFSET: u64 = 0x08;
const OFF_STRINGS_OFFSET: u64 = 0x0c;
const OFF_RSVMAP_OFFSET: u64 = 0x10;
const OFF_VERSION: u64 = 0x14;
const OFF_LAST_COMPATIBLE_VERSION: u64 = 0x18;

/// The fixed header at the start of every device tree blob.
///
/// All fields are stored as big-endian `u32`, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FdtHeader {
    pub magic: u32,
    /// Size of the whole blob, including any free space between or after the blocks.
    pub total_size: u32,
    pub struct_block_offset: u32,
    pub strings_block_offset: u32,
    pub mem_rsvmap_offset: u32,
    pub format_version: u32,
    /// Lowest version this blob is backwards compatible with.
    pub last_compatible_version: u32,
    pub boot_cpu_physical_id: u32,
    pub strings_block_size: u32,
    pub struct_block_size: u32,
}

impl FdtHeader {
    /// Reads and validates the header at the start of `blob`.
    ///
    /// On success every block the header declares is known to lie inside both `total_size`
    /// and `blob`, so the block accessors below can be used to slice without further checks.
    pub fn from_buffer(blob: &[u8], settings: &ParserSettings) -> Result<FdtHeader> {
        let mut cursor = ByteCursor::with_pos(blob, 0).map_err(DecodeError::truncated)?;

        // Magic is checked on its own, so that a blob that isn't a device tree at all is reported
        // as such even if it is shorter than a header.
        let magic = cursor
            .u32_named("header.magic")
            .map_err(DecodeError::truncated)?;

        if magic != FDT_MAGIC {
            return Err(DecodeError::InvalidMagic {
                found: magic,
                offset: 0,
            });
        }

        let mut field = |what: &'static str| cursor.u32_named(what).map_err(DecodeError::truncated);

        let header = FdtHeader {
            magic,
            total_size: field("header.total_size")?,
            struct_block_offset: field("header.struct_block_offset")?,
            strings_block_offset: field("header.strings_block_offset")?,
            mem_rsvmap_offset: field("header.mem_rsvmap_offset")?,
            format_version: field("header.format_version")?,
            last_compatible_version: field("header.last_compatible_version")?,
            boot_cpu_physical_id: field("header.boot_cpu_physical_id")?,
            strings_block_size: field("header.strings_block_size")?,
            struct_block_size: field("header.struct_block_size")?,
        };

        debug!("FDT header: {:?}", header);

        header.validate(blob.len(), settings)?;

        Ok(header)
    }

    fn validate(&self, buffer_len: usize, settings: &ParserSettings) -> Result<()> {
        // Points at whichever version field is out of range, `format_version` first.
        let version_offset = if self.format_version < settings.get_minimum_version() {
            Some(OFF_VERSION)
        } else if self.last_compatible_version > settings.get_supported_version() {
            Some(OFF_LAST_COMPATIBLE_VERSION)
        } else {
            None
        };

        if let Some(offset) = version_offset {
            return Err(DecodeError::UnsupportedVersion {
                version: self.format_version,
                last_compatible: self.last_compatible_version,
                minimum: settings.get_minimum_version(),
                supported: settings.get_supported_version(),
                offset,
            });
        }

        let total_size = u64::from(self.total_size);
        let buffer_len = buffer_len as u64;

        if total_size > buffer_len {
            return Err(DecodeError::TruncatedBuffer {
                what: "header.total_size",
                offset: OFF_TOTAL_SIZE,
                need: total_size,
                have: buffer_len,
            });
        }

        let blocks = [
            (
                "memory reservation block",
                OFF_RSVMAP_OFFSET,
                self.mem_rsvmap_offset,
                FDT_RESERVATION_ENTRY_SIZE,
            ),
            (
                "structure block",
                OFF_STRUCT_OFFSET,
                self.struct_block_offset,
                u64::from(self.struct_block_size),
            ),
            (
                "strings block",
                OFF_STRINGS_OFFSET,
                self.strings_block_offset,
                u64::from(self.strings_block_size),
            ),
        ];

        // u64 arithmetic on two u32s can't overflow.
        for (what, field_offset, start, size) in blocks {
            // No block may start inside the header itself.
            if u64::from(start) < FDT_HEADER_SIZE as u64 {
                return Err(DecodeError::TruncatedBuffer {
                    what,
                    offset: field_offset,
                    need: FDT_HEADER_SIZE as u64,
                    have: u64::from(start),
                });
            }

            let end = u64::from(start) + size;
            if end > total_size {
                return Err(DecodeError::TruncatedBuffer {
                    what,
                    offset: field_offset,
                    need: end,
                    have: total_size,
                });
            }
        }

        if self.struct_block_offset % 4 != 0 {
            return Err(DecodeError::UnalignedAccess {
                what: "structure block",
                offset: u64::from(self.struct_block_offset),
                alignment: 4,
            });
        }

        if self.mem_rsvmap_offset % 8 != 0 {
            return Err(DecodeError::UnalignedAccess {
                what: "memory reservation block",
                offset: u64::from(self.mem_rsvmap_offset),
                alignment: 8,
            });
        }

        Ok(())
    }

    /// Byte range of the structure block within the blob.
    pub fn struct_block(&self) -> Range<usize> {
        let start = self.struct_block_offset as usize;
        start..start + self.struct_block_size as usize
    }

    /// Byte range of the strings block within the blob.
    pub fn strings_block(&self) -> Range<usize> {
        let start = self.strings_block_offset as usize;
        start..start + self.strings_block_size as usize
    }

    /// Byte range the memory reservation block may occupy (up to `total_size`).
    pub fn mem_rsvmap_region(&self) -> Range<usize> {
        self.mem_rsvmap_offset as usize..self.total_size as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::err::ErrorKind;
    use crate::tests::fixtures::FdtBuilder;
    use pretty_assertions::assert_eq;

    fn header_of(blob: &[u8]) -> Result<FdtHeader> {
        FdtHeader::from_buffer(blob, &ParserSettings::default())
    }

    #[test]
    fn test_parses_fdt_header() {
        let blob = FdtBuilder::new()
            .begin_node("")
            .property("compatible", b"acme,board\0")
            .end_node()
            .build();

        let header = header_of(&blob).unwrap();
        assert_eq!(
            header,
            FdtHeader {
                magic: FDT_MAGIC,
                total_size: blob.len() as u32,
                struct_block_offset: 56,
                strings_block_offset: 56 + 40,
                mem_rsvmap_offset: 40,
                format_version: 17,
                last_compatible_version: 16,
                boot_cpu_physical_id: 0,
                strings_block_size: 11,
                struct_block_size: 40,
            }
        );
        assert_eq!(header.struct_block(), 56..96);
        assert_eq!(header.strings_block(), 96..107);
    }

    #[test]
    fn test_fails_with_invalid_magic() {
        let mut blob = FdtBuilder::new().begin_node("").end_node().build();
        blob[0] ^= 0xff;
        let err = header_of(&blob).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMagic);
        assert_eq!(err.offset(), 0);
    }

    #[test]
    fn test_invalid_magic_wins_over_short_buffer() {
        let err = header_of(&[0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMagic);
    }

    #[test]
    fn test_fails_if_buffer_too_small() {
        let err = header_of(&[0xd0, 0x0d]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedBuffer);

        let blob = FdtBuilder::new().begin_node("").end_node().build();
        let err = header_of(&blob[..20]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedBuffer);
        assert_eq!(err.offset(), 20);
    }

    #[test]
    fn test_fails_with_unsupported_version() {
        let blob = FdtBuilder::new()
            .version(15, 15)
            .begin_node("")
            .end_node()
            .build();
        let err = header_of(&blob).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
        assert_eq!(err.offset(), 0x14);

        let blob = FdtBuilder::new()
            .version(18, 18)
            .begin_node("")
            .end_node()
            .build();
        let err = header_of(&blob).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
        assert_eq!(err.offset(), 0x18);

        // Both out of range: the format version is reported.
        let blob = FdtBuilder::new()
            .version(15, 18)
            .begin_node("")
            .end_node()
            .build();
        assert_eq!(header_of(&blob).unwrap_err().offset(), 0x14);

        // Newer blobs which are backwards compatible with what we implement are fine.
        let blob = FdtBuilder::new()
            .version(18, 16)
            .begin_node("")
            .end_node()
            .build();
        assert!(header_of(&blob).is_ok());
    }

    #[test]
    fn test_version_range_is_configurable() {
        let blob = FdtBuilder::new()
            .version(2, 2)
            .begin_node("")
            .end_node()
            .build();
        let settings = ParserSettings::new().minimum_version(2);
        assert!(FdtHeader::from_buffer(&blob, &settings).is_ok());
    }

    #[test]
    fn test_fails_if_total_size_exceeds_buffer() {
        let blob = FdtBuilder::new().begin_node("").end_node().build();
        let err = header_of(&blob[..blob.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedBuffer);
        assert_eq!(err.offset(), 0x04);
    }

    #[test]
    fn test_fails_if_block_exceeds_total_size() {
        let mut blob = FdtBuilder::new().begin_node("").end_node().build();
        // Grow the declared strings block by one byte past the end of the blob.
        let size = u32::from_be_bytes(blob[32..36].try_into().unwrap());
        blob[32..36].copy_from_slice(&(size + 1).to_be_bytes());

        let err = header_of(&blob).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedBuffer);
        assert_eq!(err.offset(), 0x0c);
    }

    #[test]
    fn test_fails_with_unaligned_struct_block() {
        let mut blob = FdtBuilder::new().begin_node("").end_node().build();
        let off = u32::from_be_bytes(blob[8..12].try_into().unwrap());
        blob[8..12].copy_from_slice(&(off + 2).to_be_bytes());
        // Keep the (now shifted) structure block inside the blob.
        let size = u32::from_be_bytes(blob[36..40].try_into().unwrap());
        blob[36..40].copy_from_slice(&(size - 4).to_be_bytes());

        let err = header_of(&blob).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnalignedAccess);
        assert_eq!(err.offset(), u64::from(off + 2));
    }

    #[test]
    fn test_fails_with_unaligned_reservation_block() {
        let mut blob = FdtBuilder::new().begin_node("").end_node().build();
        blob[16..20].copy_from_slice(&0x2cu32.to_be_bytes());

        let err = header_of(&blob).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnalignedAccess);
        assert_eq!(err.offset(), 44);
        assert!(matches!(
            err,
            DecodeError::UnalignedAccess { alignment: 8, .. }
        ));
    }

    #[test]
    fn test_fails_if_block_overlaps_header() {
        let blob = FdtBuilder::new()
            .begin_node("")
            .property("compatible", b"acme,board\0")
            .end_node()
            .build();

        for (field, at) in [(0x08usize, 0u32), (0x0c, 36), (0x10, 8)] {
            let mut blob = blob.clone();
            blob[field..field + 4].copy_from_slice(&at.to_be_bytes());

            let err = header_of(&blob).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TruncatedBuffer, "field 0x{:x}", field);
            assert_eq!(err.offset(), field as u64);
        }
    }
}
