//! Resolution of names stored in the strings block.
//!
//! The strings block is a pool of NUL-terminated byte strings, referenced by byte offset from
//! property tokens. Names are returned as slices borrowed from the blob; nothing is copied.

use crate::err::{DecodeError, Result};
use crate::fdt_header::FdtHeader;
use crate::utils::bytes;

use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringTable<'a> {
    block: &'a [u8],
    block_offset: usize,
}

impl<'a> StringTable<'a> {
    /// Borrows the strings block of an already validated header.
    pub fn new(blob: &'a [u8], header: &FdtHeader) -> Self {
        let range = header.strings_block();
        let block_offset = range.start;
        // Only a header that wasn't validated against this blob can miss here.
        let block = blob.get(range).unwrap_or(&[]);
        StringTable {
            block,
            block_offset,
        }
    }

    /// Returns the name stored at `name_offset` (relative to the strings block), without the
    /// terminating NUL.
    ///
    /// `at` is the blob offset reported if resolution fails.
    pub fn resolve(&self, name_offset: u32, at: u64) -> Result<&'a [u8]> {
        let overflow = || DecodeError::StringTableOverflow {
            name_offset,
            block_size: self.block.len() as u32,
            offset: at,
        };

        let start = name_offset as usize;
        if start >= self.block.len() {
            return Err(overflow());
        }

        let nul = bytes::find_nul(self.block, start).ok_or_else(overflow)?;
        let name = &self.block[start..nul];

        trace!(
            "resolved name `{}` at strings offset {} (blob offset {})",
            String::from_utf8_lossy(name),
            name_offset,
            self.block_offset + start
        );

        Ok(name)
    }

    /// Size of the strings block in bytes.
    pub fn len(&self) -> usize {
        self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParserSettings;
    use crate::err::ErrorKind;
    use crate::tests::fixtures::FdtBuilder;

    fn table_with(strings: &[u8]) -> (Vec<u8>, FdtHeader) {
        let blob = FdtBuilder::new()
            .begin_node("")
            .end_node()
            .raw_strings(strings)
            .build();
        let header = FdtHeader::from_buffer(&blob, &ParserSettings::default()).unwrap();
        (blob, header)
    }

    #[test]
    fn test_resolves_names_by_offset() {
        let (blob, header) = table_with(b"compatible\0reg\0#address-cells\0");
        let table = StringTable::new(&blob, &header);

        assert_eq!(table.resolve(0, 0).unwrap(), b"compatible");
        assert_eq!(table.resolve(11, 0).unwrap(), b"reg");
        // Offsets may point into the middle of another string.
        assert_eq!(table.resolve(13, 0).unwrap(), b"g");
        assert_eq!(table.resolve(15, 0).unwrap(), b"#address-cells");
        assert_eq!(table.len(), 30);
    }

    #[test]
    fn test_resolved_name_borrows_the_blob() {
        let (blob, header) = table_with(b"model\0");
        let table = StringTable::new(&blob, &header);
        let name = table.resolve(0, 0).unwrap();

        let block = header.strings_block();
        let blob_range = blob[block].as_ptr_range();
        assert!(blob_range.contains(&name.as_ptr()));
    }

    #[test]
    fn test_offset_past_block_overflows() {
        let (blob, header) = table_with(b"model\0");
        let table = StringTable::new(&blob, &header);

        let err = table.resolve(6, 0x40).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StringTableOverflow);
        assert_eq!(err.offset(), 0x40);
        assert!(table.resolve(u32::MAX, 0).is_err());
    }

    #[test]
    fn test_missing_terminator_overflows() {
        // The builder places the strings block last, so there is nothing after it in the blob
        // that could accidentally terminate the name.
        let (blob, header) = table_with(b"model\0status");
        let table = StringTable::new(&blob, &header);

        assert_eq!(table.resolve(0, 0).unwrap(), b"model");
        assert_eq!(
            table.resolve(6, 0).unwrap_err().kind(),
            ErrorKind::StringTableOverflow
        );
    }

    #[test]
    fn test_terminator_must_be_inside_the_block() {
        let (mut blob, header) = table_with(b"model\0status");
        // Bytes after the declared block must not terminate a name, even if they are zero.
        blob.push(0);
        let table = StringTable::new(&blob, &header);
        assert!(table.resolve(6, 0).is_err());
    }
}
