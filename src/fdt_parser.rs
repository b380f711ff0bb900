use crate::err::{DecodeError, ErrorKind, InputError, Result};
use crate::fdt_header::FdtHeader;
use crate::memory_reservation::{MemoryReservationBlock, ReservationEntry};
use crate::structure::token_stream::TokenStream;
use crate::structure::visitor::FdtVisitor;
use crate::utils::dump_around;

use log::{debug, warn};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const DEFAULT_MINIMUM_VERSION: u32 = 16;
pub const DEFAULT_SUPPORTED_VERSION: u32 = 17;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserSettings {
    /// Oldest `format_version` a blob may declare.
    minimum_version: u32,
    /// Newest format version the decoder implements, compared against the blob's
    /// `last_compatible_version`.
    supported_version: u32,
}

impl Default for ParserSettings {
    fn default() -> Self {
        ParserSettings {
            minimum_version: DEFAULT_MINIMUM_VERSION,
            supported_version: DEFAULT_SUPPORTED_VERSION,
        }
    }
}

impl ParserSettings {
    pub fn new() -> Self {
        ParserSettings::default()
    }

    pub fn minimum_version(mut self, minimum_version: u32) -> Self {
        self.minimum_version = minimum_version;
        self
    }

    pub fn supported_version(mut self, supported_version: u32) -> Self {
        self.supported_version = supported_version;
        self
    }

    pub fn get_minimum_version(&self) -> u32 {
        self.minimum_version
    }

    pub fn get_supported_version(&self) -> u32 {
        self.supported_version
    }
}

/// Outcome of decoding a whole blob.
///
/// Always produced, even when decoding stopped early: whatever was read before the first error
/// (the header, any reservation entries, and the events already delivered to the visitor) stays
/// valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeResult {
    pub header: Option<FdtHeader>,
    pub reservations: Vec<ReservationEntry>,
    pub error: Option<DecodeError>,
}

impl DecodeResult {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&DecodeError> {
        self.error.as_ref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(DecodeError::kind)
    }

    pub fn error_offset(&self) -> Option<u64> {
        self.error.as_ref().map(DecodeError::offset)
    }
}

/// Holds a device tree blob in memory and decodes it on demand.
///
/// ```
/// use dtb::{FdtParser, OwnedFdtEvent};
///
/// # let blob = include_bytes!("../samples/simple.dtb").to_vec();
/// let parser = FdtParser::from_buffer(blob);
///
/// let mut events: Vec<OwnedFdtEvent> = Vec::new();
/// let result = parser.decode(&mut events);
///
/// assert!(result.is_valid());
/// assert_eq!(events.first(), Some(&OwnedFdtEvent::begin_node("")));
/// ```
#[derive(Debug, Clone)]
pub struct FdtParser {
    data: Vec<u8>,
    config: ParserSettings,
}

impl FdtParser {
    /// Reads the whole file at `path` into memory.
    pub fn from_path(path: impl AsRef<Path>) -> std::result::Result<Self, InputError> {
        let path = path.as_ref();

        let mut f = File::open(path).map_err(|source| InputError::FailedToOpenFile {
            path: path.to_path_buf(),
            source,
        })?;

        let mut data = Vec::new();
        f.read_to_end(&mut data)
            .map_err(|source| InputError::FailedToRead {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("read {} bytes from {}", data.len(), path.display());

        Ok(Self::from_buffer(data))
    }

    pub fn from_buffer(data: Vec<u8>) -> Self {
        FdtParser {
            data,
            config: ParserSettings::default(),
        }
    }

    pub fn with_configuration(mut self, configuration: ParserSettings) -> Self {
        self.config = configuration;
        self
    }

    pub fn settings(&self) -> &ParserSettings {
        &self.config
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Reads and validates the header only.
    pub fn header(&self) -> Result<FdtHeader> {
        FdtHeader::from_buffer(&self.data, &self.config)
    }

    /// Reads the complete memory reservation block.
    pub fn reservations(&self) -> Result<Vec<ReservationEntry>> {
        let header = self.header()?;
        MemoryReservationBlock::parse(&self.data, &header)
    }

    /// Lazily walks the memory reservation block.
    pub fn reservation_entries(&self) -> Result<MemoryReservationBlock<'_>> {
        let header = self.header()?;
        MemoryReservationBlock::new(&self.data, &header)
    }

    /// Pull-style access to the structure block events.
    ///
    /// Only the header is validated up front; the reservation block is not read.
    pub fn events(&self) -> Result<TokenStream<'_>> {
        let header = self.header()?;
        TokenStream::new(&self.data, &header)
    }

    /// Decodes the whole blob, forwarding every structure event to `visitor`.
    pub fn decode(&self, visitor: &mut impl FdtVisitor) -> DecodeResult {
        decode_with_settings(&self.data, &self.config, visitor)
    }
}

/// Decodes `blob` with the default [`ParserSettings`].
pub fn decode(blob: &[u8], visitor: &mut impl FdtVisitor) -> DecodeResult {
    decode_with_settings(blob, &ParserSettings::default(), visitor)
}

pub fn decode_with_settings(
    blob: &[u8],
    settings: &ParserSettings,
    visitor: &mut impl FdtVisitor,
) -> DecodeResult {
    let mut result = DecodeResult::default();

    if let Err(e) = decode_into(blob, settings, visitor, &mut result) {
        warn!("failed to decode device tree blob: {}", e);
        debug!(
            "blob around offset {}:\n{}",
            e.offset(),
            dump_around(blob, e.offset() as usize, 32)
        );
        result.error = Some(e);
    }

    result
}

fn decode_into(
    blob: &[u8],
    settings: &ParserSettings,
    visitor: &mut impl FdtVisitor,
    result: &mut DecodeResult,
) -> Result<()> {
    let header = FdtHeader::from_buffer(blob, settings)?;
    result.header = Some(header);

    debug!(
        "blocks: rsvmap @ {}, struct {:?}, strings {:?}",
        header.mem_rsvmap_offset,
        header.struct_block(),
        header.strings_block()
    );

    for entry in MemoryReservationBlock::new(blob, &header)? {
        result.reservations.push(entry?);
    }

    for event in TokenStream::new(blob, &header)? {
        event?.visit(&mut *visitor);
    }

    Ok(())
}
