use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Coarse classification of a [`DecodeError`].
///
/// Every failed decode maps to exactly one of these, regardless of how much context the
/// underlying error carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidMagic,
    UnsupportedVersion,
    TruncatedBuffer,
    UnalignedAccess,
    UnknownToken,
    UnmatchedProperty,
    UnmatchedEndNode,
    UnterminatedStructure,
    StringTableOverflow,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidMagic => "InvalidMagic",
            ErrorKind::UnsupportedVersion => "UnsupportedVersion",
            ErrorKind::TruncatedBuffer => "TruncatedBuffer",
            ErrorKind::UnalignedAccess => "UnalignedAccess",
            ErrorKind::UnknownToken => "UnknownToken",
            ErrorKind::UnmatchedProperty => "UnmatchedProperty",
            ErrorKind::UnmatchedEndNode => "UnmatchedEndNode",
            ErrorKind::UnterminatedStructure => "UnterminatedStructure",
            ErrorKind::StringTableOverflow => "StringTableOverflow",
        };
        f.write_str(name)
    }
}

/// A read that would run past the end of the bytes available to a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("out of bounds reading {what} at offset {offset} (need {need} bytes, have {have})")]
pub struct OutOfBounds {
    pub what: &'static str,
    pub offset: u64,
    pub need: usize,
    pub have: usize,
}

/// Errors detected while decoding a device tree blob.
///
/// All offsets are absolute byte offsets into the blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid FDT header magic, expected `d00dfeed`, found `{found:08x}`")]
    InvalidMagic { found: u32, offset: u64 },

    #[error(
        "unsupported FDT version {version} (last compatible {last_compatible}), \
         decoder supports versions {minimum}..={supported}"
    )]
    UnsupportedVersion {
        version: u32,
        last_compatible: u32,
        minimum: u32,
        supported: u32,
        offset: u64,
    },

    #[error("buffer too small for {what} at offset {offset} (need {need} bytes, have {have})")]
    TruncatedBuffer {
        what: &'static str,
        offset: u64,
        need: u64,
        have: u64,
    },

    #[error("unaligned {what} at offset {offset} (requires {alignment}-byte alignment)")]
    UnalignedAccess {
        what: &'static str,
        offset: u64,
        alignment: u64,
    },

    #[error("offset {offset}: `{value:#010x}` is not a valid structure block token")]
    UnknownToken { value: u32, offset: u64 },

    #[error("offset {offset}: property outside of any node")]
    UnmatchedProperty { offset: u64 },

    #[error("offset {offset}: end of node without a matching begin")]
    UnmatchedEndNode { offset: u64 },

    #[error("offset {offset}: unterminated structure block ({reason}, depth {depth})")]
    UnterminatedStructure {
        reason: &'static str,
        depth: usize,
        offset: u64,
    },

    #[error(
        "offset {offset}: string table offset {name_offset} overflows the strings block \
         (size {block_size})"
    )]
    StringTableOverflow {
        name_offset: u32,
        block_size: u32,
        offset: u64,
    },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::InvalidMagic { .. } => ErrorKind::InvalidMagic,
            DecodeError::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            DecodeError::TruncatedBuffer { .. } => ErrorKind::TruncatedBuffer,
            DecodeError::UnalignedAccess { .. } => ErrorKind::UnalignedAccess,
            DecodeError::UnknownToken { .. } => ErrorKind::UnknownToken,
            DecodeError::UnmatchedProperty { .. } => ErrorKind::UnmatchedProperty,
            DecodeError::UnmatchedEndNode { .. } => ErrorKind::UnmatchedEndNode,
            DecodeError::UnterminatedStructure { .. } => ErrorKind::UnterminatedStructure,
            DecodeError::StringTableOverflow { .. } => ErrorKind::StringTableOverflow,
        }
    }

    /// Byte offset (from the start of the blob) at which the error was detected.
    pub fn offset(&self) -> u64 {
        match *self {
            DecodeError::InvalidMagic { offset, .. }
            | DecodeError::UnsupportedVersion { offset, .. }
            | DecodeError::TruncatedBuffer { offset, .. }
            | DecodeError::UnalignedAccess { offset, .. }
            | DecodeError::UnknownToken { offset, .. }
            | DecodeError::UnmatchedProperty { offset }
            | DecodeError::UnmatchedEndNode { offset }
            | DecodeError::UnterminatedStructure { offset, .. }
            | DecodeError::StringTableOverflow { offset, .. } => offset,
        }
    }

    pub(crate) fn truncated(e: OutOfBounds) -> Self {
        DecodeError::TruncatedBuffer {
            what: e.what,
            offset: e.offset,
            need: e.need as u64,
            have: e.have as u64,
        }
    }
}

/// Errors loading a blob into memory, before any decoding happens.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to open file {}: {source}", path.display())]
    FailedToOpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("An I/O error has occurred while reading {}: {source}", path.display())]
    FailedToRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
