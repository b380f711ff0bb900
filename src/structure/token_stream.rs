use crate::err::{DecodeError, OutOfBounds, Result};
use crate::fdt_header::FdtHeader;
use crate::string_table::StringTable;
use crate::structure::tokens::FdtToken;
use crate::structure::visitor::FdtEvent;
use crate::utils::ByteCursor;

use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Finished,
    Failed,
}

/// A forward-only walk over the structure block.
///
/// Yields one [`FdtEvent`] per `FDT_BEGIN_NODE`, `FDT_END_NODE` and `FDT_PROP` token, in stream
/// order; `FDT_NOP` tokens are skipped. Iteration ends cleanly at an `FDT_END` token found at
/// depth zero. Any structural problem is yielded once as an `Err`, after which the stream is
/// exhausted; there is no attempt to resynchronize.
///
/// Only a depth counter is kept, the tree itself is never materialized.
#[derive(Debug, Clone)]
pub struct TokenStream<'a> {
    cursor: ByteCursor<'a>,
    strings: StringTable<'a>,
    depth: usize,
    state: State,
}

impl<'a> TokenStream<'a> {
    /// Creates a stream over the structure block of `blob`, as declared by a validated header.
    pub fn new(blob: &'a [u8], header: &FdtHeader) -> Result<Self> {
        let block = header.struct_block();

        // Limit the cursor to the end of the structure block, while keeping positions absolute.
        let limited = blob.get(..block.end).ok_or(DecodeError::TruncatedBuffer {
            what: "structure block",
            offset: block.start as u64,
            need: block.end as u64,
            have: blob.len() as u64,
        })?;
        let cursor = ByteCursor::with_pos(limited, block.start).map_err(DecodeError::truncated)?;

        Ok(TokenStream {
            cursor,
            strings: StringTable::new(blob, header),
            depth: 0,
            state: State::Running,
        })
    }

    /// Number of currently open nodes.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Blob offset of the next token to be read.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// `true` once an `FDT_END` token has been reached with every node closed.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Reads tokens until one produces an event. `Ok(None)` means `FDT_END` was reached.
    fn read_event(&mut self) -> Result<Option<FdtEvent<'a>>> {
        loop {
            let offset = self.cursor.position();
            let unterminated = unterminated(self.depth);

            if !self.cursor.is_aligned(4) {
                return Err(DecodeError::UnalignedAccess {
                    what: "structure block token",
                    offset,
                    alignment: 4,
                });
            }

            if self.cursor.is_eof() {
                return Err(DecodeError::UnterminatedStructure {
                    reason: "missing FDT_END token",
                    depth: self.depth,
                    offset,
                });
            }

            let value = self.cursor.u32_named("token").map_err(unterminated)?;
            let token =
                FdtToken::from_u32(value).ok_or(DecodeError::UnknownToken { value, offset })?;

            trace!("Offset `0x{offset:08x} ({offset})` token {token:?}, depth {}", self.depth);

            match token {
                FdtToken::Nop => continue,
                FdtToken::BeginNode => {
                    let name = self.cursor.null_terminated("node name").map_err(unterminated)?;
                    self.cursor.align4("node name padding").map_err(unterminated)?;
                    self.depth += 1;

                    trace!("\t begin node `{}`", String::from_utf8_lossy(name));
                    return Ok(Some(FdtEvent::BeginNode { name }));
                }
                FdtToken::EndNode => {
                    if self.depth == 0 {
                        return Err(DecodeError::UnmatchedEndNode { offset });
                    }
                    self.depth -= 1;
                    return Ok(Some(FdtEvent::EndNode));
                }
                FdtToken::Property => {
                    if self.depth == 0 {
                        return Err(DecodeError::UnmatchedProperty { offset });
                    }

                    let len = self
                        .cursor
                        .u32_named("property.length")
                        .map_err(unterminated)?;
                    let name_offset_at = self.cursor.position();
                    let name_offset = self
                        .cursor
                        .u32_named("property.name_offset")
                        .map_err(unterminated)?;

                    let name = self.strings.resolve(name_offset, name_offset_at)?;
                    let value = self
                        .cursor
                        .take_bytes(len as usize, "property.value")
                        .map_err(unterminated)?;
                    self.cursor
                        .align4("property value padding")
                        .map_err(unterminated)?;

                    trace!(
                        "\t property `{}` ({} bytes)",
                        String::from_utf8_lossy(name),
                        value.len()
                    );
                    return Ok(Some(FdtEvent::Property { name, value }));
                }
                FdtToken::End => {
                    if self.depth != 0 {
                        return Err(DecodeError::UnterminatedStructure {
                            reason: "FDT_END inside an open node",
                            depth: self.depth,
                            offset,
                        });
                    }
                    return Ok(None);
                }
            }
        }
    }
}

/// Running out of structure block bytes mid-token means the block was never terminated.
fn unterminated(depth: usize) -> impl Fn(OutOfBounds) -> DecodeError + Copy {
    move |e| DecodeError::UnterminatedStructure {
        reason: e.what,
        depth,
        offset: e.offset,
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = Result<FdtEvent<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != State::Running {
            return None;
        }

        match self.read_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.state = State::Finished;
                None
            }
            Err(e) => {
                self.state = State::Failed;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for TokenStream<'_> {}
