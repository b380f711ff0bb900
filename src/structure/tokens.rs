/// Marks the beginning of a node. Followed by the node's NUL-terminated unit name, padded to a
/// 4-byte boundary.
pub const FDT_BEGIN_NODE: u32 = 0x0000_0001;

/// Marks the end of a node. No extra data.
pub const FDT_END_NODE: u32 = 0x0000_0002;

/// Marks a property. Followed by the value length, the name's offset in the strings block and
/// the value itself, padded to a 4-byte boundary.
pub const FDT_PROP: u32 = 0x0000_0003;

/// Ignored by readers; used to blank out nodes or properties in place.
pub const FDT_NOP: u32 = 0x0000_0004;

/// Marks the end of the structure block.
pub const FDT_END: u32 = 0x0000_0009;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdtToken {
    BeginNode,
    EndNode,
    Property,
    Nop,
    End,
}

impl FdtToken {
    pub fn from_u32(value: u32) -> Option<FdtToken> {
        match value {
            FDT_BEGIN_NODE => Some(FdtToken::BeginNode),
            FDT_END_NODE => Some(FdtToken::EndNode),
            FDT_PROP => Some(FdtToken::Property),
            FDT_NOP => Some(FdtToken::Nop),
            FDT_END => Some(FdtToken::End),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            FdtToken::BeginNode => FDT_BEGIN_NODE,
            FdtToken::EndNode => FDT_END_NODE,
            FdtToken::Property => FDT_PROP,
            FdtToken::Nop => FDT_NOP,
            FdtToken::End => FDT_END,
        }
    }
}
