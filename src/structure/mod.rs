//! The structure block: token definitions, the tokenizer and the event consumers built on it.

pub mod token_stream;
pub mod tokens;
pub mod tree_builder;
pub mod visitor;

pub use self::token_stream::TokenStream;
pub use self::tokens::FdtToken;
pub use self::tree_builder::{DeviceTree, Node, NodeId, Property, TreeBuilder};
pub use self::visitor::{FdtEvent, FdtVisitor, OwnedFdtEvent};
