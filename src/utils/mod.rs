mod byte_cursor;
pub(crate) mod bytes;
mod hexdump;

pub(crate) use self::byte_cursor::ByteCursor;
pub use self::hexdump::{dump_around, hexdump};
