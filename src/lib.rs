pub mod err;
pub mod fdt_header;
pub mod fdt_parser;
pub mod memory_reservation;
pub mod string_table;
pub mod structure;

mod utils;

pub use err::{DecodeError, ErrorKind, InputError, Result};
pub use fdt_header::{FDT_MAGIC, FdtHeader};
pub use fdt_parser::{DecodeResult, FdtParser, ParserSettings, decode, decode_with_settings};
pub use memory_reservation::{MemoryReservationBlock, ReservationEntry};
pub use structure::{
    DeviceTree, FdtEvent, FdtToken, FdtVisitor, Node, NodeId, OwnedFdtEvent, Property, TokenStream,
    TreeBuilder,
};
pub use utils::{dump_around, hexdump};

#[cfg(test)]
mod tests;

#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}
