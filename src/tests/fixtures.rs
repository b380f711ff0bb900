#![allow(dead_code)]
use crate::fdt_header::{FDT_HEADER_SIZE, FDT_MAGIC};
use crate::structure::tokens::{FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_NOP, FDT_PROP};

/// Assembles device tree blobs for tests.
///
/// Layout is always header, reservation block, structure block, strings block, with no gaps.
/// An `FDT_END` token is appended to the structure block unless [`FdtBuilder::without_end`] is
/// used.
#[derive(Debug, Clone)]
pub struct FdtBuilder {
    version: u32,
    last_compatible_version: u32,
    boot_cpu: u32,
    reservations: Vec<(u64, u64)>,
    structure: Vec<u8>,
    strings: Vec<u8>,
    append_end: bool,
}

impl Default for FdtBuilder {
    fn default() -> Self {
        FdtBuilder {
            version: 17,
            last_compatible_version: 16,
            boot_cpu: 0,
            reservations: Vec::new(),
            structure: Vec::new(),
            strings: Vec::new(),
            append_end: true,
        }
    }
}

impl FdtBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: u32, last_compatible_version: u32) -> Self {
        self.version = version;
        self.last_compatible_version = last_compatible_version;
        self
    }

    pub fn boot_cpu(mut self, id: u32) -> Self {
        self.boot_cpu = id;
        self
    }

    pub fn reserve(mut self, address: u64, size: u64) -> Self {
        self.reservations.push((address, size));
        self
    }

    pub fn token(mut self, token: u32) -> Self {
        self.structure.extend_from_slice(&token.to_be_bytes());
        self
    }

    pub fn begin_node(self, name: &str) -> Self {
        let mut this = self.token(FDT_BEGIN_NODE);
        this.structure.extend_from_slice(name.as_bytes());
        this.structure.push(0);
        this.pad();
        this
    }

    pub fn end_node(self) -> Self {
        self.token(FDT_END_NODE)
    }

    pub fn nop(self) -> Self {
        self.token(FDT_NOP)
    }

    pub fn end(self) -> Self {
        self.token(FDT_END)
    }

    /// Adds a property, interning `name` in the strings block.
    pub fn property(mut self, name: &str, value: &[u8]) -> Self {
        let name_offset = self.intern(name);
        self.property_at(name_offset, value)
    }

    /// Adds a property with an explicit (possibly bogus) strings block offset.
    pub fn property_at(self, name_offset: u32, value: &[u8]) -> Self {
        let mut this = self.token(FDT_PROP);
        this.structure
            .extend_from_slice(&(value.len() as u32).to_be_bytes());
        this.structure.extend_from_slice(&name_offset.to_be_bytes());
        this.structure.extend_from_slice(value);
        this.pad();
        this
    }

    /// Adds raw bytes to the strings block without deduplication.
    pub fn raw_strings(mut self, bytes: &[u8]) -> Self {
        self.strings.extend_from_slice(bytes);
        self
    }

    pub fn without_end(mut self) -> Self {
        self.append_end = false;
        self
    }

    /// Offset of the structure block in the built blob.
    pub fn struct_block_offset(&self) -> usize {
        FDT_HEADER_SIZE + 16 * (self.reservations.len() + 1)
    }

    /// Absolute offset the next structure token would be written at.
    pub fn next_token_offset(&self) -> usize {
        self.struct_block_offset() + self.structure.len()
    }

    pub fn strings_block_offset(&self) -> usize {
        self.next_token_offset() + if self.append_end { 4 } else { 0 }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut structure = self.structure.clone();
        if self.append_end {
            structure.extend_from_slice(&FDT_END.to_be_bytes());
        }

        let rsvmap_offset = FDT_HEADER_SIZE;
        let struct_offset = self.struct_block_offset();
        let strings_offset = struct_offset + structure.len();
        let total_size = strings_offset + self.strings.len();

        let header = [
            FDT_MAGIC,
            total_size as u32,
            struct_offset as u32,
            strings_offset as u32,
            rsvmap_offset as u32,
            self.version,
            self.last_compatible_version,
            self.boot_cpu,
            self.strings.len() as u32,
            structure.len() as u32,
        ];

        let mut blob = Vec::with_capacity(total_size);
        for field in header {
            blob.extend_from_slice(&field.to_be_bytes());
        }
        for (address, size) in self.reservations.iter().copied().chain([(0, 0)]) {
            blob.extend_from_slice(&address.to_be_bytes());
            blob.extend_from_slice(&size.to_be_bytes());
        }
        blob.extend_from_slice(&structure);
        blob.extend_from_slice(&self.strings);

        blob
    }

    fn intern(&mut self, name: &str) -> u32 {
        let mut offset = 0;
        for existing in self.strings.split(|b| *b == 0) {
            if existing == name.as_bytes() && offset + existing.len() < self.strings.len() {
                return offset as u32;
            }
            offset += existing.len() + 1;
        }

        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        offset
    }

    fn pad(&mut self) {
        while self.structure.len() % 4 != 0 {
            self.structure.push(0);
        }
    }
}
