use super::memory::Memory;
use crate::error::RuntimeError;

/// Byte offsets of the 36-byte image header fields
#[derive(Clone, Copy, Debug)]
pub enum HeaderField {
    Magic = 0x00,
    Version = 0x04,
    RamStart = 0x08,
    ExtStart = 0x0C,
    EndMem = 0x10,
    StackSize = 0x14,
    StartFunc = 0x18,
    DecodingTable = 0x1C,
    Checksum = 0x20,
}

/// "Glul"
pub const MAGIC: u32 = 0x476C756C;

/// Total header length
pub const LENGTH: usize = 36;

pub fn field_word(memory: &Memory, field: HeaderField) -> Result<u32, RuntimeError> {
    memory.read_word(field as usize)
}
