use std::fmt;

use super::header::{self, HeaderField};
use super::memory::Memory;
use crate::{error::*, fatal_error, recoverable_error};

/// Lowest version this engine will load
const VERSION_MIN: u32 = 0x00020000;
/// Highest version this engine will load
const VERSION_MAX: u32 = 0x000301FF;

/// Memory sizes are always multiples of this
const MEM_ROUND: usize = 256;

/// Number of original image bytes used to identify a save file
pub const ID_LENGTH: usize = 128;

/// The program image: a ROM+RAM address space covering `[0, end_mem)`.
///
/// Addresses below `ram_start` are read-only after load.  The address space
/// only grows or shrinks through [`Image::set_end_mem`], and never below the
/// size declared in the header.
pub struct Image {
    memory: Memory,
    original: Vec<u8>,
    version: u32,
    ram_start: usize,
    ext_start: usize,
    end_mem: usize,
    min_mem: usize,
    stack_size: usize,
    start_func: usize,
    decoding_table: usize,
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Image: version {:x}, ramstart {:#x}, endmem {:#x}",
            self.version, self.ram_start, self.end_mem
        )
    }
}

fn round_up(size: usize) -> usize {
    size.div_ceil(MEM_ROUND) * MEM_ROUND
}

impl Image {
    pub fn new(data: Vec<u8>) -> Result<Image, RuntimeError> {
        if data.len() < header::LENGTH {
            return recoverable_error!(
                ErrorCode::InvalidImage,
                "Image is {} bytes, too short for a header",
                data.len()
            );
        }

        let m = Memory::new(data.clone(), usize::MAX);
        let magic = header::field_word(&m, HeaderField::Magic)?;
        if magic != header::MAGIC {
            return recoverable_error!(
                ErrorCode::InvalidImage,
                "Bad magic number {:#010x}",
                magic
            );
        }

        let version = header::field_word(&m, HeaderField::Version)?;
        if !(VERSION_MIN..=VERSION_MAX).contains(&version) {
            return recoverable_error!(
                ErrorCode::InvalidImage,
                "Unsupported image version {:x}.{:x}.{:x}",
                version >> 16,
                (version >> 8) & 0xFF,
                version & 0xFF
            );
        }

        let ram_start = header::field_word(&m, HeaderField::RamStart)? as usize;
        let ext_start = header::field_word(&m, HeaderField::ExtStart)? as usize;
        let end_mem = header::field_word(&m, HeaderField::EndMem)? as usize;
        let stack_size = header::field_word(&m, HeaderField::StackSize)? as usize;
        let start_func = header::field_word(&m, HeaderField::StartFunc)? as usize;
        let decoding_table = header::field_word(&m, HeaderField::DecodingTable)? as usize;

        if end_mem < header::LENGTH
            || ram_start > end_mem
            || ram_start < header::LENGTH
            || ext_start < ram_start
            || ext_start > end_mem
        {
            return recoverable_error!(
                ErrorCode::InvalidImage,
                "Inconsistent header sizes: ramstart {:#x}, extstart {:#x}, endmem {:#x}",
                ram_start,
                ext_start,
                end_mem
            );
        }

        // [ext_start, end_mem) is not stored in the file
        let mut map = m.copy(0, end_mem);
        map.truncate(end_mem);
        let memory = Memory::new(map, u32::MAX as usize);

        info!(target: "app::memory", "Image: {} bytes, ramstart {:#x}, endmem {:#x}", data.len(), ram_start, end_mem);
        Ok(Image {
            memory,
            original: data,
            version,
            ram_start,
            ext_start,
            end_mem,
            min_mem: end_mem,
            stack_size,
            start_func,
            decoding_table,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn ram_start(&self) -> usize {
        self.ram_start
    }

    pub fn end_mem(&self) -> usize {
        self.end_mem
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    pub fn start_func(&self) -> usize {
        self.start_func
    }

    pub fn decoding_table(&self) -> usize {
        self.decoding_table
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// The original image bytes used to match a save file to its program,
    /// zero-filled if the image is shorter.
    pub fn identity(&self) -> Vec<u8> {
        let mut id = vec![0; ID_LENGTH];
        let end = usize::min(ID_LENGTH, self.original.len());
        id[0..end].copy_from_slice(&self.original[0..end]);
        id
    }

    /// Resolve a RAM-relative address
    pub fn ram_address(&self, relative: u32) -> usize {
        (self.ram_start as u32).wrapping_add(relative) as usize
    }

    pub fn read_byte(&self, address: usize) -> Result<u8, RuntimeError> {
        self.memory.read_byte(address)
    }

    pub fn read_short(&self, address: usize) -> Result<u16, RuntimeError> {
        self.memory.read_short(address)
    }

    pub fn read_word(&self, address: usize) -> Result<u32, RuntimeError> {
        self.memory.read_word(address)
    }

    pub fn read_cstring(&self, address: usize) -> Result<Vec<u8>, RuntimeError> {
        self.memory.read_cstring(address)
    }

    pub fn copy(&self, offset: usize, length: usize) -> Vec<u8> {
        self.memory.copy(offset, length)
    }

    fn check_write(&self, address: usize) -> Result<(), RuntimeError> {
        if address < self.ram_start {
            fatal_error!(
                ErrorCode::IllegalAccess,
                "Write to {:#x} is below ramstart {:#x}",
                address,
                self.ram_start
            )
        } else {
            Ok(())
        }
    }

    pub fn write_byte(&mut self, address: usize, value: u8) -> Result<(), RuntimeError> {
        self.check_write(address)?;
        self.memory.write_byte(address, value)
    }

    pub fn write_short(&mut self, address: usize, value: u16) -> Result<(), RuntimeError> {
        self.check_write(address)?;
        self.memory.write_short(address, value)
    }

    pub fn write_word(&mut self, address: usize, value: u32) -> Result<(), RuntimeError> {
        self.check_write(address)?;
        self.memory.write_word(address, value)
    }

    pub fn write_bytes(&mut self, address: usize, bytes: &[u8]) -> Result<(), RuntimeError> {
        self.check_write(address)?;
        self.memory.write_bytes(address, bytes)
    }

    /// Grow or shrink the address space.
    ///
    /// The new size is rounded up to the next multiple of 256 and may never
    /// drop below the size declared in the header.
    pub fn set_end_mem(&mut self, new_size: usize) -> Result<(), RuntimeError> {
        let new_size = usize::max(round_up(new_size), self.min_mem);
        if new_size != self.end_mem {
            debug!(target: "app::memory", "Memory resize {:#x} -> {:#x}", self.end_mem, new_size);
            self.memory.resize(new_size)?;
            self.end_mem = new_size;
        }
        Ok(())
    }

    fn capture(&self, protect: Option<(usize, usize)>) -> Option<(usize, Vec<u8>)> {
        protect.map(|(start, length)| (start, self.memory.copy(start, length)))
    }

    fn replay(&mut self, saved: Option<(usize, Vec<u8>)>) {
        if let Some((start, bytes)) = saved {
            for (i, b) in bytes.iter().enumerate() {
                // Anything now out of range is silently dropped
                let _ = self.memory.write_byte(start + i, *b);
            }
        }
    }

    /// Reconstruct RAM from the original image, optionally preserving a
    /// protected address range.
    pub fn revert(&mut self, protect: Option<(usize, usize)>) -> Result<(), RuntimeError> {
        let saved = self.capture(protect);
        self.memory.resize(self.min_mem)?;
        self.end_mem = self.min_mem;
        let init = usize::min(self.ext_start, self.original.len());
        let ram: Vec<u8> = self.original[self.ram_start..init].to_vec();
        self.memory.write_bytes(self.ram_start, &ram)?;
        for a in init..self.end_mem {
            self.memory.write_byte(a, 0)?;
        }
        self.replay(saved);
        Ok(())
    }

    /// Replace RAM from a save record, optionally preserving a protected
    /// address range.
    pub fn restore_from(
        &mut self,
        ram: &[u8],
        protect: Option<(usize, usize)>,
    ) -> Result<(), RuntimeError> {
        let new_end = self.ram_start + ram.len();
        if new_end < self.min_mem {
            return recoverable_error!(
                ErrorCode::Restore,
                "Saved RAM ends at {:#x}, below the image minimum {:#x}",
                new_end,
                self.min_mem
            );
        }
        let saved = self.capture(protect);
        self.memory.resize(new_end)?;
        self.end_mem = new_end;
        self.memory.write_bytes(self.ram_start, ram)?;
        self.replay(saved);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_ok, assert_ok_eq, test_util::test_image};

    #[test]
    fn test_new() {
        let i = assert_ok!(Image::new(test_image()));
        assert_eq!(i.ram_start(), 0x28);
        assert_eq!(i.end_mem(), 0x100);
        assert_eq!(i.stack_size(), 0x400);
        assert_eq!(i.start_func(), 0x28);
    }

    #[test]
    fn test_new_bad_magic() {
        let mut map = test_image();
        map[0] = b'X';
        let i = Image::new(map);
        assert!(i.is_err_and(|e| e.is_recoverable()));
    }

    #[test]
    fn test_new_too_short() {
        assert!(Image::new(vec![0; 8]).is_err());
    }

    #[test]
    fn test_new_inconsistent_sizes() {
        let mut map = test_image();
        // ramstart beyond endmem
        map[0x08..0x0C].copy_from_slice(&[0x00, 0x00, 0x02, 0x00]);
        assert!(Image::new(map).is_err());
    }

    #[test]
    fn test_write_protection() {
        let mut i = assert_ok!(Image::new(test_image()));
        assert!(i.write_byte(0x27, 1).is_err());
        assert!(i.write_byte(0x28, 1).is_ok());
        assert_ok_eq!(i.read_byte(0x28), 1);
    }

    #[test]
    fn test_identity() {
        let i = assert_ok!(Image::new(test_image()));
        let id = i.identity();
        assert_eq!(id.len(), ID_LENGTH);
        assert_eq!(&id[0..4], b"Glul");
    }

    #[test]
    fn test_set_end_mem() {
        let mut i = assert_ok!(Image::new(test_image()));
        assert!(i.set_end_mem(0x101).is_ok());
        assert_eq!(i.end_mem(), 0x200);
        assert_ok_eq!(i.read_byte(0x1FF), 0);
        // Never below the header size
        assert!(i.set_end_mem(0).is_ok());
        assert_eq!(i.end_mem(), 0x100);
    }

    #[test]
    fn test_revert() {
        let mut i = assert_ok!(Image::new(test_image()));
        assert!(i.write_byte(0x30, 0xAA).is_ok());
        assert!(i.write_byte(0x40, 0xBB).is_ok());
        assert!(i.revert(None).is_ok());
        assert_ok_eq!(i.read_byte(0x30), test_image()[0x30]);
        assert_ok_eq!(i.read_byte(0x40), test_image()[0x40]);
    }

    #[test]
    fn test_revert_protect() {
        let mut i = assert_ok!(Image::new(test_image()));
        assert!(i.write_byte(0x30, 0xAA).is_ok());
        assert!(i.write_byte(0x40, 0xBB).is_ok());
        assert!(i.revert(Some((0x40, 1))).is_ok());
        assert_ok_eq!(i.read_byte(0x30), test_image()[0x30]);
        assert_ok_eq!(i.read_byte(0x40), 0xBB);
    }

    #[test]
    fn test_restore_from() {
        let mut i = assert_ok!(Image::new(test_image()));
        let ram = vec![0xCC; 0x100 - 0x28];
        assert!(i.restore_from(&ram, None).is_ok());
        assert_ok_eq!(i.read_byte(0x28), 0xCC);
        assert_ok_eq!(i.read_byte(0xFF), 0xCC);
        // ROM untouched
        assert_ok_eq!(i.read_byte(0x00), b'G');
    }

    #[test]
    fn test_restore_from_too_small() {
        let mut i = assert_ok!(Image::new(test_image()));
        assert!(i.write_byte(0x28, 0x11).is_ok());
        let r = i.restore_from(&[0xCC; 4], None);
        assert!(r.is_err_and(|e| e.is_recoverable()));
        // Prior state untouched
        assert_ok_eq!(i.read_byte(0x28), 0x11);
    }
}
