use std::fmt;

use super::super::*;
use crate::{error::*, recoverable_error};

/// Heap chunk: the heap base address, the block count, then an
/// `{offset, length}` pair for each allocated block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MAll {
    address: u32,
    blocks: Vec<(u32, u32)>,
}

impl fmt::Display for MAll {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MAll: {:#x}, {} blocks", self.address, self.blocks.len())
    }
}

impl TryFrom<&Chunk> for MAll {
    type Error = RuntimeError;

    fn try_from(value: &Chunk) -> Result<Self, Self::Error> {
        let data = value.data();
        if data.len() < 8 {
            return recoverable_error!(
                ErrorCode::Restore,
                "MAll chunk is {} bytes, too short for a header",
                data.len()
            );
        }
        let address = vec_to_u32(data, 0, 4);
        let count = vec_to_u32(data, 4, 4) as usize;
        if data.len() != 8 + 8 * count {
            return recoverable_error!(
                ErrorCode::Restore,
                "MAll declares {} blocks but is {} bytes",
                count,
                data.len()
            );
        }
        let mut blocks = Vec::new();
        for i in 0..count {
            blocks.push((vec_to_u32(data, 8 * i + 8, 4), vec_to_u32(data, 8 * i + 12, 4)));
        }
        Ok(MAll { address, blocks })
    }
}

impl From<&MAll> for Chunk {
    fn from(value: &MAll) -> Chunk {
        let mut data = usize_as_vec(value.address as usize, 4);
        data.append(&mut usize_as_vec(value.blocks.len(), 4));
        for (offset, length) in &value.blocks {
            data.append(&mut usize_as_vec(*offset as usize, 4));
            data.append(&mut usize_as_vec(*length as usize, 4));
        }
        Chunk::new("MAll", data)
    }
}

impl MAll {
    pub fn new(address: u32, blocks: &[(u32, u32)]) -> MAll {
        MAll {
            address,
            blocks: blocks.to_vec(),
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn blocks(&self) -> &[(u32, u32)] {
        &self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_ok;

    #[test]
    fn test_round_trip() {
        let mall = MAll::new(0x10000, &[(0, 16), (32, 64)]);
        let chunk = Chunk::from(&mall);
        assert_eq!(chunk.id(), "MAll");
        assert_eq!(chunk.data().len(), 8 + 16);
        assert_eq!(assert_ok!(MAll::try_from(&chunk)), mall);
    }

    #[test]
    fn test_entry_stride() {
        let mall = MAll::new(0x10000, &[(0x20, 0x40)]);
        let chunk = Chunk::from(&mall);
        // Offset at 8i+8, length at 8i+12
        assert_eq!(&chunk.data()[8..12], &[0, 0, 0, 0x20]);
        assert_eq!(&chunk.data()[12..16], &[0, 0, 0, 0x40]);
    }

    #[test]
    fn test_bad_count() {
        let chunk = Chunk::new("MAll", vec![0, 1, 0, 0, 0, 0, 0, 5]);
        assert!(MAll::try_from(&chunk).is_err());
    }
}
