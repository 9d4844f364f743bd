use std::fmt;

use super::super::*;
use crate::{error::*, recoverable_error};

/// Uncompressed memory chunk: a 4-byte RAM length followed by the raw RAM
/// bytes at save time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UMem {
    ram: Vec<u8>,
}

impl fmt::Display for UMem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UMem: {} bytes", self.ram.len())
    }
}

impl TryFrom<&Chunk> for UMem {
    type Error = RuntimeError;

    fn try_from(value: &Chunk) -> Result<Self, Self::Error> {
        let data = value.data();
        if data.len() < 4 {
            return recoverable_error!(
                ErrorCode::Restore,
                "UMem chunk is {} bytes, too short for a length",
                data.len()
            );
        }
        let length = vec_to_u32(data, 0, 4) as usize;
        if data.len() - 4 != length {
            return recoverable_error!(
                ErrorCode::Restore,
                "UMem declares {} bytes but carries {}",
                length,
                data.len() - 4
            );
        }
        Ok(UMem::new(&data[4..]))
    }
}

impl From<&UMem> for Chunk {
    fn from(value: &UMem) -> Chunk {
        let mut data = usize_as_vec(value.ram.len(), 4);
        data.extend_from_slice(&value.ram);
        Chunk::new("UMem", data)
    }
}

impl UMem {
    pub fn new(ram: &[u8]) -> UMem {
        UMem { ram: ram.to_vec() }
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_ok;

    #[test]
    fn test_round_trip() {
        let umem = UMem::new(&[1, 2, 3, 4, 5]);
        let chunk = Chunk::from(&umem);
        assert_eq!(chunk.id(), "UMem");
        assert_eq!(chunk.data(), &[0, 0, 0, 5, 1, 2, 3, 4, 5]);
        assert_eq!(assert_ok!(UMem::try_from(&chunk)), umem);
    }

    #[test]
    fn test_bad_length() {
        let chunk = Chunk::new("UMem", vec![0, 0, 0, 9, 1, 2]);
        assert!(UMem::try_from(&chunk).is_err());
    }
}
