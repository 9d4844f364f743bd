use std::fmt;

use super::super::*;
use crate::{error::*, recoverable_error};

/// Identification chunk: the first 128 bytes of the original program image,
/// used to verify a save matches the program it was made from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IFhd {
    data: Vec<u8>,
}

impl fmt::Display for IFhd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IFhd: {} bytes", self.data.len())
    }
}

impl TryFrom<&Chunk> for IFhd {
    type Error = RuntimeError;

    fn try_from(value: &Chunk) -> Result<Self, Self::Error> {
        if value.data().len() != super::IFHD_LENGTH {
            recoverable_error!(
                ErrorCode::Restore,
                "IFhd chunk is {} bytes, expected {}",
                value.data().len(),
                super::IFHD_LENGTH
            )
        } else {
            Ok(IFhd::new(value.data()))
        }
    }
}

impl From<&IFhd> for Chunk {
    fn from(value: &IFhd) -> Chunk {
        Chunk::new("IFhd", value.data.clone())
    }
}

impl IFhd {
    pub fn new(data: &[u8]) -> IFhd {
        IFhd {
            data: data.to_vec(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
