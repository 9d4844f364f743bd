//! The Quetzal save-file container
use std::fmt;

use self::{ifhd::IFhd, mall::MAll, stks::Stks, umem::UMem};
use super::*;
use crate::{error::*, recoverable_error};

pub mod ifhd;
pub mod mall;
pub mod stks;
pub mod umem;

/// Length of the identification chunk payload
pub const IFHD_LENGTH: usize = 128;

/// A save record: an ordered set of typed chunks.
///
/// Chunk order is irrelevant for lookup but preserved on serialization, so
/// a loaded record writes back byte-for-byte.  Chunk ids this engine does
/// not understand are retained opaquely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quetzal {
    chunks: Vec<Chunk>,
}

impl fmt::Display for Quetzal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Quetzal:")?;
        for chunk in &self.chunks {
            write!(f, " {}[{}]", chunk.id(), chunk.data().len())?;
        }
        Ok(())
    }
}

impl TryFrom<&[u8]> for Quetzal {
    type Error = RuntimeError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let iff = IFF::from_vec(value)?;
        if iff.form() != "FORM" || iff.sub_form() != "IFZS" {
            error!(target: "app::quetzal", "Not a save file: '{}'/'{}'", iff.form(), iff.sub_form());
            return recoverable_error!(
                ErrorCode::Restore,
                "Not a save file: '{}'/'{}'",
                iff.form(),
                iff.sub_form()
            );
        }
        Ok(Quetzal {
            chunks: iff.into_chunks(),
        })
    }
}

impl From<&Quetzal> for Vec<u8> {
    fn from(value: &Quetzal) -> Self {
        let mut form = id_as_vec("FORM");
        let mut ifzs = id_as_vec("IFZS");
        for chunk in &value.chunks {
            ifzs.append(&mut chunk.to_vec());
        }
        form.append(&mut usize_as_vec(ifzs.len(), 4));
        form.append(&mut ifzs);
        if form.len() % 2 == 1 {
            form.push(0);
        }
        form
    }
}

impl Quetzal {
    pub fn new(ifhd: IFhd, umem: UMem, mall: Option<MAll>, stks: Stks) -> Quetzal {
        let mut chunks = vec![Chunk::from(&ifhd), Chunk::from(&umem)];
        if let Some(m) = &mall {
            chunks.push(Chunk::from(m));
        }
        chunks.push(Chunk::from(&stks));
        Quetzal { chunks }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, id: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id() == id)
    }

    fn require(&self, id: &str) -> Result<&Chunk, RuntimeError> {
        match self.chunk(id) {
            Some(c) => Ok(c),
            None => recoverable_error!(ErrorCode::Restore, "Save record has no {} chunk", id),
        }
    }

    pub fn ifhd(&self) -> Result<IFhd, RuntimeError> {
        IFhd::try_from(self.require("IFhd")?)
    }

    pub fn umem(&self) -> Result<UMem, RuntimeError> {
        UMem::try_from(self.require("UMem")?)
    }

    pub fn stks(&self) -> Result<Stks, RuntimeError> {
        Ok(Stks::from(self.require("Stks")?))
    }

    pub fn mall(&self) -> Result<Option<MAll>, RuntimeError> {
        match self.chunk("MAll") {
            Some(c) => Ok(Some(MAll::try_from(c)?)),
            None => Ok(None),
        }
    }
}
