use std::fmt;

use super::super::*;

/// Stack chunk: the raw stack contents below the stack pointer at save
/// time, trailing call stub included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stks {
    data: Vec<u8>,
}

impl fmt::Display for Stks {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Stks: {} bytes", self.data.len())
    }
}

impl From<&Chunk> for Stks {
    fn from(value: &Chunk) -> Stks {
        Stks::new(value.data())
    }
}

impl From<&Stks> for Chunk {
    fn from(value: &Stks) -> Chunk {
        Chunk::new("Stks", value.data.clone())
    }
}

impl Stks {
    pub fn new(data: &[u8]) -> Stks {
        Stks {
            data: data.to_vec(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let stks = Stks::new(&[0, 0, 0, 1, 0, 0, 0, 2]);
        let chunk = Chunk::from(&stks);
        assert_eq!(chunk.id(), "Stks");
        assert_eq!(Stks::from(&chunk), stks);
    }
}
