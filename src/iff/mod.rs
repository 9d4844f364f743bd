//! IFF container primitives
use crate::{error::*, recoverable_error};

pub mod quetzal;

pub fn usize_as_vec(d: usize, bytes: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for i in (0..bytes).rev() {
        data.push(((d >> (8 * i)) & 0xFF) as u8);
    }
    data
}

pub fn vec_to_u32(v: &[u8], offset: usize, bytes: usize) -> u32 {
    let mut u: u32 = 0;
    for i in 0..bytes {
        u |= (v[offset + i] as u32) << ((bytes - i - 1) * 8);
    }
    u
}

pub fn vec_to_id(v: &[u8], offset: usize) -> String {
    let mut id = String::new();
    for i in 0..4 {
        id.push(v[offset + i] as char);
    }
    id
}

pub fn id_as_vec(id: &str) -> Vec<u8> {
    id.as_bytes()[0..4].to_vec()
}

/// Build chunk bytes: 4-byte id, 4-byte length, payload, pad byte if odd.
pub fn chunk(id: &str, data: &mut Vec<u8>) -> Vec<u8> {
    let mut chunk = id_as_vec(id);
    let data_length = data.len();
    chunk.append(&mut usize_as_vec(data_length, 4));
    chunk.append(data);
    if data_length % 2 == 1 {
        // Padding byte, not included in chunk length
        chunk.push(0);
    }
    chunk
}

/// A typed record in an IFF container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    id: String,
    data: Vec<u8>,
}

impl Chunk {
    pub fn new(id: &str, data: Vec<u8>) -> Chunk {
        Chunk {
            id: id.to_string(),
            data,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn from_vec(v: &[u8], offset: usize) -> Result<Chunk, RuntimeError> {
        if offset + 8 > v.len() {
            return recoverable_error!(
                ErrorCode::IFF,
                "Chunk header at {:#x} runs past the end of the file ({:#x})",
                offset,
                v.len()
            );
        }
        let id = vec_to_id(v, offset);
        let length = vec_to_u32(v, offset + 4, 4) as usize;
        if offset + 8 + length > v.len() {
            return recoverable_error!(
                ErrorCode::IFF,
                "Chunk '{}' at {:#x} declares {} bytes, past the end of the file ({:#x})",
                id,
                offset,
                length,
                v.len()
            );
        }
        let data = v[offset + 8..offset + 8 + length].to_vec();
        Ok(Chunk { id, data })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        chunk(&self.id, &mut self.data.clone())
    }
}

/// A parsed IFF file: `FORM`, length, sub-form id, then chunks.
pub struct IFF {
    form: String,
    sub_form: String,
    chunks: Vec<Chunk>,
}

impl IFF {
    pub fn from_vec(v: &[u8]) -> Result<IFF, RuntimeError> {
        if v.len() < 12 {
            return recoverable_error!(ErrorCode::IFF, "Not an IFF file: {} bytes", v.len());
        }
        let form = vec_to_id(v, 0);
        let length = vec_to_u32(v, 4, 4) as usize;
        let sub_form = vec_to_id(v, 8);
        let end = 8 + length;
        if end > v.len() {
            return recoverable_error!(
                ErrorCode::IFF,
                "IFF declares {} bytes but the file has {}",
                end,
                v.len()
            );
        }

        let mut chunks = Vec::new();
        let mut offset = 12;
        while offset < end {
            let chunk = Chunk::from_vec(v, offset)?;
            offset += 8 + chunk.data().len();
            if chunk.data().len() % 2 == 1 {
                offset += 1;
            }
            chunks.push(chunk);
        }

        Ok(IFF {
            form,
            sub_form,
            chunks,
        })
    }

    pub fn form(&self) -> &str {
        &self.form
    }

    pub fn sub_form(&self) -> &str {
        &self.sub_form
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<Chunk> {
        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_ok;

    #[test]
    fn test_usize_as_vec() {
        assert_eq!(usize_as_vec(0x12345678, 4), &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(usize_as_vec(0x1234, 2), &[0x12, 0x34]);
    }

    #[test]
    fn test_vec_to_u32() {
        assert_eq!(vec_to_u32(&[0x12, 0x34, 0x56, 0x78], 0, 4), 0x12345678);
        assert_eq!(vec_to_u32(&[0x12, 0x34, 0x56, 0x78], 1, 2), 0x3456);
    }

    #[test]
    fn test_chunk_padding() {
        let c = chunk("Test", &mut vec![1, 2, 3]);
        assert_eq!(
            c,
            &[b'T', b'e', b's', b't', 0x00, 0x00, 0x00, 0x03, 1, 2, 3, 0]
        );
    }

    #[test]
    fn test_chunk_from_vec() {
        let v = vec![b'T', b'e', b's', b't', 0x00, 0x00, 0x00, 0x03, 1, 2, 3, 0];
        let c = assert_ok!(Chunk::from_vec(&v, 0));
        assert_eq!(c.id(), "Test");
        assert_eq!(c.data(), &[1, 2, 3]);
        assert_eq!(c.to_vec(), v);
    }

    #[test]
    fn test_chunk_from_vec_truncated() {
        let v = vec![b'T', b'e', b's', b't', 0x00, 0x00, 0x00, 0x10, 1, 2, 3];
        assert!(Chunk::from_vec(&v, 0).is_err());
    }

    #[test]
    fn test_iff_from_vec() {
        let mut v = id_as_vec("FORM");
        let mut body = id_as_vec("IFZS");
        body.append(&mut chunk("AAAA", &mut vec![1, 2, 3, 4]));
        body.append(&mut chunk("BBBB", &mut vec![5]));
        v.append(&mut usize_as_vec(body.len(), 4));
        v.append(&mut body);
        let iff = assert_ok!(IFF::from_vec(&v));
        assert_eq!(iff.form(), "FORM");
        assert_eq!(iff.sub_form(), "IFZS");
        assert_eq!(iff.chunks().len(), 2);
        assert_eq!(iff.chunks()[0].id(), "AAAA");
        assert_eq!(iff.chunks()[1].id(), "BBBB");
        assert_eq!(iff.chunks()[1].data(), &[5]);
    }

    #[test]
    fn test_iff_from_vec_bad_length() {
        let mut v = id_as_vec("FORM");
        v.append(&mut usize_as_vec(0x100, 4));
        v.append(&mut id_as_vec("IFZS"));
        assert!(IFF::from_vec(&v).is_err());
    }
}
