use std::fmt;

use super::image::Image;
use crate::{error::*, fatal_error};

/// Function body executes with arguments on the stack
pub const CALL_STACK_ARGS: u8 = 0xC0;
/// Function body executes with arguments copied into locals
pub const CALL_LOCAL_ARGS: u8 = 0xC1;

/// Where a call stub sends its value when it is popped.
///
/// The first four kinds are ordinary store destinations; the `Resume` kinds
/// pick the execution mode back up where printing left off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestType {
    /// Discard the value
    None,
    /// Store to a main-memory address
    Memory,
    /// Store to a local at a byte offset in the current frame
    Local,
    /// Push the value
    Stack,
    /// Resume printing a compressed string; the address is the bit number
    ResumeCompressed,
    /// Resume executing code
    ResumeCode,
    /// Resume printing a decimal number; the address is the digit position
    ResumeNumber,
    /// Resume printing a C-string
    ResumeCString,
    /// Resume printing a Unicode string
    ResumeUnicode,
}

impl DestType {
    pub fn from_word(value: u32) -> Result<DestType, RuntimeError> {
        match value {
            0x00 => Ok(DestType::None),
            0x01 => Ok(DestType::Memory),
            0x02 => Ok(DestType::Local),
            0x03 => Ok(DestType::Stack),
            0x10 => Ok(DestType::ResumeCompressed),
            0x11 => Ok(DestType::ResumeCode),
            0x12 => Ok(DestType::ResumeNumber),
            0x13 => Ok(DestType::ResumeCString),
            0x14 => Ok(DestType::ResumeUnicode),
            _ => fatal_error!(
                ErrorCode::StackUnderflow,
                "Call stub has unknown destination type {:#x}",
                value
            ),
        }
    }

    pub fn as_word(&self) -> u32 {
        match self {
            DestType::None => 0x00,
            DestType::Memory => 0x01,
            DestType::Local => 0x02,
            DestType::Stack => 0x03,
            DestType::ResumeCompressed => 0x10,
            DestType::ResumeCode => 0x11,
            DestType::ResumeNumber => 0x12,
            DestType::ResumeCString => 0x13,
            DestType::ResumeUnicode => 0x14,
        }
    }
}

/// The four-word record pushed before entering a callee and popped on the
/// way back out.  Also used to remember where to resume a suspended print.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallStub {
    dest_type: u32,
    dest_addr: u32,
    pc: u32,
    frame_ptr: u32,
}

impl fmt::Display for CallStub {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "stub: dest {:#x}/{:#x}, pc ${:06x}, fp {:#x}",
            self.dest_type, self.dest_addr, self.pc, self.frame_ptr
        )
    }
}

impl CallStub {
    pub fn new(dest_type: u32, dest_addr: u32, pc: u32, frame_ptr: u32) -> CallStub {
        CallStub {
            dest_type,
            dest_addr,
            pc,
            frame_ptr,
        }
    }

    pub fn dest_type(&self) -> u32 {
        self.dest_type
    }

    pub fn dest_addr(&self) -> u32 {
        self.dest_addr
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn frame_ptr(&self) -> u32 {
        self.frame_ptr
    }
}

/// The locals-format table of a function and the frame layout it implies.
///
/// A frame is the frame length word, the locals-start word, a copy of the
/// format table padded to 4 bytes, then the locals themselves, each aligned
/// to its own width, with the whole frame padded to 4 bytes.
#[derive(Debug)]
pub struct LocalsFormat {
    pairs: Vec<(u8, u8)>,
    locals_pos: usize,
    frame_len: usize,
    body: usize,
}

impl LocalsFormat {
    pub fn pairs(&self) -> &[(u8, u8)] {
        &self.pairs
    }

    /// Offset from the frame start to the locals storage
    pub fn locals_pos(&self) -> usize {
        self.locals_pos
    }

    /// Total frame length in bytes
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Address of the first instruction of the function body
    pub fn body(&self) -> usize {
        self.body
    }
}

/// Read the locals-format table of the function at `address` (which must
/// point at the call-type byte) and lay out its frame.
pub fn locals_format(image: &Image, address: usize) -> Result<LocalsFormat, RuntimeError> {
    let mut pairs = Vec::new();
    let mut a = address + 1;
    loop {
        let width = image.read_byte(a)?;
        let count = image.read_byte(a + 1)?;
        a += 2;
        if width == 0 || count == 0 {
            break;
        }
        if width != 1 && width != 2 && width != 4 {
            return fatal_error!(
                ErrorCode::InvalidRoutine,
                "Function at {:#x} declares locals of width {}",
                address,
                width
            );
        }
        pairs.push((width, count));
    }

    let format_len = (2 * (pairs.len() + 1)).div_ceil(4) * 4;
    let locals_pos = 8 + format_len;
    let mut locals_len: usize = 0;
    for (width, count) in &pairs {
        let w = *width as usize;
        locals_len = locals_len.div_ceil(w) * w + w * *count as usize;
    }
    let frame_len = locals_pos + locals_len.div_ceil(4) * 4;

    Ok(LocalsFormat {
        pairs,
        locals_pos,
        frame_len,
        body: a,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_ok, test_util::test_image_with_rom};

    #[test]
    fn test_dest_type_round_trip() {
        for v in [0x00, 0x01, 0x02, 0x03, 0x10, 0x11, 0x12, 0x13, 0x14] {
            let d = assert_ok!(DestType::from_word(v));
            assert_eq!(d.as_word(), v);
        }
        assert!(DestType::from_word(0x04).is_err());
        assert!(DestType::from_word(0x15).is_err());
    }

    #[test]
    fn test_locals_format_empty() {
        // C1 function with no locals
        let image = assert_ok!(Image::new(test_image_with_rom(&[0xC1, 0x00, 0x00])));
        let f = assert_ok!(locals_format(&image, 0x28));
        assert!(f.pairs().is_empty());
        assert_eq!(f.locals_pos(), 12);
        assert_eq!(f.frame_len(), 12);
        assert_eq!(f.body(), 0x2B);
    }

    #[test]
    fn test_locals_format_words() {
        // Three 4-byte locals
        let image = assert_ok!(Image::new(test_image_with_rom(&[
            0xC1, 0x04, 0x03, 0x00, 0x00
        ])));
        let f = assert_ok!(locals_format(&image, 0x28));
        assert_eq!(f.pairs(), &[(4, 3)]);
        assert_eq!(f.locals_pos(), 12);
        assert_eq!(f.frame_len(), 24);
        assert_eq!(f.body(), 0x2D);
    }

    #[test]
    fn test_locals_format_mixed_alignment() {
        // One byte local then one 4-byte local: the word aligns to 4
        let image = assert_ok!(Image::new(test_image_with_rom(&[
            0xC1, 0x01, 0x01, 0x04, 0x01, 0x00, 0x00
        ])));
        let f = assert_ok!(locals_format(&image, 0x28));
        assert_eq!(f.pairs(), &[(1, 1), (4, 1)]);
        // Format table is 3 pairs = 6 bytes, padded to 8
        assert_eq!(f.locals_pos(), 16);
        assert_eq!(f.frame_len(), 24);
    }

    #[test]
    fn test_locals_format_bad_width() {
        let image = assert_ok!(Image::new(test_image_with_rom(&[
            0xC1, 0x03, 0x01, 0x00, 0x00
        ])));
        assert!(locals_format(&image, 0x28).is_err());
    }
}
