//! The string-printing state machine.
//!
//! Printing runs one unit per step so it can suspend at any character: under
//! the filter target every emitted unit becomes a function call, with a call
//! stub recording exactly where in the string to pick back up.
use super::io::{IOSYS_CHANNELS, IOSYS_FILTER, IOSYS_WINDOW};
use super::state::frame::DestType;
use super::{ExecMode, Glulx};
use crate::{error::*, fatal_error};

// Decoding-table node types
const NODE_BRANCH: u8 = 0x00;
const NODE_TERMINATOR: u8 = 0x01;
const NODE_CHAR: u8 = 0x02;
const NODE_CSTRING: u8 = 0x03;
const NODE_UNICHAR: u8 = 0x04;
const NODE_UNISTRING: u8 = 0x05;
const NODE_INDIRECT: u8 = 0x08;
const NODE_DOUBLE_INDIRECT: u8 = 0x09;
const NODE_INDIRECT_ARGS: u8 = 0x0A;
const NODE_DOUBLE_INDIRECT_ARGS: u8 = 0x0B;

// In-memory string type tags
const STRING_C: u8 = 0xE0;
const STRING_COMPRESSED: u8 = 0xE1;
const STRING_UNICODE: u8 = 0xE2;

fn unit_char(c: u32) -> char {
    char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Send one character to the current output target.  Under the filter
/// target this pushes a resume stub and becomes a function call instead.
fn emit(glulx: &mut Glulx, c: u32, resume: DestType, resume_addr: u32) -> Result<(), RuntimeError> {
    match glulx.io().mode() {
        IOSYS_FILTER => glulx.call_filter(c, resume, resume_addr),
        IOSYS_CHANNELS => {
            glulx.io_mut().channel_put(unit_char(c));
            Ok(())
        }
        IOSYS_WINDOW => {
            glulx.io_mut().window_put(unit_char(c));
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Print one character from an opcode.  The resume stub points back into
/// code, so a filter call just continues at the next instruction.
pub fn put_char(glulx: &mut Glulx, c: u32) -> Result<(), RuntimeError> {
    emit(glulx, c, DestType::ResumeCode, 0)
}

/// Start printing the string object at `address`, remembering where code
/// execution resumes once it terminates.
pub fn stream_string(glulx: &mut Glulx, address: usize) -> Result<(), RuntimeError> {
    let string_type = glulx.state().read_byte(address)?;
    let (start, mode) = match string_type {
        STRING_C => (address + 1, ExecMode::CString),
        STRING_COMPRESSED => (address + 1, ExecMode::CompressedString),
        STRING_UNICODE => (address + 4, ExecMode::UnicodeString),
        _ => {
            return fatal_error!(
                ErrorCode::Stream,
                "Object at {:#x} is not a string (type {:#04x})",
                address,
                string_type
            )
        }
    };
    glulx
        .state_mut()
        .push_stub(DestType::ResumeCode.as_word(), 0)?;
    glulx.set_bit_pos(0);
    glulx.state_mut().set_pc(start);
    glulx.set_exec_mode(mode);
    Ok(())
}

/// Start printing `value` in decimal.
pub fn stream_number(glulx: &mut Glulx, value: u32) -> Result<(), RuntimeError> {
    glulx
        .state_mut()
        .push_stub(DestType::ResumeCode.as_word(), 0)?;
    glulx.state_mut().set_pc(value as usize);
    glulx.set_printing_digit(0);
    glulx.set_exec_mode(ExecMode::Number);
    Ok(())
}

/// Advance the active string by one unit.
pub fn step(glulx: &mut Glulx) -> Result<(), RuntimeError> {
    match glulx.exec_mode() {
        ExecMode::CString => step_cstring(glulx),
        ExecMode::UnicodeString => step_unicode(glulx),
        ExecMode::Number => step_number(glulx),
        ExecMode::CompressedString => step_compressed(glulx),
        mode => fatal_error!(
            ErrorCode::Stream,
            "String step in execution mode {:?}",
            mode
        ),
    }
}

fn step_cstring(glulx: &mut Glulx) -> Result<(), RuntimeError> {
    let pc = glulx.state().pc();
    let b = glulx.state().read_byte(pc)?;
    if b == 0 {
        glulx.set_exec_mode(ExecMode::Return);
        return Ok(());
    }
    glulx.state_mut().set_pc(pc + 1);
    emit(glulx, b as u32, DestType::ResumeCString, 0)
}

fn step_unicode(glulx: &mut Glulx) -> Result<(), RuntimeError> {
    let pc = glulx.state().pc();
    let c = glulx.state().read_word(pc)?;
    if c == 0 {
        glulx.set_exec_mode(ExecMode::Return);
        return Ok(());
    }
    glulx.state_mut().set_pc(pc + 4);
    emit(glulx, c, DestType::ResumeUnicode, 0)
}

fn step_number(glulx: &mut Glulx) -> Result<(), RuntimeError> {
    // The value being printed rides in the program counter
    let rendered = (glulx.state().pc() as u32 as i32).to_string();
    let digit = glulx.printing_digit();
    match rendered.as_bytes().get(digit) {
        None => {
            glulx.set_exec_mode(ExecMode::Return);
            Ok(())
        }
        Some(c) => {
            glulx.set_printing_digit(digit + 1);
            emit(glulx, *c as u32, DestType::ResumeNumber, (digit + 1) as u32)
        }
    }
}

/// Walk the decoding table from the root to one leaf, consuming one bit of
/// the string per branch, least-significant bit of each byte first.
fn step_compressed(glulx: &mut Glulx) -> Result<(), RuntimeError> {
    let table = glulx.state().stringtbl();
    if table == 0 {
        return fatal_error!(ErrorCode::Stream, "No string decoding table is set");
    }
    let mut node = glulx.state().read_word(table + 8)? as usize;
    loop {
        let kind = glulx.state().read_byte(node)?;
        match kind {
            NODE_BRANCH => {
                let pc = glulx.state().pc();
                let bit_pos = glulx.bit_pos();
                let bit = (glulx.state().read_byte(pc)? >> bit_pos) & 1;
                if bit_pos == 7 {
                    glulx.set_bit_pos(0);
                    glulx.state_mut().set_pc(pc + 1);
                } else {
                    glulx.set_bit_pos(bit_pos + 1);
                }
                node = if bit == 0 {
                    glulx.state().read_word(node + 1)?
                } else {
                    glulx.state().read_word(node + 5)?
                } as usize;
            }
            NODE_TERMINATOR => {
                glulx.set_exec_mode(ExecMode::Return);
                return Ok(());
            }
            NODE_CHAR => {
                let c = glulx.state().read_byte(node + 1)?;
                let bit = glulx.bit_pos() as u32;
                return emit(glulx, c as u32, DestType::ResumeCompressed, bit);
            }
            NODE_UNICHAR => {
                let c = glulx.state().read_word(node + 1)?;
                let bit = glulx.bit_pos() as u32;
                return emit(glulx, c, DestType::ResumeCompressed, bit);
            }
            NODE_CSTRING | NODE_UNISTRING => {
                // Splice the nested string in, resuming here afterward
                let bit = glulx.bit_pos() as u32;
                glulx
                    .state_mut()
                    .push_stub(DestType::ResumeCompressed.as_word(), bit)?;
                glulx.state_mut().set_pc(node + 1);
                glulx.set_exec_mode(if kind == NODE_CSTRING {
                    ExecMode::CString
                } else {
                    ExecMode::UnicodeString
                });
                return Ok(());
            }
            NODE_INDIRECT | NODE_DOUBLE_INDIRECT | NODE_INDIRECT_ARGS
            | NODE_DOUBLE_INDIRECT_ARGS => {
                return fatal_error!(
                    ErrorCode::UnsupportedStringNode,
                    "Indirect decoding-table node {:#04x} at {:#x} is not supported",
                    kind,
                    node
                )
            }
            _ => {
                return fatal_error!(
                    ErrorCode::Stream,
                    "Unknown decoding-table node {:#04x} at {:#x}",
                    kind,
                    node
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_ok, assert_ok_eq, test_util::test_glulx_with_rom};

    // setiosys #20 #0, setstringtbl / streamstr filled in per test
    fn channels_preamble() -> Vec<u8> {
        vec![0x81, 0x49, 0x11, 0x14, 0x00]
    }

    fn word(v: u32) -> [u8; 4] {
        v.to_be_bytes()
    }

    #[test]
    fn test_cstring() {
        // streamstr #0x36; string "hi" at 0x36
        let mut rom = vec![0xC1, 0x00, 0x00];
        rom.append(&mut channels_preamble());
        rom.extend_from_slice(&[0x72, 0x02, 0x00, 0x36]); // streamstr
        rom.extend_from_slice(&[0x81, 0x20]); // quit
        assert_eq!(rom.len(), 0x36 - 0x28);
        rom.extend_from_slice(&[0xE0, b'h', b'i', 0x00]);
        let mut g = test_glulx_with_rom(&rom[..]);
        assert!(assert_ok!(g.execute(None)).is_none());
        assert_eq!(g.flush_output().get("MAIN").map(String::as_str), Some("hi"));
    }

    #[test]
    fn test_unicode_string() {
        let mut rom = vec![0xC1, 0x00, 0x00];
        rom.append(&mut channels_preamble());
        rom.extend_from_slice(&[0x72, 0x02, 0x00, 0x38]); // streamstr #0x38
        rom.extend_from_slice(&[0x81, 0x20, 0x00, 0x00]); // quit, pad
        assert_eq!(rom.len(), 0x38 - 0x28);
        rom.extend_from_slice(&[0xE2, 0x00, 0x00, 0x00]);
        rom.extend_from_slice(&word(0x68)); // 'h'
        rom.extend_from_slice(&word(0x2603)); // snowman
        rom.extend_from_slice(&word(0));
        let mut g = test_glulx_with_rom(&rom[..]);
        assert!(assert_ok!(g.execute(None)).is_none());
        assert_eq!(
            g.flush_output().get("MAIN").map(String::as_str),
            Some("h\u{2603}")
        );
    }

    #[test]
    fn test_number() {
        // streamnum #-5
        let mut rom = vec![0xC1, 0x00, 0x00];
        rom.append(&mut channels_preamble());
        rom.extend_from_slice(&[0x71, 0x01, 0xFB]); // streamnum
        rom.extend_from_slice(&[0x81, 0x20]); // quit
        let mut g = test_glulx_with_rom(&rom[..]);
        assert!(assert_ok!(g.execute(None)).is_none());
        assert_eq!(g.flush_output().get("MAIN").map(String::as_str), Some("-5"));
    }

    // A decoding table: bit 0 -> 'g', bit 10 -> terminator,
    // bit 11 -> nested C-string "o"
    fn test_table(at: usize) -> Vec<u8> {
        let root = at + 12;
        let mut table = Vec::new();
        table.extend_from_slice(&word(36)); // table length
        table.extend_from_slice(&word(5)); // node count
        table.extend_from_slice(&word(root as u32));
        // root branch at +12
        table.push(0x00);
        table.extend_from_slice(&word((root + 9) as u32)); // 'g'
        table.extend_from_slice(&word((root + 11) as u32)); // inner branch
        // char node at +21
        table.extend_from_slice(&[0x02, b'g']);
        // inner branch at +23
        table.push(0x00);
        table.extend_from_slice(&word((root + 20) as u32)); // terminator
        table.extend_from_slice(&word((root + 21) as u32)); // C-string
        // terminator at +32
        table.push(0x01);
        // nested C-string at +33
        table.extend_from_slice(&[0x03, b'o', 0x00]);
        table
    }

    #[test]
    fn test_compressed_string() {
        let mut rom = vec![0xC1, 0x00, 0x00];
        rom.append(&mut channels_preamble());
        // setstringtbl #0x3B, streamstr #0x5F
        rom.extend_from_slice(&[0x81, 0x41, 0x02, 0x00, 0x3B]);
        rom.extend_from_slice(&[0x72, 0x02, 0x00, 0x5F]);
        rom.extend_from_slice(&[0x81, 0x20]); // quit
        assert_eq!(rom.len(), 0x3B - 0x28);
        rom.append(&mut test_table(0x3B));
        assert_eq!(rom.len(), 0x5F - 0x28);
        // "g", then the spliced "o", then the terminator:
        // bits 0, 1 1, 1 0 -> LSB-first byte 0b00001110
        rom.extend_from_slice(&[0xE1, 0x0E]);
        let mut g = test_glulx_with_rom(&rom[..]);
        assert!(assert_ok!(g.execute(None)).is_none());
        assert_eq!(g.flush_output().get("MAIN").map(String::as_str), Some("go"));
        assert_ok_eq!(g.state().read_word(0x3B), 36);
    }

    #[test]
    fn test_indirect_node_rejected() {
        let mut rom = vec![0xC1, 0x00, 0x00];
        rom.append(&mut channels_preamble());
        rom.extend_from_slice(&[0x81, 0x41, 0x02, 0x00, 0x3B]); // setstringtbl
        rom.extend_from_slice(&[0x72, 0x02, 0x00, 0x4C]); // streamstr #0x4C
        rom.extend_from_slice(&[0x81, 0x20]); // quit
        // A table whose root is an indirect-reference node
        rom.extend_from_slice(&word(17));
        rom.extend_from_slice(&word(1));
        rom.extend_from_slice(&word(0x47));
        rom.extend_from_slice(&[0x08]);
        rom.extend_from_slice(&word(0));
        assert_eq!(rom.len(), 0x4C - 0x28);
        rom.extend_from_slice(&[0xE1, 0x00]);
        let mut g = test_glulx_with_rom(&rom[..]);
        let e = g.execute(None);
        assert!(e.is_err());
        assert_eq!(
            e.err().map(|e| e.code()),
            Some(ErrorCode::UnsupportedStringNode)
        );
    }

    #[test]
    fn test_not_a_string() {
        let mut rom = vec![0xC1, 0x00, 0x00];
        rom.extend_from_slice(&[0x72, 0x01, 0x50]); // streamstr #0x50
        rom.extend_from_slice(&[0x81, 0x20]);
        let mut g = test_glulx_with_rom(&rom[..]);
        assert!(g.execute(None).is_err());
    }
}
