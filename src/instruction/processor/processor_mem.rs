//! Memory opcodes: copies, array access, block operations, and the
//! dynamic-allocation pair backed by the heap.
use crate::error::{ErrorCode, RuntimeError};
use crate::fatal_error;
use crate::glulx::Glulx;
use crate::instruction::{Instruction, InstructionResult, Operand, OperandMode};

use super::operand_values;

fn value(result: u32) -> Result<InstructionResult, RuntimeError> {
    Ok(InstructionResult::Continue(vec![result]))
}

fn done() -> Result<InstructionResult, RuntimeError> {
    Ok(InstructionResult::Continue(vec![]))
}

/// Array element address: the index is signed and scaled by the element
/// width.
fn element(base: u32, index: u32, width: u32) -> usize {
    base.wrapping_add(index.wrapping_mul(width)) as usize
}

/// Bit addressing: the bit number is signed, counting up through each byte
/// and onward through higher addresses.
fn bit_address(base: u32, bit: u32) -> (usize, u8) {
    let byte = base.wrapping_add(((bit as i32) >> 3) as u32) as usize;
    (byte, (bit & 7) as u8)
}

/// Read through an operand at 1- or 2-byte width, for the sized copies.
fn sized_value(
    glulx: &mut Glulx,
    operand: &Operand,
    width: usize,
) -> Result<u32, RuntimeError> {
    match operand.mode() {
        OperandMode::Zero => Ok(0),
        OperandMode::ByteConst | OperandMode::ShortConst | OperandMode::WordConst => {
            Ok(operand.value())
        }
        OperandMode::Stack => glulx.state_mut().pop(),
        OperandMode::LocalByte | OperandMode::LocalShort | OperandMode::LocalWord => {
            glulx.state().local_read(operand.value() as usize, width)
        }
        OperandMode::MemByte | OperandMode::MemShort | OperandMode::MemWord => {
            sized_read(glulx, operand.value() as usize, width)
        }
        OperandMode::RamByte | OperandMode::RamShort | OperandMode::RamWord => {
            let address = glulx.state().image().ram_address(operand.value());
            sized_read(glulx, address, width)
        }
    }
}

fn sized_read(glulx: &Glulx, address: usize, width: usize) -> Result<u32, RuntimeError> {
    match width {
        1 => Ok(glulx.state().read_byte(address)? as u32),
        _ => Ok(glulx.state().read_short(address)? as u32),
    }
}

/// Store through an operand at 1- or 2-byte width.
fn sized_store(
    glulx: &mut Glulx,
    operand: &Operand,
    width: usize,
    value: u32,
) -> Result<(), RuntimeError> {
    match operand.mode() {
        OperandMode::Zero => Ok(()),
        OperandMode::Stack => glulx.state_mut().push(value),
        OperandMode::LocalByte | OperandMode::LocalShort | OperandMode::LocalWord => {
            glulx.state_mut().local_write(operand.value() as usize, width, value)
        }
        OperandMode::MemByte | OperandMode::MemShort | OperandMode::MemWord => {
            sized_write(glulx, operand.value() as usize, width, value)
        }
        OperandMode::RamByte | OperandMode::RamShort | OperandMode::RamWord => {
            let address = glulx.state().image().ram_address(operand.value());
            sized_write(glulx, address, width, value)
        }
        _ => fatal_error!(
            ErrorCode::InvalidOperand,
            "Store through a literal operand"
        ),
    }
}

fn sized_write(
    glulx: &mut Glulx,
    address: usize,
    width: usize,
    value: u32,
) -> Result<(), RuntimeError> {
    match width {
        1 => glulx.state_mut().write_byte(address, value as u8),
        _ => glulx.state_mut().write_short(address, value as u16),
    }
}

pub fn copy(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(operands[0])
}

pub fn copys(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let v = sized_value(glulx, &instruction.operands()[0], 2)? & 0xFFFF;
    sized_store(glulx, &instruction.stores()[0], 2, v)?;
    done()
}

pub fn copyb(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let v = sized_value(glulx, &instruction.operands()[0], 1)? & 0xFF;
    sized_store(glulx, &instruction.stores()[0], 1, v)?;
    done()
}

pub fn aload(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(glulx.state().read_word(element(operands[0], operands[1], 4))?)
}

pub fn aloads(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(glulx.state().read_short(element(operands[0], operands[1], 2))? as u32)
}

pub fn aloadb(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(glulx.state().read_byte(element(operands[0], operands[1], 1))? as u32)
}

pub fn aloadbit(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let (address, bit) = bit_address(operands[0], operands[1]);
    value(((glulx.state().read_byte(address)? >> bit) & 1) as u32)
}

pub fn astore(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx
        .state_mut()
        .write_word(element(operands[0], operands[1], 4), operands[2])?;
    done()
}

pub fn astores(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx
        .state_mut()
        .write_short(element(operands[0], operands[1], 2), operands[2] as u16)?;
    done()
}

pub fn astoreb(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx
        .state_mut()
        .write_byte(element(operands[0], operands[1], 1), operands[2] as u8)?;
    done()
}

pub fn astorebit(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let (address, bit) = bit_address(operands[0], operands[1]);
    let b = glulx.state().read_byte(address)?;
    let b = if operands[2] == 0 {
        b & !(1 << bit)
    } else {
        b | (1 << bit)
    };
    glulx.state_mut().write_byte(address, b)?;
    done()
}

pub fn mzero(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let zeroes = vec![0; operands[0] as usize];
    glulx
        .state_mut()
        .image_mut()
        .write_bytes(operands[1] as usize, &zeroes)?;
    done()
}

pub fn mcopy(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    // Copy out first so overlapping ranges move cleanly
    let bytes = glulx
        .state()
        .image()
        .copy(operands[1] as usize, operands[0] as usize);
    glulx
        .state_mut()
        .image_mut()
        .write_bytes(operands[2] as usize, &bytes)?;
    done()
}

pub fn malloc(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(glulx.state_mut().malloc(operands[0] as usize)? as u32)
}

pub fn mfree(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx.state_mut().mfree(operands[0] as usize)?;
    done()
}

#[cfg(test)]
mod tests {
    use crate::{assert_ok, assert_ok_eq, test_util::test_glulx};

    fn run(code: &[u8]) -> crate::glulx::Glulx {
        let mut program = code.to_vec();
        program.extend_from_slice(&[0x81, 0x20]); // quit
        let mut g = test_glulx(&program);
        assert!(assert_ok!(g.execute(None)).is_none());
        g
    }

    #[test]
    fn test_copy() {
        let g = run(&[0x40, 0x61, 0x2A, 0x00, 0xE0]); // copy #42 -> *0xE0
        assert_ok_eq!(g.state().read_word(0xE0), 42);
    }

    #[test]
    fn test_copys_moves_two_bytes() {
        let g = run(&[
            0x40, 0x61, 0x12, 0x00, 0xE0, // copy #0x12 -> *0xE0 (word 0x00000012)
            0x41, 0x66, 0x00, 0xE2, 0x00, 0xE8, // copys *0xE2 -> *0xE8
        ]);
        assert_ok_eq!(g.state().read_short(0xE8), 0x0012);
        assert_ok_eq!(g.state().read_short(0xEA), 0);
    }

    #[test]
    fn test_copyb() {
        let g = run(&[
            0x42, 0x62, 0x01, 0x23, 0x00, 0xE8, // copyb #0x123 -> *0xE8
        ]);
        assert_ok_eq!(g.state().read_byte(0xE8), 0x23);
    }

    #[test]
    fn test_aload_family() {
        let g = run(&[
            0x4C, 0x12, 0x02, 0x00, 0xE0, 0x02, 0x12, 0x34, // astore #0xE0 #2 #0x1234
            0x48, 0x12, 0x08, 0x00, 0xE0, 0x02, // aload #0xE0 #2 -> (SP)
            0x49, 0x12, 0x08, 0x00, 0xE8, 0x01, // aloads #0xE8 #1 -> (SP)
            0x4A, 0x12, 0x08, 0x00, 0xE8, 0x03, // aloadb #0xE8 #3 -> (SP)
        ]);
        assert_ok_eq!(g.state().read_word(0xE8), 0x1234);
        assert_ok_eq!(g.state().peek(2), 0x1234);
        assert_ok_eq!(g.state().peek(1), 0x1234);
        assert_ok_eq!(g.state().peek(0), 0x34);
    }

    #[test]
    fn test_aloadbit_astorebit() {
        let g = run(&[
            0x4F, 0x12, 0x01, 0x00, 0xE0, 0x0C, 0x01, // astorebit #0xE0 #12 #1
            0x4B, 0x12, 0x08, 0x00, 0xE0, 0x0C, // aloadbit #0xE0 #12 -> (SP)
            0x4B, 0x12, 0x08, 0x00, 0xE2, 0xFC, // aloadbit #0xE2 #-4 -> (SP)
        ]);
        assert_ok_eq!(g.state().read_byte(0xE1), 0x10);
        // Both the positive and the negative bit number reach the same bit
        assert_ok_eq!(g.state().peek(1), 1);
        assert_ok_eq!(g.state().peek(0), 1);
    }

    #[test]
    fn test_mzero_mcopy() {
        let g = run(&[
            0x40, 0x63, 0x11, 0x22, 0x33, 0x44, 0x00, 0xE0, // copy #0x11223344 -> *0xE0
            0x81, 0x71, 0x21, 0x02, 0x04, 0x00, 0xE0, 0x00, 0xE8, // mcopy #4 #0xE0 #0xE8
            0x81, 0x70, 0x21, 0x02, 0x00, 0xE0, // mzero #2 #0xE0
        ]);
        assert_ok_eq!(g.state().read_word(0xE8), 0x11223344);
        assert_ok_eq!(g.state().read_word(0xE0), 0x00003344);
    }

    #[test]
    fn test_malloc_mfree() {
        let g = run(&[
            0x81, 0x78, 0x82, 0x00, 0x40, // malloc #0x40 -> (SP)
            0x40, 0x68, 0x00, 0xE0, // copy (SP) -> *0xE0
            0x81, 0x79, 0x06, 0x00, 0xE0, // mfree *0xE0
        ]);
        assert_ok_eq!(g.state().read_word(0xE0), 0x100);
        assert!(!g.state().heap().active());
        assert_eq!(g.state().image().end_mem(), 0x100);
    }
}
