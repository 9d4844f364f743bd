//! Arithmetic and bitwise opcodes.  All arithmetic is 32-bit
//! two's-complement with wraparound.
use crate::error::{ErrorCode, RuntimeError};
use crate::fatal_error;
use crate::glulx::Glulx;
use crate::instruction::{Instruction, InstructionResult};

use super::operand_values;

fn value(result: u32) -> Result<InstructionResult, RuntimeError> {
    Ok(InstructionResult::Continue(vec![result]))
}

pub fn add(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(operands[0].wrapping_add(operands[1]))
}

pub fn sub(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(operands[0].wrapping_sub(operands[1]))
}

pub fn mul(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(operands[0].wrapping_mul(operands[1]))
}

pub fn div(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    if operands[1] == 0 {
        return fatal_error!(
            ErrorCode::DivideByZero,
            "Division by zero at {:#x}",
            instruction.address()
        );
    }
    value((operands[0] as i32).wrapping_div(operands[1] as i32) as u32)
}

pub fn modulus(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    if operands[1] == 0 {
        return fatal_error!(
            ErrorCode::DivideByZero,
            "Modulo by zero at {:#x}",
            instruction.address()
        );
    }
    value((operands[0] as i32).wrapping_rem(operands[1] as i32) as u32)
}

pub fn neg(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value((operands[0] as i32).wrapping_neg() as u32)
}

pub fn bitand(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(operands[0] & operands[1])
}

pub fn bitor(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(operands[0] | operands[1])
}

pub fn bitxor(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(operands[0] ^ operands[1])
}

pub fn bitnot(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(!operands[0])
}

// Shift counts of 32 or more wash the value out entirely

pub fn shiftl(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(if operands[1] >= 32 {
        0
    } else {
        operands[0] << operands[1]
    })
}

pub fn sshiftr(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(if operands[1] >= 32 {
        if (operands[0] as i32) < 0 {
            0xFFFFFFFF
        } else {
            0
        }
    } else {
        ((operands[0] as i32) >> operands[1]) as u32
    })
}

pub fn ushiftr(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(if operands[1] >= 32 {
        0
    } else {
        operands[0] >> operands[1]
    })
}

pub fn sexs(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(operands[0] as u16 as i16 as i32 as u32)
}

pub fn sexb(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    value(operands[0] as u8 as i8 as i32 as u32)
}

#[cfg(test)]
mod tests {
    use crate::{assert_ok, test_util::test_glulx};

    fn run_to_stack(code: &[u8]) -> u32 {
        let mut program = code.to_vec();
        program.extend_from_slice(&[0x81, 0x20]); // quit
        let mut g = test_glulx(&program);
        assert!(assert_ok!(g.execute(None)).is_none());
        assert_ok!(g.state().peek(0))
    }

    #[test]
    fn test_add_wraparound() {
        // add #-1 #1 -> (SP)
        assert_eq!(run_to_stack(&[0x10, 0x11, 0x08, 0xFF, 0x01]), 0);
    }

    #[test]
    fn test_sub() {
        // sub #3 #5 -> (SP)
        assert_eq!(run_to_stack(&[0x11, 0x11, 0x08, 0x03, 0x05]), 0xFFFFFFFE);
    }

    #[test]
    fn test_mul_signed_wraparound() {
        // mul #-2 #3 -> (SP)
        assert_eq!(run_to_stack(&[0x12, 0x11, 0x08, 0xFE, 0x03]), 0xFFFFFFFA);
        // mul #0x10000 #0x10000 -> (SP) wraps to 0
        assert_eq!(
            run_to_stack(&[0x12, 0x33, 0x08, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00]),
            0
        );
    }

    #[test]
    fn test_div_truncates_toward_zero() {
        // div #7 #-2 -> (SP)
        assert_eq!(run_to_stack(&[0x13, 0x11, 0x08, 0x07, 0xFE]), 0xFFFFFFFD);
    }

    #[test]
    fn test_div_by_zero() {
        let mut g = test_glulx(&[0x13, 0x11, 0x08, 0x01, 0x00, 0x81, 0x20]);
        let e = g.execute(None);
        assert!(e.is_err_and(|e| !e.is_recoverable()));
    }

    #[test]
    fn test_modulus_sign() {
        // mod #-7 #2 -> (SP)
        assert_eq!(run_to_stack(&[0x14, 0x11, 0x08, 0xF9, 0x02]), 0xFFFFFFFF);
    }

    #[test]
    fn test_neg() {
        assert_eq!(run_to_stack(&[0x15, 0x81, 0x05]), 0xFFFFFFFB);
    }

    #[test]
    fn test_bitwise() {
        // bitand #0xF0 #0x3C -> (SP)
        assert_eq!(run_to_stack(&[0x18, 0x22, 0x08, 0x00, 0xF0, 0x00, 0x3C]), 0x30);
        // bitnot #0 -> (SP)
        assert_eq!(run_to_stack(&[0x1B, 0x81, 0x00]), 0xFFFFFFFF);
    }

    #[test]
    fn test_shiftl_overwide() {
        // shiftl #1 #33 -> (SP)
        assert_eq!(run_to_stack(&[0x1C, 0x11, 0x08, 0x01, 0x21]), 0);
    }

    #[test]
    fn test_sshiftr() {
        // sshiftr #-8 #1 -> (SP)
        assert_eq!(run_to_stack(&[0x1D, 0x11, 0x08, 0xF8, 0x01]), 0xFFFFFFFC);
        // sshiftr #-8 #40 -> (SP)
        assert_eq!(run_to_stack(&[0x1D, 0x11, 0x08, 0xF8, 0x28]), 0xFFFFFFFF);
    }

    #[test]
    fn test_ushiftr() {
        // ushiftr #-1 #28 -> (SP)
        assert_eq!(run_to_stack(&[0x1E, 0x11, 0x08, 0xFF, 0x1C]), 0xF);
    }

    #[test]
    fn test_sign_extension_opcodes() {
        // sexb #0x80 -> (SP), the operand deliberately a short constant
        assert_eq!(run_to_stack(&[0x45, 0x82, 0x00, 0x80]), 0xFFFFFF80);
        // sexs #0x8000 -> (SP)
        assert_eq!(run_to_stack(&[0x44, 0x83, 0x00, 0x00, 0x80, 0x00]), 0xFFFF8000);
    }
}
