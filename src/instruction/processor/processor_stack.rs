//! Stack manipulation opcodes.  All of them work on the values above the
//! current call frame.
use crate::error::RuntimeError;
use crate::glulx::Glulx;
use crate::instruction::{Instruction, InstructionResult};

use super::operand_values;

pub fn stkcount(
    glulx: &mut Glulx,
    _instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    Ok(InstructionResult::Continue(vec![
        glulx.state().value_count() as u32
    ]))
}

pub fn stkpeek(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let value = glulx.state().peek(operands[0] as usize)?;
    Ok(InstructionResult::Continue(vec![value]))
}

pub fn stkswap(
    glulx: &mut Glulx,
    _instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let a = glulx.state_mut().pop()?;
    let b = glulx.state_mut().pop()?;
    glulx.state_mut().push(a)?;
    glulx.state_mut().push(b)?;
    Ok(InstructionResult::Continue(vec![]))
}

/// Rotate the top L1 values; positive L2 rotates toward the stack top.
pub fn stkroll(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let count = operands[0] as usize;
    if count > 0 {
        let mut popped = Vec::new();
        for _ in 0..count {
            popped.push(glulx.state_mut().pop()?);
        }
        // Bottom-to-top order for the rotation
        popped.reverse();
        let roll = (operands[1] as i32).rem_euclid(count as i32) as usize;
        popped.rotate_right(roll);
        for value in popped {
            glulx.state_mut().push(value)?;
        }
    }
    Ok(InstructionResult::Continue(vec![]))
}

pub fn stkcopy(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let count = operands[0] as usize;
    let mut values = Vec::new();
    for i in 0..count {
        values.push(glulx.state().peek(i)?);
    }
    for value in values.iter().rev() {
        glulx.state_mut().push(*value)?;
    }
    Ok(InstructionResult::Continue(vec![]))
}

#[cfg(test)]
mod tests {
    use crate::{assert_ok, assert_ok_eq, test_util::test_glulx};

    fn run(code: &[u8]) -> crate::glulx::Glulx {
        // Push #1 #2 #3 (3 on top) before the code under test, then quit
        let mut program = vec![
            0x40, 0x81, 0x01, // copy #1 -> (SP)
            0x40, 0x81, 0x02, // copy #2 -> (SP)
            0x40, 0x81, 0x03, // copy #3 -> (SP)
        ];
        program.extend_from_slice(code);
        program.extend_from_slice(&[0x81, 0x20]);
        let mut g = test_glulx(&program);
        assert!(assert_ok!(g.execute(None)).is_none());
        g
    }

    #[test]
    fn test_stkcount() {
        let g = run(&[0x50, 0x08]); // stkcount -> (SP)
        assert_ok_eq!(g.state().peek(0), 3);
    }

    #[test]
    fn test_stkpeek() {
        let g = run(&[0x51, 0x81, 0x02]); // stkpeek #2 -> (SP)
        assert_ok_eq!(g.state().peek(0), 1);
    }

    #[test]
    fn test_stkswap() {
        let g = run(&[0x52]); // stkswap
        assert_ok_eq!(g.state().peek(0), 2);
        assert_ok_eq!(g.state().peek(1), 3);
        assert_ok_eq!(g.state().peek(2), 1);
    }

    #[test]
    fn test_stkroll_up() {
        let g = run(&[0x53, 0x11, 0x03, 0x01]); // stkroll #3 #1
        // Bottom-to-top (1 2 3) rotates to (3 1 2)
        assert_ok_eq!(g.state().peek(0), 2);
        assert_ok_eq!(g.state().peek(1), 1);
        assert_ok_eq!(g.state().peek(2), 3);
    }

    #[test]
    fn test_stkroll_down() {
        let g = run(&[0x53, 0x11, 0x03, 0xFF]); // stkroll #3 #-1
        // Bottom-to-top (1 2 3) rotates to (2 3 1)
        assert_ok_eq!(g.state().peek(0), 1);
        assert_ok_eq!(g.state().peek(1), 3);
        assert_ok_eq!(g.state().peek(2), 2);
    }

    #[test]
    fn test_stkcopy() {
        let g = run(&[0x54, 0x01, 0x02]); // stkcopy #2
        assert_eq!(g.state().value_count(), 5);
        assert_ok_eq!(g.state().peek(0), 3);
        assert_ok_eq!(g.state().peek(1), 2);
        assert_ok_eq!(g.state().peek(2), 3);
        assert_ok_eq!(g.state().peek(3), 2);
        assert_ok_eq!(g.state().peek(4), 1);
    }

    #[test]
    fn test_stkswap_underflow() {
        let mut g = test_glulx(&[0x52, 0x81, 0x20]);
        assert!(g.execute(None).is_err());
    }
}
