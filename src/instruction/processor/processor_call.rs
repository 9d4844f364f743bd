//! The function-call protocol: calls, returns, tail calls, and the
//! stub-based catch/throw control flow.
use crate::error::{ErrorCode, RuntimeError};
use crate::fatal_error;
use crate::glulx::Glulx;
use crate::instruction::{Instruction, InstructionResult};

use super::operand_values;

/// call L1 L2 S1: the arguments are popped off the stack
pub fn call(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let mut arguments = Vec::new();
    for _ in 0..operands[1] {
        arguments.push(glulx.state_mut().pop()?);
    }
    glulx.perform_call(operands[0] as usize, &arguments, instruction.dest())?;
    Ok(InstructionResult::Continue(vec![]))
}

/// callf/callfi/callfii/callfiii: the arguments are operands
pub fn callf(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx.perform_call(operands[0] as usize, &operands[1..], instruction.dest())?;
    Ok(InstructionResult::Continue(vec![]))
}

pub fn ret(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx.do_return(operands[0])?;
    Ok(InstructionResult::Continue(vec![]))
}

pub fn tailcall(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let mut arguments = Vec::new();
    for _ in 0..operands[1] {
        arguments.push(glulx.state_mut().pop()?);
    }
    glulx.tail_call(operands[0] as usize, &arguments)?;
    Ok(InstructionResult::Continue(vec![]))
}

/// Push a catch stub, hand its token to the program, and branch.  A later
/// throw unwinds to the token and redeems the stub with the thrown value.
pub fn catch(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let dest = glulx.stub_dest(instruction.dest())?;
    glulx.state_mut().push_stub(dest.0, dest.1)?;
    let token = glulx.state().sp() as u32;
    glulx.store_dest(dest, token)?;
    glulx.branch(operands[0])?;
    Ok(InstructionResult::Continue(vec![]))
}

pub fn throw(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let token = operands[1] as usize;
    if token < 16 || token > glulx.state().sp() || token % 4 != 0 {
        return fatal_error!(
            ErrorCode::StackUnderflow,
            "Throw to an invalid catch token {:#x} (sp {:#x})",
            token,
            glulx.state().sp()
        );
    }
    glulx.state_mut().set_sp(token);
    let stub = glulx.state_mut().pop_stub()?;
    glulx.redeem_stub(stub, operands[0])?;
    Ok(InstructionResult::Continue(vec![]))
}

#[cfg(test)]
mod tests {
    use crate::{assert_ok, assert_ok_eq, test_util::test_glulx_with_rom};

    #[test]
    fn test_call_with_stack_arguments() {
        // The callee copies its first argument into RAM and returns it + 1
        let rom = [
            0xC1, 0x00, 0x00, // start function at 0x28
            0x40, 0x81, 0x07, // copy #7 -> (SP)
            0x30, 0x11, 0x08, 0x39, 0x01, // call #0x39 #1 => (SP)
            0x81, 0x20, // quit
            0x00, 0x00, 0x00, 0x00, // padding
            0xC1, 0x04, 0x01, 0x00, 0x00, // callee at 0x39, one 4-byte local
            0x4C, 0x02, 0x09, 0x00, 0xE0, 0x00, // astore #0xE0 #0 L0
            0x10, 0x19, 0x08, 0x00, 0x01, // add L0 #1 -> (SP)
            0x31, 0x08, // return (SP)
        ];
        let mut g = test_glulx_with_rom(&rom);
        assert!(assert_ok!(g.execute(None)).is_none());
        assert_ok_eq!(g.state().read_word(0xE0), 7);
        assert_ok_eq!(g.state().peek(0), 8);
        // The argument was consumed by the call
        assert_eq!(g.state().value_count(), 1);
    }

    #[test]
    fn test_call_stack_convention_pushes_count() {
        // A C0 callee finds its argument count on top of the stack
        let rom = [
            0xC1, 0x00, 0x00, // start function
            0x40, 0x81, 0x07, // copy #7 -> (SP)
            0x40, 0x81, 0x08, // copy #8 -> (SP)
            0x30, 0x11, 0x08, 0x3C, 0x02, // call #0x3C #2 => (SP)
            0x81, 0x20, // quit
            0x00, 0x00, 0x00, 0x00, // padding
            0xC0, 0x00, 0x00, // callee at 0x3C, stack-argument convention
            0x31, 0x08, // return (SP), the argument count
        ];
        let mut g = test_glulx_with_rom(&rom);
        assert!(assert_ok!(g.execute(None)).is_none());
        assert_ok_eq!(g.state().peek(0), 2);
    }

    #[test]
    fn test_tailcall_returns_to_original_caller() {
        // A calls B, B tail-calls C, C's return value lands in A's store
        let rom = [
            0xC1, 0x00, 0x00, // start function
            0x81, 0x60, 0x82, 0x00, 0x32, // callf #0x32 => (SP)
            0x81, 0x20, // quit
            0xC1, 0x00, 0x00, // B at 0x32
            0x34, 0x02, 0x00, 0x39, // tailcall #0x39 #0
            0xC1, 0x00, 0x00, // C at 0x39
            0x31, 0x01, 0x09, // return #9
        ];
        let mut g = test_glulx_with_rom(&rom);
        assert!(assert_ok!(g.execute(None)).is_none());
        assert_ok_eq!(g.state().peek(0), 9);
        // C's frame replaced B's, so only A's frame and the result remain
        assert_eq!(g.state().fp(), 0);
    }

    #[test]
    fn test_catch_throw() {
        let rom = [
            0xC1, 0x00, 0x00, // start function
            0x32, 0x16, 0x00, 0xE0, 0x04, // catch => *0xE0, branch +4
            0x81, 0x20, // quit (throw lands here)
            0x33, 0x61, 0x2A, 0x00, 0xE0, // throw #42 *0xE0
        ];
        let mut g = test_glulx_with_rom(&rom);
        assert!(assert_ok!(g.execute(None)).is_none());
        assert!(!g.running());
        assert_ok_eq!(g.state().read_word(0xE0), 42);
        assert_eq!(g.state().value_count(), 0);
    }

    #[test]
    fn test_throw_bad_token() {
        let rom = [
            0xC1, 0x00, 0x00, // start function
            0x33, 0x11, 0x2A, 0x03, // throw #42 #3
            0x81, 0x20,
        ];
        let mut g = test_glulx_with_rom(&rom);
        assert!(g.execute(None).is_err_and(|e| !e.is_recoverable()));
    }
}
