//! Streaming and I/O-system opcodes, including the host-extension channel
//! and input opcodes.
use crate::error::RuntimeError;
use crate::glulx::{text, Glulx};
use crate::instruction::{Instruction, InstructionResult, Suspension};

use super::operand_values;

fn done() -> Result<InstructionResult, RuntimeError> {
    Ok(InstructionResult::Continue(vec![]))
}

pub fn streamchar(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    text::put_char(glulx, operands[0] & 0xFF)?;
    done()
}

pub fn streamunichar(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    text::put_char(glulx, operands[0])?;
    done()
}

pub fn streamnum(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    text::stream_number(glulx, operands[0])?;
    done()
}

pub fn streamstr(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    text::stream_string(glulx, operands[0] as usize)?;
    done()
}

pub fn getstringtbl(
    glulx: &mut Glulx,
    _instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    Ok(InstructionResult::Continue(vec![
        glulx.state().stringtbl() as u32
    ]))
}

pub fn setstringtbl(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx.state_mut().set_stringtbl(operands[0] as usize);
    done()
}

pub fn getiosys(
    glulx: &mut Glulx,
    _instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    Ok(InstructionResult::Continue(vec![
        glulx.io().mode(),
        glulx.io().rock(),
    ]))
}

pub fn setiosys(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx.io_mut().set_iosys(operands[0], operands[1]);
    done()
}

/// glk L1 L2 S1: the L2 arguments are popped and handed to the window
/// layer; with no window attached every request answers zero.
pub fn glk(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let mut arguments = Vec::new();
    for _ in 0..operands[1] {
        arguments.push(glulx.state_mut().pop()?);
    }
    let result = glulx.io_mut().window_glk(operands[0], &arguments)?;
    Ok(InstructionResult::Continue(vec![result]))
}

pub fn channel(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx.io_mut().select_channel(operands[0]);
    done()
}

pub fn readline(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    Ok(InstructionResult::Suspend(Suspension::ReadLine {
        buffer: operands[0] as usize,
        max_len: operands[1] as usize,
    }))
}

pub fn readkey(
    _glulx: &mut Glulx,
    _instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    Ok(InstructionResult::Suspend(Suspension::ReadKey))
}
