//! Branch opcodes.  A taken branch goes through [`Glulx::branch`], so
//! targets 0 and 1 return from the current function instead of jumping.
use crate::error::RuntimeError;
use crate::glulx::Glulx;
use crate::instruction::{Instruction, InstructionResult};

use super::operand_values;

fn condition(glulx: &mut Glulx, target: u32, taken: bool) -> Result<InstructionResult, RuntimeError> {
    if taken {
        glulx.branch(target)?;
    }
    Ok(InstructionResult::Continue(vec![]))
}

pub fn jump(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[0], true)
}

pub fn jz(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[1], operands[0] == 0)
}

pub fn jnz(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[1], operands[0] != 0)
}

pub fn jeq(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[2], operands[0] == operands[1])
}

pub fn jne(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[2], operands[0] != operands[1])
}

pub fn jlt(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[2], (operands[0] as i32) < (operands[1] as i32))
}

pub fn jge(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[2], (operands[0] as i32) >= (operands[1] as i32))
}

pub fn jgt(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[2], (operands[0] as i32) > (operands[1] as i32))
}

pub fn jle(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[2], (operands[0] as i32) <= (operands[1] as i32))
}

pub fn jltu(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[2], operands[0] < operands[1])
}

pub fn jgeu(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[2], operands[0] >= operands[1])
}

pub fn jgtu(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[2], operands[0] > operands[1])
}

pub fn jleu(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    condition(glulx, operands[2], operands[0] <= operands[1])
}

pub fn jumpabs(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx.state_mut().set_pc(operands[0] as usize);
    Ok(InstructionResult::Continue(vec![]))
}
