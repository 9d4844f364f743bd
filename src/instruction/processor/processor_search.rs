//! The table-search opcodes.  Keys compare as big-endian byte strings,
//! which for equal lengths matches unsigned numeric order.
use crate::error::{ErrorCode, RuntimeError};
use crate::fatal_error;
use crate::glulx::Glulx;
use crate::instruction::{Instruction, InstructionResult};

use super::operand_values;

const KEY_INDIRECT: u32 = 0x01;
const ZERO_KEY_TERMINATES: u32 = 0x02;
const RETURN_INDEX: u32 = 0x04;

/// A linear search never ends when the struct count is -1 and no zero key
/// stops it, so the count is compared against this sentinel.
const UNBOUNDED: u32 = 0xFFFFFFFF;

fn value(result: u32) -> Result<InstructionResult, RuntimeError> {
    Ok(InstructionResult::Continue(vec![result]))
}

fn key_bytes(
    glulx: &Glulx,
    key: u32,
    key_size: usize,
    options: u32,
) -> Result<Vec<u8>, RuntimeError> {
    if options & KEY_INDIRECT != 0 {
        let mut bytes = Vec::new();
        for i in 0..key_size {
            bytes.push(glulx.state().read_byte(key as usize + i)?);
        }
        Ok(bytes)
    } else if key_size > 4 {
        fatal_error!(
            ErrorCode::InvalidOperand,
            "Direct search keys are at most 4 bytes, not {}",
            key_size
        )
    } else {
        Ok(key.to_be_bytes()[4 - key_size..].to_vec())
    }
}

fn struct_key(
    glulx: &Glulx,
    address: usize,
    key_offset: usize,
    key_size: usize,
) -> Result<Vec<u8>, RuntimeError> {
    let mut bytes = Vec::new();
    for i in 0..key_size {
        bytes.push(glulx.state().read_byte(address + key_offset + i)?);
    }
    Ok(bytes)
}

/// linearsearch key keysize start structsize numstructs keyoffset options
pub fn linearsearch(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let key_size = operands[1] as usize;
    let start = operands[2] as usize;
    let struct_size = operands[3] as usize;
    let count = operands[4];
    let key_offset = operands[5] as usize;
    let options = operands[6];
    let key = key_bytes(glulx, operands[0], key_size, options)?;

    let mut i: u32 = 0;
    while count == UNBOUNDED || i < count {
        let address = start + i as usize * struct_size;
        let candidate = struct_key(glulx, address, key_offset, key_size)?;
        if candidate == key {
            return value(if options & RETURN_INDEX != 0 {
                i
            } else {
                address as u32
            });
        }
        if options & ZERO_KEY_TERMINATES != 0 && candidate.iter().all(|b| *b == 0) {
            break;
        }
        i += 1;
    }
    value(if options & RETURN_INDEX != 0 { UNBOUNDED } else { 0 })
}

/// binarysearch key keysize start structsize numstructs keyoffset options
pub fn binarysearch(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let key_size = operands[1] as usize;
    let start = operands[2] as usize;
    let struct_size = operands[3] as usize;
    let key_offset = operands[5] as usize;
    let options = operands[6];
    let key = key_bytes(glulx, operands[0], key_size, options)?;

    let mut lo: u32 = 0;
    let mut hi: u32 = operands[4];
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let address = start + mid as usize * struct_size;
        let candidate = struct_key(glulx, address, key_offset, key_size)?;
        match candidate.cmp(&key) {
            std::cmp::Ordering::Equal => {
                return value(if options & RETURN_INDEX != 0 {
                    mid
                } else {
                    address as u32
                })
            }
            std::cmp::Ordering::Less => lo = mid + 1,
            std::cmp::Ordering::Greater => hi = mid,
        }
    }
    value(if options & RETURN_INDEX != 0 { UNBOUNDED } else { 0 })
}

/// linkedsearch key keysize start keyoffset nextoffset options
pub fn linkedsearch(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let key_size = operands[1] as usize;
    let key_offset = operands[3] as usize;
    let next_offset = operands[4] as usize;
    let options = operands[5];
    let key = key_bytes(glulx, operands[0], key_size, options)?;

    let mut address = operands[2];
    while address != 0 {
        let candidate = struct_key(glulx, address as usize, key_offset, key_size)?;
        if candidate == key {
            return value(address);
        }
        if options & ZERO_KEY_TERMINATES != 0 && candidate.iter().all(|b| *b == 0) {
            break;
        }
        address = glulx.state().read_word(address as usize + next_offset)?;
    }
    value(0)
}
