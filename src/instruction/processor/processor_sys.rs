//! System opcodes: capability queries, randomness, memory sizing, state
//! snapshots, and the acceleration registration pair.
use crate::error::{ErrorCode, RuntimeError};
use crate::fatal_error;
use crate::glulx::accel::Accel;
use crate::glulx::Glulx;
use crate::iff::quetzal::Quetzal;
use crate::instruction::{Instruction, InstructionResult, Suspension};

use super::operand_values;

/// Gestalt selectors
mod gestalt {
    pub const GLULX_VERSION: u32 = 0;
    pub const TERP_VERSION: u32 = 1;
    pub const RESIZE_MEM: u32 = 2;
    pub const UNDO: u32 = 3;
    pub const IO_SYSTEM: u32 = 4;
    pub const UNICODE: u32 = 5;
    pub const MEM_COPY: u32 = 6;
    pub const MALLOC: u32 = 7;
    pub const MALLOC_HEAP: u32 = 8;
    pub const ACCELERATION: u32 = 9;
    pub const ACCEL_FUNC: u32 = 10;
    pub const FLOAT: u32 = 11;
}

/// The Glulx specification version this engine implements
const GLULX_VERSION: u32 = 0x00030103;
/// This engine's own version number
const TERP_VERSION: u32 = 0x00010000;

fn value(result: u32) -> Result<InstructionResult, RuntimeError> {
    Ok(InstructionResult::Continue(vec![result]))
}

fn done() -> Result<InstructionResult, RuntimeError> {
    Ok(InstructionResult::Continue(vec![]))
}

pub fn nop(
    _glulx: &mut Glulx,
    _instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    done()
}

pub fn gestalt(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let answer = match operands[0] {
        gestalt::GLULX_VERSION => GLULX_VERSION,
        gestalt::TERP_VERSION => TERP_VERSION,
        gestalt::RESIZE_MEM => 1,
        gestalt::UNDO => 1,
        gestalt::IO_SYSTEM => match operands[1] {
            0 | 1 | 20 => 1,
            2 => glulx.io().has_window() as u32,
            _ => 0,
        },
        gestalt::UNICODE => 1,
        gestalt::MEM_COPY => 1,
        gestalt::MALLOC => 1,
        gestalt::MALLOC_HEAP => glulx.state().heap().address() as u32,
        gestalt::ACCELERATION => 1,
        gestalt::ACCEL_FUNC => Accel::supported(operands[1]) as u32,
        gestalt::FLOAT => 0,
        _ => 0,
    };
    value(answer)
}

pub fn debugtrap(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    fatal_error!(
        ErrorCode::Interpreter,
        "debugtrap {:#x} at {:#x}",
        operands[0],
        instruction.address()
    )
}

pub fn getmemsize(
    glulx: &mut Glulx,
    _instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    value(glulx.state().image().end_mem() as u32)
}

pub fn setmemsize(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    // The heap owns the memory top while it is active
    if glulx.state().heap().active() {
        return value(1);
    }
    match glulx.state_mut().image_mut().set_end_mem(operands[0] as usize) {
        Ok(()) => value(0),
        Err(e) if e.is_recoverable() => value(1),
        Err(e) => Err(e),
    }
}

pub fn random(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let range = operands[0] as i32;
    let result = match range {
        0 => glulx.rng_mut().random(0),
        r if r > 0 => glulx.rng_mut().random(r as u32),
        r => (glulx.rng_mut().random(r.unsigned_abs()) as i32).wrapping_neg() as u32,
    };
    value(result)
}

pub fn setrandom(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx.rng_mut().seed(operands[0]);
    done()
}

pub fn quit(
    _glulx: &mut Glulx,
    _instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    Ok(InstructionResult::Quit)
}

/// Checksum validation is not performed; the image is trusted as loaded.
pub fn verify(
    _glulx: &mut Glulx,
    _instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    value(0)
}

pub fn restart(
    glulx: &mut Glulx,
    _instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    glulx.restart()?;
    done()
}

pub fn protect(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    let range = if operands[1] == 0 {
        None
    } else {
        Some((operands[0] as usize, operands[1] as usize))
    };
    glulx.state_mut().set_protect(range);
    done()
}

/// Snapshot the machine with the save opcode's own stub on the stack, then
/// hand the record to the host and wait for confirmation.
pub fn save(glulx: &mut Glulx, instruction: &Instruction) -> Result<InstructionResult, RuntimeError> {
    let _operands = operand_values(glulx, instruction)?;
    let dest = glulx.stub_dest(instruction.dest())?;
    glulx.state_mut().push_stub(dest.0, dest.1)?;
    let quetzal = Quetzal::try_from(glulx.state())?;
    glulx.state_mut().pop_stub()?;
    Ok(InstructionResult::Suspend(Suspension::Save {
        data: Vec::from(&quetzal),
    }))
}

pub fn restore(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let _operands = operand_values(glulx, instruction)?;
    Ok(InstructionResult::Suspend(Suspension::Restore))
}

pub fn saveundo(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let dest = glulx.stub_dest(instruction.dest())?;
    glulx.state_mut().push_stub(dest.0, dest.1)?;
    let quetzal = Quetzal::try_from(glulx.state())?;
    glulx.state_mut().pop_stub()?;
    glulx.push_undo(quetzal);
    glulx.store_dest(dest, 0)?;
    done()
}

pub fn restoreundo(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let dest = glulx.stub_dest(instruction.dest())?;
    match glulx.pop_undo() {
        None => {
            glulx.store_dest(dest, 1)?;
            done()
        }
        Some(quetzal) => match glulx.state_mut().restore_quetzal(&quetzal) {
            Ok(()) => {
                let stub = glulx.state_mut().pop_stub()?;
                glulx.redeem_stub(stub, 0xFFFFFFFF)?;
                done()
            }
            Err(e) if e.is_recoverable() => {
                warn!(target: "app::quetzal", "Undo restore failed: {}", e);
                glulx.store_dest(dest, 1)?;
                done()
            }
            Err(e) => Err(e),
        },
    }
}

pub fn accelfunc(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx.accel_mut().bind(operands[0], operands[1]);
    done()
}

pub fn accelparam(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    let operands = operand_values(glulx, instruction)?;
    glulx.accel_mut().set_param(operands[0], operands[1]);
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

    fn gestalt_code(selector: u8, arg: u8) -> Vec<u8> {
        vec![0x81, 0x00, 0x11, 0x08, selector, arg]
    }

    #[test]
    fn test_gestalt_answers() {
        assert_ok_eq!(run(&gestalt_code(0, 0)).state().peek(0), 0x00030103);
        assert_ok_eq!(run(&gestalt_code(2, 0)).state().peek(0), 1);
        assert_ok_eq!(run(&gestalt_code(3, 0)).state().peek(0), 1);
        // The channel system is supported, a window is not attached
        assert_ok_eq!(run(&gestalt_code(4, 20)).state().peek(0), 1);
        assert_ok_eq!(run(&gestalt_code(4, 2)).state().peek(0), 0);
        // No accelerated functions, no floats, no unknown selectors
        assert_ok_eq!(run(&gestalt_code(10, 1)).state().peek(0), 0);
        assert_ok_eq!(run(&gestalt_code(11, 0)).state().peek(0), 0);
        assert_ok_eq!(run(&gestalt_code(0x63, 0)).state().peek(0), 0);
    }

    #[test]
    fn test_getmemsize() {
        let g = run(&[0x81, 0x02, 0x08]); // getmemsize -> (SP)
        assert_ok_eq!(g.state().peek(0), 0x100);
    }

    #[test]
    fn test_setmemsize() {
        let g = run(&[
            0x81, 0x03, 0x82, 0x02, 0x00, // setmemsize #0x200 -> (SP)
        ]);
        assert_ok_eq!(g.state().peek(0), 0);
        assert_eq!(g.state().image().end_mem(), 0x200);
    }

    #[test]
    fn test_setmemsize_with_active_heap() {
        let g = run(&[
            0x81, 0x78, 0x82, 0x00, 0x40, // malloc #0x40 -> (SP)
            0x81, 0x03, 0x82, 0x08, 0x00, // setmemsize #0x800 -> (SP)
        ]);
        assert_ok_eq!(g.state().peek(0), 1);
    }

    #[test]
    fn test_random_degenerate_ranges() {
        // A range of 1 or -1 only ever produces zero
        let g = run(&[0x81, 0x10, 0x81, 0x01]); // random #1 -> (SP)
        assert_ok_eq!(g.state().peek(0), 0);
        let g = run(&[0x81, 0x10, 0x81, 0xFF]); // random #-1 -> (SP)
        assert_ok_eq!(g.state().peek(0), 0);
    }

    #[test]
    fn test_setrandom_deterministic() {
        let code = [
            0x81, 0x11, 0x01, 0x34, // setrandom #0x34
            0x81, 0x10, 0x80, // random #0 -> (SP)
        ];
        let a = run(&code);
        let b = run(&code);
        assert_eq!(assert_ok!(a.state().peek(0)), assert_ok!(b.state().peek(0)));
    }

    #[test]
    fn test_verify() {
        let g = run(&[0x81, 0x21, 0x08]); // verify -> (SP)
        assert_ok_eq!(g.state().peek(0), 0);
    }

    #[test]
    fn test_debugtrap_faults() {
        let mut g = test_glulx(&[0x81, 0x01, 0x01, 0x07, 0x81, 0x20]);
        assert!(g.execute(None).is_err_and(|e| !e.is_recoverable()));
    }

    #[test]
    fn test_accel_registration_is_inert() {
        let g = run(&[
            0x81, 0x81, 0x11, 0x00, 0x30, // accelparam #0 #0x30
            0x81, 0x80, 0x11, 0x01, 0x60, // accelfunc #1 #0x60
        ]);
        // Registration succeeded without changing execution
        assert!(!g.running());
    }
}
