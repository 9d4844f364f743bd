//! Opcode semantics, split by family and dispatched from the static table.
use crate::glulx::Glulx;
use crate::{error::*, fatal_error};

use super::*;

mod processor_arith;
mod processor_branch;
mod processor_call;
mod processor_mem;
mod processor_search;
mod processor_stack;
mod processor_stream;
mod processor_sys;

/// Resolve the decoded load operands, popping and dereferencing in operand
/// order.
pub fn operand_values(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<Vec<u32>, RuntimeError> {
    let mut values = Vec::new();
    for operand in instruction.operands() {
        let value = match operand.mode() {
            OperandMode::Zero => 0,
            OperandMode::ByteConst | OperandMode::ShortConst | OperandMode::WordConst => {
                operand.value()
            }
            OperandMode::MemByte | OperandMode::MemShort | OperandMode::MemWord => {
                glulx.state().read_word(operand.value() as usize)?
            }
            OperandMode::Stack => glulx.state_mut().pop()?,
            OperandMode::LocalByte | OperandMode::LocalShort | OperandMode::LocalWord => {
                glulx.state().local_read(operand.value() as usize, 4)?
            }
            OperandMode::RamByte | OperandMode::RamShort | OperandMode::RamWord => {
                let address = glulx.state().image().ram_address(operand.value());
                glulx.state().read_word(address)?
            }
        };
        values.push(value);
    }
    if !values.is_empty() {
        debug!(target: "app::instruction", "Operand values: {:x?}", values);
    }
    Ok(values)
}

fn store_value(glulx: &mut Glulx, operand: &Operand, value: u32) -> Result<(), RuntimeError> {
    match operand.mode() {
        OperandMode::Zero => Ok(()),
        OperandMode::MemByte | OperandMode::MemShort | OperandMode::MemWord => {
            glulx.state_mut().write_word(operand.value() as usize, value)
        }
        OperandMode::Stack => glulx.state_mut().push(value),
        OperandMode::LocalByte | OperandMode::LocalShort | OperandMode::LocalWord => {
            glulx.state_mut().local_write(operand.value() as usize, 4, value)
        }
        OperandMode::RamByte | OperandMode::RamShort | OperandMode::RamWord => {
            let address = glulx.state().image().ram_address(operand.value());
            glulx.state_mut().write_word(address, value)
        }
        _ => fatal_error!(
            ErrorCode::InvalidOperand,
            "Store through a literal operand"
        ),
    }
}

/// Store handler results into the decoded store destinations, in order.
/// Handlers that perform their own stores return fewer values.
pub fn store_values(
    glulx: &mut Glulx,
    stores: &[Operand],
    values: &[u32],
) -> Result<(), RuntimeError> {
    if values.len() > stores.len() {
        return fatal_error!(
            ErrorCode::Interpreter,
            "{} results for {} store operands",
            values.len(),
            stores.len()
        );
    }
    for (operand, value) in stores.iter().zip(values.iter()) {
        store_value(glulx, operand, *value)?;
    }
    Ok(())
}

pub fn dispatch(
    glulx: &mut Glulx,
    instruction: &Instruction,
) -> Result<InstructionResult, RuntimeError> {
    use opcodes::*;
    match instruction.opcode() {
        NOP => processor_sys::nop(glulx, instruction),
        ADD => processor_arith::add(glulx, instruction),
        SUB => processor_arith::sub(glulx, instruction),
        MUL => processor_arith::mul(glulx, instruction),
        DIV => processor_arith::div(glulx, instruction),
        MOD => processor_arith::modulus(glulx, instruction),
        NEG => processor_arith::neg(glulx, instruction),
        BITAND => processor_arith::bitand(glulx, instruction),
        BITOR => processor_arith::bitor(glulx, instruction),
        BITXOR => processor_arith::bitxor(glulx, instruction),
        BITNOT => processor_arith::bitnot(glulx, instruction),
        SHIFTL => processor_arith::shiftl(glulx, instruction),
        SSHIFTR => processor_arith::sshiftr(glulx, instruction),
        USHIFTR => processor_arith::ushiftr(glulx, instruction),
        SEXS => processor_arith::sexs(glulx, instruction),
        SEXB => processor_arith::sexb(glulx, instruction),
        JUMP => processor_branch::jump(glulx, instruction),
        JZ => processor_branch::jz(glulx, instruction),
        JNZ => processor_branch::jnz(glulx, instruction),
        JEQ => processor_branch::jeq(glulx, instruction),
        JNE => processor_branch::jne(glulx, instruction),
        JLT => processor_branch::jlt(glulx, instruction),
        JGE => processor_branch::jge(glulx, instruction),
        JGT => processor_branch::jgt(glulx, instruction),
        JLE => processor_branch::jle(glulx, instruction),
        JLTU => processor_branch::jltu(glulx, instruction),
        JGEU => processor_branch::jgeu(glulx, instruction),
        JGTU => processor_branch::jgtu(glulx, instruction),
        JLEU => processor_branch::jleu(glulx, instruction),
        JUMPABS => processor_branch::jumpabs(glulx, instruction),
        CALL => processor_call::call(glulx, instruction),
        RETURN => processor_call::ret(glulx, instruction),
        CATCH => processor_call::catch(glulx, instruction),
        THROW => processor_call::throw(glulx, instruction),
        TAILCALL => processor_call::tailcall(glulx, instruction),
        CALLF => processor_call::callf(glulx, instruction),
        CALLFI => processor_call::callf(glulx, instruction),
        CALLFII => processor_call::callf(glulx, instruction),
        CALLFIII => processor_call::callf(glulx, instruction),
        COPY => processor_mem::copy(glulx, instruction),
        COPYS => processor_mem::copys(glulx, instruction),
        COPYB => processor_mem::copyb(glulx, instruction),
        ALOAD => processor_mem::aload(glulx, instruction),
        ALOADS => processor_mem::aloads(glulx, instruction),
        ALOADB => processor_mem::aloadb(glulx, instruction),
        ALOADBIT => processor_mem::aloadbit(glulx, instruction),
        ASTORE => processor_mem::astore(glulx, instruction),
        ASTORES => processor_mem::astores(glulx, instruction),
        ASTOREB => processor_mem::astoreb(glulx, instruction),
        ASTOREBIT => processor_mem::astorebit(glulx, instruction),
        MZERO => processor_mem::mzero(glulx, instruction),
        MCOPY => processor_mem::mcopy(glulx, instruction),
        MALLOC => processor_mem::malloc(glulx, instruction),
        MFREE => processor_mem::mfree(glulx, instruction),
        STKCOUNT => processor_stack::stkcount(glulx, instruction),
        STKPEEK => processor_stack::stkpeek(glulx, instruction),
        STKSWAP => processor_stack::stkswap(glulx, instruction),
        STKROLL => processor_stack::stkroll(glulx, instruction),
        STKCOPY => processor_stack::stkcopy(glulx, instruction),
        STREAMCHAR => processor_stream::streamchar(glulx, instruction),
        STREAMNUM => processor_stream::streamnum(glulx, instruction),
        STREAMSTR => processor_stream::streamstr(glulx, instruction),
        STREAMUNICHAR => processor_stream::streamunichar(glulx, instruction),
        GETSTRINGTBL => processor_stream::getstringtbl(glulx, instruction),
        SETSTRINGTBL => processor_stream::setstringtbl(glulx, instruction),
        GETIOSYS => processor_stream::getiosys(glulx, instruction),
        SETIOSYS => processor_stream::setiosys(glulx, instruction),
        GLK => processor_stream::glk(glulx, instruction),
        CHANNEL => processor_stream::channel(glulx, instruction),
        READLINE => processor_stream::readline(glulx, instruction),
        READKEY => processor_stream::readkey(glulx, instruction),
        LINEARSEARCH => processor_search::linearsearch(glulx, instruction),
        BINARYSEARCH => processor_search::binarysearch(glulx, instruction),
        LINKEDSEARCH => processor_search::linkedsearch(glulx, instruction),
        GESTALT => processor_sys::gestalt(glulx, instruction),
        DEBUGTRAP => processor_sys::debugtrap(glulx, instruction),
        GETMEMSIZE => processor_sys::getmemsize(glulx, instruction),
        SETMEMSIZE => processor_sys::setmemsize(glulx, instruction),
        RANDOM => processor_sys::random(glulx, instruction),
        SETRANDOM => processor_sys::setrandom(glulx, instruction),
        QUIT => processor_sys::quit(glulx, instruction),
        VERIFY => processor_sys::verify(glulx, instruction),
        RESTART => processor_sys::restart(glulx, instruction),
        SAVE => processor_sys::save(glulx, instruction),
        RESTORE => processor_sys::restore(glulx, instruction),
        SAVEUNDO => processor_sys::saveundo(glulx, instruction),
        RESTOREUNDO => processor_sys::restoreundo(glulx, instruction),
        PROTECT => processor_sys::protect(glulx, instruction),
        ACCELFUNC => processor_sys::accelfunc(glulx, instruction),
        ACCELPARAM => processor_sys::accelparam(glulx, instruction),
        _ => fatal_error!(
            ErrorCode::InvalidInstruction,
            "Unimplemented opcode {:#x} ({})",
            instruction.opcode(),
            instruction.def().name()
        ),
    }
}
