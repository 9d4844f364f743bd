use super::*;
use crate::glulx::state::State;

/// Read the variable-width opcode number at `address`.
///
/// One byte below 0x80, two bytes (minus 0x8000) below 0xC0, four bytes
/// (minus 0xC0000000) from 0xC0 up.
fn opcode_number(state: &State, address: usize) -> Result<(usize, u32), RuntimeError> {
    let b = state.read_byte(address)? as u32;
    if b < 0x80 {
        Ok((1, b))
    } else if b < 0xC0 {
        Ok((2, state.read_short(address)? as u32 - 0x8000))
    } else {
        Ok((4, state.read_word(address)?.wrapping_sub(0xC0000000)))
    }
}

fn sign_extend(mode: OperandMode, raw: u32) -> u32 {
    match mode {
        OperandMode::ByteConst => raw as u8 as i8 as i32 as u32,
        OperandMode::ShortConst => raw as u16 as i16 as i32 as u32,
        _ => raw,
    }
}

pub fn decode_instruction(state: &State, address: usize) -> Result<Instruction, RuntimeError> {
    let (mut offset, opcode) = opcode_number(state, address)?;
    let def = match opcode_def(opcode) {
        Some(d) => d,
        None => {
            return fatal_error!(
                ErrorCode::InvalidInstruction,
                "Unknown opcode {:#x} at {:#x}",
                opcode,
                address
            )
        }
    };

    let has_dest = matches!(def.rule(), Rule::DelayedStore | Rule::Catch);
    let extra_load = def.rule() == Rule::Catch;
    let count =
        def.loads() + def.stores() + if has_dest { 1 } else { 0 } + if extra_load { 1 } else { 0 };

    // Two type nibbles per byte, low nibble first
    let mut modes = Vec::new();
    for i in 0..count {
        let b = state.read_byte(address + offset + i / 2)?;
        let nibble = if i % 2 == 0 { b & 0xF } else { b >> 4 };
        modes.push(OperandMode::from_nibble(nibble)?);
    }
    offset += count.div_ceil(2);

    // Constant data follows the whole nibble block, in operand order
    let mut decoded = Vec::new();
    for mode in modes {
        let raw = match mode.constant_size() {
            0 => 0,
            1 => state.read_byte(address + offset)? as u32,
            2 => state.read_short(address + offset)? as u32,
            _ => state.read_word(address + offset)?,
        };
        offset += mode.constant_size();
        decoded.push(Operand::new(mode, sign_extend(mode, raw)));
    }

    let mut operands: Vec<Operand> = decoded[0..def.loads()].to_vec();
    let stores: Vec<Operand> = decoded[def.loads()..def.loads() + def.stores()].to_vec();
    let mut rest = decoded[def.loads() + def.stores()..].iter();
    let dest = if has_dest { rest.next().copied() } else { None };
    if extra_load {
        if let Some(o) = rest.next() {
            operands.push(*o);
        }
    }

    for s in stores.iter().chain(dest.iter()) {
        if !s.mode().store_valid() {
            return fatal_error!(
                ErrorCode::InvalidOperand,
                "Store operand of {} at {:#x} uses a literal mode",
                def.name(),
                address
            );
        }
    }

    Ok(Instruction::new(
        address,
        opcode,
        def,
        operands,
        stores,
        dest,
        address + offset,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assert_ok,
        glulx::state::image::Image,
        test_util::test_image_with_rom,
    };

    fn state_with_code(code: &[u8]) -> State {
        let image = assert_ok!(Image::new(test_image_with_rom(code)));
        assert_ok!(State::new(image, 0))
    }

    #[test]
    fn test_one_byte_opcode() {
        // add #1 #2 -> (SP): modes 0x11 then 0x08
        let s = state_with_code(&[0x10, 0x11, 0x08, 0x01, 0x02]);
        let i = assert_ok!(decode_instruction(&s, 0x28));
        assert_eq!(i.opcode(), opcodes::ADD);
        assert_eq!(i.def().name(), "add");
        assert_eq!(i.operands().len(), 2);
        assert_eq!(i.operands()[0], Operand::new(OperandMode::ByteConst, 1));
        assert_eq!(i.operands()[1], Operand::new(OperandMode::ByteConst, 2));
        assert_eq!(i.stores()[0].mode(), OperandMode::Stack);
        assert_eq!(i.next_address(), 0x28 + 5);
    }

    #[test]
    fn test_two_byte_opcode() {
        // gestalt (0x100 encodes as 0x81 0x00) #4 #0 -> (SP)
        let s = state_with_code(&[0x81, 0x00, 0x01, 0x08, 0x04]);
        let i = assert_ok!(decode_instruction(&s, 0x28));
        assert_eq!(i.opcode(), opcodes::GESTALT);
        assert_eq!(i.operands()[0].value(), 4);
        assert_eq!(i.operands()[1].mode(), OperandMode::Zero);
        assert_eq!(i.stores()[0].mode(), OperandMode::Stack);
    }

    #[test]
    fn test_four_byte_opcode() {
        // channel (0x1000 encodes as 0xC0 0x00 0x10 0x00), word constant
        let s = state_with_code(&[0xC0, 0x00, 0x10, 0x00, 0x03, 0x4D, 0x41, 0x49, 0x4E]);
        let i = assert_ok!(decode_instruction(&s, 0x28));
        assert_eq!(i.opcode(), opcodes::CHANNEL);
        assert_eq!(i.operands()[0].value(), 0x4D41494E);
    }

    #[test]
    fn test_sign_extension() {
        // add #-1 #-2 -> (SP)
        let s = state_with_code(&[0x10, 0x11, 0x08, 0xFF, 0xFE]);
        let i = assert_ok!(decode_instruction(&s, 0x28));
        assert_eq!(i.operands()[0].value(), 0xFFFFFFFF);
        assert_eq!(i.operands()[1].value(), 0xFFFFFFFE);
    }

    #[test]
    fn test_delayed_store() {
        // call *00c8 #0 => L4 (delayed store to a local)
        let s = state_with_code(&[0x30, 0x06, 0x09, 0x00, 0xC8, 0x04]);
        let i = assert_ok!(decode_instruction(&s, 0x28));
        assert_eq!(i.opcode(), opcodes::CALL);
        assert_eq!(i.operands().len(), 2);
        assert_eq!(i.operands()[0].value(), 0xC8);
        let d = i.dest().expect("call decodes a delayed store");
        assert_eq!(d.mode(), OperandMode::LocalByte);
        assert_eq!(d.value(), 4);
    }

    #[test]
    fn test_catch_trailing_load() {
        // catch => (SP), branch target #12: nibbles are dest then load
        let s = state_with_code(&[0x32, 0x18, 0x12]);
        let i = assert_ok!(decode_instruction(&s, 0x28));
        assert_eq!(i.opcode(), opcodes::CATCH);
        let d = i.dest().expect("catch decodes a delayed store");
        assert_eq!(d.mode(), OperandMode::Stack);
        assert_eq!(i.operands().len(), 1);
        assert_eq!(i.operands()[0].value(), 0x12);
    }

    #[test]
    fn test_unknown_opcode() {
        let s = state_with_code(&[0x7F]);
        let e = decode_instruction(&s, 0x28);
        assert!(e.is_err_and(|e| !e.is_recoverable()));
    }

    #[test]
    fn test_store_literal_mode() {
        // add #1 #2 -> #3 is not decodable
        let s = state_with_code(&[0x10, 0x11, 0x01, 0x01, 0x02, 0x03]);
        assert!(decode_instruction(&s, 0x28).is_err());
    }

    #[test]
    fn test_invalid_mode_nibble() {
        let s = state_with_code(&[0x10, 0x44, 0x08, 0x01, 0x02]);
        assert!(decode_instruction(&s, 0x28).is_err());
    }
}
