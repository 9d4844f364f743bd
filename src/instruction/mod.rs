use std::fmt;

use crate::{error::*, fatal_error};

pub mod decoder;
pub mod processor;

/// Opcode numbers
pub mod opcodes {
    pub const NOP: u32 = 0x00;
    pub const ADD: u32 = 0x10;
    pub const SUB: u32 = 0x11;
    pub const MUL: u32 = 0x12;
    pub const DIV: u32 = 0x13;
    pub const MOD: u32 = 0x14;
    pub const NEG: u32 = 0x15;
    pub const BITAND: u32 = 0x18;
    pub const BITOR: u32 = 0x19;
    pub const BITXOR: u32 = 0x1A;
    pub const BITNOT: u32 = 0x1B;
    pub const SHIFTL: u32 = 0x1C;
    pub const SSHIFTR: u32 = 0x1D;
    pub const USHIFTR: u32 = 0x1E;
    pub const JUMP: u32 = 0x20;
    pub const JZ: u32 = 0x22;
    pub const JNZ: u32 = 0x23;
    pub const JEQ: u32 = 0x24;
    pub const JNE: u32 = 0x25;
    pub const JLT: u32 = 0x26;
    pub const JGE: u32 = 0x27;
    pub const JGT: u32 = 0x28;
    pub const JLE: u32 = 0x29;
    pub const JLTU: u32 = 0x2A;
    pub const JGEU: u32 = 0x2B;
    pub const JGTU: u32 = 0x2C;
    pub const JLEU: u32 = 0x2D;
    pub const CALL: u32 = 0x30;
    pub const RETURN: u32 = 0x31;
    pub const CATCH: u32 = 0x32;
    pub const THROW: u32 = 0x33;
    pub const TAILCALL: u32 = 0x34;
    pub const COPY: u32 = 0x40;
    pub const COPYS: u32 = 0x41;
    pub const COPYB: u32 = 0x42;
    pub const SEXS: u32 = 0x44;
    pub const SEXB: u32 = 0x45;
    pub const ALOAD: u32 = 0x48;
    pub const ALOADS: u32 = 0x49;
    pub const ALOADB: u32 = 0x4A;
    pub const ALOADBIT: u32 = 0x4B;
    pub const ASTORE: u32 = 0x4C;
    pub const ASTORES: u32 = 0x4D;
    pub const ASTOREB: u32 = 0x4E;
    pub const ASTOREBIT: u32 = 0x4F;
    pub const STKCOUNT: u32 = 0x50;
    pub const STKPEEK: u32 = 0x51;
    pub const STKSWAP: u32 = 0x52;
    pub const STKROLL: u32 = 0x53;
    pub const STKCOPY: u32 = 0x54;
    pub const STREAMCHAR: u32 = 0x70;
    pub const STREAMNUM: u32 = 0x71;
    pub const STREAMSTR: u32 = 0x72;
    pub const STREAMUNICHAR: u32 = 0x73;
    pub const GESTALT: u32 = 0x100;
    pub const DEBUGTRAP: u32 = 0x101;
    pub const GETMEMSIZE: u32 = 0x102;
    pub const SETMEMSIZE: u32 = 0x103;
    pub const JUMPABS: u32 = 0x104;
    pub const RANDOM: u32 = 0x110;
    pub const SETRANDOM: u32 = 0x111;
    pub const QUIT: u32 = 0x120;
    pub const VERIFY: u32 = 0x121;
    pub const RESTART: u32 = 0x122;
    pub const SAVE: u32 = 0x123;
    pub const RESTORE: u32 = 0x124;
    pub const SAVEUNDO: u32 = 0x125;
    pub const RESTOREUNDO: u32 = 0x126;
    pub const PROTECT: u32 = 0x127;
    pub const GLK: u32 = 0x130;
    pub const GETSTRINGTBL: u32 = 0x140;
    pub const SETSTRINGTBL: u32 = 0x141;
    pub const GETIOSYS: u32 = 0x148;
    pub const SETIOSYS: u32 = 0x149;
    pub const LINEARSEARCH: u32 = 0x150;
    pub const BINARYSEARCH: u32 = 0x151;
    pub const LINKEDSEARCH: u32 = 0x152;
    pub const CALLF: u32 = 0x160;
    pub const CALLFI: u32 = 0x161;
    pub const CALLFII: u32 = 0x162;
    pub const CALLFIII: u32 = 0x163;
    pub const MZERO: u32 = 0x170;
    pub const MCOPY: u32 = 0x171;
    pub const MALLOC: u32 = 0x178;
    pub const MFREE: u32 = 0x179;
    pub const ACCELFUNC: u32 = 0x180;
    pub const ACCELPARAM: u32 = 0x181;
    pub const CHANNEL: u32 = 0x1000;
    pub const READLINE: u32 = 0x1001;
    pub const READKEY: u32 = 0x1002;
}

/// Operand addressing modes, one per type nibble
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandMode {
    /// Literal zero, no data
    Zero,
    /// Signed 1-byte immediate
    ByteConst,
    /// Signed 2-byte immediate
    ShortConst,
    /// 4-byte immediate
    WordConst,
    /// Indirect through an address held in a 1-byte constant
    MemByte,
    /// Indirect through an address held in a 2-byte constant
    MemShort,
    /// Indirect through an address held in a 4-byte constant
    MemWord,
    /// Pop for a load, push for a store
    Stack,
    /// Frame local at a 1-byte offset
    LocalByte,
    /// Frame local at a 2-byte offset
    LocalShort,
    /// Frame local at a 4-byte offset
    LocalWord,
    /// Indirect through a RAM-relative 1-byte offset
    RamByte,
    /// Indirect through a RAM-relative 2-byte offset
    RamShort,
    /// Indirect through a RAM-relative 4-byte offset
    RamWord,
}

impl OperandMode {
    pub fn from_nibble(nibble: u8) -> Result<OperandMode, RuntimeError> {
        match nibble {
            0x0 => Ok(OperandMode::Zero),
            0x1 => Ok(OperandMode::ByteConst),
            0x2 => Ok(OperandMode::ShortConst),
            0x3 => Ok(OperandMode::WordConst),
            0x5 => Ok(OperandMode::MemByte),
            0x6 => Ok(OperandMode::MemShort),
            0x7 => Ok(OperandMode::MemWord),
            0x8 => Ok(OperandMode::Stack),
            0x9 => Ok(OperandMode::LocalByte),
            0xA => Ok(OperandMode::LocalShort),
            0xB => Ok(OperandMode::LocalWord),
            0xD => Ok(OperandMode::RamByte),
            0xE => Ok(OperandMode::RamShort),
            0xF => Ok(OperandMode::RamWord),
            _ => fatal_error!(
                ErrorCode::InvalidOperand,
                "Operand mode {:#x} is not valid",
                nibble
            ),
        }
    }

    /// Bytes of constant data following the type nibbles
    pub fn constant_size(&self) -> usize {
        match self {
            OperandMode::Zero | OperandMode::Stack => 0,
            OperandMode::ByteConst
            | OperandMode::MemByte
            | OperandMode::LocalByte
            | OperandMode::RamByte => 1,
            OperandMode::ShortConst
            | OperandMode::MemShort
            | OperandMode::LocalShort
            | OperandMode::RamShort => 2,
            OperandMode::WordConst
            | OperandMode::MemWord
            | OperandMode::LocalWord
            | OperandMode::RamWord => 4,
        }
    }

    /// Immediates cannot be stored into; zero means discard
    pub fn store_valid(&self) -> bool {
        !matches!(
            self,
            OperandMode::ByteConst | OperandMode::ShortConst | OperandMode::WordConst
        )
    }
}

/// A decoded operand: an addressing mode and its constant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operand {
    mode: OperandMode,
    value: u32,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.mode {
            OperandMode::Zero => write!(f, "#0"),
            OperandMode::ByteConst | OperandMode::ShortConst | OperandMode::WordConst => {
                write!(f, "#{:x}", self.value)
            }
            OperandMode::MemByte | OperandMode::MemShort | OperandMode::MemWord => {
                write!(f, "*{:x}", self.value)
            }
            OperandMode::Stack => write!(f, "(SP)"),
            OperandMode::LocalByte | OperandMode::LocalShort | OperandMode::LocalWord => {
                write!(f, "L{:x}", self.value)
            }
            OperandMode::RamByte | OperandMode::RamShort | OperandMode::RamWord => {
                write!(f, "R+{:x}", self.value)
            }
        }
    }
}

impl Operand {
    pub fn new(mode: OperandMode, value: u32) -> Operand {
        Operand { mode, value }
    }

    pub fn mode(&self) -> OperandMode {
        self.mode
    }

    pub fn value(&self) -> u32 {
        self.value
    }
}

/// Extra decoding a descriptor may call for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rule {
    /// Load and store operands only
    None,
    /// One delayed-store operand, redeemed through a call stub
    DelayedStore,
    /// A delayed-store operand and then one final load (the branch target)
    Catch,
}

/// Static opcode descriptor
#[derive(Clone, Copy, Debug)]
pub struct OpcodeDef {
    name: &'static str,
    loads: usize,
    stores: usize,
    rule: Rule,
}

impl OpcodeDef {
    const fn new(name: &'static str, loads: usize, stores: usize, rule: Rule) -> OpcodeDef {
        OpcodeDef {
            name,
            loads,
            stores,
            rule,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn stores(&self) -> usize {
        self.stores
    }

    pub fn rule(&self) -> Rule {
        self.rule
    }
}

/// Look up the static descriptor for an opcode number
pub fn opcode_def(opcode: u32) -> Option<OpcodeDef> {
    use opcodes::*;
    let def = match opcode {
        NOP => OpcodeDef::new("nop", 0, 0, Rule::None),
        ADD => OpcodeDef::new("add", 2, 1, Rule::None),
        SUB => OpcodeDef::new("sub", 2, 1, Rule::None),
        MUL => OpcodeDef::new("mul", 2, 1, Rule::None),
        DIV => OpcodeDef::new("div", 2, 1, Rule::None),
        MOD => OpcodeDef::new("mod", 2, 1, Rule::None),
        NEG => OpcodeDef::new("neg", 1, 1, Rule::None),
        BITAND => OpcodeDef::new("bitand", 2, 1, Rule::None),
        BITOR => OpcodeDef::new("bitor", 2, 1, Rule::None),
        BITXOR => OpcodeDef::new("bitxor", 2, 1, Rule::None),
        BITNOT => OpcodeDef::new("bitnot", 1, 1, Rule::None),
        SHIFTL => OpcodeDef::new("shiftl", 2, 1, Rule::None),
        SSHIFTR => OpcodeDef::new("sshiftr", 2, 1, Rule::None),
        USHIFTR => OpcodeDef::new("ushiftr", 2, 1, Rule::None),
        JUMP => OpcodeDef::new("jump", 1, 0, Rule::None),
        JZ => OpcodeDef::new("jz", 2, 0, Rule::None),
        JNZ => OpcodeDef::new("jnz", 2, 0, Rule::None),
        JEQ => OpcodeDef::new("jeq", 3, 0, Rule::None),
        JNE => OpcodeDef::new("jne", 3, 0, Rule::None),
        JLT => OpcodeDef::new("jlt", 3, 0, Rule::None),
        JGE => OpcodeDef::new("jge", 3, 0, Rule::None),
        JGT => OpcodeDef::new("jgt", 3, 0, Rule::None),
        JLE => OpcodeDef::new("jle", 3, 0, Rule::None),
        JLTU => OpcodeDef::new("jltu", 3, 0, Rule::None),
        JGEU => OpcodeDef::new("jgeu", 3, 0, Rule::None),
        JGTU => OpcodeDef::new("jgtu", 3, 0, Rule::None),
        JLEU => OpcodeDef::new("jleu", 3, 0, Rule::None),
        CALL => OpcodeDef::new("call", 2, 0, Rule::DelayedStore),
        RETURN => OpcodeDef::new("return", 1, 0, Rule::None),
        CATCH => OpcodeDef::new("catch", 0, 0, Rule::Catch),
        THROW => OpcodeDef::new("throw", 2, 0, Rule::None),
        TAILCALL => OpcodeDef::new("tailcall", 2, 0, Rule::None),
        COPY => OpcodeDef::new("copy", 1, 1, Rule::None),
        COPYS => OpcodeDef::new("copys", 1, 1, Rule::None),
        COPYB => OpcodeDef::new("copyb", 1, 1, Rule::None),
        SEXS => OpcodeDef::new("sexs", 1, 1, Rule::None),
        SEXB => OpcodeDef::new("sexb", 1, 1, Rule::None),
        ALOAD => OpcodeDef::new("aload", 2, 1, Rule::None),
        ALOADS => OpcodeDef::new("aloads", 2, 1, Rule::None),
        ALOADB => OpcodeDef::new("aloadb", 2, 1, Rule::None),
        ALOADBIT => OpcodeDef::new("aloadbit", 2, 1, Rule::None),
        ASTORE => OpcodeDef::new("astore", 3, 0, Rule::None),
        ASTORES => OpcodeDef::new("astores", 3, 0, Rule::None),
        ASTOREB => OpcodeDef::new("astoreb", 3, 0, Rule::None),
        ASTOREBIT => OpcodeDef::new("astorebit", 3, 0, Rule::None),
        STKCOUNT => OpcodeDef::new("stkcount", 0, 1, Rule::None),
        STKPEEK => OpcodeDef::new("stkpeek", 1, 1, Rule::None),
        STKSWAP => OpcodeDef::new("stkswap", 0, 0, Rule::None),
        STKROLL => OpcodeDef::new("stkroll", 2, 0, Rule::None),
        STKCOPY => OpcodeDef::new("stkcopy", 1, 0, Rule::None),
        STREAMCHAR => OpcodeDef::new("streamchar", 1, 0, Rule::None),
        STREAMNUM => OpcodeDef::new("streamnum", 1, 0, Rule::None),
        STREAMSTR => OpcodeDef::new("streamstr", 1, 0, Rule::None),
        STREAMUNICHAR => OpcodeDef::new("streamunichar", 1, 0, Rule::None),
        GESTALT => OpcodeDef::new("gestalt", 2, 1, Rule::None),
        DEBUGTRAP => OpcodeDef::new("debugtrap", 1, 0, Rule::None),
        GETMEMSIZE => OpcodeDef::new("getmemsize", 0, 1, Rule::None),
        SETMEMSIZE => OpcodeDef::new("setmemsize", 1, 1, Rule::None),
        JUMPABS => OpcodeDef::new("jumpabs", 1, 0, Rule::None),
        RANDOM => OpcodeDef::new("random", 1, 1, Rule::None),
        SETRANDOM => OpcodeDef::new("setrandom", 1, 0, Rule::None),
        QUIT => OpcodeDef::new("quit", 0, 0, Rule::None),
        VERIFY => OpcodeDef::new("verify", 0, 1, Rule::None),
        RESTART => OpcodeDef::new("restart", 0, 0, Rule::None),
        SAVE => OpcodeDef::new("save", 1, 0, Rule::DelayedStore),
        RESTORE => OpcodeDef::new("restore", 1, 0, Rule::DelayedStore),
        SAVEUNDO => OpcodeDef::new("saveundo", 0, 0, Rule::DelayedStore),
        RESTOREUNDO => OpcodeDef::new("restoreundo", 0, 0, Rule::DelayedStore),
        PROTECT => OpcodeDef::new("protect", 2, 0, Rule::None),
        GLK => OpcodeDef::new("glk", 2, 1, Rule::None),
        GETSTRINGTBL => OpcodeDef::new("getstringtbl", 0, 1, Rule::None),
        SETSTRINGTBL => OpcodeDef::new("setstringtbl", 1, 0, Rule::None),
        GETIOSYS => OpcodeDef::new("getiosys", 0, 2, Rule::None),
        SETIOSYS => OpcodeDef::new("setiosys", 2, 0, Rule::None),
        LINEARSEARCH => OpcodeDef::new("linearsearch", 7, 1, Rule::None),
        BINARYSEARCH => OpcodeDef::new("binarysearch", 7, 1, Rule::None),
        LINKEDSEARCH => OpcodeDef::new("linkedsearch", 6, 1, Rule::None),
        CALLF => OpcodeDef::new("callf", 1, 0, Rule::DelayedStore),
        CALLFI => OpcodeDef::new("callfi", 2, 0, Rule::DelayedStore),
        CALLFII => OpcodeDef::new("callfii", 3, 0, Rule::DelayedStore),
        CALLFIII => OpcodeDef::new("callfiii", 4, 0, Rule::DelayedStore),
        MZERO => OpcodeDef::new("mzero", 2, 0, Rule::None),
        MCOPY => OpcodeDef::new("mcopy", 3, 0, Rule::None),
        MALLOC => OpcodeDef::new("malloc", 1, 1, Rule::None),
        MFREE => OpcodeDef::new("mfree", 1, 0, Rule::None),
        ACCELFUNC => OpcodeDef::new("accelfunc", 2, 0, Rule::None),
        ACCELPARAM => OpcodeDef::new("accelparam", 2, 0, Rule::None),
        CHANNEL => OpcodeDef::new("channel", 1, 0, Rule::None),
        READLINE => OpcodeDef::new("readline", 2, 1, Rule::None),
        READKEY => OpcodeDef::new("readkey", 0, 1, Rule::None),
        _ => return None,
    };
    Some(def)
}

/// What an opcode handler produced
#[derive(Debug)]
pub enum InstructionResult {
    /// Values for the instruction's store operands, in order.  A handler
    /// that performs its own stores returns fewer values than stores.
    Continue(Vec<u32>),
    /// Block until the host supplies a response
    Suspend(Suspension),
    /// The program is over
    Quit,
}

/// What a suspended instruction is waiting for
#[derive(Debug)]
pub enum Suspension {
    /// A line of input into `buffer`, at most `max_len` bytes
    ReadLine { buffer: usize, max_len: usize },
    /// A single keystroke
    ReadKey,
    /// Confirmation that the serialized record was written
    Save { data: Vec<u8> },
    /// A serialized record to restore from
    Restore,
}

/// A fully decoded instruction
pub struct Instruction {
    address: usize,
    opcode: u32,
    def: OpcodeDef,
    operands: Vec<Operand>,
    stores: Vec<Operand>,
    dest: Option<Operand>,
    next_address: usize,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "${:06x} {}", self.address, self.def.name())?;
        for o in &self.operands {
            write!(f, " {}", o)?;
        }
        for s in &self.stores {
            write!(f, " -> {}", s)?;
        }
        if let Some(d) = &self.dest {
            write!(f, " => {}", d)?;
        }
        Ok(())
    }
}

impl Instruction {
    pub fn new(
        address: usize,
        opcode: u32,
        def: OpcodeDef,
        operands: Vec<Operand>,
        stores: Vec<Operand>,
        dest: Option<Operand>,
        next_address: usize,
    ) -> Instruction {
        Instruction {
            address,
            opcode,
            def,
            operands,
            stores,
            dest,
            next_address,
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn opcode(&self) -> u32 {
        self.opcode
    }

    pub fn def(&self) -> &OpcodeDef {
        &self.def
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn stores(&self) -> &[Operand] {
        &self.stores
    }

    pub fn dest(&self) -> Option<&Operand> {
        self.dest.as_ref()
    }

    pub fn next_address(&self) -> usize {
        self.next_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_mode_from_nibble() {
        assert!(OperandMode::from_nibble(0x4).is_err());
        assert!(OperandMode::from_nibble(0xC).is_err());
        assert_eq!(OperandMode::from_nibble(0x8).unwrap(), OperandMode::Stack);
        assert_eq!(
            OperandMode::from_nibble(0xF).unwrap(),
            OperandMode::RamWord
        );
    }

    #[test]
    fn test_constant_size() {
        assert_eq!(OperandMode::Zero.constant_size(), 0);
        assert_eq!(OperandMode::Stack.constant_size(), 0);
        assert_eq!(OperandMode::ByteConst.constant_size(), 1);
        assert_eq!(OperandMode::MemShort.constant_size(), 2);
        assert_eq!(OperandMode::RamWord.constant_size(), 4);
    }

    #[test]
    fn test_store_valid() {
        assert!(OperandMode::Zero.store_valid());
        assert!(OperandMode::Stack.store_valid());
        assert!(OperandMode::MemWord.store_valid());
        assert!(!OperandMode::ByteConst.store_valid());
        assert!(!OperandMode::WordConst.store_valid());
    }

    #[test]
    fn test_opcode_def() {
        let add = opcode_def(opcodes::ADD).unwrap();
        assert_eq!(add.name(), "add");
        assert_eq!(add.loads(), 2);
        assert_eq!(add.stores(), 1);
        assert_eq!(add.rule(), Rule::None);

        let catch = opcode_def(opcodes::CATCH).unwrap();
        assert_eq!(catch.rule(), Rule::Catch);

        let getiosys = opcode_def(opcodes::GETIOSYS).unwrap();
        assert_eq!(getiosys.stores(), 2);

        assert!(opcode_def(0x99).is_none());
    }
}
