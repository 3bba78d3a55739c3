//! The decoded-instruction record.

use crate::{DisassemblerMode, InstructionFlags, Operand, Register};

/// Maximum number of explicit operands an x86 instruction can carry.
/// Decoders reject any encoding that would exceed it.
pub const MAX_OPERANDS: usize = 4;

/// The full decode result for one instruction.
///
/// Constructed by the byte-stream decoder, immutable afterwards. All
/// position-dependent computation (absolute branch targets, symbol
/// lookup) happens downstream on this record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstructionInfo {
    /// Mode and prefix flag bits.
    pub flags: InstructionFlags,
    /// High-level operation category.
    pub operation: Operation,
    /// Mnemonic string (e.g. "mov", "jne").
    pub mnemonic: String,
    /// Virtual address of the first instruction byte.
    pub address: u64,
    /// Address of the byte immediately following the instruction. This,
    /// not `address`, is the base relative deltas are added to.
    pub instr_pointer: u64,
    /// Instruction length in bytes.
    pub length: usize,
    /// Raw instruction bytes.
    pub bytes: Vec<u8>,
    /// Effective operand width in bits (16, 32, or 64).
    pub operand_mode: u16,
    /// Effective address width in bits (16, 32, or 64).
    pub address_mode: u16,
    /// Decoded operands, destination first. At most [`MAX_OPERANDS`].
    pub operands: Vec<Operand>,
    /// Segment override register, if a segment prefix was present.
    pub segment: Option<Register>,
}

impl InstructionInfo {
    /// Creates a record with no operands; the decoder fills in the rest.
    pub fn new(
        mode: DisassemblerMode,
        address: u64,
        operation: Operation,
        mnemonic: impl Into<String>,
    ) -> Self {
        Self {
            flags: mode.flag(),
            operation,
            mnemonic: mnemonic.into(),
            address,
            instr_pointer: address,
            length: 0,
            bytes: Vec::new(),
            operand_mode: mode.default_operand_size(),
            address_mode: mode.default_address_size(),
            operands: Vec::new(),
            segment: None,
        }
    }

    /// Returns true if this instruction was decoded in 64-bit mode.
    pub fn is_mode64(&self) -> bool {
        self.flags.contains(InstructionFlags::MODE_64)
    }

    /// Returns true if any operand is relative (branch delta or
    /// rip-relative memory reference).
    pub fn is_relative(&self) -> bool {
        self.flags.contains(InstructionFlags::RELATIVE)
    }

    /// Returns the address of the next sequential instruction.
    pub fn end_address(&self) -> u64 {
        self.instr_pointer
    }

    /// Returns true if this instruction is a branch (jump or call).
    pub fn is_branch(&self) -> bool {
        matches!(
            self.operation,
            Operation::Jump | Operation::ConditionalJump | Operation::Call
        )
    }
}

/// High-level operation categories (mnemonic classes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operation {
    // Data movement
    Move,
    Push,
    Pop,
    Exchange,
    LoadEffectiveAddress,
    Convert,

    // Arithmetic
    Add,
    AddWithCarry,
    Sub,
    SubWithBorrow,
    Mul,
    Div,
    Neg,
    Inc,
    Dec,

    // Logical
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Sar,
    Rol,
    Ror,
    Rcl,
    Rcr,

    // Comparison
    Compare,
    Test,
    BitTest,

    // Conditional data movement
    ConditionalMove,
    ConditionalSet,

    // Control flow
    Jump,
    ConditionalJump,
    Call,
    Return,

    // String operations
    StringOp,

    // I/O
    Io,

    // System
    Syscall,
    Interrupt,
    Nop,
    Halt,

    // x87 FPU
    Fpu,

    // Other
    Other(u16),
}

impl Operation {
    /// Returns the name of this operation category.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Exchange => "exchange",
            Self::LoadEffectiveAddress => "lea",
            Self::Convert => "convert",
            Self::Add => "add",
            Self::AddWithCarry => "adc",
            Self::Sub => "sub",
            Self::SubWithBorrow => "sbb",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Neg => "neg",
            Self::Inc => "inc",
            Self::Dec => "dec",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Not => "not",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Sar => "sar",
            Self::Rol => "rol",
            Self::Ror => "ror",
            Self::Rcl => "rcl",
            Self::Rcr => "rcr",
            Self::Compare => "compare",
            Self::Test => "test",
            Self::BitTest => "bit_test",
            Self::ConditionalMove => "cond_move",
            Self::ConditionalSet => "cond_set",
            Self::Jump => "jump",
            Self::ConditionalJump => "cond_jump",
            Self::Call => "call",
            Self::Return => "return",
            Self::StringOp => "string",
            Self::Io => "io",
            Self::Syscall => "syscall",
            Self::Interrupt => "interrupt",
            Self::Nop => "nop",
            Self::Halt => "halt",
            Self::Fpu => "fpu",
            Self::Other(_) => "other",
        }
    }
}

/// Branch condition for conditional jumps, moves, and sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Condition {
    Equal,
    NotEqual,
    Above,
    AboveOrEqual,
    Below,
    BelowOrEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Sign,
    NotSign,
    Overflow,
    NotOverflow,
    Parity,
    NotParity,
}

impl Condition {
    /// Decodes the condition from the low nibble of a Jcc/SETcc/CMOVcc
    /// opcode.
    pub fn from_encoding(nibble: u8) -> Self {
        match nibble & 0x0F {
            0x0 => Self::Overflow,
            0x1 => Self::NotOverflow,
            0x2 => Self::Below,
            0x3 => Self::AboveOrEqual,
            0x4 => Self::Equal,
            0x5 => Self::NotEqual,
            0x6 => Self::BelowOrEqual,
            0x7 => Self::Above,
            0x8 => Self::Sign,
            0x9 => Self::NotSign,
            0xA => Self::Parity,
            0xB => Self::NotParity,
            0xC => Self::Less,
            0xD => Self::GreaterOrEqual,
            0xE => Self::LessOrEqual,
            _ => Self::Greater,
        }
    }

    /// Returns the inverse condition.
    pub fn inverse(&self) -> Self {
        match self {
            Self::Equal => Self::NotEqual,
            Self::NotEqual => Self::Equal,
            Self::Above => Self::BelowOrEqual,
            Self::AboveOrEqual => Self::Below,
            Self::Below => Self::AboveOrEqual,
            Self::BelowOrEqual => Self::Above,
            Self::Greater => Self::LessOrEqual,
            Self::GreaterOrEqual => Self::Less,
            Self::Less => Self::GreaterOrEqual,
            Self::LessOrEqual => Self::Greater,
            Self::Sign => Self::NotSign,
            Self::NotSign => Self::Sign,
            Self::Overflow => Self::NotOverflow,
            Self::NotOverflow => Self::Overflow,
            Self::Parity => Self::NotParity,
            Self::NotParity => Self::Parity,
        }
    }

    /// Returns the mnemonic suffix for this condition ("e" in "jne").
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Equal => "e",
            Self::NotEqual => "ne",
            Self::Above => "a",
            Self::AboveOrEqual => "ae",
            Self::Below => "b",
            Self::BelowOrEqual => "be",
            Self::Greater => "g",
            Self::GreaterOrEqual => "ge",
            Self::Less => "l",
            Self::LessOrEqual => "le",
            Self::Sign => "s",
            Self::NotSign => "ns",
            Self::Overflow => "o",
            Self::NotOverflow => "no",
            Self::Parity => "p",
            Self::NotParity => "np",
        }
    }
}

impl std::fmt::Display for InstructionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}:  ", self.address)?;

        for byte in &self.bytes {
            write!(f, "{:02x} ", byte)?;
        }
        for _ in self.bytes.len()..8 {
            write!(f, "   ")?;
        }

        write!(f, " {}", self.mnemonic)?;

        if !self.operands.is_empty() {
            write!(f, " ")?;
            for (i, op) in self.operands.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", op)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_round_trips() {
        for nibble in 0..16u8 {
            let cond = Condition::from_encoding(nibble);
            assert_eq!(cond.inverse().inverse(), cond);
        }
        assert_eq!(Condition::from_encoding(0x5), Condition::NotEqual);
        assert_eq!(Condition::NotEqual.suffix(), "ne");
    }

    #[test]
    fn mode_bits_on_fresh_record() {
        let info = InstructionInfo::new(
            DisassemblerMode::Bits64,
            0x1000,
            Operation::Nop,
            "nop",
        );
        assert!(info.is_mode64());
        assert!(!info.is_relative());
        assert_eq!(info.operand_mode, 32);
        assert_eq!(info.address_mode, 64);
    }
}
