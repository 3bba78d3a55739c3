//! Disassembler mode and per-instruction flag bits.

use std::ops::{BitOr, BitOrAssign};

/// Processor mode the byte stream is decoded under.
///
/// The mode fixes the default operand and address widths; prefixes toggle
/// them per instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DisassemblerMode {
    /// 16-bit real/protected mode.
    Bits16,
    /// 32-bit protected mode.
    Bits32,
    /// 64-bit long mode.
    Bits64,
}

impl DisassemblerMode {
    /// Returns the default operand width in bits for this mode.
    pub fn default_operand_size(&self) -> u16 {
        match self {
            Self::Bits16 => 16,
            Self::Bits32 | Self::Bits64 => 32,
        }
    }

    /// Returns the default address width in bits for this mode.
    pub fn default_address_size(&self) -> u16 {
        match self {
            Self::Bits16 => 16,
            Self::Bits32 => 32,
            Self::Bits64 => 64,
        }
    }

    /// Returns true for 64-bit long mode.
    pub fn is_64bit(&self) -> bool {
        matches!(self, Self::Bits64)
    }

    /// Returns the flag bit recorded on every instruction decoded in this
    /// mode.
    pub fn flag(&self) -> InstructionFlags {
        match self {
            Self::Bits16 => InstructionFlags::MODE_16,
            Self::Bits32 => InstructionFlags::MODE_32,
            Self::Bits64 => InstructionFlags::MODE_64,
        }
    }
}

/// Per-instruction flag bits set by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstructionFlags(pub u32);

impl InstructionFlags {
    pub const NONE: Self = Self(0);

    /// Decoded in 16-bit mode.
    pub const MODE_16: Self = Self(0x0001);
    /// Decoded in 32-bit mode.
    pub const MODE_32: Self = Self(0x0002);
    /// Decoded in 64-bit mode.
    pub const MODE_64: Self = Self(0x0004);

    /// LOCK prefix (0xF0) present.
    pub const PREFIX_LOCK: Self = Self(0x0008);
    /// REP/REPE prefix (0xF3) present.
    pub const PREFIX_REP: Self = Self(0x0010);
    /// REPNE prefix (0xF2) present.
    pub const PREFIX_REPNE: Self = Self(0x0020);
    /// Operand-size override (0x66) present.
    pub const PREFIX_OPERAND_SIZE: Self = Self(0x0040);
    /// Address-size override (0x67) present.
    pub const PREFIX_ADDRESS_SIZE: Self = Self(0x0080);
    /// Segment-override prefix present.
    pub const PREFIX_SEGMENT: Self = Self(0x0100);
    /// REX prefix consumed (64-bit mode only).
    pub const PREFIX_REX: Self = Self(0x0200);

    /// The instruction has a relative operand (branch target or
    /// rip-relative memory reference).
    pub const RELATIVE: Self = Self(0x0400);

    /// Returns true if every bit of `other` is set in `self`.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for InstructionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for InstructionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_defaults() {
        assert_eq!(DisassemblerMode::Bits16.default_operand_size(), 16);
        assert_eq!(DisassemblerMode::Bits32.default_operand_size(), 32);
        assert_eq!(DisassemblerMode::Bits64.default_operand_size(), 32);
        assert_eq!(DisassemblerMode::Bits64.default_address_size(), 64);
        assert!(DisassemblerMode::Bits64.is_64bit());
        assert!(!DisassemblerMode::Bits32.is_64bit());
    }

    #[test]
    fn flag_ops() {
        let mut flags = InstructionFlags::MODE_64;
        flags |= InstructionFlags::PREFIX_REX;
        assert!(flags.contains(InstructionFlags::MODE_64));
        assert!(flags.contains(InstructionFlags::PREFIX_REX));
        assert!(!flags.contains(InstructionFlags::PREFIX_LOCK));
        flags.insert(InstructionFlags::RELATIVE);
        assert!(flags.contains(InstructionFlags::MODE_64 | InstructionFlags::RELATIVE));
    }
}
