//! x86 prefix parsing.

use oxdis_core::{register::ids, DisassemblerMode, InstructionFlags, Register};

/// Legacy and REX prefixes that can appear before an instruction.
#[derive(Debug, Clone, Default)]
pub struct Prefixes {
    /// LOCK prefix (0xF0)
    pub lock: bool,
    /// REPNE/REPNZ prefix (0xF2)
    pub repne: bool,
    /// REP/REPE/REPZ prefix (0xF3)
    pub rep: bool,
    /// Segment override
    pub segment: Option<Register>,
    /// Operand size override (0x66)
    pub operand_size: bool,
    /// Address size override (0x67)
    pub address_size: bool,
    /// REX prefix (only recognized in 64-bit mode)
    pub rex: Option<Rex>,
}

/// REX prefix fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rex {
    /// REX.W - 64-bit operand size
    pub w: bool,
    /// REX.R - extends ModR/M reg field
    pub r: bool,
    /// REX.X - extends SIB index field
    pub x: bool,
    /// REX.B - extends ModR/M r/m, SIB base, or opcode reg
    pub b: bool,
}

impl Rex {
    /// Parse a REX byte.
    pub fn from_byte(byte: u8) -> Self {
        Self {
            w: byte & 0x08 != 0,
            r: byte & 0x04 != 0,
            x: byte & 0x02 != 0,
            b: byte & 0x01 != 0,
        }
    }
}

impl Prefixes {
    /// Parse prefixes from the start of an instruction.
    /// Returns the prefixes and the number of bytes consumed.
    ///
    /// 0x40-0x4F bytes are REX prefixes only in 64-bit mode; in legacy
    /// modes they are inc/dec opcodes and terminate the scan.
    pub fn parse(bytes: &[u8], mode: DisassemblerMode) -> (Self, usize) {
        let mut prefixes = Self::default();
        let mut offset = 0;

        while offset < bytes.len() {
            let byte = bytes[offset];

            match byte {
                // Group 1: LOCK and repeat
                0xF0 => prefixes.lock = true,
                0xF2 => prefixes.repne = true,
                0xF3 => prefixes.rep = true,

                // Group 2: Segment overrides
                0x26 => prefixes.segment = Some(Register::segment(ids::ES)),
                0x2E => prefixes.segment = Some(Register::segment(ids::CS)),
                0x36 => prefixes.segment = Some(Register::segment(ids::SS)),
                0x3E => prefixes.segment = Some(Register::segment(ids::DS)),
                0x64 => prefixes.segment = Some(Register::segment(ids::FS)),
                0x65 => prefixes.segment = Some(Register::segment(ids::GS)),

                // Group 3: Operand size override
                0x66 => prefixes.operand_size = true,

                // Group 4: Address size override
                0x67 => prefixes.address_size = true,

                // REX prefix; must be the last prefix before the opcode
                0x40..=0x4F if mode.is_64bit() => {
                    prefixes.rex = Some(Rex::from_byte(byte));
                    offset += 1;
                    break;
                }

                // Not a prefix
                _ => break,
            }

            offset += 1;
        }

        (prefixes, offset)
    }

    /// Returns the effective operand width in bits.
    ///
    /// `default_64` marks instructions that default to a 64-bit operand
    /// in long mode (push/pop, near branches).
    pub fn operand_mode(&self, mode: DisassemblerMode, default_64: bool) -> u16 {
        match mode {
            DisassemblerMode::Bits16 => {
                if self.operand_size {
                    32
                } else {
                    16
                }
            }
            DisassemblerMode::Bits32 => {
                if self.operand_size {
                    16
                } else {
                    32
                }
            }
            DisassemblerMode::Bits64 => {
                if self.rex.map(|r| r.w).unwrap_or(false) {
                    64
                } else if self.operand_size {
                    16
                } else if default_64 {
                    64
                } else {
                    32
                }
            }
        }
    }

    /// Returns the effective address width in bits.
    pub fn address_mode(&self, mode: DisassemblerMode) -> u16 {
        match mode {
            DisassemblerMode::Bits16 => {
                if self.address_size {
                    32
                } else {
                    16
                }
            }
            DisassemblerMode::Bits32 => {
                if self.address_size {
                    16
                } else {
                    32
                }
            }
            DisassemblerMode::Bits64 => {
                if self.address_size {
                    32
                } else {
                    64
                }
            }
        }
    }

    /// Returns true if REX.W is set.
    pub fn rex_w(&self) -> bool {
        self.rex.map(|r| r.w).unwrap_or(false)
    }

    /// Returns the REX.B extension bit as the high register-number bit.
    pub fn rex_b_bit(&self) -> u8 {
        self.rex.map(|r| (r.b as u8) << 3).unwrap_or(0)
    }

    /// Returns the flag bits this prefix set contributes to the decoded
    /// record.
    pub fn flags(&self) -> InstructionFlags {
        let mut flags = InstructionFlags::NONE;
        if self.lock {
            flags |= InstructionFlags::PREFIX_LOCK;
        }
        if self.rep {
            flags |= InstructionFlags::PREFIX_REP;
        }
        if self.repne {
            flags |= InstructionFlags::PREFIX_REPNE;
        }
        if self.operand_size {
            flags |= InstructionFlags::PREFIX_OPERAND_SIZE;
        }
        if self.address_size {
            flags |= InstructionFlags::PREFIX_ADDRESS_SIZE;
        }
        if self.segment.is_some() {
            flags |= InstructionFlags::PREFIX_SEGMENT;
        }
        if self.rex.is_some() {
            flags |= InstructionFlags::PREFIX_REX;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rex_only_in_long_mode() {
        let (prefixes, len) = Prefixes::parse(&[0x48, 0x89], DisassemblerMode::Bits64);
        assert!(prefixes.rex_w());
        assert_eq!(len, 1);

        // 0x48 is "dec eax" in 32-bit mode, not a prefix.
        let (prefixes, len) = Prefixes::parse(&[0x48, 0x89], DisassemblerMode::Bits32);
        assert!(prefixes.rex.is_none());
        assert_eq!(len, 0);
    }

    #[test]
    fn operand_mode_toggles() {
        let (plain, _) = Prefixes::parse(&[0x90], DisassemblerMode::Bits16);
        assert_eq!(plain.operand_mode(DisassemblerMode::Bits16, false), 16);

        let (with_66, _) = Prefixes::parse(&[0x66, 0x90], DisassemblerMode::Bits16);
        assert_eq!(with_66.operand_mode(DisassemblerMode::Bits16, false), 32);
        assert_eq!(with_66.operand_mode(DisassemblerMode::Bits32, false), 16);

        let (rex_w, _) = Prefixes::parse(&[0x48], DisassemblerMode::Bits64);
        assert_eq!(rex_w.operand_mode(DisassemblerMode::Bits64, false), 64);

        // default-64 instructions ignore the 32-bit default in long mode
        assert_eq!(plain.operand_mode(DisassemblerMode::Bits64, true), 64);
    }

    #[test]
    fn address_mode_toggles() {
        let (with_67, _) = Prefixes::parse(&[0x67, 0x90], DisassemblerMode::Bits64);
        assert_eq!(with_67.address_mode(DisassemblerMode::Bits64), 32);
        assert_eq!(with_67.address_mode(DisassemblerMode::Bits16), 32);
        assert_eq!(with_67.address_mode(DisassemblerMode::Bits32), 16);

        let (plain, _) = Prefixes::parse(&[0x90], DisassemblerMode::Bits64);
        assert_eq!(plain.address_mode(DisassemblerMode::Bits64), 64);
    }

    #[test]
    fn segment_override() {
        let (prefixes, len) = Prefixes::parse(&[0x65, 0x48, 0x8b], DisassemblerMode::Bits64);
        assert_eq!(len, 2);
        assert_eq!(prefixes.segment.unwrap().name(), "gs");
        assert!(prefixes.rex.is_some());
    }
}
