//! The byte-stream instruction decoder.

use super::modrm::{self, ModRM};
use super::opcodes::{
    GroupEntry, OpcodeEntry, OperandEncoding, GROUP1, GROUP11, GROUP2, GROUP3, GROUP4, GROUP5,
    GROUP8, OPCODE_TABLE, OPCODE_TABLE_0F,
};
use super::prefix::Prefixes;
use crate::error::DecodeError;
use crate::traits::{DecodedInstruction, Disassembler};
use oxdis_core::{
    register::ids, Condition, DisassemblerMode, Displacement, InstructionFlags, InstructionInfo,
    Literal, MemoryRef, Operand, Operation, Register, MAX_OPERANDS,
};

/// Longest legal instruction in bytes, prefixes included.
pub const MAX_INSTRUCTION_LENGTH: usize = 15;

/// x86/x86-64 instruction decoder for a fixed machine mode.
#[derive(Debug, Clone, Copy)]
pub struct X86Decoder {
    mode: DisassemblerMode,
}

impl X86Decoder {
    /// Creates a decoder for the given machine mode.
    pub fn new(mode: DisassemblerMode) -> Self {
        Self { mode }
    }

    /// Creates a 64-bit (long mode) decoder.
    pub fn long_mode() -> Self {
        Self::new(DisassemblerMode::Bits64)
    }

    /// Creates a 32-bit (protected mode) decoder.
    pub fn protected_mode() -> Self {
        Self::new(DisassemblerMode::Bits32)
    }

    /// Creates a 16-bit (real mode) decoder.
    pub fn real_mode() -> Self {
        Self::new(DisassemblerMode::Bits16)
    }
}

/// Read cursor over the instruction bytes.
pub(super) struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    address: u64,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8], address: u64) -> Self {
        Self {
            bytes,
            pos: 0,
            address,
        }
    }

    pub(super) fn address(&self) -> u64 {
        self.address
    }

    pub(super) fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub(super) fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    /// Bytes consumed so far.
    fn consumed(&self) -> &'a [u8] {
        &self.bytes[..self.pos]
    }

    pub(super) fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.bytes.len() {
            return Err(DecodeError::truncated(
                self.address,
                self.pos + n,
                self.bytes.len(),
            ));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(super) fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(super) fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(super) fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(super) fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a little-endian literal of the given width.
    pub(super) fn read_literal(&mut self, bits: u16) -> Result<Literal, DecodeError> {
        Ok(match bits {
            8 => Literal::Byte(self.read_u8()? as i8),
            16 => Literal::Word(self.read_u16()? as i16),
            64 => Literal::Qword(self.read_u64()? as i64),
            _ => Literal::Dword(self.read_u32()? as i32),
        })
    }
}

/// Decode output before the instruction record is assembled.
struct PartialDecode {
    mnemonic: String,
    operation: Operation,
    operands: Vec<Operand>,
    default_64: bool,
}

impl PartialDecode {
    fn new(mnemonic: impl Into<String>, operation: Operation, operands: Vec<Operand>) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            operation,
            operands,
            default_64: false,
        }
    }

    fn default_64(mut self) -> Self {
        self.default_64 = true;
        self
    }
}

fn accumulator(size: u16) -> Register {
    Register::gpr(ids::RAX, size)
}

/// Reads the r/m operand, advancing past SIB and displacement bytes.
pub(super) fn rm_operand(
    cur: &mut Cursor,
    modrm: ModRM,
    prefixes: &Prefixes,
    mode: DisassemblerMode,
    address_mode: u16,
    size: u16,
) -> Result<Operand, DecodeError> {
    match modrm::decode_modrm_rm(cur.remaining(), modrm, prefixes, mode, address_mode, size) {
        Some((op, consumed)) => {
            cur.advance(consumed);
            Ok(op)
        }
        None => Err(DecodeError::truncated(
            cur.address(),
            cur.pos() + 1,
            cur.pos() + cur.remaining().len(),
        )),
    }
}

fn group_entry(
    table: &[GroupEntry; 8],
    modrm: ModRM,
    cur: &Cursor,
) -> Result<(&'static str, Operation), DecodeError> {
    table[(modrm.reg & 0x7) as usize]
        .ok_or_else(|| DecodeError::invalid_encoding(cur.address(), "reserved group encoding"))
}

impl X86Decoder {
    fn effective_size(&self, prefixes: &Prefixes, entry: &OpcodeEntry) -> u16 {
        if entry.operand_bits != 0 {
            entry.operand_bits
        } else {
            prefixes.operand_mode(self.mode, entry.default_64)
        }
    }

    fn check_legacy_only(&self, cur: &Cursor, what: &str) -> Result<(), DecodeError> {
        if self.mode.is_64bit() {
            return Err(DecodeError::invalid_encoding(
                cur.address(),
                format!("{} is not valid in 64-bit mode", what),
            ));
        }
        Ok(())
    }

    /// Reads a 16 or 32-bit immediate by operand size. A 64-bit operand
    /// takes a sign-extended 32-bit immediate.
    fn read_imm_z(&self, cur: &mut Cursor, size: u16) -> Result<Operand, DecodeError> {
        let literal = if size == 16 {
            Literal::Word(cur.read_u16()? as i16)
        } else {
            Literal::Dword(cur.read_u32()? as i32)
        };
        Ok(Operand::imm(literal, size))
    }

    fn read_rel_z(&self, cur: &mut Cursor, size: u16) -> Result<Operand, DecodeError> {
        let literal = if size == 16 {
            Literal::Word(cur.read_u16()? as i16)
        } else {
            Literal::Dword(cur.read_u32()? as i32)
        };
        Ok(Operand::rel(literal))
    }

    fn read_rel_8(&self, cur: &mut Cursor) -> Result<Operand, DecodeError> {
        Ok(Operand::rel(Literal::Byte(cur.read_u8()? as i8)))
    }

    fn decode_one_byte(
        &self,
        cur: &mut Cursor,
        prefixes: &Prefixes,
        opcode: u8,
    ) -> Result<PartialDecode, DecodeError> {
        let asz = prefixes.address_mode(self.mode);

        match opcode {
            // Segment register push/pop.
            0x06 | 0x07 | 0x0E | 0x16 | 0x17 | 0x1E | 0x1F => {
                self.check_legacy_only(cur, "segment push/pop")?;
                let (seg, is_push) = match opcode {
                    0x06 => (ids::ES, true),
                    0x07 => (ids::ES, false),
                    0x0E => (ids::CS, true),
                    0x16 => (ids::SS, true),
                    0x17 => (ids::SS, false),
                    0x1E => (ids::DS, true),
                    _ => (ids::DS, false),
                };
                let operand = Operand::reg(Register::segment(seg));
                Ok(if is_push {
                    PartialDecode::new("push", Operation::Push, vec![operand])
                } else {
                    PartialDecode::new("pop", Operation::Pop, vec![operand])
                })
            }

            // EVEX escape in long mode; bound is in the table for legacy.
            0x62 if self.mode.is_64bit() => {
                Err(DecodeError::unsupported(cur.address(), "evex encoding"))
            }

            // arpl in legacy modes, movsxd in long mode.
            0x63 => {
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                if self.mode.is_64bit() {
                    let osz = prefixes.operand_mode(self.mode, false);
                    let reg = modrm::decode_gpr(modrm.reg, osz, prefixes.rex.is_some());
                    let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, 32)?;
                    Ok(PartialDecode::new(
                        "movsxd",
                        Operation::Move,
                        vec![Operand::reg(reg), rm],
                    ))
                } else {
                    let reg = modrm::decode_gpr(modrm.reg, 16, false);
                    let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, 16)?;
                    Ok(PartialDecode::new(
                        "arpl",
                        Operation::Other(0x63),
                        vec![rm, Operand::reg(reg)],
                    ))
                }
            }

            0x6C..=0x6F | 0xA4..=0xA7 | 0xAA..=0xAF => Ok(self.string_op(prefixes, opcode)),

            // Short conditional jumps.
            0x70..=0x7F => {
                let cond = Condition::from_encoding(opcode & 0x0F);
                let rel = self.read_rel_8(cur)?;
                Ok(
                    PartialDecode::new(
                        format!("j{}", cond.suffix()),
                        Operation::ConditionalJump,
                        vec![rel],
                    )
                    .default_64(),
                )
            }

            // Immediate group 1.
            0x80..=0x83 => {
                if opcode == 0x82 {
                    self.check_legacy_only(cur, "opcode 0x82")?;
                }
                let osz = if opcode == 0x81 || opcode == 0x83 {
                    prefixes.operand_mode(self.mode, false)
                } else {
                    8
                };
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let (mnemonic, operation) = group_entry(&GROUP1, modrm, cur)?;
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, osz)?;
                let imm = if opcode == 0x81 {
                    self.read_imm_z(cur, osz)?
                } else {
                    Operand::imm(Literal::Byte(cur.read_u8()? as i8), osz)
                };
                Ok(PartialDecode::new(mnemonic, operation, vec![rm, imm]))
            }

            // Segment register moves.
            0x8C | 0x8E => {
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let seg_num = modrm.reg & 0x7;
                if seg_num > 5 {
                    return Err(DecodeError::invalid_encoding(
                        cur.address(),
                        "invalid segment register encoding",
                    ));
                }
                let seg = Operand::reg(Register::segment(ids::ES + seg_num as u16));
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, 16)?;
                let operands = if opcode == 0x8C {
                    vec![rm, seg]
                } else {
                    vec![seg, rm]
                };
                Ok(PartialDecode::new("mov", Operation::Move, operands))
            }

            // nop, pause, or xchg with an extended register.
            0x90 => {
                if prefixes.rep {
                    Ok(PartialDecode::new("pause", Operation::Nop, vec![]))
                } else if prefixes.rex_b_bit() != 0 {
                    let osz = prefixes.operand_mode(self.mode, false);
                    Ok(PartialDecode::new(
                        "xchg",
                        Operation::Exchange,
                        vec![
                            Operand::reg(accumulator(osz)),
                            Operand::reg(Register::gpr(ids::R8, osz)),
                        ],
                    ))
                } else {
                    Ok(PartialDecode::new("nop", Operation::Nop, vec![]))
                }
            }

            // Sign extensions named by operand size.
            0x98 => {
                let mnemonic = match prefixes.operand_mode(self.mode, false) {
                    16 => "cbw",
                    64 => "cdqe",
                    _ => "cwde",
                };
                Ok(PartialDecode::new(mnemonic, Operation::Convert, vec![]))
            }
            0x99 => {
                let mnemonic = match prefixes.operand_mode(self.mode, false) {
                    16 => "cwd",
                    64 => "cqo",
                    _ => "cdq",
                };
                Ok(PartialDecode::new(mnemonic, Operation::Convert, vec![]))
            }

            // Shift group 2.
            0xC0 | 0xC1 | 0xD0..=0xD3 => {
                let osz = if opcode & 1 == 0 {
                    8
                } else {
                    prefixes.operand_mode(self.mode, false)
                };
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let (mnemonic, operation) = group_entry(&GROUP2, modrm, cur)?;
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, osz)?;
                let count = match opcode {
                    0xC0 | 0xC1 => Operand::imm(Literal::Byte(cur.read_u8()? as i8), 8),
                    0xD0 | 0xD1 => Operand::imm(Literal::Byte(1), 8),
                    _ => Operand::reg(Register::gpr(ids::RCX, 8)),
                };
                Ok(PartialDecode::new(mnemonic, operation, vec![rm, count]))
            }

            // les/lds in legacy modes; VEX escapes in long mode.
            0xC4 | 0xC5 => {
                if self.mode.is_64bit() {
                    return Err(DecodeError::unsupported(cur.address(), "vex encoding"));
                }
                let osz = prefixes.operand_mode(self.mode, false);
                let modrm = ModRM::parse(cur.read_u8()?, None);
                if modrm.is_register() {
                    return Err(DecodeError::invalid_encoding(
                        cur.address(),
                        "load-far-pointer requires a memory operand",
                    ));
                }
                let reg = modrm::decode_gpr(modrm.reg, osz, false);
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, osz)?;
                let mnemonic = if opcode == 0xC4 { "les" } else { "lds" };
                Ok(PartialDecode::new(
                    mnemonic,
                    Operation::Move,
                    vec![Operand::reg(reg), rm],
                ))
            }

            // Move group 11.
            0xC6 | 0xC7 => {
                let osz = if opcode == 0xC6 {
                    8
                } else {
                    prefixes.operand_mode(self.mode, false)
                };
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let (mnemonic, operation) = group_entry(&GROUP11, modrm, cur)?;
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, osz)?;
                let imm = if osz == 8 {
                    Operand::imm(Literal::Byte(cur.read_u8()? as i8), 8)
                } else {
                    self.read_imm_z(cur, osz)?
                };
                Ok(PartialDecode::new(mnemonic, operation, vec![rm, imm]))
            }

            // Interrupt return named by operand size.
            0xCF => {
                let mnemonic = match prefixes.operand_mode(self.mode, false) {
                    16 => "iret",
                    64 => "iretq",
                    _ => "iretd",
                };
                Ok(PartialDecode::new(mnemonic, Operation::Return, vec![]))
            }

            // x87 escape range.
            #[cfg(feature = "x87")]
            0xD8..=0xDF => {
                let (mnemonic, operands) =
                    super::x87::decode(cur, prefixes, self.mode, opcode, asz)?;
                Ok(PartialDecode::new(mnemonic, Operation::Fpu, operands))
            }
            #[cfg(not(feature = "x87"))]
            0xD8..=0xDF => Err(DecodeError::unsupported(cur.address(), "x87 escape range")),

            // Jump if rCX is zero, named by address size.
            0xE3 => {
                let mnemonic = match asz {
                    16 => "jcxz",
                    32 => "jecxz",
                    _ => "jrcxz",
                };
                let rel = self.read_rel_8(cur)?;
                Ok(
                    PartialDecode::new(mnemonic, Operation::ConditionalJump, vec![rel])
                        .default_64(),
                )
            }

            // Port I/O.
            0xE4..=0xE7 | 0xEC..=0xEF => {
                let osz = prefixes.operand_mode(self.mode, false);
                let acc_size = if opcode & 1 == 0 { 8 } else { osz.min(32) };
                let acc = Operand::reg(accumulator(acc_size));
                let port = if opcode < 0xE8 {
                    Operand::imm(Literal::Byte(cur.read_u8()? as i8), 8)
                } else {
                    Operand::reg(Register::gpr(ids::RDX, 16))
                };
                Ok(if opcode & 0x2 == 0 {
                    PartialDecode::new("in", Operation::Io, vec![acc, port])
                } else {
                    PartialDecode::new("out", Operation::Io, vec![port, acc])
                })
            }

            // Unary group 3.
            0xF6 | 0xF7 => {
                let osz = if opcode == 0xF6 {
                    8
                } else {
                    prefixes.operand_mode(self.mode, false)
                };
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let (mnemonic, operation) = group_entry(&GROUP3, modrm, cur)?;
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, osz)?;
                let mut operands = vec![rm];
                // Slots 0 and 1 are the test forms with an immediate.
                if modrm.reg & 0x7 <= 1 {
                    operands.push(if osz == 8 {
                        Operand::imm(Literal::Byte(cur.read_u8()? as i8), 8)
                    } else {
                        self.read_imm_z(cur, osz)?
                    });
                }
                Ok(PartialDecode::new(mnemonic, operation, operands))
            }

            // Group 4.
            0xFE => {
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let (mnemonic, operation) = group_entry(&GROUP4, modrm, cur)?;
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, 8)?;
                Ok(PartialDecode::new(mnemonic, operation, vec![rm]))
            }

            // Group 5.
            0xFF => {
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let slot = modrm.reg & 0x7;
                let (name, operation) = group_entry(&GROUP5, modrm, cur)?;
                let near_branch = matches!(slot, 2 | 4 | 6);
                let far_branch = matches!(slot, 3 | 5);
                let osz = prefixes.operand_mode(self.mode, near_branch);
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, osz)?;
                if far_branch && !rm.is_memory() {
                    return Err(DecodeError::invalid_encoding(
                        cur.address(),
                        "far branch requires a memory operand",
                    ));
                }
                let mnemonic = if far_branch {
                    format!("{} far", name)
                } else {
                    name.to_string()
                };
                let partial = PartialDecode::new(mnemonic, operation, vec![rm]);
                Ok(if near_branch {
                    partial.default_64()
                } else {
                    partial
                })
            }

            _ => match &OPCODE_TABLE[opcode as usize] {
                Some(entry) => self.apply_table_entry(cur, prefixes, opcode, entry),
                None => Err(DecodeError::unknown_opcode(
                    cur.address(),
                    cur.consumed(),
                    self.mode,
                )),
            },
        }
    }

    fn decode_two_byte(
        &self,
        cur: &mut Cursor,
        prefixes: &Prefixes,
    ) -> Result<PartialDecode, DecodeError> {
        let opcode = cur.read_u8()?;
        let asz = prefixes.address_mode(self.mode);

        match opcode {
            0x38 | 0x3A => Err(DecodeError::unsupported(
                cur.address(),
                "three-byte opcode escape",
            )),

            // Conditional moves.
            0x40..=0x4F => {
                let cond = Condition::from_encoding(opcode & 0x0F);
                let osz = prefixes.operand_mode(self.mode, false);
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let reg = modrm::decode_gpr(modrm.reg, osz, prefixes.rex.is_some());
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, osz)?;
                Ok(PartialDecode::new(
                    format!("cmov{}", cond.suffix()),
                    Operation::ConditionalMove,
                    vec![Operand::reg(reg), rm],
                ))
            }

            // Near conditional jumps.
            0x80..=0x8F => {
                let cond = Condition::from_encoding(opcode & 0x0F);
                let osz = prefixes.operand_mode(self.mode, true);
                let rel = self.read_rel_z(cur, if osz == 16 { 16 } else { 32 })?;
                Ok(
                    PartialDecode::new(
                        format!("j{}", cond.suffix()),
                        Operation::ConditionalJump,
                        vec![rel],
                    )
                    .default_64(),
                )
            }

            // Byte sets.
            0x90..=0x9F => {
                let cond = Condition::from_encoding(opcode & 0x0F);
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, 8)?;
                Ok(PartialDecode::new(
                    format!("set{}", cond.suffix()),
                    Operation::ConditionalSet,
                    vec![rm],
                ))
            }

            // fs/gs push and pop stay valid in long mode.
            0xA0 | 0xA1 | 0xA8 | 0xA9 => {
                let seg = if opcode & 0x08 == 0 { ids::FS } else { ids::GS };
                let operand = Operand::reg(Register::segment(seg));
                Ok(if opcode & 1 == 0 {
                    PartialDecode::new("push", Operation::Push, vec![operand]).default_64()
                } else {
                    PartialDecode::new("pop", Operation::Pop, vec![operand]).default_64()
                })
            }

            // Bit-test group 8.
            0xBA => {
                let osz = prefixes.operand_mode(self.mode, false);
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let (mnemonic, operation) = group_entry(&GROUP8, modrm, cur)?;
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, osz)?;
                let imm = Operand::imm(Literal::Byte(cur.read_u8()? as i8), 8);
                Ok(PartialDecode::new(mnemonic, operation, vec![rm, imm]))
            }

            _ => match &OPCODE_TABLE_0F[opcode as usize] {
                Some(entry) => self.apply_table_entry(cur, prefixes, opcode, entry),
                None => Err(DecodeError::unknown_opcode(
                    cur.address(),
                    cur.consumed(),
                    self.mode,
                )),
            },
        }
    }

    fn apply_table_entry(
        &self,
        cur: &mut Cursor,
        prefixes: &Prefixes,
        opcode: u8,
        entry: &OpcodeEntry,
    ) -> Result<PartialDecode, DecodeError> {
        if self.mode.is_64bit() && !entry.validity.allows_64bit() {
            return Err(DecodeError::invalid_encoding(
                cur.address(),
                format!("{} is not valid in 64-bit mode", entry.mnemonic),
            ));
        }
        if !self.mode.is_64bit() && !entry.validity.allows_legacy() {
            return Err(DecodeError::invalid_encoding(
                cur.address(),
                format!("{} is only valid in 64-bit mode", entry.mnemonic),
            ));
        }

        let osz = self.effective_size(prefixes, entry);
        let asz = prefixes.address_mode(self.mode);
        let rex_present = prefixes.rex.is_some();

        let operands = match entry.encoding {
            OperandEncoding::None => vec![],

            OperandEncoding::OpReg => {
                let num = (opcode & 0x7) | prefixes.rex_b_bit();
                vec![Operand::reg(modrm::decode_gpr(num, osz, rex_present))]
            }

            OperandEncoding::OpRegImm => {
                let num = (opcode & 0x7) | prefixes.rex_b_bit();
                let reg = Operand::reg(modrm::decode_gpr(num, osz, rex_present));
                // b8+r with REX.W takes a full 64-bit immediate.
                let imm = Operand::imm(cur.read_literal(osz)?, osz);
                vec![reg, imm]
            }

            OperandEncoding::AccReg => {
                let num = (opcode & 0x7) | prefixes.rex_b_bit();
                vec![
                    Operand::reg(accumulator(osz)),
                    Operand::reg(modrm::decode_gpr(num, osz, rex_present)),
                ]
            }

            OperandEncoding::RmReg | OperandEncoding::RegRm => {
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let reg = Operand::reg(modrm::decode_gpr(modrm.reg, osz, rex_present));
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, osz)?;
                if entry.operation == Operation::LoadEffectiveAddress && !rm.is_memory() {
                    return Err(DecodeError::invalid_encoding(
                        cur.address(),
                        "lea requires a memory operand",
                    ));
                }
                if entry.encoding == OperandEncoding::RmReg {
                    vec![rm, reg]
                } else {
                    vec![reg, rm]
                }
            }

            OperandEncoding::RmOnly => {
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                vec![rm_operand(cur, modrm, prefixes, self.mode, asz, osz)?]
            }

            OperandEncoding::AccImm => {
                let acc = Operand::reg(accumulator(osz));
                let imm = if osz == 8 {
                    Operand::imm(Literal::Byte(cur.read_u8()? as i8), 8)
                } else {
                    self.read_imm_z(cur, osz)?
                };
                vec![acc, imm]
            }

            OperandEncoding::RegRmImm | OperandEncoding::RegRmImm8 => {
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let reg = Operand::reg(modrm::decode_gpr(modrm.reg, osz, rex_present));
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, osz)?;
                let imm = if entry.encoding == OperandEncoding::RegRmImm8 {
                    Operand::imm(Literal::Byte(cur.read_u8()? as i8), osz)
                } else {
                    self.read_imm_z(cur, osz)?
                };
                vec![reg, rm, imm]
            }

            OperandEncoding::RegRm8 | OperandEncoding::RegRm16 => {
                let rm_size = if entry.encoding == OperandEncoding::RegRm8 {
                    8
                } else {
                    16
                };
                let modrm = ModRM::parse(cur.read_u8()?, prefixes.rex);
                let reg = Operand::reg(modrm::decode_gpr(modrm.reg, osz, rex_present));
                let rm = rm_operand(cur, modrm, prefixes, self.mode, asz, rm_size)?;
                vec![reg, rm]
            }

            OperandEncoding::Rel8 => vec![self.read_rel_8(cur)?],

            OperandEncoding::RelZ => {
                vec![self.read_rel_z(cur, if osz == 16 { 16 } else { 32 })?]
            }

            OperandEncoding::Imm8 => {
                vec![Operand::imm(Literal::Byte(cur.read_u8()? as i8), 8)]
            }

            OperandEncoding::Imm16 => {
                vec![Operand::imm(Literal::Word(cur.read_u16()? as i16), 16)]
            }

            OperandEncoding::ImmZ => vec![self.read_imm_z(cur, osz)?],

            OperandEncoding::Imm16Imm8 => vec![
                Operand::imm(Literal::Word(cur.read_u16()? as i16), 16),
                Operand::imm(Literal::Byte(cur.read_u8()? as i8), 8),
            ],

            OperandEncoding::AccOffs | OperandEncoding::OffsAcc => {
                let disp = Displacement {
                    size: asz,
                    value: cur.read_literal(asz)?,
                };
                let mem = Operand::Memory(
                    MemoryRef::absolute(disp, osz).with_segment(prefixes.segment),
                );
                let acc = Operand::reg(accumulator(osz));
                if entry.encoding == OperandEncoding::AccOffs {
                    vec![acc, mem]
                } else {
                    vec![mem, acc]
                }
            }

            OperandEncoding::FarPtr => {
                let offset = if osz == 16 {
                    cur.read_u16()? as u32
                } else {
                    cur.read_u32()?
                };
                let segment = cur.read_u16()?;
                vec![Operand::FarPointer { segment, offset }]
            }
        };

        let partial = PartialDecode::new(entry.mnemonic, entry.operation, operands);
        Ok(if entry.default_64 {
            partial.default_64()
        } else {
            partial
        })
    }

    /// String instructions carry their operand size as a mnemonic
    /// suffix; the ins/outs family has no 64-bit element form.
    fn string_op(&self, prefixes: &Prefixes, opcode: u8) -> PartialDecode {
        let osz = prefixes.operand_mode(self.mode, false);
        let (base, byte_form, operation, has_q) = match opcode {
            0x6C => ("ins", true, Operation::Io, false),
            0x6D => ("ins", false, Operation::Io, false),
            0x6E => ("outs", true, Operation::Io, false),
            0x6F => ("outs", false, Operation::Io, false),
            0xA4 => ("movs", true, Operation::StringOp, true),
            0xA5 => ("movs", false, Operation::StringOp, true),
            0xA6 => ("cmps", true, Operation::StringOp, true),
            0xA7 => ("cmps", false, Operation::StringOp, true),
            0xAA => ("stos", true, Operation::StringOp, true),
            0xAB => ("stos", false, Operation::StringOp, true),
            0xAC => ("lods", true, Operation::StringOp, true),
            0xAD => ("lods", false, Operation::StringOp, true),
            0xAE => ("scas", true, Operation::StringOp, true),
            _ => ("scas", false, Operation::StringOp, true),
        };
        let suffix = if byte_form {
            "b"
        } else {
            match osz {
                16 => "w",
                32 => "d",
                _ => {
                    if has_q {
                        "q"
                    } else {
                        "d"
                    }
                }
            }
        };
        PartialDecode::new(format!("{}{}", base, suffix), operation, vec![])
    }
}

impl Disassembler for X86Decoder {
    fn decode_instruction(
        &self,
        bytes: &[u8],
        address: u64,
    ) -> Result<DecodedInstruction, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::truncated(address, 1, 0));
        }

        let (prefixes, prefix_len) = Prefixes::parse(bytes, self.mode);
        if prefix_len >= MAX_INSTRUCTION_LENGTH {
            return Err(DecodeError::too_long(address, prefix_len + 1));
        }

        let mut cur = Cursor::new(bytes, address);
        cur.advance(prefix_len);
        let opcode = cur.read_u8()?;

        let partial = if opcode == 0x0F {
            self.decode_two_byte(&mut cur, &prefixes)?
        } else {
            self.decode_one_byte(&mut cur, &prefixes, opcode)?
        };

        let length = cur.pos();
        if length > MAX_INSTRUCTION_LENGTH {
            return Err(DecodeError::too_long(address, length));
        }
        if partial.operands.len() > MAX_OPERANDS {
            return Err(DecodeError::invalid_encoding(
                address,
                "too many operands for one instruction",
            ));
        }

        let mut info = InstructionInfo::new(self.mode, address, partial.operation, partial.mnemonic);
        info.flags |= prefixes.flags();
        info.operand_mode = prefixes.operand_mode(self.mode, partial.default_64);
        info.address_mode = prefixes.address_mode(self.mode);
        info.length = length;
        info.bytes = bytes[..length].to_vec();
        info.instr_pointer = address.wrapping_add(length as u64);
        info.segment = prefixes.segment;
        info.operands = partial.operands;
        if info.operands.iter().any(|op| op.is_relative()) {
            info.flags |= InstructionFlags::RELATIVE;
        }

        Ok(DecodedInstruction { info, size: length })
    }

    fn min_instruction_size(&self) -> usize {
        1
    }

    fn max_instruction_size(&self) -> usize {
        MAX_INSTRUCTION_LENGTH
    }

    fn is_fixed_width(&self) -> bool {
        false
    }

    fn mode(&self) -> DisassemblerMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode64(bytes: &[u8]) -> InstructionInfo {
        X86Decoder::long_mode()
            .decode_instruction(bytes, 0x1000)
            .expect("decode")
            .info
    }

    fn decode32(bytes: &[u8]) -> InstructionInfo {
        X86Decoder::protected_mode()
            .decode_instruction(bytes, 0x1000)
            .expect("decode")
            .info
    }

    fn decode16(bytes: &[u8]) -> InstructionInfo {
        X86Decoder::real_mode()
            .decode_instruction(bytes, 0x1000)
            .expect("decode")
            .info
    }

    #[test]
    fn mov_reg_reg() {
        let info = decode64(&[0x48, 0x89, 0xE5]);
        assert_eq!(info.mnemonic, "mov");
        assert_eq!(info.length, 3);
        assert_eq!(info.operand_mode, 64);
        assert_eq!(info.operands.len(), 2);
        assert_eq!(info.operands[0].to_string(), "rbp");
        assert_eq!(info.operands[1].to_string(), "rsp");
    }

    #[test]
    fn push_defaults_to_64bit() {
        let info = decode64(&[0x55]);
        assert_eq!(info.mnemonic, "push");
        assert_eq!(info.operand_mode, 64);
        assert_eq!(info.operands[0].to_string(), "rbp");
    }

    #[test]
    fn mov_imm32() {
        let info = decode64(&[0xB8, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(info.mnemonic, "mov");
        assert_eq!(info.operands[0].to_string(), "eax");
        assert_eq!(info.operands[1].to_string(), "0x12345678");
    }

    #[test]
    fn mov_imm64_with_rex_w() {
        let info = decode64(&[0x48, 0xB8, 0, 0, 0, 0, 0, 0, 0, 0x7F]);
        assert_eq!(info.length, 10);
        assert_eq!(info.operands[0].to_string(), "rax");
        match info.operands[1] {
            Operand::Immediate(imm) => {
                assert_eq!(imm.value, Literal::Qword(0x7F00_0000_0000_0000));
            }
            ref other => panic!("expected immediate, got {:?}", other),
        }
    }

    #[test]
    fn call_keeps_raw_delta() {
        let info = decode64(&[0xE8, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(info.mnemonic, "call");
        assert!(info.is_relative());
        assert_eq!(info.instr_pointer, 0x1005);
        match info.operands[0] {
            Operand::Relative(rel) => {
                assert_eq!(rel.size, 32);
                assert_eq!(rel.delta, Literal::Dword(0x100));
            }
            ref other => panic!("expected relative, got {:?}", other),
        }
    }

    #[test]
    fn short_conditional_jump() {
        let info = decode64(&[0x74, 0xFE]);
        assert_eq!(info.mnemonic, "je");
        assert_eq!(info.operation, Operation::ConditionalJump);
        match info.operands[0] {
            Operand::Relative(rel) => assert_eq!(rel.delta, Literal::Byte(-2)),
            ref other => panic!("expected relative, got {:?}", other),
        }
    }

    #[test]
    fn near_conditional_jump() {
        let info = decode64(&[0x0F, 0x85, 0x10, 0x00, 0x00, 0x00]);
        assert_eq!(info.mnemonic, "jne");
        assert_eq!(info.length, 6);
        assert_eq!(info.instr_pointer, 0x1006);
    }

    #[test]
    fn rip_relative_load() {
        let info = decode64(&[0x48, 0x8B, 0x05, 0x10, 0x00, 0x00, 0x00]);
        assert_eq!(info.mnemonic, "mov");
        assert!(info.is_relative());
        match info.operands[1] {
            Operand::Memory(mem) => {
                assert!(mem.is_rip_relative());
                assert_eq!(mem.displacement.unwrap().size, 32);
            }
            ref other => panic!("expected memory, got {:?}", other),
        }
    }

    #[test]
    fn pause_and_nop() {
        assert_eq!(decode64(&[0x90]).mnemonic, "nop");
        assert_eq!(decode64(&[0xF3, 0x90]).mnemonic, "pause");
        assert_eq!(decode64(&[0x66, 0x90]).mnemonic, "nop");
    }

    #[test]
    fn group3_neg() {
        let info = decode64(&[0xF7, 0xD8]);
        assert_eq!(info.mnemonic, "neg");
        assert_eq!(info.operands[0].to_string(), "eax");
    }

    #[test]
    fn group3_test_takes_immediate() {
        let info = decode64(&[0xF7, 0xC0, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(info.mnemonic, "test");
        assert_eq!(info.operands.len(), 2);
        assert_eq!(info.length, 6);
    }

    #[test]
    fn group5_indirect_jump() {
        let info = decode64(&[0xFF, 0x25, 0x00, 0x20, 0x00, 0x00]);
        assert_eq!(info.mnemonic, "jmp");
        assert!(info.is_relative());
        assert_eq!(info.operand_mode, 64);
    }

    #[test]
    fn inc_is_rex_in_long_mode_only() {
        let info = decode32(&[0x40]);
        assert_eq!(info.mnemonic, "inc");
        assert_eq!(info.operands[0].to_string(), "eax");

        // In long mode 0x40 is a prefix for the following opcode.
        let info = decode64(&[0x40, 0x90]);
        assert_eq!(info.mnemonic, "nop");
        assert_eq!(info.length, 2);
    }

    #[test]
    fn real_mode_addressing() {
        let info = decode16(&[0x8B, 0x47, 0x04]);
        assert_eq!(info.mnemonic, "mov");
        assert_eq!(info.operand_mode, 16);
        assert_eq!(info.operands[0].to_string(), "ax");
        assert_eq!(info.operands[1].to_string(), "[bx + 0x4]");
    }

    #[test]
    fn segment_push_rejected_in_long_mode() {
        assert_eq!(decode32(&[0x06]).mnemonic, "push");
        let err = X86Decoder::long_mode()
            .decode_instruction(&[0x06], 0)
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidEncoding { .. }));
    }

    #[test]
    fn movsxd_vs_arpl() {
        let info = decode64(&[0x48, 0x63, 0xC3]);
        assert_eq!(info.mnemonic, "movsxd");
        assert_eq!(info.operands[0].to_string(), "rax");
        assert_eq!(info.operands[1].to_string(), "ebx");

        let info = decode32(&[0x63, 0xC3]);
        assert_eq!(info.mnemonic, "arpl");
    }

    #[test]
    fn string_op_suffixes() {
        assert_eq!(decode64(&[0xA4]).mnemonic, "movsb");
        assert_eq!(decode64(&[0x48, 0xA5]).mnemonic, "movsq");
        assert_eq!(decode64(&[0xAB]).mnemonic, "stosd");
        assert_eq!(decode16(&[0xA5]).mnemonic, "movsw");
    }

    #[test]
    fn lock_prefix_flag() {
        let info = decode64(&[0xF0, 0x01, 0x03]);
        assert_eq!(info.mnemonic, "add");
        assert!(info.flags.contains(InstructionFlags::PREFIX_LOCK));
    }

    #[test]
    fn segment_override_reaches_operand() {
        let info = decode64(&[0x65, 0x48, 0x8B, 0x04, 0x25, 0x28, 0x00, 0x00, 0x00]);
        assert_eq!(info.mnemonic, "mov");
        assert_eq!(info.segment.unwrap().name(), "gs");
        match info.operands[1] {
            Operand::Memory(mem) => assert_eq!(mem.segment.unwrap().name(), "gs"),
            ref other => panic!("expected memory, got {:?}", other),
        }
    }

    #[test]
    fn moffs_form() {
        let info = decode64(&[0xA1, 0, 0x10, 0, 0, 0, 0, 0, 0]);
        assert_eq!(info.length, 9);
        assert_eq!(info.operands[0].to_string(), "eax");
        match info.operands[1] {
            Operand::Memory(mem) => {
                assert_eq!(mem.displacement.unwrap().size, 64);
                assert_eq!(mem.displacement.unwrap().value.as_u64(), 0x1000);
            }
            ref other => panic!("expected memory, got {:?}", other),
        }
    }

    #[test]
    fn far_pointer_legacy_only() {
        let info = decode32(&[0xEA, 0x78, 0x56, 0x34, 0x12, 0x08, 0x00]);
        assert_eq!(info.mnemonic, "jmp");
        assert_eq!(
            info.operands[0],
            Operand::FarPointer {
                segment: 0x08,
                offset: 0x12345678
            }
        );

        let err = X86Decoder::long_mode()
            .decode_instruction(&[0xEA, 0, 0, 0, 0, 0, 0], 0)
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidEncoding { .. }));
    }

    #[test]
    fn truncated_reports_counts() {
        let err = X86Decoder::long_mode()
            .decode_instruction(&[0xE8, 0x01], 0x2000)
            .unwrap_err();
        match err {
            DecodeError::Truncated {
                address, available, ..
            } => {
                assert_eq!(address, 0x2000);
                assert_eq!(available, 2);
            }
            other => panic!("expected truncated, got {:?}", other),
        }
    }

    #[test]
    fn unknown_opcode_names_the_mode() {
        // 0F 0A has never been assigned.
        let err = X86Decoder::long_mode()
            .decode_instruction(&[0x0F, 0x0A], 0)
            .unwrap_err();
        match err {
            DecodeError::UnknownOpcode { mode, .. } => {
                assert_eq!(mode, DisassemblerMode::Bits64);
            }
            other => panic!("expected unknown opcode, got {:?}", other),
        }
    }

    #[test]
    fn oversized_encoding_reports_length() {
        // Ten operand-size prefixes ahead of mov rax, imm64: 20 bytes.
        let mut bytes = vec![0x66; 10];
        bytes.extend_from_slice(&[0x48, 0xB8, 0, 0, 0, 0, 0, 0, 0, 0]);
        let err = X86Decoder::long_mode()
            .decode_instruction(&bytes, 0x1000)
            .unwrap_err();
        match err {
            DecodeError::TooLong { address, length } => {
                assert_eq!(address, 0x1000);
                assert_eq!(length, 20);
            }
            other => panic!("expected too-long, got {:?}", other),
        }

        // A pure prefix run past the limit fails the same way.
        let err = X86Decoder::long_mode()
            .decode_instruction(&[0x66; 16], 0x1000)
            .unwrap_err();
        assert!(matches!(err, DecodeError::TooLong { .. }));
    }

    #[test]
    fn operand_count_stays_within_record_capacity() {
        // imul r, r/m, imm32 is the widest operand form decoded.
        let info = decode64(&[0x69, 0xC3, 0x10, 0x00, 0x00, 0x00]);
        assert_eq!(info.mnemonic, "imul");
        assert_eq!(info.operands.len(), 3);
        assert!(info.operands.len() <= MAX_OPERANDS);
    }

    #[test]
    fn instr_pointer_wraps_at_top_of_address_space() {
        let decoded = X86Decoder::long_mode()
            .decode_instruction(&[0x90], u64::MAX)
            .expect("decode");
        assert_eq!(decoded.info.address, u64::MAX);
        assert_eq!(decoded.info.instr_pointer, 0);
    }

    #[test]
    fn block_addresses_wrap_at_top_of_address_space() {
        let decoder = X86Decoder::long_mode();
        let results = decoder.disassemble_block(&[0x90, 0x90, 0xC3], u64::MAX - 1);
        let addresses: Vec<u64> = results
            .iter()
            .map(|r| r.as_ref().expect("decode").address)
            .collect();
        assert_eq!(addresses, vec![u64::MAX - 1, u64::MAX, 0]);
    }

    #[test]
    fn setcc_and_cmovcc() {
        let info = decode64(&[0x0F, 0x94, 0xC0]);
        assert_eq!(info.mnemonic, "sete");
        assert_eq!(info.operands[0].to_string(), "al");

        let info = decode64(&[0x48, 0x0F, 0x44, 0xC8]);
        assert_eq!(info.mnemonic, "cmove");
        assert_eq!(info.operands[0].to_string(), "rcx");
        assert_eq!(info.operands[1].to_string(), "rax");
    }

    #[test]
    fn movzx_mixed_widths() {
        let info = decode64(&[0x0F, 0xB6, 0xC3]);
        assert_eq!(info.mnemonic, "movzx");
        assert_eq!(info.operands[0].to_string(), "eax");
        assert_eq!(info.operands[1].to_string(), "bl");
    }

    #[test]
    fn block_skips_bad_bytes() {
        let decoder = X86Decoder::long_mode();
        // nop, unknown escape byte, ret
        let results = decoder.disassemble_block(&[0x90, 0x0F, 0x0A, 0xC3], 0x1000);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn shift_forms() {
        let info = decode64(&[0xD1, 0xE0]);
        assert_eq!(info.mnemonic, "shl");
        assert_eq!(info.operands[1].to_string(), "0x1");

        let info = decode64(&[0xD3, 0xE8]);
        assert_eq!(info.mnemonic, "shr");
        assert_eq!(info.operands[1].to_string(), "cl");

        let info = decode64(&[0xC1, 0xF8, 0x04]);
        assert_eq!(info.mnemonic, "sar");
        assert_eq!(info.operands[1].to_string(), "0x4");
    }
}
