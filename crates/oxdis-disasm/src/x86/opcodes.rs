//! Opcode tables.
//!
//! Each table entry records the mnemonic, the operation category, and
//! the operand encoding; the decoder interprets the encoding against
//! the prefix state. Opcodes whose behavior depends on more than the
//! table can express (condition-code ranges, groups with sub-opcodes in
//! the ModR/M reg field, string operations) are dispatched directly in
//! the decoder and left as `None` here.

use oxdis_core::Operation;

/// How an opcode encodes its explicit operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandEncoding {
    /// No explicit operands.
    None,
    /// Register in the low three opcode bits (extended by REX.B).
    OpReg,
    /// Register in the low three opcode bits, immediate follows.
    OpRegImm,
    /// Accumulator, then register in the low three opcode bits.
    AccReg,
    /// ModR/M with r/m as destination, reg as source.
    RmReg,
    /// ModR/M with reg as destination, r/m as source.
    RegRm,
    /// ModR/M with a single r/m operand.
    RmOnly,
    /// Accumulator, then an immediate.
    AccImm,
    /// reg, r/m, operand-sized immediate.
    RegRmImm,
    /// reg, r/m, imm8.
    RegRmImm8,
    /// Operand-sized reg, 8-bit r/m.
    RegRm8,
    /// Operand-sized reg, 16-bit r/m.
    RegRm16,
    /// 8-bit relative branch delta.
    Rel8,
    /// 16 or 32-bit relative branch delta, by operand size.
    RelZ,
    /// 8-bit immediate only.
    Imm8,
    /// 16-bit immediate only.
    Imm16,
    /// 16 or 32-bit immediate, by operand size.
    ImmZ,
    /// 16-bit then 8-bit immediate (enter).
    Imm16Imm8,
    /// Accumulator loaded from a direct memory offset.
    AccOffs,
    /// Direct memory offset stored from the accumulator.
    OffsAcc,
    /// Far pointer, ptr16:16 or ptr16:32.
    FarPtr,
}

/// Which modes an opcode is valid in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeValidity {
    All,
    LegacyOnly,
    LongOnly,
}

impl ModeValidity {
    pub fn allows_64bit(&self) -> bool {
        !matches!(self, Self::LegacyOnly)
    }

    pub fn allows_legacy(&self) -> bool {
        !matches!(self, Self::LongOnly)
    }
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeEntry {
    pub mnemonic: &'static str,
    pub operation: Operation,
    pub encoding: OperandEncoding,
    /// Fixed operand width in bits, or 0 to use the effective operand
    /// size.
    pub operand_bits: u16,
    /// Defaults to a 64-bit operand in long mode (push/pop, branches).
    pub default_64: bool,
    pub validity: ModeValidity,
}

const fn entry(
    mnemonic: &'static str,
    operation: Operation,
    encoding: OperandEncoding,
) -> Option<OpcodeEntry> {
    Some(OpcodeEntry {
        mnemonic,
        operation,
        encoding,
        operand_bits: 0,
        default_64: false,
        validity: ModeValidity::All,
    })
}

const fn entry8(
    mnemonic: &'static str,
    operation: Operation,
    encoding: OperandEncoding,
) -> Option<OpcodeEntry> {
    Some(OpcodeEntry {
        mnemonic,
        operation,
        encoding,
        operand_bits: 8,
        default_64: false,
        validity: ModeValidity::All,
    })
}

const fn entry_d64(
    mnemonic: &'static str,
    operation: Operation,
    encoding: OperandEncoding,
) -> Option<OpcodeEntry> {
    Some(OpcodeEntry {
        mnemonic,
        operation,
        encoding,
        operand_bits: 0,
        default_64: true,
        validity: ModeValidity::All,
    })
}

const fn legacy(
    mnemonic: &'static str,
    operation: Operation,
    encoding: OperandEncoding,
) -> Option<OpcodeEntry> {
    Some(OpcodeEntry {
        mnemonic,
        operation,
        encoding,
        operand_bits: 0,
        default_64: false,
        validity: ModeValidity::LegacyOnly,
    })
}

const fn legacy8(
    mnemonic: &'static str,
    operation: Operation,
    encoding: OperandEncoding,
) -> Option<OpcodeEntry> {
    Some(OpcodeEntry {
        mnemonic,
        operation,
        encoding,
        operand_bits: 8,
        default_64: false,
        validity: ModeValidity::LegacyOnly,
    })
}

const fn long_only(
    mnemonic: &'static str,
    operation: Operation,
    encoding: OperandEncoding,
) -> Option<OpcodeEntry> {
    Some(OpcodeEntry {
        mnemonic,
        operation,
        encoding,
        operand_bits: 0,
        default_64: false,
        validity: ModeValidity::LongOnly,
    })
}

/// One-byte opcode table.
pub static OPCODE_TABLE: [Option<OpcodeEntry>; 256] = build_one_byte_table();

const fn build_one_byte_table() -> [Option<OpcodeEntry>; 256] {
    use OperandEncoding as E;

    let mut t: [Option<OpcodeEntry>; 256] = [None; 256];

    // The eight classic ALU rows share one layout: rm8,r8 / rm,r /
    // r8,rm8 / r,rm / al,imm8 / eAX,immZ at base+0 through base+5.
    let alu: [(usize, &'static str, Operation); 8] = [
        (0x00, "add", Operation::Add),
        (0x08, "or", Operation::Or),
        (0x10, "adc", Operation::AddWithCarry),
        (0x18, "sbb", Operation::SubWithBorrow),
        (0x20, "and", Operation::And),
        (0x28, "sub", Operation::Sub),
        (0x30, "xor", Operation::Xor),
        (0x38, "cmp", Operation::Compare),
    ];
    let mut i = 0;
    while i < alu.len() {
        let base = alu[i].0;
        let mnemonic = alu[i].1;
        let operation = alu[i].2;
        t[base] = entry8(mnemonic, operation, E::RmReg);
        t[base + 1] = entry(mnemonic, operation, E::RmReg);
        t[base + 2] = entry8(mnemonic, operation, E::RegRm);
        t[base + 3] = entry(mnemonic, operation, E::RegRm);
        t[base + 4] = entry8(mnemonic, operation, E::AccImm);
        t[base + 5] = entry(mnemonic, operation, E::AccImm);
        i += 1;
    }

    t[0x27] = legacy("daa", Operation::Other(0x27), E::None);
    t[0x2F] = legacy("das", Operation::Other(0x2F), E::None);
    t[0x37] = legacy("aaa", Operation::Other(0x37), E::None);
    t[0x3F] = legacy("aas", Operation::Other(0x3F), E::None);

    // 0x40-0x4F reach the table only in legacy modes; in 64-bit mode
    // the prefix scanner consumes them as REX.
    let mut r = 0;
    while r < 8 {
        t[0x40 + r] = legacy("inc", Operation::Inc, E::OpReg);
        t[0x48 + r] = legacy("dec", Operation::Dec, E::OpReg);
        t[0x50 + r] = entry_d64("push", Operation::Push, E::OpReg);
        t[0x58 + r] = entry_d64("pop", Operation::Pop, E::OpReg);
        r += 1;
    }

    t[0x60] = legacy("pusha", Operation::Push, E::None);
    t[0x61] = legacy("popa", Operation::Pop, E::None);
    t[0x62] = legacy("bound", Operation::Other(0x62), E::RegRm);
    // 0x63 is arpl in legacy modes and movsxd in long mode; decoder.

    t[0x68] = entry_d64("push", Operation::Push, E::ImmZ);
    t[0x69] = entry("imul", Operation::Mul, E::RegRmImm);
    t[0x6A] = entry_d64("push", Operation::Push, E::Imm8);
    t[0x6B] = entry("imul", Operation::Mul, E::RegRmImm8);
    // 0x6C-0x6F ins/outs string forms; decoder.
    // 0x70-0x7F short conditional jumps; decoder.
    // 0x80-0x83 immediate group 1; decoder.

    t[0x84] = entry8("test", Operation::Test, E::RmReg);
    t[0x85] = entry("test", Operation::Test, E::RmReg);
    t[0x86] = entry8("xchg", Operation::Exchange, E::RmReg);
    t[0x87] = entry("xchg", Operation::Exchange, E::RmReg);
    t[0x88] = entry8("mov", Operation::Move, E::RmReg);
    t[0x89] = entry("mov", Operation::Move, E::RmReg);
    t[0x8A] = entry8("mov", Operation::Move, E::RegRm);
    t[0x8B] = entry("mov", Operation::Move, E::RegRm);
    // 0x8C/0x8E segment-register moves; decoder.
    t[0x8D] = entry("lea", Operation::LoadEffectiveAddress, E::RegRm);
    t[0x8F] = entry_d64("pop", Operation::Pop, E::RmOnly);

    // 0x90 nop/pause; 0x91-0x97 xchg with the accumulator.
    let mut x = 1;
    while x < 8 {
        t[0x90 + x] = entry("xchg", Operation::Exchange, E::AccReg);
        x += 1;
    }
    // 0x98/0x99 sign extensions named by operand size; decoder.
    t[0x9A] = legacy("call", Operation::Call, E::FarPtr);
    t[0x9B] = entry("fwait", Operation::Fpu, E::None);
    t[0x9C] = entry_d64("pushf", Operation::Push, E::None);
    t[0x9D] = entry_d64("popf", Operation::Pop, E::None);
    t[0x9E] = entry("sahf", Operation::Other(0x9E), E::None);
    t[0x9F] = entry("lahf", Operation::Other(0x9F), E::None);

    t[0xA0] = entry8("mov", Operation::Move, E::AccOffs);
    t[0xA1] = entry("mov", Operation::Move, E::AccOffs);
    t[0xA2] = entry8("mov", Operation::Move, E::OffsAcc);
    t[0xA3] = entry("mov", Operation::Move, E::OffsAcc);
    // 0xA4-0xA7 movs/cmps; decoder.
    t[0xA8] = entry8("test", Operation::Test, E::AccImm);
    t[0xA9] = entry("test", Operation::Test, E::AccImm);
    // 0xAA-0xAF stos/lods/scas; decoder.

    let mut b = 0;
    while b < 8 {
        t[0xB0 + b] = entry8("mov", Operation::Move, E::OpRegImm);
        t[0xB8 + b] = entry("mov", Operation::Move, E::OpRegImm);
        b += 1;
    }

    // 0xC0/0xC1 shift group 2 with imm8; decoder.
    t[0xC2] = entry_d64("ret", Operation::Return, E::Imm16);
    t[0xC3] = entry_d64("ret", Operation::Return, E::None);
    // 0xC4/0xC5 les/lds in legacy modes, VEX escapes in long mode; decoder.
    // 0xC6/0xC7 move group 11; decoder.
    t[0xC8] = entry("enter", Operation::Other(0xC8), E::Imm16Imm8);
    t[0xC9] = entry_d64("leave", Operation::Other(0xC9), E::None);
    t[0xCA] = entry("retf", Operation::Return, E::Imm16);
    t[0xCB] = entry("retf", Operation::Return, E::None);
    t[0xCC] = entry("int3", Operation::Interrupt, E::None);
    t[0xCD] = entry8("int", Operation::Interrupt, E::Imm8);
    t[0xCE] = legacy("into", Operation::Interrupt, E::None);
    // 0xCF iret named by operand size; decoder.
    // 0xD0-0xD3 shift group 2; decoder.
    t[0xD4] = legacy8("aam", Operation::Other(0xD4), E::Imm8);
    t[0xD5] = legacy8("aad", Operation::Other(0xD5), E::Imm8);
    t[0xD7] = entry8("xlatb", Operation::Other(0xD7), E::None);
    // 0xD8-0xDF x87 escape range; decoder.

    t[0xE0] = entry8("loopne", Operation::ConditionalJump, E::Rel8);
    t[0xE1] = entry8("loope", Operation::ConditionalJump, E::Rel8);
    t[0xE2] = entry8("loop", Operation::ConditionalJump, E::Rel8);
    // 0xE3 jcxz/jecxz/jrcxz named by address size; decoder.
    // 0xE4-0xE7, 0xEC-0xEF port I/O; decoder.
    t[0xE8] = entry_d64("call", Operation::Call, E::RelZ);
    t[0xE9] = entry_d64("jmp", Operation::Jump, E::RelZ);
    t[0xEA] = legacy("jmp", Operation::Jump, E::FarPtr);
    t[0xEB] = entry_d64("jmp", Operation::Jump, E::Rel8);

    t[0xF1] = entry("int1", Operation::Interrupt, E::None);
    t[0xF4] = entry("hlt", Operation::Halt, E::None);
    t[0xF5] = entry("cmc", Operation::Other(0xF5), E::None);
    // 0xF6/0xF7 unary group 3; decoder.
    t[0xF8] = entry("clc", Operation::Other(0xF8), E::None);
    t[0xF9] = entry("stc", Operation::Other(0xF9), E::None);
    t[0xFA] = entry("cli", Operation::Other(0xFA), E::None);
    t[0xFB] = entry("sti", Operation::Other(0xFB), E::None);
    t[0xFC] = entry("cld", Operation::Other(0xFC), E::None);
    t[0xFD] = entry("std", Operation::Other(0xFD), E::None);
    // 0xFE group 4, 0xFF group 5; decoder.

    t
}

/// Two-byte (0F-escaped) opcode table.
///
/// The condition-code ranges 40-4F, 80-8F, and 90-9F are dispatched in
/// the decoder.
pub static OPCODE_TABLE_0F: [Option<OpcodeEntry>; 256] = build_two_byte_table();

const fn build_two_byte_table() -> [Option<OpcodeEntry>; 256] {
    use OperandEncoding as E;

    let mut t: [Option<OpcodeEntry>; 256] = [None; 256];

    t[0x05] = long_only("syscall", Operation::Syscall, E::None);
    t[0x07] = long_only("sysret", Operation::Syscall, E::None);
    t[0x0B] = entry("ud2", Operation::Other(0x0F0B), E::None);
    t[0x1F] = entry("nop", Operation::Nop, E::RmOnly);
    t[0x31] = entry("rdtsc", Operation::Other(0x0F31), E::None);
    t[0x34] = legacy("sysenter", Operation::Syscall, E::None);
    t[0x35] = legacy("sysexit", Operation::Syscall, E::None);

    t[0xA2] = entry("cpuid", Operation::Other(0x0FA2), E::None);
    t[0xA3] = entry("bt", Operation::BitTest, E::RmReg);
    t[0xAB] = entry("bts", Operation::BitTest, E::RmReg);
    t[0xAF] = entry("imul", Operation::Mul, E::RegRm);
    t[0xB0] = entry8("cmpxchg", Operation::Exchange, E::RmReg);
    t[0xB1] = entry("cmpxchg", Operation::Exchange, E::RmReg);
    t[0xB3] = entry("btr", Operation::BitTest, E::RmReg);
    t[0xB6] = entry("movzx", Operation::Move, E::RegRm8);
    t[0xB7] = entry("movzx", Operation::Move, E::RegRm16);
    // 0xBA bit-test group 8; decoder.
    t[0xBB] = entry("btc", Operation::BitTest, E::RmReg);
    t[0xBC] = entry("bsf", Operation::Other(0x0FBC), E::RegRm);
    t[0xBD] = entry("bsr", Operation::Other(0x0FBD), E::RegRm);
    t[0xBE] = entry("movsx", Operation::Move, E::RegRm8);
    t[0xBF] = entry("movsx", Operation::Move, E::RegRm16);
    t[0xC0] = entry8("xadd", Operation::Exchange, E::RmReg);
    t[0xC1] = entry("xadd", Operation::Exchange, E::RmReg);

    let mut r = 0;
    while r < 8 {
        t[0xC8 + r] = entry("bswap", Operation::Other(0x0FC8), E::OpReg);
        r += 1;
    }

    t
}

/// A group sub-entry selected by the ModR/M reg field.
pub type GroupEntry = Option<(&'static str, Operation)>;

/// Immediate group 1 (0x80-0x83).
pub static GROUP1: [GroupEntry; 8] = [
    Some(("add", Operation::Add)),
    Some(("or", Operation::Or)),
    Some(("adc", Operation::AddWithCarry)),
    Some(("sbb", Operation::SubWithBorrow)),
    Some(("and", Operation::And)),
    Some(("sub", Operation::Sub)),
    Some(("xor", Operation::Xor)),
    Some(("cmp", Operation::Compare)),
];

/// Shift group 2 (0xC0/0xC1, 0xD0-0xD3). Slot 6 is the undocumented
/// shl alias.
pub static GROUP2: [GroupEntry; 8] = [
    Some(("rol", Operation::Rol)),
    Some(("ror", Operation::Ror)),
    Some(("rcl", Operation::Rcl)),
    Some(("rcr", Operation::Rcr)),
    Some(("shl", Operation::Shl)),
    Some(("shr", Operation::Shr)),
    Some(("shl", Operation::Shl)),
    Some(("sar", Operation::Sar)),
];

/// Unary group 3 (0xF6/0xF7). Slots 0 and 1 take an immediate.
pub static GROUP3: [GroupEntry; 8] = [
    Some(("test", Operation::Test)),
    Some(("test", Operation::Test)),
    Some(("not", Operation::Not)),
    Some(("neg", Operation::Neg)),
    Some(("mul", Operation::Mul)),
    Some(("imul", Operation::Mul)),
    Some(("div", Operation::Div)),
    Some(("idiv", Operation::Div)),
];

/// Group 4 (0xFE).
pub static GROUP4: [GroupEntry; 8] = [
    Some(("inc", Operation::Inc)),
    Some(("dec", Operation::Dec)),
    None,
    None,
    None,
    None,
    None,
    None,
];

/// Group 5 (0xFF). Slots 3 and 5 are the far forms and require a
/// memory operand.
pub static GROUP5: [GroupEntry; 8] = [
    Some(("inc", Operation::Inc)),
    Some(("dec", Operation::Dec)),
    Some(("call", Operation::Call)),
    Some(("call", Operation::Call)),
    Some(("jmp", Operation::Jump)),
    Some(("jmp", Operation::Jump)),
    Some(("push", Operation::Push)),
    None,
];

/// Bit-test group 8 (0F 0xBA), imm8 forms only.
pub static GROUP8: [GroupEntry; 8] = [
    None,
    None,
    None,
    None,
    Some(("bt", Operation::BitTest)),
    Some(("bts", Operation::BitTest)),
    Some(("btr", Operation::BitTest)),
    Some(("btc", Operation::BitTest)),
];

/// Move group 11 (0xC6/0xC7), slot 0 only.
pub static GROUP11: [GroupEntry; 8] = [
    Some(("mov", Operation::Move)),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alu_rows_are_uniform() {
        for base in [0x00usize, 0x08, 0x10, 0x18, 0x20, 0x28, 0x30, 0x38] {
            for off in 0..6 {
                let e = OPCODE_TABLE[base + off].expect("alu slot populated");
                assert_eq!(e.mnemonic, OPCODE_TABLE[base].unwrap().mnemonic);
            }
            assert_eq!(OPCODE_TABLE[base].unwrap().operand_bits, 8);
            assert_eq!(OPCODE_TABLE[base + 1].unwrap().operand_bits, 0);
        }
    }

    #[test]
    fn decoder_dispatched_slots_stay_empty() {
        for byte in [0x63usize, 0x70, 0x7F, 0x80, 0x83, 0xC0, 0xD8, 0xDF, 0xF6, 0xFE, 0xFF] {
            assert!(OPCODE_TABLE[byte].is_none(), "{:#x}", byte);
        }
        for byte in [0x40usize, 0x4F, 0x80, 0x8F, 0x90, 0x9F, 0xBA] {
            assert!(OPCODE_TABLE_0F[byte].is_none(), "0f {:#x}", byte);
        }
    }

    #[test]
    fn stack_defaults_to_64bit_operand() {
        for byte in [0x50usize, 0x57, 0x58, 0x68, 0x6A, 0xC3, 0xE8, 0xE9, 0xEB] {
            assert!(OPCODE_TABLE[byte].unwrap().default_64, "{:#x}", byte);
        }
    }

    #[test]
    fn mode_validity() {
        assert!(!OPCODE_TABLE[0x37].unwrap().validity.allows_64bit());
        assert!(!OPCODE_TABLE_0F[0x05].unwrap().validity.allows_legacy());
        assert!(OPCODE_TABLE[0x50].unwrap().validity.allows_64bit());
    }
}
