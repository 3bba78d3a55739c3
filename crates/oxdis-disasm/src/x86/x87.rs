//! x87 FPU escape range (D8-DF).
//!
//! Each escape byte selects one of two sub-tables: a memory form keyed
//! on the ModR/M reg field when mod != 11, and a register form keyed on
//! the whole second byte otherwise.

use super::decoder::{rm_operand, Cursor};
use super::modrm::ModRM;
use super::prefix::Prefixes;
use crate::error::DecodeError;
use oxdis_core::{register::ids, DisassemblerMode, Operand, Register};

/// Memory-form mnemonic and element width in bits, keyed on the ModR/M
/// reg field. Width 0 marks environment and state blocks with no single
/// element size.
type MemRow = [Option<(&'static str, u16)>; 8];

static MEM_D8: MemRow = [
    Some(("fadd", 32)),
    Some(("fmul", 32)),
    Some(("fcom", 32)),
    Some(("fcomp", 32)),
    Some(("fsub", 32)),
    Some(("fsubr", 32)),
    Some(("fdiv", 32)),
    Some(("fdivr", 32)),
];

static MEM_D9: MemRow = [
    Some(("fld", 32)),
    None,
    Some(("fst", 32)),
    Some(("fstp", 32)),
    Some(("fldenv", 0)),
    Some(("fldcw", 16)),
    Some(("fnstenv", 0)),
    Some(("fnstcw", 16)),
];

static MEM_DA: MemRow = [
    Some(("fiadd", 32)),
    Some(("fimul", 32)),
    Some(("ficom", 32)),
    Some(("ficomp", 32)),
    Some(("fisub", 32)),
    Some(("fisubr", 32)),
    Some(("fidiv", 32)),
    Some(("fidivr", 32)),
];

static MEM_DB: MemRow = [
    Some(("fild", 32)),
    Some(("fisttp", 32)),
    Some(("fist", 32)),
    Some(("fistp", 32)),
    None,
    Some(("fld", 80)),
    None,
    Some(("fstp", 80)),
];

static MEM_DC: MemRow = [
    Some(("fadd", 64)),
    Some(("fmul", 64)),
    Some(("fcom", 64)),
    Some(("fcomp", 64)),
    Some(("fsub", 64)),
    Some(("fsubr", 64)),
    Some(("fdiv", 64)),
    Some(("fdivr", 64)),
];

static MEM_DD: MemRow = [
    Some(("fld", 64)),
    Some(("fisttp", 64)),
    Some(("fst", 64)),
    Some(("fstp", 64)),
    Some(("frstor", 0)),
    None,
    Some(("fnsave", 0)),
    Some(("fnstsw", 16)),
];

static MEM_DE: MemRow = [
    Some(("fiadd", 16)),
    Some(("fimul", 16)),
    Some(("ficom", 16)),
    Some(("ficomp", 16)),
    Some(("fisub", 16)),
    Some(("fisubr", 16)),
    Some(("fidiv", 16)),
    Some(("fidivr", 16)),
];

static MEM_DF: MemRow = [
    Some(("fild", 16)),
    Some(("fisttp", 16)),
    Some(("fist", 16)),
    Some(("fistp", 16)),
    Some(("fbld", 80)),
    Some(("fild", 64)),
    Some(("fbstp", 80)),
    Some(("fistp", 64)),
];

/// The D9 E8-EE constant loads.
static D9_CONSTANTS: [&str; 7] = ["fld1", "fldl2t", "fldl2e", "fldpi", "fldlg2", "fldln2", "fldz"];

/// The D9 F0-FF transcendental and stack-control row.
static D9_ARITH: [&str; 16] = [
    "f2xm1", "fyl2x", "fptan", "fpatan", "fxtract", "fprem1", "fdecstp", "fincstp", "fprem",
    "fyl2xp1", "fsqrt", "fsincos", "frndint", "fscale", "fsin", "fcos",
];

pub(super) fn decode(
    cur: &mut Cursor,
    prefixes: &Prefixes,
    mode: DisassemblerMode,
    escape: u8,
    address_mode: u16,
) -> Result<(&'static str, Vec<Operand>), DecodeError> {
    let byte = cur.read_u8()?;
    let modrm = ModRM::parse(byte, prefixes.rex);

    if !modrm.is_register() {
        return memory_form(cur, prefixes, mode, escape, modrm, address_mode);
    }
    register_form(cur, escape, byte)
}

fn memory_form(
    cur: &mut Cursor,
    prefixes: &Prefixes,
    mode: DisassemblerMode,
    escape: u8,
    modrm: ModRM,
    address_mode: u16,
) -> Result<(&'static str, Vec<Operand>), DecodeError> {
    let row = match escape {
        0xD8 => &MEM_D8,
        0xD9 => &MEM_D9,
        0xDA => &MEM_DA,
        0xDB => &MEM_DB,
        0xDC => &MEM_DC,
        0xDD => &MEM_DD,
        0xDE => &MEM_DE,
        _ => &MEM_DF,
    };

    let (mnemonic, bits) = row[(modrm.reg & 0x7) as usize].ok_or_else(|| {
        DecodeError::invalid_encoding(cur.address(), "reserved x87 memory encoding")
    })?;
    let mem = rm_operand(cur, modrm, prefixes, mode, address_mode, bits)?;
    Ok((mnemonic, vec![mem]))
}

fn register_form(
    cur: &Cursor,
    escape: u8,
    byte: u8,
) -> Result<(&'static str, Vec<Operand>), DecodeError> {
    let i = byte & 0x07;
    let st0 = Operand::reg(Register::st(0));
    let sti = Operand::reg(Register::st(i));
    let invalid =
        || DecodeError::invalid_encoding(cur.address(), "reserved x87 register encoding");

    let decoded = match escape {
        0xD8 => {
            let mnemonic = match byte & 0xF8 {
                0xC0 => "fadd",
                0xC8 => "fmul",
                0xD0 => "fcom",
                0xD8 => "fcomp",
                0xE0 => "fsub",
                0xE8 => "fsubr",
                0xF0 => "fdiv",
                _ => "fdivr",
            };
            (mnemonic, vec![st0, sti])
        }

        0xD9 => match byte {
            0xC0..=0xC7 => ("fld", vec![sti]),
            0xC8..=0xCF => ("fxch", vec![sti]),
            0xD0 => ("fnop", vec![]),
            0xE0 => ("fchs", vec![]),
            0xE1 => ("fabs", vec![]),
            0xE4 => ("ftst", vec![]),
            0xE5 => ("fxam", vec![]),
            0xE8..=0xEE => (D9_CONSTANTS[(byte - 0xE8) as usize], vec![]),
            0xF0..=0xFF => (D9_ARITH[(byte - 0xF0) as usize], vec![]),
            _ => return Err(invalid()),
        },

        0xDA => match byte {
            0xC0..=0xC7 => ("fcmovb", vec![st0, sti]),
            0xC8..=0xCF => ("fcmove", vec![st0, sti]),
            0xD0..=0xD7 => ("fcmovbe", vec![st0, sti]),
            0xD8..=0xDF => ("fcmovu", vec![st0, sti]),
            0xE9 => ("fucompp", vec![]),
            _ => return Err(invalid()),
        },

        0xDB => match byte {
            0xC0..=0xC7 => ("fcmovnb", vec![st0, sti]),
            0xC8..=0xCF => ("fcmovne", vec![st0, sti]),
            0xD0..=0xD7 => ("fcmovnbe", vec![st0, sti]),
            0xD8..=0xDF => ("fcmovnu", vec![st0, sti]),
            0xE2 => ("fnclex", vec![]),
            0xE3 => ("fninit", vec![]),
            0xE8..=0xEF => ("fucomi", vec![st0, sti]),
            0xF0..=0xF7 => ("fcomi", vec![st0, sti]),
            _ => return Err(invalid()),
        },

        // The two-operand rows swap direction here, and the subtract
        // and divide mnemonics swap with them.
        0xDC => match byte & 0xF8 {
            0xC0 => ("fadd", vec![sti, st0]),
            0xC8 => ("fmul", vec![sti, st0]),
            0xE0 => ("fsubr", vec![sti, st0]),
            0xE8 => ("fsub", vec![sti, st0]),
            0xF0 => ("fdivr", vec![sti, st0]),
            0xF8 => ("fdiv", vec![sti, st0]),
            _ => return Err(invalid()),
        },

        0xDD => match byte & 0xF8 {
            0xC0 => ("ffree", vec![sti]),
            0xD0 => ("fst", vec![sti]),
            0xD8 => ("fstp", vec![sti]),
            0xE0 => ("fucom", vec![sti]),
            0xE8 => ("fucomp", vec![sti]),
            _ => return Err(invalid()),
        },

        0xDE => match byte {
            0xC0..=0xC7 => ("faddp", vec![sti, st0]),
            0xC8..=0xCF => ("fmulp", vec![sti, st0]),
            0xD9 => ("fcompp", vec![]),
            0xE0..=0xE7 => ("fsubrp", vec![sti, st0]),
            0xE8..=0xEF => ("fsubp", vec![sti, st0]),
            0xF0..=0xF7 => ("fdivrp", vec![sti, st0]),
            0xF8..=0xFF => ("fdivp", vec![sti, st0]),
            _ => return Err(invalid()),
        },

        _ => match byte {
            0xE0 => ("fnstsw", vec![Operand::reg(Register::gpr(ids::RAX, 16))]),
            0xE8..=0xEF => ("fucomip", vec![st0, sti]),
            0xF0..=0xF7 => ("fcomip", vec![st0, sti]),
            _ => return Err(invalid()),
        },
    };

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use crate::traits::Disassembler;
    use crate::x86::X86Decoder;
    use oxdis_core::{InstructionInfo, Operation};

    fn decode64(bytes: &[u8]) -> InstructionInfo {
        X86Decoder::long_mode()
            .decode_instruction(bytes, 0x1000)
            .expect("decode")
            .info
    }

    #[test]
    fn memory_forms_select_on_reg_field() {
        let info = decode64(&[0xD8, 0x00]);
        assert_eq!(info.mnemonic, "fadd");
        assert_eq!(info.operation, Operation::Fpu);
        assert_eq!(info.operands[0].to_string(), "[rax]");

        let info = decode64(&[0xDD, 0x45, 0x08]);
        assert_eq!(info.mnemonic, "fld");
        assert_eq!(info.operands[0].to_string(), "[rbp + 0x8]");

        let info = decode64(&[0xDF, 0x28]);
        assert_eq!(info.mnemonic, "fild");
    }

    #[test]
    fn register_forms() {
        let info = decode64(&[0xD8, 0xC1]);
        assert_eq!(info.mnemonic, "fadd");
        assert_eq!(info.operands[0].to_string(), "st0");
        assert_eq!(info.operands[1].to_string(), "st1");

        let info = decode64(&[0xDE, 0xC1]);
        assert_eq!(info.mnemonic, "faddp");
        assert_eq!(info.operands[0].to_string(), "st1");
        assert_eq!(info.operands[1].to_string(), "st0");

        assert_eq!(decode64(&[0xD9, 0xE8]).mnemonic, "fld1");
        assert_eq!(decode64(&[0xD9, 0xFA]).mnemonic, "fsqrt");
        assert_eq!(decode64(&[0xDE, 0xD9]).mnemonic, "fcompp");
    }

    #[test]
    fn status_word_to_ax() {
        let info = decode64(&[0xDF, 0xE0]);
        assert_eq!(info.mnemonic, "fnstsw");
        assert_eq!(info.operands[0].to_string(), "ax");
    }

    #[test]
    fn reserved_encodings_are_invalid() {
        let err = X86Decoder::long_mode()
            .decode_instruction(&[0xD9, 0x08], 0)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::DecodeError::InvalidEncoding { .. }
        ));
    }
}
