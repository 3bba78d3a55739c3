//! Absolute branch-target computation.
//!
//! Relative operands carry raw deltas; the absolute target depends on
//! the instruction's end address and effective operand width, both of
//! which live on the instruction record. A 16-bit delta wraps inside
//! the current 64 KiB window of the instruction pointer; 8 and 32-bit
//! deltas sign-extend, add, and truncate to the operand width.

use oxdis_core::{InstructionInfo, Literal, Operand};
use thiserror::Error;

/// Error type for target resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// The operand carries no relative delta.
    #[error("operand is not relative")]
    NotRelative,

    /// The delta width is not one the resolver handles.
    #[error("unsupported relative operand width: {0} bits")]
    UnsupportedWidth(u16),
}

/// Extracts the delta width and raw literal from a resolvable operand.
fn relative_parts(operand: &Operand) -> Option<(u16, Literal)> {
    match operand {
        Operand::Relative(rel) => Some((rel.size, rel.delta)),
        Operand::Memory(mem) if mem.is_rip_relative() => {
            mem.displacement.map(|disp| (disp.size, disp.value))
        }
        _ => None,
    }
}

/// Computes the absolute target address of a relative operand.
///
/// The width dispatched on is the encoded delta width: the branch
/// delta's own width, or the displacement width for a rip-relative
/// memory operand. Outside 64-bit mode the result is truncated to the
/// effective operand width.
pub fn try_absolute_target(info: &InstructionInfo, operand: &Operand) -> Result<u64, TargetError> {
    let (size, literal) = relative_parts(operand).ok_or(TargetError::NotRelative)?;

    let mut trunc_mask = u64::MAX;
    if !info.is_mode64() {
        trunc_mask >>= 64 - info.operand_mode as u32;
    }

    match size {
        8 | 32 => Ok(info
            .instr_pointer
            .wrapping_add(literal.as_i64() as u64)
            & trunc_mask),
        16 => {
            // The masked delta is treated as unsigned here; a carry out
            // of the low 16 bits wraps within the current 64 KiB
            // window instead of propagating.
            let delta = ((literal.as_i64() as u64) & trunc_mask) as u32 as u64;
            let sum = info.instr_pointer.wrapping_add(delta);
            if sum > 0xFFFF {
                Ok((info.instr_pointer & 0xF_0000).wrapping_add(sum & 0xFFFF))
            } else {
                Ok(sum)
            }
        }
        other => Err(TargetError::UnsupportedWidth(other)),
    }
}

/// Computes the absolute target address of a relative operand.
///
/// # Panics
/// Panics if the operand is not relative or its width is unsupported.
/// Use [`try_absolute_target`] to handle those cases as errors.
pub fn absolute_target(info: &InstructionInfo, operand: &Operand) -> u64 {
    match try_absolute_target(info, operand) {
        Ok(target) => target,
        Err(err) => panic!("absolute_target: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Disassembler;
    use crate::x86::X86Decoder;
    use oxdis_core::{DisassemblerMode, Operation, RelativeImmediate};

    fn info_with(
        mode: DisassemblerMode,
        operand_mode: u16,
        instr_pointer: u64,
    ) -> InstructionInfo {
        let mut info = InstructionInfo::new(mode, 0, Operation::Jump, "jmp");
        info.operand_mode = operand_mode;
        info.instr_pointer = instr_pointer;
        info
    }

    fn rel(size: u16, delta: Literal) -> Operand {
        Operand::Relative(RelativeImmediate { size, delta })
    }

    #[test]
    fn rel32_backwards_in_long_mode() {
        let info = info_with(DisassemblerMode::Bits64, 64, 0x10000);
        let op = rel(32, Literal::Dword(-1));
        assert_eq!(try_absolute_target(&info, &op), Ok(0xFFFF));
    }

    #[test]
    fn rel8_backwards() {
        let info = info_with(DisassemblerMode::Bits64, 64, 0x401000);
        let op = rel(8, Literal::Byte(-16));
        assert_eq!(absolute_target(&info, &op), 0x400FF0);
    }

    #[test]
    fn legacy_mode_truncates_to_operand_width() {
        // 32-bit mode with a 16-bit effective operand: the whole result
        // is masked to 16 bits.
        let info = info_with(DisassemblerMode::Bits32, 16, 0x1000);
        let op = rel(8, Literal::Byte(-1));
        assert_eq!(try_absolute_target(&info, &op), Ok(0x0FFF));

        let info = info_with(DisassemblerMode::Bits32, 32, 0x1000);
        let op = rel(32, Literal::Dword(-0x2000));
        assert_eq!(try_absolute_target(&info, &op), Ok(0xFFFF_F000));
    }

    #[test]
    fn word_delta_wraps_in_64k_window() {
        let info = info_with(DisassemblerMode::Bits16, 16, 0xFFF0);
        let op = rel(16, Literal::Word(0x20));
        assert_eq!(try_absolute_target(&info, &op), Ok(0x10));

        // With the instruction pointer above 64 KiB the window base is
        // preserved.
        let info = info_with(DisassemblerMode::Bits16, 16, 0x2FFF0);
        let op = rel(16, Literal::Word(0x20));
        assert_eq!(try_absolute_target(&info, &op), Ok(0x2_0010));
    }

    #[test]
    fn word_delta_without_carry() {
        let info = info_with(DisassemblerMode::Bits16, 16, 0x1000);
        let op = rel(16, Literal::Word(0x10));
        assert_eq!(try_absolute_target(&info, &op), Ok(0x1010));
    }

    #[test]
    fn rip_relative_uses_displacement_width() {
        let decoder = X86Decoder::long_mode();
        // mov rax, [rip + 0x10] at 0x1000; next instruction at 0x1007.
        let info = decoder
            .decode_instruction(&[0x48, 0x8B, 0x05, 0x10, 0x00, 0x00, 0x00], 0x1000)
            .unwrap()
            .info;
        let target = try_absolute_target(&info, &info.operands[1]).unwrap();
        assert_eq!(target, 0x1017);
    }

    #[test]
    fn decoded_branch_round_trip() {
        let decoder = X86Decoder::long_mode();
        let info = decoder
            .decode_instruction(&[0xE8, 0xFB, 0xFF, 0xFF, 0xFF], 0x1000)
            .unwrap()
            .info;
        // call $-5 lands back on the call itself.
        assert_eq!(absolute_target(&info, &info.operands[0]), 0x1000);
    }

    #[test]
    fn non_relative_operand_is_rejected() {
        let info = info_with(DisassemblerMode::Bits64, 64, 0x1000);
        let op = Operand::imm(Literal::Dword(5), 32);
        assert_eq!(
            try_absolute_target(&info, &op),
            Err(TargetError::NotRelative)
        );
    }

    #[test]
    fn unsupported_width_is_rejected() {
        let info = info_with(DisassemblerMode::Bits64, 64, 0x1000);
        let op = rel(64, Literal::Qword(1));
        assert_eq!(
            try_absolute_target(&info, &op),
            Err(TargetError::UnsupportedWidth(64))
        );
    }

    #[test]
    #[should_panic(expected = "absolute_target")]
    fn panicking_entry_point() {
        let info = info_with(DisassemblerMode::Bits64, 64, 0x1000);
        let op = Operand::imm(Literal::Dword(5), 32);
        absolute_target(&info, &op);
    }

    #[test]
    fn resolution_is_idempotent() {
        let info = info_with(DisassemblerMode::Bits16, 16, 0xFFF0);
        let op = rel(16, Literal::Word(0x20));
        let first = try_absolute_target(&info, &op).unwrap();
        let second = try_absolute_target(&info, &op).unwrap();
        assert_eq!(first, second);
    }
}
