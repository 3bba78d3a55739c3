//! x86/x86-64 instruction decoder.
//!
//! Decoding walks prefixes, opcode bytes, ModR/M/SIB, displacement, and
//! immediate fields per the opcode tables and populates an
//! [`oxdis_core::InstructionInfo`]. Branch deltas stay raw; the absolute
//! address computation lives in [`target`] so decoding itself stays
//! position-independent.

mod decoder;
mod fmt;
mod modrm;
mod opcodes;
mod prefix;
mod target;
#[cfg(feature = "x87")]
mod x87;

pub use decoder::X86Decoder;
pub use fmt::IntelFormatter;
pub use target::{absolute_target, try_absolute_target, TargetError};
