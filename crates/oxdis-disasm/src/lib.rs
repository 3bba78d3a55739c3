//! # oxdis-disasm
//!
//! Table-driven x86/x86-64 instruction decoder. Handles:
//! - all three disassembler modes (16-bit, 32-bit, 64-bit)
//! - legacy prefixes (LOCK, REP/REPNE, segment overrides,
//!   operand/address size) and REX
//! - ModR/M and SIB decoding, including 16-bit addressing forms
//! - the common one-byte and 0F opcode ranges plus the ModR/M-extended
//!   instruction groups
//! - the x87 escape range (behind the `x87` feature)
//!
//! Relative branch targets and rip-relative displacements are kept as raw
//! deltas on the decoded record; [`x86::try_absolute_target`] turns them
//! into absolute addresses, and [`x86::IntelFormatter`] renders them
//! through an optional [`oxdis_core::SymbolResolver`].

pub mod error;
pub mod meta;
pub mod traits;
pub mod x86;

pub use error::DecodeError;
pub use meta::{is_feature_enabled, Feature, VERSION};
pub use traits::{DecodedInstruction, Disassembler};
pub use x86::{absolute_target, try_absolute_target, IntelFormatter, TargetError, X86Decoder};
