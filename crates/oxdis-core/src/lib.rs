//! # oxdis-core
//!
//! Core abstractions for the oxdis x86/x86-64 disassembler. This crate
//! defines the data model shared by the decoder and its consumers:
//! registers, operands, the decoded-instruction record, disassembler
//! mode/flag types, and the symbol-resolver capability used at
//! formatting time.

pub mod instruction;
pub mod mode;
pub mod operand;
pub mod register;
pub mod symbol;

pub use instruction::{Condition, InstructionInfo, Operation, MAX_OPERANDS};
pub use mode::{DisassemblerMode, InstructionFlags};
pub use operand::{Displacement, Immediate, Literal, MemoryRef, Operand, RelativeImmediate};
pub use register::{Register, RegisterClass};
pub use symbol::{
    ExactSymbolResolver, NearestSymbolResolver, NullSymbolResolver, ResolvedSymbol, SymbolResolver,
};
