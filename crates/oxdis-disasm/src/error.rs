//! Decoder error types.

use oxdis_core::DisassemblerMode;
use thiserror::Error;

/// Ways a byte sequence can fail to decode.
///
/// Every variant carries the address of the first instruction byte, so
/// a block sweep can report where it resynchronized. Opcode validity
/// depends on the machine mode, so unknown-opcode errors carry the mode
/// the lookup ran under.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// No opcode-table entry matches these bytes in this mode.
    #[error("unknown opcode {bytes:02x?} at {address:#x} in {mode:?}")]
    UnknownOpcode {
        address: u64,
        bytes: Vec<u8>,
        mode: DisassemblerMode,
    },

    /// The byte stream ended inside the instruction.
    #[error("instruction at {address:#x} needs {needed} bytes, only {available} present")]
    Truncated {
        address: u64,
        needed: usize,
        available: usize,
    },

    /// The encoding is structurally invalid, or invalid in this mode.
    #[error("invalid encoding at {address:#x}: {reason}")]
    InvalidEncoding { address: u64, reason: String },

    /// Prefixes and operand fields add up past the architectural
    /// 15-byte instruction limit.
    #[error("instruction at {address:#x} spans {length} bytes, above the 15-byte limit")]
    TooLong { address: u64, length: usize },

    /// A real encoding this decoder does not model (VEX/EVEX forms,
    /// the 0F 38 and 0F 3A escape maps).
    #[error("unsupported encoding at {address:#x}: {reason}")]
    Unsupported { address: u64, reason: String },
}

impl DecodeError {
    pub fn unknown_opcode(address: u64, bytes: &[u8], mode: DisassemblerMode) -> Self {
        Self::UnknownOpcode {
            address,
            bytes: bytes.to_vec(),
            mode,
        }
    }

    pub fn truncated(address: u64, needed: usize, available: usize) -> Self {
        Self::Truncated {
            address,
            needed,
            available,
        }
    }

    pub fn invalid_encoding(address: u64, reason: impl Into<String>) -> Self {
        Self::InvalidEncoding {
            address,
            reason: reason.into(),
        }
    }

    pub fn too_long(address: u64, length: usize) -> Self {
        Self::TooLong { address, length }
    }

    pub fn unsupported(address: u64, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            address,
            reason: reason.into(),
        }
    }

    /// Address of the instruction the error refers to.
    pub fn address(&self) -> u64 {
        match *self {
            Self::UnknownOpcode { address, .. }
            | Self::Truncated { address, .. }
            | Self::InvalidEncoding { address, .. }
            | Self::TooLong { address, .. }
            | Self::Unsupported { address, .. } => address,
        }
    }
}
