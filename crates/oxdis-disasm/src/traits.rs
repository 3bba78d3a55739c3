//! The decoder-facing trait surface.

use crate::DecodeError;
use oxdis_core::{DisassemblerMode, InstructionInfo};

/// One successfully decoded instruction plus the byte count it spans.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodedInstruction {
    /// The populated instruction record.
    pub info: InstructionInfo,
    /// Bytes consumed from the input, equal to `info.length`.
    pub size: usize,
}

/// A machine-code decoder for one architecture and mode.
///
/// x86 is variable-width, so a caller cannot slice the input into
/// instructions up front; it hands the decoder the remaining bytes and
/// learns each instruction's width from the result.
pub trait Disassembler {
    /// Decodes the instruction starting at `bytes[0]`, which sits at
    /// `address` in the target's address space.
    fn decode_instruction(
        &self,
        bytes: &[u8],
        address: u64,
    ) -> Result<DecodedInstruction, DecodeError>;

    /// Shortest encodable instruction, in bytes.
    fn min_instruction_size(&self) -> usize;

    /// Longest encodable instruction, in bytes.
    fn max_instruction_size(&self) -> usize;

    /// True when every instruction has the same width.
    fn is_fixed_width(&self) -> bool;

    /// The machine mode this decoder was built for.
    fn mode(&self) -> DisassemblerMode;

    /// Sweeps a whole block, resynchronizing one byte past any sequence
    /// that fails to decode so a single bad byte cannot hide the rest
    /// of the block. Addresses wrap at the top of the address space.
    fn disassemble_block(
        &self,
        bytes: &[u8],
        start_address: u64,
    ) -> Vec<Result<InstructionInfo, DecodeError>> {
        let mut results = Vec::new();
        let mut offset = 0;

        while offset < bytes.len() {
            let address = start_address.wrapping_add(offset as u64);
            match self.decode_instruction(&bytes[offset..], address) {
                Ok(decoded) => {
                    results.push(Ok(decoded.info));
                    offset += decoded.size;
                }
                Err(err) => {
                    results.push(Err(err));
                    offset += 1;
                }
            }
        }

        results
    }
}
