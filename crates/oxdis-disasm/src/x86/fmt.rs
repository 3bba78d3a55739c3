//! Intel-syntax text formatting.

use super::target::try_absolute_target;
use oxdis_core::{InstructionInfo, Operand, SymbolResolver};

/// Formats decoded instructions in Intel syntax, resolving branch
/// targets and rip-relative references to absolute addresses and,
/// optionally, to symbol names.
pub struct IntelFormatter<'a> {
    resolver: Option<&'a dyn SymbolResolver>,
}

impl<'a> IntelFormatter<'a> {
    /// Creates a formatter without symbol resolution.
    pub fn new() -> Self {
        Self { resolver: None }
    }

    /// Creates a formatter that resolves addresses through the given
    /// symbol resolver.
    pub fn with_symbol_resolver(resolver: &'a dyn SymbolResolver) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }

    /// Formats one listing line: address, hex bytes, then the
    /// assembly text.
    pub fn format_line(&self, info: &InstructionInfo) -> String {
        use std::fmt::Write;

        let mut out = format!("{:#010x}:  ", info.address);
        for byte in &info.bytes {
            let _ = write!(out, "{:02x} ", byte);
        }
        for _ in info.bytes.len()..8 {
            out.push_str("   ");
        }
        out.push(' ');
        out.push_str(&self.format(info));
        out
    }

    /// Formats one instruction as mnemonic plus operands.
    pub fn format(&self, info: &InstructionInfo) -> String {
        let mut out = info.mnemonic.clone();

        for (i, operand) in info.operands.iter().enumerate() {
            out.push_str(if i == 0 { " " } else { ", " });
            self.format_operand(&mut out, info, operand);
        }

        out
    }

    fn format_operand(&self, out: &mut String, info: &InstructionInfo, operand: &Operand) {
        match operand {
            Operand::Relative(_) => {
                if let Ok(target) = try_absolute_target(info, operand) {
                    out.push_str(&self.symbolize(info, target));
                } else {
                    out.push_str(&operand.to_string());
                }
            }
            Operand::Memory(mem) if mem.is_rip_relative() => {
                if let Ok(target) = try_absolute_target(info, operand) {
                    out.push('[');
                    out.push_str(&self.symbolize(info, target));
                    out.push(']');
                } else {
                    out.push_str(&operand.to_string());
                }
            }
            other => out.push_str(&other.to_string()),
        }
    }

    /// Renders an absolute address, as a symbol reference when the
    /// resolver knows it.
    fn symbolize(&self, info: &InstructionInfo, address: u64) -> String {
        if let Some(resolver) = self.resolver {
            if let Some(sym) = resolver.resolve_symbol(info, address) {
                if sym.offset == 0 {
                    return sym.name.to_string();
                }
                return format!("{}+{:#x}", sym.name, sym.offset);
            }
        }
        format!("{:#x}", address)
    }
}

impl Default for IntelFormatter<'_> {
    fn default() -> Self {
        Self::new()
    }
}
