//! Symbol resolution for formatting decoded instructions.
//!
//! A symbol resolver maps an absolute address back to a human-readable
//! name. It is consulted at formatting time only, after the target
//! resolver has produced the address; "no symbol" is a normal result and
//! callers fall back to numeric rendering.
//!
//! The resolvers are not internally synchronized. Disassembly workloads
//! build the table once before the decode loop and only read afterwards;
//! concurrent mutation needs external locking.

use std::collections::{BTreeMap, HashMap};

use crate::InstructionInfo;

/// A resolved symbol: its name and the queried address's offset from the
/// symbol base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSymbol<'a> {
    /// The symbol name.
    pub name: &'a str,
    /// Byte offset of the queried address from the symbol's base address.
    pub offset: u64,
}

/// Capability for mapping absolute addresses to symbolic names.
pub trait SymbolResolver {
    /// Resolves `address` to a symbol, or `None` if nothing is known.
    ///
    /// The owning instruction record is passed along so implementations
    /// can make context-dependent decisions; the bundled resolvers ignore
    /// it.
    fn resolve_symbol(&self, info: &InstructionInfo, address: u64) -> Option<ResolvedSymbol<'_>>;
}

/// Resolver that never finds a symbol.
///
/// Lets callers treat "no resolver configured" and "resolver found
/// nothing" identically.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSymbolResolver;

impl SymbolResolver for NullSymbolResolver {
    fn resolve_symbol(&self, _info: &InstructionInfo, _address: u64) -> Option<ResolvedSymbol<'_>> {
        None
    }
}

/// Exact-match resolver backed by an address-to-name map.
///
/// An address strictly between two known symbols resolves to nothing;
/// the caller-supplied table is expected to be complete. For
/// nearest-below semantics use [`NearestSymbolResolver`].
#[derive(Debug, Clone, Default)]
pub struct ExactSymbolResolver {
    symbols: HashMap<u64, String>,
}

impl ExactSymbolResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a symbol is bound to `address`.
    pub fn contains_symbol(&self, address: u64) -> bool {
        self.symbols.contains_key(&address)
    }

    /// Binds `name` to `address`, replacing any previous binding.
    pub fn set_symbol(&mut self, address: u64, name: impl Into<String>) {
        self.symbols.insert(address, name.into());
    }

    /// Removes the binding for `address`; no-op if absent.
    pub fn remove_symbol(&mut self, address: u64) {
        self.symbols.remove(&address);
    }

    /// Removes all bindings.
    pub fn clear(&mut self) {
        self.symbols.clear();
    }

    /// Returns the number of bound symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns true if no symbols are bound.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolResolver for ExactSymbolResolver {
    fn resolve_symbol(&self, _info: &InstructionInfo, address: u64) -> Option<ResolvedSymbol<'_>> {
        self.symbols.get(&address).map(|name| ResolvedSymbol {
            name,
            offset: 0,
        })
    }
}

/// Range-based resolver: resolves to the nearest symbol at or below the
/// queried address, reporting the distance as the offset.
#[derive(Debug, Clone, Default)]
pub struct NearestSymbolResolver {
    symbols: BTreeMap<u64, String>,
}

impl NearestSymbolResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a symbol is bound exactly to `address`.
    pub fn contains_symbol(&self, address: u64) -> bool {
        self.symbols.contains_key(&address)
    }

    /// Binds `name` to `address`, replacing any previous binding.
    pub fn set_symbol(&mut self, address: u64, name: impl Into<String>) {
        self.symbols.insert(address, name.into());
    }

    /// Removes the binding for `address`; no-op if absent.
    pub fn remove_symbol(&mut self, address: u64) {
        self.symbols.remove(&address);
    }

    /// Removes all bindings.
    pub fn clear(&mut self) {
        self.symbols.clear();
    }
}

impl SymbolResolver for NearestSymbolResolver {
    fn resolve_symbol(&self, _info: &InstructionInfo, address: u64) -> Option<ResolvedSymbol<'_>> {
        self.symbols
            .range(..=address)
            .next_back()
            .map(|(base, name)| ResolvedSymbol {
                name,
                offset: address - base,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DisassemblerMode, Operation};

    fn dummy_info() -> InstructionInfo {
        InstructionInfo::new(DisassemblerMode::Bits64, 0x1000, Operation::Nop, "nop")
    }

    #[test]
    fn exact_round_trip() {
        let info = dummy_info();
        let mut resolver = ExactSymbolResolver::new();
        resolver.set_symbol(0x1000, "main");

        let sym = resolver.resolve_symbol(&info, 0x1000).unwrap();
        assert_eq!(sym.name, "main");
        assert_eq!(sym.offset, 0);
        assert!(resolver.contains_symbol(0x1000));

        resolver.remove_symbol(0x1000);
        assert!(resolver.resolve_symbol(&info, 0x1000).is_none());
        assert!(!resolver.contains_symbol(0x1000));
    }

    #[test]
    fn exact_no_partial_match() {
        let info = dummy_info();
        let mut resolver = ExactSymbolResolver::new();
        resolver.set_symbol(0x1000, "start");
        resolver.set_symbol(0x2000, "end");

        // An address strictly between two symbols resolves to nothing.
        assert!(resolver.resolve_symbol(&info, 0x1800).is_none());
    }

    #[test]
    fn exact_overwrite_and_clear() {
        let info = dummy_info();
        let mut resolver = ExactSymbolResolver::new();
        resolver.set_symbol(0x1000, "old");
        resolver.set_symbol(0x1000, "new");
        assert_eq!(resolver.resolve_symbol(&info, 0x1000).unwrap().name, "new");
        assert_eq!(resolver.len(), 1);

        resolver.clear();
        assert!(resolver.is_empty());
        assert!(resolver.resolve_symbol(&info, 0x1000).is_none());
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut resolver = ExactSymbolResolver::new();
        resolver.set_symbol(0x1000, "main");
        resolver.remove_symbol(0xdead);
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn null_resolver_finds_nothing() {
        let info = dummy_info();
        assert!(NullSymbolResolver.resolve_symbol(&info, 0x1000).is_none());
    }

    #[test]
    fn nearest_below() {
        let info = dummy_info();
        let mut resolver = NearestSymbolResolver::new();
        resolver.set_symbol(0x1000, "func_a");
        resolver.set_symbol(0x2000, "func_b");

        let sym = resolver.resolve_symbol(&info, 0x1840).unwrap();
        assert_eq!(sym.name, "func_a");
        assert_eq!(sym.offset, 0x840);

        let sym = resolver.resolve_symbol(&info, 0x2000).unwrap();
        assert_eq!(sym.name, "func_b");
        assert_eq!(sym.offset, 0);

        // Below the lowest symbol there is nothing to resolve to.
        assert!(resolver.resolve_symbol(&info, 0xFFF).is_none());
    }
}
