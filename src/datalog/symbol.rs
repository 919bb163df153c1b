//! String and public-key interning.
//!
//! Serialized blocks never carry strings inline: every string is
//! replaced by a small index into a table, which makes the signed bytes
//! deterministic and compact. A fixed prefix of 28 well-known symbols
//! occupies the reserved index range 0–1023; symbols introduced by
//! blocks start at 1024. Public keys are interned the same way, without
//! a reserved range.
//!
//! Third-party blocks are built against an isolated table that starts
//! empty (defaults still reserved), so their contents cannot collide
//! with — or observe — the primary chain's interning state.

use crate::crypto::PublicKey;
use crate::datalog::value::SymbolIndex;
use crate::error::FormatError;

/// Symbols shared by every token, at indexes `0..28`.
pub const DEFAULT_SYMBOLS: [&str; 28] = [
    "read",
    "write",
    "resource",
    "operation",
    "right",
    "time",
    "role",
    "owner",
    "tenant",
    "namespace",
    "user",
    "team",
    "service",
    "admin",
    "email",
    "group",
    "member",
    "ip_address",
    "client",
    "client_ip",
    "domain",
    "path",
    "version",
    "cluster",
    "node",
    "hostname",
    "nonce",
    "query",
];

/// First index available to user symbols; `0..OFFSET` is reserved for
/// the default table.
pub const USER_SYMBOL_OFFSET: u64 = 1024;

/// An interning table for strings and third-party public keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: Vec<String>,
    public_keys: Vec<PublicKey>,
}

impl SymbolTable {
    /// A table with no user symbols (defaults are always present).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of user symbols in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True when no user symbols have been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The user symbols interned after the first `n`.
    ///
    /// Used to collect the symbols a block introduced: snapshot `len()`
    /// before converting the block, then serialize this suffix.
    #[must_use]
    pub fn symbols_after(&self, n: usize) -> Vec<String> {
        self.symbols[n..].to_vec()
    }

    /// Index of `symbol` if it is already interned (defaults included).
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<SymbolIndex> {
        if let Some(i) = DEFAULT_SYMBOLS.iter().position(|s| *s == symbol) {
            return Some(i as u64);
        }
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|i| USER_SYMBOL_OFFSET + i as u64)
    }

    /// Intern `symbol`, returning its index.
    pub fn insert(&mut self, symbol: &str) -> SymbolIndex {
        if let Some(index) = self.get(symbol) {
            return index;
        }
        self.symbols.push(symbol.to_string());
        USER_SYMBOL_OFFSET + (self.symbols.len() - 1) as u64
    }

    /// The string at `index`, if any.
    #[must_use]
    pub fn get_symbol(&self, index: SymbolIndex) -> Option<&str> {
        if index < USER_SYMBOL_OFFSET {
            return usize::try_from(index)
                .ok()
                .and_then(|i| DEFAULT_SYMBOLS.get(i))
                .copied();
        }
        usize::try_from(index - USER_SYMBOL_OFFSET)
            .ok()
            .and_then(|i| self.symbols.get(i))
            .map(String::as_str)
    }

    /// The string at `index`, or `unknown_symbol`.
    ///
    /// # Errors
    ///
    /// Returns `FormatError::UnknownSymbol` for indexes outside the
    /// table.
    pub fn lookup(&self, index: SymbolIndex) -> Result<&str, FormatError> {
        self.get_symbol(index)
            .ok_or(FormatError::UnknownSymbol(index))
    }

    /// Add symbols a deserialized block introduced.
    ///
    /// # Errors
    ///
    /// Returns `FormatError::DuplicateSymbol` if any symbol is already
    /// present (defaults included): blocks must not redeclare symbols.
    pub fn extend(&mut self, symbols: &[String]) -> Result<(), FormatError> {
        for symbol in symbols {
            if self.get(symbol).is_some() {
                return Err(FormatError::DuplicateSymbol(symbol.clone()));
            }
            self.symbols.push(symbol.clone());
        }
        Ok(())
    }

    /// Number of interned public keys.
    #[must_use]
    pub fn keys_len(&self) -> usize {
        self.public_keys.len()
    }

    /// The public keys interned after the first `n`.
    #[must_use]
    pub fn keys_after(&self, n: usize) -> Vec<PublicKey> {
        self.public_keys[n..].to_vec()
    }

    /// Index of `key` if it is already interned.
    #[must_use]
    pub fn get_key(&self, key: &PublicKey) -> Option<u64> {
        self.public_keys
            .iter()
            .position(|k| k == key)
            .map(|i| i as u64)
    }

    /// Intern `key`, returning its index.
    pub fn insert_key(&mut self, key: &PublicKey) -> u64 {
        if let Some(index) = self.get_key(key) {
            return index;
        }
        self.public_keys.push(key.clone());
        (self.public_keys.len() - 1) as u64
    }

    /// The public key at `index`, if any.
    #[must_use]
    pub fn get_public_key(&self, index: u64) -> Option<&PublicKey> {
        usize::try_from(index).ok().and_then(|i| self.public_keys.get(i))
    }

    /// Add public keys a deserialized block introduced.
    ///
    /// # Errors
    ///
    /// Returns `FormatError::DuplicatePublicKey` if any key is already
    /// present.
    pub fn extend_keys(&mut self, keys: &[PublicKey]) -> Result<(), FormatError> {
        for key in keys {
            if self.get_key(key).is_some() {
                return Err(FormatError::DuplicatePublicKey(key.to_string()));
            }
            self.public_keys.push(key.clone());
        }
        Ok(())
    }
}

/// A scratch layer over a [`SymbolTable`] for strings created during
/// expression evaluation (string concatenation), discarded afterwards.
///
/// Interning goes through get-or-insert against the combined view, so a
/// string always resolves to a single index and index equality stays
/// sound during evaluation.
#[derive(Debug)]
pub struct TemporarySymbolTable<'a> {
    base: &'a SymbolTable,
    offset: u64,
    symbols: Vec<String>,
}

impl<'a> TemporarySymbolTable<'a> {
    /// Create a scratch layer over `base`.
    #[must_use]
    pub fn new(base: &'a SymbolTable) -> Self {
        let offset = USER_SYMBOL_OFFSET + base.len() as u64;
        Self {
            base,
            offset,
            symbols: Vec::new(),
        }
    }

    /// The string at `index`, searching the base table first.
    #[must_use]
    pub fn get_symbol(&self, index: SymbolIndex) -> Option<&str> {
        if index < self.offset {
            return self.base.get_symbol(index);
        }
        usize::try_from(index - self.offset)
            .ok()
            .and_then(|i| self.symbols.get(i))
            .map(String::as_str)
    }

    /// Intern `symbol` into the combined view.
    pub fn insert(&mut self, symbol: &str) -> SymbolIndex {
        if let Some(index) = self.base.get(symbol) {
            return index;
        }
        if let Some(i) = self.symbols.iter().position(|s| s == symbol) {
            return self.offset + i as u64;
        }
        self.symbols.push(symbol.to_string());
        self.offset + (self.symbols.len() - 1) as u64
    }
}
