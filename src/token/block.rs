//! The parsed form of one chain block's Datalog payload.

use crate::builder::{self, BlockBuilder};
use crate::crypto::PublicKey;
use crate::datalog::{self, SymbolTable};
use crate::error::Result;
use crate::format::convert::MAX_BLOCK_VERSION;

/// A block's Datalog content, in interned form.
///
/// `symbols` and `public_keys` list only what this block introduced; a
/// third-party block's indexes are relative to its own isolated table,
/// which [`Block::local_table`] rebuilds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Symbols this block introduced.
    pub symbols: Vec<String>,
    /// Free-form context string.
    pub context: Option<String>,
    /// Facts the block states.
    pub facts: Vec<datalog::Fact>,
    /// Rules the block provides.
    pub rules: Vec<datalog::Rule>,
    /// Checks the block imposes.
    pub checks: Vec<datalog::Check>,
    /// Block-wide trust scopes.
    pub scopes: Vec<datalog::Scope>,
    /// Third-party public keys this block introduced.
    pub public_keys: Vec<PublicKey>,
    /// Payload format version.
    pub version: u32,
    /// The co-signing key, for third-party blocks.
    pub external_key: Option<PublicKey>,
}

impl Block {
    /// Intern a builder's content into `symbols`, producing the parsed
    /// block.
    ///
    /// # Errors
    ///
    /// Propagates conversion errors (variables in facts, unbound head
    /// variables).
    pub(crate) fn from_builder(
        builder: BlockBuilder,
        symbols: &mut SymbolTable,
    ) -> Result<Self> {
        let symbol_offset = symbols.len();
        let key_offset = symbols.keys_len();

        let mut facts = Vec::with_capacity(builder.facts.len());
        for fact in &builder.facts {
            facts.push(fact.convert(symbols)?);
        }
        let mut rules = Vec::with_capacity(builder.rules.len());
        for rule in &builder.rules {
            rules.push(rule.convert(symbols)?);
        }
        let mut checks = Vec::with_capacity(builder.checks.len());
        for check in &builder.checks {
            checks.push(check.convert(symbols)?);
        }
        let scopes = builder
            .scopes
            .iter()
            .map(|scope| scope.convert(symbols))
            .collect();

        Ok(Self {
            symbols: symbols.symbols_after(symbol_offset),
            context: builder.context,
            facts,
            rules,
            checks,
            scopes,
            public_keys: symbols.keys_after(key_offset),
            version: MAX_BLOCK_VERSION,
            external_key: None,
        })
    }

    /// Rebuild the isolated interning table of a third-party block.
    ///
    /// For primary-chain blocks this is not meaningful; their indexes
    /// live in the token's table.
    #[must_use]
    pub(crate) fn local_table(&self) -> SymbolTable {
        let mut table = SymbolTable::new();
        for symbol in &self.symbols {
            table.insert(symbol);
        }
        for key in &self.public_keys {
            table.insert_key(key);
        }
        table
    }

    /// Render the block's program as canonical text.
    ///
    /// # Errors
    ///
    /// Returns `unknown symbol` if an index does not resolve in
    /// `symbols`.
    pub fn print(&self, symbols: &SymbolTable) -> Result<String> {
        let mut lines = Vec::new();
        if !self.scopes.is_empty() {
            let scopes: Vec<String> = self
                .scopes
                .iter()
                .map(|scope| {
                    builder::Scope::convert_from(scope, symbols).map(|s| s.to_string())
                })
                .collect::<Result<_>>()?;
            lines.push(format!("trusting {};", scopes.join(", ")));
        }
        for fact in &self.facts {
            lines.push(format!("{};", builder::Fact::convert_from(fact, symbols)?));
        }
        for rule in &self.rules {
            lines.push(format!("{};", builder::Rule::convert_from(rule, symbols)?));
        }
        for check in &self.checks {
            lines.push(format!("{};", builder::Check::convert_from(check, symbols)?));
        }
        Ok(lines.join("\n"))
    }
}
