//! The string-level program AST and its constructors.
//!
//! Types in this module mirror [`crate::datalog`] but carry strings
//! instead of interned indexes: this is what the parser produces and
//! what callers build programmatically. Conversion into the interned
//! form happens against a [`SymbolTable`] when a block is assembled or
//! an authorizer runs; the reverse conversion backs `Display` and
//! error reporting.
//!
//! There is no macro layer: blocks are built from plain collections of
//! facts, rules, checks and policies, either constructed directly
//! (`fact("user", [int(1234)])`) or parsed from the text grammar, which
//! is the canonical interchange form.

mod display;

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::datalog;
use crate::datalog::{Binary, CheckKind, SymbolTable, Unary};
use crate::error::{Error, FormatError, Result};
use crate::parser;

/// A term of the value algebra, or a named variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// A named variable (`$name` in text form).
    Variable(String),
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    Str(String),
    /// Seconds since the Unix epoch.
    Date(u64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Boolean.
    Bool(bool),
    /// Absent value.
    Null,
    /// Unordered collection; never contains sets.
    Set(BTreeSet<Term>),
    /// Ordered collection.
    Array(Vec<Term>),
    /// Keyed collection.
    Map(BTreeMap<MapKey, Term>),
}

/// A map key: integers and strings only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapKey {
    /// Integer key.
    Integer(i64),
    /// String key.
    Str(String),
}

impl Term {
    const fn rank(&self) -> u8 {
        match self {
            Term::Variable(_) => 0,
            Term::Integer(_) => 1,
            Term::Str(_) => 2,
            Term::Date(_) => 3,
            Term::Bytes(_) => 4,
            Term::Bool(_) => 5,
            Term::Set(_) => 6,
            Term::Null => 7,
            Term::Array(_) => 8,
            Term::Map(_) => 9,
        }
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        match (self, other) {
            (Term::Variable(a), Term::Variable(b)) | (Term::Str(a), Term::Str(b)) => a.cmp(b),
            (Term::Integer(a), Term::Integer(b)) => a.cmp(b),
            (Term::Date(a), Term::Date(b)) => a.cmp(b),
            (Term::Bytes(a), Term::Bytes(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Term::Bool(a), Term::Bool(b)) => a.cmp(b),
            (Term::Null, Term::Null) => core::cmp::Ordering::Equal,
            (Term::Set(a), Term::Set(b)) => a.iter().cmp(b.iter()),
            (Term::Array(a), Term::Array(b)) => a.iter().cmp(b.iter()),
            (Term::Map(a), Term::Map(b)) => a.iter().cmp(b.iter()),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MapKey {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        match (self, other) {
            (MapKey::Integer(a), MapKey::Integer(b)) => a.cmp(b),
            (MapKey::Str(a), MapKey::Str(b)) => a.cmp(b),
            (MapKey::Integer(_), MapKey::Str(_)) => core::cmp::Ordering::Less,
            (MapKey::Str(_), MapKey::Integer(_)) => core::cmp::Ordering::Greater,
        }
    }
}

impl PartialOrd for MapKey {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A variable term.
#[must_use]
pub fn var(name: &str) -> Term {
    Term::Variable(name.to_string())
}

/// An integer term.
#[must_use]
pub fn int(i: i64) -> Term {
    Term::Integer(i)
}

/// A string term.
#[must_use]
pub fn string(s: &str) -> Term {
    Term::Str(s.to_string())
}

/// A date term from a system time (clamped to the epoch).
#[must_use]
pub fn date(t: &SystemTime) -> Term {
    let seconds = t
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs());
    Term::Date(seconds)
}

/// A byte-string term.
#[must_use]
pub fn bytes(b: &[u8]) -> Term {
    Term::Bytes(b.to_vec())
}

/// A boolean term.
#[must_use]
pub fn boolean(b: bool) -> Term {
    Term::Bool(b)
}

/// The null term.
#[must_use]
pub fn null() -> Term {
    Term::Null
}

/// A set term.
#[must_use]
pub fn set(terms: BTreeSet<Term>) -> Term {
    Term::Set(terms)
}

/// An array term.
#[must_use]
pub fn array(terms: Vec<Term>) -> Term {
    Term::Array(terms)
}

/// A map term.
#[must_use]
pub fn map(entries: BTreeMap<MapKey, Term>) -> Term {
    Term::Map(entries)
}

impl From<i64> for Term {
    fn from(i: i64) -> Self {
        Term::Integer(i)
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::Str(s.to_string())
    }
}

impl From<String> for Term {
    fn from(s: String) -> Self {
        Term::Str(s)
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Term::Bool(b)
    }
}

impl From<Vec<u8>> for Term {
    fn from(b: Vec<u8>) -> Self {
        Term::Bytes(b)
    }
}

impl From<&SystemTime> for Term {
    fn from(t: &SystemTime) -> Self {
        date(t)
    }
}

/// A named tuple of terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    /// Predicate name.
    pub name: String,
    /// Ordered terms.
    pub terms: Vec<Term>,
}

impl Predicate {
    /// Create a predicate.
    pub fn new<T: Into<Term>>(name: &str, terms: impl IntoIterator<Item = T>) -> Self {
        Self {
            name: name.to_string(),
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }
}

/// A predicate.
pub fn pred<T: Into<Term>>(name: &str, terms: impl IntoIterator<Item = T>) -> Predicate {
    Predicate::new(name, terms)
}

/// A ground predicate instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    /// The underlying predicate.
    pub predicate: Predicate,
}

/// A fact; terms must be ground (checked at conversion).
pub fn fact<T: Into<Term>>(name: &str, terms: impl IntoIterator<Item = T>) -> Fact {
    Fact {
        predicate: Predicate::new(name, terms),
    }
}

/// One step of a postfix expression program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    /// Push a term.
    Value(Term),
    /// Pop one entry, push the result.
    Unary(Unary),
    /// Pop two entries (right on top), push the result.
    Binary(Binary),
    /// Push a closure: parameter names plus a postfix body.
    Closure(Vec<String>, Vec<Op>),
}

/// A complete expression: a postfix op list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expression {
    /// The ops, in evaluation order.
    pub ops: Vec<Op>,
}

/// A derivation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// The predicate to derive.
    pub head: Predicate,
    /// Predicates every binding must satisfy.
    pub body: Vec<Predicate>,
    /// Expressions every binding must satisfy.
    pub expressions: Vec<Expression>,
    /// Scope override for this rule; empty means the block default.
    pub scopes: Vec<Scope>,
}

impl Rule {
    /// Create a rule.
    #[must_use]
    pub fn new(
        head: Predicate,
        body: Vec<Predicate>,
        expressions: Vec<Expression>,
        scopes: Vec<Scope>,
    ) -> Self {
        Self {
            head,
            body,
            expressions,
            scopes,
        }
    }
}

/// A rule deriving `head` from `body`, without expressions.
#[must_use]
pub fn rule(head: Predicate, body: Vec<Predicate>) -> Rule {
    Rule::new(head, body, vec![], vec![])
}

/// A constraint carried by a block or an authorizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    /// The kind of this check.
    pub kind: CheckKind,
    /// Alternative queries.
    pub queries: Vec<Rule>,
}

/// The kind of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    /// `allow if`: authorization succeeds when a query matches.
    Allow,
    /// `deny if`: authorization fails when a query matches.
    Deny,
}

/// An authorizer policy, evaluated in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// The kind of this policy.
    pub kind: PolicyKind,
    /// Alternative queries.
    pub queries: Vec<Rule>,
}

/// A trust declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// The authority block and the authorizer.
    Authority,
    /// Every earlier block, plus the authorizer.
    Previous,
    /// Blocks co-signed by this key.
    PublicKey(PublicKey),
}

/// Head predicate name reserved for check and policy queries.
pub(crate) const QUERY_HEAD: &str = "query";

/// A query: a headless rule used by checks and policies.
#[must_use]
pub(crate) fn query(body: Vec<Predicate>, expressions: Vec<Expression>, scopes: Vec<Scope>) -> Rule {
    Rule::new(Predicate::new::<Term>(QUERY_HEAD, []), body, expressions, scopes)
}

// ---------------------------------------------------------------------
// Conversions into the interned representation
// ---------------------------------------------------------------------

fn intern_variable(symbols: &mut SymbolTable, name: &str) -> Result<u32> {
    let index = symbols.insert(name);
    u32::try_from(index)
        .map_err(|_| Error::Format(FormatError::Serialization("symbol table overflow".into())))
}

impl Term {
    /// Convert into an interned term.
    ///
    /// # Errors
    ///
    /// Returns `variable in fact` errors for variables nested inside
    /// collections, where no binding can ever reach them.
    pub fn convert(&self, symbols: &mut SymbolTable) -> Result<datalog::Term> {
        match self {
            Term::Variable(name) => Ok(datalog::Term::Variable(intern_variable(symbols, name)?)),
            other => Ok(datalog::Term::Value(other.to_value(symbols)?)),
        }
    }

    fn to_value(&self, symbols: &mut SymbolTable) -> Result<datalog::Value> {
        match self {
            Term::Variable(_) => Err(Error::Format(FormatError::VariableInFact)),
            Term::Integer(i) => Ok(datalog::Value::Integer(*i)),
            Term::Str(s) => Ok(datalog::Value::Str(symbols.insert(s))),
            Term::Date(d) => Ok(datalog::Value::Date(*d)),
            Term::Bytes(b) => Ok(datalog::Value::Bytes(b.clone())),
            Term::Bool(b) => Ok(datalog::Value::Bool(*b)),
            Term::Null => Ok(datalog::Value::Null),
            Term::Set(terms) => {
                let mut converted = BTreeSet::new();
                for term in terms {
                    if matches!(term, Term::Set(_)) {
                        return Err(Error::Format(FormatError::SetInSet));
                    }
                    converted.insert(term.to_value(symbols)?);
                }
                Ok(datalog::Value::Set(converted))
            }
            Term::Array(terms) => {
                let mut converted = Vec::with_capacity(terms.len());
                for term in terms {
                    converted.push(term.to_value(symbols)?);
                }
                Ok(datalog::Value::Array(converted))
            }
            Term::Map(entries) => {
                let mut converted = BTreeMap::new();
                for (key, value) in entries {
                    let key = match key {
                        MapKey::Integer(i) => datalog::MapKey::Integer(*i),
                        MapKey::Str(s) => datalog::MapKey::Str(symbols.insert(s)),
                    };
                    converted.insert(key, value.to_value(symbols)?);
                }
                Ok(datalog::Value::Map(converted))
            }
        }
    }

    /// Rebuild a term from its interned form.
    ///
    /// # Errors
    ///
    /// Returns `unknown symbol` for indexes outside the table.
    pub fn convert_from(term: &datalog::Term, symbols: &SymbolTable) -> Result<Self> {
        match term {
            datalog::Term::Variable(v) => Ok(Term::Variable(
                symbols
                    .lookup(u64::from(*v))
                    .map_err(Error::Format)?
                    .to_string(),
            )),
            datalog::Term::Value(v) => Self::from_value(v, symbols),
        }
    }

    fn from_value(value: &datalog::Value, symbols: &SymbolTable) -> Result<Self> {
        match value {
            datalog::Value::Integer(i) => Ok(Term::Integer(*i)),
            datalog::Value::Str(s) => Ok(Term::Str(
                symbols.lookup(*s).map_err(Error::Format)?.to_string(),
            )),
            datalog::Value::Date(d) => Ok(Term::Date(*d)),
            datalog::Value::Bytes(b) => Ok(Term::Bytes(b.clone())),
            datalog::Value::Bool(b) => Ok(Term::Bool(*b)),
            datalog::Value::Null => Ok(Term::Null),
            datalog::Value::Set(values) => {
                let mut terms = BTreeSet::new();
                for v in values {
                    terms.insert(Self::from_value(v, symbols)?);
                }
                Ok(Term::Set(terms))
            }
            datalog::Value::Array(values) => {
                let mut terms = Vec::with_capacity(values.len());
                for v in values {
                    terms.push(Self::from_value(v, symbols)?);
                }
                Ok(Term::Array(terms))
            }
            datalog::Value::Map(entries) => {
                let mut terms = BTreeMap::new();
                for (key, v) in entries {
                    let key = match key {
                        datalog::MapKey::Integer(i) => MapKey::Integer(*i),
                        datalog::MapKey::Str(s) => {
                            MapKey::Str(symbols.lookup(*s).map_err(Error::Format)?.to_string())
                        }
                    };
                    terms.insert(key, Self::from_value(v, symbols)?);
                }
                Ok(Term::Map(terms))
            }
        }
    }
}

impl Predicate {
    /// Convert into the interned representation.
    ///
    /// # Errors
    ///
    /// Propagates term conversion errors.
    pub fn convert(&self, symbols: &mut SymbolTable) -> Result<datalog::Predicate> {
        let name = symbols.insert(&self.name);
        let mut terms = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            terms.push(term.convert(symbols)?);
        }
        Ok(datalog::Predicate::new(name, terms))
    }

    /// Rebuild from the interned representation.
    ///
    /// # Errors
    ///
    /// Returns `unknown symbol` for indexes outside the table.
    pub fn convert_from(predicate: &datalog::Predicate, symbols: &SymbolTable) -> Result<Self> {
        let name = symbols
            .lookup(predicate.name)
            .map_err(Error::Format)?
            .to_string();
        let mut terms = Vec::with_capacity(predicate.terms.len());
        for term in &predicate.terms {
            terms.push(Term::convert_from(term, symbols)?);
        }
        Ok(Self { name, terms })
    }
}

impl Fact {
    /// Convert into the interned representation, validating that every
    /// term is ground.
    ///
    /// # Errors
    ///
    /// Returns `variable in fact` if any term is a variable.
    pub fn convert(&self, symbols: &mut SymbolTable) -> Result<datalog::Fact> {
        let predicate = self.predicate.convert(symbols)?;
        datalog::Fact::new(predicate).map_err(Error::Format)
    }

    /// Rebuild from the interned representation.
    ///
    /// # Errors
    ///
    /// Returns `unknown symbol` for indexes outside the table.
    pub fn convert_from(fact: &datalog::Fact, symbols: &SymbolTable) -> Result<Self> {
        Ok(Self {
            predicate: Predicate::convert_from(&fact.predicate, symbols)?,
        })
    }
}

fn convert_ops(ops: &[Op], symbols: &mut SymbolTable) -> Result<Vec<datalog::Op>> {
    let mut converted = Vec::with_capacity(ops.len());
    for op in ops {
        converted.push(match op {
            Op::Value(term) => datalog::Op::Value(term.convert(symbols)?),
            Op::Unary(u) => datalog::Op::Unary(*u),
            Op::Binary(b) => datalog::Op::Binary(*b),
            Op::Closure(params, body) => {
                let mut ids = Vec::with_capacity(params.len());
                for param in params {
                    ids.push(intern_variable(symbols, param)?);
                }
                datalog::Op::Closure(datalog::Closure {
                    params: ids,
                    ops: convert_ops(body, symbols)?,
                })
            }
        });
    }
    Ok(converted)
}

fn convert_ops_from(ops: &[datalog::Op], symbols: &SymbolTable) -> Result<Vec<Op>> {
    let mut converted = Vec::with_capacity(ops.len());
    for op in ops {
        converted.push(match op {
            datalog::Op::Value(term) => Op::Value(Term::convert_from(term, symbols)?),
            datalog::Op::Unary(u) => Op::Unary(*u),
            datalog::Op::Binary(b) => Op::Binary(*b),
            datalog::Op::Closure(closure) => {
                let mut params = Vec::with_capacity(closure.params.len());
                for param in &closure.params {
                    params.push(
                        symbols
                            .lookup(u64::from(*param))
                            .map_err(Error::Format)?
                            .to_string(),
                    );
                }
                Op::Closure(params, convert_ops_from(&closure.ops, symbols)?)
            }
        });
    }
    Ok(converted)
}

impl Expression {
    /// Convert into the interned representation.
    ///
    /// # Errors
    ///
    /// Propagates term conversion errors.
    pub fn convert(&self, symbols: &mut SymbolTable) -> Result<datalog::Expression> {
        Ok(datalog::Expression {
            ops: convert_ops(&self.ops, symbols)?,
        })
    }

    /// Rebuild from the interned representation.
    ///
    /// # Errors
    ///
    /// Returns `unknown symbol` for indexes outside the table.
    pub fn convert_from(expression: &datalog::Expression, symbols: &SymbolTable) -> Result<Self> {
        Ok(Self {
            ops: convert_ops_from(&expression.ops, symbols)?,
        })
    }
}

impl Scope {
    /// Convert into the interned representation.
    pub fn convert(&self, symbols: &mut SymbolTable) -> datalog::Scope {
        match self {
            Scope::Authority => datalog::Scope::Authority,
            Scope::Previous => datalog::Scope::Previous,
            Scope::PublicKey(key) => datalog::Scope::PublicKey(symbols.insert_key(key)),
        }
    }

    /// Rebuild from the interned representation.
    ///
    /// # Errors
    ///
    /// Returns `unknown public key` for indexes outside the table.
    pub fn convert_from(scope: &datalog::Scope, symbols: &SymbolTable) -> Result<Self> {
        match scope {
            datalog::Scope::Authority => Ok(Scope::Authority),
            datalog::Scope::Previous => Ok(Scope::Previous),
            datalog::Scope::PublicKey(index) => symbols
                .get_public_key(*index)
                .map(|key| Scope::PublicKey(key.clone()))
                .ok_or(Error::Format(FormatError::UnknownPublicKey(*index))),
        }
    }
}

impl Rule {
    /// Convert into the interned representation, validating head
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns `unbound variable in head` when a head variable is not
    /// bound by the body, and propagates term conversion errors.
    pub fn convert(&self, symbols: &mut SymbolTable) -> Result<datalog::Rule> {
        let head = self.head.convert(symbols)?;
        let mut body = Vec::with_capacity(self.body.len());
        for predicate in &self.body {
            body.push(predicate.convert(symbols)?);
        }
        let mut expressions = Vec::with_capacity(self.expressions.len());
        for expression in &self.expressions {
            expressions.push(expression.convert(symbols)?);
        }
        let scopes = self.scopes.iter().map(|s| s.convert(symbols)).collect();
        let rule = datalog::Rule::new(head, body, expressions, scopes);
        rule.validate_variables(symbols).map_err(Error::Format)?;
        Ok(rule)
    }

    /// Rebuild from the interned representation.
    ///
    /// # Errors
    ///
    /// Returns `unknown symbol` for indexes outside the table.
    pub fn convert_from(rule: &datalog::Rule, symbols: &SymbolTable) -> Result<Self> {
        let head = Predicate::convert_from(&rule.head, symbols)?;
        let mut body = Vec::with_capacity(rule.body.len());
        for predicate in &rule.body {
            body.push(Predicate::convert_from(predicate, symbols)?);
        }
        let mut expressions = Vec::with_capacity(rule.expressions.len());
        for expression in &rule.expressions {
            expressions.push(Expression::convert_from(expression, symbols)?);
        }
        let mut scopes = Vec::with_capacity(rule.scopes.len());
        for scope in &rule.scopes {
            scopes.push(Scope::convert_from(scope, symbols)?);
        }
        Ok(Self {
            head,
            body,
            expressions,
            scopes,
        })
    }
}

impl Check {
    /// Convert into the interned representation.
    ///
    /// # Errors
    ///
    /// Propagates query conversion errors.
    pub fn convert(&self, symbols: &mut SymbolTable) -> Result<datalog::Check> {
        let mut queries = Vec::with_capacity(self.queries.len());
        for query in &self.queries {
            queries.push(query.convert(symbols)?);
        }
        Ok(datalog::Check {
            queries,
            kind: self.kind,
        })
    }

    /// Rebuild from the interned representation.
    ///
    /// # Errors
    ///
    /// Returns `unknown symbol` for indexes outside the table.
    pub fn convert_from(check: &datalog::Check, symbols: &SymbolTable) -> Result<Self> {
        let mut queries = Vec::with_capacity(check.queries.len());
        for query in &check.queries {
            queries.push(Rule::convert_from(query, symbols)?);
        }
        Ok(Self {
            kind: check.kind,
            queries,
        })
    }
}

impl Policy {
    /// Convert the policy's queries into the interned representation.
    ///
    /// # Errors
    ///
    /// Propagates query conversion errors.
    pub fn convert(&self, symbols: &mut SymbolTable) -> Result<Vec<datalog::Rule>> {
        let mut queries = Vec::with_capacity(self.queries.len());
        for query in &self.queries {
            queries.push(query.convert(symbols)?);
        }
        Ok(queries)
    }
}

impl FromStr for Fact {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parser::parse_fact(s).map_err(Error::Language)
    }
}

impl FromStr for Rule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parser::parse_rule(s).map_err(Error::Language)
    }
}

impl FromStr for Check {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parser::parse_check(s).map_err(Error::Language)
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parser::parse_policy(s).map_err(Error::Language)
    }
}

/// Accumulates the Datalog content of one block before it is interned
/// and signed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockBuilder {
    /// Facts the block states.
    pub facts: Vec<Fact>,
    /// Rules the block provides.
    pub rules: Vec<Rule>,
    /// Checks the block imposes.
    pub checks: Vec<Check>,
    /// The block's default trust scopes.
    pub scopes: Vec<Scope>,
    /// Free-form context string.
    pub context: Option<String>,
}

impl BlockBuilder {
    /// An empty block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fact.
    pub fn add_fact(&mut self, fact: Fact) -> &mut Self {
        self.facts.push(fact);
        self
    }

    /// Add a rule.
    pub fn add_rule(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Add a check.
    pub fn add_check(&mut self, check: Check) -> &mut Self {
        self.checks.push(check);
        self
    }

    /// Add a block-wide trust scope.
    pub fn add_scope(&mut self, scope: Scope) -> &mut Self {
        self.scopes.push(scope);
        self
    }

    /// Set the context string.
    pub fn set_context(&mut self, context: &str) -> &mut Self {
        self.context = Some(context.to_string());
        self
    }

    /// Parse block-grammar source and append its statements.
    ///
    /// # Errors
    ///
    /// Returns the parse error, leaving the builder untouched.
    pub fn add_code(&mut self, source: &str) -> Result<&mut Self> {
        let parsed = parser::parse_block_source(source).map_err(Error::Language)?;
        self.facts.extend(parsed.facts);
        self.rules.extend(parsed.rules);
        self.checks.extend(parsed.checks);
        self.scopes.extend(parsed.scopes);
        Ok(self)
    }

    /// Append everything from another builder.
    pub fn merge(&mut self, other: BlockBuilder) -> &mut Self {
        self.facts.extend(other.facts);
        self.rules.extend(other.rules);
        self.checks.extend(other.checks);
        self.scopes.extend(other.scopes);
        if let Some(context) = other.context {
            self.context = Some(context);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_conversion_interns_strings() {
        let mut symbols = SymbolTable::new();
        let f = fact("user", [string("alice")]);
        let converted = f.convert(&mut symbols).unwrap();
        // "user" is a default symbol; "alice" is interned.
        assert_eq!(converted.predicate.name, 10);
        assert_eq!(
            converted.predicate.terms,
            vec![datalog::Term::Value(datalog::Value::Str(1024))]
        );
        let back = Fact::convert_from(&converted, &symbols).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn fact_with_variable_is_rejected() {
        let mut symbols = SymbolTable::new();
        let f = fact("user", [var("who")]);
        assert!(matches!(
            f.convert(&mut symbols),
            Err(Error::Format(FormatError::VariableInFact))
        ));
    }

    #[test]
    fn nested_set_is_rejected() {
        let mut symbols = SymbolTable::new();
        let inner: BTreeSet<Term> = [int(1)].into_iter().collect();
        let outer: BTreeSet<Term> = [set(inner)].into_iter().collect();
        let f = fact("user", [set(outer)]);
        assert!(matches!(
            f.convert(&mut symbols),
            Err(Error::Format(FormatError::SetInSet))
        ));
    }

    #[test]
    fn rule_head_must_be_bound() {
        let mut symbols = SymbolTable::new();
        let r = rule(
            pred("right", [var("resource")]),
            vec![pred("owner", [var("user")])],
        );
        assert!(matches!(
            r.convert(&mut symbols),
            Err(Error::Format(FormatError::UnboundVariableInHead(_)))
        ));
    }

    #[test]
    fn rule_roundtrip_through_interning() {
        let mut symbols = SymbolTable::new();
        let r = rule(
            pred("right", [var("resource"), string("read")]),
            vec![pred("owner", [var("user"), var("resource")])],
        );
        let converted = r.convert(&mut symbols).unwrap();
        let back = Rule::convert_from(&converted, &symbols).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn term_from_impls() {
        assert_eq!(Term::from(12i64), int(12));
        assert_eq!(Term::from("x"), string("x"));
        assert_eq!(Term::from(true), boolean(true));
        assert_eq!(Term::from(vec![1u8, 2]), bytes(&[1, 2]));
    }

    #[test]
    fn block_builder_accumulates_code() {
        let mut builder = BlockBuilder::new();
        builder.add_code("user(1234); check if operation(\"read\");").unwrap();
        assert_eq!(builder.facts.len(), 1);
        assert_eq!(builder.checks.len(), 1);
        builder.add_fact(fact("group", [int(2)]));
        assert_eq!(builder.facts.len(), 2);
    }

    #[test]
    fn builder_term_ordering_matches_value_ordering() {
        // Same tag ranks as the interned algebra.
        assert!(var("a") < int(0));
        assert!(int(i64::MAX) < string(""));
        assert!(string("z") < Term::Date(0));
        assert!(Term::Bytes(vec![0xff]) < boolean(false));
        assert!(boolean(true) < set(BTreeSet::new()));
        assert!(set(BTreeSet::new()) < null());
        assert!(null() < array(vec![]));
        assert!(array(vec![int(1)]) < map(BTreeMap::new()));
    }
}
