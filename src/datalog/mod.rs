//! The Datalog dialect: term algebra, program elements and the
//! resolution engine.
//!
//! Everything in this module works on interned indexes (see
//! [`symbol`]); the string-level mirror of these types lives in
//! [`crate::builder`]. Program elements are plain data. Evaluation is
//! driven by [`engine`], expression semantics by [`expression`].

pub mod engine;
pub mod expression;
pub mod symbol;
pub mod value;

use std::collections::BTreeMap;

pub use engine::{Engine, ExecutionLimits, Origin, TrustedOrigins, AUTHORIZER_ORIGIN};
pub use expression::{Binary, Closure, Expression, Op, Unary};
pub use symbol::{SymbolTable, TemporarySymbolTable, DEFAULT_SYMBOLS, USER_SYMBOL_OFFSET};
pub use value::{MapKey, SymbolIndex, Value};

use crate::error::FormatError;

/// A term: either a concrete value or a named variable.
///
/// Variable names are interned like any other string; the `u32` is the
/// truncated symbol index, which the wire format also uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// A variable, to be bound during evaluation.
    Variable(u32),
    /// A concrete value.
    Value(Value),
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        match (self, other) {
            (Term::Variable(a), Term::Variable(b)) => a.cmp(b),
            // Variables order before every concrete value.
            (Term::Variable(_), Term::Value(_)) => core::cmp::Ordering::Less,
            (Term::Value(_), Term::Variable(_)) => core::cmp::Ordering::Greater,
            (Term::Value(a), Term::Value(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A named tuple of terms.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Predicate {
    /// Interned predicate name.
    pub name: SymbolIndex,
    /// Ordered terms.
    pub terms: Vec<Term>,
}

impl Predicate {
    /// Create a predicate.
    #[must_use]
    pub fn new(name: SymbolIndex, terms: Vec<Term>) -> Self {
        Self { name, terms }
    }

    /// Variables appearing in this predicate.
    pub fn variables(&self) -> impl Iterator<Item = u32> + '_ {
        self.terms.iter().filter_map(|t| match t {
            Term::Variable(v) => Some(*v),
            Term::Value(_) => None,
        })
    }

    /// Unify this predicate against a ground fact, extending `bindings`.
    ///
    /// Returns the extended bindings when the fact supports the
    /// predicate: arities match, concrete terms are equal, and variables
    /// are consistent with any existing binding.
    #[must_use]
    pub fn unify(
        &self,
        fact: &Fact,
        bindings: &BTreeMap<u32, Value>,
    ) -> Option<BTreeMap<u32, Value>> {
        if self.name != fact.predicate.name || self.terms.len() != fact.predicate.terms.len() {
            return None;
        }
        let mut extended = bindings.clone();
        for (term, fact_term) in self.terms.iter().zip(fact.predicate.terms.iter()) {
            let Term::Value(fact_value) = fact_term else {
                return None;
            };
            match term {
                Term::Value(v) => {
                    if v != fact_value {
                        return None;
                    }
                }
                Term::Variable(v) => match extended.get(v) {
                    Some(bound) if bound != fact_value => return None,
                    Some(_) => {}
                    None => {
                        extended.insert(*v, fact_value.clone());
                    }
                },
            }
        }
        Some(extended)
    }
}

/// A ground predicate instance, known true in some origin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fact {
    /// The underlying predicate; every term is a value.
    pub predicate: Predicate,
}

impl Fact {
    /// Create a fact, rejecting predicates that carry variables.
    ///
    /// # Errors
    ///
    /// Returns `FormatError::VariableInFact` if any term is a variable.
    pub fn new(predicate: Predicate) -> Result<Self, FormatError> {
        if predicate
            .terms
            .iter()
            .any(|t| matches!(t, Term::Variable(_)))
        {
            return Err(FormatError::VariableInFact);
        }
        Ok(Self { predicate })
    }
}

/// A derivation rule: head, body predicates, expressions and trusted
/// scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
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

    /// Check that every head variable is bound by some body predicate.
    ///
    /// # Errors
    ///
    /// Returns `FormatError::UnboundVariableInHead` naming the first
    /// unbound variable.
    pub fn validate_variables(&self, symbols: &SymbolTable) -> Result<(), FormatError> {
        for variable in self.head.variables() {
            let bound = self.body.iter().any(|p| p.variables().any(|v| v == variable));
            if !bound {
                let name = symbols
                    .get_symbol(u64::from(variable))
                    .unwrap_or("<unknown>")
                    .to_string();
                return Err(FormatError::UnboundVariableInHead(name));
            }
        }
        Ok(())
    }
}

/// The kind of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CheckKind {
    /// `check if`: passes when some binding satisfies some query.
    One,
    /// `check all`: passes when at least one binding matches and every
    /// matching binding satisfies the expressions.
    All,
    /// `reject if`: passes when no query matches.
    Reject,
}

/// A constraint that must hold for authorization to succeed.
///
/// Queries are stored as rules whose head is the reserved `query`
/// predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    /// Alternative queries; see [`CheckKind`] for how they combine.
    pub queries: Vec<Rule>,
    /// The kind of this check.
    pub kind: CheckKind,
}

/// A trust declaration restricting which origins a rule or check reads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    /// The authority block (block 0) and the authorizer.
    Authority,
    /// Every earlier block, plus the authorizer.
    Previous,
    /// Blocks whose external signature verified under the interned key.
    PublicKey(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(name: u64, values: &[i64]) -> Fact {
        Fact::new(Predicate::new(
            name,
            values.iter().map(|v| Term::Value(Value::Integer(*v))).collect(),
        ))
        .unwrap()
    }

    #[test]
    fn fact_rejects_variables() {
        let err = Fact::new(Predicate::new(0, vec![Term::Variable(7)])).unwrap_err();
        assert_eq!(err, FormatError::VariableInFact);
    }

    #[test]
    fn unify_binds_variables() {
        let predicate = Predicate::new(0, vec![Term::Variable(1), Term::Variable(2)]);
        let bindings = predicate.unify(&fact(0, &[10, 20]), &BTreeMap::new()).unwrap();
        assert_eq!(bindings.get(&1), Some(&Value::Integer(10)));
        assert_eq!(bindings.get(&2), Some(&Value::Integer(20)));
    }

    #[test]
    fn unify_rejects_mismatched_name_or_arity() {
        let predicate = Predicate::new(0, vec![Term::Variable(1)]);
        assert!(predicate.unify(&fact(1, &[10]), &BTreeMap::new()).is_none());
        assert!(predicate.unify(&fact(0, &[10, 20]), &BTreeMap::new()).is_none());
    }

    #[test]
    fn unify_is_consistent_with_existing_bindings() {
        let predicate = Predicate::new(0, vec![Term::Variable(1), Term::Variable(1)]);
        // Same variable twice: both positions must carry the same value.
        assert!(predicate.unify(&fact(0, &[5, 5]), &BTreeMap::new()).is_some());
        assert!(predicate.unify(&fact(0, &[5, 6]), &BTreeMap::new()).is_none());
    }

    #[test]
    fn unify_checks_concrete_terms() {
        let predicate = Predicate::new(0, vec![Term::Value(Value::Integer(42))]);
        assert!(predicate.unify(&fact(0, &[42]), &BTreeMap::new()).is_some());
        assert!(predicate.unify(&fact(0, &[43]), &BTreeMap::new()).is_none());
    }

    #[test]
    fn rule_head_variables_must_be_bound() {
        let symbols = SymbolTable::new();
        let rule = Rule::new(
            Predicate::new(4, vec![Term::Variable(10)]),
            vec![Predicate::new(2, vec![Term::Variable(11)])],
            vec![],
            vec![],
        );
        assert!(matches!(
            rule.validate_variables(&symbols),
            Err(FormatError::UnboundVariableInHead(_))
        ));

        let rule = Rule::new(
            Predicate::new(4, vec![Term::Variable(10)]),
            vec![Predicate::new(2, vec![Term::Variable(10)])],
            vec![],
            vec![],
        );
        assert!(rule.validate_variables(&symbols).is_ok());
    }

    #[test]
    fn term_ordering_puts_variables_first() {
        assert!(Term::Variable(u32::MAX) < Term::Value(Value::Integer(i64::MIN)));
    }
}
