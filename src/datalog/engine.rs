//! The resolution engine: a semi-naive Datalog fixpoint over
//! scope-partitioned fact sets.
//!
//! Facts are indexed by (name, arity, origin), where the origin is
//! either a block index or the authorizer. Rules only read facts from
//! their expanded trusted origins, and record what they derive under
//! their own block's origin. The fixpoint keeps three sets — `stable`,
//! `recent` and `pending` — and requires every derivation to consume at
//! least one `recent` fact, so each iteration does work proportional to
//! the delta instead of the whole database.
//!
//! Iteration order is deterministic (BTree-ordered sets), so which
//! binding a failing check reports is reproducible.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::datalog::expression::Expression;
use crate::datalog::symbol::{SymbolTable, TemporarySymbolTable};
use crate::datalog::value::{SymbolIndex, Value};
use crate::datalog::{Check, CheckKind, Fact, Predicate, Rule, Scope, Term};
use crate::error::ExecutionError;

/// Identifies where a fact or rule came from: a block index, or
/// [`AUTHORIZER_ORIGIN`] for the authorizer.
pub type Origin = usize;

/// The synthetic origin of the authorizer's own facts and rules.
pub const AUTHORIZER_ORIGIN: Origin = usize::MAX;

/// The set of origins a rule, check or query is allowed to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedOrigins(BTreeSet<Origin>);

impl TrustedOrigins {
    /// Expand trust declarations into a concrete origin set.
    ///
    /// The executing block and the authorizer are always visible. An
    /// empty scope list additionally exposes the authority block.
    /// `authority` adds block 0, `previous` every block before
    /// `current` (nothing in authorizer context), and a public key adds
    /// every block whose external signature verified under that key.
    #[must_use]
    pub fn from_scopes(
        rule_scopes: &[Scope],
        default_scopes: &[Scope],
        current: Origin,
        verified_blocks: &BTreeMap<u64, Vec<Origin>>,
    ) -> Self {
        let mut origins = BTreeSet::new();
        origins.insert(current);
        origins.insert(AUTHORIZER_ORIGIN);

        let scopes = if rule_scopes.is_empty() {
            default_scopes
        } else {
            rule_scopes
        };
        if scopes.is_empty() {
            origins.insert(0);
        }
        for scope in scopes {
            match scope {
                Scope::Authority => {
                    origins.insert(0);
                }
                Scope::Previous => {
                    if current != AUTHORIZER_ORIGIN {
                        origins.extend(0..current);
                    }
                }
                Scope::PublicKey(key) => {
                    if let Some(blocks) = verified_blocks.get(key) {
                        origins.extend(blocks.iter().copied());
                    }
                }
            }
        }
        Self(origins)
    }

    /// Whether facts from `origin` are visible.
    #[must_use]
    pub fn contains(&self, origin: Origin) -> bool {
        self.0.contains(&origin)
    }
}

/// Index key of a fact bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct FactId {
    name: SymbolIndex,
    arity: usize,
    origin: Origin,
}

/// Facts bucketed by (name, arity, origin), deterministically ordered.
#[derive(Debug, Clone, Default)]
struct FactSet {
    inner: BTreeMap<FactId, BTreeSet<Fact>>,
    count: usize,
}

impl FactSet {
    fn id(origin: Origin, fact: &Fact) -> FactId {
        FactId {
            name: fact.predicate.name,
            arity: fact.predicate.terms.len(),
            origin,
        }
    }

    /// Insert, returning false when the fact was already present.
    fn insert(&mut self, origin: Origin, fact: Fact) -> bool {
        let id = Self::id(origin, &fact);
        let added = self.inner.entry(id).or_default().insert(fact);
        if added {
            self.count += 1;
        }
        added
    }

    fn contains(&self, origin: Origin, fact: &Fact) -> bool {
        self.inner
            .get(&Self::id(origin, fact))
            .is_some_and(|facts| facts.contains(fact))
    }

    fn len(&self) -> usize {
        self.count
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Facts matching the predicate's name and arity within trusted
    /// origins.
    fn matching<'a>(
        &'a self,
        predicate: &'a Predicate,
        trusted: &'a TrustedOrigins,
    ) -> impl Iterator<Item = &'a Fact> {
        self.inner
            .iter()
            .filter(move |(id, _)| {
                id.name == predicate.name
                    && id.arity == predicate.terms.len()
                    && trusted.contains(id.origin)
            })
            .flat_map(|(_, facts)| facts.iter())
    }

    /// Move every fact of `other` into this set.
    fn absorb(&mut self, other: FactSet) {
        for (id, facts) in other.inner {
            let bucket = self.inner.entry(id).or_default();
            for fact in facts {
                if bucket.insert(fact) {
                    self.count += 1;
                }
            }
        }
    }

    fn iter(&self) -> impl Iterator<Item = (Origin, &Fact)> {
        self.inner
            .iter()
            .flat_map(|(id, facts)| facts.iter().map(move |f| (id.origin, f)))
    }
}

/// Resource bounds on a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Abort with `too_many_facts` past this total.
    pub max_facts: Option<u64>,
    /// Abort with `too_many_iterations` past this iteration count.
    pub max_iterations: Option<u64>,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_facts: Some(1000),
            max_iterations: Some(100),
        }
    }
}

/// The evaluation state for one authorization run.
#[derive(Debug, Default)]
pub struct Engine {
    stable: FactSet,
    recent: FactSet,
    pending: FactSet,
    rules: Vec<(Origin, Rule)>,
    /// Default trust declarations per origin (the block's `trusting`
    /// line, or the authorizer's).
    block_scopes: BTreeMap<Origin, Vec<Scope>>,
    /// Interned public key id → blocks whose external signature
    /// verified under it.
    verified_blocks: BTreeMap<u64, Vec<Origin>>,
}

impl Engine {
    /// An empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a fact under an origin.
    pub fn add_fact(&mut self, origin: Origin, fact: Fact) {
        self.recent.insert(origin, fact);
    }

    /// Load a rule under an origin.
    pub fn add_rule(&mut self, origin: Origin, rule: Rule) {
        self.rules.push((origin, rule));
    }

    /// Declare an origin's default trust scopes.
    pub fn set_block_scopes(&mut self, origin: Origin, scopes: Vec<Scope>) {
        self.block_scopes.insert(origin, scopes);
    }

    /// Record that `block`'s external signature verified under the
    /// interned key `key`.
    pub fn add_verified_block(&mut self, key: u64, block: Origin) {
        self.verified_blocks.entry(key).or_default().push(block);
    }

    /// Total number of facts currently known.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.stable.len() + self.recent.len() + self.pending.len()
    }

    fn default_scopes(&self, origin: Origin) -> &[Scope] {
        self.block_scopes
            .get(&origin)
            .map_or(&[], Vec::as_slice)
    }

    fn trusted_for(&self, scopes: &[Scope], origin: Origin) -> TrustedOrigins {
        TrustedOrigins::from_scopes(
            scopes,
            self.default_scopes(origin),
            origin,
            &self.verified_blocks,
        )
    }

    /// Run rules to saturation.
    ///
    /// # Errors
    ///
    /// `too_many_facts` / `too_many_iterations` when a limit is
    /// exceeded, or any expression evaluation error.
    pub fn run(
        &mut self,
        symbols: &SymbolTable,
        limits: &ExecutionLimits,
    ) -> Result<(), ExecutionError> {
        let mut iterations: u64 = 0;
        while !self.recent.is_empty() {
            if let Some(max) = limits.max_iterations {
                if iterations >= max {
                    debug!(iterations, "fixpoint aborted: iteration limit");
                    return Err(ExecutionError::TooManyIterations(max));
                }
            }
            iterations += 1;

            let mut derived: Vec<(Origin, Fact)> = Vec::new();
            for (origin, rule) in &self.rules {
                let trusted = self.trusted_for(&rule.scopes, *origin);
                self.apply_rule(rule, *origin, &trusted, symbols, &mut derived)?;
            }

            for (origin, fact) in derived {
                if self.stable.contains(origin, &fact)
                    || self.recent.contains(origin, &fact)
                    || self.pending.contains(origin, &fact)
                {
                    continue;
                }
                if let Some(max) = limits.max_facts {
                    if self.fact_count() as u64 >= max {
                        debug!(max, "fixpoint aborted: fact limit");
                        return Err(ExecutionError::TooManyFacts(max));
                    }
                }
                self.pending.insert(origin, fact);
            }

            trace!(
                iteration = iterations,
                new_facts = self.pending.len(),
                "fixpoint iteration"
            );
            self.stable.absorb(core::mem::take(&mut self.recent));
            self.recent = core::mem::take(&mut self.pending);
        }
        debug!(iterations, facts = self.fact_count(), "fixpoint reached");
        Ok(())
    }

    /// Derive every new fact `rule` produces this iteration.
    fn apply_rule(
        &self,
        rule: &Rule,
        origin: Origin,
        trusted: &TrustedOrigins,
        symbols: &SymbolTable,
        out: &mut Vec<(Origin, Fact)>,
    ) -> Result<(), ExecutionError> {
        let mut bindings = Vec::new();
        self.join(
            &rule.body,
            trusted,
            BTreeMap::new(),
            false,
            true,
            &mut bindings,
        );

        for binding in bindings {
            if !Self::expressions_hold(&rule.expressions, &binding, symbols)? {
                continue;
            }
            let fact = Self::instantiate(&rule.head, &binding)?;
            out.push((origin, fact));
        }
        Ok(())
    }

    /// Depth-first join of body predicates over stable ∪ recent.
    ///
    /// With `semi_naive`, only bindings that consumed at least one
    /// recent fact are kept: everything else was derived in an earlier
    /// iteration.
    fn join(
        &self,
        body: &[Predicate],
        trusted: &TrustedOrigins,
        bindings: BTreeMap<u32, Value>,
        used_recent: bool,
        semi_naive: bool,
        out: &mut Vec<BTreeMap<u32, Value>>,
    ) {
        let Some((first, rest)) = body.split_first() else {
            if used_recent || !semi_naive {
                out.push(bindings);
            }
            return;
        };
        for fact in self.stable.matching(first, trusted) {
            if let Some(extended) = first.unify(fact, &bindings) {
                self.join(rest, trusted, extended, used_recent, semi_naive, out);
            }
        }
        for fact in self.recent.matching(first, trusted) {
            if let Some(extended) = first.unify(fact, &bindings) {
                self.join(rest, trusted, extended, true, semi_naive, out);
            }
        }
    }

    fn expressions_hold(
        expressions: &[Expression],
        binding: &BTreeMap<u32, Value>,
        symbols: &SymbolTable,
    ) -> Result<bool, ExecutionError> {
        let mut temp = TemporarySymbolTable::new(symbols);
        for expression in expressions {
            match expression.evaluate(binding, &mut temp)? {
                Value::Bool(true) => {}
                Value::Bool(false) => return Ok(false),
                _ => return Err(ExecutionError::NonBooleanExpression),
            }
        }
        Ok(true)
    }

    /// Substitute a binding into a rule head, producing a ground fact.
    fn instantiate(
        head: &Predicate,
        binding: &BTreeMap<u32, Value>,
    ) -> Result<Fact, ExecutionError> {
        let mut terms = Vec::with_capacity(head.terms.len());
        for term in &head.terms {
            match term {
                Term::Value(v) => terms.push(Term::Value(v.clone())),
                Term::Variable(v) => {
                    let value = binding
                        .get(v)
                        .cloned()
                        .ok_or(ExecutionError::UnknownVariable(*v))?;
                    terms.push(Term::Value(value));
                }
            }
        }
        Fact::new(Predicate::new(head.name, terms))
            .map_err(|_| ExecutionError::InvalidExpression)
    }

    /// All bindings satisfying a query's body within its trusted
    /// origins (no delta restriction).
    fn query_bindings(
        &self,
        query: &Rule,
        current: Origin,
    ) -> Vec<BTreeMap<u32, Value>> {
        let trusted = self.trusted_for(&query.scopes, current);
        let mut bindings = Vec::new();
        self.join(
            &query.body,
            &trusted,
            BTreeMap::new(),
            false,
            false,
            &mut bindings,
        );
        bindings
    }

    /// `check if` semantics: some binding satisfies body and
    /// expressions.
    ///
    /// # Errors
    ///
    /// Propagates expression evaluation errors.
    pub fn query_match(
        &self,
        query: &Rule,
        current: Origin,
        symbols: &SymbolTable,
    ) -> Result<bool, ExecutionError> {
        for binding in self.query_bindings(query, current) {
            if Self::expressions_hold(&query.expressions, &binding, symbols)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `check all` semantics: at least one binding matches the body,
    /// and every matching binding satisfies the expressions.
    ///
    /// # Errors
    ///
    /// Propagates expression evaluation errors.
    pub fn query_match_all(
        &self,
        query: &Rule,
        current: Origin,
        symbols: &SymbolTable,
    ) -> Result<bool, ExecutionError> {
        let bindings = self.query_bindings(query, current);
        if bindings.is_empty() {
            return Ok(false);
        }
        for binding in bindings {
            if !Self::expressions_hold(&query.expressions, &binding, symbols)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evaluate a whole check in the context of `current`.
    ///
    /// # Errors
    ///
    /// Propagates expression evaluation errors.
    pub fn check_succeeds(
        &self,
        check: &Check,
        current: Origin,
        symbols: &SymbolTable,
    ) -> Result<bool, ExecutionError> {
        match check.kind {
            CheckKind::One => {
                for query in &check.queries {
                    if self.query_match(query, current, symbols)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            CheckKind::All => {
                for query in &check.queries {
                    if self.query_match_all(query, current, symbols)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            CheckKind::Reject => {
                for query in &check.queries {
                    if self.query_match(query, current, symbols)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Iterate every known fact with its origin.
    pub fn facts(&self) -> impl Iterator<Item = (Origin, &Fact)> {
        self.stable.iter().chain(self.recent.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::expression::{Binary, Op};

    fn int_fact(name: u64, values: &[i64]) -> Fact {
        Fact::new(Predicate::new(
            name,
            values
                .iter()
                .map(|v| Term::Value(Value::Integer(*v)))
                .collect(),
        ))
        .unwrap()
    }

    // parent(a, b) facts and an ancestor closure:
    //   ancestor($a, $b) <- parent($a, $b)
    //   ancestor($a, $c) <- parent($a, $b), ancestor($b, $c)
    fn ancestor_engine(symbols: &mut SymbolTable) -> Engine {
        let parent = symbols.insert("parent");
        let ancestor = symbols.insert("ancestor");
        let mut engine = Engine::new();
        engine.add_fact(0, int_fact(parent, &[1, 2]));
        engine.add_fact(0, int_fact(parent, &[2, 3]));
        engine.add_fact(0, int_fact(parent, &[3, 4]));
        engine.add_rule(
            0,
            Rule::new(
                Predicate::new(ancestor, vec![Term::Variable(0), Term::Variable(1)]),
                vec![Predicate::new(
                    parent,
                    vec![Term::Variable(0), Term::Variable(1)],
                )],
                vec![],
                vec![],
            ),
        );
        engine.add_rule(
            0,
            Rule::new(
                Predicate::new(ancestor, vec![Term::Variable(0), Term::Variable(2)]),
                vec![
                    Predicate::new(parent, vec![Term::Variable(0), Term::Variable(1)]),
                    Predicate::new(ancestor, vec![Term::Variable(1), Term::Variable(2)]),
                ],
                vec![],
                vec![],
            ),
        );
        engine
    }

    #[test]
    fn fixpoint_saturates_transitive_closure() {
        let mut symbols = SymbolTable::new();
        let mut engine = ancestor_engine(&mut symbols);
        engine.run(&symbols, &ExecutionLimits::default()).unwrap();

        let ancestor = symbols.get("ancestor").unwrap();
        let query = Rule::new(
            Predicate::new(1024, vec![]),
            vec![Predicate::new(
                ancestor,
                vec![
                    Term::Value(Value::Integer(1)),
                    Term::Value(Value::Integer(4)),
                ],
            )],
            vec![],
            vec![],
        );
        assert!(engine.query_match(&query, 0, &symbols).unwrap());
        // 3 parent + 6 ancestor facts.
        assert_eq!(engine.fact_count(), 9);
    }

    #[test]
    fn iteration_limit_aborts() {
        let mut symbols = SymbolTable::new();
        let mut engine = ancestor_engine(&mut symbols);
        let limits = ExecutionLimits {
            max_facts: None,
            max_iterations: Some(1),
        };
        assert_eq!(
            engine.run(&symbols, &limits),
            Err(ExecutionError::TooManyIterations(1))
        );
    }

    #[test]
    fn fact_limit_aborts() {
        let mut symbols = SymbolTable::new();
        let mut engine = ancestor_engine(&mut symbols);
        let limits = ExecutionLimits {
            max_facts: Some(4),
            max_iterations: None,
        };
        assert_eq!(
            engine.run(&symbols, &limits),
            Err(ExecutionError::TooManyFacts(4))
        );
    }

    #[test]
    fn scope_restriction_hides_later_blocks() {
        let mut symbols = SymbolTable::new();
        let p = symbols.insert("claims");
        let mut engine = Engine::new();
        // Block 1 states a fact; block 0 and the authorizer should not
        // see it by default.
        engine.add_fact(1, int_fact(p, &[99]));
        engine.run(&symbols, &ExecutionLimits::default()).unwrap();

        let query = Rule::new(
            Predicate::new(1024, vec![]),
            vec![Predicate::new(p, vec![Term::Variable(0)])],
            vec![],
            vec![],
        );
        assert!(!engine.query_match(&query, 0, &symbols).unwrap());
        assert!(!engine
            .query_match(&query, AUTHORIZER_ORIGIN, &symbols)
            .unwrap());
        // Block 1 itself sees it.
        assert!(engine.query_match(&query, 1, &symbols).unwrap());

        // `previous` from block 2 exposes block 1.
        let scoped = Rule {
            scopes: vec![Scope::Previous],
            ..query.clone()
        };
        assert!(engine.query_match(&scoped, 2, &symbols).unwrap());
        // But `previous` in authorizer context adds nothing.
        assert!(!engine
            .query_match(&scoped, AUTHORIZER_ORIGIN, &symbols)
            .unwrap());
    }

    #[test]
    fn public_key_scope_exposes_verified_blocks() {
        let mut symbols = SymbolTable::new();
        let p = symbols.insert("delegated");
        let mut engine = Engine::new();
        engine.add_fact(2, int_fact(p, &[1]));
        engine.add_verified_block(0, 2);
        engine.run(&symbols, &ExecutionLimits::default()).unwrap();

        let query = Rule::new(
            Predicate::new(1024, vec![]),
            vec![Predicate::new(p, vec![Term::Variable(0)])],
            vec![],
            vec![Scope::PublicKey(0)],
        );
        assert!(engine
            .query_match(&query, AUTHORIZER_ORIGIN, &symbols)
            .unwrap());
        let unknown_key = Rule {
            scopes: vec![Scope::PublicKey(9)],
            ..query
        };
        assert!(!engine
            .query_match(&unknown_key, AUTHORIZER_ORIGIN, &symbols)
            .unwrap());
    }

    #[test]
    fn derived_facts_carry_rule_origin() {
        let mut symbols = SymbolTable::new();
        let input = symbols.insert("input");
        let output = symbols.insert("output");
        let mut engine = Engine::new();
        engine.add_fact(0, int_fact(input, &[1]));
        // The authorizer derives from authority facts; the derived fact
        // lands in the authorizer's origin, invisible to blocks that do
        // not trust it... but every block trusts the authorizer, so it
        // is visible everywhere.
        engine.add_rule(
            AUTHORIZER_ORIGIN,
            Rule::new(
                Predicate::new(output, vec![Term::Variable(0)]),
                vec![Predicate::new(input, vec![Term::Variable(0)])],
                vec![],
                vec![],
            ),
        );
        engine.run(&symbols, &ExecutionLimits::default()).unwrap();
        let derived: Vec<_> = engine
            .facts()
            .filter(|(_, f)| f.predicate.name == output)
            .collect();
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].0, AUTHORIZER_ORIGIN);
    }

    #[test]
    fn check_all_requires_a_match() {
        let mut symbols = SymbolTable::new();
        let p = symbols.insert("limit");
        let mut engine = Engine::new();
        engine.run(&symbols, &ExecutionLimits::default()).unwrap();

        // No matching fact: check all fails.
        let query = Rule::new(
            Predicate::new(1024, vec![]),
            vec![Predicate::new(p, vec![Term::Variable(0)])],
            vec![],
            vec![],
        );
        let check = Check {
            queries: vec![query.clone()],
            kind: CheckKind::All,
        };
        assert!(!engine
            .check_succeeds(&check, AUTHORIZER_ORIGIN, &symbols)
            .unwrap());

        // With facts, every binding must satisfy the expressions.
        let mut engine = Engine::new();
        engine.add_fact(AUTHORIZER_ORIGIN, int_fact(p, &[5]));
        engine.add_fact(AUTHORIZER_ORIGIN, int_fact(p, &[50]));
        engine.run(&symbols, &ExecutionLimits::default()).unwrap();
        let bounded = Rule {
            expressions: vec![Expression {
                ops: vec![
                    Op::Value(Term::Variable(0)),
                    Op::Value(Term::Value(Value::Integer(100))),
                    Op::Binary(Binary::LessThan),
                ],
            }],
            ..query.clone()
        };
        let check = Check {
            queries: vec![bounded.clone()],
            kind: CheckKind::All,
        };
        assert!(engine
            .check_succeeds(&check, AUTHORIZER_ORIGIN, &symbols)
            .unwrap());

        let tight = Rule {
            expressions: vec![Expression {
                ops: vec![
                    Op::Value(Term::Variable(0)),
                    Op::Value(Term::Value(Value::Integer(10))),
                    Op::Binary(Binary::LessThan),
                ],
            }],
            ..query
        };
        let check = Check {
            queries: vec![tight],
            kind: CheckKind::All,
        };
        assert!(!engine
            .check_succeeds(&check, AUTHORIZER_ORIGIN, &symbols)
            .unwrap());
    }

    #[test]
    fn reject_if_inverts() {
        let mut symbols = SymbolTable::new();
        let p = symbols.insert("revoked");
        let query = Rule::new(
            Predicate::new(1024, vec![]),
            vec![Predicate::new(p, vec![Term::Variable(0)])],
            vec![],
            vec![],
        );
        let check = Check {
            queries: vec![query],
            kind: CheckKind::Reject,
        };

        let mut engine = Engine::new();
        engine.run(&symbols, &ExecutionLimits::default()).unwrap();
        assert!(engine
            .check_succeeds(&check, AUTHORIZER_ORIGIN, &symbols)
            .unwrap());

        let mut engine = Engine::new();
        engine.add_fact(AUTHORIZER_ORIGIN, int_fact(p, &[1]));
        engine.run(&symbols, &ExecutionLimits::default()).unwrap();
        assert!(!engine
            .check_succeeds(&check, AUTHORIZER_ORIGIN, &symbols)
            .unwrap());
    }
}
