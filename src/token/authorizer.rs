//! The authorizer: the verifier-side program and its decision
//! procedure.
//!
//! An authorizer is immutable while deciding: `authorize` builds a
//! fresh evaluation world from the token and the authorizer's own
//! facts, rules, checks and policies, runs the fixpoint, validates
//! every check, and lets the first matching policy decide. Third-party
//! block contents are translated from their isolated tables into the
//! evaluation table before loading.

use tracing::debug;

use crate::builder::{self, Check, Fact, Policy, PolicyKind, Rule, Scope};
use crate::datalog::{
    Engine, ExecutionLimits, SymbolTable, AUTHORIZER_ORIGIN,
};
use crate::error::{
    AuthorizationError, CheckOrigin, Error, ExecutionError, FailedCheck, Result,
};
use crate::parser;
use crate::token::{Block, Warrant};

/// A successful authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorization {
    /// Index of the `allow` policy that matched.
    pub policy_index: usize,
    /// Number of facts in the saturated world.
    pub fact_count: usize,
}

/// The verifier-side program: facts, rules, checks and policies, plus
/// resource limits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authorizer {
    facts: Vec<Fact>,
    rules: Vec<Rule>,
    checks: Vec<Check>,
    policies: Vec<Policy>,
    scopes: Vec<Scope>,
    limits: ExecutionLimits,
}

impl Authorizer {
    /// An empty authorizer with default limits.
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

    /// Add a policy.
    pub fn add_policy(&mut self, policy: Policy) -> &mut Self {
        self.policies.push(policy);
        self
    }

    /// Add an authorizer-wide trust scope.
    pub fn add_scope(&mut self, scope: Scope) -> &mut Self {
        self.scopes.push(scope);
        self
    }

    /// Parse authorizer-grammar source and append its statements.
    ///
    /// # Errors
    ///
    /// Returns the parse error.
    pub fn add_code(&mut self, source: &str) -> Result<&mut Self> {
        let parsed = parser::parse_authorizer_source(source).map_err(Error::Language)?;
        self.facts.extend(parsed.facts);
        self.rules.extend(parsed.rules);
        self.checks.extend(parsed.checks);
        self.policies.extend(parsed.policies);
        self.scopes.extend(parsed.scopes);
        Ok(self)
    }

    /// Replace the resource limits.
    pub fn set_limits(&mut self, limits: ExecutionLimits) -> &mut Self {
        self.limits = limits;
        self
    }

    /// The current resource limits.
    #[must_use]
    pub const fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Decide authorization for a token.
    ///
    /// # Errors
    ///
    /// `Execution` errors from evaluation or limits, and
    /// `Authorization` errors carrying the failing checks, the matching
    /// deny policy, or "no successful policy".
    pub fn authorize(&self, token: &Warrant) -> Result<Authorization> {
        if self.policies.is_empty() {
            return Err(Error::Execution(ExecutionError::AuthorizerWithoutPolicy));
        }

        let mut world = self.build_world(token)?;
        world.engine.run(&world.symbols, &self.limits)?;

        let mut failed = Vec::new();
        for entry in &world.checks {
            let origin = match entry.origin {
                CheckOrigin::Authorizer => AUTHORIZER_ORIGIN,
                CheckOrigin::Block(block) => block,
            };
            let succeeded =
                world
                    .engine
                    .check_succeeds(&entry.check, origin, &world.symbols)?;
            if !succeeded {
                failed.push(FailedCheck {
                    origin: entry.origin,
                    index: entry.index,
                    check: entry.rendered.clone(),
                });
            }
        }
        if !failed.is_empty() {
            debug!(failed = failed.len(), "checks failed");
            return Err(Error::Authorization(AuthorizationError::FailedChecks(
                failed,
            )));
        }

        for (index, policy) in self.policies.iter().enumerate() {
            for query in &policy.queries {
                let converted = query.convert(&mut world.symbols)?;
                if world
                    .engine
                    .query_match(&converted, AUTHORIZER_ORIGIN, &world.symbols)?
                {
                    return match policy.kind {
                        PolicyKind::Allow => {
                            debug!(policy = index, "allow policy matched");
                            Ok(Authorization {
                                policy_index: index,
                                fact_count: world.engine.fact_count(),
                            })
                        }
                        PolicyKind::Deny => {
                            debug!(policy = index, "deny policy matched");
                            Err(Error::Authorization(AuthorizationError::Denied {
                                index,
                                policy: policy.to_string(),
                            }))
                        }
                    };
                }
            }
        }
        Err(Error::Authorization(AuthorizationError::NoMatchingPolicy))
    }

    /// Evaluate a single check against the saturated world, without
    /// requiring any policy.
    ///
    /// # Errors
    ///
    /// `Execution` errors from evaluation or limits.
    pub fn query(&self, token: &Warrant, check: &Check) -> Result<bool> {
        let mut world = self.build_world(token)?;
        world.engine.run(&world.symbols, &self.limits)?;
        let converted = check.convert(&mut world.symbols)?;
        world
            .engine
            .check_succeeds(&converted, AUTHORIZER_ORIGIN, &world.symbols)
            .map_err(Error::Execution)
    }

    fn build_world(&self, token: &Warrant) -> Result<World> {
        let mut symbols = token.symbols.clone();
        let mut engine = Engine::new();
        let mut checks = Vec::new();

        load_block(&token.authority, 0, &mut symbols, &mut engine, &mut checks)?;
        for (index, block) in token.blocks.iter().enumerate() {
            let origin = index + 1;
            load_block(block, origin, &mut symbols, &mut engine, &mut checks)?;
            if let Some(key) = &block.external_key {
                let key_index = symbols.insert_key(key);
                engine.add_verified_block(key_index, origin);
            }
        }

        // Per-block revocation identifiers, visible to the authorizer.
        let revocation = symbols.insert("revocation_id");
        for (index, identifier) in token.revocation_identifiers().into_iter().enumerate() {
            let fact = crate::datalog::Fact::new(crate::datalog::Predicate::new(
                revocation,
                vec![
                    crate::datalog::Term::Value(crate::datalog::Value::Integer(index as i64)),
                    crate::datalog::Term::Value(crate::datalog::Value::Bytes(identifier)),
                ],
            ))
            .map_err(Error::Format)?;
            engine.add_fact(AUTHORIZER_ORIGIN, fact);
        }

        for fact in &self.facts {
            engine.add_fact(AUTHORIZER_ORIGIN, fact.convert(&mut symbols)?);
        }
        for rule in &self.rules {
            engine.add_rule(AUTHORIZER_ORIGIN, rule.convert(&mut symbols)?);
        }
        for (index, check) in self.checks.iter().enumerate() {
            checks.push(CheckEntry {
                origin: CheckOrigin::Authorizer,
                index,
                check: check.convert(&mut symbols)?,
                rendered: check.to_string(),
            });
        }
        let scopes = self
            .scopes
            .iter()
            .map(|scope| scope.convert(&mut symbols))
            .collect();
        engine.set_block_scopes(AUTHORIZER_ORIGIN, scopes);

        Ok(World {
            symbols,
            engine,
            checks,
        })
    }
}

struct CheckEntry {
    origin: CheckOrigin,
    index: usize,
    check: crate::datalog::Check,
    rendered: String,
}

struct World {
    symbols: SymbolTable,
    engine: Engine,
    checks: Vec<CheckEntry>,
}

/// Load one token block into the engine under `origin`.
///
/// Third-party blocks are translated from their isolated table into the
/// evaluation table by round-tripping through the string-level AST.
fn load_block(
    block: &Block,
    origin: usize,
    symbols: &mut SymbolTable,
    engine: &mut Engine,
    checks: &mut Vec<CheckEntry>,
) -> Result<()> {
    if block.external_key.is_some() {
        let local = block.local_table();
        for fact in &block.facts {
            let translated = builder::Fact::convert_from(fact, &local)?.convert(symbols)?;
            engine.add_fact(origin, translated);
        }
        for rule in &block.rules {
            let translated = builder::Rule::convert_from(rule, &local)?.convert(symbols)?;
            engine.add_rule(origin, translated);
        }
        for (index, check) in block.checks.iter().enumerate() {
            let translated = builder::Check::convert_from(check, &local)?;
            checks.push(CheckEntry {
                origin: CheckOrigin::Block(origin),
                index,
                check: translated.convert(symbols)?,
                rendered: translated.to_string(),
            });
        }
        let mut scopes = Vec::with_capacity(block.scopes.len());
        for scope in &block.scopes {
            scopes.push(builder::Scope::convert_from(scope, &local)?.convert(symbols));
        }
        engine.set_block_scopes(origin, scopes);
    } else {
        for fact in &block.facts {
            engine.add_fact(origin, fact.clone());
        }
        for rule in &block.rules {
            engine.add_rule(origin, rule.clone());
        }
        for (index, check) in block.checks.iter().enumerate() {
            checks.push(CheckEntry {
                origin: CheckOrigin::Block(origin),
                index,
                check: check.clone(),
                rendered: builder::Check::convert_from(check, symbols)?.to_string(),
            });
        }
        engine.set_block_scopes(origin, block.scopes.clone());
    }
    Ok(())
}
