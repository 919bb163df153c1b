//! Conversion between wire messages and the interned Datalog
//! representation.
//!
//! This is the single boundary where wire types become domain types.
//! Reading extends the ambient symbol/key tables with what the block
//! introduces, then validates every reference: unknown indexes,
//! redeclared symbols, nested sets, duplicate map keys and unbound rule
//! head variables are all rejected here, before anything is evaluated.

use std::collections::{BTreeMap, BTreeSet};

use crate::crypto::{Algorithm, PublicKey};
use crate::datalog::{
    self, Check, CheckKind, Closure, Expression, Fact, Op, Predicate, Rule, Scope, SymbolTable,
    Term, Unary, Value,
};
use crate::error::{Error, FormatError, Result};
use crate::format::schema;
use crate::token::Block;

/// Lowest accepted block payload version.
pub const MIN_BLOCK_VERSION: u32 = 3;
/// Highest accepted block payload version; also what writers emit.
pub const MAX_BLOCK_VERSION: u32 = 6;

// ---------------------------------------------------------------------
// Public keys
// ---------------------------------------------------------------------

/// Serialize a public key.
#[must_use]
pub fn public_key_to_proto(key: &PublicKey) -> schema::PublicKey {
    schema::PublicKey {
        algorithm: match key.algorithm() {
            Algorithm::Ed25519 => schema::Algorithm::Ed25519 as i32,
            Algorithm::Secp256r1 => schema::Algorithm::Secp256r1 as i32,
        },
        key: key.to_bytes(),
    }
}

/// Deserialize a public key.
///
/// # Errors
///
/// Returns format errors for unknown algorithms or invalid key bytes.
pub fn proto_to_public_key(proto: &schema::PublicKey) -> Result<PublicKey> {
    let algorithm = u32::try_from(proto.algorithm).map_err(|_| {
        Error::Format(FormatError::Deserialization(format!(
            "unknown algorithm {}",
            proto.algorithm
        )))
    })?;
    PublicKey::from_bytes(&proto.key, Algorithm::from_id(algorithm)?)
}

// ---------------------------------------------------------------------
// Terms
// ---------------------------------------------------------------------

fn value_to_proto(value: &Value) -> schema::Term {
    let content = match value {
        Value::Integer(i) => schema::term::Content::Integer(*i),
        Value::Str(s) => schema::term::Content::String(*s),
        Value::Date(d) => schema::term::Content::Date(*d),
        Value::Bytes(b) => schema::term::Content::Bytes(b.clone()),
        Value::Bool(b) => schema::term::Content::Bool(*b),
        Value::Null => schema::term::Content::Null(schema::Empty {}),
        // BTree iteration yields the canonical order.
        Value::Set(values) => schema::term::Content::Set(schema::TermSet {
            set: values.iter().map(value_to_proto).collect(),
        }),
        Value::Array(values) => schema::term::Content::Array(schema::Array {
            array: values.iter().map(value_to_proto).collect(),
        }),
        Value::Map(entries) => schema::term::Content::Map(schema::Map {
            entries: entries
                .iter()
                .map(|(key, value)| schema::MapEntry {
                    key: schema::MapKey {
                        content: Some(match key {
                            datalog::MapKey::Integer(i) => schema::map_key::Content::Integer(*i),
                            datalog::MapKey::Str(s) => schema::map_key::Content::String(*s),
                        }),
                    },
                    value: value_to_proto(value),
                })
                .collect(),
        }),
    };
    schema::Term {
        content: Some(content),
    }
}

fn term_to_proto(term: &Term) -> schema::Term {
    match term {
        Term::Variable(v) => schema::Term {
            content: Some(schema::term::Content::Variable(*v)),
        },
        Term::Value(value) => value_to_proto(value),
    }
}

fn proto_to_value(proto: &schema::Term, symbols: &SymbolTable, in_set: bool) -> Result<Value> {
    let content = proto
        .content
        .as_ref()
        .ok_or(Error::Format(FormatError::MissingField("term")))?;
    match content {
        schema::term::Content::Variable(_) => Err(Error::Format(FormatError::VariableInFact)),
        schema::term::Content::Integer(i) => Ok(Value::Integer(*i)),
        schema::term::Content::String(s) => {
            symbols.lookup(*s).map_err(Error::Format)?;
            Ok(Value::Str(*s))
        }
        schema::term::Content::Date(d) => Ok(Value::Date(*d)),
        schema::term::Content::Bytes(b) => Ok(Value::Bytes(b.clone())),
        schema::term::Content::Bool(b) => Ok(Value::Bool(*b)),
        schema::term::Content::Null(_) => Ok(Value::Null),
        schema::term::Content::Set(set) => {
            if in_set {
                return Err(Error::Format(FormatError::SetInSet));
            }
            let mut values = BTreeSet::new();
            for term in &set.set {
                values.insert(proto_to_value(term, symbols, true)?);
            }
            Ok(Value::Set(values))
        }
        schema::term::Content::Array(array) => {
            let mut values = Vec::with_capacity(array.array.len());
            for term in &array.array {
                values.push(proto_to_value(term, symbols, false)?);
            }
            Ok(Value::Array(values))
        }
        schema::term::Content::Map(entries) => {
            let mut values = BTreeMap::new();
            for entry in &entries.entries {
                let key = match entry
                    .key
                    .content
                    .as_ref()
                    .ok_or(Error::Format(FormatError::MissingField("map key")))?
                {
                    schema::map_key::Content::Integer(i) => datalog::MapKey::Integer(*i),
                    schema::map_key::Content::String(s) => {
                        symbols.lookup(*s).map_err(Error::Format)?;
                        datalog::MapKey::Str(*s)
                    }
                };
                let value = proto_to_value(&entry.value, symbols, false)?;
                if values.insert(key.clone(), value).is_some() {
                    return Err(Error::Format(FormatError::DuplicateMapKey(format!(
                        "{key:?}"
                    ))));
                }
            }
            Ok(Value::Map(values))
        }
    }
}

fn proto_to_term(proto: &schema::Term, symbols: &SymbolTable) -> Result<Term> {
    match proto.content.as_ref() {
        Some(schema::term::Content::Variable(v)) => {
            symbols.lookup(u64::from(*v)).map_err(Error::Format)?;
            Ok(Term::Variable(*v))
        }
        _ => Ok(Term::Value(proto_to_value(proto, symbols, false)?)),
    }
}

// ---------------------------------------------------------------------
// Predicates, facts, rules, checks
// ---------------------------------------------------------------------

fn predicate_to_proto(predicate: &Predicate) -> schema::Predicate {
    schema::Predicate {
        name: predicate.name,
        terms: predicate.terms.iter().map(term_to_proto).collect(),
    }
}

fn proto_to_predicate(proto: &schema::Predicate, symbols: &SymbolTable) -> Result<Predicate> {
    symbols.lookup(proto.name).map_err(Error::Format)?;
    let mut terms = Vec::with_capacity(proto.terms.len());
    for term in &proto.terms {
        terms.push(proto_to_term(term, symbols)?);
    }
    Ok(Predicate::new(proto.name, terms))
}

fn fact_to_proto(fact: &Fact) -> schema::Fact {
    schema::Fact {
        predicate: predicate_to_proto(&fact.predicate),
    }
}

fn proto_to_fact(proto: &schema::Fact, symbols: &SymbolTable) -> Result<Fact> {
    Fact::new(proto_to_predicate(&proto.predicate, symbols)?).map_err(Error::Format)
}

fn ops_to_proto(ops: &[Op]) -> Vec<schema::Op> {
    ops.iter()
        .map(|op| {
            let content = match op {
                Op::Value(term) => schema::op::Content::Value(term_to_proto(term)),
                Op::Unary(unary) => schema::op::Content::Unary(schema::OpUnary {
                    kind: match unary {
                        Unary::Negate => schema::op_unary::Kind::Negate as i32,
                        Unary::Length => schema::op_unary::Kind::Length as i32,
                        Unary::TypeOf => schema::op_unary::Kind::TypeOf as i32,
                    },
                }),
                Op::Binary(binary) => schema::op::Content::Binary(schema::OpBinary {
                    kind: binary_to_proto(*binary) as i32,
                }),
                Op::Closure(closure) => schema::op::Content::Closure(schema::OpClosure {
                    params: closure.params.clone(),
                    ops: ops_to_proto(&closure.ops),
                }),
            };
            schema::Op {
                content: Some(content),
            }
        })
        .collect()
}

fn proto_to_ops(ops: &[schema::Op], symbols: &SymbolTable) -> Result<Vec<Op>> {
    let mut converted = Vec::with_capacity(ops.len());
    for op in ops {
        let content = op
            .content
            .as_ref()
            .ok_or(Error::Format(FormatError::MissingField("op")))?;
        converted.push(match content {
            schema::op::Content::Value(term) => Op::Value(proto_to_term(term, symbols)?),
            schema::op::Content::Unary(unary) => {
                let kind = schema::op_unary::Kind::try_from(unary.kind).map_err(|_| {
                    Error::Format(FormatError::Deserialization(format!(
                        "unknown unary op {}",
                        unary.kind
                    )))
                })?;
                Op::Unary(match kind {
                    schema::op_unary::Kind::Negate => Unary::Negate,
                    schema::op_unary::Kind::Length => Unary::Length,
                    schema::op_unary::Kind::TypeOf => Unary::TypeOf,
                })
            }
            schema::op::Content::Binary(binary) => {
                let kind = schema::op_binary::Kind::try_from(binary.kind).map_err(|_| {
                    Error::Format(FormatError::Deserialization(format!(
                        "unknown binary op {}",
                        binary.kind
                    )))
                })?;
                Op::Binary(binary_from_proto(kind))
            }
            schema::op::Content::Closure(closure) => {
                for param in &closure.params {
                    symbols.lookup(u64::from(*param)).map_err(Error::Format)?;
                }
                Op::Closure(Closure {
                    params: closure.params.clone(),
                    ops: proto_to_ops(&closure.ops, symbols)?,
                })
            }
        });
    }
    Ok(converted)
}

fn binary_to_proto(op: datalog::Binary) -> schema::op_binary::Kind {
    use datalog::Binary as B;
    use schema::op_binary::Kind as K;
    match op {
        B::LessThan => K::LessThan,
        B::GreaterThan => K::GreaterThan,
        B::LessOrEqual => K::LessOrEqual,
        B::GreaterOrEqual => K::GreaterOrEqual,
        B::Equal => K::Equal,
        B::Contains => K::Contains,
        B::Prefix => K::Prefix,
        B::Suffix => K::Suffix,
        B::Regex => K::Regex,
        B::Add => K::Add,
        B::Sub => K::Sub,
        B::Mul => K::Mul,
        B::Div => K::Div,
        B::And => K::And,
        B::Or => K::Or,
        B::Intersection => K::Intersection,
        B::Union => K::Union,
        B::BitwiseAnd => K::BitwiseAnd,
        B::BitwiseOr => K::BitwiseOr,
        B::BitwiseXor => K::BitwiseXor,
        B::NotEqual => K::NotEqual,
        B::HeterogeneousEqual => K::HeterogeneousEqual,
        B::HeterogeneousNotEqual => K::HeterogeneousNotEqual,
        B::LazyAnd => K::LazyAnd,
        B::LazyOr => K::LazyOr,
        B::All => K::All,
        B::Any => K::Any,
        B::Get => K::Get,
        B::TryOr => K::TryOr,
    }
}

fn binary_from_proto(kind: schema::op_binary::Kind) -> datalog::Binary {
    use datalog::Binary as B;
    use schema::op_binary::Kind as K;
    match kind {
        K::LessThan => B::LessThan,
        K::GreaterThan => B::GreaterThan,
        K::LessOrEqual => B::LessOrEqual,
        K::GreaterOrEqual => B::GreaterOrEqual,
        K::Equal => B::Equal,
        K::Contains => B::Contains,
        K::Prefix => B::Prefix,
        K::Suffix => B::Suffix,
        K::Regex => B::Regex,
        K::Add => B::Add,
        K::Sub => B::Sub,
        K::Mul => B::Mul,
        K::Div => B::Div,
        K::And => B::And,
        K::Or => B::Or,
        K::Intersection => B::Intersection,
        K::Union => B::Union,
        K::BitwiseAnd => B::BitwiseAnd,
        K::BitwiseOr => B::BitwiseOr,
        K::BitwiseXor => B::BitwiseXor,
        K::NotEqual => B::NotEqual,
        K::HeterogeneousEqual => B::HeterogeneousEqual,
        K::HeterogeneousNotEqual => B::HeterogeneousNotEqual,
        K::LazyAnd => B::LazyAnd,
        K::LazyOr => B::LazyOr,
        K::All => B::All,
        K::Any => B::Any,
        K::Get => B::Get,
        K::TryOr => B::TryOr,
    }
}

fn scope_to_proto(scope: &Scope) -> schema::Scope {
    let content = match scope {
        Scope::Authority => schema::scope::Content::ScopeType(schema::scope::Type::Authority as i32),
        Scope::Previous => schema::scope::Content::ScopeType(schema::scope::Type::Previous as i32),
        Scope::PublicKey(key) => schema::scope::Content::PublicKey(*key as i64),
    };
    schema::Scope {
        content: Some(content),
    }
}

fn proto_to_scope(proto: &schema::Scope, symbols: &SymbolTable) -> Result<Scope> {
    match proto
        .content
        .as_ref()
        .ok_or(Error::Format(FormatError::MissingField("scope")))?
    {
        schema::scope::Content::ScopeType(t) => {
            match schema::scope::Type::try_from(*t).map_err(|_| {
                Error::Format(FormatError::Deserialization(format!("unknown scope {t}")))
            })? {
                schema::scope::Type::Authority => Ok(Scope::Authority),
                schema::scope::Type::Previous => Ok(Scope::Previous),
            }
        }
        schema::scope::Content::PublicKey(index) => {
            let index = u64::try_from(*index)
                .map_err(|_| Error::Format(FormatError::UnknownPublicKey(0)))?;
            symbols
                .get_public_key(index)
                .ok_or(Error::Format(FormatError::UnknownPublicKey(index)))?;
            Ok(Scope::PublicKey(index))
        }
    }
}

fn rule_to_proto(rule: &Rule) -> schema::Rule {
    schema::Rule {
        head: predicate_to_proto(&rule.head),
        body: rule.body.iter().map(predicate_to_proto).collect(),
        expressions: rule
            .expressions
            .iter()
            .map(|e| schema::Expression {
                ops: ops_to_proto(&e.ops),
            })
            .collect(),
        scope: rule.scopes.iter().map(scope_to_proto).collect(),
    }
}

fn proto_to_rule(proto: &schema::Rule, symbols: &SymbolTable) -> Result<Rule> {
    let head = proto_to_predicate(&proto.head, symbols)?;
    let mut body = Vec::with_capacity(proto.body.len());
    for predicate in &proto.body {
        body.push(proto_to_predicate(predicate, symbols)?);
    }
    let mut expressions = Vec::with_capacity(proto.expressions.len());
    for expression in &proto.expressions {
        expressions.push(Expression {
            ops: proto_to_ops(&expression.ops, symbols)?,
        });
    }
    let mut scopes = Vec::with_capacity(proto.scope.len());
    for scope in &proto.scope {
        scopes.push(proto_to_scope(scope, symbols)?);
    }
    let rule = Rule::new(head, body, expressions, scopes);
    rule.validate_variables(symbols).map_err(Error::Format)?;
    Ok(rule)
}

fn check_to_proto(check: &Check) -> schema::Check {
    schema::Check {
        queries: check.queries.iter().map(rule_to_proto).collect(),
        kind: match check.kind {
            // `one` stays absent so legacy signatures are preserved.
            CheckKind::One => None,
            CheckKind::All => Some(schema::check::Kind::All as i32),
            CheckKind::Reject => Some(schema::check::Kind::Reject as i32),
        },
    }
}

fn proto_to_check(proto: &schema::Check, symbols: &SymbolTable) -> Result<Check> {
    let kind = match proto.kind {
        None => CheckKind::One,
        Some(k) => match schema::check::Kind::try_from(k) {
            Ok(schema::check::Kind::One) => CheckKind::One,
            Ok(schema::check::Kind::All) => CheckKind::All,
            Ok(schema::check::Kind::Reject) => CheckKind::Reject,
            Err(_) => {
                return Err(Error::Format(FormatError::Deserialization(format!(
                    "unknown check kind {k}"
                ))))
            }
        },
    };
    let query_head = symbols
        .get(crate::builder::QUERY_HEAD)
        .ok_or(Error::Format(FormatError::InvalidQueryHead))?;
    let mut queries = Vec::with_capacity(proto.queries.len());
    for query in &proto.queries {
        let rule = proto_to_rule(query, symbols)?;
        // Queries are headless; the reserved head is all they may carry.
        if rule.head.name != query_head || !rule.head.terms.is_empty() {
            return Err(Error::Format(FormatError::InvalidQueryHead));
        }
        queries.push(rule);
    }
    Ok(Check { queries, kind })
}

// ---------------------------------------------------------------------
// Whole blocks
// ---------------------------------------------------------------------

/// Serialize a parsed block.
#[must_use]
pub fn block_to_proto(block: &Block) -> schema::Block {
    schema::Block {
        version: block.version,
        symbols: block.symbols.clone(),
        context: block.context.clone(),
        facts: block.facts.iter().map(fact_to_proto).collect(),
        rules: block.rules.iter().map(rule_to_proto).collect(),
        checks: block.checks.iter().map(check_to_proto).collect(),
        scope: block.scopes.iter().map(scope_to_proto).collect(),
        public_keys: block.public_keys.iter().map(public_key_to_proto).collect(),
    }
}

/// Deserialize a block payload, extending `symbols` with what the block
/// introduces.
///
/// For third-party blocks the caller passes the block's isolated table
/// instead of the primary one.
///
/// # Errors
///
/// Version, duplicate-symbol, duplicate-key and reference-validation
/// errors, as described in the module documentation.
pub fn proto_to_block(
    proto: &schema::Block,
    symbols: &mut SymbolTable,
    external_key: Option<PublicKey>,
) -> Result<Block> {
    if !(MIN_BLOCK_VERSION..=MAX_BLOCK_VERSION).contains(&proto.version) {
        return Err(Error::Format(FormatError::Version {
            minimum: MIN_BLOCK_VERSION,
            maximum: MAX_BLOCK_VERSION,
            actual: proto.version,
        }));
    }

    symbols.extend(&proto.symbols).map_err(Error::Format)?;
    let mut public_keys = Vec::with_capacity(proto.public_keys.len());
    for key in &proto.public_keys {
        public_keys.push(proto_to_public_key(key)?);
    }
    symbols.extend_keys(&public_keys).map_err(Error::Format)?;

    let mut facts = Vec::with_capacity(proto.facts.len());
    for fact in &proto.facts {
        facts.push(proto_to_fact(fact, symbols)?);
    }
    let mut rules = Vec::with_capacity(proto.rules.len());
    for rule in &proto.rules {
        rules.push(proto_to_rule(rule, symbols)?);
    }
    let mut checks = Vec::with_capacity(proto.checks.len());
    for check in &proto.checks {
        checks.push(proto_to_check(check, symbols)?);
    }
    let mut scopes = Vec::with_capacity(proto.scope.len());
    for scope in &proto.scope {
        scopes.push(proto_to_scope(scope, symbols)?);
    }

    Ok(Block {
        symbols: proto.symbols.clone(),
        context: proto.context.clone(),
        facts,
        rules,
        checks,
        scopes,
        public_keys,
        version: proto.version,
        external_key,
    })
}
