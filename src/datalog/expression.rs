//! Expression evaluation.
//!
//! An expression is a postfix op list interpreted on a stack whose
//! entries are either values or closures. Closures are pushed as-is and
//! only ever consumed by the operators that declare a closure operand
//! (`any`, `all`, `lazy_and`, `lazy_or`, `try_or`); everything else
//! works on concrete values.
//!
//! Strings built during evaluation (concatenation, `type()`) are
//! interned into a [`TemporarySymbolTable`] so index equality stays
//! sound without touching the token's tables.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::datalog::symbol::TemporarySymbolTable;
use crate::datalog::value::{MapKey, Value};
use crate::datalog::Term;
use crate::error::ExecutionError;

/// One step of a postfix expression program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    /// Push a term (variables are substituted from the bindings).
    Value(Term),
    /// Pop one entry, push the result.
    Unary(Unary),
    /// Pop two entries (right on top), push the result.
    Binary(Binary),
    /// Push a closure.
    Closure(Closure),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unary {
    /// Boolean negation.
    Negate,
    /// String UTF-8 byte length, byte-string length, or collection
    /// cardinality.
    Length,
    /// The value's type name, as a string.
    TypeOf,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Binary {
    /// `<` on integers or dates.
    LessThan,
    /// `>` on integers or dates.
    GreaterThan,
    /// `<=` on integers or dates.
    LessOrEqual,
    /// `>=` on integers or dates.
    GreaterOrEqual,
    /// `===`: strict equality, same tag required.
    Equal,
    /// Membership / substring / subset test.
    Contains,
    /// String or array prefix test.
    Prefix,
    /// String or array suffix test.
    Suffix,
    /// Unanchored regular-expression match.
    Regex,
    /// Integer addition or string concatenation.
    Add,
    /// Integer subtraction.
    Sub,
    /// Integer multiplication.
    Mul,
    /// Integer division (truncating).
    Div,
    /// Eager boolean and.
    And,
    /// Eager boolean or.
    Or,
    /// Set intersection.
    Intersection,
    /// Set union.
    Union,
    /// Bitwise and.
    BitwiseAnd,
    /// Bitwise or.
    BitwiseOr,
    /// Bitwise xor.
    BitwiseXor,
    /// `!==`: strict inequality, same tag required.
    NotEqual,
    /// `==`: heterogeneous equality, false across tags.
    HeterogeneousEqual,
    /// `!=`: heterogeneous inequality, true across tags.
    HeterogeneousNotEqual,
    /// `&&`: right operand is a lazy nullary closure.
    LazyAnd,
    /// `||`: right operand is a lazy nullary closure.
    LazyOr,
    /// Every element satisfies the closure.
    All,
    /// Some element satisfies the closure.
    Any,
    /// Array indexing / map lookup, null when absent.
    Get,
    /// Evaluate the left closure, fall back to the right value on type
    /// error.
    TryOr,
}

/// An anonymous function pushed on the evaluation stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Closure {
    /// Parameter variable ids; must not shadow visible variables.
    pub params: Vec<u32>,
    /// Postfix body.
    pub ops: Vec<Op>,
}

/// A complete expression: a postfix op list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Expression {
    /// The ops, in evaluation order.
    pub ops: Vec<Op>,
}

enum Entry<'e> {
    Value(Value),
    Closure(&'e Closure),
}

impl Expression {
    /// Evaluate the expression under the given variable bindings.
    ///
    /// # Errors
    ///
    /// Any [`ExecutionError`] raised by the operators; see the module
    /// documentation for the operator semantics.
    pub fn evaluate(
        &self,
        values: &BTreeMap<u32, Value>,
        symbols: &mut TemporarySymbolTable<'_>,
    ) -> Result<Value, ExecutionError> {
        match evaluate_ops(&self.ops, values, symbols)? {
            Entry::Value(v) => Ok(v),
            Entry::Closure(_) => Err(ExecutionError::InvalidExpression),
        }
    }
}

fn evaluate_ops<'e>(
    ops: &'e [Op],
    values: &BTreeMap<u32, Value>,
    symbols: &mut TemporarySymbolTable<'_>,
) -> Result<Entry<'e>, ExecutionError> {
    let mut stack: Vec<Entry<'e>> = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            Op::Value(Term::Variable(v)) => {
                let value = values
                    .get(v)
                    .cloned()
                    .ok_or(ExecutionError::UnknownVariable(*v))?;
                stack.push(Entry::Value(value));
            }
            Op::Value(Term::Value(v)) => stack.push(Entry::Value(v.clone())),
            Op::Closure(c) => stack.push(Entry::Closure(c)),
            Op::Unary(unary) => {
                let entry = stack.pop().ok_or(ExecutionError::InvalidUnaryOp)?;
                let result = unary.evaluate(entry, symbols)?;
                stack.push(Entry::Value(result));
            }
            Op::Binary(binary) => {
                let right = stack.pop().ok_or(ExecutionError::InvalidBinaryOp)?;
                let left = stack.pop().ok_or(ExecutionError::InvalidBinaryOp)?;
                let result = binary.evaluate(left, right, values, symbols)?;
                stack.push(Entry::Value(result));
            }
        }
    }
    let result = stack.pop().ok_or(ExecutionError::InvalidExpression)?;
    if stack.is_empty() {
        Ok(result)
    } else {
        Err(ExecutionError::InvalidExpression)
    }
}

/// Invoke a closure with the given arguments.
///
/// Parameters extend the visible bindings and must not shadow them; the
/// body must leave a single value (not a closure) on its stack.
fn apply_closure(
    closure: &Closure,
    args: &[Value],
    values: &BTreeMap<u32, Value>,
    symbols: &mut TemporarySymbolTable<'_>,
) -> Result<Value, ExecutionError> {
    if closure.params.len() != args.len() {
        return Err(ExecutionError::WrongArity {
            expected: closure.params.len(),
            got: args.len(),
        });
    }
    let mut inner = values.clone();
    for (param, arg) in closure.params.iter().zip(args.iter()) {
        if inner.contains_key(param) {
            return Err(ExecutionError::VariableShadowing(*param));
        }
        inner.insert(*param, arg.clone());
    }
    match evaluate_ops(&closure.ops, &inner, symbols)? {
        Entry::Value(v) => Ok(v),
        Entry::Closure(_) => Err(ExecutionError::ClosureEvaluatedToClosure),
    }
}

fn expect_bool(value: Value) -> Result<bool, ExecutionError> {
    match value {
        Value::Bool(b) => Ok(b),
        _ => Err(ExecutionError::TypeError),
    }
}

impl Unary {
    fn evaluate(
        self,
        entry: Entry<'_>,
        symbols: &mut TemporarySymbolTable<'_>,
    ) -> Result<Value, ExecutionError> {
        let Entry::Value(value) = entry else {
            return Err(ExecutionError::InvalidUnaryOp);
        };
        match (self, value) {
            (Unary::Negate, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (Unary::Negate, _) => Err(ExecutionError::TypeError),
            (Unary::Length, Value::Str(s)) => {
                let string = symbols
                    .get_symbol(s)
                    .ok_or(ExecutionError::UnknownSymbol(s))?;
                Ok(Value::Integer(string.len() as i64))
            }
            (Unary::Length, Value::Bytes(b)) => Ok(Value::Integer(b.len() as i64)),
            (Unary::Length, Value::Set(s)) => Ok(Value::Integer(s.len() as i64)),
            (Unary::Length, Value::Array(a)) => Ok(Value::Integer(a.len() as i64)),
            (Unary::Length, Value::Map(m)) => Ok(Value::Integer(m.len() as i64)),
            (Unary::Length, _) => Err(ExecutionError::TypeError),
            (Unary::TypeOf, v) => {
                let index = symbols.insert(v.type_name());
                Ok(Value::Str(index))
            }
        }
    }
}

impl Binary {
    fn evaluate(
        self,
        left: Entry<'_>,
        right: Entry<'_>,
        values: &BTreeMap<u32, Value>,
        symbols: &mut TemporarySymbolTable<'_>,
    ) -> Result<Value, ExecutionError> {
        // Closure-consuming operators first; everything else wants two
        // concrete values.
        match self {
            Binary::LazyAnd => {
                let (Entry::Value(l), Entry::Closure(c)) = (left, right) else {
                    return Err(ExecutionError::InvalidBinaryOp);
                };
                if !expect_bool(l)? {
                    return Ok(Value::Bool(false));
                }
                let result = apply_closure(c, &[], values, symbols)?;
                Ok(Value::Bool(expect_bool(result)?))
            }
            Binary::LazyOr => {
                let (Entry::Value(l), Entry::Closure(c)) = (left, right) else {
                    return Err(ExecutionError::InvalidBinaryOp);
                };
                if expect_bool(l)? {
                    return Ok(Value::Bool(true));
                }
                let result = apply_closure(c, &[], values, symbols)?;
                Ok(Value::Bool(expect_bool(result)?))
            }
            Binary::Any | Binary::All => {
                let (Entry::Value(l), Entry::Closure(c)) = (left, right) else {
                    return Err(ExecutionError::InvalidBinaryOp);
                };
                self.iterate(&l, c, values, symbols)
            }
            Binary::TryOr => {
                let (Entry::Closure(c), Entry::Value(alternative)) = (left, right) else {
                    return Err(ExecutionError::InvalidBinaryOp);
                };
                match apply_closure(c, &[], values, symbols) {
                    Ok(v) => Ok(v),
                    Err(ExecutionError::TypeError) => Ok(alternative),
                    Err(e) => Err(e),
                }
            }
            _ => {
                let (Entry::Value(l), Entry::Value(r)) = (left, right) else {
                    return Err(ExecutionError::InvalidBinaryOp);
                };
                self.evaluate_values(l, r, symbols)
            }
        }
    }

    /// `any` / `all` over sets, arrays and maps.
    ///
    /// Map elements are presented to the closure as `[key, value]`
    /// arrays, in key order.
    fn iterate(
        self,
        collection: &Value,
        closure: &Closure,
        values: &BTreeMap<u32, Value>,
        symbols: &mut TemporarySymbolTable<'_>,
    ) -> Result<Value, ExecutionError> {
        let elements: Vec<Value> = match collection {
            Value::Set(s) => s.iter().cloned().collect(),
            Value::Array(a) => a.clone(),
            Value::Map(m) => m
                .iter()
                .map(|(k, v)| Value::Array(vec![k.clone().into(), v.clone()]))
                .collect(),
            _ => return Err(ExecutionError::TypeError),
        };
        for element in elements {
            let result = apply_closure(closure, &[element], values, symbols)?;
            let truthy = expect_bool(result)?;
            match self {
                Binary::Any if truthy => return Ok(Value::Bool(true)),
                Binary::All if !truthy => return Ok(Value::Bool(false)),
                _ => {}
            }
        }
        Ok(Value::Bool(matches!(self, Binary::All)))
    }

    /// Strict equality: same tag required, `type error` otherwise.
    fn strict_equal(left: &Value, right: &Value) -> Result<bool, ExecutionError> {
        match (left, right) {
            (Value::Integer(_), Value::Integer(_))
            | (Value::Str(_), Value::Str(_))
            | (Value::Date(_), Value::Date(_))
            | (Value::Bytes(_), Value::Bytes(_))
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Null, Value::Null)
            | (Value::Set(_), Value::Set(_))
            | (Value::Array(_), Value::Array(_))
            | (Value::Map(_), Value::Map(_)) => Ok(left == right),
            _ => Err(ExecutionError::TypeError),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn evaluate_values(
        self,
        left: Value,
        right: Value,
        symbols: &mut TemporarySymbolTable<'_>,
    ) -> Result<Value, ExecutionError> {
        match (self, left, right) {
            // Ordering: integers and dates only.
            (Binary::LessThan, Value::Integer(a), Value::Integer(b)) => Ok(Value::Bool(a < b)),
            (Binary::LessThan, Value::Date(a), Value::Date(b)) => Ok(Value::Bool(a < b)),
            (Binary::GreaterThan, Value::Integer(a), Value::Integer(b)) => Ok(Value::Bool(a > b)),
            (Binary::GreaterThan, Value::Date(a), Value::Date(b)) => Ok(Value::Bool(a > b)),
            (Binary::LessOrEqual, Value::Integer(a), Value::Integer(b)) => Ok(Value::Bool(a <= b)),
            (Binary::LessOrEqual, Value::Date(a), Value::Date(b)) => Ok(Value::Bool(a <= b)),
            (Binary::GreaterOrEqual, Value::Integer(a), Value::Integer(b)) => {
                Ok(Value::Bool(a >= b))
            }
            (Binary::GreaterOrEqual, Value::Date(a), Value::Date(b)) => Ok(Value::Bool(a >= b)),
            (
                Binary::LessThan | Binary::GreaterThan | Binary::LessOrEqual
                | Binary::GreaterOrEqual,
                _,
                _,
            ) => Err(ExecutionError::TypeError),

            // Equality.
            (Binary::Equal, a, b) => Ok(Value::Bool(Self::strict_equal(&a, &b)?)),
            (Binary::NotEqual, a, b) => Ok(Value::Bool(!Self::strict_equal(&a, &b)?)),
            (Binary::HeterogeneousEqual, a, b) => {
                Ok(Value::Bool(Self::strict_equal(&a, &b).unwrap_or(false)))
            }
            (Binary::HeterogeneousNotEqual, a, b) => {
                Ok(Value::Bool(!Self::strict_equal(&a, &b).unwrap_or(false)))
            }

            // Arithmetic, checked; `+` also concatenates strings.
            (Binary::Add, Value::Integer(a), Value::Integer(b)) => a
                .checked_add(b)
                .map(Value::Integer)
                .ok_or(ExecutionError::Overflow),
            (Binary::Add, Value::Str(a), Value::Str(b)) => {
                let sa = symbols
                    .get_symbol(a)
                    .ok_or(ExecutionError::UnknownSymbol(a))?;
                let sb = symbols
                    .get_symbol(b)
                    .ok_or(ExecutionError::UnknownSymbol(b))?;
                let joined = format!("{sa}{sb}");
                Ok(Value::Str(symbols.insert(&joined)))
            }
            (Binary::Sub, Value::Integer(a), Value::Integer(b)) => a
                .checked_sub(b)
                .map(Value::Integer)
                .ok_or(ExecutionError::Overflow),
            (Binary::Mul, Value::Integer(a), Value::Integer(b)) => a
                .checked_mul(b)
                .map(Value::Integer)
                .ok_or(ExecutionError::Overflow),
            // Division by zero reports through the same checked path.
            (Binary::Div, Value::Integer(a), Value::Integer(b)) => a
                .checked_div(b)
                .map(Value::Integer)
                .ok_or(ExecutionError::Overflow),
            (Binary::Add | Binary::Sub | Binary::Mul | Binary::Div, _, _) => {
                Err(ExecutionError::TypeError)
            }

            // Bitwise: integers only.
            (Binary::BitwiseAnd, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a & b)),
            (Binary::BitwiseOr, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a | b)),
            (Binary::BitwiseXor, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a ^ b)),
            (Binary::BitwiseAnd | Binary::BitwiseOr | Binary::BitwiseXor, _, _) => {
                Err(ExecutionError::TypeError)
            }

            // Eager booleans.
            (Binary::And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a && b)),
            (Binary::Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a || b)),
            (Binary::And | Binary::Or, _, _) => Err(ExecutionError::TypeError),

            // Containment.
            (Binary::Contains, Value::Str(a), Value::Str(b)) => {
                let sa = symbols
                    .get_symbol(a)
                    .ok_or(ExecutionError::UnknownSymbol(a))?;
                let sb = symbols
                    .get_symbol(b)
                    .ok_or(ExecutionError::UnknownSymbol(b))?;
                Ok(Value::Bool(sa.contains(sb)))
            }
            (Binary::Contains, Value::Set(a), Value::Set(b)) => {
                Ok(Value::Bool(b.is_subset(&a)))
            }
            (Binary::Contains, Value::Set(a), element) => Ok(Value::Bool(a.contains(&element))),
            (Binary::Contains, Value::Array(a), Value::Array(b)) => {
                Ok(Value::Bool(b.iter().all(|e| a.contains(e))))
            }
            (Binary::Contains, Value::Array(a), element) => Ok(Value::Bool(a.contains(&element))),
            (Binary::Contains, Value::Map(m), Value::Integer(k)) => {
                Ok(Value::Bool(m.contains_key(&MapKey::Integer(k))))
            }
            (Binary::Contains, Value::Map(m), Value::Str(k)) => {
                Ok(Value::Bool(m.contains_key(&MapKey::Str(k))))
            }
            (Binary::Contains, _, _) => Err(ExecutionError::TypeError),

            // Prefix / suffix.
            (Binary::Prefix, Value::Str(a), Value::Str(b)) => {
                let sa = symbols
                    .get_symbol(a)
                    .ok_or(ExecutionError::UnknownSymbol(a))?;
                let sb = symbols
                    .get_symbol(b)
                    .ok_or(ExecutionError::UnknownSymbol(b))?;
                Ok(Value::Bool(sa.starts_with(sb)))
            }
            (Binary::Prefix, Value::Array(a), Value::Array(b)) => {
                Ok(Value::Bool(a.len() >= b.len() && a[..b.len()] == b[..]))
            }
            (Binary::Suffix, Value::Str(a), Value::Str(b)) => {
                let sa = symbols
                    .get_symbol(a)
                    .ok_or(ExecutionError::UnknownSymbol(a))?;
                let sb = symbols
                    .get_symbol(b)
                    .ok_or(ExecutionError::UnknownSymbol(b))?;
                Ok(Value::Bool(sa.ends_with(sb)))
            }
            (Binary::Suffix, Value::Array(a), Value::Array(b)) => Ok(Value::Bool(
                a.len() >= b.len() && a[a.len() - b.len()..] == b[..],
            )),
            (Binary::Prefix | Binary::Suffix, _, _) => Err(ExecutionError::TypeError),

            // Regular expressions; an uncompilable pattern never
            // matches.
            (Binary::Regex, Value::Str(s), Value::Str(pattern)) => {
                let subject = symbols
                    .get_symbol(s)
                    .ok_or(ExecutionError::UnknownSymbol(s))?;
                let pattern = symbols
                    .get_symbol(pattern)
                    .ok_or(ExecutionError::UnknownSymbol(pattern))?;
                Ok(Value::Bool(
                    Regex::new(pattern).map(|re| re.is_match(subject)).unwrap_or(false),
                ))
            }
            (Binary::Regex, _, _) => Err(ExecutionError::TypeError),

            // Set algebra.
            (Binary::Intersection, Value::Set(a), Value::Set(b)) => {
                Ok(Value::Set(a.intersection(&b).cloned().collect()))
            }
            (Binary::Union, Value::Set(a), Value::Set(b)) => {
                Ok(Value::Set(a.union(&b).cloned().collect()))
            }
            (Binary::Intersection | Binary::Union, _, _) => Err(ExecutionError::TypeError),

            // Lookup; absent entries yield null.
            (Binary::Get, Value::Array(a), Value::Integer(i)) => Ok(usize::try_from(i)
                .ok()
                .and_then(|i| a.get(i).cloned())
                .unwrap_or(Value::Null)),
            (Binary::Get, Value::Map(m), Value::Integer(k)) => {
                Ok(m.get(&MapKey::Integer(k)).cloned().unwrap_or(Value::Null))
            }
            (Binary::Get, Value::Map(m), Value::Str(k)) => {
                Ok(m.get(&MapKey::Str(k)).cloned().unwrap_or(Value::Null))
            }
            (Binary::Get, _, _) => Err(ExecutionError::TypeError),

            // Closure-consuming operators are handled before this
            // point.
            (
                Binary::LazyAnd | Binary::LazyOr | Binary::Any | Binary::All | Binary::TryOr,
                _,
                _,
            ) => Err(ExecutionError::InvalidBinaryOp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::symbol::SymbolTable;
    use std::collections::BTreeSet;

    fn eval(ops: Vec<Op>) -> Result<Value, ExecutionError> {
        eval_with(ops, &BTreeMap::new(), &SymbolTable::new())
    }

    fn eval_with(
        ops: Vec<Op>,
        values: &BTreeMap<u32, Value>,
        table: &SymbolTable,
    ) -> Result<Value, ExecutionError> {
        let mut symbols = TemporarySymbolTable::new(table);
        Expression { ops }.evaluate(values, &mut symbols)
    }

    fn int(i: i64) -> Op {
        Op::Value(Term::Value(Value::Integer(i)))
    }

    fn boolean(b: bool) -> Op {
        Op::Value(Term::Value(Value::Bool(b)))
    }

    #[test]
    fn arithmetic_precedence_program() {
        // 1 + 2 * 3 - 4 / 2 == 5, as postfix.
        let ops = vec![
            int(1),
            int(2),
            int(3),
            Op::Binary(Binary::Mul),
            Op::Binary(Binary::Add),
            int(4),
            int(2),
            Op::Binary(Binary::Div),
            Op::Binary(Binary::Sub),
            int(5),
            Op::Binary(Binary::HeterogeneousEqual),
        ];
        assert_eq!(eval(ops), Ok(Value::Bool(true)));
    }

    #[test]
    fn overflow_is_reported() {
        let ops = vec![
            int(10_000_000_000),
            int(10_000_000_000),
            Op::Binary(Binary::Mul),
        ];
        assert_eq!(eval(ops), Err(ExecutionError::Overflow));
    }

    #[test]
    fn divide_by_zero_is_overflow() {
        let ops = vec![int(1), int(0), Op::Binary(Binary::Div)];
        assert_eq!(eval(ops), Err(ExecutionError::Overflow));
    }

    #[test]
    fn strict_equality_requires_same_tag() {
        let ops = vec![int(1), boolean(true), Op::Binary(Binary::Equal)];
        assert_eq!(eval(ops), Err(ExecutionError::TypeError));
    }

    #[test]
    fn heterogeneous_equality_crosses_tags() {
        let ops = vec![int(1), boolean(true), Op::Binary(Binary::HeterogeneousEqual)];
        assert_eq!(eval(ops), Ok(Value::Bool(false)));
        let ops = vec![
            int(1),
            boolean(true),
            Op::Binary(Binary::HeterogeneousNotEqual),
        ];
        assert_eq!(eval(ops), Ok(Value::Bool(true)));
    }

    #[test]
    fn string_concatenation_interns_temporarily() {
        let mut table = SymbolTable::new();
        let hello = table.insert("hello ");
        let world = table.insert("world");
        let expected_full = "hello world";
        let ops = vec![
            Op::Value(Term::Value(Value::Str(hello))),
            Op::Value(Term::Value(Value::Str(world))),
            Op::Binary(Binary::Add),
        ];
        let mut symbols = TemporarySymbolTable::new(&table);
        let result = Expression { ops }
            .evaluate(&BTreeMap::new(), &mut symbols)
            .unwrap();
        match result {
            Value::Str(i) => assert_eq!(symbols.get_symbol(i), Some(expected_full)),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn unknown_variable_is_reported() {
        let ops = vec![Op::Value(Term::Variable(42))];
        assert_eq!(eval(ops), Err(ExecutionError::UnknownVariable(42)));
    }

    #[test]
    fn variable_substitution() {
        let mut values = BTreeMap::new();
        values.insert(7, Value::Integer(10));
        let ops = vec![
            Op::Value(Term::Variable(7)),
            int(5),
            Op::Binary(Binary::GreaterThan),
        ];
        assert_eq!(
            eval_with(ops, &values, &SymbolTable::new()),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn lazy_and_short_circuits() {
        // false && <closure that would error> => false
        let diverging = Closure {
            params: vec![],
            ops: vec![Op::Value(Term::Variable(99))],
        };
        let ops = vec![
            boolean(false),
            Op::Closure(diverging),
            Op::Binary(Binary::LazyAnd),
        ];
        assert_eq!(eval(ops), Ok(Value::Bool(false)));
    }

    #[test]
    fn lazy_or_evaluates_closure_when_needed() {
        let truthy = Closure {
            params: vec![],
            ops: vec![boolean(true)],
        };
        let ops = vec![
            boolean(false),
            Op::Closure(truthy),
            Op::Binary(Binary::LazyOr),
        ];
        assert_eq!(eval(ops), Ok(Value::Bool(true)));
    }

    #[test]
    fn any_over_set_short_circuits() {
        let set: BTreeSet<Value> = [1, 2, 3].into_iter().map(Value::Integer).collect();
        let gt2 = Closure {
            params: vec![0],
            ops: vec![
                Op::Value(Term::Variable(0)),
                int(2),
                Op::Binary(Binary::GreaterThan),
            ],
        };
        let ops = vec![
            Op::Value(Term::Value(Value::Set(set))),
            Op::Closure(gt2),
            Op::Binary(Binary::Any),
        ];
        assert_eq!(eval(ops), Ok(Value::Bool(true)));
    }

    #[test]
    fn all_over_map_sees_key_value_pairs() {
        let mut map = BTreeMap::new();
        map.insert(MapKey::Integer(1), Value::Integer(10));
        map.insert(MapKey::Integer(2), Value::Integer(20));
        // all([key, value] -> value > key)
        let body = Closure {
            params: vec![0],
            ops: vec![
                Op::Value(Term::Variable(0)),
                int(1),
                Op::Binary(Binary::Get),
                Op::Value(Term::Variable(0)),
                int(0),
                Op::Binary(Binary::Get),
                Op::Binary(Binary::GreaterThan),
            ],
        };
        let ops = vec![
            Op::Value(Term::Value(Value::Map(map))),
            Op::Closure(body),
            Op::Binary(Binary::All),
        ];
        assert_eq!(eval(ops), Ok(Value::Bool(true)));
    }

    #[test]
    fn closure_shadowing_is_rejected() {
        let mut values = BTreeMap::new();
        values.insert(0, Value::Integer(1));
        let shadowing = Closure {
            params: vec![0],
            ops: vec![boolean(true)],
        };
        let ops = vec![
            Op::Value(Term::Value(Value::Array(vec![Value::Integer(1)]))),
            Op::Closure(shadowing),
            Op::Binary(Binary::Any),
        ];
        assert_eq!(
            eval_with(ops, &values, &SymbolTable::new()),
            Err(ExecutionError::VariableShadowing(0))
        );
    }

    #[test]
    fn try_or_recovers_type_errors_only() {
        // (1 === true).try_or(true) => true
        let failing = Closure {
            params: vec![],
            ops: vec![int(1), boolean(true), Op::Binary(Binary::Equal)],
        };
        let ops = vec![
            Op::Closure(failing),
            boolean(true),
            Op::Binary(Binary::TryOr),
        ];
        assert_eq!(eval(ops), Ok(Value::Bool(true)));

        // Overflow is not recovered.
        let overflowing = Closure {
            params: vec![],
            ops: vec![int(i64::MAX), int(1), Op::Binary(Binary::Add)],
        };
        let ops = vec![
            Op::Closure(overflowing),
            boolean(true),
            Op::Binary(Binary::TryOr),
        ];
        assert_eq!(eval(ops), Err(ExecutionError::Overflow));
    }

    #[test]
    fn contains_variants() {
        let mut table = SymbolTable::new();
        let hay = table.insert("warrant");
        let needle = table.insert("rran");
        let ops = vec![
            Op::Value(Term::Value(Value::Str(hay))),
            Op::Value(Term::Value(Value::Str(needle))),
            Op::Binary(Binary::Contains),
        ];
        assert_eq!(
            eval_with(ops, &BTreeMap::new(), &table),
            Ok(Value::Bool(true))
        );

        let big: BTreeSet<Value> = [1, 2, 3].into_iter().map(Value::Integer).collect();
        let small: BTreeSet<Value> = [1, 3].into_iter().map(Value::Integer).collect();
        let ops = vec![
            Op::Value(Term::Value(Value::Set(big))),
            Op::Value(Term::Value(Value::Set(small))),
            Op::Binary(Binary::Contains),
        ];
        assert_eq!(eval(ops), Ok(Value::Bool(true)));

        let mut map = BTreeMap::new();
        map.insert(MapKey::Integer(1), Value::Bool(true));
        let ops = vec![
            Op::Value(Term::Value(Value::Map(map))),
            int(1),
            Op::Binary(Binary::Contains),
        ];
        assert_eq!(eval(ops), Ok(Value::Bool(true)));
    }

    #[test]
    fn regex_matches_unanchored() {
        let mut table = SymbolTable::new();
        let subject = table.insert("user-123");
        let pattern = table.insert("[0-9]+");
        let bad_pattern = table.insert("[");
        let ops = vec![
            Op::Value(Term::Value(Value::Str(subject))),
            Op::Value(Term::Value(Value::Str(pattern))),
            Op::Binary(Binary::Regex),
        ];
        assert_eq!(
            eval_with(ops, &BTreeMap::new(), &table),
            Ok(Value::Bool(true))
        );
        let ops = vec![
            Op::Value(Term::Value(Value::Str(subject))),
            Op::Value(Term::Value(Value::Str(bad_pattern))),
            Op::Binary(Binary::Regex),
        ];
        assert_eq!(
            eval_with(ops, &BTreeMap::new(), &table),
            Ok(Value::Bool(false))
        );
    }

    #[test]
    fn get_returns_null_when_absent() {
        let array = Value::Array(vec![Value::Integer(7)]);
        let ops = vec![
            Op::Value(Term::Value(array.clone())),
            int(3),
            Op::Binary(Binary::Get),
        ];
        assert_eq!(eval(ops), Ok(Value::Null));
        let ops = vec![Op::Value(Term::Value(array)), int(-1), Op::Binary(Binary::Get)];
        assert_eq!(eval(ops), Ok(Value::Null));
    }

    #[test]
    fn length_and_type_of() {
        let mut table = SymbolTable::new();
        let s = table.insert("héllo");
        let ops = vec![Op::Value(Term::Value(Value::Str(s))), Op::Unary(Unary::Length)];
        // UTF-8 byte length, not character count.
        assert_eq!(
            eval_with(ops, &BTreeMap::new(), &table),
            Ok(Value::Integer(6))
        );

        let mut symbols = TemporarySymbolTable::new(&table);
        let result = Expression {
            ops: vec![int(1), Op::Unary(Unary::TypeOf)],
        }
        .evaluate(&BTreeMap::new(), &mut symbols)
        .unwrap();
        match result {
            Value::Str(i) => assert_eq!(symbols.get_symbol(i), Some("integer")),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn stack_misuse_is_invalid_expression() {
        assert_eq!(eval(vec![]), Err(ExecutionError::InvalidExpression));
        assert_eq!(
            eval(vec![int(1), int(2)]),
            Err(ExecutionError::InvalidExpression)
        );
        // A bare closure is not a value.
        let c = Closure {
            params: vec![],
            ops: vec![boolean(true)],
        };
        assert_eq!(
            eval(vec![Op::Closure(c)]),
            Err(ExecutionError::InvalidExpression)
        );
    }

    #[test]
    fn wrong_arity_is_reported() {
        let two_params = Closure {
            params: vec![0, 1],
            ops: vec![boolean(true)],
        };
        let ops = vec![
            Op::Value(Term::Value(Value::Array(vec![Value::Integer(1)]))),
            Op::Closure(two_params),
            Op::Binary(Binary::Any),
        ];
        assert_eq!(
            eval(ops),
            Err(ExecutionError::WrongArity {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn set_algebra() {
        let a: BTreeSet<Value> = [1, 2].into_iter().map(Value::Integer).collect();
        let b: BTreeSet<Value> = [2, 3].into_iter().map(Value::Integer).collect();
        let ops = vec![
            Op::Value(Term::Value(Value::Set(a.clone()))),
            Op::Value(Term::Value(Value::Set(b.clone()))),
            Op::Binary(Binary::Intersection),
        ];
        let expected: BTreeSet<Value> = [2].into_iter().map(Value::Integer).collect();
        assert_eq!(eval(ops), Ok(Value::Set(expected)));

        let ops = vec![
            Op::Value(Term::Value(Value::Set(a))),
            Op::Value(Term::Value(Value::Set(b))),
            Op::Binary(Binary::Union),
        ];
        let expected: BTreeSet<Value> = [1, 2, 3].into_iter().map(Value::Integer).collect();
        assert_eq!(eval(ops), Ok(Value::Set(expected)));
    }
}
