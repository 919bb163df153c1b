//! Canonical text rendering of program elements.
//!
//! The output is parseable by [`crate::parser`], so printing a block and
//! parsing it back yields the same AST. Expressions are rebuilt from
//! postfix into infix form, inserting parentheses wherever the grammar's
//! precedence would otherwise change the shape.

use core::fmt;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::datalog::{Binary, CheckKind, Unary};

use super::{Check, Expression, Fact, MapKey, Op, Policy, PolicyKind, Predicate, Rule, Scope, Term};

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(name) => write!(f, "${name}"),
            Term::Integer(i) => write!(f, "{i}"),
            Term::Str(s) => write!(f, "\"{}\"", escape_string(s)),
            Term::Date(d) => {
                let formatted = i64::try_from(*d)
                    .ok()
                    .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
                    .and_then(|t| t.format(&Rfc3339).ok());
                match formatted {
                    Some(text) => write!(f, "{text}"),
                    None => write!(f, "{d}"),
                }
            }
            Term::Bytes(b) => write!(f, "hex:{}", hex::encode(b)),
            Term::Bool(true) => write!(f, "true"),
            Term::Bool(false) => write!(f, "false"),
            Term::Null => write!(f, "null"),
            Term::Set(terms) => {
                let inner: Vec<String> = terms.iter().map(ToString::to_string).collect();
                write!(f, "{{{}}}", inner.join(", "))
            }
            Term::Array(terms) => {
                let inner: Vec<String> = terms.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", inner.join(", "))
            }
            Term::Map(entries) => {
                if entries.is_empty() {
                    // `{}` is the empty set; the empty map needs its own
                    // spelling.
                    return write!(f, "{{,}}");
                }
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect();
                write!(f, "{{{}}}", inner.join(", "))
            }
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Integer(i) => write!(f, "{i}"),
            MapKey::Str(s) => write!(f, "\"{}\"", escape_string(s)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.terms.iter().map(ToString::to_string).collect();
        write!(f, "{}({})", self.name, terms.join(", "))
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.predicate)
    }
}

/// Highest precedence: atoms and method-call results.
const ATOM: u8 = 9;

const fn binary_precedence(op: Binary) -> u8 {
    match op {
        Binary::Mul | Binary::Div => 8,
        Binary::Add | Binary::Sub => 7,
        Binary::BitwiseAnd => 6,
        Binary::BitwiseOr => 5,
        Binary::BitwiseXor => 4,
        Binary::LessThan
        | Binary::GreaterThan
        | Binary::LessOrEqual
        | Binary::GreaterOrEqual
        | Binary::Equal
        | Binary::NotEqual
        | Binary::HeterogeneousEqual
        | Binary::HeterogeneousNotEqual => 3,
        Binary::And | Binary::LazyAnd => 2,
        Binary::Or | Binary::LazyOr => 1,
        // Method-call syntax; never printed infix.
        _ => ATOM,
    }
}

const fn infix_symbol(op: Binary) -> Option<&'static str> {
    match op {
        Binary::LessThan => Some("<"),
        Binary::GreaterThan => Some(">"),
        Binary::LessOrEqual => Some("<="),
        Binary::GreaterOrEqual => Some(">="),
        Binary::Equal => Some("==="),
        Binary::NotEqual => Some("!=="),
        Binary::HeterogeneousEqual => Some("=="),
        Binary::HeterogeneousNotEqual => Some("!="),
        Binary::Add => Some("+"),
        Binary::Sub => Some("-"),
        Binary::Mul => Some("*"),
        Binary::Div => Some("/"),
        Binary::And | Binary::LazyAnd => Some("&&"),
        Binary::Or | Binary::LazyOr => Some("||"),
        Binary::BitwiseAnd => Some("&"),
        Binary::BitwiseOr => Some("|"),
        Binary::BitwiseXor => Some("^"),
        _ => None,
    }
}

const fn method_name(op: Binary) -> Option<&'static str> {
    match op {
        Binary::Contains => Some("contains"),
        Binary::Prefix => Some("starts_with"),
        Binary::Suffix => Some("ends_with"),
        Binary::Regex => Some("matches"),
        Binary::Intersection => Some("intersection"),
        Binary::Union => Some("union"),
        Binary::Get => Some("get"),
        Binary::Any => Some("any"),
        Binary::All => Some("all"),
        Binary::TryOr => Some("try_or"),
        _ => None,
    }
}

enum Rendered {
    Value(String, u8),
    Closure(Vec<String>, String, u8),
}

impl Rendered {
    fn value(self) -> Option<(String, u8)> {
        match self {
            Rendered::Value(text, precedence) => Some((text, precedence)),
            Rendered::Closure(..) => None,
        }
    }
}

fn parenthesize(text: &str, precedence: u8, minimum: u8) -> String {
    if precedence < minimum {
        format!("({text})")
    } else {
        text.to_string()
    }
}

fn render_ops(ops: &[Op]) -> Option<(String, u8)> {
    let mut stack: Vec<Rendered> = Vec::new();
    for op in ops {
        match op {
            Op::Value(term) => stack.push(Rendered::Value(term.to_string(), ATOM)),
            Op::Closure(params, body) => {
                let (text, precedence) = render_ops(body)?;
                stack.push(Rendered::Closure(params.clone(), text, precedence));
            }
            Op::Unary(unary) => {
                let (text, precedence) = stack.pop()?.value()?;
                let rendered = match unary {
                    Unary::Negate => format!("!{}", parenthesize(&text, precedence, ATOM)),
                    Unary::Length => {
                        format!("{}.length()", parenthesize(&text, precedence, ATOM))
                    }
                    Unary::TypeOf => format!("{}.type()", parenthesize(&text, precedence, ATOM)),
                };
                stack.push(Rendered::Value(rendered, ATOM));
            }
            Op::Binary(binary) => {
                let right = stack.pop()?;
                let left = stack.pop()?;
                let rendered = render_binary(*binary, left, right)?;
                stack.push(rendered);
            }
        }
    }
    if stack.len() == 1 {
        stack.pop()?.value()
    } else {
        None
    }
}

fn render_binary(op: Binary, left: Rendered, right: Rendered) -> Option<Rendered> {
    match op {
        Binary::LazyAnd | Binary::LazyOr => {
            let (left_text, left_precedence) = left.value()?;
            let precedence = binary_precedence(op);
            let symbol = infix_symbol(op)?;
            let (right_text, right_precedence) = match right {
                // The parser wraps the right side in a nullary closure;
                // unwrap it for display.
                Rendered::Closure(params, text, p) if params.is_empty() => (text, p),
                Rendered::Value(text, p) => (text, p),
                Rendered::Closure(..) => return None,
            };
            let text = format!(
                "{} {} {}",
                parenthesize(&left_text, left_precedence, precedence),
                symbol,
                parenthesize(&right_text, right_precedence, precedence + 1),
            );
            Some(Rendered::Value(text, precedence))
        }
        Binary::Any | Binary::All => {
            let (receiver, receiver_precedence) = left.value()?;
            let Rendered::Closure(params, body, _) = right else {
                return None;
            };
            let params: Vec<String> = params.iter().map(|p| format!("${p}")).collect();
            let text = format!(
                "{}.{}({} -> {})",
                parenthesize(&receiver, receiver_precedence, ATOM),
                method_name(op)?,
                params.join(", "),
                body,
            );
            Some(Rendered::Value(text, ATOM))
        }
        Binary::TryOr => {
            // The receiver is a nullary closure wrapped by the parser.
            let (receiver, receiver_precedence) = match left {
                Rendered::Closure(params, text, p) if params.is_empty() => (text, p),
                Rendered::Value(text, p) => (text, p),
                Rendered::Closure(..) => return None,
            };
            let (argument, _) = right.value()?;
            let text = format!(
                "{}.try_or({})",
                parenthesize(&receiver, receiver_precedence, ATOM),
                argument,
            );
            Some(Rendered::Value(text, ATOM))
        }
        _ => {
            let (left_text, left_precedence) = left.value()?;
            let (right_text, right_precedence) = right.value()?;
            if let Some(name) = method_name(op) {
                let text = format!(
                    "{}.{}({})",
                    parenthesize(&left_text, left_precedence, ATOM),
                    name,
                    right_text,
                );
                return Some(Rendered::Value(text, ATOM));
            }
            let precedence = binary_precedence(op);
            let symbol = infix_symbol(op)?;
            // Comparisons are non-associative: a same-level left child
            // must keep its parentheses or the output would not parse.
            let left_minimum = if precedence == 3 { precedence + 1 } else { precedence };
            let text = format!(
                "{} {} {}",
                parenthesize(&left_text, left_precedence, left_minimum),
                symbol,
                parenthesize(&right_text, right_precedence, precedence + 1),
            );
            Some(Rendered::Value(text, precedence))
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match render_ops(&self.ops) {
            Some((text, _)) => write!(f, "{text}"),
            None => write!(f, "<invalid expression>"),
        }
    }
}

fn write_scopes(f: &mut fmt::Formatter<'_>, scopes: &[Scope]) -> fmt::Result {
    if scopes.is_empty() {
        return Ok(());
    }
    let rendered: Vec<String> = scopes.iter().map(ToString::to_string).collect();
    write!(f, " trusting {}", rendered.join(", "))
}

fn write_body(f: &mut fmt::Formatter<'_>, rule: &Rule) -> fmt::Result {
    let mut parts: Vec<String> = rule.body.iter().map(ToString::to_string).collect();
    parts.extend(rule.expressions.iter().map(ToString::to_string));
    write!(f, "{}", parts.join(", "))?;
    write_scopes(f, &rule.scopes)
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- ", self.head)?;
        write_body(f, self)
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self.kind {
            CheckKind::One => "check if",
            CheckKind::All => "check all",
            CheckKind::Reject => "reject if",
        };
        write!(f, "{keyword} ")?;
        for (i, query) in self.queries.iter().enumerate() {
            if i > 0 {
                write!(f, " or ")?;
            }
            write_body(f, query)?;
        }
        Ok(())
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self.kind {
            PolicyKind::Allow => "allow if",
            PolicyKind::Deny => "deny if",
        };
        write!(f, "{keyword} ")?;
        for (i, query) in self.queries.iter().enumerate() {
            if i > 0 {
                write!(f, " or ")?;
            }
            write_body(f, query)?;
        }
        Ok(())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Authority => write!(f, "authority"),
            Scope::Previous => write!(f, "previous"),
            Scope::PublicKey(key) => write!(f, "{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{boolean, fact, int, pred, rule, string, var};
    use super::*;
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    #[test]
    fn term_display() {
        assert_eq!(var("who").to_string(), "$who");
        assert_eq!(int(-3).to_string(), "-3");
        assert_eq!(string("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Term::Date(1_575_452_801).to_string(), "2019-12-04T09:46:41Z");
        assert_eq!(Term::Bytes(vec![0x0a, 0x0b]).to_string(), "hex:0a0b");
        assert_eq!(boolean(true).to_string(), "true");
        assert_eq!(Term::Null.to_string(), "null");
    }

    #[test]
    fn collection_display() {
        let s: BTreeSet<Term> = [int(2), int(1)].into_iter().collect();
        assert_eq!(Term::Set(s).to_string(), "{1, 2}");
        assert_eq!(Term::Array(vec![int(1), int(2)]).to_string(), "[1, 2]");
        let mut m = BTreeMap::new();
        m.insert(MapKey::Str("a".into()), int(1));
        assert_eq!(Term::Map(m).to_string(), "{\"a\": 1}");
        assert_eq!(Term::Set(BTreeSet::new()).to_string(), "{}");
        assert_eq!(Term::Map(BTreeMap::new()).to_string(), "{,}");
    }

    #[test]
    fn fact_display() {
        assert_eq!(
            fact("user", [int(1234)]).to_string(),
            "user(1234)"
        );
        assert_eq!(
            fact("right", [string("file1"), string("read")]).to_string(),
            "right(\"file1\", \"read\")"
        );
    }

    #[test]
    fn rule_display() {
        let r = rule(
            pred("right", [var("file"), string("read")]),
            vec![pred("owner", [var("user"), var("file")])],
        );
        assert_eq!(
            r.to_string(),
            "right($file, \"read\") <- owner($user, $file)"
        );
    }

    #[test]
    fn expression_display_rebuilds_infix() {
        // 1 + 2 * 3 as postfix.
        let e = Expression {
            ops: vec![
                Op::Value(int(1)),
                Op::Value(int(2)),
                Op::Value(int(3)),
                Op::Binary(Binary::Mul),
                Op::Binary(Binary::Add),
            ],
        };
        assert_eq!(e.to_string(), "1 + 2 * 3");

        // (1 + 2) * 3 needs parentheses back.
        let e = Expression {
            ops: vec![
                Op::Value(int(1)),
                Op::Value(int(2)),
                Op::Binary(Binary::Add),
                Op::Value(int(3)),
                Op::Binary(Binary::Mul),
            ],
        };
        assert_eq!(e.to_string(), "(1 + 2) * 3");
    }

    #[test]
    fn method_and_closure_display() {
        let e = Expression {
            ops: vec![
                Op::Value(var("set")),
                Op::Closure(
                    vec!["x".to_string()],
                    vec![
                        Op::Value(var("x")),
                        Op::Value(int(0)),
                        Op::Binary(Binary::GreaterThan),
                    ],
                ),
                Op::Binary(Binary::Any),
            ],
        };
        assert_eq!(e.to_string(), "$set.any($x -> $x > 0)");
    }

    #[test]
    fn lazy_operator_display_unwraps_closure() {
        let e = Expression {
            ops: vec![
                Op::Value(boolean(true)),
                Op::Closure(vec![], vec![Op::Value(boolean(false))]),
                Op::Binary(Binary::LazyAnd),
            ],
        };
        assert_eq!(e.to_string(), "true && false");
    }

    #[test]
    fn check_display() {
        let check = Check {
            kind: CheckKind::One,
            queries: vec![super::super::query(
                vec![pred("operation", [string("read")])],
                vec![],
                vec![],
            )],
        };
        assert_eq!(check.to_string(), "check if operation(\"read\")");
    }

    #[test]
    fn policy_display() {
        let policy = Policy {
            kind: PolicyKind::Allow,
            queries: vec![super::super::query(
                vec![pred("user", [int(1234)])],
                vec![],
                vec![],
            )],
        };
        assert_eq!(policy.to_string(), "allow if user(1234)");
    }

    #[test]
    fn scope_display() {
        assert_eq!(Scope::Authority.to_string(), "authority");
        assert_eq!(Scope::Previous.to_string(), "previous");
    }
}
