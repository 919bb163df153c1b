//! Recursive-descent parser for the text-form Datalog grammar.
//!
//! The grammar is the canonical interchange form: facts, rules, checks,
//! policies and `trusting` scope declarations, each terminated by a
//! semicolon. Expressions use the precedence ladder (tightest first)
//! multiplicative, additive, bitwise and/or/xor, comparisons (non
//! associative), `&&`, `||`; method calls bind tighter than everything
//! else. `&&`, `||` and `try_or` receivers compile to lazy closures.

mod lexer;

use std::collections::{BTreeMap, BTreeSet};

use crate::builder::{
    query, Check, Expression, Fact, MapKey, Op, Policy, PolicyKind, Predicate, Rule, Scope, Term,
};
use crate::crypto::PublicKey;
use crate::datalog::{Binary, CheckKind, Unary};
use crate::error::ParseError;

use lexer::{tokenize, Spanned, Token};

/// The parsed content of a block's source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSource {
    /// Facts, in source order.
    pub facts: Vec<Fact>,
    /// Rules, in source order.
    pub rules: Vec<Rule>,
    /// Checks, in source order.
    pub checks: Vec<Check>,
    /// Block-wide trust declarations.
    pub scopes: Vec<Scope>,
}

/// The parsed content of an authorizer's source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizerSource {
    /// Facts, in source order.
    pub facts: Vec<Fact>,
    /// Rules, in source order.
    pub rules: Vec<Rule>,
    /// Checks, in source order.
    pub checks: Vec<Check>,
    /// Policies, in declaration order.
    pub policies: Vec<Policy>,
    /// Authorizer-wide trust declarations.
    pub scopes: Vec<Scope>,
}

/// Parse block-grammar source (no policies).
///
/// # Errors
///
/// Any [`ParseError`]; policies are rejected as unknown block elements.
pub fn parse_block_source(source: &str) -> Result<BlockSource, ParseError> {
    let mut parser = Parser::new(source)?;
    let mut block = BlockSource::default();
    while !parser.at_end() {
        match parser.parse_statement()? {
            Statement::Fact(fact) => block.facts.push(fact),
            Statement::Rule(rule) => block.rules.push(rule),
            Statement::Check(check) => block.checks.push(check),
            Statement::Scopes(scopes) => block.scopes.extend(scopes),
            Statement::Policy(policy) => {
                let keyword = match policy.kind {
                    PolicyKind::Allow => "allow",
                    PolicyKind::Deny => "deny",
                };
                return Err(ParseError::UnknownBlockElement(keyword.to_string()));
            }
        }
        parser.expect_semicolon()?;
    }
    Ok(block)
}

/// Parse authorizer-grammar source (policies allowed).
///
/// # Errors
///
/// Any [`ParseError`].
pub fn parse_authorizer_source(source: &str) -> Result<AuthorizerSource, ParseError> {
    let mut parser = Parser::new(source)?;
    let mut authorizer = AuthorizerSource::default();
    while !parser.at_end() {
        match parser.parse_statement()? {
            Statement::Fact(fact) => authorizer.facts.push(fact),
            Statement::Rule(rule) => authorizer.rules.push(rule),
            Statement::Check(check) => authorizer.checks.push(check),
            Statement::Policy(policy) => authorizer.policies.push(policy),
            Statement::Scopes(scopes) => authorizer.scopes.extend(scopes),
        }
        parser.expect_semicolon()?;
    }
    Ok(authorizer)
}

/// Parse a single fact.
///
/// # Errors
///
/// Any [`ParseError`]; variables are rejected.
pub fn parse_fact(source: &str) -> Result<Fact, ParseError> {
    single(source, Parser::parse_fact)
}

/// Parse a single rule.
///
/// # Errors
///
/// Any [`ParseError`]; unbound head variables are rejected.
pub fn parse_rule(source: &str) -> Result<Rule, ParseError> {
    single(source, |parser| {
        let head = parser.parse_predicate()?;
        parser.expect(&Token::RuleArrow)?;
        parser.parse_rule_with_head(head)
    })
}

/// Parse a single check.
///
/// # Errors
///
/// Any [`ParseError`].
pub fn parse_check(source: &str) -> Result<Check, ParseError> {
    single(source, |parser| match parser.parse_statement()? {
        Statement::Check(check) => Ok(check),
        _ => Err(ParseError::UnknownCheck(source.trim().to_string())),
    })
}

/// Parse a single policy.
///
/// # Errors
///
/// Any [`ParseError`].
pub fn parse_policy(source: &str) -> Result<Policy, ParseError> {
    single(source, |parser| match parser.parse_statement()? {
        Statement::Policy(policy) => Ok(policy),
        _ => Err(ParseError::UnknownPolicy(source.trim().to_string())),
    })
}

fn single<T>(
    source: &str,
    parse: impl FnOnce(&mut Parser) -> Result<T, ParseError>,
) -> Result<T, ParseError> {
    let mut parser = Parser::new(source)?;
    let item = parse(&mut parser)?;
    // A trailing semicolon is tolerated on single items.
    if parser.peek() == Some(&Token::Semicolon) {
        parser.advance();
    }
    match parser.peek() {
        None => Ok(item),
        Some(token) => Err(ParseError::UnknownBlockElement(format!("{token:?}"))),
    }
}

enum Statement {
    Fact(Fact),
    Rule(Rule),
    Check(Check),
    Policy(Policy),
    Scopes(Vec<Scope>),
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    end_offset: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(source)?,
            index: 0,
            end_offset: source.len(),
        })
    }

    fn at_end(&self) -> bool {
        self.index >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|s| &s.token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.index + ahead).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.index)
            .map_or(self.end_offset, |s| s.offset)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.index).map(|s| &s.token);
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn next(&mut self) -> Result<&Token, ParseError> {
        let index = self.index;
        if index >= self.tokens.len() {
            return Err(ParseError::UnexpectedEnd);
        }
        self.index += 1;
        Ok(&self.tokens[index].token)
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        match self.peek() {
            Some(token) if token == expected => {
                self.index += 1;
                Ok(())
            }
            Some(token) => Err(ParseError::UnknownRuleElement(format!("{token:?}"))),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn expect_semicolon(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Some(Token::Semicolon) => {
                self.index += 1;
                Ok(())
            }
            _ => Err(ParseError::MissingSemicolon(self.offset())),
        }
    }

    fn expect_right_paren(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Some(Token::RightParen) => {
                self.index += 1;
                Ok(())
            }
            _ => Err(ParseError::MissingRightParen(self.offset())),
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let Some(token) = self.peek() else {
            return Err(ParseError::UnexpectedEnd);
        };
        match token {
            Token::Ident(word) => match word.as_str() {
                "check" => {
                    self.advance();
                    let kind = match self.next()? {
                        Token::Ident(k) if k == "if" => CheckKind::One,
                        Token::Ident(k) if k == "all" => CheckKind::All,
                        other => return Err(ParseError::UnknownCheck(format!("{other:?}"))),
                    };
                    Ok(Statement::Check(Check {
                        kind,
                        queries: self.parse_queries()?,
                    }))
                }
                "reject" => {
                    self.advance();
                    match self.next()? {
                        Token::Ident(k) if k == "if" => {}
                        other => return Err(ParseError::UnknownCheck(format!("{other:?}"))),
                    }
                    Ok(Statement::Check(Check {
                        kind: CheckKind::Reject,
                        queries: self.parse_queries()?,
                    }))
                }
                "allow" | "deny" => {
                    let kind = if word == "allow" {
                        PolicyKind::Allow
                    } else {
                        PolicyKind::Deny
                    };
                    self.advance();
                    match self.next()? {
                        Token::Ident(k) if k == "if" => {}
                        other => return Err(ParseError::UnknownPolicy(format!("{other:?}"))),
                    }
                    Ok(Statement::Policy(Policy {
                        kind,
                        queries: self.parse_queries()?,
                    }))
                }
                "trusting" => {
                    self.advance();
                    Ok(Statement::Scopes(self.parse_scopes()?))
                }
                _ => {
                    let head = self.parse_predicate()?;
                    if self.peek() == Some(&Token::RuleArrow) {
                        self.advance();
                        Ok(Statement::Rule(self.parse_rule_with_head(head)?))
                    } else {
                        Ok(Statement::Fact(Self::fact_from_predicate(head)?))
                    }
                }
            },
            other => Err(ParseError::UnknownBlockElement(format!("{other:?}"))),
        }
    }

    fn parse_fact(&mut self) -> Result<Fact, ParseError> {
        let predicate = self.parse_predicate()?;
        Self::fact_from_predicate(predicate)
    }

    fn fact_from_predicate(predicate: Predicate) -> Result<Fact, ParseError> {
        if predicate
            .terms
            .iter()
            .any(|t| matches!(t, Term::Variable(_)))
        {
            return Err(ParseError::VariableInFact);
        }
        Ok(Fact { predicate })
    }

    fn parse_predicate(&mut self) -> Result<Predicate, ParseError> {
        let name = match self.next()? {
            Token::Ident(name) => name.clone(),
            other => return Err(ParseError::UnknownPredicate(format!("{other:?}"))),
        };
        self.expect(&Token::LeftParen)?;
        let mut terms = Vec::new();
        if self.peek() != Some(&Token::RightParen) {
            loop {
                terms.push(self.parse_term()?);
                if self.peek() == Some(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_right_paren()?;
        Ok(Predicate { name, terms })
    }

    fn parse_rule_with_head(&mut self, head: Predicate) -> Result<Rule, ParseError> {
        let body = self.parse_rule_body()?;
        let rule = Rule::new(head, body.0, body.1, body.2);

        // Every top-level head variable must be bound by the body.
        for term in &rule.head.terms {
            if let Term::Variable(name) = term {
                let bound = rule.body.iter().any(|p| {
                    p.terms
                        .iter()
                        .any(|t| matches!(t, Term::Variable(v) if v == name))
                });
                if !bound {
                    return Err(ParseError::VariableInHeadAlone(name.clone()));
                }
            }
        }
        Ok(rule)
    }

    fn parse_queries(&mut self) -> Result<Vec<Rule>, ParseError> {
        let mut queries = Vec::new();
        loop {
            let (body, expressions, scopes) = self.parse_rule_body()?;
            queries.push(query(body, expressions, scopes));
            match self.peek() {
                Some(Token::Ident(word)) if word == "or" => {
                    self.advance();
                }
                _ => break,
            }
        }
        Ok(queries)
    }

    /// Comma-separated predicates and expressions, then an optional
    /// `trusting` annotation.
    #[allow(clippy::type_complexity)]
    fn parse_rule_body(
        &mut self,
    ) -> Result<(Vec<Predicate>, Vec<Expression>, Vec<Scope>), ParseError> {
        let mut body = Vec::new();
        let mut expressions = Vec::new();
        loop {
            if self.is_predicate_start() {
                body.push(self.parse_predicate()?);
            } else {
                expressions.push(Expression {
                    ops: self.parse_expression()?,
                });
            }
            if self.peek() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        let mut scopes = Vec::new();
        if let Some(Token::Ident(word)) = self.peek() {
            if word == "trusting" {
                self.advance();
                scopes = self.parse_scopes()?;
            }
        }
        Ok((body, expressions, scopes))
    }

    fn is_predicate_start(&self) -> bool {
        match self.peek() {
            Some(Token::Ident(word)) => {
                !matches!(word.as_str(), "true" | "false" | "null")
                    && self.peek_at(1) == Some(&Token::LeftParen)
            }
            _ => false,
        }
    }

    fn parse_scopes(&mut self) -> Result<Vec<Scope>, ParseError> {
        let mut scopes = Vec::new();
        loop {
            let scope = match self.next()? {
                Token::Ident(word) if word == "authority" => Scope::Authority,
                Token::Ident(word) if word == "previous" => Scope::Previous,
                Token::PublicKey(text) => {
                    let key: PublicKey = text
                        .parse()
                        .map_err(|_| ParseError::UnknownScope(text.clone()))?;
                    Scope::PublicKey(key)
                }
                other => return Err(ParseError::UnknownScope(format!("{other:?}"))),
            };
            scopes.push(scope);
            if self.peek() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(scopes)
    }

    // ------------------------------------------------------------------
    // Terms
    // ------------------------------------------------------------------

    fn parse_term(&mut self) -> Result<Term, ParseError> {
        let token = self.next()?.clone();
        match token {
            Token::Integer(i) => Ok(Term::Integer(i)),
            Token::Minus => match self.next()? {
                Token::Integer(i) => Ok(Term::Integer(-i)),
                other => Err(ParseError::UnknownTerm(format!("-{other:?}"))),
            },
            Token::Str(s) => Ok(Term::Str(s)),
            Token::Date(d) => Ok(Term::Date(d)),
            Token::Bytes(b) => Ok(Term::Bytes(b)),
            Token::Variable(v) => Ok(Term::Variable(v)),
            Token::Ident(word) => match word.as_str() {
                "true" => Ok(Term::Bool(true)),
                "false" => Ok(Term::Bool(false)),
                "null" => Ok(Term::Null),
                other => Err(ParseError::UnknownTerm(other.to_string())),
            },
            Token::LeftBracket => {
                let mut terms = Vec::new();
                if self.peek() != Some(&Token::RightBracket) {
                    loop {
                        terms.push(self.parse_term()?);
                        if self.peek() == Some(&Token::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RightBracket)?;
                Ok(Term::Array(terms))
            }
            Token::LeftBrace => self.parse_set_or_map(),
            other => Err(ParseError::UnknownTerm(format!("{other:?}"))),
        }
    }

    /// `{}` empty set, `{,}` empty map, `{a, b}` set, `{k: v}` map.
    fn parse_set_or_map(&mut self) -> Result<Term, ParseError> {
        match self.peek() {
            Some(Token::RightBrace) => {
                self.advance();
                return Ok(Term::Set(BTreeSet::new()));
            }
            Some(Token::Comma) => {
                self.advance();
                self.expect(&Token::RightBrace)?;
                return Ok(Term::Map(BTreeMap::new()));
            }
            _ => {}
        }

        let first = self.parse_term()?;
        if self.peek() == Some(&Token::Colon) {
            // Map literal.
            let mut entries = BTreeMap::new();
            self.advance();
            let mut key = Self::map_key(first)?;
            loop {
                if matches!(self.peek(), Some(Token::RightBrace | Token::Comma) | None) {
                    return Err(ParseError::MapMissingValue);
                }
                let value = self.parse_term()?;
                if entries.insert(key.clone(), value).is_some() {
                    return Err(ParseError::DuplicateMapKey(key.to_string()));
                }
                match self.peek() {
                    Some(Token::Comma) => {
                        self.advance();
                        let next_key = self.parse_term()?;
                        match self.peek() {
                            Some(Token::Colon) => {
                                self.advance();
                            }
                            _ => return Err(ParseError::MapMissingValue),
                        }
                        key = Self::map_key(next_key)?;
                    }
                    _ => break,
                }
            }
            self.expect(&Token::RightBrace)?;
            Ok(Term::Map(entries))
        } else {
            // Set literal.
            let mut terms = BTreeSet::new();
            let mut current = first;
            loop {
                if matches!(current, Term::Set(_)) {
                    return Err(ParseError::SetInSet);
                }
                terms.insert(current);
                match self.peek() {
                    Some(Token::Comma) => {
                        self.advance();
                        current = self.parse_term()?;
                    }
                    _ => break,
                }
            }
            self.expect(&Token::RightBrace)?;
            Ok(Term::Set(terms))
        }
    }

    fn map_key(term: Term) -> Result<MapKey, ParseError> {
        match term {
            Term::Integer(i) => Ok(MapKey::Integer(i)),
            Term::Str(s) => Ok(MapKey::Str(s)),
            other => Err(ParseError::InvalidMapKey(other.to_string())),
        }
    }

    // ------------------------------------------------------------------
    // Expressions (postfix op lists, produced directly)
    // ------------------------------------------------------------------

    fn parse_expression(&mut self) -> Result<Vec<Op>, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_and()?;
        while self.peek() == Some(&Token::PipePipe) {
            self.advance();
            let right = self.parse_and()?;
            ops.push(Op::Closure(vec![], right));
            ops.push(Op::Binary(Binary::LazyOr));
        }
        Ok(ops)
    }

    fn parse_and(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_comparison()?;
        while self.peek() == Some(&Token::AmpersandAmpersand) {
            self.advance();
            let right = self.parse_comparison()?;
            ops.push(Op::Closure(vec![], right));
            ops.push(Op::Binary(Binary::LazyAnd));
        }
        Ok(ops)
    }

    fn comparison_operator(&self) -> Option<Binary> {
        match self.peek() {
            Some(Token::LessThan) => Some(Binary::LessThan),
            Some(Token::GreaterThan) => Some(Binary::GreaterThan),
            Some(Token::LessOrEqual) => Some(Binary::LessOrEqual),
            Some(Token::GreaterOrEqual) => Some(Binary::GreaterOrEqual),
            Some(Token::Equal) => Some(Binary::HeterogeneousEqual),
            Some(Token::NotEqual) => Some(Binary::HeterogeneousNotEqual),
            Some(Token::StrictEqual) => Some(Binary::Equal),
            Some(Token::StrictNotEqual) => Some(Binary::NotEqual),
            _ => None,
        }
    }

    /// Comparisons are non-associative: `a < b < c` is an error.
    fn parse_comparison(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_bitwise_xor()?;
        if let Some(operator) = self.comparison_operator() {
            self.advance();
            let right = self.parse_bitwise_xor()?;
            ops.extend(right);
            ops.push(Op::Binary(operator));
            if self.comparison_operator().is_some() {
                return Err(ParseError::ChainedComparisons);
            }
        }
        Ok(ops)
    }

    fn parse_bitwise_xor(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_bitwise_or()?;
        while self.peek() == Some(&Token::Caret) {
            self.advance();
            let right = self.parse_bitwise_or()?;
            ops.extend(right);
            ops.push(Op::Binary(Binary::BitwiseXor));
        }
        Ok(ops)
    }

    fn parse_bitwise_or(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_bitwise_and()?;
        while self.peek() == Some(&Token::Pipe) {
            self.advance();
            let right = self.parse_bitwise_and()?;
            ops.extend(right);
            ops.push(Op::Binary(Binary::BitwiseOr));
        }
        Ok(ops)
    }

    fn parse_bitwise_and(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_additive()?;
        while self.peek() == Some(&Token::Ampersand) {
            self.advance();
            let right = self.parse_additive()?;
            ops.extend(right);
            ops.push(Op::Binary(Binary::BitwiseAnd));
        }
        Ok(ops)
    }

    fn parse_additive(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_multiplicative()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Plus) => Binary::Add,
                Some(Token::Minus) => Binary::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            ops.extend(right);
            ops.push(Op::Binary(operator));
        }
        Ok(ops)
    }

    fn parse_multiplicative(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_unary()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Star) => Binary::Mul,
                Some(Token::Slash) => Binary::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            ops.extend(right);
            ops.push(Op::Binary(operator));
        }
        Ok(ops)
    }

    fn parse_unary(&mut self) -> Result<Vec<Op>, ParseError> {
        if self.peek() == Some(&Token::Bang) {
            self.advance();
            let mut ops = self.parse_unary()?;
            ops.push(Op::Unary(Unary::Negate));
            return Ok(ops);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_primary()?;
        while self.peek() == Some(&Token::Dot) {
            self.advance();
            let method = match self.next()? {
                Token::Ident(name) => name.clone(),
                other => return Err(ParseError::UnknownMethod(format!("{other:?}"))),
            };
            self.expect(&Token::LeftParen)?;
            match method.as_str() {
                "length" | "type" => {
                    self.expect_right_paren()?;
                    ops.push(Op::Unary(if method == "length" {
                        Unary::Length
                    } else {
                        Unary::TypeOf
                    }));
                }
                "contains" | "starts_with" | "ends_with" | "matches" | "intersection"
                | "union" | "get" => {
                    let argument = self.parse_expression()?;
                    self.expect_right_paren()?;
                    ops.extend(argument);
                    ops.push(Op::Binary(match method.as_str() {
                        "contains" => Binary::Contains,
                        "starts_with" => Binary::Prefix,
                        "ends_with" => Binary::Suffix,
                        "matches" => Binary::Regex,
                        "intersection" => Binary::Intersection,
                        "union" => Binary::Union,
                        _ => Binary::Get,
                    }));
                }
                "any" | "all" => {
                    let closure = self.parse_closure()?;
                    self.expect_right_paren()?;
                    ops.push(closure);
                    ops.push(Op::Binary(if method == "any" {
                        Binary::Any
                    } else {
                        Binary::All
                    }));
                }
                "try_or" => {
                    let argument = self.parse_expression()?;
                    self.expect_right_paren()?;
                    // The receiver becomes a lazy nullary closure.
                    let receiver = core::mem::take(&mut ops);
                    ops.push(Op::Closure(vec![], receiver));
                    ops.extend(argument);
                    ops.push(Op::Binary(Binary::TryOr));
                }
                other => return Err(ParseError::UnknownMethod(other.to_string())),
            }
        }
        Ok(ops)
    }

    /// `$param (, $param)* -> expression`
    fn parse_closure(&mut self) -> Result<Op, ParseError> {
        let mut params = Vec::new();
        loop {
            match self.next()? {
                Token::Variable(name) => params.push(name.clone()),
                other => return Err(ParseError::UnknownTerm(format!("{other:?}"))),
            }
            if self.peek() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::ClosureArrow)?;
        let body = self.parse_expression()?;
        Ok(Op::Closure(params, body))
    }

    fn parse_primary(&mut self) -> Result<Vec<Op>, ParseError> {
        if self.peek() == Some(&Token::LeftParen) {
            self.advance();
            let ops = self.parse_expression()?;
            self.expect_right_paren()?;
            return Ok(ops);
        }
        let term = self.parse_term()?;
        Ok(vec![Op::Value(term)])
    }
}
