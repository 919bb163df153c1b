//! Hand-written lexer for the text-form Datalog grammar.
//!
//! Produces a flat token list with byte offsets, so the parser can
//! report where a statement went wrong. A few shapes are resolved here
//! rather than in the parser because they span several would-be tokens:
//! RFC 3339 dates, `hex:`-prefixed byte strings, and
//! `<algorithm>/<hex>` public keys.

use once_cell::sync::Lazy;
use regex::Regex;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::ParseError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare identifier or keyword.
    Ident(String),
    /// `$name` variable.
    Variable(String),
    /// Integer literal (always non-negative; the parser applies `-`).
    Integer(i64),
    /// Quoted string literal, unescaped.
    Str(String),
    /// RFC 3339 date literal, as seconds since the epoch.
    Date(u64),
    /// `hex:`-prefixed byte string literal.
    Bytes(Vec<u8>),
    /// `<algorithm>/<hex>` public key literal.
    PublicKey(String),
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `:`
    Colon,
    /// `.`
    Dot,
    /// `<-`
    RuleArrow,
    /// `->`
    ClosureArrow,
    /// `<`
    LessThan,
    /// `>`
    GreaterThan,
    /// `<=`
    LessOrEqual,
    /// `>=`
    GreaterOrEqual,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `===`
    StrictEqual,
    /// `!==`
    StrictNotEqual,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `&`
    Ampersand,
    /// `|`
    Pipe,
    /// `^`
    Caret,
    /// `&&`
    AmpersandAmpersand,
    /// `||`
    PipePipe,
    /// `!`
    Bang,
}

/// A token plus the byte offset where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// Byte offset into the source.
    pub offset: usize,
}

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})")
        .expect("static regex")
});

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            position: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.position + ahead).copied()
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => self.position += 1,
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        self.position += 1;
                        if c == b'\n' {
                            break;
                        }
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.position;
                    self.position += 2;
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.position += 2;
                                break;
                            }
                            (Some(_), _) => self.position += 1,
                            (None, _) => return Err(ParseError::Lexer(start)),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_string(&mut self) -> Result<Token, ParseError> {
        let start = self.position;
        self.position += 1;
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::Lexer(start)),
                Some(b'"') => {
                    self.position += 1;
                    return Ok(Token::Str(value));
                }
                Some(b'\\') => {
                    let escaped = self.peek_at(1).ok_or(ParseError::Lexer(start))?;
                    match escaped {
                        b'"' => value.push('"'),
                        b'\\' => value.push('\\'),
                        b'n' => value.push('\n'),
                        b't' => value.push('\t'),
                        _ => return Err(ParseError::Lexer(self.position)),
                    }
                    self.position += 2;
                }
                Some(_) => {
                    // Consume one full UTF-8 character.
                    let rest = &self.source[self.position..];
                    let c = rest.chars().next().ok_or(ParseError::Lexer(start))?;
                    value.push(c);
                    self.position += c.len_utf8();
                }
            }
        }
    }

    fn lex_date(&mut self) -> Result<Option<Token>, ParseError> {
        let rest = &self.source[self.position..];
        let Some(matched) = DATE_RE.find(rest) else {
            return Ok(None);
        };
        let text = matched.as_str();
        let parsed = OffsetDateTime::parse(text, &Rfc3339)
            .map_err(|_| ParseError::Lexer(self.position))?;
        let seconds =
            u64::try_from(parsed.unix_timestamp()).map_err(|_| ParseError::Lexer(self.position))?;
        self.position += text.len();
        Ok(Some(Token::Date(seconds)))
    }

    fn lex_number(&mut self) -> Result<Token, ParseError> {
        let start = self.position;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.position += 1;
        }
        let text = &self.source[start..self.position];
        text.parse::<i64>()
            .map(Token::Integer)
            .map_err(|_| ParseError::Lexer(start))
    }

    fn lex_hex_digits(&mut self) -> String {
        let start = self.position;
        while matches!(self.peek(), Some(c) if (c as char).is_ascii_hexdigit()) {
            self.position += 1;
        }
        self.source[start..self.position].to_string()
    }

    fn lex_ident(&mut self) -> Result<Token, ParseError> {
        let start = self.position;
        while matches!(self.peek(), Some(c) if is_ident_continue(c as char)) {
            self.position += 1;
        }
        let ident = &self.source[start..self.position];

        // `hex:0a0b` byte strings.
        if ident == "hex" && self.peek() == Some(b':') {
            self.position += 1;
            let digits = self.lex_hex_digits();
            let bytes =
                hex::decode(&digits).map_err(|_| ParseError::InvalidHexData(digits.clone()))?;
            return Ok(Token::Bytes(bytes));
        }

        // `ed25519/...` and `secp256r1/...` public keys.
        if (ident == "ed25519" || ident == "secp256r1") && self.peek() == Some(b'/') {
            self.position += 1;
            let digits = self.lex_hex_digits();
            return Ok(Token::PublicKey(format!("{ident}/{digits}")));
        }

        Ok(Token::Ident(ident.to_string()))
    }

    fn next_token(&mut self) -> Result<Option<Spanned>, ParseError> {
        self.skip_trivia()?;
        let offset = self.position;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            b'"' => self.lex_string()?,
            b'$' => {
                self.position += 1;
                let start = self.position;
                while matches!(self.peek(), Some(c) if is_ident_continue(c as char)) {
                    self.position += 1;
                }
                if start == self.position {
                    return Err(ParseError::Lexer(offset));
                }
                Token::Variable(self.source[start..self.position].to_string())
            }
            b'0'..=b'9' => match self.lex_date()? {
                Some(token) => token,
                None => self.lex_number()?,
            },
            c if is_ident_start(c as char) => self.lex_ident()?,
            b'(' => self.single(Token::LeftParen),
            b')' => self.single(Token::RightParen),
            b'[' => self.single(Token::LeftBracket),
            b']' => self.single(Token::RightBracket),
            b'{' => self.single(Token::LeftBrace),
            b'}' => self.single(Token::RightBrace),
            b',' => self.single(Token::Comma),
            b';' => self.single(Token::Semicolon),
            b':' => self.single(Token::Colon),
            b'.' => self.single(Token::Dot),
            b'+' => self.single(Token::Plus),
            b'*' => self.single(Token::Star),
            b'/' => self.single(Token::Slash),
            b'^' => self.single(Token::Caret),
            b'-' => {
                if self.peek_at(1) == Some(b'>') {
                    self.position += 2;
                    Token::ClosureArrow
                } else {
                    self.single(Token::Minus)
                }
            }
            b'<' => match self.peek_at(1) {
                Some(b'-') => {
                    self.position += 2;
                    Token::RuleArrow
                }
                Some(b'=') => {
                    self.position += 2;
                    Token::LessOrEqual
                }
                _ => self.single(Token::LessThan),
            },
            b'>' => {
                if self.peek_at(1) == Some(b'=') {
                    self.position += 2;
                    Token::GreaterOrEqual
                } else {
                    self.single(Token::GreaterThan)
                }
            }
            b'=' => {
                if self.peek_at(1) == Some(b'=') {
                    if self.peek_at(2) == Some(b'=') {
                        self.position += 3;
                        Token::StrictEqual
                    } else {
                        self.position += 2;
                        Token::Equal
                    }
                } else {
                    return Err(ParseError::Lexer(offset));
                }
            }
            b'!' => {
                if self.peek_at(1) == Some(b'=') {
                    if self.peek_at(2) == Some(b'=') {
                        self.position += 3;
                        Token::StrictNotEqual
                    } else {
                        self.position += 2;
                        Token::NotEqual
                    }
                } else {
                    self.single(Token::Bang)
                }
            }
            b'&' => {
                if self.peek_at(1) == Some(b'&') {
                    self.position += 2;
                    Token::AmpersandAmpersand
                } else {
                    self.single(Token::Ampersand)
                }
            }
            b'|' => {
                if self.peek_at(1) == Some(b'|') {
                    self.position += 2;
                    Token::PipePipe
                } else {
                    self.single(Token::Pipe)
                }
            }
            _ => return Err(ParseError::Lexer(offset)),
        };
        Ok(Some(Spanned { token, offset }))
    }

    fn single(&mut self, token: Token) -> Token {
        self.position += 1;
        token
    }
}

/// Tokenize a whole source string.
///
/// # Errors
///
/// Returns `error_in_lexing` (or `invalid_hex_data`) at the offending
/// offset.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn lex_fact() {
        assert_eq!(
            kinds("user(1234);"),
            vec![
                Token::Ident("user".into()),
                Token::LeftParen,
                Token::Integer(1234),
                Token::RightParen,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn lex_operators() {
        assert_eq!(
            kinds("< <= == === != !== && || <- ->"),
            vec![
                Token::LessThan,
                Token::LessOrEqual,
                Token::Equal,
                Token::StrictEqual,
                Token::NotEqual,
                Token::StrictNotEqual,
                Token::AmpersandAmpersand,
                Token::PipePipe,
                Token::RuleArrow,
                Token::ClosureArrow,
            ]
        );
    }

    #[test]
    fn lex_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\\c\nd""#),
            vec![Token::Str("a\"b\\c\nd".into())]
        );
    }

    #[test]
    fn lex_date() {
        assert_eq!(
            kinds("2019-12-04T09:46:41Z"),
            vec![Token::Date(1_575_452_801)]
        );
        // A plain integer stays an integer.
        assert_eq!(kinds("2019"), vec![Token::Integer(2019)]);
    }

    #[test]
    fn lex_hex_bytes() {
        assert_eq!(kinds("hex:0a0b"), vec![Token::Bytes(vec![0x0a, 0x0b])]);
        assert_eq!(
            tokenize("hex:0g"),
            Err(ParseError::InvalidHexData("0g".into()))
        );
        // Bare `hex` is an identifier.
        assert_eq!(kinds("hex"), vec![Token::Ident("hex".into())]);
    }

    #[test]
    fn lex_public_key() {
        assert_eq!(
            kinds("ed25519/abcdef"),
            vec![Token::PublicKey("ed25519/abcdef".into())]
        );
    }

    #[test]
    fn lex_variables() {
        assert_eq!(
            kinds("$file_1"),
            vec![Token::Variable("file_1".into())]
        );
        assert!(tokenize("$").is_err());
    }

    #[test]
    fn lex_comments() {
        assert_eq!(
            kinds("user(1); // trailing\n/* block */ group(2);"),
            vec![
                Token::Ident("user".into()),
                Token::LeftParen,
                Token::Integer(1),
                Token::RightParen,
                Token::Semicolon,
                Token::Ident("group".into()),
                Token::LeftParen,
                Token::Integer(2),
                Token::RightParen,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn lex_error_carries_offset() {
        assert_eq!(tokenize("user(=)"), Err(ParseError::Lexer(5)));
    }

    #[test]
    fn unterminated_string_fails() {
        assert!(tokenize("\"abc").is_err());
    }
}
