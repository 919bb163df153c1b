//! Error types for token construction, parsing, evaluation and
//! authorization.
//!
//! Five orthogonal kinds surface at the boundary: structural validation
//! (`Format`), the sealed-token attenuation failure, text-form parse
//! errors (`Language`), Datalog evaluation errors (`Execution`) and the
//! authorization outcome itself (`Authorization`). All errors are
//! returned by value; nothing is recovered internally except the
//! `try_or` operator, which swallows `type error` only.

use thiserror::Error;

/// Result type alias for token operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur while building, parsing, verifying or
/// authorizing a token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Structural defect found during decoding or signature checking.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// Attenuation was attempted on a sealed token.
    #[error("cannot attenuate a sealed token")]
    AlreadySealed,

    /// The text-form Datalog failed to parse.
    #[error("language error: {0}")]
    Language(#[from] ParseError),

    /// The Datalog program failed to evaluate.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Authorization reached a decision against the caller.
    #[error("authorization failed: {0}")]
    Authorization(#[from] AuthorizationError),
}

/// Structural defects found while decoding a token or validating its
/// signature chain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// A block signature did not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// The terminal sealing signature did not verify.
    #[error("invalid sealing signature")]
    InvalidSealingSignature,

    /// A third-party signature did not verify.
    #[error("invalid external signature")]
    InvalidExternalSignature,

    /// The proof does not match the chain (wrong next secret, or a
    /// missing proof variant).
    #[error("invalid proof")]
    InvalidProof,

    /// A version number outside the supported range.
    #[error("unsupported version: expected {minimum}..={maximum}, got {actual}")]
    Version {
        /// Lowest accepted version.
        minimum: u32,
        /// Highest accepted version.
        maximum: u32,
        /// Version found on the wire.
        actual: u32,
    },

    /// The root key resolver does not know the requested key id.
    #[error("unknown root key id {0:?}")]
    UnknownRootKey(Option<u32>),

    /// A symbol index with no entry in the interning table.
    #[error("unknown symbol index {0}")]
    UnknownSymbol(u64),

    /// A public key index with no entry in the interning table.
    #[error("unknown public key index {0}")]
    UnknownPublicKey(u64),

    /// A block redeclared a symbol already present in the table.
    #[error("duplicate symbol {0:?}")]
    DuplicateSymbol(String),

    /// A block redeclared a public key already present in the table.
    #[error("duplicate public key {0}")]
    DuplicatePublicKey(String),

    /// Sets cannot contain sets.
    #[error("sets cannot be nested")]
    SetInSet,

    /// A map carried the same key twice.
    #[error("duplicate map key {0:?}")]
    DuplicateMapKey(String),

    /// A fact carried a variable term.
    #[error("facts cannot contain variables")]
    VariableInFact,

    /// A rule head variable is not bound by any body predicate.
    #[error("unbound variable {0:?} in rule head")]
    UnboundVariableInHead(String),

    /// The authority block carried a third-party signature.
    #[error("the authority block cannot be signed by a third party")]
    ThirdPartySignedAuthority,

    /// A third-party signature on a legacy V0-signed block.
    #[error("third-party signatures on legacy blocks are not supported")]
    DeprecatedThirdPartySignature,

    /// The token was not valid base64url.
    #[error("invalid base64url string: {0}")]
    Base64(String),

    /// Invalid hexadecimal key or signature material.
    #[error("invalid hex data: {0}")]
    HexData(String),

    /// A serialized check or policy query head was not the reserved
    /// `query` predicate.
    #[error("invalid query head")]
    InvalidQueryHead,

    /// A key had the wrong length for its algorithm.
    #[error("invalid key size: {0} bytes")]
    InvalidKeySize(usize),

    /// Key bytes that do not form a valid key for the algorithm.
    #[error("invalid key bytes")]
    InvalidKey,

    /// A signature had the wrong length or encoding.
    #[error("invalid signature size: {0} bytes")]
    InvalidSignatureSize(usize),

    /// A required wire field was absent.
    #[error("missing field {0:?}")]
    MissingField(&'static str),

    /// The wire payload failed to decode.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The wire payload failed to encode.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors produced by the text-form Datalog lexer and parser.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The lexer could not produce a token.
    #[error("error in lexing at offset {0}")]
    Lexer(usize),

    /// A statement was not terminated by a semicolon.
    #[error("missing semicolon at offset {0}")]
    MissingSemicolon(usize),

    /// An opening parenthesis was never closed.
    #[error("missing right parenthesis at offset {0}")]
    MissingRightParen(usize),

    /// The source ended in the middle of a statement.
    #[error("unexpected end of code")]
    UnexpectedEnd,

    /// A block statement that is not a fact, rule, check or scope
    /// declaration.
    #[error("unknown block element {0:?}")]
    UnknownBlockElement(String),

    /// A check keyword other than `check if`, `check all` or `reject if`.
    #[error("unknown check kind {0:?}")]
    UnknownCheck(String),

    /// An unknown expression method.
    #[error("unknown method {0:?}")]
    UnknownMethod(String),

    /// A policy keyword other than `allow if` or `deny if`.
    #[error("unknown policy kind {0:?}")]
    UnknownPolicy(String),

    /// A predicate was expected and not found.
    #[error("expected a predicate, got {0:?}")]
    UnknownPredicate(String),

    /// A rule body element that is neither a predicate nor an
    /// expression.
    #[error("unknown rule element {0:?}")]
    UnknownRuleElement(String),

    /// A scope that is neither `authority`, `previous` nor a public key.
    #[error("unknown scope {0:?}")]
    UnknownScope(String),

    /// A term that could not be parsed.
    #[error("unknown term {0:?}")]
    UnknownTerm(String),

    /// A fact carried a variable term.
    #[error("facts cannot contain variables")]
    VariableInFact,

    /// A rule head variable that no body predicate binds.
    #[error("variable {0:?} appears in the head only")]
    VariableInHeadAlone(String),

    /// Comparison operators cannot be chained without parentheses.
    #[error("chained comparisons need parentheses")]
    ChainedComparisons,

    /// Map keys must be integers or strings.
    #[error("invalid map key {0:?}")]
    InvalidMapKey(String),

    /// A map entry without a value.
    #[error("map entry is missing a value")]
    MapMissingValue,

    /// Sets cannot contain sets.
    #[error("sets cannot be nested")]
    SetInSet,

    /// A map literal carried the same key twice.
    #[error("duplicate map key {0:?}")]
    DuplicateMapKey(String),

    /// A `hex:` byte literal with invalid hex digits.
    #[error("invalid hex data: {0}")]
    InvalidHexData(String),
}

/// Errors raised while evaluating the Datalog program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// `authorize` was called on an authorizer with no policies.
    #[error("the authorizer has no policy")]
    AuthorizerWithoutPolicy,

    /// Checked integer arithmetic overflowed (or divided by zero).
    #[error("integer overflow")]
    Overflow,

    /// The expression left the stack in an invalid state.
    #[error("invalid expression")]
    InvalidExpression,

    /// A binary operator received an operand of the wrong shape.
    #[error("invalid binary operation")]
    InvalidBinaryOp,

    /// A unary operator received an operand of the wrong shape.
    #[error("invalid unary operation")]
    InvalidUnaryOp,

    /// A top-level expression did not evaluate to a boolean.
    #[error("expression did not evaluate to a boolean")]
    NonBooleanExpression,

    /// A variable with no binding.
    #[error("unknown variable {0}")]
    UnknownVariable(u32),

    /// A symbol index with no entry in the interning table.
    #[error("unknown symbol index {0}")]
    UnknownSymbol(u64),

    /// A call to a foreign function that no registry provides. Reserved:
    /// the fixed operator set defines no foreign calls today.
    #[error("unknown foreign function {0:?}")]
    UnknownForeignFunction(String),

    /// Operand types do not fit the operator.
    #[error("type error")]
    TypeError,

    /// A closure was invoked with the wrong number of arguments.
    #[error("wrong closure arity: expected {expected}, got {got}")]
    WrongArity {
        /// Number of parameters the closure declares.
        expected: usize,
        /// Number of arguments supplied.
        got: usize,
    },

    /// A closure parameter shadows a visible variable.
    #[error("closure parameter shadows variable {0}")]
    VariableShadowing(u32),

    /// A closure evaluation left a closure on the stack.
    #[error("closure evaluated to a closure")]
    ClosureEvaluatedToClosure,

    /// The fixpoint exceeded the configured fact limit.
    #[error("too many facts generated (limit {0})")]
    TooManyFacts(u64),

    /// The fixpoint exceeded the configured iteration limit.
    #[error("too many iterations (limit {0})")]
    TooManyIterations(u64),
}

/// The reason an authorization request was refused.
///
/// Nothing is lost through this error: the caller can see exactly which
/// checks failed or which policy denied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// One or more checks failed.
    #[error("the following checks failed: {}", format_checks(.0))]
    FailedChecks(Vec<FailedCheck>),

    /// A `deny if` policy matched.
    #[error("policy {index} denied: {policy}")]
    Denied {
        /// Index of the matching deny policy.
        index: usize,
        /// Canonical text of the matching policy.
        policy: String,
    },

    /// Every policy was evaluated and none matched.
    #[error("no successful policy")]
    NoMatchingPolicy,
}

/// A single failing check, with enough provenance to diagnose it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCheck {
    /// Where the check came from.
    pub origin: CheckOrigin,
    /// Index of the check within its block or authorizer.
    pub index: usize,
    /// Canonical text of the check.
    pub check: String,
}

/// The provenance of a failing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOrigin {
    /// A check supplied by the authorizer.
    Authorizer,
    /// A check carried by token block `i` (0 is the authority block).
    Block(usize),
}

impl core::fmt::Display for FailedCheck {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.origin {
            CheckOrigin::Authorizer => {
                write!(f, "authorizer check {}: {}", self.index, self.check)
            }
            CheckOrigin::Block(b) => {
                write!(f, "block {} check {}: {}", b, self.index, self.check)
            }
        }
    }
}

fn format_checks(checks: &[FailedCheck]) -> String {
    checks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::Format(FormatError::Deserialization(e.to_string()))
    }
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(_: ed25519_dalek::SignatureError) -> Self {
        Error::Format(FormatError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_sealed() {
        assert_eq!(
            format!("{}", Error::AlreadySealed),
            "cannot attenuate a sealed token"
        );
    }

    #[test]
    fn error_display_version() {
        let err = FormatError::Version {
            minimum: 3,
            maximum: 6,
            actual: 9,
        };
        let rendered = format!("{err}");
        assert!(rendered.contains("3..=6"));
        assert!(rendered.contains('9'));
    }

    #[test]
    fn error_display_failed_checks() {
        let err = AuthorizationError::FailedChecks(vec![FailedCheck {
            origin: CheckOrigin::Block(1),
            index: 0,
            check: "check if operation(\"read\")".to_string(),
        }]);
        let rendered = format!("{err}");
        assert!(rendered.contains("block 1 check 0"));
        assert!(rendered.contains("operation(\"read\")"));
    }

    #[test]
    fn error_display_no_policy() {
        assert_eq!(
            format!("{}", AuthorizationError::NoMatchingPolicy),
            "no successful policy"
        );
    }

    #[test]
    fn error_eq() {
        assert_eq!(
            Error::Format(FormatError::InvalidSignature),
            Error::Format(FormatError::InvalidSignature)
        );
        assert_ne!(
            Error::Format(FormatError::InvalidSignature),
            Error::AlreadySealed
        );
    }

    #[test]
    fn execution_error_display() {
        assert_eq!(format!("{}", ExecutionError::Overflow), "integer overflow");
        assert_eq!(
            format!(
                "{}",
                ExecutionError::WrongArity {
                    expected: 1,
                    got: 2
                }
            ),
            "wrong closure arity: expected 1, got 2"
        );
    }
}
