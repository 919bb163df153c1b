//! Wire schema message types.
//!
//! Hand-annotated `prost` structs (proto2 semantics, no build-time
//! codegen). Field numbers are part of the signed byte contract and
//! must never change; fields are declared in tag order so the encoder
//! output stays canonical.

/// A serialized token: authority block, attenuation blocks and proof.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Token {
    /// Hint for selecting the root public key.
    #[prost(uint32, optional, tag = "1")]
    pub root_key_id: Option<u32>,
    /// The authority block.
    #[prost(message, required, tag = "2")]
    pub authority: SignedBlock,
    /// Attenuation blocks, in chain order.
    #[prost(message, repeated, tag = "3")]
    pub blocks: Vec<SignedBlock>,
    /// Chain terminator: next secret (open) or final signature (sealed).
    #[prost(message, required, tag = "4")]
    pub proof: Proof,
}

/// One signed chain node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedBlock {
    /// Serialized `Block` payload, kept verbatim for signature checks.
    #[prost(bytes = "vec", required, tag = "1")]
    pub block: Vec<u8>,
    /// Public half of the ephemeral next keypair.
    #[prost(message, required, tag = "2")]
    pub next_key: PublicKey,
    /// Signature binding the payload to the chain.
    #[prost(bytes = "vec", required, tag = "3")]
    pub signature: Vec<u8>,
    /// Present on third-party blocks.
    #[prost(message, optional, tag = "4")]
    pub external_signature: Option<ExternalSignature>,
    /// Signature input scheme: absent/0 legacy, 1 current.
    #[prost(uint32, optional, tag = "5")]
    pub version: Option<u32>,
}

/// A third party's co-signature over a block payload.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExternalSignature {
    /// The signature bytes.
    #[prost(bytes = "vec", required, tag = "1")]
    pub signature: Vec<u8>,
    /// The third party's public key.
    #[prost(message, required, tag = "2")]
    pub public_key: PublicKey,
}

/// A serialized public key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublicKey {
    /// Signature algorithm.
    #[prost(enumeration = "Algorithm", required, tag = "1")]
    pub algorithm: i32,
    /// Raw Ed25519 (32 bytes) or compressed SEC1 (33 bytes) key.
    #[prost(bytes = "vec", required, tag = "2")]
    pub key: Vec<u8>,
}

/// Supported signature algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Algorithm {
    /// Ed25519.
    Ed25519 = 0,
    /// ECDSA over secp256r1.
    Secp256r1 = 1,
}

/// The chain terminator.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Proof {
    /// Exactly one variant is present.
    #[prost(oneof = "proof::Content", tags = "1, 2")]
    pub content: Option<proof::Content>,
}

/// Oneof container for [`Proof`].
pub mod proof {
    /// The proof variant.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Content {
        /// Private half of the last next keypair: the token is open.
        #[prost(bytes, tag = "1")]
        NextSecret(Vec<u8>),
        /// Signature over the sealing input: the token is sealed.
        #[prost(bytes, tag = "2")]
        FinalSignature(Vec<u8>),
    }
}

/// The Datalog payload of one block.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Block {
    /// Payload format version; readers accept 3 through 6.
    #[prost(uint32, required, tag = "1")]
    pub version: u32,
    /// Symbols this block introduces.
    #[prost(string, repeated, tag = "2")]
    pub symbols: Vec<String>,
    /// Free-form context string.
    #[prost(string, optional, tag = "3")]
    pub context: Option<String>,
    /// Facts the block states.
    #[prost(message, repeated, tag = "4")]
    pub facts: Vec<Fact>,
    /// Rules the block provides.
    #[prost(message, repeated, tag = "5")]
    pub rules: Vec<Rule>,
    /// Checks the block imposes.
    #[prost(message, repeated, tag = "6")]
    pub checks: Vec<Check>,
    /// Block-wide trust scopes.
    #[prost(message, repeated, tag = "7")]
    pub scope: Vec<Scope>,
    /// Third-party public keys this block introduces.
    #[prost(message, repeated, tag = "8")]
    pub public_keys: Vec<PublicKey>,
}

/// A serialized fact.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Fact {
    /// The ground predicate.
    #[prost(message, required, tag = "1")]
    pub predicate: Predicate,
}

/// A serialized rule (also used for check and policy queries).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Rule {
    /// The head predicate.
    #[prost(message, required, tag = "1")]
    pub head: Predicate,
    /// Body predicates.
    #[prost(message, repeated, tag = "2")]
    pub body: Vec<Predicate>,
    /// Body expressions.
    #[prost(message, repeated, tag = "3")]
    pub expressions: Vec<Expression>,
    /// Rule-level trust scopes.
    #[prost(message, repeated, tag = "4")]
    pub scope: Vec<Scope>,
}

/// A serialized check.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Check {
    /// Alternative queries.
    #[prost(message, repeated, tag = "1")]
    pub queries: Vec<Rule>,
    /// Check kind; absent means `one` (legacy tokens predate the
    /// field, and writers keep omitting it for `one` so their
    /// signatures stay stable).
    #[prost(enumeration = "check::Kind", optional, tag = "2")]
    pub kind: Option<i32>,
}

/// Enumerations for [`Check`].
pub mod check {
    /// The check kind.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Kind {
        /// `check if`.
        One = 0,
        /// `check all`.
        All = 1,
        /// `reject if`.
        Reject = 2,
    }
}

/// A serialized predicate.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Predicate {
    /// Interned predicate name.
    #[prost(uint64, required, tag = "1")]
    pub name: u64,
    /// Ordered terms.
    #[prost(message, repeated, tag = "2")]
    pub terms: Vec<Term>,
}

/// A serialized term.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Term {
    /// Exactly one variant is present.
    #[prost(oneof = "term::Content", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10")]
    pub content: Option<term::Content>,
}

/// Oneof container for [`Term`].
pub mod term {
    /// The term variant. String-typed fields carry interned indexes.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Content {
        /// Variable, by interned name.
        #[prost(uint32, tag = "1")]
        Variable(u32),
        /// Integer.
        #[prost(int64, tag = "2")]
        Integer(i64),
        /// Interned string index.
        #[prost(uint64, tag = "3")]
        String(u64),
        /// Seconds since the epoch.
        #[prost(uint64, tag = "4")]
        Date(u64),
        /// Byte string.
        #[prost(bytes, tag = "5")]
        Bytes(Vec<u8>),
        /// Boolean.
        #[prost(bool, tag = "6")]
        Bool(bool),
        /// Set of terms.
        #[prost(message, tag = "7")]
        Set(super::TermSet),
        /// Null.
        #[prost(message, tag = "8")]
        Null(super::Empty),
        /// Array of terms.
        #[prost(message, tag = "9")]
        Array(super::Array),
        /// Map of terms.
        #[prost(message, tag = "10")]
        Map(super::Map),
    }
}

/// A set's elements, serialized in canonical order.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TermSet {
    /// Sorted elements.
    #[prost(message, repeated, tag = "1")]
    pub set: Vec<Term>,
}

/// An array's elements.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Array {
    /// Ordered elements.
    #[prost(message, repeated, tag = "1")]
    pub array: Vec<Term>,
}

/// A map's entries, serialized in canonical key order.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Map {
    /// Sorted entries.
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<MapEntry>,
}

/// One map entry.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MapEntry {
    /// The key.
    #[prost(message, required, tag = "1")]
    pub key: MapKey,
    /// The value.
    #[prost(message, required, tag = "2")]
    pub value: Term,
}

/// A map key: integer or interned string.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MapKey {
    /// Exactly one variant is present.
    #[prost(oneof = "map_key::Content", tags = "1, 2")]
    pub content: Option<map_key::Content>,
}

/// Oneof container for [`MapKey`].
pub mod map_key {
    /// The key variant.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Content {
        /// Integer key.
        #[prost(int64, tag = "1")]
        Integer(i64),
        /// Interned string key.
        #[prost(uint64, tag = "2")]
        String(u64),
    }
}

/// Marker for the null term.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Empty {}

/// A serialized expression: a postfix op list.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Expression {
    /// Ops in evaluation order.
    #[prost(message, repeated, tag = "1")]
    pub ops: Vec<Op>,
}

/// One expression op.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Op {
    /// Exactly one variant is present.
    #[prost(oneof = "op::Content", tags = "1, 2, 3, 4")]
    pub content: Option<op::Content>,
}

/// Oneof container for [`Op`].
pub mod op {
    /// The op variant.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Content {
        /// Push a term.
        #[prost(message, tag = "1")]
        Value(super::Term),
        /// Apply a unary operator.
        #[prost(message, tag = "2")]
        Unary(super::OpUnary),
        /// Apply a binary operator.
        #[prost(message, tag = "3")]
        Binary(super::OpBinary),
        /// Push a closure.
        #[prost(message, tag = "4")]
        Closure(super::OpClosure),
    }
}

/// A unary operator.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpUnary {
    /// Which operator.
    #[prost(enumeration = "op_unary::Kind", required, tag = "1")]
    pub kind: i32,
}

/// Enumerations for [`OpUnary`].
pub mod op_unary {
    /// The unary operator set.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Kind {
        /// Boolean negation.
        Negate = 0,
        /// Length.
        Length = 1,
        /// Type name.
        TypeOf = 2,
    }
}

/// A binary operator.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpBinary {
    /// Which operator.
    #[prost(enumeration = "op_binary::Kind", required, tag = "1")]
    pub kind: i32,
}

/// Enumerations for [`OpBinary`].
pub mod op_binary {
    /// The binary operator set.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Kind {
        /// `<`
        LessThan = 0,
        /// `>`
        GreaterThan = 1,
        /// `<=`
        LessOrEqual = 2,
        /// `>=`
        GreaterOrEqual = 3,
        /// `===`
        Equal = 4,
        /// Membership / substring / subset.
        Contains = 5,
        /// Prefix.
        Prefix = 6,
        /// Suffix.
        Suffix = 7,
        /// Regular expression match.
        Regex = 8,
        /// Addition / concatenation.
        Add = 9,
        /// Subtraction.
        Sub = 10,
        /// Multiplication.
        Mul = 11,
        /// Division.
        Div = 12,
        /// Eager and.
        And = 13,
        /// Eager or.
        Or = 14,
        /// Set intersection.
        Intersection = 15,
        /// Set union.
        Union = 16,
        /// Bitwise and.
        BitwiseAnd = 17,
        /// Bitwise or.
        BitwiseOr = 18,
        /// Bitwise xor.
        BitwiseXor = 19,
        /// `!==`
        NotEqual = 20,
        /// `==`
        HeterogeneousEqual = 21,
        /// `!=`
        HeterogeneousNotEqual = 22,
        /// Lazy and.
        LazyAnd = 23,
        /// Lazy or.
        LazyOr = 24,
        /// Universal quantifier over a collection.
        All = 25,
        /// Existential quantifier over a collection.
        Any = 26,
        /// Indexing / lookup.
        Get = 27,
        /// Type-error fallback.
        TryOr = 28,
    }
}

/// A closure: parameters plus a postfix body.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpClosure {
    /// Interned parameter names.
    #[prost(uint32, repeated, tag = "1")]
    pub params: Vec<u32>,
    /// Body ops.
    #[prost(message, repeated, tag = "2")]
    pub ops: Vec<Op>,
}

/// A serialized trust scope.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Scope {
    /// Exactly one variant is present.
    #[prost(oneof = "scope::Content", tags = "1, 2")]
    pub content: Option<scope::Content>,
}

/// Oneof container for [`Scope`].
pub mod scope {
    /// The scope variant.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Content {
        /// A well-known scope.
        #[prost(enumeration = "Type", tag = "1")]
        ScopeType(i32),
        /// An interned third-party public key.
        #[prost(int64, tag = "2")]
        PublicKey(i64),
    }

    /// Well-known scopes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        /// The authority block and the authorizer.
        Authority = 0,
        /// Every earlier block, plus the authorizer.
        Previous = 1,
    }
}

/// What a token holder sends to a third party.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThirdPartyBlockRequest {
    /// Signature of the token's current last block.
    #[prost(bytes = "vec", required, tag = "1")]
    pub previous_signature: Vec<u8>,
}

/// What the third party returns.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThirdPartyBlockContents {
    /// Serialized `Block` payload.
    #[prost(bytes = "vec", required, tag = "1")]
    pub payload: Vec<u8>,
    /// The co-signature over the external input.
    #[prost(message, required, tag = "2")]
    pub external_signature: ExternalSignature,
}
