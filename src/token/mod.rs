//! The token façade: creation, attenuation, sealing, serialization and
//! authorization.
//!
//! A [`Warrant`] is immutable: `attenuate`, `append_third_party` and
//! `seal` return new tokens sharing the existing chain. The holder of
//! an open token can narrow its authority offline; only the verifier,
//! running an [`Authorizer`], decides access.

pub mod authorizer;
mod block;
pub mod third_party;
mod unverified;

pub use authorizer::{Authorization, Authorizer};
pub use block::Block;
pub use third_party::{ThirdPartyBlock, ThirdPartyRequest};
pub use unverified::UnverifiedWarrant;

use prost::Message;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tracing::debug;

use crate::builder::{BlockBuilder, Check};
use crate::crypto::{Algorithm, KeyPair, PrivateKey, PublicKey};
use crate::datalog::SymbolTable;
use crate::error::{Error, FormatError, Result};
use crate::format::convert::{block_to_proto, proto_to_block};
use crate::format::{schema, signature, Container, Proof, SerializedBlock};

/// Resolves the root public key a token should be verified under.
///
/// Implemented by [`PublicKey`] directly (ignoring the key id) and by
/// [`RootKeyResolver`] for key-id-aware lookups.
pub trait RootKeyProvider {
    /// Choose the root key for an optional key id.
    ///
    /// # Errors
    ///
    /// Returns `unknown_root_key` when the id is not recognized.
    fn choose(&self, key_id: Option<u32>) -> Result<PublicKey>;
}

impl RootKeyProvider for PublicKey {
    fn choose(&self, _key_id: Option<u32>) -> Result<PublicKey> {
        Ok(self.clone())
    }
}

impl RootKeyProvider for &PublicKey {
    fn choose(&self, _key_id: Option<u32>) -> Result<PublicKey> {
        Ok((*self).clone())
    }
}

/// Adapts a closure into a [`RootKeyProvider`].
pub struct RootKeyResolver<F>(pub F);

impl<F> RootKeyProvider for RootKeyResolver<F>
where
    F: Fn(Option<u32>) -> Option<PublicKey>,
{
    fn choose(&self, key_id: Option<u32>) -> Result<PublicKey> {
        (self.0)(key_id).ok_or(Error::Format(FormatError::UnknownRootKey(key_id)))
    }
}

/// An authorization token: a signed chain of Datalog blocks.
#[derive(Debug, Clone)]
pub struct Warrant {
    pub(crate) authority: Block,
    pub(crate) blocks: Vec<Block>,
    pub(crate) symbols: SymbolTable,
    pub(crate) container: Container,
}

impl Warrant {
    /// Create a token from a root keypair and an authority block.
    ///
    /// # Errors
    ///
    /// Propagates block conversion errors.
    pub fn new(root: &KeyPair, builder: BlockBuilder) -> Result<Self> {
        Self::new_with_rng(root, None, builder, &mut OsRng)
    }

    /// Create a token carrying a root key id hint.
    ///
    /// # Errors
    ///
    /// Propagates block conversion errors.
    pub fn new_with_root_key_id(root: &KeyPair, key_id: u32, builder: BlockBuilder) -> Result<Self> {
        Self::new_with_rng(root, Some(key_id), builder, &mut OsRng)
    }

    /// Create a token with a caller-supplied RNG for the ephemeral next
    /// keypair.
    ///
    /// # Errors
    ///
    /// Propagates block conversion errors.
    pub fn new_with_rng<R: RngCore + CryptoRng>(
        root: &KeyPair,
        root_key_id: Option<u32>,
        builder: BlockBuilder,
        rng: &mut R,
    ) -> Result<Self> {
        let mut symbols = SymbolTable::new();
        let authority = Block::from_builder(builder, &mut symbols)?;
        let payload = block_to_proto(&authority).encode_to_vec();

        let next = KeyPair::generate_with_rng(root.algorithm(), rng);
        let input = signature::block_input_v1(&payload, next.public_key(), None, None);
        let signed = SerializedBlock {
            data: payload,
            next_key: next.public_key().clone(),
            signature: root.sign(&input),
            external_signature: None,
            version: 1,
        };
        debug!("authority block signed");

        Ok(Self {
            authority,
            blocks: Vec::new(),
            symbols,
            container: Container {
                root_key_id,
                authority: signed,
                blocks: Vec::new(),
                proof: Proof::NextSecret(next.private_key().clone()),
            },
        })
    }

    /// Decode and verify a serialized token.
    ///
    /// # Errors
    ///
    /// Format errors from decoding, signature verification or payload
    /// validation.
    pub fn from_bytes<K: RootKeyProvider>(bytes: &[u8], root: K) -> Result<Self> {
        let container = Container::deserialize(bytes)?;
        let key = root.choose(container.root_key_id)?;
        container.verify(&key)?;
        Self::from_container(container)
    }

    /// Decode and verify a base64url token.
    ///
    /// # Errors
    ///
    /// As [`Warrant::from_bytes`], plus `invalid_base64url_string`.
    pub fn from_base64<K: RootKeyProvider>(text: &str, root: K) -> Result<Self> {
        Self::from_bytes(&crate::format::from_base64(text)?, root)
    }

    /// Parse the datalog payloads of an already-verified container.
    pub(crate) fn from_container(container: Container) -> Result<Self> {
        let mut symbols = SymbolTable::new();
        let authority_proto = schema::Block::decode(&container.authority.data[..])?;
        let authority = proto_to_block(&authority_proto, &mut symbols, None)?;

        let mut blocks = Vec::with_capacity(container.blocks.len());
        for signed in &container.blocks {
            let proto = schema::Block::decode(&signed.data[..])?;
            let parsed = match &signed.external_signature {
                // Third-party payloads live in their own table.
                Some(external) => {
                    let mut local = SymbolTable::new();
                    proto_to_block(&proto, &mut local, Some(external.public_key.clone()))?
                }
                None => proto_to_block(&proto, &mut symbols, None)?,
            };
            blocks.push(parsed);
        }

        Ok(Self {
            authority,
            blocks,
            symbols,
            container,
        })
    }

    /// Serialize to token bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        self.container.serialize()
    }

    /// Serialize to unpadded base64url text.
    #[must_use]
    pub fn to_base64(&self) -> String {
        crate::format::to_base64(&self.serialize())
    }

    /// Append an attenuation block.
    ///
    /// # Errors
    ///
    /// `cannot_attenuate_sealed_token` on sealed tokens, plus block
    /// conversion errors.
    pub fn attenuate(&self, builder: BlockBuilder) -> Result<Self> {
        self.attenuate_with_rng(builder, self.next_algorithm(), &mut OsRng)
    }

    /// Append an attenuation block, choosing the next keypair's
    /// algorithm and RNG.
    ///
    /// # Errors
    ///
    /// As [`Warrant::attenuate`].
    pub fn attenuate_with_rng<R: RngCore + CryptoRng>(
        &self,
        builder: BlockBuilder,
        algorithm: Algorithm,
        rng: &mut R,
    ) -> Result<Self> {
        let mut symbols = self.symbols.clone();
        let (block, signed, next_secret) =
            append_builder_block(&self.container, &mut symbols, builder, algorithm, rng)?;

        let mut container = self.container.clone();
        container.blocks.push(signed);
        container.proof = Proof::NextSecret(next_secret);

        let mut blocks = self.blocks.clone();
        blocks.push(block);
        debug!(blocks = blocks.len(), "token attenuated");

        Ok(Self {
            authority: self.authority.clone(),
            blocks,
            symbols,
            container,
        })
    }

    /// Produce the request a third party needs to co-sign a block for
    /// this token.
    #[must_use]
    pub fn third_party_request(&self) -> ThirdPartyRequest {
        ThirdPartyRequest::new(self.container.last_block().signature.clone())
    }

    /// Attach a third-party block.
    ///
    /// # Errors
    ///
    /// `cannot_attenuate_sealed_token` on sealed tokens,
    /// `invalid_external_signature` if the co-signature does not match
    /// this token's chain position, plus payload validation errors.
    pub fn append_third_party(&self, block: ThirdPartyBlock) -> Result<Self> {
        self.append_third_party_with_rng(block, self.next_algorithm(), &mut OsRng)
    }

    /// Attach a third-party block, choosing the next keypair's
    /// algorithm and RNG.
    ///
    /// # Errors
    ///
    /// As [`Warrant::append_third_party`].
    pub fn append_third_party_with_rng<R: RngCore + CryptoRng>(
        &self,
        block: ThirdPartyBlock,
        algorithm: Algorithm,
        rng: &mut R,
    ) -> Result<Self> {
        let (parsed, signed, next_secret) =
            append_third_party_block(&self.container, block, algorithm, rng)?;

        let mut container = self.container.clone();
        container.blocks.push(signed);
        container.proof = Proof::NextSecret(next_secret);

        let mut blocks = self.blocks.clone();
        blocks.push(parsed);
        debug!(blocks = blocks.len(), "third-party block attached");

        Ok(Self {
            authority: self.authority.clone(),
            blocks,
            symbols: self.symbols.clone(),
            container,
        })
    }

    /// Seal the token, making further attenuation impossible.
    ///
    /// # Errors
    ///
    /// `cannot_attenuate_sealed_token` if already sealed.
    pub fn seal(&self) -> Result<Self> {
        let proof = seal_proof(&self.container)?;
        let mut container = self.container.clone();
        container.proof = proof;
        debug!("token sealed");
        Ok(Self {
            authority: self.authority.clone(),
            blocks: self.blocks.clone(),
            symbols: self.symbols.clone(),
            container,
        })
    }

    /// Whether the token is sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        matches!(self.container.proof, Proof::Final(_))
    }

    /// The root key id hint, if any.
    #[must_use]
    pub fn root_key_id(&self) -> Option<u32> {
        self.container.root_key_id
    }

    /// Number of blocks, authority included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        1 + self.blocks.len()
    }

    /// Render block `index`'s program as canonical text.
    ///
    /// # Errors
    ///
    /// Unknown block index or unresolvable symbols.
    pub fn print_block(&self, index: usize) -> Result<String> {
        if index == 0 {
            return self.authority.print(&self.symbols);
        }
        let block = self
            .blocks
            .get(index - 1)
            .ok_or(Error::Format(FormatError::MissingField("block")))?;
        if block.external_key.is_some() {
            block.print(&block.local_table())
        } else {
            block.print(&self.symbols)
        }
    }

    /// Per-block revocation identifiers (the block signatures), in
    /// chain order.
    #[must_use]
    pub fn revocation_identifiers(&self) -> Vec<Vec<u8>> {
        let mut identifiers = vec![self.container.authority.signature.as_bytes().to_vec()];
        identifiers.extend(
            self.container
                .blocks
                .iter()
                .map(|block| block.signature.as_bytes().to_vec()),
        );
        identifiers
    }

    /// Run authorization under `authorizer`.
    ///
    /// # Errors
    ///
    /// As [`Authorizer::authorize`].
    pub fn authorize(&self, authorizer: &Authorizer) -> Result<Authorization> {
        authorizer.authorize(self)
    }

    /// Evaluate a single check against this token's saturated world,
    /// without requiring an allow policy.
    ///
    /// # Errors
    ///
    /// As [`Authorizer::query`].
    pub fn query(&self, authorizer: &Authorizer, check: &Check) -> Result<bool> {
        authorizer.query(self, check)
    }

    fn next_algorithm(&self) -> Algorithm {
        self.container.last_block().next_key.algorithm()
    }
}

/// Build, intern and sign an attenuation block.
pub(crate) fn append_builder_block<R: RngCore + CryptoRng>(
    container: &Container,
    symbols: &mut SymbolTable,
    builder: BlockBuilder,
    algorithm: Algorithm,
    rng: &mut R,
) -> Result<(Block, SerializedBlock, PrivateKey)> {
    let Proof::NextSecret(secret) = &container.proof else {
        return Err(Error::AlreadySealed);
    };
    let block = Block::from_builder(builder, symbols)?;
    let payload = block_to_proto(&block).encode_to_vec();

    let next = KeyPair::generate_with_rng(algorithm, rng);
    let previous = &container.last_block().signature;
    let input = signature::block_input_v1(
        &payload,
        next.public_key(),
        Some(previous.as_bytes()),
        None,
    );
    let signed = SerializedBlock {
        data: payload,
        next_key: next.public_key().clone(),
        signature: secret.sign(&input),
        external_signature: None,
        version: 1,
    };
    Ok((block, signed, next.private_key().clone()))
}

/// Validate, intern and sign a third-party block.
pub(crate) fn append_third_party_block<R: RngCore + CryptoRng>(
    container: &Container,
    block: ThirdPartyBlock,
    algorithm: Algorithm,
    rng: &mut R,
) -> Result<(Block, SerializedBlock, PrivateKey)> {
    let Proof::NextSecret(secret) = &container.proof else {
        return Err(Error::AlreadySealed);
    };
    let previous = &container.last_block().signature;
    block.verify(previous)?;

    let proto = schema::Block::decode(&block.payload[..])?;
    let mut local = SymbolTable::new();
    let parsed = proto_to_block(
        &proto,
        &mut local,
        Some(block.external_signature.public_key.clone()),
    )?;

    let next = KeyPair::generate_with_rng(algorithm, rng);
    let input = signature::block_input_v1(
        &block.payload,
        next.public_key(),
        Some(previous.as_bytes()),
        Some(block.external_signature.signature.as_bytes()),
    );
    let signed = SerializedBlock {
        data: block.payload,
        next_key: next.public_key().clone(),
        signature: secret.sign(&input),
        external_signature: Some(block.external_signature),
        version: 1,
    };
    Ok((parsed, signed, next.private_key().clone()))
}

/// Consume the next secret into a sealing signature.
pub(crate) fn seal_proof(container: &Container) -> Result<Proof> {
    let Proof::NextSecret(secret) = &container.proof else {
        return Err(Error::AlreadySealed);
    };
    let last = container.last_block();
    let input = signature::seal_input(&last.data, &last.next_key, last.signature.as_bytes());
    Ok(Proof::Final(secret.sign(&input)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{
        AuthorizationError, CheckOrigin, ExecutionError, ParseError,
    };
    use crate::datalog::ExecutionLimits;

    fn root() -> KeyPair {
        KeyPair::generate(Algorithm::Ed25519)
    }

    fn block(code: &str) -> BlockBuilder {
        let mut builder = BlockBuilder::new();
        builder.add_code(code).unwrap();
        builder
    }

    fn authorizer(code: &str) -> Authorizer {
        let mut authorizer = Authorizer::new();
        authorizer.add_code(code).unwrap();
        authorizer
    }

    #[test]
    fn basic_token_authorizes() {
        // Scenario: authority `user(1234)` against `allow if user(1234)`.
        let token = Warrant::new(&root(), block("user(1234);")).unwrap();
        let decision = token.authorize(&authorizer("allow if user(1234);")).unwrap();
        assert_eq!(decision.policy_index, 0);
    }

    #[test]
    fn failing_check_is_reported_precisely() {
        let token = Warrant::new(&root(), block("user(1234);")).unwrap();
        let attenuated = token
            .attenuate(block("check if operation(\"read\");"))
            .unwrap();

        let auth = authorizer("operation(\"write\"); allow if user(1234);");
        let err = attenuated.authorize(&auth).unwrap_err();
        match err {
            Error::Authorization(AuthorizationError::FailedChecks(failed)) => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].origin, CheckOrigin::Block(1));
                assert_eq!(failed[0].index, 0);
                assert_eq!(failed[0].check, "check if operation(\"read\")");
            }
            other => panic!("unexpected error {other:?}"),
        }

        // The same check passes when the operation matches.
        let auth = authorizer("operation(\"read\"); allow if user(1234);");
        assert!(attenuated.authorize(&auth).is_ok());
    }

    #[test]
    fn arithmetic_check_and_chained_comparisons() {
        let token = Warrant::new(
            &root(),
            block("check if 1 + 2 * 3 - 4 / 2 == 5;"),
        )
        .unwrap();
        assert!(token.authorize(&authorizer("allow if true;")).is_ok());

        let mut bad = Authorizer::new();
        assert_eq!(
            bad.add_code("allow if 1 < 2 < 3;").unwrap_err(),
            Error::Language(ParseError::ChainedComparisons)
        );
    }

    #[test]
    fn overflow_aborts_authorization() {
        let token = Warrant::new(
            &root(),
            block("check if 10000000000 * 10000000000 !== 0;"),
        )
        .unwrap();
        assert_eq!(
            token.authorize(&authorizer("allow if true;")).unwrap_err(),
            Error::Execution(ExecutionError::Overflow)
        );
    }

    #[test]
    fn third_party_flow() {
        // Scenario: a third party adds `check if user(1), group(2)`.
        let token = Warrant::new(&root(), block("user(1);")).unwrap();
        let third_party = KeyPair::generate(Algorithm::Ed25519);

        let request = token.third_party_request();
        let request = ThirdPartyRequest::from_bytes(&request.serialize()).unwrap();
        let third_party_block = request
            .create_block(
                third_party.private_key(),
                block("check if user(1), group(2);"),
            )
            .unwrap();
        let attenuated = token.append_third_party(third_party_block).unwrap();
        assert_eq!(attenuated.block_count(), 2);

        // The check fails without `group(2)`.
        assert!(attenuated.authorize(&authorizer("allow if true;")).is_err());
        // ... and succeeds when the authorizer supplies it.
        assert!(attenuated
            .authorize(&authorizer("group(2); allow if true;"))
            .is_ok());
    }

    #[test]
    fn third_party_block_is_position_bound() {
        let token = Warrant::new(&root(), block("user(1);")).unwrap();
        let third_party = KeyPair::generate(Algorithm::Ed25519);
        let third_party_block = token
            .third_party_request()
            .create_block(third_party.private_key(), block("group(2);"))
            .unwrap();

        // Attenuating first changes the previous signature, so the
        // co-signature no longer matches.
        let attenuated = token.attenuate(block("other(1);")).unwrap();
        assert_eq!(
            attenuated.append_third_party(third_party_block).unwrap_err(),
            Error::Format(FormatError::InvalidExternalSignature)
        );
    }

    #[test]
    fn sealing_is_terminal() {
        let token = Warrant::new(&root(), block("user(1234);")).unwrap();
        let sealed = token.seal().unwrap();
        assert!(sealed.is_sealed());

        assert_eq!(
            sealed.attenuate(block("check if false;")).unwrap_err(),
            Error::AlreadySealed
        );
        assert_eq!(sealed.seal().unwrap_err(), Error::AlreadySealed);
        let third_party = KeyPair::generate(Algorithm::Ed25519);
        let third_party_block = sealed
            .third_party_request()
            .create_block(third_party.private_key(), block("group(2);"))
            .unwrap();
        assert_eq!(
            sealed.append_third_party(third_party_block).unwrap_err(),
            Error::AlreadySealed
        );
    }

    #[test]
    fn sealed_roundtrip_authorizes_like_the_original() {
        let keypair = root();
        let token = Warrant::new(&keypair, block("user(1234);")).unwrap();
        let sealed = token.seal().unwrap();

        let bytes = sealed.serialize();
        let restored = Warrant::from_bytes(&bytes, keypair.public_key()).unwrap();
        assert!(restored.is_sealed());
        // Byte-exact re-encoding.
        assert_eq!(restored.serialize(), bytes);

        let auth = authorizer("allow if user(1234);");
        assert_eq!(
            token.authorize(&auth).unwrap().policy_index,
            restored.authorize(&auth).unwrap().policy_index
        );

        let text = sealed.to_base64();
        let restored = Warrant::from_base64(&text, keypair.public_key()).unwrap();
        assert_eq!(restored.serialize(), bytes);
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let keypair = root();
        let token = Warrant::new(&keypair, block("user(1);")).unwrap();
        let token = token.attenuate(block("check if user(1);")).unwrap();
        let token = token.attenuate(block("check if true;")).unwrap();

        // Corrupted signature.
        let mut container = token.container.clone();
        let mut bytes = container.blocks[0].signature.as_bytes().to_vec();
        bytes[0] ^= 0xff;
        container.blocks[0].signature = crate::crypto::Signature::from_vec(bytes);
        assert!(Warrant::from_bytes(&container.serialize(), keypair.public_key()).is_err());

        // Swapped block order.
        let mut container = token.container.clone();
        container.blocks.swap(0, 1);
        assert!(Warrant::from_bytes(&container.serialize(), keypair.public_key()).is_err());
    }

    #[test]
    fn attenuation_is_authority_monotone() {
        let token = Warrant::new(&root(), block("user(1);")).unwrap();
        let auth = authorizer("allow if user(2);");
        assert!(token.authorize(&auth).is_err());
        // No attenuation can recover authority the base token lacks.
        let attenuated = token.attenuate(block("user(2);")).unwrap();
        assert!(attenuated.authorize(&auth).is_err());
    }

    #[test]
    fn block_facts_are_scoped() {
        let token = Warrant::new(&root(), block("user(1);")).unwrap();
        let attenuated = token.attenuate(block("group(2);")).unwrap();
        // The authorizer does not trust attenuation blocks by default.
        assert_eq!(
            attenuated
                .authorize(&authorizer("allow if group(2);"))
                .unwrap_err(),
            Error::Authorization(AuthorizationError::NoMatchingPolicy)
        );
        // The attenuation block itself sees its own fact.
        let gated = attenuated
            .attenuate(block("check if group(2);"))
            .unwrap();
        assert!(matches!(
            gated
                .authorize(&authorizer("allow if user(1);"))
                .unwrap_err(),
            Error::Authorization(AuthorizationError::FailedChecks(_))
        ));
    }

    #[test]
    fn deny_and_missing_policies() {
        let token = Warrant::new(&root(), block("user(1);")).unwrap();
        match token
            .authorize(&authorizer("deny if user(1); allow if true;"))
            .unwrap_err()
        {
            Error::Authorization(AuthorizationError::Denied { index, policy }) => {
                assert_eq!(index, 0);
                assert_eq!(policy, "deny if user(1)");
            }
            other => panic!("unexpected error {other:?}"),
        }

        assert_eq!(
            token.authorize(&Authorizer::new()).unwrap_err(),
            Error::Execution(ExecutionError::AuthorizerWithoutPolicy)
        );
        assert_eq!(
            token
                .authorize(&authorizer("allow if user(99);"))
                .unwrap_err(),
            Error::Authorization(AuthorizationError::NoMatchingPolicy)
        );
    }

    #[test]
    fn query_needs_no_policy() {
        let token = Warrant::new(&root(), block("user(1234);")).unwrap();
        let auth = Authorizer::new();
        let check: Check = "check if user(1234)".parse::<Check>().unwrap();
        assert!(token.query(&auth, &check).unwrap());
        let check: Check = "check if user(99)".parse::<Check>().unwrap();
        assert!(!token.query(&auth, &check).unwrap());
    }

    #[test]
    fn revocation_identifiers_are_queryable() {
        let token = Warrant::new(&root(), block("user(1);")).unwrap();
        let token = token.attenuate(block("check if true;")).unwrap();
        assert_eq!(token.revocation_identifiers().len(), 2);

        let auth = Authorizer::new();
        let check: Check = "check if revocation_id(1, $sig)".parse().unwrap();
        assert!(token.query(&auth, &check).unwrap());
        let check: Check = "check if revocation_id(7, $sig)".parse().unwrap();
        assert!(!token.query(&auth, &check).unwrap());
    }

    #[test]
    fn resource_limits_abort_evaluation() {
        let facts: String = (0..12).map(|i| format!("seen({i}); ")).collect();
        let token = Warrant::new(
            &root(),
            block(&format!("{facts}copy($x) <- seen($x);")),
        )
        .unwrap();
        let mut auth = authorizer("allow if true;");
        auth.set_limits(ExecutionLimits {
            max_facts: Some(10),
            max_iterations: None,
        });
        assert_eq!(
            token.authorize(&auth).unwrap_err(),
            Error::Execution(ExecutionError::TooManyFacts(10))
        );
    }

    #[test]
    fn root_key_id_resolution() {
        let first = root();
        let second = root();
        let token = Warrant::new_with_root_key_id(&second, 1, block("user(1);")).unwrap();
        let bytes = token.serialize();

        let keys = [first.public_key().clone(), second.public_key().clone()];
        let resolver = RootKeyResolver(move |id: Option<u32>| {
            keys.get(id? as usize).cloned()
        });
        assert!(Warrant::from_bytes(&bytes, resolver).is_ok());

        let empty = RootKeyResolver(|_: Option<u32>| None);
        assert_eq!(
            Warrant::from_bytes(&bytes, empty).unwrap_err(),
            Error::Format(FormatError::UnknownRootKey(Some(1)))
        );
    }

    #[test]
    fn mixed_algorithm_chain() {
        let keypair = KeyPair::generate(Algorithm::Secp256r1);
        let token = Warrant::new(&keypair, block("user(1);")).unwrap();
        let token = token
            .attenuate_with_rng(
                block("check if user(1);"),
                Algorithm::Ed25519,
                &mut OsRng,
            )
            .unwrap();
        let bytes = token.serialize();
        let restored = Warrant::from_bytes(&bytes, keypair.public_key()).unwrap();
        assert!(restored.authorize(&authorizer("allow if user(1);")).is_ok());
    }

    #[test]
    fn print_block_renders_programs() {
        let token = Warrant::new(&root(), block("user(1234);")).unwrap();
        let token = token
            .attenuate(block("check if operation(\"read\");"))
            .unwrap();
        assert_eq!(token.print_block(0).unwrap(), "user(1234);");
        assert_eq!(
            token.print_block(1).unwrap(),
            "check if operation(\"read\");"
        );
        assert!(token.print_block(2).is_err());
    }
}
