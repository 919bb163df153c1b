//! Tokens decoded without signature validation.
//!
//! An [`UnverifiedWarrant`] parses the chain structure and Datalog
//! payloads but checks no signature. It can be inspected and attenuated
//! offline; authorization requires upgrading it with
//! [`UnverifiedWarrant::verify`], which runs the full chain walk.

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::builder::BlockBuilder;
use crate::crypto::Algorithm;
use crate::error::Result;
use crate::format::{Container, Proof};
use crate::token::{
    append_builder_block, append_third_party_block, seal_proof, Block, RootKeyProvider,
    ThirdPartyBlock, ThirdPartyRequest, Warrant,
};

/// A decoded token whose signatures have not been checked.
#[derive(Debug, Clone)]
pub struct UnverifiedWarrant {
    inner: Warrant,
}

impl UnverifiedWarrant {
    /// Decode a serialized token without verifying signatures.
    ///
    /// # Errors
    ///
    /// Structural format errors only.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let container = Container::deserialize(bytes)?;
        Ok(Self {
            inner: Warrant::from_container(container)?,
        })
    }

    /// Decode a base64url token without verifying signatures.
    ///
    /// # Errors
    ///
    /// Structural format errors, plus `invalid_base64url_string`.
    pub fn from_base64(text: &str) -> Result<Self> {
        Self::from_bytes(&crate::format::from_base64(text)?)
    }

    /// Check the signature chain and upgrade into a [`Warrant`].
    ///
    /// # Errors
    ///
    /// Signature and proof validation errors.
    pub fn verify<K: RootKeyProvider>(self, root: K) -> Result<Warrant> {
        let key = root.choose(self.inner.container.root_key_id)?;
        self.inner.container.verify(&key)?;
        Ok(self.inner)
    }

    /// Serialize to token bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        self.inner.serialize()
    }

    /// Serialize to unpadded base64url text.
    #[must_use]
    pub fn to_base64(&self) -> String {
        self.inner.to_base64()
    }

    /// Append an attenuation block (no signature validation needed:
    /// appending only requires the next-key secret from the proof).
    ///
    /// # Errors
    ///
    /// `cannot_attenuate_sealed_token` on sealed tokens, plus block
    /// conversion errors.
    pub fn attenuate(&self, builder: BlockBuilder) -> Result<Self> {
        self.attenuate_with_rng(builder, self.next_algorithm(), &mut OsRng)
    }

    /// Append an attenuation block with explicit algorithm and RNG.
    ///
    /// # Errors
    ///
    /// As [`UnverifiedWarrant::attenuate`].
    pub fn attenuate_with_rng<R: RngCore + CryptoRng>(
        &self,
        builder: BlockBuilder,
        algorithm: Algorithm,
        rng: &mut R,
    ) -> Result<Self> {
        let mut symbols = self.inner.symbols.clone();
        let (block, signed, next_secret) =
            append_builder_block(&self.inner.container, &mut symbols, builder, algorithm, rng)?;

        let mut container = self.inner.container.clone();
        container.blocks.push(signed);
        container.proof = Proof::NextSecret(next_secret);
        let mut blocks = self.inner.blocks.clone();
        blocks.push(block);

        Ok(Self {
            inner: Warrant {
                authority: self.inner.authority.clone(),
                blocks,
                symbols,
                container,
            },
        })
    }

    /// Produce the request a third party needs to co-sign a block.
    #[must_use]
    pub fn third_party_request(&self) -> ThirdPartyRequest {
        self.inner.third_party_request()
    }

    /// Attach a third-party block.
    ///
    /// # Errors
    ///
    /// As [`Warrant::append_third_party`].
    pub fn append_third_party(&self, block: ThirdPartyBlock) -> Result<Self> {
        let (parsed, signed, next_secret) = append_third_party_block(
            &self.inner.container,
            block,
            self.next_algorithm(),
            &mut OsRng,
        )?;
        let mut container = self.inner.container.clone();
        container.blocks.push(signed);
        container.proof = Proof::NextSecret(next_secret);
        let mut blocks = self.inner.blocks.clone();
        blocks.push(parsed);

        Ok(Self {
            inner: Warrant {
                authority: self.inner.authority.clone(),
                blocks,
                symbols: self.inner.symbols.clone(),
                container,
            },
        })
    }

    /// Seal the token.
    ///
    /// # Errors
    ///
    /// `cannot_attenuate_sealed_token` if already sealed.
    pub fn seal(&self) -> Result<Self> {
        let proof = seal_proof(&self.inner.container)?;
        let mut inner = self.inner.clone();
        inner.container.proof = proof;
        Ok(Self { inner })
    }

    /// Number of blocks, authority included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.inner.block_count()
    }

    /// Render block `index`'s program as canonical text.
    ///
    /// # Errors
    ///
    /// Unknown block index or unresolvable symbols.
    pub fn print_block(&self, index: usize) -> Result<String> {
        self.inner.print_block(index)
    }

    /// The parsed blocks, authority first.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        core::iter::once(&self.inner.authority).chain(self.inner.blocks.iter())
    }

    fn next_algorithm(&self) -> Algorithm {
        self.inner.container.last_block().next_key.algorithm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::error::{Error, FormatError};
    use crate::token::Authorizer;

    fn block(code: &str) -> BlockBuilder {
        let mut builder = BlockBuilder::new();
        builder.add_code(code).unwrap();
        builder
    }

    #[test]
    fn decode_without_verification() {
        let keypair = KeyPair::generate(Algorithm::Ed25519);
        let token = Warrant::new(&keypair, block("user(1);")).unwrap();
        let unverified = UnverifiedWarrant::from_bytes(&token.serialize()).unwrap();
        assert_eq!(unverified.block_count(), 1);
        assert_eq!(unverified.print_block(0).unwrap(), "user(1);");
    }

    #[test]
    fn verify_upgrades_to_token() {
        let keypair = KeyPair::generate(Algorithm::Ed25519);
        let token = Warrant::new(&keypair, block("user(1);")).unwrap();
        let unverified = UnverifiedWarrant::from_bytes(&token.serialize()).unwrap();

        let verified = unverified.verify(keypair.public_key()).unwrap();
        let mut auth = Authorizer::new();
        auth.add_code("allow if user(1);").unwrap();
        assert!(verified.authorize(&auth).is_ok());
    }

    #[test]
    fn verify_with_wrong_key_fails() {
        let keypair = KeyPair::generate(Algorithm::Ed25519);
        let other = KeyPair::generate(Algorithm::Ed25519);
        let token = Warrant::new(&keypair, block("user(1);")).unwrap();
        let unverified = UnverifiedWarrant::from_bytes(&token.serialize()).unwrap();
        assert_eq!(
            unverified.verify(other.public_key()).unwrap_err(),
            Error::Format(FormatError::InvalidSignature)
        );
    }

    #[test]
    fn attenuate_then_verify() {
        let keypair = KeyPair::generate(Algorithm::Ed25519);
        let token = Warrant::new(&keypair, block("user(1);")).unwrap();
        let unverified = UnverifiedWarrant::from_bytes(&token.serialize()).unwrap();
        let attenuated = unverified
            .attenuate(block("check if operation(\"read\");"))
            .unwrap();
        assert_eq!(attenuated.block_count(), 2);

        // The appended block chains correctly: verification succeeds.
        let verified = attenuated.verify(keypair.public_key()).unwrap();
        assert_eq!(
            verified.print_block(1).unwrap(),
            "check if operation(\"read\");"
        );
    }

    #[test]
    fn sealed_unverified_rejects_attenuation() {
        let keypair = KeyPair::generate(Algorithm::Ed25519);
        let token = Warrant::new(&keypair, block("user(1);")).unwrap();
        let unverified = UnverifiedWarrant::from_bytes(&token.serialize()).unwrap();
        let sealed = unverified.seal().unwrap();
        assert_eq!(
            sealed.attenuate(block("check if true;")).unwrap_err(),
            Error::AlreadySealed
        );
        // Sealing produced a valid sealing signature.
        assert!(sealed.verify(keypair.public_key()).is_ok());
    }
}
