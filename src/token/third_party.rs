//! Third-party attenuation: the detachable request/contents pair.
//!
//! The token holder sends a [`ThirdPartyRequest`] carrying the
//! signature of the token's current last block. The third party builds
//! a block in a fresh, isolated interning table, signs the external
//! input (payload plus that previous signature) and returns a
//! [`ThirdPartyBlock`], which the holder attaches with
//! `Warrant::append_third_party`.

use prost::Message;

use crate::builder::BlockBuilder;
use crate::crypto::{PrivateKey, Signature};
use crate::datalog::SymbolTable;
use crate::error::{Error, FormatError, Result};
use crate::format::convert::block_to_proto;
use crate::format::{schema, signature, ExternalSignature};
use crate::token::Block;

/// What a token holder sends to a third party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThirdPartyRequest {
    pub(crate) previous_signature: Signature,
}

impl ThirdPartyRequest {
    pub(crate) fn new(previous_signature: Signature) -> Self {
        Self { previous_signature }
    }

    /// Serialize for transport.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        schema::ThirdPartyBlockRequest {
            previous_signature: self.previous_signature.as_bytes().to_vec(),
        }
        .encode_to_vec()
    }

    /// Deserialize a received request.
    ///
    /// # Errors
    ///
    /// Returns deserialization errors.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let proto = schema::ThirdPartyBlockRequest::decode(bytes)?;
        Ok(Self {
            previous_signature: Signature::from_vec(proto.previous_signature),
        })
    }

    /// Build and co-sign a block answering this request.
    ///
    /// The block is assembled in an isolated interning table: nothing
    /// from the requesting token's tables is visible, and nothing leaks
    /// back.
    ///
    /// # Errors
    ///
    /// Propagates block conversion errors.
    pub fn create_block(
        &self,
        private_key: &PrivateKey,
        builder: BlockBuilder,
    ) -> Result<ThirdPartyBlock> {
        let mut symbols = SymbolTable::new();
        let block = Block::from_builder(builder, &mut symbols)?;
        let payload = block_to_proto(&block).encode_to_vec();

        let input = signature::external_input_v1(&payload, self.previous_signature.as_bytes());
        let external_signature = ExternalSignature {
            signature: private_key.sign(&input),
            public_key: private_key.public(),
        };
        Ok(ThirdPartyBlock {
            payload,
            external_signature,
        })
    }
}

/// What the third party returns: a serialized block payload plus its
/// co-signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThirdPartyBlock {
    pub(crate) payload: Vec<u8>,
    pub(crate) external_signature: ExternalSignature,
}

impl ThirdPartyBlock {
    /// Serialize for transport.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        schema::ThirdPartyBlockContents {
            payload: self.payload.clone(),
            external_signature: schema::ExternalSignature {
                signature: self.external_signature.signature.as_bytes().to_vec(),
                public_key: crate::format::convert::public_key_to_proto(
                    &self.external_signature.public_key,
                ),
            },
        }
        .encode_to_vec()
    }

    /// Deserialize received block contents.
    ///
    /// # Errors
    ///
    /// Returns deserialization errors.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let proto = schema::ThirdPartyBlockContents::decode(bytes)?;
        Ok(Self {
            payload: proto.payload,
            external_signature: ExternalSignature {
                signature: Signature::from_vec(proto.external_signature.signature),
                public_key: crate::format::convert::proto_to_public_key(
                    &proto.external_signature.public_key,
                )?,
            },
        })
    }

    /// Check the co-signature against the expected previous signature.
    pub(crate) fn verify(&self, previous_signature: &Signature) -> Result<()> {
        let input = signature::external_input_v1(&self.payload, previous_signature.as_bytes());
        self.external_signature
            .public_key
            .verify(&input, &self.external_signature.signature)
            .map_err(|_| Error::Format(FormatError::InvalidExternalSignature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Algorithm, KeyPair};

    #[test]
    fn request_roundtrip() {
        let request = ThirdPartyRequest::new(Signature::from_vec(vec![7; 64]));
        let restored = ThirdPartyRequest::from_bytes(&request.serialize()).unwrap();
        assert_eq!(restored, request);
    }

    #[test]
    fn created_block_verifies_against_request() {
        let third_party = KeyPair::generate(Algorithm::Ed25519);
        let request = ThirdPartyRequest::new(Signature::from_vec(vec![7; 64]));
        let mut builder = BlockBuilder::new();
        builder.add_code("check if user(1), group(2);").unwrap();
        let block = request
            .create_block(third_party.private_key(), builder)
            .unwrap();

        assert!(block.verify(&request.previous_signature).is_ok());
        // The signature is pinned to the chain position.
        assert!(block
            .verify(&Signature::from_vec(vec![8; 64]))
            .is_err());
    }

    #[test]
    fn block_contents_roundtrip() {
        let third_party = KeyPair::generate(Algorithm::Secp256r1);
        let request = ThirdPartyRequest::new(Signature::from_vec(vec![7; 64]));
        let mut builder = BlockBuilder::new();
        builder.add_code("group(2);").unwrap();
        let block = request
            .create_block(third_party.private_key(), builder)
            .unwrap();
        let restored = ThirdPartyBlock::from_bytes(&block.serialize()).unwrap();
        assert_eq!(restored, block);
    }
}
