//! Wire-level token container: serialization, base64 wrapping and the
//! signature chain walk.
//!
//! The container keeps every block's payload bytes verbatim as they
//! arrived, so signature inputs can be rebuilt exactly and re-encoding
//! a decoded token is byte-identical.

pub mod convert;
pub mod schema;
pub mod signature;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use prost::Message;
use tracing::trace;

use crate::crypto::{PrivateKey, PublicKey, Signature};
use crate::error::{Error, FormatError, Result};

/// Unpadded on encode, padding-tolerant on decode (RFC 4648 url-safe
/// alphabet).
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode token bytes as unpadded base64url.
#[must_use]
pub fn to_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode base64url token text (padding tolerated).
///
/// # Errors
///
/// Returns `invalid_base64url_string`.
pub fn from_base64(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text.trim())
        .map_err(|e| Error::Format(FormatError::Base64(e.to_string())))
}

/// A third party's co-signature on a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSignature {
    /// The co-signature bytes.
    pub signature: Signature,
    /// The third party's public key.
    pub public_key: PublicKey,
}

/// One wire-level chain node, payload kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedBlock {
    /// Serialized block payload, exactly as signed.
    pub data: Vec<u8>,
    /// Public half of the ephemeral next keypair.
    pub next_key: PublicKey,
    /// Chain signature over this block's input.
    pub signature: Signature,
    /// Present on third-party blocks.
    pub external_signature: Option<ExternalSignature>,
    /// Signature input scheme: 0 legacy, 1 current.
    pub version: u32,
}

/// The chain terminator.
#[derive(Debug, Clone)]
pub enum Proof {
    /// Private half of the last next keypair: the token is open.
    NextSecret(PrivateKey),
    /// Signature over the sealing input: the token is sealed.
    Final(Signature),
}

/// The wire-level token: signed blocks plus proof.
#[derive(Debug, Clone)]
pub struct Container {
    /// Hint for selecting the root public key.
    pub root_key_id: Option<u32>,
    /// The authority block.
    pub authority: SerializedBlock,
    /// Attenuation blocks, in chain order.
    pub blocks: Vec<SerializedBlock>,
    /// Open or sealed terminator.
    pub proof: Proof,
}

fn proto_to_serialized_block(proto: &schema::SignedBlock) -> Result<SerializedBlock> {
    let next_key = convert::proto_to_public_key(&proto.next_key)?;
    let external_signature = proto
        .external_signature
        .as_ref()
        .map(|external| {
            Ok::<_, Error>(ExternalSignature {
                signature: Signature::from_vec(external.signature.clone()),
                public_key: convert::proto_to_public_key(&external.public_key)?,
            })
        })
        .transpose()?;
    let version = proto.version.unwrap_or(0);
    if version > 1 {
        return Err(Error::Format(FormatError::Version {
            minimum: 0,
            maximum: 1,
            actual: version,
        }));
    }
    Ok(SerializedBlock {
        data: proto.block.clone(),
        next_key,
        signature: Signature::from_vec(proto.signature.clone()),
        external_signature,
        version,
    })
}

fn serialized_block_to_proto(block: &SerializedBlock) -> schema::SignedBlock {
    schema::SignedBlock {
        block: block.data.clone(),
        next_key: convert::public_key_to_proto(&block.next_key),
        signature: block.signature.as_bytes().to_vec(),
        external_signature: block.external_signature.as_ref().map(|external| {
            schema::ExternalSignature {
                signature: external.signature.as_bytes().to_vec(),
                public_key: convert::public_key_to_proto(&external.public_key),
            }
        }),
        version: if block.version == 0 {
            None
        } else {
            Some(block.version)
        },
    }
}

impl SerializedBlock {
    /// Rebuild this block's signature input.
    ///
    /// # Errors
    ///
    /// `deprecated_third_party_signature` for external signatures on V0
    /// blocks.
    pub fn signature_input(&self, previous_signature: Option<&Signature>) -> Result<Vec<u8>> {
        let external = self
            .external_signature
            .as_ref()
            .map(|e| e.signature.as_bytes());
        match self.version {
            0 => {
                if external.is_some() {
                    return Err(Error::Format(FormatError::DeprecatedThirdPartySignature));
                }
                Ok(signature::block_input_v0(&self.data, None, &self.next_key))
            }
            _ => Ok(signature::block_input_v1(
                &self.data,
                &self.next_key,
                previous_signature.map(Signature::as_bytes),
                external,
            )),
        }
    }
}

impl Container {
    /// Decode a container from token bytes.
    ///
    /// Structure only: signatures are not checked here.
    ///
    /// # Errors
    ///
    /// Deserialization and structural format errors.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let proto = schema::Token::decode(bytes)?;
        let authority = proto_to_serialized_block(&proto.authority)?;
        let mut blocks = Vec::with_capacity(proto.blocks.len());
        for block in &proto.blocks {
            blocks.push(proto_to_serialized_block(block)?);
        }

        let last_algorithm = blocks
            .last()
            .unwrap_or(&authority)
            .next_key
            .algorithm();
        let proof = match proto
            .proof
            .content
            .as_ref()
            .ok_or(Error::Format(FormatError::InvalidProof))?
        {
            schema::proof::Content::NextSecret(secret) => {
                Proof::NextSecret(PrivateKey::from_bytes(secret, last_algorithm)?)
            }
            schema::proof::Content::FinalSignature(signature) => {
                Proof::Final(Signature::from_vec(signature.clone()))
            }
        };

        Ok(Self {
            root_key_id: proto.root_key_id,
            authority,
            blocks,
            proof,
        })
    }

    /// Encode this container to token bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let proto = schema::Token {
            root_key_id: self.root_key_id,
            authority: serialized_block_to_proto(&self.authority),
            blocks: self.blocks.iter().map(serialized_block_to_proto).collect(),
            proof: schema::Proof {
                content: Some(match &self.proof {
                    Proof::NextSecret(secret) => {
                        schema::proof::Content::NextSecret(secret.to_bytes())
                    }
                    Proof::Final(signature) => {
                        schema::proof::Content::FinalSignature(signature.as_bytes().to_vec())
                    }
                }),
            },
        };
        proto.encode_to_vec()
    }

    /// The last block of the chain (the authority if no attenuation).
    #[must_use]
    pub fn last_block(&self) -> &SerializedBlock {
        self.blocks.last().unwrap_or(&self.authority)
    }

    /// Walk the chain and verify every signature and the proof.
    ///
    /// # Errors
    ///
    /// The first failing step: `third_party_signed_authority`,
    /// `invalid_signature`, `invalid_external_signature`,
    /// `invalid_proof` or `invalid_sealing_signature`.
    pub fn verify(&self, root: &PublicKey) -> Result<()> {
        if self.authority.external_signature.is_some() {
            return Err(Error::Format(FormatError::ThirdPartySignedAuthority));
        }

        let input = self.authority.signature_input(None)?;
        root.verify(&input, &self.authority.signature)?;
        trace!("authority signature verified");

        let mut current_key = &self.authority.next_key;
        let mut previous_signature = &self.authority.signature;
        for (index, block) in self.blocks.iter().enumerate() {
            let input = block.signature_input(Some(previous_signature))?;
            current_key.verify(&input, &block.signature)?;

            if let Some(external) = &block.external_signature {
                let input = signature::external_input_v1(
                    &block.data,
                    previous_signature.as_bytes(),
                );
                external
                    .public_key
                    .verify(&input, &external.signature)
                    .map_err(|_| Error::Format(FormatError::InvalidExternalSignature))?;
            }
            trace!(block = index + 1, "block signature verified");

            current_key = &block.next_key;
            previous_signature = &block.signature;
        }

        let last = self.last_block();
        match &self.proof {
            Proof::NextSecret(secret) => {
                if secret.public() != last.next_key {
                    return Err(Error::Format(FormatError::InvalidProof));
                }
            }
            Proof::Final(signature) => {
                let input = signature::seal_input(
                    &last.data,
                    &last.next_key,
                    last.signature.as_bytes(),
                );
                last.next_key
                    .verify(&input, signature)
                    .map_err(|_| Error::Format(FormatError::InvalidSealingSignature))?;
            }
        }
        trace!("proof verified");
        Ok(())
    }
}
