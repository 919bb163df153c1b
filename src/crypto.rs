//! Cryptographic primitives for the token chain.
//!
//! Two signature algorithms are supported: Ed25519 (raw 64-byte
//! signatures, 32-byte keys) and ECDSA over secp256r1 (DER-encoded
//! signatures, 33-byte compressed keys). Each block of a token names the
//! algorithm of the *next* keypair, so a single chain may mix
//! algorithms.
//!
//! # Security
//!
//! - Uses `ed25519-dalek` for Ed25519 signatures
//! - Uses `p256` for ECDSA over secp256r1 (deterministic RFC 6979
//!   signing, so only keypair generation consumes randomness)
//! - Randomness is injectable for deterministic tests

use core::str::FromStr;

use ed25519_dalek::{Signer as _, Verifier as _};
use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::error::{Error, FormatError, Result};

/// Signature algorithm of a key or keypair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Algorithm {
    /// Ed25519 (default).
    Ed25519 = 0,
    /// ECDSA over secp256r1.
    Secp256r1 = 1,
}

impl Algorithm {
    /// Wire identifier of this algorithm.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u32 {
        self as u32
    }

    /// Resolve a wire identifier.
    ///
    /// # Errors
    ///
    /// Returns `FormatError::Deserialization` for unknown identifiers.
    pub fn from_id(id: u32) -> Result<Self> {
        match id {
            0 => Ok(Self::Ed25519),
            1 => Ok(Self::Secp256r1),
            other => Err(Error::Format(FormatError::Deserialization(format!(
                "unknown algorithm {other}"
            )))),
        }
    }

    /// Name used in the textual key syntax (`ed25519/..`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::Secp256r1 => "secp256r1",
        }
    }
}

impl core::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone)]
enum PublicKeyInner {
    Ed25519(ed25519_dalek::VerifyingKey),
    Secp256r1(p256::ecdsa::VerifyingKey),
}

/// A public key for signature verification.
///
/// Ed25519 keys serialize as 32 raw bytes; secp256r1 keys as the 33-byte
/// compressed SEC1 point.
#[derive(Clone)]
pub struct PublicKey {
    inner: PublicKeyInner,
}

impl PublicKey {
    /// Create a public key from serialized bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes don't form a valid key for the
    /// algorithm.
    pub fn from_bytes(bytes: &[u8], algorithm: Algorithm) -> Result<Self> {
        let inner = match algorithm {
            Algorithm::Ed25519 => {
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| Error::Format(FormatError::InvalidKeySize(bytes.len())))?;
                PublicKeyInner::Ed25519(
                    ed25519_dalek::VerifyingKey::from_bytes(&arr)
                        .map_err(|_| Error::Format(FormatError::InvalidKey))?,
                )
            }
            Algorithm::Secp256r1 => PublicKeyInner::Secp256r1(
                p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                    .map_err(|_| Error::Format(FormatError::InvalidKey))?,
            ),
        };
        Ok(Self { inner })
    }

    /// The serialized form of this key.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.inner {
            PublicKeyInner::Ed25519(k) => k.to_bytes().to_vec(),
            PublicKeyInner::Secp256r1(k) => k.to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    /// The algorithm this key belongs to.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        match self.inner {
            PublicKeyInner::Ed25519(_) => Algorithm::Ed25519,
            PublicKeyInner::Secp256r1(_) => Algorithm::Secp256r1,
        }
    }

    /// Verify a signature over a message.
    ///
    /// # Errors
    ///
    /// Returns `FormatError::InvalidSignature` if the signature does not
    /// verify (including malformed signature encodings).
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        match &self.inner {
            PublicKeyInner::Ed25519(k) => {
                let bytes: [u8; 64] = signature
                    .as_bytes()
                    .try_into()
                    .map_err(|_| Error::Format(FormatError::InvalidSignature))?;
                let sig = ed25519_dalek::Signature::from_bytes(&bytes);
                k.verify(message, &sig)
                    .map_err(|_| Error::Format(FormatError::InvalidSignature))
            }
            PublicKeyInner::Secp256r1(k) => {
                let sig = p256::ecdsa::Signature::from_der(signature.as_bytes())
                    .map_err(|_| Error::Format(FormatError::InvalidSignature))?;
                k.verify(message, &sig)
                    .map_err(|_| Error::Format(FormatError::InvalidSignature))
            }
        }
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm() == other.algorithm() && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl core::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "PublicKey({}/{}...)",
            self.algorithm(),
            hex::encode(&self.to_bytes()[..4])
        )
    }
}

impl core::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.algorithm(), hex::encode(self.to_bytes()))
    }
}

// Public keys serialize as their textual `<algorithm>/<hex>` form.
impl serde::Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = <String as serde::Deserialize>::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    /// Parse the textual `<algorithm>/<hex>` key syntax.
    fn from_str(s: &str) -> Result<Self> {
        let (name, data) = s
            .split_once('/')
            .ok_or_else(|| Error::Format(FormatError::HexData(s.to_string())))?;
        let algorithm = match name {
            "ed25519" => Algorithm::Ed25519,
            "secp256r1" => Algorithm::Secp256r1,
            _ => return Err(Error::Format(FormatError::InvalidKey)),
        };
        let bytes =
            hex::decode(data).map_err(|e| Error::Format(FormatError::HexData(e.to_string())))?;
        Self::from_bytes(&bytes, algorithm)
    }
}

#[derive(Clone)]
enum PrivateKeyInner {
    Ed25519(ed25519_dalek::SigningKey),
    Secp256r1(p256::ecdsa::SigningKey),
}

/// A private signing key.
pub struct PrivateKey {
    inner: PrivateKeyInner,
}

impl PrivateKey {
    /// Create a private key from its 32-byte scalar.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes don't form a valid key for the
    /// algorithm.
    pub fn from_bytes(bytes: &[u8], algorithm: Algorithm) -> Result<Self> {
        let inner = match algorithm {
            Algorithm::Ed25519 => {
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| Error::Format(FormatError::InvalidKeySize(bytes.len())))?;
                PrivateKeyInner::Ed25519(ed25519_dalek::SigningKey::from_bytes(&arr))
            }
            Algorithm::Secp256r1 => PrivateKeyInner::Secp256r1(
                p256::ecdsa::SigningKey::from_slice(bytes)
                    .map_err(|_| Error::Format(FormatError::InvalidKey))?,
            ),
        };
        Ok(Self { inner })
    }

    /// The serialized scalar of this key.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.inner {
            PrivateKeyInner::Ed25519(k) => k.to_bytes().to_vec(),
            PrivateKeyInner::Secp256r1(k) => k.to_bytes().to_vec(),
        }
    }

    /// The algorithm this key belongs to.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        match self.inner {
            PrivateKeyInner::Ed25519(_) => Algorithm::Ed25519,
            PrivateKeyInner::Secp256r1(_) => Algorithm::Secp256r1,
        }
    }

    /// The public half of this key.
    #[must_use]
    pub fn public(&self) -> PublicKey {
        match &self.inner {
            PrivateKeyInner::Ed25519(k) => PublicKey {
                inner: PublicKeyInner::Ed25519(k.verifying_key()),
            },
            PrivateKeyInner::Secp256r1(k) => PublicKey {
                inner: PublicKeyInner::Secp256r1(*k.verifying_key()),
            },
        }
    }

    /// Sign a message.
    ///
    /// Ed25519 produces the raw 64-byte signature; secp256r1 produces a
    /// DER-encoded ECDSA signature (deterministic per RFC 6979).
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        match &self.inner {
            PrivateKeyInner::Ed25519(k) => Signature::from_vec(k.sign(message).to_bytes().to_vec()),
            PrivateKeyInner::Secp256r1(k) => {
                let sig: p256::ecdsa::Signature = k.sign(message);
                Signature::from_vec(sig.to_der().as_bytes().to_vec())
            }
        }
    }
}

impl Clone for PrivateKey {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl core::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PrivateKey({}/..)", self.algorithm())
    }
}

/// A signing keypair: the secret scalar plus its public key.
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random keypair using the operating system RNG.
    #[must_use]
    pub fn generate(algorithm: Algorithm) -> Self {
        Self::generate_with_rng(algorithm, &mut OsRng)
    }

    /// Generate a new keypair from a caller-supplied RNG.
    ///
    /// Deterministic tests inject a seeded RNG here.
    pub fn generate_with_rng<R: RngCore + CryptoRng>(algorithm: Algorithm, rng: &mut R) -> Self {
        let private = match algorithm {
            Algorithm::Ed25519 => PrivateKey {
                inner: PrivateKeyInner::Ed25519(ed25519_dalek::SigningKey::generate(rng)),
            },
            Algorithm::Secp256r1 => PrivateKey {
                inner: PrivateKeyInner::Secp256r1(p256::ecdsa::SigningKey::random(rng)),
            },
        };
        Self::from(private)
    }

    /// The public key of this keypair.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// The private key of this keypair.
    #[must_use]
    pub const fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// The algorithm of this keypair.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.private.algorithm()
    }

    /// Sign a message with the private key.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.private.sign(message)
    }
}

impl From<PrivateKey> for KeyPair {
    fn from(private: PrivateKey) -> Self {
        let public = private.public();
        Self { private, public }
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self {
            private: self.private.clone(),
            public: self.public.clone(),
        }
    }
}

impl core::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "KeyPair(public={:?})", self.public)
    }
}

/// A detached signature.
///
/// Raw 64 bytes for Ed25519, DER-encoded for secp256r1. The byte string
/// of a block signature doubles as the block's revocation identifier.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    bytes: Vec<u8>,
}

impl Signature {
    /// Wrap signature bytes read from the wire.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The raw bytes of this signature.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into the raw bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl serde::Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde_bytes::serialize(&self.bytes[..], serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = serde_bytes::deserialize(deserializer)?;
        Ok(Self { bytes })
    }
}

impl core::fmt::Debug for Signature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let head = &self.bytes[..self.bytes.len().min(8)];
        write!(f, "Signature({}...)", hex::encode(head))
    }
}

impl core::fmt::Display for Signature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", hex::encode(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn keypair_generation_ed25519() {
        let kp = KeyPair::generate(Algorithm::Ed25519);
        assert_eq!(kp.public_key().to_bytes().len(), 32);
        assert_eq!(kp.algorithm(), Algorithm::Ed25519);
    }

    #[test]
    fn keypair_generation_secp256r1() {
        let kp = KeyPair::generate(Algorithm::Secp256r1);
        assert_eq!(kp.public_key().to_bytes().len(), 33);
        assert_eq!(kp.algorithm(), Algorithm::Secp256r1);
    }

    #[test]
    fn keypair_from_rng_deterministic() {
        let mut r1 = rand::rngs::StdRng::from_seed([0x42; 32]);
        let mut r2 = rand::rngs::StdRng::from_seed([0x42; 32]);
        let kp1 = KeyPair::generate_with_rng(Algorithm::Ed25519, &mut r1);
        let kp2 = KeyPair::generate_with_rng(Algorithm::Ed25519, &mut r2);
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn sign_and_verify_ed25519() {
        let kp = KeyPair::generate(Algorithm::Ed25519);
        let message = b"attenuate all the things";
        let signature = kp.sign(message);
        assert_eq!(signature.as_bytes().len(), 64);
        assert!(kp.public_key().verify(message, &signature).is_ok());
    }

    #[test]
    fn sign_and_verify_secp256r1() {
        let kp = KeyPair::generate(Algorithm::Secp256r1);
        let message = b"attenuate all the things";
        let signature = kp.sign(message);
        assert!(kp.public_key().verify(message, &signature).is_ok());
    }

    #[test]
    fn verify_wrong_message_fails() {
        let kp = KeyPair::generate(Algorithm::Ed25519);
        let signature = kp.sign(b"message");
        assert!(kp.public_key().verify(b"other", &signature).is_err());
    }

    #[test]
    fn verify_wrong_key_fails() {
        let kp1 = KeyPair::generate(Algorithm::Secp256r1);
        let kp2 = KeyPair::generate(Algorithm::Secp256r1);
        let signature = kp1.sign(b"message");
        assert!(kp2.public_key().verify(b"message", &signature).is_err());
    }

    #[test]
    fn public_key_roundtrip() {
        for algorithm in [Algorithm::Ed25519, Algorithm::Secp256r1] {
            let kp = KeyPair::generate(algorithm);
            let bytes = kp.public_key().to_bytes();
            let parsed = PublicKey::from_bytes(&bytes, algorithm).unwrap();
            assert_eq!(&parsed, kp.public_key());
        }
    }

    #[test]
    fn public_key_text_roundtrip() {
        let kp = KeyPair::generate(Algorithm::Ed25519);
        let text = kp.public_key().to_string();
        assert!(text.starts_with("ed25519/"));
        let parsed: PublicKey = text.parse().unwrap();
        assert_eq!(&parsed, kp.public_key());
    }

    #[test]
    fn private_key_roundtrip() {
        for algorithm in [Algorithm::Ed25519, Algorithm::Secp256r1] {
            let kp = KeyPair::generate(algorithm);
            let bytes = kp.private_key().to_bytes();
            let restored = PrivateKey::from_bytes(&bytes, algorithm).unwrap();
            assert_eq!(restored.public(), *kp.public_key());
        }
    }

    #[test]
    fn invalid_key_size_rejected() {
        assert!(PublicKey::from_bytes(&[0u8; 31], Algorithm::Ed25519).is_err());
        assert!(PublicKey::from_bytes(&[0u8; 32], Algorithm::Secp256r1).is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            #[test]
            fn sign_verify_roundtrip(
                seed in any::<[u8; 32]>(),
                message in proptest::collection::vec(any::<u8>(), 0..64),
            ) {
                let mut rng = rand::rngs::StdRng::from_seed(seed);
                for algorithm in [Algorithm::Ed25519, Algorithm::Secp256r1] {
                    let kp = KeyPair::generate_with_rng(algorithm, &mut rng);
                    let signature = kp.sign(&message);
                    prop_assert!(kp.public_key().verify(&message, &signature).is_ok());
                }
            }
        }
    }
}
