//! Warrant - offline-attenuable bearer tokens with Datalog-based
//! authorization.
//!
//! A warrant is a cryptographically chained sequence of blocks, each
//! carrying a fragment of a Datalog program (facts, rules, checks).
//! Whoever holds an open token can append blocks that only *narrow* its
//! authority, without contacting the issuer; the verifier combines
//! every block's program with its own and lets allow/deny policies
//! decide.
//!
//! # Overview
//!
//! - Blocks are signed with per-block ephemeral keypairs (Ed25519 or
//!   ECDSA secp256r1); the chain ends in either the next secret (open)
//!   or a terminal sealing signature (sealed).
//! - Third parties can co-sign blocks, and programs can require that
//!   co-signature with `trusting ed25519/..` scopes.
//! - Every string is interned into per-token symbol tables, making the
//!   signed bytes deterministic and compact.
//!
//! # Example
//!
//! ```rust,ignore
//! use warrant::{Algorithm, Authorizer, BlockBuilder, KeyPair, Warrant};
//!
//! let root = KeyPair::generate(Algorithm::Ed25519);
//!
//! let mut authority = BlockBuilder::new();
//! authority.add_code(r#"user(1234); check if operation("read");"#)?;
//! let token = Warrant::new(&root, authority)?;
//!
//! // The holder narrows the token offline.
//! let mut narrowed = BlockBuilder::new();
//! narrowed.add_code(r#"check if resource("file1");"#)?;
//! let token = token.attenuate(narrowed)?;
//!
//! // The verifier decides.
//! let token = Warrant::from_base64(&token.to_base64(), root.public_key())?;
//! let mut authorizer = Authorizer::new();
//! authorizer.add_code(
//!     r#"operation("read"); resource("file1"); allow if user(1234);"#,
//! )?;
//! token.authorize(&authorizer)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_panics_doc)]

pub mod builder;
pub mod crypto;
pub mod datalog;
pub mod error;
pub mod format;
pub mod parser;
pub mod token;

pub use builder::BlockBuilder;
pub use crypto::{Algorithm, KeyPair, PrivateKey, PublicKey, Signature};
pub use datalog::ExecutionLimits;
pub use error::{Error, Result};
pub use token::{
    Authorization, Authorizer, RootKeyProvider, RootKeyResolver, ThirdPartyBlock,
    ThirdPartyRequest, UnverifiedWarrant, Warrant,
};
