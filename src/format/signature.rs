//! Signature input assembly.
//!
//! Every signed byte string is a deterministic concatenation of
//! domain-separation tags and payload fields. Two schemes exist: V1
//! (current, tagged) and V0 (legacy, read-only bare concatenation).
//! Sealing stays on the V0 input so sealed tokens keep signature parity
//! with those produced before V1 existed.

use crate::crypto::{Algorithm, PublicKey};

const BLOCK_TAG: &[u8] = b"\0BLOCK\0";
const EXTERNAL_TAG: &[u8] = b"\0EXTERNAL\0";
const VERSION_TAG: &[u8] = b"\0VERSION\0";
const PAYLOAD_TAG: &[u8] = b"\0PAYLOAD\0";
const ALGORITHM_TAG: &[u8] = b"\0ALGORITHM\0";
const NEXT_KEY_TAG: &[u8] = b"\0NEXTKEY\0";
const PREVIOUS_SIGNATURE_TAG: &[u8] = b"\0PREVSIG\0";
const EXTERNAL_SIGNATURE_TAG: &[u8] = b"\0EXTERNALSIG\0";

/// The V1 signature input version number.
const SIGNATURE_VERSION: u32 = 1;

fn push_tagged(out: &mut Vec<u8>, tag: &[u8], data: &[u8]) {
    out.extend_from_slice(tag);
    out.extend_from_slice(data);
}

/// The V1 block signature input.
///
/// `previous_signature` is absent for the authority block;
/// `external_signature` is present on third-party blocks and binds the
/// co-signature into the chain.
#[must_use]
pub fn block_input_v1(
    payload: &[u8],
    next_key: &PublicKey,
    previous_signature: Option<&[u8]>,
    external_signature: Option<&[u8]>,
) -> Vec<u8> {
    let mut input = Vec::with_capacity(payload.len() + 128);
    input.extend_from_slice(BLOCK_TAG);
    push_tagged(&mut input, VERSION_TAG, &SIGNATURE_VERSION.to_le_bytes());
    push_tagged(&mut input, PAYLOAD_TAG, payload);
    push_tagged(
        &mut input,
        ALGORITHM_TAG,
        &next_key.algorithm().id().to_le_bytes(),
    );
    push_tagged(&mut input, NEXT_KEY_TAG, &next_key.to_bytes());
    if let Some(signature) = previous_signature {
        push_tagged(&mut input, PREVIOUS_SIGNATURE_TAG, signature);
    }
    if let Some(signature) = external_signature {
        push_tagged(&mut input, EXTERNAL_SIGNATURE_TAG, signature);
    }
    input
}

/// The V1 external-signature input: what a third party signs.
///
/// No next-key or algorithm section; the previous signature pins the
/// block's position in the chain.
#[must_use]
pub fn external_input_v1(payload: &[u8], previous_signature: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(payload.len() + 128);
    input.extend_from_slice(EXTERNAL_TAG);
    push_tagged(&mut input, VERSION_TAG, &SIGNATURE_VERSION.to_le_bytes());
    push_tagged(&mut input, PAYLOAD_TAG, payload);
    push_tagged(&mut input, PREVIOUS_SIGNATURE_TAG, previous_signature);
    input
}

/// The V0 block signature input (read-only legacy scheme).
#[must_use]
pub fn block_input_v0(
    payload: &[u8],
    external_signature: Option<&[u8]>,
    next_key: &PublicKey,
) -> Vec<u8> {
    let mut input = Vec::with_capacity(payload.len() + 64);
    input.extend_from_slice(payload);
    if let Some(signature) = external_signature {
        input.extend_from_slice(signature);
    }
    input.extend_from_slice(&algorithm_tag(next_key.algorithm()));
    input.extend_from_slice(&next_key.to_bytes());
    input
}

/// The sealing input: payload, algorithm, next key, block signature.
///
/// Writers stay on this V0-shaped input for parity with existing
/// sealed tokens.
#[must_use]
pub fn seal_input(payload: &[u8], next_key: &PublicKey, block_signature: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(payload.len() + 128);
    input.extend_from_slice(payload);
    input.extend_from_slice(&algorithm_tag(next_key.algorithm()));
    input.extend_from_slice(&next_key.to_bytes());
    input.extend_from_slice(block_signature);
    input
}

fn algorithm_tag(algorithm: Algorithm) -> [u8; 4] {
    algorithm.id().to_le_bytes()
}
