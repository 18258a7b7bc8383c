//! Release signature verification.
//!
//! Candidate binaries are authenticated with ECDSA over NIST P-384: the
//! detached signature is taken over the SHA-256 checksum of the exact
//! candidate bytes, DER-encoded, and hex-armored for transport. The pinned
//! public key travels as PEM (SPKI) text.

use super::UpdateError;
use p384::ecdsa::signature::hazmat::PrehashVerifier;
use p384::ecdsa::{Signature, VerifyingKey};
use p384::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};
use tracing::debug;

/// SHA-256 checksum length in bytes.
pub const CHECKSUM_SIZE: usize = 32;

/// Decode a hex-armored, DER-encoded ECDSA signature.
///
/// Transport-level decoding is deliberately distinct from cryptographic
/// verification: a signature that cannot even be decoded never reaches the
/// verifier.
///
/// # Errors
///
/// Returns [`UpdateError::SignatureEncoding`] if the value is empty, not
/// valid hex, or not a well-formed DER ECDSA signature.
pub fn decode_signature(signature_hex: &str) -> Result<Signature, UpdateError> {
    let trimmed = signature_hex.trim();
    if trimmed.is_empty() {
        return Err(UpdateError::SignatureEncoding(
            "no signature configured".to_string(),
        ));
    }

    let raw = hex::decode(trimmed)
        .map_err(|e| UpdateError::SignatureEncoding(format!("invalid hex: {e}")))?;

    Signature::from_der(&raw)
        .map_err(|e| UpdateError::SignatureEncoding(format!("malformed DER signature: {e}")))
}

/// Parse a PEM-encoded ECDSA P-384 public key.
///
/// An empty or malformed key is a hard failure of the update; verification
/// never trivially passes for lack of a key.
///
/// # Errors
///
/// Returns [`UpdateError::PublicKey`] if the value is empty, not PEM, or not
/// a P-384 key.
pub fn parse_public_key(public_key_pem: &str) -> Result<VerifyingKey, UpdateError> {
    let trimmed = public_key_pem.trim();
    if trimmed.is_empty() {
        return Err(UpdateError::PublicKey(
            "no public key configured".to_string(),
        ));
    }

    VerifyingKey::from_public_key_pem(trimmed).map_err(|e| UpdateError::PublicKey(e.to_string()))
}

/// Verify a candidate binary against a detached signature.
///
/// Computes the SHA-256 checksum of the exact candidate byte sequence and
/// verifies the ECDSA signature over that checksum. Returns the checksum on
/// success so callers can report what was installed.
///
/// Verification is a pure function of its inputs; repeating it yields the
/// same result.
///
/// # Errors
///
/// Returns [`UpdateError::Verification`] if the signature does not match the
/// content under the given key.
pub fn verify_candidate(
    public_key: &VerifyingKey,
    signature: &Signature,
    candidate: &[u8],
) -> Result<[u8; CHECKSUM_SIZE], UpdateError> {
    let checksum: [u8; CHECKSUM_SIZE] = Sha256::digest(candidate).into();

    public_key
        .verify_prehash(&checksum, signature)
        .map_err(|_| UpdateError::Verification)?;

    debug!(
        "candidate verified ({} bytes, sha256 {})",
        candidate.len(),
        hex::encode(checksum)
    );
    Ok(checksum)
}
