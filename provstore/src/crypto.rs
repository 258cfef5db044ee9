//! API key generation and digests.
//!
//! Keys are 40 lowercase hex characters (160 bits of randomness). Only the SHA-256 digest of a
//! key is ever persisted; verification recomputes the digest and compares it in constant time.

use rand::prelude::RngExt;
use rand::rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Number of random bytes behind a key. Each byte renders as two hex characters.
const API_KEY_BYTES: usize = 20;

/// Generates a cryptographically secure API key.
///
/// ```
/// use provstore::crypto::generate_api_key;
///
/// let key = generate_api_key();
/// assert_eq!(key.len(), 40);
/// assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
/// ```
pub fn generate_api_key() -> String {
    let mut key_bytes = [0u8; API_KEY_BYTES];
    rng().fill(&mut key_bytes);

    hex::encode(key_bytes)
}

/// Hex encoded SHA-256 digest of a key, as stored in the `api_keys` table.
pub fn digest_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Checks a presented key against a stored digest without leaking timing information.
pub fn verify_api_key(key: &str, digest: &str) -> bool {
    let candidate = digest_api_key(key);
    // Lengths are public (always 64), so only the contents need a constant-time comparison
    candidate.len() == digest.len() && bool::from(candidate.as_bytes().ct_eq(digest.as_bytes()))
}
