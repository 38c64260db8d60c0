//! Cryptographic utilities for the trust layer
//!
//! Provides the ledger signing key, vault token randomness
//! and salted fingerprints for vault deduplication.

mod keys;

pub use keys::SigningKey;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Size of the per-vault fingerprint salt
pub const SALT_SIZE: usize = 32;

/// Fill `len` bytes from the OS RNG and return them as hex
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a random fingerprint salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Salted SHA-256 over length-prefixed parts.
///
/// Length prefixes keep `("ab", "c")` and `("a", "bc")` distinct.
pub fn fingerprint(salt: &[u8], parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}
