//! Ledger signing key
//!
//! The key is owned by exactly one `AuditLedger`. It is zeroized on drop and
//! never appears in `Debug` output, log lines, or exported records.

use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use ring::hmac;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of generated keys in bytes
pub const GENERATED_KEY_SIZE: usize = 32;

/// Secret key for HMAC-SHA256 entry signatures.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    /// Create a key from raw bytes. An empty key is rejected.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::Config("signing key must not be empty".to_string()));
        }
        Ok(Self(bytes))
    }

    /// Read the key from an environment variable.
    pub fn from_env(var: &str) -> Result<Self> {
        let value = std::env::var(var).map_err(|_| {
            Error::Config(format!("signing key variable {} is not set", var))
        })?;
        Self::new(value.into_bytes())
    }

    /// Generate a random key from the OS RNG.
    pub fn generate() -> Self {
        let mut key = vec![0u8; GENERATED_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    fn hmac_key(&self) -> hmac::Key {
        hmac::Key::new(hmac::HMAC_SHA256, &self.0)
    }

    /// Sign a message, returning the lowercase hex tag.
    pub fn sign(&self, message: &[u8]) -> String {
        let tag = hmac::sign(&self.hmac_key(), message);
        hex::encode(tag.as_ref())
    }

    /// Verify a hex tag in constant time.
    pub fn verify(&self, message: &[u8], signature: &str) -> bool {
        match hex::decode(signature) {
            Ok(tag) => hmac::verify(&self.hmac_key(), message, &tag).is_ok(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey([REDACTED])")
    }
}
