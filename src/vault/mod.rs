//! Data vault
//!
//! Replaces secrets and PII with opaque reversible tokens before text reaches
//! a tool or model, and restores them on demand.
//!
//! ## Flow
//!
//! ```text
//! "key sk-abc..."  → tokenize   → "key [[AIR:9f2c...]]"   (original kept in vault)
//! "[[AIR:9f2c...]]" → detokenize → "sk-abc..."
//! ```
//!
//! Storage is addressable only by token. Deduplication of repeated values
//! uses a salted fingerprint, never the raw value.

mod store;
mod token;

pub use store::{DataVault, TokenizeResult, VaultStats};
pub use token::{VaultToken, TOKEN_PATTERN, TOKEN_PREFIX, TOKEN_SUFFIX};
