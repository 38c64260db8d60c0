//! Prompt injection detection
//!
//! The detector runs on raw model input, before the data vault rewrites it:
//! scanning tokenized text could hide an injection payload that sat inside a
//! span the vault replaced.
//!
//! ```text
//! raw input → InjectionDetector::scan → pass / flag / block
//!                                  ↓ (pass, flag)
//!                          DataVault::tokenize → model
//! ```

mod detector;

pub use detector::{
    combine_weights, InjectionDetector, InjectionMatch, ScanResult, Verdict, ENCODED_PAYLOAD,
};
