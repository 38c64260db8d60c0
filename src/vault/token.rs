//! Vault token format

use crate::crypto::random_hex;
use crate::patterns::DataCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix shared by every vault token
pub const TOKEN_PREFIX: &str = "[[AIR:";

/// Suffix shared by every vault token
pub const TOKEN_SUFFIX: &str = "]]";

/// Random bytes per token (128 bits)
pub const TOKEN_RANDOM_BYTES: usize = 16;

/// Regex matching any token-shaped substring.
///
/// The body is lowercase hex inside a bracketed word so that no secret or PII
/// signature can match a bare token.
pub const TOKEN_PATTERN: &str = r"\[\[AIR:[0-9a-f]{32}\]\]";

/// Mint a fresh random token
pub(crate) fn mint_token() -> String {
    format!(
        "{}{}{}",
        TOKEN_PREFIX,
        random_hex(TOKEN_RANDOM_BYTES),
        TOKEN_SUFFIX
    )
}

/// A token handed out by the vault.
///
/// The original value is never part of this type; it stays inside the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultToken {
    /// The opaque token string substituted into text
    pub token: String,
    /// Category of the value it stands for
    pub category: DataCategory,
    /// Rule that detected the value
    pub pattern: String,
    /// When the token was minted
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{compile_vault_patterns, default_vault_patterns};
    use regex::Regex;

    #[test]
    fn test_minted_token_shape() {
        let re = Regex::new(&format!("^{}$", TOKEN_PATTERN)).unwrap();
        let token = mint_token();
        assert!(re.is_match(&token), "unexpected token shape: {}", token);
        assert_ne!(token, mint_token());
    }

    #[test]
    fn test_token_matches_no_default_pattern() {
        let rules = compile_vault_patterns(&default_vault_patterns()).unwrap();
        for _ in 0..64 {
            let token = mint_token();
            for rule in &rules {
                assert!(
                    rule.find_spans(&token).is_empty(),
                    "rule {} matched token {}",
                    rule.name,
                    token
                );
            }
        }
    }
}
