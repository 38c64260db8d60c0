//! AIR Trust error types

use crate::consent::RiskTier;
use thiserror::Error;

/// AIR Trust error type
#[derive(Error, Debug)]
pub enum Error {
    /// The consent gate denied a tool call
    #[error("Consent denied for tool '{tool_name}' (tier: {tier}): {reason}")]
    ConsentDenied {
        tool_name: String,
        tier: RiskTier,
        reason: String,
    },

    /// The injection detector blocked a model call
    #[error("Injection blocked (score: {score:.2}, patterns: [{}])", patterns.join(", "))]
    InjectionBlocked { score: f64, patterns: Vec<String> },

    /// The audit ledger reached its configured capacity
    #[error("Audit ledger is full ({max_entries} entries); export and rotate before appending")]
    LedgerFull { max_entries: usize },

    /// A vault token resolved to no stored original
    #[error("Vault integrity error: token {0} has no stored value")]
    VaultIntegrity(String),

    /// An exported ledger record could not be read back
    #[error("Invalid ledger record: {0}")]
    InvalidRecord(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error halts only the action being evaluated
    /// (as opposed to the ledger or the engine itself).
    pub fn is_action_scoped(&self) -> bool {
        matches!(
            self,
            Error::ConsentDenied { .. } | Error::InjectionBlocked { .. }
        )
    }
}

/// Result type alias for AIR Trust operations
pub type Result<T> = std::result::Result<T, Error>;
