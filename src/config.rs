//! AIR Trust configuration management

use crate::consent::{ApprovalScope, ConsentPolicy, RiskTier};
use crate::error::{Error, Result};
use crate::patterns::{
    default_injection_patterns, default_vault_patterns, InjectionPattern, PatternLibrary,
    Sensitivity, VaultPattern,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default environment variable holding the ledger signing key
pub const DEFAULT_SIGNING_KEY_ENV: &str = "AIR_TRUST_SIGNING_KEY";

fn default_true() -> bool {
    true
}

/// Main AIR Trust configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirTrustConfig {
    /// Master switch; when false every action passes through untouched
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Audit ledger configuration
    #[serde(default)]
    pub audit_ledger: AuditLedgerConfig,

    /// Data vault configuration
    #[serde(default)]
    pub vault: VaultConfig,

    /// Consent gate configuration
    #[serde(default)]
    pub consent_gate: ConsentGateConfig,

    /// Injection detection configuration
    #[serde(default)]
    pub injection_detection: InjectionDetectionConfig,
}

impl Default for AirTrustConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            audit_ledger: AuditLedgerConfig::default(),
            vault: VaultConfig::default(),
            consent_gate: ConsentGateConfig::default(),
            injection_detection: InjectionDetectionConfig::default(),
        }
    }
}

impl AirTrustConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.audit_ledger.validate()?;
        self.injection_detection.validate()?;

        let mut injection = self.injection_detection.patterns.clone();
        injection.extend(self.injection_detection.custom_patterns.iter().cloned());
        PatternLibrary {
            vault: self.vault.patterns.clone(),
            injection,
        }
        .validate()
    }
}

/// Audit ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditLedgerConfig {
    pub enabled: bool,

    /// Capacity bound; appends past it fail with `LedgerFull`
    pub max_entries: Option<usize>,

    /// Environment variable holding the HMAC signing key.
    /// Engine construction fails when it is unset.
    pub signing_key_env: String,

    /// Characters of tool/model payload kept in ledger previews
    pub preview_chars: usize,
}

impl Default for AuditLedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: None,
            signing_key_env: DEFAULT_SIGNING_KEY_ENV.to_string(),
            preview_chars: 256,
        }
    }
}

impl AuditLedgerConfig {
    fn validate(&self) -> Result<()> {
        if self.max_entries == Some(0) {
            return Err(Error::Config(
                "audit_ledger.max_entries must be greater than zero".to_string(),
            ));
        }
        if self.signing_key_env.trim().is_empty() {
            return Err(Error::Config(
                "audit_ledger.signing_key_env must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Data vault configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub enabled: bool,

    /// Detection rules in priority order
    pub patterns: Vec<VaultPattern>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: default_vault_patterns(),
        }
    }
}

/// Consent gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentGateConfig {
    pub enabled: bool,

    /// Which tiers require an approval
    pub policy: ConsentPolicy,

    /// Tools that always require an explicit approval, whatever their tier
    pub always_require: Vec<String>,

    /// Whether approvals without a run apply to every run
    pub approval_scope: ApprovalScope,

    /// Tier for tools missing from the registry
    pub default_tier: RiskTier,

    /// Tool name to risk tier, merged over the built-in registry
    pub registry: HashMap<String, RiskTier>,
}

impl Default for ConsentGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: ConsentPolicy::default(),
            always_require: Vec::new(),
            approval_scope: ApprovalScope::default(),
            default_tier: RiskTier::Medium,
            registry: HashMap::new(),
        }
    }
}

/// Injection detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionDetectionConfig {
    pub enabled: bool,

    pub sensitivity: Sensitivity,

    /// Scores at or above this block the call
    pub block_threshold: f64,

    /// Scores at or above this (and below block) are flagged
    pub flag_threshold: f64,

    /// Base injection rules
    pub patterns: Vec<InjectionPattern>,

    /// Extra rules appended after the base set
    pub custom_patterns: Vec<InjectionPattern>,

    /// Names of base rules to switch off
    pub disabled_patterns: Vec<String>,

    /// Decode base64 runs and scan the decoded text
    pub detect_encoded: bool,
}

impl Default for InjectionDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitivity: Sensitivity::Medium,
            block_threshold: 0.8,
            flag_threshold: 0.4,
            patterns: default_injection_patterns(),
            custom_patterns: Vec::new(),
            disabled_patterns: Vec::new(),
            detect_encoded: true,
        }
    }
}

impl InjectionDetectionConfig {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("block_threshold", self.block_threshold),
            ("flag_threshold", self.flag_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "injection_detection.{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.flag_threshold > self.block_threshold {
            return Err(Error::Config(
                "injection_detection.flag_threshold must not exceed block_threshold".to_string(),
            ));
        }
        Ok(())
    }
}
