//! Pattern library
//!
//! Named detection rules shared by the data vault (secret and PII
//! signatures) and the injection detector (weighted injection signatures).
//! Rules are plain configuration data; each consumer compiles the subset it
//! needs once at construction and never mutates it afterwards.

mod injection;
mod vault;

pub use injection::{
    compile_injection_patterns, default_injection_patterns, CompiledInjectionPattern,
    InjectionCategory, InjectionPattern, Sensitivity,
};
pub use vault::{
    compile_vault_patterns, default_vault_patterns, CompiledVaultPattern, DataCategory,
    VaultPattern, VALUE_GROUP,
};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The full set of detection rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternLibrary {
    /// Vault rules, in priority order
    pub vault: Vec<VaultPattern>,
    /// Injection rules
    pub injection: Vec<InjectionPattern>,
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self {
            vault: default_vault_patterns(),
            injection: default_injection_patterns(),
        }
    }
}

impl PatternLibrary {
    /// Check names are present and unique, and that every regex compiles.
    pub fn validate(&self) -> Result<()> {
        check_names(self.vault.iter().map(|p| p.name.as_str()), "vault")?;
        check_names(self.injection.iter().map(|p| p.name.as_str()), "injection")?;
        compile_vault_patterns(&self.vault)?;
        compile_injection_patterns(&self.injection, Sensitivity::High)?;
        Ok(())
    }
}

fn check_names<'a>(names: impl Iterator<Item = &'a str>, kind: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(Error::Config(format!("{} rule with empty name", kind)));
        }
        if !seen.insert(name) {
            return Err(Error::Config(format!("duplicate {} rule '{}'", kind, name)));
        }
    }
    Ok(())
}
