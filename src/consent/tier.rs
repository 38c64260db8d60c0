//! Risk tiers and the tool registry

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordered classification of a tool's potential harm
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// All tiers in ascending order
    pub const ALL: [RiskTier; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown risk tier: {}", other)),
        }
    }
}

/// Built-in tool classifications
fn builtin_tiers() -> HashMap<String, RiskTier> {
    [
        ("exec", RiskTier::Critical),
        ("shell", RiskTier::Critical),
        ("run_command", RiskTier::Critical),
        ("execute_code", RiskTier::Critical),
        ("delete_file", RiskTier::High),
        ("write_file", RiskTier::High),
        ("deploy", RiskTier::High),
        ("http_request", RiskTier::Medium),
        ("send_email", RiskTier::Medium),
        ("send_message", RiskTier::Medium),
        ("read_file", RiskTier::Low),
        ("list_files", RiskTier::Low),
        ("search", RiskTier::Low),
        ("web_search", RiskTier::Low),
    ]
    .into_iter()
    .map(|(name, tier)| (name.to_string(), tier))
    .collect()
}

/// Exact-name mapping from tool to tier
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tiers: HashMap<String, RiskTier>,
    default_tier: RiskTier,
}

impl ToolRegistry {
    /// Registry with built-in classifications
    pub fn new(default_tier: RiskTier) -> Self {
        Self {
            tiers: builtin_tiers(),
            default_tier,
        }
    }

    /// Registry with no classifications at all
    pub fn empty(default_tier: RiskTier) -> Self {
        Self {
            tiers: HashMap::new(),
            default_tier,
        }
    }

    /// Add or replace a tool's tier
    pub fn register(&mut self, tool_name: impl Into<String>, tier: RiskTier) {
        self.tiers.insert(tool_name.into(), tier);
    }

    /// Look up a tool, falling back to the default tier
    pub fn classify(&self, tool_name: &str) -> RiskTier {
        self.tiers
            .get(tool_name)
            .copied()
            .unwrap_or(self.default_tier)
    }

    /// Whether a tool has an explicit classification
    pub fn is_registered(&self, tool_name: &str) -> bool {
        self.tiers.contains_key(tool_name)
    }

    pub fn default_tier(&self) -> RiskTier {
        self.default_tier
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(RiskTier::Medium)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::Medium < RiskTier::High);
        assert!(RiskTier::High < RiskTier::Critical);
        let mut sorted = RiskTier::ALL;
        sorted.sort();
        assert_eq!(sorted, RiskTier::ALL);
    }

    #[test]
    fn test_tier_display_and_parse() {
        for tier in RiskTier::ALL {
            assert_eq!(tier.to_string().parse::<RiskTier>().unwrap(), tier);
        }
        assert!("severe".parse::<RiskTier>().is_err());
        assert_eq!(serde_json::to_string(&RiskTier::Critical).unwrap(), "\"critical\"");
    }

    #[test]
    fn test_builtin_classification() {
        let registry = ToolRegistry::default();
        assert_eq!(registry.classify("exec"), RiskTier::Critical);
        assert_eq!(registry.classify("write_file"), RiskTier::High);
        assert_eq!(registry.classify("send_email"), RiskTier::Medium);
        assert_eq!(registry.classify("read_file"), RiskTier::Low);
    }

    #[test]
    fn test_exact_match_only() {
        let registry = ToolRegistry::new(RiskTier::Low);
        assert_eq!(registry.classify("exec_safe"), RiskTier::Low);
        assert_eq!(registry.classify("EXEC"), RiskTier::Low);
        assert!(!registry.is_registered("exec_safe"));
    }

    #[test]
    fn test_register_overrides() {
        let mut registry = ToolRegistry::empty(RiskTier::Medium);
        assert_eq!(registry.classify("read_file"), RiskTier::Medium);
        registry.register("read_file", RiskTier::High);
        assert_eq!(registry.classify("read_file"), RiskTier::High);
    }
}
