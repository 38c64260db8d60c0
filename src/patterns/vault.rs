//! Secret and PII signatures used by the data vault

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Name of the capture group that narrows a match to just the secret value.
///
/// Patterns such as `password=<value>` capture the value so the keyword stays
/// readable after tokenization.
pub const VALUE_GROUP: &str = "value";

/// Category of sensitive data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    /// Provider API keys and access tokens
    ApiKey,
    /// Passwords, bearer tokens, private keys
    Credential,
    /// Payment card numbers
    Financial,
    /// Personally identifiable information
    Pii,
}

impl DataCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::Credential => "credential",
            Self::Financial => "financial",
            Self::Pii => "pii",
        }
    }
}

impl std::fmt::Display for DataCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "api_key" => Ok(Self::ApiKey),
            "credential" => Ok(Self::Credential),
            "financial" => Ok(Self::Financial),
            "pii" => Ok(Self::Pii),
            other => Err(format!("unknown data category: {}", other)),
        }
    }
}

/// A vault detection rule as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultPattern {
    /// Rule name
    pub name: String,
    /// Category assigned to values matched by this rule
    pub category: DataCategory,
    /// Regular expression; an optional `(?P<value>...)` group narrows the span
    pub pattern: String,
    /// Disabled rules are skipped entirely
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl VaultPattern {
    pub fn new(name: &str, category: DataCategory, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            category,
            pattern: pattern.to_string(),
            enabled: true,
        }
    }
}

/// A compiled vault rule
#[derive(Debug, Clone)]
pub struct CompiledVaultPattern {
    pub name: String,
    pub category: DataCategory,
    pub regex: Regex,
    /// Position in the configured list; lower wins overlaps
    pub priority: usize,
}

impl CompiledVaultPattern {
    /// All `(start, end)` spans this rule matches in `text`.
    pub fn find_spans(&self, text: &str) -> Vec<(usize, usize)> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| {
                caps.name(VALUE_GROUP)
                    .or_else(|| caps.get(0))
                    .map(|m| (m.start(), m.end()))
            })
            .filter(|(start, end)| end > start)
            .collect()
    }
}

/// Compile the enabled rules, preserving list order as priority.
pub fn compile_vault_patterns(patterns: &[VaultPattern]) -> Result<Vec<CompiledVaultPattern>> {
    patterns
        .iter()
        .enumerate()
        .filter(|(_, p)| p.enabled)
        .map(|(priority, p)| {
            let regex = Regex::new(&p.pattern).map_err(|e| {
                Error::Config(format!(
                    "Invalid regex pattern for vault rule '{}': {}",
                    p.name, e
                ))
            })?;
            Ok(CompiledVaultPattern {
                name: p.name.clone(),
                category: p.category,
                regex,
                priority,
            })
        })
        .collect()
}

/// Built-in vault rules in priority order.
///
/// Specific provider key formats come first so they win over the generic
/// `password=`-style assignment rule when both cover the same value.
pub fn default_vault_patterns() -> Vec<VaultPattern> {
    use DataCategory::*;
    vec![
        VaultPattern::new("openai_api_key", ApiKey, r"\bsk-(?:proj-|ant-)?[A-Za-z0-9_-]{16,}"),
        VaultPattern::new("aws_access_key", ApiKey, r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b"),
        VaultPattern::new(
            "github_token",
            ApiKey,
            r"\b(?:gh[pousr]_[A-Za-z0-9]{36,}|github_pat_[A-Za-z0-9_]{22,})\b",
        ),
        VaultPattern::new("slack_token", ApiKey, r"\bxox[abprs]-[A-Za-z0-9-]{10,}"),
        VaultPattern::new("stripe_key", ApiKey, r"\b(?:sk|pk|rk)_(?:live|test)_[A-Za-z0-9]{16,}\b"),
        VaultPattern::new(
            "private_key_block",
            Credential,
            r"-----BEGIN (?:[A-Z]+ )?PRIVATE KEY-----[\s\S]*?-----END (?:[A-Z]+ )?PRIVATE KEY-----",
        ),
        VaultPattern::new(
            "bearer_token",
            Credential,
            r"(?i)\bbearer\s+(?P<value>[A-Za-z0-9\-._~+/]{20,}=*)",
        ),
        VaultPattern::new(
            "secret_assignment",
            Credential,
            r#"(?i)\b(?:password|passwd|pwd|secret|client[_-]?secret|api[_-]?key|access[_-]?token|auth[_-]?token)["']?\s*[:=]\s*["']?(?P<value>[^\s"',;}]{6,})"#,
        ),
        VaultPattern::new("credit_card", Financial, r"\b(?:\d{4}[ -]?){3}\d{4}\b"),
        VaultPattern::new("ssn", Pii, r"\b\d{3}-\d{2}-\d{4}\b"),
        VaultPattern::new(
            "email",
            Pii,
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        ),
        VaultPattern::new(
            "phone",
            Pii,
            r"(?:\+1[-. ]?)?\(?\b\d{3}\)?[-. ]\d{3}[-. ]\d{4}\b",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled() -> Vec<CompiledVaultPattern> {
        compile_vault_patterns(&default_vault_patterns()).unwrap()
    }

    fn find<'a>(rules: &'a [CompiledVaultPattern], name: &str) -> &'a CompiledVaultPattern {
        rules.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_defaults_compile() {
        let rules = compiled();
        assert_eq!(rules.len(), default_vault_patterns().len());
        assert!(rules.windows(2).all(|w| w[0].priority < w[1].priority));
    }

    #[test]
    fn test_openai_key() {
        let rules = compiled();
        let text = "my key is sk-abc123def456ghi789jkl012mno ok";
        let spans = find(&rules, "openai_api_key").find_spans(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(&text[spans[0].0..spans[0].1], "sk-abc123def456ghi789jkl012mno");
    }

    #[test]
    fn test_value_group_narrows_span() {
        let rules = compiled();
        let text = "login with password=hunter2222 please";
        let spans = find(&rules, "secret_assignment").find_spans(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(&text[spans[0].0..spans[0].1], "hunter2222");
    }

    #[test]
    fn test_secret_assignment_in_json() {
        let rules = compiled();
        let text = r#"{"password": "correct-horse"}"#;
        let spans = find(&rules, "secret_assignment").find_spans(text);
        assert_eq!(&text[spans[0].0..spans[0].1], "correct-horse");
    }

    #[test]
    fn test_pii_rules() {
        let rules = compiled();
        assert_eq!(find(&rules, "ssn").find_spans("SSN 123-45-6789").len(), 1);
        assert_eq!(find(&rules, "email").find_spans("mail test@example.com now").len(), 1);
        assert_eq!(find(&rules, "phone").find_spans("call 555-123-4567").len(), 1);
        assert_eq!(
            find(&rules, "credit_card").find_spans("card 4111-1111-1111-1111").len(),
            1
        );
    }

    #[test]
    fn test_disabled_pattern_skipped() {
        let mut patterns = default_vault_patterns();
        patterns[0].enabled = false;
        let rules = compile_vault_patterns(&patterns).unwrap();
        assert!(rules.iter().all(|r| r.name != "openai_api_key"));
        // Priority still reflects the configured position
        assert_eq!(rules[0].priority, 1);
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let patterns = vec![VaultPattern::new("broken", DataCategory::Pii, "(unclosed")];
        let err = compile_vault_patterns(&patterns).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_category_parse_display() {
        for cat in [
            DataCategory::ApiKey,
            DataCategory::Credential,
            DataCategory::Financial,
            DataCategory::Pii,
        ] {
            assert_eq!(cat.to_string().parse::<DataCategory>().unwrap(), cat);
        }
        assert!("nope".parse::<DataCategory>().is_err());
    }
}
