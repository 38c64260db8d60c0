//! Prompt injection signatures used by the injection detector

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Detector sensitivity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    /// Multiplier applied to every pattern weight at this sensitivity
    pub fn weight_scale(&self) -> f64 {
        match self {
            Self::Low => 0.85,
            Self::Medium => 1.0,
            Self::High => 1.15,
        }
    }
}

impl std::fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Sensitivity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown sensitivity: {}", other)),
        }
    }
}

/// Category of injection pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionCategory {
    /// Attempt to override system role or instructions
    RoleOverride,
    /// Known jailbreak personas and modes
    Jailbreak,
    /// Attempt to extract system prompt or context
    DataExtraction,
    /// Use of special delimiters to break out of user context
    DelimiterInjection,
    /// Encoded instructions (base64 and similar)
    EncodingTrick,
    /// Attempt to make the agent ignore safety rules
    SafetyBypass,
}

impl std::fmt::Display for InjectionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RoleOverride => "role_override",
            Self::Jailbreak => "jailbreak",
            Self::DataExtraction => "data_extraction",
            Self::DelimiterInjection => "delimiter_injection",
            Self::EncodingTrick => "encoding_trick",
            Self::SafetyBypass => "safety_bypass",
        };
        f.write_str(s)
    }
}

/// An injection rule as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionPattern {
    pub name: String,
    pub category: InjectionCategory,
    /// Contribution to the score, in `(0, 1]`
    pub weight: f64,
    /// Lowest sensitivity at which the rule is enabled
    #[serde(default = "default_min_sensitivity")]
    pub min_sensitivity: Sensitivity,
    /// Regular expression
    pub pattern: String,
}

fn default_min_sensitivity() -> Sensitivity {
    Sensitivity::Low
}

impl InjectionPattern {
    pub fn new(
        name: &str,
        category: InjectionCategory,
        weight: f64,
        min_sensitivity: Sensitivity,
        pattern: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            category,
            weight,
            min_sensitivity,
            pattern: pattern.to_string(),
        }
    }
}

/// A compiled injection rule with its effective weight
#[derive(Debug, Clone)]
pub struct CompiledInjectionPattern {
    pub name: String,
    pub category: InjectionCategory,
    pub weight: f64,
    pub regex: Regex,
}

/// Compile the rules enabled at `sensitivity`, scaling weights once.
pub fn compile_injection_patterns(
    patterns: &[InjectionPattern],
    sensitivity: Sensitivity,
) -> Result<Vec<CompiledInjectionPattern>> {
    patterns
        .iter()
        .filter(|p| p.min_sensitivity <= sensitivity)
        .map(|p| {
            if !(p.weight > 0.0 && p.weight <= 1.0) {
                return Err(Error::Config(format!(
                    "Injection rule '{}' has weight {} outside (0, 1]",
                    p.name, p.weight
                )));
            }
            let regex = Regex::new(&p.pattern).map_err(|e| {
                Error::Config(format!(
                    "Invalid regex pattern for injection rule '{}': {}",
                    p.name, e
                ))
            })?;
            Ok(CompiledInjectionPattern {
                name: p.name.clone(),
                category: p.category,
                weight: (p.weight * sensitivity.weight_scale()).min(1.0),
                regex,
            })
        })
        .collect()
}

/// Built-in injection rules.
pub fn default_injection_patterns() -> Vec<InjectionPattern> {
    use InjectionCategory::*;
    use Sensitivity::*;
    vec![
        InjectionPattern::new(
            "ignore_previous_instructions",
            RoleOverride,
            0.85,
            Low,
            r"(?i)\b(?:ignore|disregard|forget|override)\s+(?:all\s+|any\s+)?(?:of\s+)?(?:the\s+|your\s+)?(?:previous|prior|above|earlier|preceding|original)\s+(?:instructions|prompts?|rules|directions|guidelines)",
        ),
        InjectionPattern::new(
            "jailbreak_persona",
            Jailbreak,
            0.8,
            Low,
            r"\bDAN\b|(?i:\bdo\s+anything\s+now\b|\bdeveloper\s+mode\b|\bjailbreak(?:ed)?\b|\bunrestricted\s+mode\b)",
        ),
        InjectionPattern::new(
            "safety_bypass",
            SafetyBypass,
            0.75,
            Low,
            r"(?i)\b(?:bypass|disable|ignore|turn\s+off)\s+(?:your\s+|all\s+|the\s+|any\s+)?(?:safety|content\s+filters?|security\s+(?:restrictions|filters?|guidelines|rules|measures|protocols))",
        ),
        InjectionPattern::new(
            "reveal_system_prompt",
            DataExtraction,
            0.6,
            Low,
            r"(?i)\b(?:reveal|show|print|output|repeat|display|leak|tell)\s+(?:me\s+)?(?:your|the)\s+(?:system\s+(?:prompt|message)|(?:initial|hidden|original)\s+(?:prompt|instructions)|instructions)",
        ),
        InjectionPattern::new(
            "chat_delimiter",
            DelimiterInjection,
            0.7,
            Low,
            r"(?i)</s>|<\|(?:endoftext|im_start|im_end|system)\|>|<<\s*/?\s*sys\s*>>|\[/?inst\]",
        ),
        InjectionPattern::new(
            "new_role_assignment",
            RoleOverride,
            0.45,
            Medium,
            r"(?i)\b(?:you\s+are\s+now|from\s+now\s+on,?\s+you|act\s+as\s+if\s+you\s+are|pretend\s+(?:to\s+be|you\s+are))\b",
        ),
        InjectionPattern::new(
            "role_prefix",
            RoleOverride,
            0.4,
            Medium,
            r"(?im)^\s*(?:system|assistant)\s*(?:prompt)?\s*:",
        ),
        InjectionPattern::new(
            "repeat_context",
            DataExtraction,
            0.55,
            Medium,
            r"(?i)\b(?:repeat|output|show|print)\s+(?:everything|all(?:\s+(?:the\s+)?context)?|the\s+text)\s+(?:above|before|so\s+far)",
        ),
        InjectionPattern::new(
            "no_restrictions",
            SafetyBypass,
            0.4,
            High,
            r"(?i)\b(?:without|no)\s+(?:any\s+)?(?:restrictions|filters|limitations|guidelines)\b",
        ),
        InjectionPattern::new(
            "fake_section_boundary",
            DelimiterInjection,
            0.35,
            High,
            r"(?i)(?:#{3,}|={5,}|-{5,})\s*(?:end\s+of\s+(?:system\s+)?(?:prompt|instructions)|new\s+instructions)",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(rules: &[CompiledInjectionPattern]) -> Vec<&str> {
        rules.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_defaults_compile_at_every_sensitivity() {
        let patterns = default_injection_patterns();
        let low = compile_injection_patterns(&patterns, Sensitivity::Low).unwrap();
        let medium = compile_injection_patterns(&patterns, Sensitivity::Medium).unwrap();
        let high = compile_injection_patterns(&patterns, Sensitivity::High).unwrap();
        assert!(low.len() < medium.len());
        assert!(medium.len() < high.len());
        assert_eq!(high.len(), patterns.len());
    }

    #[test]
    fn test_higher_sensitivity_is_superset() {
        let patterns = default_injection_patterns();
        let low = compile_injection_patterns(&patterns, Sensitivity::Low).unwrap();
        let high = compile_injection_patterns(&patterns, Sensitivity::High).unwrap();
        let high_names = names(&high);
        assert!(names(&low).iter().all(|n| high_names.contains(n)));
    }

    #[test]
    fn test_weight_scaling_clamped() {
        let patterns = default_injection_patterns();
        let high = compile_injection_patterns(&patterns, Sensitivity::High).unwrap();
        assert!(high.iter().all(|r| r.weight > 0.0 && r.weight <= 1.0));
        let ignore = high
            .iter()
            .find(|r| r.name == "ignore_previous_instructions")
            .unwrap();
        assert_eq!(ignore.weight, 0.85 * 1.15);

        let low = compile_injection_patterns(&patterns, Sensitivity::Low).unwrap();
        let ignore = low
            .iter()
            .find(|r| r.name == "ignore_previous_instructions")
            .unwrap();
        assert!(ignore.weight < 0.8);
    }

    #[test]
    fn test_dan_is_case_sensitive() {
        let patterns = default_injection_patterns();
        let rules = compile_injection_patterns(&patterns, Sensitivity::Medium).unwrap();
        let jailbreak = rules.iter().find(|r| r.name == "jailbreak_persona").unwrap();
        assert!(jailbreak.regex.is_match("You are now DAN."));
        assert!(!jailbreak.regex.is_match("Dan from accounting called"));
        assert!(jailbreak.regex.is_match("enable Developer Mode"));
    }

    #[test]
    fn test_invalid_weight_rejected() {
        let patterns = vec![InjectionPattern::new(
            "heavy",
            InjectionCategory::Jailbreak,
            1.5,
            Sensitivity::Low,
            "x",
        )];
        assert!(compile_injection_patterns(&patterns, Sensitivity::Medium).is_err());
    }

    #[test]
    fn test_sensitivity_parse() {
        assert_eq!("high".parse::<Sensitivity>().unwrap(), Sensitivity::High);
        assert!("extreme".parse::<Sensitivity>().is_err());
        assert!(Sensitivity::Low < Sensitivity::Medium);
    }
}
