//! Prompt injection defense
//!
//! Scores input against weighted injection patterns before it is forwarded
//! to a model. Each matching pattern contributes its weight once; weights are
//! combined as `1 - Π(1 - w)`, which stays in `[0, 1]`, does not depend on
//! match order, and never decreases when another pattern matches.

use crate::config::InjectionDetectionConfig;
use crate::error::{Error, Result};
use crate::patterns::{
    compile_injection_patterns, CompiledInjectionPattern, InjectionCategory, InjectionPattern,
    Sensitivity,
};
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Name reported for base64-encoded payload matches
pub const ENCODED_PAYLOAD: &str = "encoded_payload";

/// Weight of an encoded payload match before sensitivity scaling
const ENCODED_PAYLOAD_WEIGHT: f64 = 0.9;

/// Minimum run of base64 alphabet considered a candidate payload
const BASE64_RUN: &str = r"[A-Za-z0-9+/]{20,}={0,2}";

/// Outcome of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Input appears clean
    Pass,
    /// Suspicious (warn but allow)
    Flag,
    /// Injection detected (block)
    Block,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Flag => write!(f, "flag"),
            Self::Block => write!(f, "block"),
        }
    }
}

/// A matched injection pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionMatch {
    pub pattern_name: String,
    pub category: InjectionCategory,
    /// Effective weight after sensitivity scaling
    pub weight: f64,
    /// Byte span of the first occurrence
    pub span: (usize, usize),
}

/// Result of scanning input for injection patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Combined score in `[0, 1]`
    pub score: f64,
    /// Matched patterns, in pattern order
    pub matched: Vec<InjectionMatch>,
    pub verdict: Verdict,
}

impl ScanResult {
    /// Whether anything matched at all
    pub fn detected(&self) -> bool {
        !self.matched.is_empty()
    }

    pub fn blocked(&self) -> bool {
        self.verdict == Verdict::Block
    }

    /// Names of matched patterns
    pub fn pattern_names(&self) -> Vec<String> {
        self.matched.iter().map(|m| m.pattern_name.clone()).collect()
    }

    /// Score in integer basis points, as recorded in the ledger
    pub fn score_bps(&self) -> u32 {
        (self.score * 10_000.0).round() as u32
    }
}

/// Combine weights into a saturating score
pub fn combine_weights(weights: impl IntoIterator<Item = f64>) -> f64 {
    let miss: f64 = weights
        .into_iter()
        .map(|w| 1.0 - w.clamp(0.0, 1.0))
        .product();
    (1.0 - miss).clamp(0.0, 1.0)
}

/// Prompt injection detector.
///
/// Enabled patterns, weights and thresholds are fixed at construction.
#[derive(Debug)]
pub struct InjectionDetector {
    patterns: Vec<CompiledInjectionPattern>,
    sensitivity: Sensitivity,
    block_threshold: f64,
    flag_threshold: f64,
    /// Present when encoded payload detection is enabled
    base64_re: Option<Regex>,
    encoded_weight: f64,
}

impl InjectionDetector {
    /// Create a detector from configuration
    pub fn new(config: &InjectionDetectionConfig) -> Result<Self> {
        let mut patterns: Vec<InjectionPattern> = config
            .patterns
            .iter()
            .filter(|p| !config.disabled_patterns.contains(&p.name))
            .cloned()
            .collect();
        patterns.extend(config.custom_patterns.iter().cloned());

        Self::with_patterns(
            &patterns,
            config.sensitivity,
            config.block_threshold,
            config.flag_threshold,
            config.detect_encoded,
        )
    }

    /// Create a detector from an explicit rule list
    pub fn with_patterns(
        patterns: &[InjectionPattern],
        sensitivity: Sensitivity,
        block_threshold: f64,
        flag_threshold: f64,
        detect_encoded: bool,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&block_threshold) || !(0.0..=1.0).contains(&flag_threshold) {
            return Err(Error::Config(
                "injection thresholds must be within [0, 1]".to_string(),
            ));
        }
        if flag_threshold > block_threshold {
            return Err(Error::Config(format!(
                "flag_threshold {} exceeds block_threshold {}",
                flag_threshold, block_threshold
            )));
        }

        let compiled = compile_injection_patterns(patterns, sensitivity)?;

        let base64_re = if detect_encoded && sensitivity >= Sensitivity::Medium {
            Some(
                Regex::new(BASE64_RUN)
                    .map_err(|e| Error::Config(format!("Invalid base64 pattern: {}", e)))?,
            )
        } else {
            None
        };

        Ok(Self {
            patterns: compiled,
            sensitivity,
            block_threshold,
            flag_threshold,
            base64_re,
            encoded_weight: (ENCODED_PAYLOAD_WEIGHT * sensitivity.weight_scale()).min(1.0),
        })
    }

    pub fn sensitivity(&self) -> Sensitivity {
        self.sensitivity
    }

    pub fn block_threshold(&self) -> f64 {
        self.block_threshold
    }

    pub fn flag_threshold(&self) -> f64 {
        self.flag_threshold
    }

    /// Number of enabled patterns (not counting encoded payload detection)
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Scan input for injection patterns.
    pub fn scan(&self, text: &str) -> ScanResult {
        let mut matched: Vec<InjectionMatch> = self
            .patterns
            .iter()
            .filter_map(|p| {
                p.regex.find(text).map(|m| InjectionMatch {
                    pattern_name: p.name.clone(),
                    category: p.category,
                    weight: p.weight,
                    span: (m.start(), m.end()),
                })
            })
            .collect();

        if let Some(m) = self.check_encoded_payloads(text) {
            matched.push(m);
        }

        let score = combine_weights(matched.iter().map(|m| m.weight));
        let verdict = self.verdict_for(score);

        match verdict {
            Verdict::Block => tracing::warn!(
                score = score,
                pattern_count = matched.len(),
                "Prompt injection blocked"
            ),
            Verdict::Flag => tracing::info!(
                score = score,
                pattern_count = matched.len(),
                "Suspicious prompt patterns detected"
            ),
            Verdict::Pass => {}
        }

        ScanResult {
            score,
            matched,
            verdict,
        }
    }

    fn verdict_for(&self, score: f64) -> Verdict {
        if score >= self.block_threshold {
            Verdict::Block
        } else if score >= self.flag_threshold {
            Verdict::Flag
        } else {
            Verdict::Pass
        }
    }

    /// Check for base64-encoded injection payloads.
    ///
    /// Reports the first base64 run whose decoded text matches any enabled
    /// pattern.
    fn check_encoded_payloads(&self, text: &str) -> Option<InjectionMatch> {
        let base64_re = self.base64_re.as_ref()?;

        for m in base64_re.find_iter(text) {
            let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(m.as_str()) else {
                continue;
            };
            let Ok(decoded) = String::from_utf8(decoded) else {
                continue;
            };
            if self.patterns.iter().any(|p| p.regex.is_match(&decoded)) {
                return Some(InjectionMatch {
                    pattern_name: ENCODED_PAYLOAD.to_string(),
                    category: InjectionCategory::EncodingTrick,
                    weight: self.encoded_weight,
                    span: (m.start(), m.end()),
                });
            }
        }

        None
    }
}
