//! Token store and text rewriting

use super::token::{mint_token, VaultToken, TOKEN_PATTERN};
use crate::config::VaultConfig;
use crate::crypto::{fingerprint, generate_salt, SALT_SIZE};
use crate::error::{Error, Result};
use crate::patterns::{compile_vault_patterns, CompiledVaultPattern, DataCategory, VaultPattern};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Result of tokenizing a piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeResult {
    /// Text with every detected value replaced by its token
    pub text: String,
    /// Tokens minted by this call (reused tokens are not listed)
    pub created: Vec<VaultToken>,
    /// Number of spans replaced, including reused tokens
    pub replaced: usize,
}

impl TokenizeResult {
    /// Whether any span was replaced
    pub fn tokenized(&self) -> bool {
        self.replaced > 0
    }
}

/// Read-only snapshot of vault contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultStats {
    pub total_tokens: usize,
    pub by_category: BTreeMap<String, usize>,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct VaultRecord {
    original: String,
    #[zeroize(skip)]
    category: DataCategory,
}

#[derive(Default)]
struct VaultState {
    /// token -> record
    records: HashMap<String, VaultRecord>,
    /// salted fingerprint of (category, value) -> token
    fingerprints: HashMap<String, String>,
}

/// A candidate span before overlap resolution
#[derive(Debug, Clone)]
struct Candidate {
    rule: usize,
    start: usize,
    end: usize,
}

impl Candidate {
    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }

    fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Reversible tokenization vault for secrets and PII.
///
/// Overlap policy: across categories, the rule appearing earlier in the
/// configured list wins; within one category the longest match wins. Spans
/// touching an existing token are never rewritten. Resolution is repeated on
/// the rewritten text until no rule matches outside a token, so the output of
/// [`DataVault::tokenize`] is a fixed point.
pub struct DataVault {
    rules: Vec<CompiledVaultPattern>,
    token_re: Regex,
    salt: [u8; SALT_SIZE],
    state: RwLock<VaultState>,
}

impl DataVault {
    /// Create a vault from configuration
    pub fn new(config: &VaultConfig) -> Result<Self> {
        Self::with_patterns(&config.patterns)
    }

    /// Create a vault from an explicit rule list
    pub fn with_patterns(patterns: &[VaultPattern]) -> Result<Self> {
        let rules = compile_vault_patterns(patterns)?;
        let token_re = Regex::new(TOKEN_PATTERN)
            .map_err(|e| Error::Config(format!("Invalid token pattern: {}", e)))?;

        Ok(Self {
            rules,
            token_re,
            salt: generate_salt(),
            state: RwLock::new(VaultState::default()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, VaultState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, VaultState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace every detected value in `text` with a token.
    pub fn tokenize(&self, text: &str) -> TokenizeResult {
        if text.is_empty() {
            return TokenizeResult {
                text: String::new(),
                created: Vec::new(),
                replaced: 0,
            };
        }

        let mut output = text.to_string();
        let mut created = Vec::new();
        let mut replaced = 0;

        // A match that lost an overlap can leave a shorter match behind once
        // the winner is a token; keep going until nothing outside a token matches.
        loop {
            let spans = self.resolve_spans(&output);
            if spans.is_empty() {
                break;
            }
            replaced += spans.len();
            output = self.substitute(&output, &spans, &mut created);
        }

        if replaced > 0 {
            tracing::debug!(
                replaced = replaced,
                created = created.len(),
                "Tokenized sensitive values"
            );
        }

        TokenizeResult {
            text: output,
            created,
            replaced,
        }
    }

    /// Replace `spans` (sorted, disjoint) in `text` with their tokens.
    fn substitute(&self, text: &str, spans: &[Candidate], created: &mut Vec<VaultToken>) -> String {
        let mut output = String::with_capacity(text.len());
        let mut cursor = 0;

        let mut state = self.write();
        for cand in spans {
            let rule = &self.rules[cand.rule];
            let value = &text[cand.start..cand.end];
            let token = self.token_for(&mut state, rule, value, created);

            output.push_str(&text[cursor..cand.start]);
            output.push_str(&token);
            cursor = cand.end;
        }
        output.push_str(&text[cursor..]);
        output
    }

    /// Look up or mint the token for `value` under `rule`'s category.
    fn token_for(
        &self,
        state: &mut VaultState,
        rule: &CompiledVaultPattern,
        value: &str,
        created: &mut Vec<VaultToken>,
    ) -> String {
        let fp = fingerprint(
            &self.salt,
            &[rule.category.as_str().as_bytes(), value.as_bytes()],
        );
        if let Some(token) = state.fingerprints.get(&fp) {
            return token.clone();
        }

        let mut token = mint_token();
        while state.records.contains_key(&token) {
            token = mint_token();
        }

        state.records.insert(
            token.clone(),
            VaultRecord {
                original: value.to_string(),
                category: rule.category,
            },
        );
        state.fingerprints.insert(fp, token.clone());
        created.push(VaultToken {
            token: token.clone(),
            category: rule.category,
            pattern: rule.name.clone(),
            created_at: Utc::now(),
        });
        token
    }

    /// Collect candidate spans and resolve overlaps; result is sorted by start.
    fn resolve_spans(&self, text: &str) -> Vec<Candidate> {
        let existing: Vec<(usize, usize)> = self
            .token_re
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect();

        let mut candidates: Vec<Candidate> = self
            .rules
            .iter()
            .enumerate()
            .flat_map(|(rule, compiled)| {
                compiled
                    .find_spans(text)
                    .into_iter()
                    .map(move |(start, end)| Candidate { rule, start, end })
            })
            .filter(|c| !existing.iter().any(|&(s, e)| c.overlaps(s, e)))
            .collect();

        candidates.sort_by_key(|c| (self.rules[c.rule].priority, Reverse(c.len()), c.start));

        // Earlier rules claim spans first. A later candidate only displaces
        // what it overlaps when every overlapped span is a shorter match of the
        // same category.
        let mut accepted: Vec<Candidate> = Vec::new();
        for cand in candidates {
            let overlapped: Vec<usize> = accepted
                .iter()
                .enumerate()
                .filter(|(_, a)| a.overlaps(cand.start, cand.end))
                .map(|(i, _)| i)
                .collect();

            if overlapped.is_empty() {
                accepted.push(cand);
                continue;
            }

            let category = self.rules[cand.rule].category;
            let displaces = overlapped.iter().all(|&i| {
                let held = &accepted[i];
                self.rules[held.rule].category == category && held.len() < cand.len()
            });
            if displaces {
                for &i in overlapped.iter().rev() {
                    accepted.remove(i);
                }
                accepted.push(cand);
            }
        }
        accepted.sort_by_key(|c| c.start);
        accepted
    }

    /// Replace every known token with its original value.
    ///
    /// Token-shaped substrings the vault never issued are left unchanged.
    pub fn detokenize(&self, text: &str) -> String {
        let state = self.read();
        self.token_re
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let token = &caps[0];
                match state.records.get(token) {
                    Some(record) => record.original.clone(),
                    None => token.to_string(),
                }
            })
            .into_owned()
    }

    /// Resolve a single token, failing if the vault holds no value for it.
    pub fn resolve(&self, token: &str) -> Result<String> {
        self.read()
            .records
            .get(token)
            .map(|r| r.original.clone())
            .ok_or_else(|| Error::VaultIntegrity(token.to_string()))
    }

    /// Whether `token` was issued by this vault
    pub fn contains(&self, token: &str) -> bool {
        self.read().records.contains_key(token)
    }

    /// Token-shaped substrings in `text` that this vault cannot resolve
    pub fn unresolved_tokens(&self, text: &str) -> Vec<String> {
        let state = self.read();
        self.token_re
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|t| !state.records.contains_key(*t))
            .map(str::to_string)
            .collect()
    }

    /// Snapshot counts by category
    pub fn stats(&self) -> VaultStats {
        let state = self.read();
        let mut by_category = BTreeMap::new();
        for record in state.records.values() {
            *by_category
                .entry(record.category.as_str().to_string())
                .or_insert(0) += 1;
        }
        VaultStats {
            total_tokens: state.records.len(),
            by_category,
        }
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }
}

impl std::fmt::Debug for DataVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataVault")
            .field("rules", &self.rules.len())
            .field("tokens", &self.len())
            .finish()
    }
}
