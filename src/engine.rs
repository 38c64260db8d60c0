//! Trust engine
//!
//! Composes the consent gate, data vault, injection detector and audit
//! ledger at the lifecycle points of an agent run. It holds no state of its
//! own beyond shared references to the four components.
//!
//! ```text
//! tool:  consent → (deny: consent_denied entry, block)
//!                → tokenize → tool_call entry → proceed
//! model: scan raw → (block: injection_blocked entry, block)
//!                → tokenize → llm_call entry → proceed
//! end:   tokenize result → tool_result / llm_result entry
//! ```

use crate::config::AirTrustConfig;
use crate::consent::{ConsentDecision, ConsentGate};
use crate::crypto::SigningKey;
use crate::error::{Error, Result};
use crate::injection::{InjectionDetector, ScanResult, Verdict};
use crate::ledger::{
    AuditLedger, ChainEndPayload, ChainStartPayload, ChainVerification, ConsentDeniedPayload,
    ExportRecord, InjectionBlockedPayload, LedgerEntry, LedgerStats, LlmCallPayload,
    LlmResultPayload, Payload, ToolCallPayload, ToolResultPayload,
};
use crate::vault::{DataVault, TokenizeResult, VaultStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What kind of action a lifecycle call is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A tool invocation
    Tool,
    /// A model (LLM) invocation
    Model,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool => write!(f, "tool"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// Why an action was halted
#[derive(Debug, Clone, PartialEq)]
pub enum BlockReason {
    ConsentDenied(ConsentDecision),
    InjectionBlocked(ScanResult),
}

impl BlockReason {
    /// The halting error for this block
    pub fn to_error(&self) -> Error {
        match self {
            Self::ConsentDenied(decision) => Error::ConsentDenied {
                tool_name: decision.tool_name.clone(),
                tier: decision.tier,
                reason: decision.reason.to_string(),
            },
            Self::InjectionBlocked(scan) => Error::InjectionBlocked {
                score: scan.score,
                patterns: scan.pattern_names(),
            },
        }
    }
}

/// Decision for an action about to start
#[derive(Debug, Clone, PartialEq)]
pub enum ActionDecision {
    Proceed,
    Block(BlockReason),
}

/// Outcome of [`TrustEngine::on_action_start`]
#[derive(Debug, Clone)]
pub struct ActionStart {
    pub decision: ActionDecision,
    /// Text to send onward; tokenized when the vault is enabled.
    /// Empty when the action is blocked.
    pub payload: String,
    /// Ledger entry recording the start, allow or block
    pub entry: Option<LedgerEntry>,
}

impl ActionStart {
    fn passthrough(text: &str) -> Self {
        Self {
            decision: ActionDecision::Proceed,
            payload: text.to_string(),
            entry: None,
        }
    }

    fn blocked(reason: BlockReason, entry: Option<LedgerEntry>) -> Self {
        Self {
            decision: ActionDecision::Block(reason),
            payload: String::new(),
            entry,
        }
    }

    pub fn proceeds(&self) -> bool {
        self.decision == ActionDecision::Proceed
    }

    /// The payload to forward, or the halting error when blocked
    pub fn into_payload(self) -> Result<String> {
        match self.decision {
            ActionDecision::Proceed => Ok(self.payload),
            ActionDecision::Block(reason) => Err(reason.to_error()),
        }
    }
}

/// Truncate to at most `max_chars` characters on a char boundary
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

/// Runtime trust layer for agent tool and model calls
#[derive(Debug)]
pub struct TrustEngine {
    config: AirTrustConfig,
    ledger: Arc<AuditLedger>,
    vault: Arc<DataVault>,
    detector: Arc<InjectionDetector>,
    gate: Arc<ConsentGate>,
}

impl TrustEngine {
    /// Create an engine, reading the signing key from the configured
    /// environment variable. A missing key is fatal.
    pub fn new(config: AirTrustConfig) -> Result<Self> {
        let key = SigningKey::from_env(&config.audit_ledger.signing_key_env)?;
        Self::with_key(config, key)
    }

    /// Create an engine with an explicit signing key
    pub fn with_key(config: AirTrustConfig, key: SigningKey) -> Result<Self> {
        config.validate()?;

        let ledger = AuditLedger::new(key, config.audit_ledger.max_entries);
        let vault = DataVault::new(&config.vault)?;
        let detector = InjectionDetector::new(&config.injection_detection)?;
        let gate = ConsentGate::new(&config.consent_gate);

        tracing::info!(
            enabled = config.enabled,
            ledger = config.audit_ledger.enabled,
            vault = config.vault.enabled,
            consent = config.consent_gate.enabled,
            injection = config.injection_detection.enabled,
            sensitivity = %detector.sensitivity(),
            "AIR Trust engine initialized"
        );

        Ok(Self {
            config,
            ledger: Arc::new(ledger),
            vault: Arc::new(vault),
            detector: Arc::new(detector),
            gate: Arc::new(gate),
        })
    }

    pub fn config(&self) -> &AirTrustConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    pub fn vault(&self) -> &Arc<DataVault> {
        &self.vault
    }

    pub fn detector(&self) -> &Arc<InjectionDetector> {
        &self.detector
    }

    pub fn gate(&self) -> &Arc<ConsentGate> {
        &self.gate
    }

    /// Record the start of a run
    pub fn on_run_start(&self, run_id: &str, description: &str) -> Result<Option<LedgerEntry>> {
        if !self.config.enabled {
            return Ok(None);
        }
        tracing::info!(run_id = run_id, "Run started");
        self.record(
            run_id,
            Payload::ChainStart(ChainStartPayload {
                description: description.to_string(),
            }),
        )
    }

    /// Record the end of a run and drop approvals bound to it
    pub fn on_run_end(&self, run_id: &str, status: &str) -> Result<Option<LedgerEntry>> {
        if !self.config.enabled {
            return Ok(None);
        }
        self.gate.approvals().clear_run(run_id);
        tracing::info!(run_id = run_id, status = status, "Run ended");
        self.record(
            run_id,
            Payload::ChainEnd(ChainEndPayload {
                status: status.to_string(),
            }),
        )
    }

    /// Evaluate an action before it runs.
    ///
    /// A block is still recorded in the ledger before this returns. Recording
    /// comes first: if the ledger cannot take the entry (`Error::LedgerFull`),
    /// that error is returned in place of the block, and the action must be
    /// treated as not cleared to run.
    pub fn on_action_start(
        &self,
        run_id: &str,
        kind: ActionKind,
        name: &str,
        payload_text: &str,
    ) -> Result<ActionStart> {
        if !self.config.enabled {
            return Ok(ActionStart::passthrough(payload_text));
        }
        match kind {
            ActionKind::Tool => self.before_tool(run_id, name, payload_text),
            ActionKind::Model => self.before_model(run_id, name, payload_text),
        }
    }

    /// Record the result of an action.
    pub fn on_action_end(
        &self,
        run_id: &str,
        kind: ActionKind,
        name: &str,
        result_text: &str,
    ) -> Result<Option<LedgerEntry>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let tokenized = self.tokenize(result_text);
        let output_preview = preview(&tokenized.text, self.config.audit_ledger.preview_chars);
        let output_chars = result_text.chars().count();
        let tokens_created = tokenized.created.len();

        let payload = match kind {
            ActionKind::Tool => Payload::ToolResult(ToolResultPayload {
                tool_name: name.to_string(),
                output_preview,
                output_chars,
                tokens_created,
            }),
            ActionKind::Model => Payload::LlmResult(LlmResultPayload {
                model: name.to_string(),
                output_preview,
                output_chars,
                tokens_created,
            }),
        };
        self.record(run_id, payload)
    }

    fn before_tool(&self, run_id: &str, tool_name: &str, text: &str) -> Result<ActionStart> {
        let tier = self.gate.classify(tool_name);
        let mut consent_required = false;

        if self.config.consent_gate.enabled {
            let decision = self.gate.evaluate(tool_name, run_id);
            if !decision.allowed() {
                tracing::warn!(
                    run_id = run_id,
                    tool = tool_name,
                    tier = %decision.tier,
                    reason = %decision.reason,
                    "Tool call blocked by consent gate"
                );
                let entry = self.record(
                    run_id,
                    Payload::ConsentDenied(ConsentDeniedPayload {
                        tool_name: tool_name.to_string(),
                        risk_tier: decision.tier,
                        reason: decision.reason,
                    }),
                )?;
                return Ok(ActionStart::blocked(
                    BlockReason::ConsentDenied(decision),
                    entry,
                ));
            }
            consent_required = self.gate.requires_consent(tool_name);
        }

        let tokenized = self.tokenize(text);
        let entry = self.record(
            run_id,
            Payload::ToolCall(ToolCallPayload {
                tool_name: tool_name.to_string(),
                risk_tier: tier,
                consent_required,
                input_preview: preview(&tokenized.text, self.config.audit_ledger.preview_chars),
                input_chars: text.chars().count(),
                tokens_created: tokenized.created.len(),
            }),
        )?;

        Ok(ActionStart {
            decision: ActionDecision::Proceed,
            payload: tokenized.text,
            entry,
        })
    }

    fn before_model(&self, run_id: &str, model: &str, text: &str) -> Result<ActionStart> {
        // Scan the raw text: a payload hidden inside a vaulted span would be
        // invisible after tokenization
        let scan = if self.config.injection_detection.enabled {
            self.detector.scan(text)
        } else {
            ScanResult {
                score: 0.0,
                matched: Vec::new(),
                verdict: Verdict::Pass,
            }
        };

        if scan.blocked() {
            tracing::warn!(
                run_id = run_id,
                model = model,
                score = scan.score,
                patterns = ?scan.pattern_names(),
                "Model input blocked by injection detector"
            );
            let entry = self.record(
                run_id,
                Payload::InjectionBlocked(InjectionBlockedPayload {
                    model: model.to_string(),
                    injection_score_bps: scan.score_bps(),
                    injection_patterns: scan.pattern_names(),
                }),
            )?;
            return Ok(ActionStart::blocked(
                BlockReason::InjectionBlocked(scan),
                entry,
            ));
        }

        let tokenized = self.tokenize(text);
        let entry = self.record(
            run_id,
            Payload::LlmCall(LlmCallPayload {
                model: model.to_string(),
                input_preview: preview(&tokenized.text, self.config.audit_ledger.preview_chars),
                input_chars: text.chars().count(),
                tokens_created: tokenized.created.len(),
                injection_score_bps: scan.score_bps(),
                injection_verdict: scan.verdict,
                injection_patterns: scan.pattern_names(),
            }),
        )?;

        Ok(ActionStart {
            decision: ActionDecision::Proceed,
            payload: tokenized.text,
            entry,
        })
    }

    fn tokenize(&self, text: &str) -> TokenizeResult {
        if self.config.vault.enabled {
            self.vault.tokenize(text)
        } else {
            TokenizeResult {
                text: text.to_string(),
                created: Vec::new(),
                replaced: 0,
            }
        }
    }

    fn record(&self, run_id: &str, payload: Payload) -> Result<Option<LedgerEntry>> {
        if !self.config.audit_ledger.enabled {
            return Ok(None);
        }
        self.ledger.append(run_id, payload).map(Some)
    }

    /// Approve a tool, optionally for a single run
    pub fn approve_tool(&self, tool_name: &str, run_id: Option<&str>) {
        tracing::info!(tool = tool_name, run_id = ?run_id, "Tool approved");
        self.gate.approvals().approve(tool_name, run_id);
    }

    /// Restore vaulted values in text coming back to the caller
    pub fn detokenize(&self, text: &str) -> String {
        self.vault.detokenize(text)
    }

    pub fn audit_stats(&self) -> LedgerStats {
        self.ledger.stats()
    }

    pub fn verify_chain(&self) -> ChainVerification {
        self.ledger.verify_chain()
    }

    pub fn export_audit(&self) -> Result<Vec<ExportRecord>> {
        self.ledger.export()
    }

    pub fn vault_stats(&self) -> VaultStats {
        self.vault.stats()
    }
}
