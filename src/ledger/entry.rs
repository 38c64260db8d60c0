//! Ledger entry types and their canonical form

use crate::consent::{DecisionReason, RiskTier};
use crate::error::{Error, Result};
use crate::injection::Verdict;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// `prev_hash` of the first entry in a fresh ledger
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Kind of event recorded by an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ChainStart,
    ChainEnd,
    ToolCall,
    ToolResult,
    LlmCall,
    LlmResult,
    ConsentDenied,
    InjectionBlocked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChainStart => "chain_start",
            Self::ChainEnd => "chain_end",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::LlmCall => "llm_call",
            Self::LlmResult => "llm_result",
            Self::ConsentDenied => "consent_denied",
            Self::InjectionBlocked => "injection_blocked",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "chain_start" => Ok(Self::ChainStart),
            "chain_end" => Ok(Self::ChainEnd),
            "tool_call" => Ok(Self::ToolCall),
            "tool_result" => Ok(Self::ToolResult),
            "llm_call" => Ok(Self::LlmCall),
            "llm_result" => Ok(Self::LlmResult),
            "consent_denied" => Ok(Self::ConsentDenied),
            "injection_blocked" => Ok(Self::InjectionBlocked),
            other => Err(format!("unknown audit action: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainStartPayload {
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainEndPayload {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolCallPayload {
    pub tool_name: String,
    pub risk_tier: RiskTier,
    pub consent_required: bool,
    pub input_preview: String,
    pub input_chars: usize,
    pub tokens_created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolResultPayload {
    pub tool_name: String,
    pub output_preview: String,
    pub output_chars: usize,
    pub tokens_created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmCallPayload {
    pub model: String,
    pub input_preview: String,
    pub input_chars: usize,
    pub tokens_created: usize,
    /// Injection score in basis points
    pub injection_score_bps: u32,
    pub injection_verdict: Verdict,
    pub injection_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmResultPayload {
    pub model: String,
    pub output_preview: String,
    pub output_chars: usize,
    pub tokens_created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsentDeniedPayload {
    pub tool_name: String,
    pub risk_tier: RiskTier,
    pub reason: DecisionReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InjectionBlockedPayload {
    pub model: String,
    /// Injection score in basis points
    pub injection_score_bps: u32,
    pub injection_patterns: Vec<String>,
}

/// Entry payload, one fixed schema per action.
///
/// Serialized without a tag: the entry's `action` field says which schema
/// applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    ChainStart(ChainStartPayload),
    ChainEnd(ChainEndPayload),
    ToolCall(ToolCallPayload),
    ToolResult(ToolResultPayload),
    LlmCall(LlmCallPayload),
    LlmResult(LlmResultPayload),
    ConsentDenied(ConsentDeniedPayload),
    InjectionBlocked(InjectionBlockedPayload),
}

impl Payload {
    /// Action this payload is recorded under
    pub fn action(&self) -> AuditAction {
        match self {
            Self::ChainStart(_) => AuditAction::ChainStart,
            Self::ChainEnd(_) => AuditAction::ChainEnd,
            Self::ToolCall(_) => AuditAction::ToolCall,
            Self::ToolResult(_) => AuditAction::ToolResult,
            Self::LlmCall(_) => AuditAction::LlmCall,
            Self::LlmResult(_) => AuditAction::LlmResult,
            Self::ConsentDenied(_) => AuditAction::ConsentDenied,
            Self::InjectionBlocked(_) => AuditAction::InjectionBlocked,
        }
    }

    /// Rebuild a payload from an action and its plain JSON form
    pub fn from_parts(action: AuditAction, value: serde_json::Value) -> Result<Self> {
        let payload = match action {
            AuditAction::ChainStart => Self::ChainStart(serde_json::from_value(value)?),
            AuditAction::ChainEnd => Self::ChainEnd(serde_json::from_value(value)?),
            AuditAction::ToolCall => Self::ToolCall(serde_json::from_value(value)?),
            AuditAction::ToolResult => Self::ToolResult(serde_json::from_value(value)?),
            AuditAction::LlmCall => Self::LlmCall(serde_json::from_value(value)?),
            AuditAction::LlmResult => Self::LlmResult(serde_json::from_value(value)?),
            AuditAction::ConsentDenied => Self::ConsentDenied(serde_json::from_value(value)?),
            AuditAction::InjectionBlocked => {
                Self::InjectionBlocked(serde_json::from_value(value)?)
            }
        };
        Ok(payload)
    }

    /// Plain JSON form
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// One signed entry in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub action: AuditAction,
    pub payload: Payload,
    /// Signature of the previous entry, or the chain anchor
    pub prev_hash: String,
    /// Hex HMAC-SHA256 over the canonical form
    pub signature: String,
}

impl LedgerEntry {
    /// Deterministic bytes covered by the signature.
    ///
    /// A JSON object over every field except `signature`, with keys sorted at
    /// every level and the timestamp fixed to microsecond RFC 3339.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let canonical = serde_json::json!({
            "action": self.action,
            "id": self.id,
            "payload": self.payload.to_value()?,
            "prev_hash": self.prev_hash,
            "run_id": self.run_id,
            "timestamp": format_timestamp(&self.timestamp),
        });
        Ok(serde_json::to_vec(&canonical)?)
    }

    /// Plain export projection
    pub fn to_record(&self) -> Result<ExportRecord> {
        Ok(ExportRecord {
            id: self.id.clone(),
            timestamp: format_timestamp(&self.timestamp),
            run_id: self.run_id.clone(),
            action: self.action,
            payload: self.payload.to_value()?,
            prev_hash: self.prev_hash.clone(),
            signature: self.signature.clone(),
        })
    }

    /// Rebuild an entry from an export record. Nothing is re-signed.
    pub fn from_record(record: ExportRecord) -> Result<Self> {
        let timestamp = DateTime::parse_from_rfc3339(&record.timestamp)
            .map_err(|e| {
                Error::InvalidRecord(format!("entry {}: bad timestamp: {}", record.id, e))
            })?
            .with_timezone(&Utc);
        // Signatures cover the microsecond UTC form only
        if format_timestamp(&timestamp) != record.timestamp {
            return Err(Error::InvalidRecord(format!(
                "entry {}: non-canonical timestamp {}",
                record.id, record.timestamp
            )));
        }
        let payload = Payload::from_parts(record.action, record.payload).map_err(|e| {
            Error::InvalidRecord(format!("entry {}: bad payload: {}", record.id, e))
        })?;

        Ok(Self {
            id: record.id,
            timestamp,
            run_id: record.run_id,
            action: record.action,
            payload,
            prev_hash: record.prev_hash,
            signature: record.signature,
        })
    }
}

/// Serializable projection of an entry for external collectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub id: String,
    pub timestamp: String,
    pub run_id: String,
    pub action: AuditAction,
    pub payload: serde_json::Value,
    pub prev_hash: String,
    pub signature: String,
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
