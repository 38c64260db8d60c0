//! Hash-chained, HMAC-signed audit ledger

use super::entry::{AuditAction, ExportRecord, LedgerEntry, Payload, GENESIS_HASH};
use crate::config::AuditLedgerConfig;
use crate::crypto::SigningKey;
use crate::error::{Error, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result of verifying the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub total_entries: usize,
    /// Zero-based index of the first entry failing either check
    pub first_invalid_index: Option<usize>,
}

/// Snapshot of ledger contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_entries: usize,
    pub chain_valid: bool,
    pub by_action: BTreeMap<String, usize>,
}

/// Entry selection for [`AuditLedger::get_entries`]. Time bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerFilter {
    pub run_id: Option<String>,
    pub action: Option<AuditAction>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl LedgerFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    fn matches(&self, entry: &LedgerEntry) -> bool {
        self.run_id.as_deref().map_or(true, |r| entry.run_id == r)
            && self.action.map_or(true, |a| entry.action == a)
            && self.since.map_or(true, |t| entry.timestamp >= t)
            && self.until.map_or(true, |t| entry.timestamp <= t)
    }
}

struct LedgerInner {
    entries: Vec<LedgerEntry>,
    /// `prev_hash` expected of the first held entry
    anchor: String,
    /// Signature the next entry links to
    last_signature: String,
    last_timestamp: Option<DateTime<Utc>>,
}

impl LedgerInner {
    fn new(anchor: String) -> Self {
        Self {
            entries: Vec::new(),
            last_signature: anchor.clone(),
            anchor,
            last_timestamp: None,
        }
    }
}

/// Append-only audit ledger.
///
/// Appends serialize "read last signature, sign, push" behind one `Mutex`, so
/// concurrent runs share a single total order.
pub struct AuditLedger {
    key: SigningKey,
    max_entries: Option<usize>,
    inner: Mutex<LedgerInner>,
}

impl AuditLedger {
    /// Create an empty ledger anchored at the genesis hash
    pub fn new(key: SigningKey, max_entries: Option<usize>) -> Self {
        Self {
            key,
            max_entries,
            inner: Mutex::new(LedgerInner::new(GENESIS_HASH.to_string())),
        }
    }

    /// Create a ledger from configuration, reading the key from the environment
    pub fn from_config(config: &AuditLedgerConfig) -> Result<Self> {
        let key = SigningKey::from_env(&config.signing_key_env)?;
        Ok(Self::new(key, config.max_entries))
    }

    /// Rebuild a ledger from exported records for offline verification
    pub fn import(key: SigningKey, records: Vec<ExportRecord>) -> Result<Self> {
        Self::import_with_anchor(key, GENESIS_HASH, records)
    }

    /// Rebuild a rotated segment whose first entry links to `anchor`
    pub fn import_with_anchor(
        key: SigningKey,
        anchor: &str,
        records: Vec<ExportRecord>,
    ) -> Result<Self> {
        let entries = records
            .into_iter()
            .map(LedgerEntry::from_record)
            .collect::<Result<Vec<_>>>()?;

        let mut inner = LedgerInner::new(anchor.to_string());
        if let Some(last) = entries.last() {
            inner.last_signature = last.signature.clone();
            inner.last_timestamp = Some(last.timestamp);
        }
        inner.entries = entries;

        tracing::debug!(entries = inner.entries.len(), "Imported ledger records");

        Ok(Self {
            key,
            max_entries: None,
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a signed entry for `run_id`.
    pub fn append(&self, run_id: &str, payload: Payload) -> Result<LedgerEntry> {
        let mut inner = self.lock();

        if let Some(max_entries) = self.max_entries {
            if inner.entries.len() >= max_entries {
                tracing::warn!(max_entries = max_entries, "Audit ledger is full");
                return Err(Error::LedgerFull { max_entries });
            }
        }

        // Truncate to what the canonical form can carry, and never go backwards
        let mut timestamp = Utc::now().trunc_subsecs(6);
        if let Some(last) = inner.last_timestamp {
            if timestamp < last {
                timestamp = last;
            }
        }

        let mut entry = LedgerEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            run_id: run_id.to_string(),
            action: payload.action(),
            payload,
            prev_hash: inner.last_signature.clone(),
            signature: String::new(),
        };
        entry.signature = self.key.sign(&entry.canonical_bytes()?);

        inner.last_signature = entry.signature.clone();
        inner.last_timestamp = Some(timestamp);
        inner.entries.push(entry.clone());

        tracing::debug!(
            run_id = run_id,
            action = %entry.action,
            index = inner.entries.len() - 1,
            "Ledger entry appended"
        );

        Ok(entry)
    }

    /// Recompute every signature and check the `prev_hash` links.
    pub fn verify_chain(&self) -> ChainVerification {
        let inner = self.lock();
        let mut expected_prev = inner.anchor.as_str();
        let mut first_invalid_index = None;

        for (index, entry) in inner.entries.iter().enumerate() {
            let linked = entry.prev_hash == expected_prev;
            let signed = entry
                .canonical_bytes()
                .map(|bytes| self.key.verify(&bytes, &entry.signature))
                .unwrap_or(false);
            if !(linked && signed) {
                first_invalid_index = Some(index);
                break;
            }
            expected_prev = entry.signature.as_str();
        }

        if let Some(index) = first_invalid_index {
            tracing::warn!(index = index, "Audit chain verification failed");
        }

        ChainVerification {
            valid: first_invalid_index.is_none(),
            total_entries: inner.entries.len(),
            first_invalid_index,
        }
    }

    /// Entries matching `filter`, in append order
    pub fn get_entries(&self, filter: &LedgerFilter) -> Vec<LedgerEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Every entry as a plain record, in append order
    pub fn export(&self) -> Result<Vec<ExportRecord>> {
        self.lock().entries.iter().map(LedgerEntry::to_record).collect()
    }

    /// Drain all entries as records. The last signature becomes the anchor
    /// of the next segment, so later appends still link to the drained chain.
    pub fn rotate(&self) -> Result<Vec<ExportRecord>> {
        let mut inner = self.lock();
        let records = inner
            .entries
            .iter()
            .map(LedgerEntry::to_record)
            .collect::<Result<Vec<_>>>()?;

        inner.entries.clear();
        inner.anchor = inner.last_signature.clone();

        tracing::info!(exported = records.len(), "Audit ledger rotated");
        Ok(records)
    }

    pub fn stats(&self) -> LedgerStats {
        let verification = self.verify_chain();
        let mut by_action = BTreeMap::new();
        for entry in self.lock().entries.iter() {
            *by_action.entry(entry.action.to_string()).or_insert(0) += 1;
        }
        LedgerStats {
            total_entries: verification.total_entries,
            chain_valid: verification.valid,
            by_action,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Signature the next appended entry will link to
    pub fn last_signature(&self) -> String {
        self.lock().last_signature.clone()
    }

    /// `prev_hash` expected of the first held entry
    pub fn anchor(&self) -> String {
        self.lock().anchor.clone()
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    #[cfg(test)]
    pub(crate) fn tamper(&self, index: usize, f: impl FnOnce(&mut LedgerEntry)) {
        f(&mut self.lock().entries[index]);
    }

    #[cfg(test)]
    pub(crate) fn tamper_entries(&self, f: impl FnOnce(&mut Vec<LedgerEntry>)) {
        f(&mut self.lock().entries);
    }
}

impl std::fmt::Debug for AuditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLedger")
            .field("entries", &self.len())
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::{DecisionReason, RiskTier};
    use crate::ledger::entry::{
        ChainEndPayload, ChainStartPayload, ConsentDeniedPayload, ToolCallPayload,
    };
    use std::sync::Arc;

    fn key() -> SigningKey {
        SigningKey::new(b"test-ledger-key".to_vec()).unwrap()
    }

    fn start(description: &str) -> Payload {
        Payload::ChainStart(ChainStartPayload {
            description: description.to_string(),
        })
    }

    fn tool_call(tool: &str) -> Payload {
        Payload::ToolCall(ToolCallPayload {
            tool_name: tool.to_string(),
            risk_tier: RiskTier::Low,
            consent_required: false,
            input_preview: "{}".to_string(),
            input_chars: 2,
            tokens_created: 0,
        })
    }

    fn end(status: &str) -> Payload {
        Payload::ChainEnd(ChainEndPayload {
            status: status.to_string(),
        })
    }

    fn three_entry_ledger() -> AuditLedger {
        let ledger = AuditLedger::new(key(), None);
        ledger.append("run-1", start("crew kickoff")).unwrap();
        ledger.append("run-1", tool_call("read_file")).unwrap();
        ledger.append("run-1", end("completed")).unwrap();
        ledger
    }

    #[test]
    fn test_empty_ledger_is_valid() {
        let ledger = AuditLedger::new(key(), None);
        let v = ledger.verify_chain();
        assert!(v.valid);
        assert_eq!(v.total_entries, 0);
        assert_eq!(ledger.last_signature(), GENESIS_HASH);
    }

    #[test]
    fn test_append_links_entries() {
        let ledger = AuditLedger::new(key(), None);
        let first = ledger.append("run-1", start("go")).unwrap();
        let second = ledger.append("run-1", tool_call("search")).unwrap();

        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.prev_hash, first.signature);
        assert_eq!(second.action, AuditAction::ToolCall);
        assert_eq!(first.signature.len(), 64);
        assert_ne!(first.id, second.id);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(ledger.last_signature(), second.signature);
    }

    #[test]
    fn test_many_appends_verify() {
        let ledger = AuditLedger::new(key(), None);
        for i in 0..50 {
            ledger.append(&format!("run-{}", i % 3), tool_call("search")).unwrap();
        }
        let v = ledger.verify_chain();
        assert!(v.valid);
        assert_eq!(v.total_entries, 50);
        assert_eq!(v.first_invalid_index, None);
    }

    #[test]
    fn test_mutated_payload_detected_at_its_index() {
        let ledger = three_entry_ledger();
        ledger.tamper(2, |e| {
            e.payload = end("failed");
        });
        let v = ledger.verify_chain();
        assert!(!v.valid);
        assert_eq!(v.total_entries, 3);
        assert_eq!(v.first_invalid_index, Some(2));
    }

    #[test]
    fn test_each_mutated_field_detected() {
        let mutations: Vec<Box<dyn Fn(&mut LedgerEntry)>> = vec![
            Box::new(|e| e.id.push('x')),
            Box::new(|e| e.timestamp = e.timestamp + chrono::Duration::microseconds(1)),
            Box::new(|e| e.run_id = "run-other".to_string()),
            Box::new(|e| e.action = AuditAction::ToolResult),
            Box::new(|e| e.payload = tool_call("write_file")),
            Box::new(|e| e.prev_hash = "f".repeat(64)),
            Box::new(|e| e.signature = "00".repeat(32)),
        ];
        for mutate in &mutations {
            for index in 0..3 {
                let ledger = three_entry_ledger();
                ledger.tamper(index, |e| mutate(e));
                let v = ledger.verify_chain();
                assert_eq!(v.first_invalid_index, Some(index));
            }
        }
    }

    #[test]
    fn test_deleted_entry_detected() {
        let ledger = three_entry_ledger();
        ledger.tamper_entries(|entries| {
            entries.remove(1);
        });
        let v = ledger.verify_chain();
        assert!(!v.valid);
        assert_eq!(v.first_invalid_index, Some(1));
    }

    #[test]
    fn test_reordered_entries_detected() {
        let ledger = three_entry_ledger();
        ledger.tamper_entries(|entries| entries.swap(0, 1));
        assert_eq!(ledger.verify_chain().first_invalid_index, Some(0));
    }

    #[test]
    fn test_forged_key_detected() {
        let ledger = three_entry_ledger();
        let records = ledger.export().unwrap();
        let other = SigningKey::new(b"another-key".to_vec()).unwrap();
        let imported = AuditLedger::import(other, records).unwrap();
        let v = imported.verify_chain();
        assert!(!v.valid);
        assert_eq!(v.first_invalid_index, Some(0));
    }

    #[test]
    fn test_verify_has_no_side_effects() {
        let ledger = three_entry_ledger();
        let before = ledger.export().unwrap();
        assert_eq!(ledger.verify_chain(), ledger.verify_chain());
        assert_eq!(ledger.export().unwrap(), before);
    }

    #[test]
    fn test_ledger_full() {
        let ledger = AuditLedger::new(key(), Some(2));
        ledger.append("run-1", start("a")).unwrap();
        ledger.append("run-1", end("b")).unwrap();

        let err = ledger.append("run-1", start("c")).unwrap_err();
        assert!(matches!(err, Error::LedgerFull { max_entries: 2 }));

        let v = ledger.verify_chain();
        assert!(v.valid);
        assert_eq!(v.total_entries, 2);
    }

    #[test]
    fn test_rotate_continues_chain() {
        let ledger = AuditLedger::new(key(), Some(2));
        ledger.append("run-1", start("a")).unwrap();
        let last = ledger.append("run-1", end("b")).unwrap();

        let drained = ledger.rotate().unwrap();
        assert_eq!(drained.len(), 2);
        assert!(ledger.is_empty());
        assert_eq!(ledger.anchor(), last.signature);

        let next = ledger.append("run-2", start("c")).unwrap();
        assert_eq!(next.prev_hash, last.signature);
        assert!(ledger.verify_chain().valid);

        // The drained segment still verifies from genesis
        let segment = AuditLedger::import(key(), drained).unwrap();
        assert!(segment.verify_chain().valid);

        // And the live segment verifies from its anchor
        let live =
            AuditLedger::import_with_anchor(key(), &last.signature, ledger.export().unwrap())
                .unwrap();
        assert!(live.verify_chain().valid);
    }

    #[test]
    fn test_get_entries_filters() {
        let ledger = AuditLedger::new(key(), None);
        ledger.append("run-1", start("a")).unwrap();
        ledger.append("run-2", start("b")).unwrap();
        ledger.append("run-1", tool_call("search")).unwrap();
        ledger
            .append(
                "run-2",
                Payload::ConsentDenied(ConsentDeniedPayload {
                    tool_name: "exec".to_string(),
                    risk_tier: RiskTier::Critical,
                    reason: DecisionReason::ConsentRequired,
                }),
            )
            .unwrap();

        let run1 = ledger.get_entries(&LedgerFilter::new().run("run-1"));
        assert_eq!(run1.len(), 2);
        assert_eq!(run1[0].action, AuditAction::ChainStart);
        assert_eq!(run1[1].action, AuditAction::ToolCall);

        let starts = ledger.get_entries(&LedgerFilter::new().action(AuditAction::ChainStart));
        assert_eq!(starts.len(), 2);

        let denied = ledger.get_entries(
            &LedgerFilter::new()
                .run("run-2")
                .action(AuditAction::ConsentDenied),
        );
        assert_eq!(denied.len(), 1);

        let all = ledger.get_entries(&LedgerFilter::new());
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_get_entries_time_range() {
        let ledger = three_entry_ledger();
        let entries = ledger.get_entries(&LedgerFilter::new());
        let middle = entries[1].timestamp;

        let from_middle = ledger.get_entries(&LedgerFilter::new().since(middle));
        assert!(from_middle.len() >= 2);
        assert!(from_middle.iter().all(|e| e.timestamp >= middle));

        let until_middle = ledger.get_entries(&LedgerFilter::new().until(middle));
        assert!(until_middle.len() >= 2);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(ledger.get_entries(&LedgerFilter::new().since(future)).is_empty());
    }

    #[test]
    fn test_export_shape() {
        let ledger = three_entry_ledger();
        let records = ledger.export().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].prev_hash, records[0].signature);

        let json = serde_json::to_value(&records[1]).unwrap();
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["action", "id", "payload", "prev_hash", "run_id", "signature", "timestamp"]
        );
        assert_eq!(json["action"], "tool_call");
        assert_eq!(json["payload"]["tool_name"], "read_file");
    }

    #[test]
    fn test_export_import_roundtrip_verifies() {
        let ledger = three_entry_ledger();
        let json = serde_json::to_string(&ledger.export().unwrap()).unwrap();
        let records: Vec<ExportRecord> = serde_json::from_str(&json).unwrap();
        let imported = AuditLedger::import(key(), records).unwrap();
        assert!(imported.verify_chain().valid);
        assert_eq!(imported.len(), 3);
    }

    #[test]
    fn test_tampered_export_detected() {
        let ledger = three_entry_ledger();
        let mut records = ledger.export().unwrap();
        records[1].payload["tool_name"] = serde_json::json!("exec");
        let imported = AuditLedger::import(key(), records).unwrap();
        assert_eq!(imported.verify_chain().first_invalid_index, Some(1));
    }

    #[test]
    fn test_stats() {
        let ledger = three_entry_ledger();
        ledger.append("run-1", tool_call("search")).unwrap();
        let stats = ledger.stats();
        assert_eq!(stats.total_entries, 4);
        assert!(stats.chain_valid);
        assert_eq!(stats.by_action.get("tool_call"), Some(&2));
        assert_eq!(stats.by_action.get("chain_start"), Some(&1));
    }

    #[test]
    fn test_concurrent_appends_form_one_chain() {
        let ledger = Arc::new(AuditLedger::new(key(), None));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        ledger
                            .append(&format!("run-{}", t), tool_call("search"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let v = ledger.verify_chain();
        assert!(v.valid);
        assert_eq!(v.total_entries, 200);

        let entries = ledger.get_entries(&LedgerFilter::new());
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = AuditLedgerConfig {
            signing_key_env: "AIR_TRUST_TEST_UNSET_KEY_VAR".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            AuditLedger::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let ledger = three_entry_ledger();
        let debug = format!("{:?}", ledger);
        assert!(!debug.contains("test-ledger-key"));
        assert!(debug.contains("entries: 3"));
    }
}
