//! Audit ledger
//!
//! The system of record. Every significant event becomes one entry whose
//! signature is an HMAC-SHA256 over its canonical form, and whose `prev_hash`
//! is the previous entry's signature:
//!
//! ```text
//! GENESIS ← sig₀ ← sig₁ ← sig₂ ← ...
//! ```
//!
//! Editing, deleting or reordering any entry breaks either its own signature
//! or the link from its successor, and `verify_chain` reports the first index
//! where that happens.

mod chain;
mod entry;

pub use chain::{AuditLedger, ChainVerification, LedgerFilter, LedgerStats};
pub use entry::{
    AuditAction, ChainEndPayload, ChainStartPayload, ConsentDeniedPayload, ExportRecord,
    InjectionBlockedPayload, LedgerEntry, LlmCallPayload, LlmResultPayload, Payload,
    ToolCallPayload, ToolResultPayload, GENESIS_HASH,
};
