//! Consent gate
//!
//! Classifies a requested tool into a risk tier, then checks the tier
//! against the blocking policy and the approvals the caller has recorded.
//!
//! ```text
//! tool_name → registry → tier → policy? ──no──→ allow (not_required)
//!                                  │yes
//!                                  ↓
//!                         approval recorded? ──yes──→ allow (approved)
//!                                  │no
//!                                  ↓
//!                         deny (consent_required)
//! ```

mod approvals;
mod gate;
mod tier;

pub use approvals::{ApprovalMatch, ApprovalScope, ApprovalStore};
pub use gate::{ConsentDecision, ConsentGate, ConsentPolicy, Decision, DecisionReason};
pub use tier::{RiskTier, ToolRegistry};
