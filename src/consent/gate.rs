//! Consent gate for tool calls

use super::approvals::{ApprovalMatch, ApprovalScope, ApprovalStore};
use super::tier::{RiskTier, ToolRegistry};
use crate::config::ConsentGateConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// Which tiers require a recorded approval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentPolicy {
    /// Every tool needs approval
    BlockAll,
    /// Only critical tools need approval
    BlockCritical,
    /// High and critical tools need approval
    #[default]
    BlockHighAndCritical,
}

impl ConsentPolicy {
    /// Whether a tool of `tier` needs approval under this policy
    pub fn requires(&self, tier: RiskTier) -> bool {
        match self {
            Self::BlockAll => true,
            Self::BlockCritical => tier >= RiskTier::Critical,
            Self::BlockHighAndCritical => tier >= RiskTier::High,
        }
    }
}

/// Terminal outcome of an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

/// Why a decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Policy does not require consent for this tool
    NotRequired,
    /// Consent is required and an approval was found
    Approved,
    /// Consent is required and no approval was found
    ConsentRequired,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRequired => write!(f, "not_required"),
            Self::Approved => write!(f, "approved"),
            Self::ConsentRequired => write!(f, "consent_required"),
        }
    }
}

/// Result of evaluating one tool call. Not persisted by the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentDecision {
    pub tool_name: String,
    pub tier: RiskTier,
    pub decision: Decision,
    pub reason: DecisionReason,
}

impl ConsentDecision {
    pub fn allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// Classifies tools into risk tiers and decides allow/deny.
///
/// Tools named in `always_require` need an approval that names them; a
/// wildcard approval from `approve_all` never satisfies them.
#[derive(Debug)]
pub struct ConsentGate {
    registry: RwLock<ToolRegistry>,
    policy: ConsentPolicy,
    always_require: HashSet<String>,
    scope: ApprovalScope,
    approvals: ApprovalStore,
}

impl ConsentGate {
    /// Create a gate from configuration
    pub fn new(config: &ConsentGateConfig) -> Self {
        let mut registry = ToolRegistry::new(config.default_tier);
        for (tool, tier) in &config.registry {
            registry.register(tool.clone(), *tier);
        }
        Self::with_registry(
            registry,
            config.policy,
            config.always_require.iter().cloned(),
            config.approval_scope,
        )
    }

    /// Create a gate from an explicit registry
    pub fn with_registry(
        registry: ToolRegistry,
        policy: ConsentPolicy,
        always_require: impl IntoIterator<Item = String>,
        scope: ApprovalScope,
    ) -> Self {
        Self {
            registry: RwLock::new(registry),
            policy,
            always_require: always_require.into_iter().collect(),
            scope,
            approvals: ApprovalStore::new(),
        }
    }

    pub fn policy(&self) -> ConsentPolicy {
        self.policy
    }

    pub fn scope(&self) -> ApprovalScope {
        self.scope
    }

    /// The approval record the caller populates
    pub fn approvals(&self) -> &ApprovalStore {
        &self.approvals
    }

    /// Add or replace a tool's tier at runtime
    pub fn register(&self, tool_name: &str, tier: RiskTier) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(tool_name, tier);
    }

    /// Risk tier of a tool
    pub fn classify(&self, tool_name: &str) -> RiskTier {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .classify(tool_name)
    }

    /// Whether the tool needs an approval before it may run
    pub fn requires_consent(&self, tool_name: &str) -> bool {
        self.always_require.contains(tool_name) || self.policy.requires(self.classify(tool_name))
    }

    /// Evaluate a tool call for a run.
    pub fn evaluate(&self, tool_name: &str, run_id: &str) -> ConsentDecision {
        let tier = self.classify(tool_name);
        let always = self.always_require.contains(tool_name);

        let (decision, reason) = if !always && !self.policy.requires(tier) {
            (Decision::Allow, DecisionReason::NotRequired)
        } else {
            let matching = if always {
                ApprovalMatch::Explicit
            } else {
                ApprovalMatch::Any
            };
            if self
                .approvals
                .is_approved(tool_name, run_id, self.scope, matching)
            {
                (Decision::Allow, DecisionReason::Approved)
            } else {
                (Decision::Deny, DecisionReason::ConsentRequired)
            }
        };

        tracing::debug!(
            tool = tool_name,
            run_id = run_id,
            tier = %tier,
            reason = %reason,
            "Consent evaluated"
        );

        ConsentDecision {
            tool_name: tool_name.to_string(),
            tier,
            decision,
            reason,
        }
    }
}

impl Default for ConsentGate {
    fn default() -> Self {
        Self::new(&ConsentGateConfig::default())
    }
}
