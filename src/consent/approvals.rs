//! Recorded human approvals

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// How far an approval reaches across runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalScope {
    /// Approvals recorded without a run apply to every run
    #[default]
    Global,
    /// Only approvals recorded for the evaluated run count
    PerRun,
}

/// Which approvals a lookup may accept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMatch {
    /// Named or wildcard approvals
    Any,
    /// Only approvals that name the tool
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Approval {
    /// `None` approves every tool
    tool: Option<String>,
    /// `None` is not bound to a run
    run_id: Option<String>,
}

/// Thread-safe record of approvals, populated by the caller.
#[derive(Debug, Default)]
pub struct ApprovalStore {
    approvals: RwLock<HashSet<Approval>>,
}

impl ApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Approve a tool, optionally for one run only
    pub fn approve(&self, tool_name: &str, run_id: Option<&str>) {
        self.insert(Approval {
            tool: Some(tool_name.to_string()),
            run_id: run_id.map(str::to_string),
        });
    }

    /// Approve every tool, optionally for one run only
    pub fn approve_all(&self, run_id: Option<&str>) {
        self.insert(Approval {
            tool: None,
            run_id: run_id.map(str::to_string),
        });
    }

    /// Remove a named approval. Returns whether one existed.
    pub fn revoke(&self, tool_name: &str, run_id: Option<&str>) -> bool {
        let approval = Approval {
            tool: Some(tool_name.to_string()),
            run_id: run_id.map(str::to_string),
        };
        self.approvals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&approval)
    }

    /// Drop every approval bound to a run
    pub fn clear_run(&self, run_id: &str) {
        self.approvals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|a| a.run_id.as_deref() != Some(run_id));
    }

    /// Whether an approval covering `tool_name` in `run_id` exists under `scope`
    pub fn is_approved(
        &self,
        tool_name: &str,
        run_id: &str,
        scope: ApprovalScope,
        matching: ApprovalMatch,
    ) -> bool {
        let approvals = self
            .approvals
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        approvals.iter().any(|a| {
            let run_ok = match (&a.run_id, scope) {
                (Some(r), _) => r == run_id,
                (None, ApprovalScope::Global) => true,
                (None, ApprovalScope::PerRun) => false,
            };
            let tool_ok = match (&a.tool, matching) {
                (Some(t), _) => t == tool_name,
                (None, ApprovalMatch::Any) => true,
                (None, ApprovalMatch::Explicit) => false,
            };
            run_ok && tool_ok
        })
    }

    pub fn len(&self) -> usize {
        self.approvals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, approval: Approval) {
        self.approvals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(approval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_approval_matches_every_run() {
        let store = ApprovalStore::new();
        store.approve("exec", None);
        assert!(store.is_approved("exec", "run-1", ApprovalScope::Global, ApprovalMatch::Any));
        assert!(store.is_approved("exec", "run-2", ApprovalScope::Global, ApprovalMatch::Explicit));
        assert!(!store.is_approved("shell", "run-1", ApprovalScope::Global, ApprovalMatch::Any));
    }

    #[test]
    fn test_run_bound_approval() {
        let store = ApprovalStore::new();
        store.approve("exec", Some("run-1"));
        assert!(store.is_approved("exec", "run-1", ApprovalScope::Global, ApprovalMatch::Any));
        assert!(!store.is_approved("exec", "run-2", ApprovalScope::Global, ApprovalMatch::Any));
        assert!(store.is_approved("exec", "run-1", ApprovalScope::PerRun, ApprovalMatch::Any));
    }

    #[test]
    fn test_per_run_scope_ignores_unbound_approvals() {
        let store = ApprovalStore::new();
        store.approve("exec", None);
        assert!(!store.is_approved("exec", "run-1", ApprovalScope::PerRun, ApprovalMatch::Any));
    }

    #[test]
    fn test_wildcard_is_not_explicit() {
        let store = ApprovalStore::new();
        store.approve_all(None);
        assert!(store.is_approved("anything", "r", ApprovalScope::Global, ApprovalMatch::Any));
        assert!(!store.is_approved("anything", "r", ApprovalScope::Global, ApprovalMatch::Explicit));
    }

    #[test]
    fn test_revoke_and_clear_run() {
        let store = ApprovalStore::new();
        store.approve("exec", None);
        store.approve("exec", Some("run-1"));
        store.approve_all(Some("run-1"));
        assert_eq!(store.len(), 3);

        assert!(store.revoke("exec", None));
        assert!(!store.revoke("exec", None));
        store.clear_run("run-1");
        assert!(store.is_empty());
    }
}
