//! Event log replay
//!
//! Drives a [`TrustEngine`] from a JSON-lines log of lifecycle events, one
//! event per line:
//!
//! ```text
//! {"event":"run_start","run_id":"r1","description":"research crew"}
//! {"event":"action_start","run_id":"r1","kind":"tool","name":"search","payload":"rust"}
//! {"event":"action_end","run_id":"r1","kind":"tool","name":"search","result":"3 hits"}
//! {"event":"approve","tool":"exec","run_id":"r1"}
//! {"event":"run_end","run_id":"r1","status":"completed"}
//! ```
//!
//! Blank lines are skipped. A blocked action is counted and replay continues;
//! any other engine error stops the replay.

use crate::engine::{ActionKind, TrustEngine};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// One recorded lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplayEvent {
    RunStart {
        run_id: String,
        #[serde(default)]
        description: String,
    },
    RunEnd {
        run_id: String,
        #[serde(default)]
        status: String,
    },
    ActionStart {
        run_id: String,
        kind: ActionKind,
        name: String,
        #[serde(default)]
        payload: String,
    },
    ActionEnd {
        run_id: String,
        kind: ActionKind,
        name: String,
        #[serde(default)]
        result: String,
    },
    Approve {
        tool: String,
        #[serde(default)]
        run_id: Option<String>,
    },
}

/// Counts gathered during a replay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub events: usize,
    pub proceeded: usize,
    pub blocked: usize,
    pub entries_appended: usize,
}

/// Apply one event to the engine
pub fn apply_event(
    engine: &TrustEngine,
    event: &ReplayEvent,
    summary: &mut ReplaySummary,
) -> Result<()> {
    summary.events += 1;

    let appended = match event {
        ReplayEvent::RunStart {
            run_id,
            description,
        } => engine.on_run_start(run_id, description)?.is_some(),
        ReplayEvent::RunEnd { run_id, status } => engine.on_run_end(run_id, status)?.is_some(),
        ReplayEvent::ActionStart {
            run_id,
            kind,
            name,
            payload,
        } => {
            let start = engine.on_action_start(run_id, *kind, name, payload)?;
            if start.proceeds() {
                summary.proceeded += 1;
            } else {
                summary.blocked += 1;
            }
            start.entry.is_some()
        }
        ReplayEvent::ActionEnd {
            run_id,
            kind,
            name,
            result,
        } => engine.on_action_end(run_id, *kind, name, result)?.is_some(),
        ReplayEvent::Approve { tool, run_id } => {
            engine.approve_tool(tool, run_id.as_deref());
            false
        }
    };

    if appended {
        summary.entries_appended += 1;
    }
    Ok(())
}

/// Replay every event read from `reader`
pub async fn replay_reader<R>(engine: &TrustEngine, reader: R) -> Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = ReplaySummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: ReplayEvent = serde_json::from_str(line).map_err(|e| {
            Error::InvalidRecord(format!("line {}: {}", line_no, e))
        })?;
        apply_event(engine, &event, &mut summary)?;
    }

    tracing::info!(
        events = summary.events,
        proceeded = summary.proceeded,
        blocked = summary.blocked,
        "Replay complete"
    );
    Ok(summary)
}

/// Replay a JSON-lines file
pub async fn replay_file(engine: &TrustEngine, path: impl AsRef<Path>) -> Result<ReplaySummary> {
    let file = tokio::fs::File::open(path.as_ref()).await?;
    replay_reader(engine, BufReader::new(file)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AirTrustConfig;
    use crate::crypto::SigningKey;
    use crate::ledger::AuditAction;
    use std::io::Write;

    fn engine() -> TrustEngine {
        let key = SigningKey::new(b"replay-test-key".to_vec()).unwrap();
        TrustEngine::with_key(AirTrustConfig::default(), key).unwrap()
    }

    const LOG: &str = r#"
{"event":"run_start","run_id":"r1","description":"crew"}
{"event":"action_start","run_id":"r1","kind":"model","name":"gpt-4o","payload":"Plan the task"}
{"event":"action_start","run_id":"r1","kind":"tool","name":"exec","payload":"ls"}
{"event":"approve","tool":"exec","run_id":"r1"}
{"event":"action_start","run_id":"r1","kind":"tool","name":"exec","payload":"ls"}
{"event":"action_end","run_id":"r1","kind":"tool","name":"exec","result":"a.txt"}

{"event":"run_end","run_id":"r1","status":"completed"}
"#;

    #[test]
    fn test_event_parse() {
        let event: ReplayEvent =
            serde_json::from_str(r#"{"event":"approve","tool":"exec"}"#).unwrap();
        assert_eq!(
            event,
            ReplayEvent::Approve {
                tool: "exec".to_string(),
                run_id: None
            }
        );
    }

    #[tokio::test]
    async fn test_replay_reader() {
        let engine = engine();
        let summary = replay_reader(&engine, LOG.as_bytes()).await.unwrap();

        assert_eq!(summary.events, 7);
        assert_eq!(summary.proceeded, 2);
        assert_eq!(summary.blocked, 1);
        assert_eq!(summary.entries_appended, 6);

        let stats = engine.audit_stats();
        assert!(stats.chain_valid);
        assert_eq!(
            stats.by_action.get(AuditAction::ConsentDenied.as_str()),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn test_replay_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LOG.as_bytes()).unwrap();

        let engine = engine();
        let summary = replay_file(&engine, file.path()).await.unwrap();
        assert_eq!(summary.events, 7);
        assert_eq!(engine.ledger().len(), 6);
    }

    #[tokio::test]
    async fn test_replay_reports_bad_line() {
        let engine = engine();
        let log = "{\"event\":\"run_start\",\"run_id\":\"r1\"}\n{\"event\":\"launch\"}\n";
        let err = replay_reader(&engine, log.as_bytes()).await.unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let engine = engine();
        let err = replay_file(&engine, "/nonexistent/events.jsonl")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
