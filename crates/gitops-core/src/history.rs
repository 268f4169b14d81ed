//! Append-only sync history.
//!
//! Every executor run produces exactly one [`SyncRecord`], appended to a
//! per-application JSONL stream. Records are never rewritten; rollback is a
//! new record replaying an old revision, not an edit of the past.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gitops_model::ResourceId;

use crate::error::Result;
use crate::persist;

/// What asked for the sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initiator {
    /// A revision trigger or self-heal pass under an automated policy
    Automated,
    /// An explicit operator request
    Manual,
    /// An operator-requested replay of an earlier revision
    Rollback,
}

/// How the run as a whole ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    /// Every operation succeeded
    Succeeded,
    /// At least one operation failed or was skipped
    Failed,
    /// A newer trigger superseded the run between operations
    Aborted,
}

/// The kind of operation a plan entry intended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Apply,
    Delete,
}

impl std::fmt::Display for PlanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Why a failed operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ManifestInvalid,
    OwnershipConflict,
    /// A permanent backend failure, or retries exhausted on a transient one
    PermanentFailure,
    DestinationUnreachable,
}

/// Per-operation result within a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum OpResult {
    Applied,
    Deleted,
    Failed { kind: FailureKind, message: String },
    NotAttempted,
}

/// One plan entry's fate, recorded whether or not it ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub id: ResourceId,
    pub action: PlanAction,
    #[serde(flatten)]
    pub result: OpResult,
}

impl ResourceOutcome {
    pub fn applied(id: ResourceId) -> Self {
        Self {
            id,
            action: PlanAction::Apply,
            result: OpResult::Applied,
        }
    }

    pub fn deleted(id: ResourceId) -> Self {
        Self {
            id,
            action: PlanAction::Delete,
            result: OpResult::Deleted,
        }
    }

    pub fn failed(
        id: ResourceId,
        action: PlanAction,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            action,
            result: OpResult::Failed {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn not_attempted(id: ResourceId, action: PlanAction) -> Self {
        Self {
            id,
            action,
            result: OpResult::NotAttempted,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, OpResult::Applied | OpResult::Deleted)
    }
}

/// One executor run, as witnessed at the time it finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: Uuid,
    pub revision: String,
    pub initiator: Initiator,
    pub phase: SyncPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<ResourceOutcome>,
}

impl SyncRecord {
    pub fn new(
        revision: impl Into<String>,
        initiator: Initiator,
        phase: SyncPhase,
        started_at: DateTime<Utc>,
        outcomes: Vec<ResourceOutcome>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            revision: revision.into(),
            initiator,
            phase,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        }
    }

    pub fn is_success(&self) -> bool {
        self.phase == SyncPhase::Succeeded
    }
}

/// Append-only JSONL store for one application's sync records.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one record. Existing lines are never touched.
    pub fn append(&self, record: &SyncRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        persist::append_line(&self.path, &line)
    }

    /// Load all records, oldest first. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<SyncRecord>> {
        let Some(content) = persist::read_locked(&self.path)? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(line)?);
        }
        Ok(records)
    }

    /// The most recent record, if any sync has run.
    pub fn latest(&self) -> Result<Option<SyncRecord>> {
        Ok(self.load()?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record(revision: &str, phase: SyncPhase) -> SyncRecord {
        SyncRecord::new(
            revision,
            Initiator::Manual,
            phase,
            Utc::now(),
            vec![ResourceOutcome::applied(ResourceId::new(
                "default",
                "ConfigMap",
                "web-config",
            ))],
        )
    }

    #[test]
    fn append_then_load_preserves_order() {
        let temp = TempDir::new().unwrap();
        let log = HistoryLog::new(temp.path().join("shop.jsonl"));

        log.append(&record("aaa111", SyncPhase::Succeeded)).unwrap();
        log.append(&record("bbb222", SyncPhase::Failed)).unwrap();

        let records = log.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].revision, "aaa111");
        assert_eq!(records[1].revision, "bbb222");
        assert_eq!(log.latest().unwrap().unwrap().revision, "bbb222");
    }

    #[test]
    fn missing_file_is_empty_history() {
        let temp = TempDir::new().unwrap();
        let log = HistoryLog::new(temp.path().join("never-synced.jsonl"));

        assert!(log.load().unwrap().is_empty());
        assert_eq!(log.latest().unwrap(), None);
    }

    #[test]
    fn failed_outcome_serializes_with_kind_and_message() {
        let outcome = ResourceOutcome::failed(
            ResourceId::new("default", "Deployment", "web"),
            PlanAction::Apply,
            FailureKind::PermanentFailure,
            "field is immutable",
        );

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["action"], "apply");
        assert_eq!(json["result"], "failed");
        assert_eq!(json["kind"], "permanent-failure");
        assert_eq!(json["message"], "field is immutable");

        let back: ResourceOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn appends_survive_reopening_the_log() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shop.jsonl");

        HistoryLog::new(&path)
            .append(&record("aaa111", SyncPhase::Succeeded))
            .unwrap();
        HistoryLog::new(&path)
            .append(&record("bbb222", SyncPhase::Aborted))
            .unwrap();

        let records = HistoryLog::new(&path).load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].phase, SyncPhase::Aborted);
    }
}
