//! Application definitions and their persisted runtime status.
//!
//! An [`Application`] binds a source (where desired state comes from) to a
//! destination (where it should exist) under a [`SyncPolicy`]. The engine
//! never mutates the definition after registration; everything it learns at
//! runtime lands in [`AppStatus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gitops_model::OwnershipMarker;

use crate::error::Error;
use crate::health::HealthStatus;

/// Where desired state comes from: a repository, a revision pointer, and a
/// directory within it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Repository location (a filesystem path for the git provider)
    pub repo: String,

    /// Branch name, tag, or commit id
    pub revision: String,

    /// Directory inside the repository that holds the manifests
    #[serde(default = "SourceRef::default_path")]
    pub path: String,
}

impl SourceRef {
    pub fn new(
        repo: impl Into<String>,
        revision: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            repo: repo.into(),
            revision: revision.into(),
            path: path.into(),
        }
    }

    fn default_path() -> String {
        ".".to_string()
    }
}

/// Where the application's resources live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Cluster identity. The local backend treats this as its state file path.
    pub cluster: String,

    /// Namespace assumed for manifests that do not name one
    pub namespace: String,
}

impl Destination {
    pub fn new(cluster: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            namespace: namespace.into(),
        }
    }
}

/// How the engine is allowed to act on an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    /// Execute plans without operator intervention
    pub automated: bool,

    /// Delete owned live resources that are no longer desired
    pub prune: bool,

    /// Re-sync automatically when drift from the last synced state is detected
    pub self_heal: bool,

    /// Retries per operation after the initial attempt
    pub retry_limit: u32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            automated: false,
            prune: false,
            self_heal: false,
            retry_limit: 5,
        }
    }
}

/// A registered application: the unit of reconciliation.
///
/// The ownership marker is minted once at registration and survives policy
/// edits, so resources applied under an old policy still count as ours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// Unique name within the engine
    pub name: String,

    /// Dot-separated content paths stripped from both sides before comparison
    #[serde(default)]
    pub ignore_paths: Vec<String>,

    /// When the application was registered
    pub registered_at: DateTime<Utc>,

    pub source: SourceRef,

    pub destination: Destination,

    #[serde(default)]
    pub policy: SyncPolicy,

    /// Marker stamped onto every resource this application applies
    pub marker: OwnershipMarker,
}

impl Application {
    /// Create a new application definition with a freshly minted marker.
    pub fn new(
        name: impl Into<String>,
        source: SourceRef,
        destination: Destination,
        policy: SyncPolicy,
    ) -> Self {
        let name = name.into();
        let marker = OwnershipMarker::new(&name);
        Self {
            name,
            ignore_paths: Vec::new(),
            registered_at: Utc::now(),
            source,
            destination,
            policy,
            marker,
        }
    }

    /// Replace the ignore-path configuration.
    pub fn with_ignore_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_paths = paths.into_iter().map(Into::into).collect();
        self
    }
}

/// Coarse sync classification carried in [`AppStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregateSync {
    Synced,
    OutOfSync,
    #[default]
    Unknown,
}

/// The most recent infrastructure failure observed for an application.
///
/// Conditions are advisory. They never block a later attempt; a successful
/// reconciliation clears them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCondition {
    /// Short error kind, e.g. `source-unavailable`
    pub kind: String,
    pub message: String,
    pub observed_at: DateTime<Utc>,
}

impl StatusCondition {
    /// Build a condition from an infrastructure error, or `None` for errors
    /// that belong in sync records rather than application status.
    pub fn from_error(err: &Error) -> Option<Self> {
        let kind = match err {
            Error::SourceUnavailable { .. } => "source-unavailable",
            Error::RevisionNotFound { .. } => "revision-not-found",
            Error::DestinationUnreachable { .. } => "destination-unreachable",
            Error::ManifestInvalid { .. } | Error::Model(_) => "manifest-invalid",
            _ => return None,
        };
        Some(Self {
            kind: kind.to_string(),
            message: err.to_string(),
            observed_at: Utc::now(),
        })
    }
}

/// Counts from the most recent drift check that found divergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftSummary {
    pub detected_at: DateTime<Utc>,
    pub out_of_sync: usize,
    pub missing: usize,
    pub extra: usize,
    #[serde(default)]
    pub conflicts: usize,
}

/// What a gated (non-automated) plan would do, surfaced for operator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub revision: String,
    /// One line per planned operation, in execution order
    pub operations: Vec<String>,
}

/// Mutable per-application state persisted alongside the definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppStatus {
    /// Revision of the last sync that finished with every operation succeeding
    pub last_synced_revision: Option<String>,

    pub sync: AggregateSync,

    pub health: HealthStatus,

    pub condition: Option<StatusCondition>,

    pub drift: Option<DriftSummary>,

    /// Plan awaiting a manual trigger, when the policy is not automated
    pub pending: Option<PlanSummary>,
}
