//! Destination abstractions.
//!
//! Two seams face the destination: [`LiveStateProvider`] observes what
//! currently exists, and [`ExecutorBackend`] changes it. They are separate
//! traits because observation is needed in places (drift checks, health
//! assessment) where mutation must be impossible.

pub mod local;

pub use local::LocalCluster;

use async_trait::async_trait;

use gitops_model::{LiveResource, OwnershipMarker, ResourceId, ResourceManifest};

use crate::application::Destination;
use crate::error::Result;

/// Scope of a live-state listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingSelector {
    /// Every resource at the destination, whoever owns it
    All,

    /// Only resources whose marker names this application
    Application(String),
}

/// What the backend reports back for a single apply or delete.
///
/// `Retryable` failures are re-attempted under the application's retry
/// policy; `Permanent` failures abort the remainder of the plan immediately.
/// `Rejected` means the destination refused the document itself (schema or
/// admission validation); it is never retried and is recorded as an
/// invalid-manifest failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOutcome {
    Success,
    Retryable { reason: String },
    Permanent { reason: String },
    Rejected { reason: String },
}

impl BackendOutcome {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::Retryable {
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent {
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Trait for observing live state at a destination.
///
/// Listings are full snapshots: each resource's current content, plus its
/// ownership marker when one is present. A transport-level failure is an
/// [`Error::DestinationUnreachable`](crate::Error::DestinationUnreachable);
/// an empty destination is an empty `Vec`, not an error.
#[async_trait]
pub trait LiveStateProvider: Send + Sync {
    /// Snapshot the resources currently present at the destination.
    async fn list(
        &self,
        destination: &Destination,
        selector: &TrackingSelector,
    ) -> Result<Vec<LiveResource>>;
}

/// Trait for mutating live state at a destination.
///
/// `apply` is an upsert: it creates the resource if absent, replaces its
/// content if present, and stamps the given ownership marker either way.
/// Outcome classification (retryable vs permanent) is the backend's call;
/// transport failures are returned as errors instead.
#[async_trait]
pub trait ExecutorBackend: Send + Sync {
    /// Create or update one resource, tagging it with `marker`.
    async fn apply(
        &self,
        destination: &Destination,
        manifest: &ResourceManifest,
        marker: &OwnershipMarker,
    ) -> Result<BackendOutcome>;

    /// Delete one resource. Deleting a resource that is already gone is a
    /// success, so retried deletes stay idempotent.
    async fn delete(&self, destination: &Destination, id: &ResourceId) -> Result<BackendOutcome>;
}
