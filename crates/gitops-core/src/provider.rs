//! Source provider abstraction.
//!
//! A source provider turns a [`SourceRef`] into a concrete revision plus the
//! ordered manifest set found at that revision. The engine never reads the
//! source itself; everything desired-state flows through this trait.

use async_trait::async_trait;

use gitops_model::ResourceManifest;

use crate::application::SourceRef;
use crate::error::Result;

/// A revision pointer resolved to concrete content.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    /// The concrete revision the pointer resolved to (e.g. a commit id)
    pub revision: String,

    /// Parsed manifests in source order
    pub manifests: Vec<ResourceManifest>,
}

impl ResolvedSource {
    pub fn new(revision: impl Into<String>, manifests: Vec<ResourceManifest>) -> Self {
        Self {
            revision: revision.into(),
            manifests,
        }
    }
}

/// Trait for resolving desired state out of a configuration source.
///
/// Implementations must be deterministic for a given concrete revision: the
/// same commit yields the same manifests in the same order. Failures map to
/// [`Error::SourceUnavailable`](crate::Error::SourceUnavailable),
/// [`Error::RevisionNotFound`](crate::Error::RevisionNotFound), or
/// [`Error::ManifestInvalid`](crate::Error::ManifestInvalid).
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Resolve a revision pointer (branch, tag, or commit id) to a concrete
    /// revision and the manifest set stored under `source.path`.
    async fn resolve(&self, source: &SourceRef) -> Result<ResolvedSource>;
}
