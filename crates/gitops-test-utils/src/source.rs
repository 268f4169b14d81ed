//! Canned source provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use gitops_core::{Error, ResolvedSource, Result, SourceProvider, SourceRef};
use gitops_model::ResourceManifest;

/// Source provider serving canned manifests keyed by revision pointer.
///
/// Realism level: FAKE. Revisions are plain string lookups with no
/// repository behind them. Point a pointer somewhere new with
/// [`set_revision`](Self::set_revision) to simulate a commit landing.
#[derive(Default)]
pub struct ScriptedSource {
    revisions: Mutex<HashMap<String, CannedRevision>>,
    unavailable: AtomicBool,
    resolves: AtomicUsize,
}

struct CannedRevision {
    concrete: String,
    documents: Vec<Value>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `pointer` (e.g. "main") at a concrete revision serving the
    /// given documents. Calling again with the same pointer replaces the
    /// previous target, which is how tests simulate a branch moving.
    pub fn set_revision(&self, pointer: &str, concrete: &str, documents: Vec<Value>) {
        self.revisions_lock().insert(
            pointer.to_string(),
            CannedRevision {
                concrete: concrete.to_string(),
                documents,
            },
        );
    }

    /// Drop a pointer so the next resolve fails with `RevisionNotFound`.
    pub fn clear_revision(&self, pointer: &str) {
        self.revisions_lock().remove(pointer);
    }

    /// Make every resolve fail with `SourceUnavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of resolves performed so far.
    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    fn revisions_lock(&self) -> MutexGuard<'_, HashMap<String, CannedRevision>> {
        self.revisions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SourceProvider for ScriptedSource {
    async fn resolve(&self, source: &SourceRef) -> Result<ResolvedSource> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::source_unavailable("source marked unavailable by test"));
        }

        let revisions = self.revisions_lock();
        let canned = revisions
            .get(&source.revision)
            .ok_or_else(|| Error::RevisionNotFound {
                revision: source.revision.clone(),
            })?;
        let manifests = canned
            .documents
            .iter()
            .cloned()
            .map(ResourceManifest::parse)
            .collect::<std::result::Result<Vec<_>, gitops_model::Error>>()?;
        Ok(ResolvedSource::new(&canned.concrete, manifests))
    }
}
