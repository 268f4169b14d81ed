//! File-backed destination for local development.
//!
//! `LocalCluster` keeps an entire destination in one JSON state file, named
//! by `Destination::cluster`. It behaves like a tiny, instantly converging
//! runtime: applies land with the usual runtime-injected metadata and a
//! status that already reflects the applied content. Write cycles serialize
//! per state file, so applications sharing a destination can reconcile on
//! parallel workers without losing updates. Editing the state file out of
//! band is exactly how drift is produced in local setups.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use gitops_model::{LiveResource, OwnershipMarker, ResourceId, ResourceManifest};

use crate::application::Destination;
use crate::backend::{BackendOutcome, ExecutorBackend, LiveStateProvider, TrackingSelector};
use crate::error::{Error, Result};
use crate::persist;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ClusterState {
    /// Monotonic write counter, stamped into `resourceVersion`
    sequence: u64,
    /// Keyed by `namespace/Kind/name`; BTreeMap keeps listings deterministic
    #[serde(default)]
    resources: BTreeMap<String, StoredResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredResource {
    id: ResourceId,
    api_version: String,
    content: Value,
    owner: Option<OwnershipMarker>,
}

/// Per-state-file writer locks. Handles are stateless and freely cloned,
/// so mutual exclusion lives at process scope, keyed by path. A lock on
/// the state file itself would not survive the rename in `write_atomic`.
static STATE_LOCKS: LazyLock<Mutex<HashMap<String, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn state_lock(cluster: &str) -> Arc<Mutex<()>> {
    STATE_LOCKS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(cluster.to_string())
        .or_default()
        .clone()
}

/// A destination backed by a single JSON state file.
#[derive(Debug, Clone, Default)]
pub struct LocalCluster;

impl LocalCluster {
    pub fn new() -> Self {
        Self
    }

    fn load(&self, destination: &Destination) -> Result<ClusterState> {
        let path = Path::new(&destination.cluster);
        let content = persist::read_locked(path).map_err(|e| unreachable_error(destination, e))?;
        match content {
            None => Ok(ClusterState::default()),
            Some(text) => serde_json::from_str(&text)
                .map_err(|e| unreachable_error(destination, Error::Json(e))),
        }
    }

    fn save(&self, destination: &Destination, state: &ClusterState) -> Result<()> {
        let text =
            serde_json::to_string_pretty(state).map_err(|e| unreachable_error(destination, Error::Json(e)))?;
        persist::write_atomic(Path::new(&destination.cluster), text.as_bytes())
            .map_err(|e| unreachable_error(destination, e))
    }
}

fn unreachable_error(destination: &Destination, cause: Error) -> Error {
    Error::DestinationUnreachable {
        destination: destination.cluster.clone(),
        reason: cause.to_string(),
    }
}

/// Stamp the metadata a real runtime would inject, carrying identity fields
/// over from the previous incarnation where they exist.
fn inject_runtime_metadata(
    content: &mut Value,
    id: &ResourceId,
    sequence: u64,
    previous: Option<&StoredResource>,
) {
    let Some(obj) = content.as_object_mut() else {
        return;
    };
    let Some(metadata) = obj
        .entry("metadata")
        .or_insert_with(|| json!({}))
        .as_object_mut()
    else {
        return;
    };

    let prev_meta = previous.and_then(|r| r.content.get("metadata"));
    let carried = |field: &str| prev_meta.and_then(|m| m.get(field)).cloned();

    metadata.insert("namespace".into(), json!(id.namespace));
    metadata.insert(
        "uid".into(),
        carried("uid").unwrap_or_else(|| json!(Uuid::new_v4().to_string())),
    );
    metadata.insert(
        "creationTimestamp".into(),
        carried("creationTimestamp").unwrap_or_else(|| json!(Utc::now().to_rfc3339())),
    );
    metadata.insert("resourceVersion".into(), json!(sequence.to_string()));

    let generation = prev_meta
        .and_then(|m| m.get("generation"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    metadata.insert("generation".into(), json!(generation + 1));
}

/// Fabricate an already converged status for the applied spec.
fn converged_status(content: &Value) -> Value {
    let mut status = json!({
        "conditions": [ { "type": "Ready", "status": "True" } ],
    });
    if let Some(replicas) = content
        .get("spec")
        .and_then(|spec| spec.get("replicas"))
        .and_then(Value::as_u64)
    {
        status["readyReplicas"] = json!(replicas);
    }
    status
}

#[async_trait]
impl LiveStateProvider for LocalCluster {
    async fn list(
        &self,
        destination: &Destination,
        selector: &TrackingSelector,
    ) -> Result<Vec<LiveResource>> {
        let state = self.load(destination)?;
        let resources = state
            .resources
            .into_values()
            .filter(|resource| match selector {
                TrackingSelector::All => true,
                TrackingSelector::Application(app) => resource
                    .owner
                    .as_ref()
                    .is_some_and(|marker| marker.names(app)),
            })
            .map(|resource| LiveResource {
                id: resource.id,
                api_version: resource.api_version,
                content: resource.content,
                owner: resource.owner,
            })
            .collect();
        Ok(resources)
    }
}

#[async_trait]
impl ExecutorBackend for LocalCluster {
    async fn apply(
        &self,
        destination: &Destination,
        manifest: &ResourceManifest,
        marker: &OwnershipMarker,
    ) -> Result<BackendOutcome> {
        let lock = state_lock(&destination.cluster);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut state = self.load(destination)?;
        let id = manifest.id_in(&destination.namespace);
        let key = id.to_string();

        state.sequence += 1;
        let mut content = manifest.content.clone();
        inject_runtime_metadata(&mut content, &id, state.sequence, state.resources.get(&key));
        let status = converged_status(&content);
        content["status"] = status;

        state.resources.insert(
            key,
            StoredResource {
                id,
                api_version: manifest.api_version.clone(),
                content,
                owner: Some(marker.clone()),
            },
        );
        self.save(destination, &state)?;
        Ok(BackendOutcome::Success)
    }

    async fn delete(&self, destination: &Destination, id: &ResourceId) -> Result<BackendOutcome> {
        let lock = state_lock(&destination.cluster);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut state = self.load(destination)?;
        // Deleting what is already gone is a success, not a failure
        if state.resources.remove(&id.to_string()).is_some() {
            state.sequence += 1;
            self.save(destination, &state)?;
        }
        Ok(BackendOutcome::Success)
    }
}
