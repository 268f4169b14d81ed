//! In-process destination fake.
//!
//! [`InMemoryCluster`] implements both destination seams over a plain vector
//! behind a mutex. Apply and delete results can be scripted per resource to
//! exercise retry and abort paths, and live content can be edited out of
//! band to simulate drift.
//!
//! Realism level: FAKE. Content is stored exactly as applied, with no
//! runtime-injected metadata and no status subtree, so freshly applied
//! resources assess as `Unknown` health until a test sets a status. Tests
//! that need a destination behaving like a converging runtime should run
//! [`gitops_core::LocalCluster`] against a temp directory instead.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use gitops_core::{
    BackendOutcome, Destination, Error, ExecutorBackend, LiveStateProvider, Result,
    TrackingSelector,
};
use gitops_model::{LiveResource, OwnershipMarker, ResourceId, ResourceManifest};

/// Scriptable in-memory destination implementing both destination seams.
#[derive(Default)]
pub struct InMemoryCluster {
    /// Live resources in creation order.
    resources: Mutex<Vec<LiveResource>>,
    /// Queued outcomes, consumed one per apply/delete touching the id.
    scripted: Mutex<HashMap<ResourceId, VecDeque<BackendOutcome>>>,
    /// Every apply and delete performed, in order, including scripted ones.
    operations: Mutex<Vec<String>>,
    unreachable: AtomicBool,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a resource into live state without going through `apply`.
    pub fn seed(&self, resource: LiveResource) {
        self.resources_lock().push(resource);
    }

    /// Seed a resource tagged as owned by another application.
    ///
    /// # Panics
    /// Panics if `doc` is not a valid manifest document.
    pub fn seed_foreign(&self, owner: &str, namespace: &str, doc: Value) {
        self.seed_doc(namespace, doc, Some(OwnershipMarker::new(owner)));
    }

    /// Seed an untagged resource, as if created by hand at the destination.
    ///
    /// # Panics
    /// Panics if `doc` is not a valid manifest document.
    pub fn seed_untagged(&self, namespace: &str, doc: Value) {
        self.seed_doc(namespace, doc, None);
    }

    fn seed_doc(&self, namespace: &str, doc: Value, owner: Option<OwnershipMarker>) {
        let manifest = ResourceManifest::parse(doc)
            .unwrap_or_else(|e| panic!("seed: invalid manifest document: {e}"));
        self.seed(LiveResource {
            id: manifest.id_in(namespace),
            api_version: manifest.api_version.clone(),
            content: manifest.content,
            owner,
        });
    }

    /// Queue an outcome for the next apply or delete touching `id`.
    ///
    /// Outcomes are consumed in order; once the queue is empty the operation
    /// succeeds normally. A scripted outcome does not modify live state.
    pub fn script(&self, id: ResourceId, outcome: BackendOutcome) {
        self.scripted_lock().entry(id).or_default().push_back(outcome);
    }

    /// Make every call fail with `DestinationUnreachable` until cleared.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Overwrite the status subtree of a live resource.
    ///
    /// # Panics
    /// Panics if no live resource has that id.
    pub fn set_status(&self, id: &ResourceId, status: Value) {
        self.mutate(id, |content| content["status"] = status);
    }

    /// Edit the live content of a resource in place, simulating an
    /// out-of-band change by another actor.
    ///
    /// # Panics
    /// Panics if no live resource has that id.
    pub fn mutate(&self, id: &ResourceId, edit: impl FnOnce(&mut Value)) {
        let mut resources = self.resources_lock();
        let Some(entry) = resources.iter_mut().find(|resource| &resource.id == id) else {
            panic!("mutate: no live resource {id}");
        };
        edit(&mut entry.content);
    }

    /// Remove a resource from live state without going through `delete`.
    pub fn remove_live(&self, id: &ResourceId) {
        self.resources_lock().retain(|resource| &resource.id != id);
    }

    /// Every apply and delete the backend has performed, in order.
    pub fn operations(&self) -> Vec<String> {
        self.operations_lock().clone()
    }

    /// Current live content of a resource, if present.
    pub fn content(&self, id: &ResourceId) -> Option<Value> {
        self.resources_lock()
            .iter()
            .find(|resource| &resource.id == id)
            .map(|resource| resource.content.clone())
    }

    /// Current ownership marker of a resource, if present and tagged.
    pub fn owner(&self, id: &ResourceId) -> Option<OwnershipMarker> {
        self.resources_lock()
            .iter()
            .find(|resource| &resource.id == id)
            .and_then(|resource| resource.owner.clone())
    }

    fn next_scripted(&self, id: &ResourceId) -> Option<BackendOutcome> {
        self.scripted_lock()
            .get_mut(id)
            .and_then(VecDeque::pop_front)
    }

    fn check_reachable(&self, destination: &Destination) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::DestinationUnreachable {
                destination: destination.cluster.clone(),
                reason: "cluster marked unreachable by test".to_string(),
            });
        }
        Ok(())
    }

    fn resources_lock(&self) -> MutexGuard<'_, Vec<LiveResource>> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scripted_lock(&self) -> MutexGuard<'_, HashMap<ResourceId, VecDeque<BackendOutcome>>> {
        self.scripted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn operations_lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.operations.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LiveStateProvider for InMemoryCluster {
    async fn list(
        &self,
        destination: &Destination,
        selector: &TrackingSelector,
    ) -> Result<Vec<LiveResource>> {
        self.check_reachable(destination)?;
        let resources = self.resources_lock();
        Ok(resources
            .iter()
            .filter(|resource| match selector {
                TrackingSelector::All => true,
                TrackingSelector::Application(app) => resource
                    .owner
                    .as_ref()
                    .is_some_and(|marker| marker.names(app)),
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ExecutorBackend for InMemoryCluster {
    async fn apply(
        &self,
        destination: &Destination,
        manifest: &ResourceManifest,
        marker: &OwnershipMarker,
    ) -> Result<BackendOutcome> {
        self.check_reachable(destination)?;
        let id = manifest.id_in(&destination.namespace);
        self.operations_lock().push(format!("apply {id}"));
        if let Some(outcome) = self.next_scripted(&id) {
            return Ok(outcome);
        }

        let resource = LiveResource {
            id: id.clone(),
            api_version: manifest.api_version.clone(),
            content: manifest.content.clone(),
            owner: Some(marker.clone()),
        };
        let mut resources = self.resources_lock();
        match resources.iter_mut().find(|existing| existing.id == id) {
            Some(existing) => *existing = resource,
            None => resources.push(resource),
        }
        Ok(BackendOutcome::Success)
    }

    async fn delete(&self, destination: &Destination, id: &ResourceId) -> Result<BackendOutcome> {
        self.check_reachable(destination)?;
        self.operations_lock().push(format!("delete {id}"));
        if let Some(outcome) = self.next_scripted(id) {
            return Ok(outcome);
        }
        self.resources_lock().retain(|resource| &resource.id != id);
        Ok(BackendOutcome::Success)
    }
}
