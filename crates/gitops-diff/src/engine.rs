//! Sync-state classification
//!
//! Walks an ordered desired manifest set against a live snapshot and assigns
//! each resource a [`SyncState`]. Live resources that do not carry this
//! application's ownership marker and have no desired counterpart are
//! excluded from the report entirely: they belong to someone else and are
//! never reported or touched.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use gitops_model::{canonical_hash, LiveResource, Ownership, ResourceId, ResourceManifest};

use crate::delta::FieldDelta;
use crate::normalize::NormalizeRules;

/// Sync state of a single resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Live content matches the desired manifest
    InSync,
    /// Live content deviates from the desired manifest
    OutOfSync,
    /// Desired but absent from the live snapshot
    Missing,
    /// Live and tracked by this application, but no longer desired
    Extra,
    /// Desired identity exists live but is owned elsewhere or untagged
    Conflict,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InSync => write!(f, "in-sync"),
            Self::OutOfSync => write!(f, "out-of-sync"),
            Self::Missing => write!(f, "missing"),
            Self::Extra => write!(f, "extra"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// Diff result for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Identity tuple
    pub id: ResourceId,
    /// Classified state
    pub state: SyncState,
    /// Field-level delta, present only for out-of-sync resources
    pub delta: Option<FieldDelta>,
    /// Owning application for conflicts (None means untagged pre-existing)
    pub foreign_owner: Option<String>,
}

/// Diff result for an application
///
/// Entries list the desired set first, in manifest order, followed by extra
/// tracked resources in live-snapshot order. Plan building relies on this
/// ordering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffReport {
    pub entries: Vec<ResourceDiff>,
}

impl DiffReport {
    /// Whether every tracked resource is in sync
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|e| e.state == SyncState::InSync)
    }

    /// Whether a sync would change anything, given the prune setting
    pub fn needs_sync(&self, prune: bool) -> bool {
        self.entries.iter().any(|e| match e.state {
            SyncState::Missing | SyncState::OutOfSync => true,
            SyncState::Extra => prune,
            SyncState::InSync | SyncState::Conflict => false,
        })
    }

    /// State of a specific resource, if it appears in the report
    pub fn state_of(&self, id: &ResourceId) -> Option<SyncState> {
        self.entries.iter().find(|e| &e.id == id).map(|e| e.state)
    }

    /// Extra tracked resources, in live-snapshot order
    pub fn extras(&self) -> impl Iterator<Item = &ResourceDiff> {
        self.entries
            .iter()
            .filter(|e| e.state == SyncState::Extra)
    }

    /// Conflicted resources
    pub fn conflicts(&self) -> impl Iterator<Item = &ResourceDiff> {
        self.entries
            .iter()
            .filter(|e| e.state == SyncState::Conflict)
    }
}

/// Compute the diff between a desired manifest set and a live snapshot.
///
/// `live` must be a snapshot fetched for this run; reports computed from a
/// cached snapshot are stale by construction. Desired identities are assumed
/// unique, since duplicate detection happens during plan validation, before
/// the diff is taken.
pub fn diff(
    application: &str,
    desired: &[ResourceManifest],
    live: &[LiveResource],
    rules: &NormalizeRules,
    default_namespace: &str,
) -> DiffReport {
    let live_by_id: HashMap<&ResourceId, &LiveResource> =
        live.iter().map(|r| (&r.id, r)).collect();

    let mut entries = Vec::new();
    let mut matched: HashSet<ResourceId> = HashSet::new();

    for manifest in desired {
        let id = manifest.id_in(default_namespace);
        let entry = match live_by_id.get(&id) {
            None => ResourceDiff {
                id: id.clone(),
                state: SyncState::Missing,
                delta: None,
                foreign_owner: None,
            },
            Some(resource) => match resource.ownership(application) {
                Ownership::Ours => classify_content(manifest, resource, rules, id.clone()),
                Ownership::Foreign(owner) => ResourceDiff {
                    id: id.clone(),
                    state: SyncState::Conflict,
                    delta: None,
                    foreign_owner: Some(owner),
                },
                Ownership::Untagged => ResourceDiff {
                    id: id.clone(),
                    state: SyncState::Conflict,
                    delta: None,
                    foreign_owner: None,
                },
            },
        };
        matched.insert(id);
        entries.push(entry);
    }

    for resource in live {
        if matched.contains(&resource.id) {
            continue;
        }
        // Only resources tagged to this application are reported as extra;
        // everything else is unmanaged and excluded.
        if resource.ownership(application) == Ownership::Ours {
            entries.push(ResourceDiff {
                id: resource.id.clone(),
                state: SyncState::Extra,
                delta: None,
                foreign_owner: None,
            });
        }
    }

    DiffReport { entries }
}

fn classify_content(
    manifest: &ResourceManifest,
    resource: &LiveResource,
    rules: &NormalizeRules,
    id: ResourceId,
) -> ResourceDiff {
    let desired_norm = rules.normalize(&manifest.content);
    let live_norm = rules.normalize(&resource.content);

    if canonical_hash(&desired_norm) == canonical_hash(&live_norm) {
        ResourceDiff {
            id,
            state: SyncState::InSync,
            delta: None,
            foreign_owner: None,
        }
    } else {
        ResourceDiff {
            id,
            state: SyncState::OutOfSync,
            delta: Some(FieldDelta::compute(&desired_norm, &live_norm)),
            foreign_owner: None,
        }
    }
}
