//! Sync plan construction.
//!
//! A plan is the bridge between a diff report and the executor: an ordered
//! list of mutations, plus the resources the plan already knows it cannot
//! touch. Plans are pure data; building one changes nothing.

use std::collections::HashSet;

use gitops_diff::{DiffReport, SyncState};
use gitops_model::{ResourceId, ResourceManifest};

use crate::application::SyncPolicy;
use crate::error::{Error, Result};
use crate::history::{FailureKind, PlanAction};

/// A single planned mutation.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Upsert this manifest at the destination
    Apply(ResourceManifest),
    /// Remove the live resource
    Delete,
}

/// One plan entry, in execution order.
#[derive(Debug, Clone)]
pub struct PlannedOp {
    /// Position in the execution order, starting at zero
    pub priority: usize,
    pub id: ResourceId,
    pub operation: Operation,
}

impl PlannedOp {
    pub fn action(&self) -> PlanAction {
        match self.operation {
            Operation::Apply(_) => PlanAction::Apply,
            Operation::Delete => PlanAction::Delete,
        }
    }

    /// One-line description, e.g. `apply default/Deployment/web`.
    pub fn describe(&self) -> String {
        format!("{} {}", self.action(), self.id)
    }
}

/// A resource the plan refuses to act on, with the refusal pre-classified.
///
/// Skips are isolable failures: they become `Failed` outcomes in the sync
/// record without stopping the rest of the plan.
#[derive(Debug, Clone)]
pub struct SkippedResource {
    pub id: ResourceId,
    pub action: PlanAction,
    pub kind: FailureKind,
    pub message: String,
}

/// An ordered set of mutations that would bring the destination in line with
/// one resolved revision.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    /// The concrete revision this plan was computed from
    pub revision: String,
    pub operations: Vec<PlannedOp>,
    pub skipped: Vec<SkippedResource>,
}

impl SyncPlan {
    /// True when there is nothing to execute and nothing to report.
    pub fn is_noop(&self) -> bool {
        self.operations.is_empty() && self.skipped.is_empty()
    }

    /// One line per operation in execution order, then one per skip.
    pub fn describe(&self) -> Vec<String> {
        self.operations
            .iter()
            .map(PlannedOp::describe)
            .chain(
                self.skipped
                    .iter()
                    .map(|skip| format!("skip {} {}: {}", skip.action, skip.id, skip.message)),
            )
            .collect()
    }
}

/// Reject manifest sets that could not execute deterministically.
///
/// Two manifests resolving to the same identity would make apply order
/// ambiguous, so the whole set is refused before any plan is built.
pub fn validate_manifest_set(
    manifests: &[ResourceManifest],
    default_namespace: &str,
) -> Result<()> {
    let mut seen = HashSet::new();
    for manifest in manifests {
        let id = manifest.id_in(default_namespace);
        if !seen.insert(id.clone()) {
            return Err(Error::ManifestInvalid {
                reason: format!("duplicate resource identity {id}"),
            });
        }
    }
    Ok(())
}

/// Build the plan for one diff report.
///
/// Applies come first, in manifest-set order. Deletes of no-longer-desired
/// resources follow, in reverse live order, and only when the policy allows
/// pruning. Conflicting resources are skipped, never mutated.
pub fn build_plan(
    revision: impl Into<String>,
    report: &DiffReport,
    desired: &[ResourceManifest],
    policy: &SyncPolicy,
    default_namespace: &str,
) -> SyncPlan {
    let mut operations = Vec::new();
    let mut skipped = Vec::new();

    for manifest in desired {
        let id = manifest.id_in(default_namespace);
        match report.state_of(&id) {
            Some(SyncState::Missing) | Some(SyncState::OutOfSync) => {
                operations.push((id, Operation::Apply(manifest.clone())));
            }
            Some(SyncState::Conflict) => {
                let owner = report
                    .conflicts()
                    .find(|entry| entry.id == id)
                    .and_then(|entry| entry.foreign_owner.clone())
                    .unwrap_or_else(|| "untagged live resource".to_string());
                skipped.push(SkippedResource {
                    id,
                    action: PlanAction::Apply,
                    kind: FailureKind::OwnershipConflict,
                    message: format!("live resource is held by {owner}"),
                });
            }
            // In-sync resources need nothing; Extra never classifies a
            // desired resource.
            _ => {}
        }
    }

    if policy.prune {
        let mut extras: Vec<ResourceId> =
            report.extras().map(|entry| entry.id.clone()).collect();
        // Reverse live order, so dependents observed later go first
        extras.reverse();
        for id in extras {
            operations.push((id, Operation::Delete));
        }
    }

    let operations = operations
        .into_iter()
        .enumerate()
        .map(|(priority, (id, operation))| PlannedOp {
            priority,
            id,
            operation,
        })
        .collect();

    SyncPlan {
        revision: revision.into(),
        operations,
        skipped,
    }
}
