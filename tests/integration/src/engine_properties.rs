//! End-to-end engine behaviour against scripted fakes.
//!
//! These scenarios pin the engine's externally visible contract: idempotent
//! syncs, ownership safety, prune scoping, rollback, self-heal, and failure
//! reporting. Everything runs in-process against a `ScriptedSource` and an
//! `InMemoryCluster`.

use std::time::Duration;

use gitops_core::{
    AggregateSync, BackendOutcome, FailureKind, HealthStatus, Initiator, OpResult,
    ReconcileOutcome, SyncPhase, SyncPolicy,
};
use gitops_model::ResourceId;
use gitops_test_utils::{TestEngine, manifests};
use pretty_assertions::assert_eq;
use serde_json::json;

fn manual_policy() -> SyncPolicy {
    SyncPolicy {
        automated: false,
        prune: true,
        self_heal: false,
        retry_limit: 5,
    }
}

fn self_heal_policy() -> SyncPolicy {
    SyncPolicy {
        automated: true,
        prune: true,
        self_heal: true,
        retry_limit: 5,
    }
}

fn deployment_id(name: &str) -> ResourceId {
    ResourceId::new("default", "Deployment", name)
}

fn configmap_id(name: &str) -> ResourceId {
    ResourceId::new("default", "ConfigMap", name)
}

fn expect_synced(outcome: ReconcileOutcome) -> gitops_core::SyncRecord {
    match outcome {
        ReconcileOutcome::Synced(record) => record,
        other => panic!("expected a synced outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn second_sync_against_unchanged_state_is_a_noop() {
    let harness = TestEngine::new();
    harness.source.set_revision(
        "main",
        "rev-1",
        vec![
            manifests::deployment("web", 2),
            manifests::configmap("web-config", &[("retries", "3")]),
        ],
    );
    harness.register("web", "main", manual_policy()).await;

    let record = expect_synced(harness.engine.sync("web").await.unwrap());
    assert_eq!(record.phase, SyncPhase::Succeeded);
    assert_eq!(record.outcomes.len(), 2);

    let second = harness.engine.sync("web").await.unwrap();
    assert!(matches!(second, ReconcileOutcome::UpToDate));

    let entry = harness.engine.status("web").await.unwrap();
    assert_eq!(entry.status.sync, AggregateSync::Synced);
    assert_eq!(harness.engine.history("web").await.unwrap().len(), 1);
    // The backend saw exactly the two applies from the first run.
    assert_eq!(harness.cluster.operations().len(), 2);
}

#[tokio::test]
async fn noop_sync_at_a_new_revision_advances_the_recorded_revision() {
    let harness = TestEngine::new();
    let docs = vec![manifests::deployment("web", 2)];
    harness.source.set_revision("main", "rev-1", docs.clone());
    harness.register("web", "main", manual_policy()).await;
    harness.engine.sync("web").await.unwrap();

    // A commit that leaves the rendered manifests untouched.
    harness.source.set_revision("main", "rev-2", docs);
    let outcome = harness.engine.sync("web").await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::UpToDate));

    let entry = harness.engine.status("web").await.unwrap();
    assert_eq!(entry.status.last_synced_revision.as_deref(), Some("rev-2"));
    // Still no second record: nothing was executed.
    assert_eq!(harness.engine.history("web").await.unwrap().len(), 1);
}

#[tokio::test]
async fn foreign_and_untagged_resources_are_never_touched() {
    let harness = TestEngine::new();
    harness.cluster.seed_foreign(
        "billing",
        "default",
        manifests::deployment("billing-api", 1),
    );
    harness
        .cluster
        .seed_untagged("default", manifests::configmap("hand-made", &[("k", "v")]));
    harness
        .source
        .set_revision("main", "rev-1", vec![manifests::deployment("web", 2)]);
    harness.register("web", "main", manual_policy()).await;

    let record = expect_synced(harness.engine.sync("web").await.unwrap());
    assert_eq!(record.phase, SyncPhase::Succeeded);
    assert_eq!(record.outcomes.len(), 1);
    assert_eq!(record.outcomes[0].id, deployment_id("web"));

    // Prune was on, yet neither pre-existing resource was touched.
    assert!(
        harness
            .cluster
            .owner(&deployment_id("billing-api"))
            .is_some_and(|marker| marker.names("billing"))
    );
    assert!(harness.cluster.content(&configmap_id("hand-made")).is_some());
    assert_eq!(
        harness.cluster.operations(),
        vec!["apply default/Deployment/web".to_string()]
    );
}

#[tokio::test]
async fn conflicting_desired_resource_is_skipped_and_reported() {
    let harness = TestEngine::new();
    harness
        .cluster
        .seed_foreign("billing", "default", manifests::deployment("web", 1));
    harness.source.set_revision(
        "main",
        "rev-1",
        vec![
            manifests::deployment("web", 2),
            manifests::configmap("web-config", &[("retries", "3")]),
        ],
    );
    harness.register("web", "main", manual_policy()).await;

    let record = expect_synced(harness.engine.sync("web").await.unwrap());
    assert_eq!(record.phase, SyncPhase::Failed);

    let conflict = record
        .outcomes
        .iter()
        .find(|outcome| outcome.id == deployment_id("web"))
        .expect("conflicting resource missing from the record");
    match &conflict.result {
        OpResult::Failed { kind, message } => {
            assert_eq!(*kind, FailureKind::OwnershipConflict);
            assert!(message.contains("billing"));
        }
        other => panic!("expected a failed outcome, got {other:?}"),
    }

    // The rest of the set still applied; the held resource kept its owner.
    assert!(harness.cluster.content(&configmap_id("web-config")).is_some());
    assert!(
        harness
            .cluster
            .owner(&deployment_id("web"))
            .is_some_and(|marker| marker.names("billing"))
    );
    let entry = harness.engine.status("web").await.unwrap();
    assert_eq!(entry.status.sync, AggregateSync::OutOfSync);
}

#[tokio::test]
async fn prune_removes_only_resources_the_marker_names() {
    let harness = TestEngine::new();
    harness.cluster.seed_foreign(
        "billing",
        "default",
        manifests::configmap("billing-config", &[("k", "v")]),
    );
    harness.source.set_revision(
        "main",
        "rev-1",
        vec![
            manifests::deployment("web", 2),
            manifests::configmap("web-config", &[("retries", "3")]),
        ],
    );
    harness.register("web", "main", manual_policy()).await;
    harness.engine.sync("web").await.unwrap();

    // The configmap leaves the desired set.
    harness
        .source
        .set_revision("main", "rev-2", vec![manifests::deployment("web", 2)]);
    let record = expect_synced(harness.engine.sync("web").await.unwrap());
    assert_eq!(record.phase, SyncPhase::Succeeded);
    assert_eq!(record.outcomes.len(), 1);
    assert_eq!(record.outcomes[0].id, configmap_id("web-config"));
    assert_eq!(record.outcomes[0].result, OpResult::Deleted);

    assert!(harness.cluster.content(&configmap_id("web-config")).is_none());
    // The other application's configmap was not prune-eligible.
    assert!(
        harness
            .cluster
            .content(&configmap_id("billing-config"))
            .is_some()
    );
}

#[tokio::test]
async fn without_prune_owned_extras_are_reported_not_deleted() {
    let harness = TestEngine::new();
    let mut policy = manual_policy();
    policy.prune = false;
    harness.source.set_revision(
        "main",
        "rev-1",
        vec![
            manifests::deployment("web", 2),
            manifests::configmap("web-config", &[("retries", "3")]),
        ],
    );
    harness.register("web", "main", policy).await;
    harness.engine.sync("web").await.unwrap();

    harness
        .source
        .set_revision("main", "rev-2", vec![manifests::deployment("web", 2)]);
    let outcome = harness.engine.sync("web").await.unwrap();
    let ReconcileOutcome::Drifted(summary) = outcome else {
        panic!("expected a drifted outcome, got {outcome:?}");
    };
    assert_eq!(summary.extra, 1);
    assert_eq!(summary.out_of_sync, 0);

    // The extra survived, and nothing was recorded for the run.
    assert!(harness.cluster.content(&configmap_id("web-config")).is_some());
    assert_eq!(harness.engine.history("web").await.unwrap().len(), 1);

    let entry = harness.engine.status("web").await.unwrap();
    assert_eq!(entry.status.sync, AggregateSync::OutOfSync);
    assert!(entry.status.drift.is_some());
}

#[tokio::test]
async fn rollback_restores_a_previous_revision_cleanly() {
    let harness = TestEngine::new();
    let v1 = vec![manifests::deployment("web", 2)];
    harness.source.set_revision("main", "rev-1", v1.clone());
    // Concrete revisions resolve to themselves, the way commit ids do.
    harness.source.set_revision("rev-1", "rev-1", v1);
    harness.register("web", "main", manual_policy()).await;
    harness.engine.sync("web").await.unwrap();

    harness
        .source
        .set_revision("main", "rev-2", vec![manifests::deployment("web", 5)]);
    harness.engine.sync("web").await.unwrap();

    let record = expect_synced(harness.engine.rollback("web", "rev-1").await.unwrap());
    assert_eq!(record.initiator, Initiator::Rollback);
    assert_eq!(record.revision, "rev-1");
    assert_eq!(record.phase, SyncPhase::Succeeded);

    let content = harness.cluster.content(&deployment_id("web")).unwrap();
    assert_eq!(content["spec"]["replicas"], json!(2));

    // The live state now matches rev-1 exactly: replaying it is a noop.
    let again = harness.engine.rollback("web", "rev-1").await.unwrap();
    assert!(matches!(again, ReconcileOutcome::UpToDate));
    let entry = harness.engine.status("web").await.unwrap();
    assert_eq!(entry.status.last_synced_revision.as_deref(), Some("rev-1"));
}

#[tokio::test]
async fn self_heal_restores_the_last_synced_state() {
    let harness = TestEngine::new();
    harness
        .source
        .set_revision("main", "rev-1", vec![manifests::deployment("web", 2)]);
    harness.register("web", "main", self_heal_policy()).await;
    harness.engine.sync("web").await.unwrap();

    harness.cluster.mutate(&deployment_id("web"), |content| {
        content["spec"]["replicas"] = json!(9);
    });

    let record = expect_synced(harness.engine.check_drift("web").await.unwrap());
    assert_eq!(record.initiator, Initiator::Automated);
    assert_eq!(record.revision, "rev-1");
    assert_eq!(record.phase, SyncPhase::Succeeded);

    let content = harness.cluster.content(&deployment_id("web")).unwrap();
    assert_eq!(content["spec"]["replicas"], json!(2));

    // Converged again: the next pass finds nothing.
    let quiet = harness.engine.check_drift("web").await.unwrap();
    assert!(matches!(quiet, ReconcileOutcome::UpToDate));
    let entry = harness.engine.status("web").await.unwrap();
    assert!(entry.status.drift.is_none());
    assert_eq!(entry.status.sync, AggregateSync::Synced);
}

#[tokio::test]
async fn drift_is_reported_but_not_healed_without_self_heal() {
    let harness = TestEngine::new();
    harness
        .source
        .set_revision("main", "rev-1", vec![manifests::deployment("web", 2)]);
    harness.register("web", "main", manual_policy()).await;
    harness.engine.sync("web").await.unwrap();

    harness.cluster.mutate(&deployment_id("web"), |content| {
        content["spec"]["replicas"] = json!(9);
    });

    let outcome = harness.engine.check_drift("web").await.unwrap();
    let ReconcileOutcome::Drifted(summary) = outcome else {
        panic!("expected a drifted outcome, got {outcome:?}");
    };
    assert_eq!(summary.out_of_sync, 1);

    // Untouched: reporting is the whole job without self-heal.
    let content = harness.cluster.content(&deployment_id("web")).unwrap();
    assert_eq!(content["spec"]["replicas"], json!(9));

    let entry = harness.engine.status("web").await.unwrap();
    assert_eq!(entry.status.sync, AggregateSync::OutOfSync);
    assert!(entry.status.drift.is_some());
}

#[tokio::test]
async fn deleted_resources_are_healed_back() {
    let harness = TestEngine::new();
    harness.source.set_revision(
        "main",
        "rev-1",
        vec![
            manifests::deployment("web", 2),
            manifests::configmap("web-config", &[("retries", "3")]),
        ],
    );
    harness.register("web", "main", self_heal_policy()).await;
    harness.engine.sync("web").await.unwrap();

    harness.cluster.remove_live(&configmap_id("web-config"));

    let record = expect_synced(harness.engine.check_drift("web").await.unwrap());
    assert_eq!(record.phase, SyncPhase::Succeeded);
    assert!(harness.cluster.content(&configmap_id("web-config")).is_some());
}

#[tokio::test]
async fn partial_failure_reports_every_resource() {
    let harness = TestEngine::new();
    harness.source.set_revision(
        "main",
        "rev-1",
        vec![
            manifests::deployment("frontend", 2),
            manifests::deployment("broken", 1),
            manifests::deployment("backend", 3),
        ],
    );
    harness.register("web", "main", manual_policy()).await;
    harness.cluster.script(
        deployment_id("broken"),
        BackendOutcome::permanent("spec.selector is immutable"),
    );

    let record = expect_synced(harness.engine.sync("web").await.unwrap());
    assert_eq!(record.phase, SyncPhase::Failed);
    assert_eq!(record.outcomes.len(), 3);
    assert_eq!(record.outcomes[0].result, OpResult::Applied);
    match &record.outcomes[1].result {
        OpResult::Failed { kind, message } => {
            assert_eq!(*kind, FailureKind::PermanentFailure);
            assert!(message.contains("immutable"));
        }
        other => panic!("expected a failed outcome, got {other:?}"),
    }
    assert_eq!(record.outcomes[2].result, OpResult::NotAttempted);

    let entry = harness.engine.status("web").await.unwrap();
    assert_eq!(entry.status.sync, AggregateSync::OutOfSync);
    assert_eq!(entry.status.health, HealthStatus::Degraded);

    // Once the failure clears, the next sync completes the set.
    let record = expect_synced(harness.engine.sync("web").await.unwrap());
    assert_eq!(record.phase, SyncPhase::Succeeded);
    assert_eq!(record.outcomes.len(), 2);
    let entry = harness.engine.status("web").await.unwrap();
    assert_eq!(entry.status.sync, AggregateSync::Synced);
}

#[tokio::test]
async fn retryable_failures_are_retried_under_the_policy() {
    let harness = TestEngine::new();
    harness
        .source
        .set_revision("main", "rev-1", vec![manifests::deployment("web", 2)]);
    harness.register("web", "main", manual_policy()).await;
    harness.cluster.script(
        deployment_id("web"),
        BackendOutcome::retryable("destination is briefly busy"),
    );

    let record = expect_synced(harness.engine.sync("web").await.unwrap());
    assert_eq!(record.phase, SyncPhase::Succeeded);
    assert_eq!(record.outcomes[0].result, OpResult::Applied);
    // One failed attempt plus the retry that landed.
    assert_eq!(harness.cluster.operations().len(), 2);
}

#[tokio::test]
async fn started_engine_reconciles_automated_apps_in_background() {
    let harness = TestEngine::new();
    harness
        .source
        .set_revision("main", "rev-1", vec![manifests::deployment("web", 2)]);
    harness.engine.start();
    harness.register("web", "main", self_heal_policy()).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let entry = harness.engine.status("web").await.unwrap();
        if entry.status.sync == AggregateSync::Synced {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker did not reconcile in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(harness.cluster.content(&deployment_id("web")).is_some());
    assert_eq!(harness.engine.history("web").await.unwrap().len(), 1);
    harness.engine.shutdown().await;
}

#[tokio::test]
async fn gated_apps_surface_pending_plans_instead_of_executing() {
    let harness = TestEngine::new();
    harness
        .source
        .set_revision("main", "rev-1", vec![manifests::deployment("web", 2)]);
    harness.engine.start();
    harness.register("web", "main", manual_policy()).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let pending = loop {
        let entry = harness.engine.status("web").await.unwrap();
        if let Some(pending) = entry.status.pending {
            break pending;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker did not surface a plan in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    assert_eq!(pending.revision, "rev-1");
    assert_eq!(pending.operations, vec!["apply default/Deployment/web"]);
    // Nothing executed and nothing recorded while gated.
    assert!(harness.cluster.content(&deployment_id("web")).is_none());
    assert!(harness.engine.history("web").await.unwrap().is_empty());

    // The operator pulls the trigger.
    let record = expect_synced(harness.engine.sync("web").await.unwrap());
    assert_eq!(record.initiator, Initiator::Manual);
    let entry = harness.engine.status("web").await.unwrap();
    assert!(entry.status.pending.is_none());
    harness.engine.shutdown().await;
}
