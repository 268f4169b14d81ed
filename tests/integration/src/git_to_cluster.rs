//! Vertical slice over the real components: manifests committed to an
//! actual git repository, resolved through `GitSourceProvider`, reconciled
//! into a `LocalCluster` state file, with engine state in a data directory
//! that outlives the process.

use std::path::PathBuf;
use std::sync::Arc;

use git2::Repository;
use gitops_core::{
    AggregateSync, Application, Destination, EngineConfig, HealthStatus, Initiator,
    LiveStateProvider, LocalCluster, ReconcileOutcome, Reconciler, SourceRef, SyncPhase,
    SyncPolicy, SyncRecord, TrackingSelector,
};
use gitops_git::GitSourceProvider;
use gitops_model::{LiveResource, ResourceId};
use gitops_test_utils::git_fixture;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

const DEPLOYMENT_V1: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 2
";

const DEPLOYMENT_V2: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 5
";

const CONFIG: &str = r#"{
  "apiVersion": "v1",
  "kind": "ConfigMap",
  "metadata": { "name": "web-config" },
  "data": { "mode": "blue" }
}"#;

struct Slice {
    engine: Arc<Reconciler>,
    repo: Repository,
    cluster: Arc<LocalCluster>,
    repo_dir: PathBuf,
    cluster_path: String,
    data_dir: PathBuf,
    _temp: TempDir,
}

fn slice() -> Slice {
    let temp = TempDir::new().unwrap();
    let repo_dir = temp.path().join("repo");
    let repo = git_fixture::init_repo(&repo_dir);
    let cluster_path = temp
        .path()
        .join("cluster.json")
        .to_string_lossy()
        .to_string();
    let data_dir = temp.path().join("data");
    let cluster = Arc::new(LocalCluster::new());
    let engine = Arc::new(
        Reconciler::new(
            EngineConfig::new(&data_dir),
            Arc::new(GitSourceProvider::new()),
            cluster.clone(),
            cluster.clone(),
        )
        .unwrap(),
    );
    Slice {
        engine,
        repo,
        cluster,
        repo_dir,
        cluster_path,
        data_dir,
        _temp: temp,
    }
}

async fn register(s: &Slice, revision: &str) {
    let app = Application::new(
        "web",
        SourceRef::new(s.repo_dir.to_string_lossy(), revision, "deploy"),
        Destination::new(&s.cluster_path, "default"),
        SyncPolicy::default(),
    );
    s.engine.register(app).await.unwrap();
}

async fn live(s: &Slice, kind: &str, name: &str) -> LiveResource {
    let destination = Destination::new(&s.cluster_path, "default");
    s.cluster
        .list(&destination, &TrackingSelector::All)
        .await
        .unwrap()
        .into_iter()
        .find(|resource| resource.id.kind == kind && resource.id.name == name)
        .unwrap_or_else(|| panic!("no live {kind}/{name}"))
}

fn expect_synced(outcome: ReconcileOutcome) -> SyncRecord {
    match outcome {
        ReconcileOutcome::Synced(record) => record,
        other => panic!("expected a synced outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn sync_from_a_real_commit_lands_in_the_state_file() {
    let s = slice();
    let commit = git_fixture::commit_files(
        &s.repo,
        &[
            ("deploy/deployment.yaml", DEPLOYMENT_V1),
            ("deploy/web-config.json", CONFIG),
        ],
        "initial deploy",
    );
    register(&s, "main").await;

    let record = expect_synced(s.engine.sync("web").await.unwrap());
    assert_eq!(record.phase, SyncPhase::Succeeded);
    assert_eq!(record.revision, commit);
    assert_eq!(record.outcomes.len(), 2);

    let deployment = live(&s, "Deployment", "web").await;
    assert_eq!(deployment.content["spec"]["replicas"], json!(2));
    assert!(deployment.content["metadata"]["uid"].is_string());
    assert!(deployment.owner.as_ref().is_some_and(|m| m.names("web")));

    let entry = s.engine.status("web").await.unwrap();
    assert_eq!(
        entry.status.last_synced_revision.as_deref(),
        Some(commit.as_str())
    );
    assert_eq!(entry.status.sync, AggregateSync::Synced);
    assert_eq!(entry.status.health, HealthStatus::Healthy);
}

#[tokio::test]
async fn unchanged_head_is_up_to_date_on_the_second_sync() {
    let s = slice();
    git_fixture::commit_files(
        &s.repo,
        &[
            ("deploy/deployment.yaml", DEPLOYMENT_V1),
            ("deploy/web-config.json", CONFIG),
        ],
        "initial deploy",
    );
    register(&s, "main").await;
    s.engine.sync("web").await.unwrap();

    // Runtime-injected metadata in the state file must not read as drift.
    let second = s.engine.sync("web").await.unwrap();
    assert!(matches!(second, ReconcileOutcome::UpToDate));
    assert_eq!(s.engine.history("web").await.unwrap().len(), 1);
}

#[tokio::test]
async fn a_new_commit_syncs_only_what_changed() {
    let s = slice();
    git_fixture::commit_files(
        &s.repo,
        &[
            ("deploy/deployment.yaml", DEPLOYMENT_V1),
            ("deploy/web-config.json", CONFIG),
        ],
        "initial deploy",
    );
    register(&s, "main").await;
    s.engine.sync("web").await.unwrap();

    let second_commit = git_fixture::commit_files(
        &s.repo,
        &[("deploy/deployment.yaml", DEPLOYMENT_V2)],
        "scale up",
    );
    let record = expect_synced(s.engine.sync("web").await.unwrap());
    assert_eq!(record.revision, second_commit);
    // The untouched configmap stays out of the plan.
    assert_eq!(record.outcomes.len(), 1);
    assert_eq!(
        record.outcomes[0].id,
        ResourceId::new("default", "Deployment", "web")
    );

    let deployment = live(&s, "Deployment", "web").await;
    assert_eq!(deployment.content["spec"]["replicas"], json!(5));
    assert_eq!(s.engine.history("web").await.unwrap().len(), 2);
}

#[tokio::test]
async fn a_tag_pinned_application_ignores_branch_movement() {
    let s = slice();
    let tagged = git_fixture::commit_files(
        &s.repo,
        &[("deploy/deployment.yaml", DEPLOYMENT_V1)],
        "v1",
    );
    git_fixture::tag_head(&s.repo, "release-1");
    git_fixture::commit_files(&s.repo, &[("deploy/deployment.yaml", DEPLOYMENT_V2)], "v2");

    register(&s, "release-1").await;
    let record = expect_synced(s.engine.sync("web").await.unwrap());
    assert_eq!(record.revision, tagged);

    let deployment = live(&s, "Deployment", "web").await;
    assert_eq!(deployment.content["spec"]["replicas"], json!(2));
}

#[tokio::test]
async fn rollback_targets_an_exact_commit_id() {
    let s = slice();
    let first = git_fixture::commit_files(
        &s.repo,
        &[("deploy/deployment.yaml", DEPLOYMENT_V1)],
        "v1",
    );
    register(&s, "main").await;
    s.engine.sync("web").await.unwrap();
    git_fixture::commit_files(&s.repo, &[("deploy/deployment.yaml", DEPLOYMENT_V2)], "v2");
    s.engine.sync("web").await.unwrap();

    let record = expect_synced(s.engine.rollback("web", &first).await.unwrap());
    assert_eq!(record.initiator, Initiator::Rollback);
    assert_eq!(record.revision, first);

    let deployment = live(&s, "Deployment", "web").await;
    assert_eq!(deployment.content["spec"]["replicas"], json!(2));

    // The rolled-back state is the new baseline: drift checks stay quiet.
    let quiet = s.engine.check_drift("web").await.unwrap();
    assert!(matches!(quiet, ReconcileOutcome::UpToDate));
    let entry = s.engine.status("web").await.unwrap();
    assert_eq!(
        entry.status.last_synced_revision.as_deref(),
        Some(first.as_str())
    );
}

#[tokio::test]
async fn engine_state_survives_a_restart() {
    let s = slice();
    let commit = git_fixture::commit_files(
        &s.repo,
        &[("deploy/deployment.yaml", DEPLOYMENT_V1)],
        "v1",
    );
    register(&s, "main").await;
    s.engine.sync("web").await.unwrap();

    // A second engine over the same data directory, as after a process restart.
    let restarted = Arc::new(
        Reconciler::new(
            EngineConfig::new(&s.data_dir),
            Arc::new(GitSourceProvider::new()),
            s.cluster.clone(),
            s.cluster.clone(),
        )
        .unwrap(),
    );

    let entry = restarted.status("web").await.unwrap();
    assert_eq!(
        entry.status.last_synced_revision.as_deref(),
        Some(commit.as_str())
    );
    assert_eq!(entry.status.sync, AggregateSync::Synced);

    let history = restarted.history("web").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].revision, commit);

    // Nothing moved while the engine was down, so the first pass is a noop.
    let outcome = restarted.sync("web").await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::UpToDate));
}
