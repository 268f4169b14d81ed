//! JSON-RPC method handlers
//!
//! Thin dispatch over the reconciler: each handler parses its params, calls
//! one engine operation, and shapes the wire JSON. No engine semantics live
//! here.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use gitops_core::{Application, Destination, ReconcileOutcome, Reconciler, SourceRef, SyncPolicy};

use crate::{Error, Result};

/// Dispatch a JSON-RPC method call to its handler.
pub async fn handle_request(
    engine: &Arc<Reconciler>,
    method: &str,
    params: Value,
) -> Result<Value> {
    match method {
        // Application lifecycle
        "app/register" => handle_register(engine, params).await,
        "app/deregister" => handle_deregister(engine, params).await,
        "app/list" => handle_list(engine).await,

        // Reconciliation
        "app/sync" => handle_sync(engine, params).await,
        "app/rollback" => handle_rollback(engine, params).await,
        "app/refresh" => handle_refresh(engine, params).await,

        // Observation
        "app/status" => handle_status(engine, params).await,
        "app/history" => handle_history(engine, params).await,

        _ => Err(Error::UnknownMethod(method.to_string())),
    }
}

fn parse_params<T>(params: Value) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(params).map_err(|e| Error::invalid_params(e.to_string()))
}

/// Wire shape for a reconcile outcome.
fn outcome_json(name: &str, outcome: ReconcileOutcome) -> Value {
    match outcome {
        ReconcileOutcome::Synced(record) => json!({
            "application": name,
            "outcome": "synced",
            "record": record,
        }),
        ReconcileOutcome::Planned(plan) => json!({
            "application": name,
            "outcome": "planned",
            "plan": plan,
        }),
        ReconcileOutcome::Drifted(drift) => json!({
            "application": name,
            "outcome": "drifted",
            "drift": drift,
        }),
        ReconcileOutcome::UpToDate => json!({
            "application": name,
            "outcome": "up-to-date",
        }),
    }
}

// ============================================================================
// Application lifecycle
// ============================================================================

/// Arguments for app/register
#[derive(Debug, Deserialize)]
struct RegisterArgs {
    name: String,
    repo: String,
    revision: String,
    #[serde(default = "default_path")]
    path: String,
    cluster: String,
    #[serde(default = "default_namespace")]
    namespace: String,
    #[serde(default)]
    ignore_paths: Vec<String>,
    #[serde(default)]
    policy: SyncPolicy,
}

fn default_path() -> String {
    ".".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

async fn handle_register(engine: &Arc<Reconciler>, params: Value) -> Result<Value> {
    let args: RegisterArgs = parse_params(params)?;
    let app = Application::new(
        &args.name,
        SourceRef::new(&args.repo, &args.revision, &args.path),
        Destination::new(&args.cluster, &args.namespace),
        args.policy,
    )
    .with_ignore_paths(args.ignore_paths);

    engine.register(app.clone()).await?;
    Ok(json!({
        "registered": args.name,
        "application": serde_json::to_value(&app)?,
    }))
}

async fn handle_deregister(engine: &Arc<Reconciler>, params: Value) -> Result<Value> {
    let args: NameArgs = parse_params(params)?;
    engine.deregister(&args.name).await?;
    Ok(json!({ "deregistered": args.name }))
}

async fn handle_list(engine: &Arc<Reconciler>) -> Result<Value> {
    let entries = engine.list().await;
    Ok(json!({
        "count": entries.len(),
        "applications": entries,
    }))
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Arguments for methods addressing one application
#[derive(Debug, Deserialize)]
struct NameArgs {
    name: String,
}

async fn handle_sync(engine: &Arc<Reconciler>, params: Value) -> Result<Value> {
    let args: NameArgs = parse_params(params)?;
    let outcome = engine.sync(&args.name).await?;
    Ok(outcome_json(&args.name, outcome))
}

/// Arguments for app/rollback
#[derive(Debug, Deserialize)]
struct RollbackArgs {
    name: String,
    revision: String,
}

async fn handle_rollback(engine: &Arc<Reconciler>, params: Value) -> Result<Value> {
    let args: RollbackArgs = parse_params(params)?;
    let outcome = engine.rollback(&args.name, &args.revision).await?;
    Ok(outcome_json(&args.name, outcome))
}

async fn handle_refresh(engine: &Arc<Reconciler>, params: Value) -> Result<Value> {
    let args: NameArgs = parse_params(params)?;
    engine.refresh(&args.name)?;
    Ok(json!({ "application": args.name, "queued": true }))
}

// ============================================================================
// Observation
// ============================================================================

async fn handle_status(engine: &Arc<Reconciler>, params: Value) -> Result<Value> {
    let args: NameArgs = parse_params(params)?;
    let entry = engine.status(&args.name).await?;
    Ok(serde_json::to_value(entry)?)
}

/// Arguments for app/history
#[derive(Debug, Deserialize)]
struct HistoryArgs {
    name: String,
    /// Keep only the most recent records
    #[serde(default)]
    limit: Option<usize>,
}

async fn handle_history(engine: &Arc<Reconciler>, params: Value) -> Result<Value> {
    let args: HistoryArgs = parse_params(params)?;
    let mut records = engine.history(&args.name).await?;
    if let Some(limit) = args.limit {
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
    }
    Ok(json!({
        "application": args.name,
        "count": records.len(),
        "records": records,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitops_model::ResourceId;
    use gitops_test_utils::{TestEngine, harness, manifests};
    use pretty_assertions::assert_eq;

    async fn register_web(harness: &TestEngine, automated: bool) -> Value {
        handle_request(
            &harness.engine,
            "app/register",
            json!({
                "name": "web",
                "repo": "scripted",
                "revision": "main",
                "cluster": harness::CLUSTER,
                "policy": {"automated": automated, "prune": true}
            }),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn register_then_list() {
        let harness = TestEngine::new();
        harness
            .source
            .set_revision("main", "rev-1", vec![manifests::deployment("web", 2)]);

        let registered = register_web(&harness, false).await;
        assert_eq!(registered["registered"], "web");
        assert_eq!(registered["application"]["source"]["repo"], "scripted");

        let listed = handle_request(&harness.engine, "app/list", Value::Null)
            .await
            .unwrap();
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["applications"][0]["app"]["name"], "web");
    }

    #[tokio::test]
    async fn register_applies_param_defaults() {
        let harness = TestEngine::new();
        let registered = register_web(&harness, false).await;

        let app = &registered["application"];
        assert_eq!(app["source"]["path"], ".");
        assert_eq!(app["destination"]["namespace"], "default");
        assert_eq!(app["policy"]["automated"], false);
        assert_eq!(app["policy"]["self_heal"], false);
    }

    #[tokio::test]
    async fn register_rejects_duplicates() {
        let harness = TestEngine::new();
        register_web(&harness, false).await;

        let err = handle_request(
            &harness.engine,
            "app/register",
            json!({"name": "web", "repo": "scripted", "revision": "main", "cluster": harness::CLUSTER}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), -32002);
    }

    #[tokio::test]
    async fn sync_applies_manifests_and_returns_the_record() {
        let harness = TestEngine::new();
        harness.source.set_revision(
            "main",
            "rev-1",
            vec![
                manifests::deployment("web", 2),
                manifests::configmap("web-config", &[("retries", "3")]),
            ],
        );
        register_web(&harness, false).await;

        let value = handle_request(&harness.engine, "app/sync", json!({"name": "web"}))
            .await
            .unwrap();

        assert_eq!(value["outcome"], "synced");
        assert_eq!(value["record"]["phase"], "succeeded");
        assert_eq!(value["record"]["revision"], "rev-1");
        assert_eq!(value["record"]["outcomes"].as_array().unwrap().len(), 2);
        assert!(
            harness
                .cluster
                .content(&ResourceId::new("default", "Deployment", "web"))
                .is_some()
        );
    }

    #[tokio::test]
    async fn second_sync_is_up_to_date() {
        let harness = TestEngine::new();
        harness
            .source
            .set_revision("main", "rev-1", vec![manifests::deployment("web", 2)]);
        register_web(&harness, false).await;

        handle_request(&harness.engine, "app/sync", json!({"name": "web"}))
            .await
            .unwrap();
        let value = handle_request(&harness.engine, "app/sync", json!({"name": "web"}))
            .await
            .unwrap();
        assert_eq!(value["outcome"], "up-to-date");
    }

    #[tokio::test]
    async fn sync_unknown_application_is_not_found() {
        let harness = TestEngine::new();
        let err = handle_request(&harness.engine, "app/sync", json!({"name": "ghost"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32001);
    }

    #[tokio::test]
    async fn status_reflects_the_last_sync() {
        let harness = TestEngine::new();
        harness
            .source
            .set_revision("main", "rev-1", vec![manifests::deployment("web", 2)]);
        register_web(&harness, false).await;
        handle_request(&harness.engine, "app/sync", json!({"name": "web"}))
            .await
            .unwrap();

        let value = handle_request(&harness.engine, "app/status", json!({"name": "web"}))
            .await
            .unwrap();
        assert_eq!(value["app"]["name"], "web");
        assert_eq!(value["status"]["sync"], "synced");
        assert_eq!(value["status"]["last_synced_revision"], "rev-1");
    }

    #[tokio::test]
    async fn history_honours_the_limit() {
        let harness = TestEngine::new();
        harness
            .source
            .set_revision("main", "rev-1", vec![manifests::deployment("web", 2)]);
        register_web(&harness, false).await;
        handle_request(&harness.engine, "app/sync", json!({"name": "web"}))
            .await
            .unwrap();

        harness
            .source
            .set_revision("main", "rev-2", vec![manifests::deployment("web", 3)]);
        handle_request(&harness.engine, "app/sync", json!({"name": "web"}))
            .await
            .unwrap();

        let all = handle_request(&harness.engine, "app/history", json!({"name": "web"}))
            .await
            .unwrap();
        assert_eq!(all["count"], 2);

        let limited = handle_request(
            &harness.engine,
            "app/history",
            json!({"name": "web", "limit": 1}),
        )
        .await
        .unwrap();
        assert_eq!(limited["count"], 1);
        assert_eq!(limited["records"][0]["revision"], "rev-2");
    }

    #[tokio::test]
    async fn rollback_pins_a_previous_revision() {
        let harness = TestEngine::new();
        let v1 = vec![manifests::deployment("web", 2)];
        harness.source.set_revision("main", "rev-1", v1.clone());
        // Concrete revisions resolve to themselves, as commit ids do.
        harness.source.set_revision("rev-1", "rev-1", v1);
        register_web(&harness, false).await;
        handle_request(&harness.engine, "app/sync", json!({"name": "web"}))
            .await
            .unwrap();

        harness
            .source
            .set_revision("main", "rev-2", vec![manifests::deployment("web", 5)]);
        handle_request(&harness.engine, "app/sync", json!({"name": "web"}))
            .await
            .unwrap();

        let value = handle_request(
            &harness.engine,
            "app/rollback",
            json!({"name": "web", "revision": "rev-1"}),
        )
        .await
        .unwrap();
        assert_eq!(value["outcome"], "synced");
        assert_eq!(value["record"]["initiator"], "rollback");

        let status = handle_request(&harness.engine, "app/status", json!({"name": "web"}))
            .await
            .unwrap();
        assert_eq!(status["status"]["last_synced_revision"], "rev-1");
    }

    #[tokio::test]
    async fn refresh_queues_a_trigger() {
        let harness = TestEngine::new();
        harness
            .source
            .set_revision("main", "rev-1", vec![manifests::deployment("web", 2)]);
        register_web(&harness, false).await;

        let value = handle_request(&harness.engine, "app/refresh", json!({"name": "web"}))
            .await
            .unwrap();
        assert_eq!(value["queued"], true);
    }

    #[tokio::test]
    async fn deregister_removes_the_application() {
        let harness = TestEngine::new();
        register_web(&harness, false).await;

        handle_request(&harness.engine, "app/deregister", json!({"name": "web"}))
            .await
            .unwrap();
        let listed = handle_request(&harness.engine, "app/list", Value::Null)
            .await
            .unwrap();
        assert_eq!(listed["count"], 0);
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let harness = TestEngine::new();
        let err = handle_request(&harness.engine, "app/bogus", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownMethod(_)));
    }

    #[tokio::test]
    async fn missing_required_param_is_invalid() {
        let harness = TestEngine::new();
        let err = handle_request(&harness.engine, "app/sync", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn invalid_application_name_surfaces_engine_error() {
        let harness = TestEngine::new();
        let err = handle_request(
            &harness.engine,
            "app/register",
            json!({"name": "has space", "repo": "scripted", "revision": "main", "cluster": harness::CLUSTER}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), -32000);
    }
}
