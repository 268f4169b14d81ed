//! Desired-state manifest document builders.
//!
//! Builders return raw `serde_json::Value` documents shaped like the
//! manifests a source provider renders, so tests can hand them to a
//! [`ScriptedSource`](crate::ScriptedSource), commit them to a git fixture,
//! or corrupt them before parsing.

use serde_json::{Map, Value, json};

use gitops_model::ResourceManifest;

/// A Deployment with the given replica count and no namespace.
pub fn deployment(name: &str, replicas: u64) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": name},
        "spec": {
            "replicas": replicas,
            "image": format!("registry.example.com/{name}:v1")
        }
    })
}

/// A Deployment pinned to a namespace.
pub fn deployment_in(namespace: &str, name: &str, replicas: u64) -> Value {
    let mut doc = deployment(name, replicas);
    doc["metadata"]["namespace"] = json!(namespace);
    doc
}

/// A ConfigMap carrying the given data entries and no namespace.
pub fn configmap(name: &str, data: &[(&str, &str)]) -> Value {
    let entries: Map<String, Value> = data
        .iter()
        .map(|(key, value)| (key.to_string(), json!(value)))
        .collect();
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name},
        "data": entries
    })
}

/// Parse a builder document into a [`ResourceManifest`].
///
/// # Panics
/// Panics if the document is not a valid manifest.
pub fn parse(doc: Value) -> ResourceManifest {
    ResourceManifest::parse(doc).unwrap_or_else(|e| panic!("parse: invalid manifest fixture: {e}"))
}
