//! Desired-state manifest representation
//!
//! A `ResourceManifest` is one rendered manifest document as produced by a
//! source provider for a concrete revision. It is immutable once produced:
//! the identity fields are extracted at parse time and the content hash is
//! computed over the full document.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::hash::canonical_hash;
use crate::identity::ResourceId;

/// A single rendered manifest document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceManifest {
    /// API version of the resource (e.g., "apps/v1")
    pub api_version: String,
    /// Resource kind
    pub kind: String,
    /// Namespace, if the manifest declares one
    pub namespace: Option<String>,
    /// Resource name
    pub name: String,
    /// Full manifest document
    pub content: Value,
    /// Canonical hash of the full document
    pub content_hash: String,
}

impl ResourceManifest {
    /// Parse a manifest from a JSON document.
    ///
    /// Extracts the identity fields and computes the content hash. The
    /// document must be an object carrying `kind` and `metadata.name`;
    /// anything else is rejected as invalid.
    pub fn parse(content: Value) -> Result<Self> {
        let obj = content
            .as_object()
            .ok_or_else(|| Error::invalid("manifest document is not an object"))?;

        let kind = obj
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid("missing required field 'kind'"))?
            .to_string();

        let api_version = obj
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or("v1")
            .to_string();

        let metadata = obj
            .get("metadata")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::invalid(format!("{kind} manifest has no metadata object")))?;

        let name = metadata
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid(format!("{kind} manifest has no metadata.name")))?
            .to_string();

        let namespace = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .map(String::from);

        let content_hash = canonical_hash(&content);

        Ok(Self {
            api_version,
            kind,
            namespace,
            name,
            content,
            content_hash,
        })
    }

    /// Resolve the identity tuple, scoping namespace-less manifests to the
    /// destination's default namespace.
    pub fn id_in(&self, default_namespace: &str) -> ResourceId {
        ResourceId::new(
            self.namespace.as_deref().unwrap_or(default_namespace),
            &self.kind,
            &self.name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn deployment() -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "prod"},
            "spec": {"replicas": 3}
        })
    }

    #[test]
    fn parse_extracts_identity_fields() {
        let manifest = ResourceManifest::parse(deployment()).unwrap();
        assert_eq!(manifest.kind, "Deployment");
        assert_eq!(manifest.name, "web");
        assert_eq!(manifest.namespace.as_deref(), Some("prod"));
        assert_eq!(manifest.api_version, "apps/v1");
    }

    #[test]
    fn parse_computes_content_hash() {
        let manifest = ResourceManifest::parse(deployment()).unwrap();
        assert!(manifest.content_hash.starts_with("sha256:"));
        assert_eq!(manifest.content_hash, canonical_hash(&deployment()));
    }

    #[test]
    fn parse_rejects_missing_kind() {
        let result = ResourceManifest::parse(json!({"metadata": {"name": "x"}}));
        assert!(result.is_err());
    }

    #[test]
    fn parse_rejects_missing_name() {
        let result = ResourceManifest::parse(json!({
            "kind": "ConfigMap",
            "metadata": {}
        }));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("metadata.name"), "got: {err}");
    }

    #[test]
    fn parse_rejects_non_object() {
        assert!(ResourceManifest::parse(json!("not a manifest")).is_err());
        assert!(ResourceManifest::parse(json!(["a", "b"])).is_err());
    }

    #[test]
    fn id_in_uses_declared_namespace() {
        let manifest = ResourceManifest::parse(deployment()).unwrap();
        let id = manifest.id_in("default");
        assert_eq!(id, ResourceId::new("prod", "Deployment", "web"));
    }

    #[test]
    fn id_in_falls_back_to_destination_namespace() {
        let manifest = ResourceManifest::parse(json!({
            "kind": "ConfigMap",
            "metadata": {"name": "settings"}
        }))
        .unwrap();
        let id = manifest.id_in("staging");
        assert_eq!(id, ResourceId::new("staging", "ConfigMap", "settings"));
    }

    #[test]
    fn api_version_defaults_to_v1() {
        let manifest = ResourceManifest::parse(json!({
            "kind": "ConfigMap",
            "metadata": {"name": "settings"}
        }))
        .unwrap();
        assert_eq!(manifest.api_version, "v1");
    }
}
