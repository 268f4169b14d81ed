//! Resource identity
//!
//! A resource is identified by the `(namespace, kind, name)` tuple within a
//! destination. The API version is carried on manifests for round-tripping
//! but does not participate in identity: two manifests naming the same tuple
//! refer to the same resource.

use serde::{Deserialize, Serialize};

/// Identity tuple for a resource within a destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    /// Namespace the resource lives in
    pub namespace: String,
    /// Resource kind (e.g., "Deployment", "ConfigMap")
    pub kind: String,
    /// Resource name, unique per namespace and kind
    pub name: String,
}

impl ResourceId {
    /// Create a new identity tuple
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}
