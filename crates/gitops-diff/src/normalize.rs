//! Manifest normalization
//!
//! Runtimes inject fields into stored resources (generated identifiers,
//! revision counters, timestamps) and maintain a status subtree the desired
//! manifest never declares. Comparing raw documents would report permanent
//! drift, so both sides are normalized before hashing: the built-in injected
//! paths are removed, along with any caller-supplied ignore paths for
//! runtimes that mutate additional fields server-side.

use serde_json::Value;

/// Fields every runtime injects into stored resources
///
/// The destination namespace is materialized into stored documents even when
/// the desired manifest omits it. Identity already carries the namespace, so
/// it is excluded from content comparison like the generated fields.
const RUNTIME_INJECTED_PATHS: &[&str] = &[
    "metadata.uid",
    "metadata.resourceVersion",
    "metadata.generation",
    "metadata.creationTimestamp",
    "metadata.managedFields",
    "metadata.namespace",
    "status",
];

/// Normalization configuration for one application
///
/// Paths are dot-separated; a numeric segment indexes into an array
/// (e.g., `"spec.ports.0.nodePort"`).
#[derive(Debug, Clone, Default)]
pub struct NormalizeRules {
    /// Caller-supplied paths to ignore in addition to the built-ins
    ignore_paths: Vec<String>,
}

impl NormalizeRules {
    /// Rules with only the built-in runtime-injected paths
    pub fn new() -> Self {
        Self::default()
    }

    /// Add caller-supplied ignore paths
    pub fn with_ignore_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Produce a normalized copy of a manifest document.
    ///
    /// Removal is idempotent: normalizing an already-normalized document is
    /// a no-op.
    pub fn normalize(&self, content: &Value) -> Value {
        let mut normalized = content.clone();
        for path in RUNTIME_INJECTED_PATHS {
            remove_path(&mut normalized, path);
        }
        for path in &self.ignore_paths {
            remove_path(&mut normalized, path);
        }
        normalized
    }
}

/// Remove the value at a dot-separated path, if present.
///
/// Traversal stops silently when a segment does not match the document shape
/// (missing key, non-numeric segment on an array, index out of bounds); an
/// ignore path that matches nothing is not an error.
fn remove_path(value: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    remove_segments(value, &segments);
}

fn remove_segments(value: &mut Value, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    match value {
        Value::Object(map) => {
            if rest.is_empty() {
                map.remove(*head);
            } else if let Some(child) = map.get_mut(*head) {
                remove_segments(child, rest);
            }
        }
        Value::Array(items) => {
            let Ok(index) = head.parse::<usize>() else {
                return;
            };
            if rest.is_empty() {
                if index < items.len() {
                    items.remove(index);
                }
            } else if let Some(child) = items.get_mut(index) {
                remove_segments(child, rest);
            }
        }
        _ => {}
    }
}
