//! Field-level delta computation
//!
//! Describes how a live document deviates from its desired manifest, path by
//! path. Deltas are derived for reporting (operator status, sync record
//! context) and never drive classification; that is decided by the
//! normalized content hash alone.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::TextDiff;

/// Maximum recursion depth for delta computation
const MAX_DELTA_DEPTH: usize = 128;

/// A single field-level deviation between desired and live content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "lowercase")]
pub enum FieldChange {
    /// Field present live but absent from the desired manifest
    Added { path: String, live: Value },
    /// Field declared in the desired manifest but absent live
    Removed { path: String, desired: Value },
    /// Field present on both sides with different values
    Changed {
        path: String,
        desired: Value,
        live: Value,
    },
}

impl FieldChange {
    /// The document path this change applies to
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. } | Self::Removed { path, .. } | Self::Changed { path, .. } => {
                path
            }
        }
    }
}

/// Field-level delta between a desired manifest and its live counterpart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    /// All field-level deviations, in document order
    pub changes: Vec<FieldChange>,
    /// Similarity ratio between the two documents (0.0 to 1.0)
    pub similarity: f64,
}

impl FieldDelta {
    /// Compute the delta between normalized desired and live documents.
    ///
    /// Both inputs are expected to be normalized already; comparing raw
    /// documents reports runtime-injected fields as deviations.
    pub fn compute(desired: &Value, live: &Value) -> Self {
        let mut changes = Vec::new();
        diff_values(desired, live, String::new(), &mut changes, 0);

        let similarity = if changes.is_empty() {
            1.0
        } else {
            text_similarity(desired, live)
        };

        Self {
            changes,
            similarity,
        }
    }

    /// Whether the two documents were identical
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Recursively diff two JSON values, collecting changes with path tracking
fn diff_values(
    desired: &Value,
    live: &Value,
    path: String,
    changes: &mut Vec<FieldChange>,
    depth: usize,
) {
    // Depth limit: treat deeply nested differences as a single change
    if depth > MAX_DELTA_DEPTH {
        if desired != live {
            changes.push(FieldChange::Changed {
                path,
                desired: desired.clone(),
                live: live.clone(),
            });
        }
        return;
    }

    match (desired, live) {
        (Value::Object(desired_obj), Value::Object(live_obj)) => {
            for (key, desired_value) in desired_obj {
                let child_path = join_path(&path, key);
                match live_obj.get(key) {
                    Some(live_value) => {
                        diff_values(desired_value, live_value, child_path, changes, depth + 1);
                    }
                    None => {
                        changes.push(FieldChange::Removed {
                            path: child_path,
                            desired: desired_value.clone(),
                        });
                    }
                }
            }
            for (key, live_value) in live_obj {
                if !desired_obj.contains_key(key) {
                    changes.push(FieldChange::Added {
                        path: join_path(&path, key),
                        live: live_value.clone(),
                    });
                }
            }
        }

        (Value::Array(desired_arr), Value::Array(live_arr)) => {
            let max_len = desired_arr.len().max(live_arr.len());
            for i in 0..max_len {
                let child_path = format!("{}[{}]", path, i);
                match (desired_arr.get(i), live_arr.get(i)) {
                    (Some(d), Some(l)) => diff_values(d, l, child_path, changes, depth + 1),
                    (Some(d), None) => changes.push(FieldChange::Removed {
                        path: child_path,
                        desired: d.clone(),
                    }),
                    (None, Some(l)) => changes.push(FieldChange::Added {
                        path: child_path,
                        live: l.clone(),
                    }),
                    (None, None) => unreachable!(),
                }
            }
        }

        // Different types or scalar values
        _ => {
            if desired != live {
                changes.push(FieldChange::Changed {
                    path,
                    desired: desired.clone(),
                    live: live.clone(),
                });
            }
        }
    }
}

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// Similarity estimate via line diff over the pretty-printed documents
fn text_similarity(desired: &Value, live: &Value) -> f64 {
    let desired_text = serde_json::to_string_pretty(desired).unwrap_or_default();
    let live_text = serde_json::to_string_pretty(live).unwrap_or_default();
    TextDiff::from_lines(&desired_text, &live_text).ratio() as f64
}
