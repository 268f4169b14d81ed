//! Observed live resource state
//!
//! A `LiveResource` is a point-in-time observation of one resource at a
//! destination, as returned by a live state provider. Snapshots are fetched
//! fresh for every reconciliation and never shared across runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::ResourceId;
use crate::ownership::{Ownership, OwnershipMarker};

/// Observed state of a resource at a destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveResource {
    /// Identity tuple
    pub id: ResourceId,
    /// API version as observed
    pub api_version: String,
    /// Full observed document, including runtime-injected fields and the
    /// status subtree
    pub content: Value,
    /// Ownership marker, if the resource was written by the engine
    pub owner: Option<OwnershipMarker>,
}

impl LiveResource {
    /// Classify ownership relative to an application
    pub fn ownership(&self, application: &str) -> Ownership {
        Ownership::classify(self.owner.as_ref(), application)
    }

    /// The status subtree reported by the runtime, if any
    pub fn status(&self) -> Option<&Value> {
        self.content.get("status")
    }
}
