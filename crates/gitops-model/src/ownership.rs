//! Ownership markers
//!
//! Every resource created or updated by the engine is tagged with the owning
//! application's marker. The diff engine consults the marker to exclude
//! foreign resources and to flag conflicts; the executor consults it to
//! decide prune eligibility. A resource never tagged by the engine is never
//! touched.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ownership marker attached to resources written by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipMarker {
    /// Application that created or last updated the resource
    pub application: String,
    /// Stable token minted when the application is registered, kept for
    /// auditing re-registrations under the same name
    pub tracking_token: Uuid,
}

impl OwnershipMarker {
    /// Create a marker with a freshly minted tracking token
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            tracking_token: Uuid::new_v4(),
        }
    }

    /// Create a marker with a specific token (persistence round-trips)
    pub fn with_token(application: impl Into<String>, tracking_token: Uuid) -> Self {
        Self {
            application: application.into(),
            tracking_token,
        }
    }

    /// Whether the marker names the given application
    pub fn names(&self, application: &str) -> bool {
        self.application == application
    }
}

/// Ownership of a live resource relative to one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Tagged with this application's marker
    Ours,
    /// Tagged by a different application
    Foreign(String),
    /// No marker present (pre-existing or manually managed)
    Untagged,
}

impl Ownership {
    /// Classify a marker relative to an application name
    pub fn classify(marker: Option<&OwnershipMarker>, application: &str) -> Self {
        match marker {
            Some(m) if m.names(application) => Self::Ours,
            Some(m) => Self::Foreign(m.application.clone()),
            None => Self::Untagged,
        }
    }
}
