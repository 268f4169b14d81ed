//! Per-resource and aggregate health assessment.
//!
//! Health reads the raw live content (never the normalized form used for
//! diffing) and interprets the convergence signals commonly found there.
//! Signals are advisory; an unrecognized shape degrades to `Unknown`,
//! never to an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use gitops_model::LiveResource;

/// Health of a resource or an application.
///
/// Variants are ordered by severity. When several signals disagree, the
/// worst one wins, both within one resource and across an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Desired but absent from the live snapshot
    Missing,
    /// No status information to judge by
    #[default]
    Unknown,
    /// Administratively paused
    Suspended,
    /// Still converging toward the desired state
    Progressing,
    /// A failure signal is present
    Degraded,
}

impl HealthStatus {
    fn severity(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Missing => 1,
            Self::Unknown => 2,
            Self::Suspended => 3,
            Self::Progressing => 4,
            Self::Degraded => 5,
        }
    }

    /// The worse of two statuses.
    pub fn merge(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Fold a set of statuses into the application-level one.
    ///
    /// An empty set is healthy: an application that desires nothing has
    /// nothing wrong with it.
    pub fn aggregate(statuses: impl IntoIterator<Item = Self>) -> Self {
        statuses
            .into_iter()
            .fold(Self::Healthy, |worst, status| worst.merge(status))
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Healthy => "healthy",
            Self::Missing => "missing",
            Self::Unknown => "unknown",
            Self::Suspended => "suspended",
            Self::Progressing => "progressing",
            Self::Degraded => "degraded",
        };
        write!(f, "{label}")
    }
}

/// Assess one live resource from its raw content.
pub fn resource_health(resource: &LiveResource) -> HealthStatus {
    let content = &resource.content;

    // An administrative pause outranks whatever the runtime reports
    if is_paused(content) {
        return HealthStatus::Suspended;
    }

    let Some(status) = resource.status() else {
        return HealthStatus::Unknown;
    };

    if let Some(phase) = status.get("phase").and_then(Value::as_str) {
        if matches!(phase, "Failed" | "Error") {
            return HealthStatus::Degraded;
        }
    }
    // A runtime that gave up converging reports Progressing=False
    if condition_is(status, "Progressing", "False") {
        return HealthStatus::Degraded;
    }

    if let Some(desired) = desired_replicas(content) {
        let ready = status
            .get("readyReplicas")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        return if ready < desired {
            HealthStatus::Progressing
        } else {
            HealthStatus::Healthy
        };
    }

    if condition_is(status, "Ready", "False") || condition_is(status, "Available", "False") {
        return HealthStatus::Progressing;
    }
    if let Some(phase) = status.get("phase").and_then(Value::as_str) {
        if matches!(phase, "Pending" | "Progressing") {
            return HealthStatus::Progressing;
        }
        if matches!(phase, "Running" | "Succeeded" | "Active" | "Bound") {
            return HealthStatus::Healthy;
        }
    }
    if condition_is(status, "Ready", "True") || condition_is(status, "Available", "True") {
        return HealthStatus::Healthy;
    }

    HealthStatus::Unknown
}

fn is_paused(content: &Value) -> bool {
    let spec = content.get("spec");
    let flag = |key: &str| {
        spec.and_then(|s| s.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };
    flag("paused") || flag("suspend")
}

fn desired_replicas(content: &Value) -> Option<u64> {
    content
        .get("spec")
        .and_then(|spec| spec.get("replicas"))
        .and_then(Value::as_u64)
}

fn condition_is(status: &Value, kind: &str, truth: &str) -> bool {
    status
        .get("conditions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .any(|condition| {
            condition.get("type").and_then(Value::as_str) == Some(kind)
                && condition.get("status").and_then(Value::as_str) == Some(truth)
        })
}
