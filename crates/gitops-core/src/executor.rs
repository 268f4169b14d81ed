//! Ordered plan execution with bounded retries.
//!
//! The executor walks a plan strictly in priority order. Transient backend
//! failures are retried on an exponential schedule up to the application's
//! retry limit; the first unrecoverable failure halts the run and marks every
//! remaining operation as not attempted, so the record never overstates what
//! happened.

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use tokio::sync::watch;
use tracing::{debug, warn};

use gitops_model::OwnershipMarker;

use crate::application::Destination;
use crate::backend::{BackendOutcome, ExecutorBackend};
use crate::history::{FailureKind, OpResult, ResourceOutcome, SyncPhase};
use crate::plan::{Operation, PlannedOp, SyncPlan};

/// Retry schedule for a single plan run.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub limit: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// The default schedule with the limit taken from an application policy.
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    fn schedule(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Snapshot of the trigger generation a run started under.
///
/// The generation only moves forward. Once it differs from the snapshot, a
/// newer trigger owns this application and the current run must yield at the
/// next operation boundary.
#[derive(Debug, Clone)]
pub struct RunToken {
    generation: u64,
    rx: watch::Receiver<u64>,
}

impl RunToken {
    pub fn new(rx: watch::Receiver<u64>) -> Self {
        let generation = *rx.borrow();
        Self { generation, rx }
    }

    /// A token that can never be superseded, for runs outside any worker.
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(0);
        Self { generation: 0, rx }
    }

    /// True once a newer trigger has arrived for this application.
    pub fn superseded(&self) -> bool {
        *self.rx.borrow() != self.generation
    }
}

/// What one executor run produced.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub phase: SyncPhase,
    pub outcomes: Vec<ResourceOutcome>,
}

/// Execute a plan against the backend, strictly in plan order.
///
/// In-flight operations always run to completion; supersession is only
/// honored between operations.
pub async fn run_plan(
    backend: &dyn ExecutorBackend,
    destination: &Destination,
    marker: &OwnershipMarker,
    plan: &SyncPlan,
    retry: &RetryPolicy,
    token: &RunToken,
) -> ExecutionReport {
    let mut phase = SyncPhase::Succeeded;
    let mut outcomes = Vec::with_capacity(plan.operations.len());
    let mut halted = false;

    for op in &plan.operations {
        if halted {
            outcomes.push(ResourceOutcome::not_attempted(op.id.clone(), op.action()));
            continue;
        }

        if token.superseded() {
            debug!(resource = %op.id, "run superseded by a newer trigger");
            phase = SyncPhase::Aborted;
            halted = true;
            outcomes.push(ResourceOutcome::not_attempted(op.id.clone(), op.action()));
            continue;
        }

        let result = run_op(backend, destination, marker, op, retry).await;
        if matches!(result, OpResult::Failed { .. }) {
            phase = SyncPhase::Failed;
            halted = true;
        }
        outcomes.push(ResourceOutcome {
            id: op.id.clone(),
            action: op.action(),
            result,
        });
    }

    ExecutionReport { phase, outcomes }
}

async fn run_op(
    backend: &dyn ExecutorBackend,
    destination: &Destination,
    marker: &OwnershipMarker,
    op: &PlannedOp,
    retry: &RetryPolicy,
) -> OpResult {
    let mut schedule = retry.schedule();
    let mut attempt: u32 = 0;

    loop {
        let call = match &op.operation {
            Operation::Apply(manifest) => backend.apply(destination, manifest, marker).await,
            Operation::Delete => backend.delete(destination, &op.id).await,
        };

        match call {
            Ok(BackendOutcome::Success) => {
                return match op.operation {
                    Operation::Apply(_) => OpResult::Applied,
                    Operation::Delete => OpResult::Deleted,
                };
            }
            Ok(BackendOutcome::Retryable { reason }) => {
                if attempt >= retry.limit {
                    return OpResult::Failed {
                        kind: FailureKind::PermanentFailure,
                        message: format!(
                            "retries exhausted after {} attempts: {reason}",
                            attempt + 1
                        ),
                    };
                }
                attempt += 1;
                let delay = schedule.next_backoff().unwrap_or(retry.max_delay);
                debug!(
                    resource = %op.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Ok(BackendOutcome::Permanent { reason }) => {
                return OpResult::Failed {
                    kind: FailureKind::PermanentFailure,
                    message: reason,
                };
            }
            Ok(BackendOutcome::Rejected { reason }) => {
                return OpResult::Failed {
                    kind: FailureKind::ManifestInvalid,
                    message: reason,
                };
            }
            Err(e) => {
                warn!(resource = %op.id, error = %e, "backend call failed");
                return OpResult::Failed {
                    kind: FailureKind::DestinationUnreachable,
                    message: e.to_string(),
                };
            }
        }
    }
}
