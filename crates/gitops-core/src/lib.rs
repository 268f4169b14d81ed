//! Core reconciliation engine for the gitops workspace.
//!
//! This crate owns everything between a resolved manifest set and a finished
//! sync: plan construction, ordered execution with retries, health assessment,
//! the append-only sync history, and the per-application control loop that
//! ties them together.
//!
//! # Architecture
//!
//! ```text
//! SourceProvider ──resolve──> manifests ─┐
//!                                        ├─> diff ──> SyncPlan ──> Executor ──> SyncRecord
//! LiveStateProvider ──list──> live ──────┘                            │
//!                                                                     v
//!                                                              ExecutorBackend
//! ```
//!
//! The [`Reconciler`] drives that pipeline once per trigger, one in-flight
//! run per application. Everything it learns is persisted through
//! [`Registry`] (application definitions and status) and [`HistoryLog`]
//! (one JSONL stream of [`SyncRecord`]s per application).
//!
//! Provider traits ([`SourceProvider`], [`LiveStateProvider`],
//! [`ExecutorBackend`]) are the only seams to the outside world; everything
//! else is deterministic given their answers.

pub mod application;
pub mod backend;
pub mod error;
pub mod executor;
pub mod health;
pub mod history;
pub mod persist;
pub mod plan;
pub mod provider;
pub mod reconciler;
pub mod registry;

pub use application::{
    AppStatus, AggregateSync, Application, Destination, DriftSummary, PlanSummary, SourceRef,
    StatusCondition, SyncPolicy,
};
pub use backend::{BackendOutcome, ExecutorBackend, LiveStateProvider, TrackingSelector};
pub use backend::local::LocalCluster;
pub use error::{Error, Result};
pub use executor::{ExecutionReport, RetryPolicy, RunToken};
pub use health::HealthStatus;
pub use history::{
    FailureKind, HistoryLog, Initiator, OpResult, PlanAction, ResourceOutcome, SyncPhase,
    SyncRecord,
};
pub use plan::{Operation, PlannedOp, SkippedResource, SyncPlan};
pub use provider::{ResolvedSource, SourceProvider};
pub use reconciler::{EngineConfig, ReconcileOutcome, Reconciler, SyncMode, Trigger};
pub use registry::{AppEntry, Baseline, DataDir, Registry};
