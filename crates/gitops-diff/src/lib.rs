//! Diff engine for the GitOps engine
//!
//! Computes per-resource sync state from an ordered desired manifest set and
//! a fresh live snapshot of the same destination:
//!
//! - **Normalization** strips runtime-injected fields (and caller-configured
//!   ignore paths) so that server-side mutation is not treated as drift.
//! - **Classification** assigns each resource a [`SyncState`], excluding live
//!   resources that belong to other owners entirely.
//! - **Field deltas** describe out-of-sync resources path by path, for
//!   reporting only; decisions are made on the classification alone.

pub mod delta;
pub mod engine;
pub mod normalize;

pub use delta::{FieldChange, FieldDelta};
pub use engine::{diff, DiffReport, ResourceDiff, SyncState};
pub use normalize::NormalizeRules;
