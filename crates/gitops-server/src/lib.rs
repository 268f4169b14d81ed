//! JSON-RPC operator surface for the gitops-engine reconciler.
//!
//! This crate is a thin facade: it parses JSON-RPC 2.0 requests off stdin,
//! dispatches them to a running [`Reconciler`](gitops_core::Reconciler), and
//! writes responses to stdout. All engine semantics live in `gitops-core`.
//!
//! ```text
//! [ Operator tooling ]
//!        | (JSON-RPC over stdio)
//!        v
//! [ gitops-server ]
//!        | (Rust API)
//!        v
//! [ gitops-core reconciler ]
//!        |
//!        +--> git repositories (desired state)
//!        +--> destination backends (live state)
//!        +--> data dir (registry, history, baselines)
//! ```
//!
//! # Methods
//!
//! - `app/register`, `app/deregister`, `app/list`
//! - `app/sync`, `app/rollback`, `app/refresh`
//! - `app/status`, `app/history`
//!
//! Logs go to stderr; stdout carries only protocol messages.

pub mod error;
pub mod handlers;
pub mod protocol;
pub mod server;

pub use error::{Error, Result};
pub use server::GitopsServer;
