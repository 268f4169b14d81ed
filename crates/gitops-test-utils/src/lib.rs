//! Shared test fixtures for the gitops-engine workspace.
//!
//! This crate provides standardised fakes and builders to eliminate
//! duplication across crate test suites. It is a dev-dependency only and is
//! never published.
//!
//! # Modules
//!
//! - [`git_fixture`]: real git repositories with commit history
//! - [`manifests`]: desired-state manifest document builders
//! - [`cluster`]: [`InMemoryCluster`], a scriptable in-process destination
//! - [`source`]: [`ScriptedSource`], a canned source provider
//! - [`harness`]: [`TestEngine`], a full reconciler on a temp data directory

pub mod cluster;
pub mod git_fixture;
pub mod harness;
pub mod manifests;
pub mod source;

pub use cluster::InMemoryCluster;
pub use harness::TestEngine;
pub use source::ScriptedSource;
