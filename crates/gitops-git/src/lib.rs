//! Git-backed source provider.
//!
//! Resolves revision pointers (branch names, tags, commit ids) against local
//! repositories via libgit2, and parses the JSON and YAML manifest documents
//! found under the configured path of the resolved tree. Resolution is pure
//! read access; the provider never mutates a repository.

pub mod source;

pub use source::GitSourceProvider;
