//! Error types for the reconciliation engine.
//!
//! Every failure surfaced by a provider or by the engine itself maps onto one
//! of these variants, so callers (and sync records) can always name the kind
//! of thing that went wrong alongside the resource or application it hit.

use thiserror::Error;

/// Result type alias for gitops-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during reconciliation
#[derive(Error, Debug)]
pub enum Error {
    /// The configured source could not be reached or read at all
    #[error("source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    /// The revision pointer does not resolve to any content in the source
    #[error("revision not found: {revision}")]
    RevisionNotFound { revision: String },

    /// The destination rejected or never answered a live-state or execution call
    #[error("destination '{destination}' unreachable: {reason}")]
    DestinationUnreachable {
        destination: String,
        reason: String,
    },

    /// A manifest (or the manifest set as a whole) failed validation
    #[error("invalid manifest: {reason}")]
    ManifestInvalid { reason: String },

    /// No application registered under this name
    #[error("application not found: {name}")]
    AppNotFound { name: String },

    /// An application with this name is already registered
    #[error("application already registered: {name}")]
    AppExists { name: String },

    /// A name that cannot be used for registration
    #[error("invalid application name '{name}': {reason}")]
    InvalidAppName { name: String, reason: String },

    /// Manifest model error
    #[error(transparent)]
    Model(#[from] gitops_model::Error),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization failed
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Shorthand for a [`Error::SourceUnavailable`] with a formatted reason.
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Error::ManifestInvalid`] with a formatted reason.
    pub fn manifest_invalid(reason: impl Into<String>) -> Self {
        Self::ManifestInvalid {
            reason: reason.into(),
        }
    }
}
