//! Error types for the operator surface

use thiserror::Error;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving operator requests
#[derive(Debug, Error)]
pub enum Error {
    /// Error from the reconciliation engine
    #[error("{0}")]
    Engine(#[from] gitops_core::Error),

    /// Error during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request params did not match the method's schema
    #[error("invalid params: {message}")]
    InvalidParams { message: String },

    /// Unknown JSON-RPC method
    #[error("method not found: {0}")]
    UnknownMethod(String),

    /// IO error on the stdio transport
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// JSON-RPC error code for this error.
    ///
    /// Engine errors use implementation-defined codes in the -32000 range so
    /// operator tooling can distinguish missing applications from transient
    /// failures without string matching.
    pub fn code(&self) -> i32 {
        match self {
            Self::UnknownMethod(_) => -32601,
            Self::InvalidParams { .. } | Self::Json(_) => -32602,
            Self::Engine(gitops_core::Error::AppNotFound { .. }) => -32001,
            Self::Engine(gitops_core::Error::AppExists { .. }) => -32002,
            Self::Engine(_) => -32000,
            Self::Io(_) => -32603,
        }
    }
}
