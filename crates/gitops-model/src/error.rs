//! Error types for gitops-model

/// Result type for gitops-model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when building model types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Manifest content is not usable as a resource
    #[error("Invalid manifest: {reason}")]
    InvalidManifest { reason: String },
}

impl Error {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            reason: reason.into(),
        }
    }
}
