//! Error types for the export pipeline

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while exporting dashboards
///
/// Every variant except `SessionError` is fatal to an export run and is
/// surfaced to the caller unchanged. There is no retry at any layer.
#[derive(Error, Debug)]
pub enum Error {
    /// A required rendering or document collaborator is unavailable
    #[error("Required collaborator missing: {0}")]
    DependencyMissing(String),

    /// A page's rendering session failed to load
    #[error("Failed to load page {path}: {reason}")]
    LoadError { path: String, reason: String },

    /// Rasterizing (or preparing to rasterize) a loaded page failed
    #[error("Failed to capture page {path}: {reason}")]
    CaptureFailure { path: String, reason: String },

    /// A rendering session operation failed
    #[error("Rendering session error: {0}")]
    SessionError(String),

    /// Building or serializing the output document failed
    #[error("Document composition failed: {0}")]
    DocumentError(String),

    /// Writing the finished artifact failed
    #[error("Delivery failed: {0}")]
    DeliveryError(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A comment was rejected before it was sent
    #[error("Invalid comment: {0}")]
    InvalidComment(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Attribute a session failure during loading to the page that triggered it.
    pub fn load(path: &str, err: Error) -> Self {
        match err {
            Error::LoadError { reason, .. } => Error::LoadError { path: path.to_string(), reason },
            other => Error::LoadError { path: path.to_string(), reason: other.to_string() },
        }
    }

    /// Attribute a session failure after loading to the page that triggered it.
    pub fn capture(path: &str, err: Error) -> Self {
        match err {
            e @ (Error::LoadError { .. }
            | Error::CaptureFailure { .. }
            | Error::DependencyMissing(_)) => e,
            other => Error::CaptureFailure { path: path.to_string(), reason: other.to_string() },
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkError(err.to_string())
    }
}

/// A style sheet whose rules could not be inspected.
///
/// This never aborts a run: the normalizer logs it and moves on.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Could not access stylesheet rules ({href}): {reason}")]
pub struct StyleAccessError {
    pub href: String,
    pub reason: String,
}
