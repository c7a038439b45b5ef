use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of failure classes a pipeline operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    NotFoundError,
    EmptyResultError,
    UpstreamError,
    DetectionError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::NotFoundError => "NotFoundError",
            ErrorKind::EmptyResultError => "EmptyResultError",
            ErrorKind::UpstreamError => "UpstreamError",
            ErrorKind::DetectionError => "DetectionError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("{0}")]
    Validation(String),

    #[error("Course content not found. Please process the course first. Collection '{collection}' does not exist.")]
    NotFound { collection: String },

    #[error("{message} (collection '{collection}')")]
    EmptyResult { collection: String, message: String },

    #[error("{service} failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
        retryable: bool,
    },

    #[error("language detection failed: {0}")]
    Detection(String),
}

impl RagError {
    pub fn validation(message: impl Into<String>) -> Self {
        RagError::Validation(message.into())
    }

    pub fn not_found(collection: impl Into<String>) -> Self {
        RagError::NotFound {
            collection: collection.into(),
        }
    }

    pub fn empty(collection: impl Into<String>, message: impl Into<String>) -> Self {
        RagError::EmptyResult {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Wrap a collaborator failure that is not worth retrying as-is.
    pub fn upstream(service: &'static str, err: impl std::fmt::Display) -> Self {
        RagError::Upstream {
            service,
            message: err.to_string(),
            retryable: false,
        }
    }

    pub fn timeout(service: &'static str, after: std::time::Duration) -> Self {
        RagError::Upstream {
            service,
            message: format!("timed out after {}s", after.as_secs_f32()),
            retryable: true,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Validation(_) => ErrorKind::ValidationError,
            RagError::NotFound { .. } => ErrorKind::NotFoundError,
            RagError::EmptyResult { .. } => ErrorKind::EmptyResultError,
            RagError::Upstream { .. } => ErrorKind::UpstreamError,
            RagError::Detection(_) => ErrorKind::DetectionError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Upstream { retryable: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
