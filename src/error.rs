//! Error types for the upload core

use thiserror::Error;

use crate::network::NetworkError;

/// Upload result type
pub type Result<T> = std::result::Result<T, UploadError>;

/// Every outcome a caller of `upload` can observe besides success.
///
/// Failures that happen after the caller already holds an `UploadResult`
/// never surface here; they end up in the run's `FinalOutcome` and its
/// `UploadRecord` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Session resolution failed: {0}")]
    SessionResolution(String),

    #[error("Insufficient capacity: required {required}, available {available}")]
    InsufficientCapacity { required: u64, available: u64 },

    #[error("Capacity check failed: {0}")]
    Preflight(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Uploader is shutting down")]
    ShuttingDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UploadError {
    /// Stable machine-readable code for this error
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionResolution(_) => "SESSION_RESOLUTION",
            Self::InsufficientCapacity { .. } => "INSUFFICIENT_CAPACITY",
            Self::Preflight(_) => "PREFLIGHT",
            Self::Transfer(_) => "TRANSFER",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether retrying the whole operation unchanged can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SessionResolution(_) | Self::Preflight(_) | Self::Transfer(_)
        )
    }

    pub(crate) fn session(err: NetworkError) -> Self {
        Self::SessionResolution(err.to_string())
    }

    pub(crate) fn transfer(err: NetworkError) -> Self {
        Self::Transfer(err.to_string())
    }
}
