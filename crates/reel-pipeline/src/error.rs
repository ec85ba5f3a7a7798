//! Pipeline error types.

use reel_models::{Credits, InvalidTransition};
use serde::Serialize;
use thiserror::Error;

use crate::adapters::{AdapterError, AdapterErrorKind};
use crate::store::StoreError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InsufficientCredits,
    AdapterFailure,
    Validation,
    InvalidTransition,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientCredits => "insufficient_credits",
            ErrorKind::AdapterFailure => "adapter_failure",
            ErrorKind::Validation => "validation_error",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits {
        required: Credits,
        available: Credits,
    },

    #[error("Generation failed: {0}")]
    AdapterFailure(#[from] AdapterError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::NotFound(_) => ErrorKind::NotFound,
            PipelineError::InsufficientCredits { .. } => ErrorKind::InsufficientCredits,
            PipelineError::AdapterFailure(_) => ErrorKind::AdapterFailure,
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            PipelineError::Conflict(_) => ErrorKind::Conflict,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Provider failure classification, if this came from an adapter.
    pub fn adapter_kind(&self) -> Option<AdapterErrorKind> {
        match self {
            PipelineError::AdapterFailure(e) => Some(e.kind),
            _ => None,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => PipelineError::NotFound(msg),
            StoreError::Conflict(msg) => PipelineError::Conflict(msg),
            StoreError::Backend(msg) => PipelineError::Internal(msg),
        }
    }
}

impl From<validator::ValidationErrors> for PipelineError {
    fn from(err: validator::ValidationErrors) -> Self {
        PipelineError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::ShortStatus;

    #[test]
    fn test_error_kinds() {
        let err = PipelineError::InsufficientCredits {
            required: Credits::whole(2),
            available: Credits::whole(1),
        };
        assert_eq!(err.kind().as_str(), "insufficient_credits");
        assert_eq!(
            err.to_string(),
            "Insufficient credits: 2 required, 1 available"
        );

        let err: PipelineError = ShortStatus::Completed
            .transition(ShortStatus::Draft)
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err: PipelineError = StoreError::conflict("revision moved").into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
