//! Firestore error types.

use thiserror::Error;

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Errors that can occur during Firestore operations.
#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
}

/// Delay used for 429 responses that carry no hint.
const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 1000;

impl FirestoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    ///
    /// Firestore reports failed `currentDocument` preconditions as
    /// `400 FAILED_PRECONDITION` and write contention as `409 ABORTED`.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 if message.contains("FAILED_PRECONDITION") => Self::PreconditionFailed(message),
            401 => Self::AuthError(message),
            403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            409 if message.contains("ABORTED") => Self::PreconditionFailed(message),
            409 => Self::AlreadyExists(message),
            412 => Self::PreconditionFailed(message),
            429 => Self::RateLimited(DEFAULT_RATE_LIMIT_DELAY_MS),
            500..=599 => Self::ServerError(status, message),
            _ => Self::RequestFailed(message),
        }
    }

    /// HTTP status this error corresponds to, when known.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::PreconditionFailed(_) => Some(412),
            Self::RateLimited(_) => Some(429),
            Self::ServerError(status, _) => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Server-suggested delay before retrying.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FirestoreError::Network(_)
                | FirestoreError::RateLimited(_)
                | FirestoreError::ServerError(_, _)
        )
    }

    /// True if the error was caused by a failed precondition (e.g., updateTime mismatch).
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, FirestoreError::PreconditionFailed(_))
            || matches!(
                self,
                FirestoreError::RequestFailed(msg)
                if msg.contains("FAILED_PRECONDITION") || msg.contains("Precondition")
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status_mapping() {
        assert!(matches!(
            FirestoreError::from_http_status(429, "slow down"),
            FirestoreError::RateLimited(_)
        ));
        assert!(matches!(
            FirestoreError::from_http_status(503, "unavailable"),
            FirestoreError::ServerError(503, _)
        ));
        assert!(matches!(
            FirestoreError::from_http_status(404, "gone"),
            FirestoreError::NotFound(_)
        ));
        assert!(matches!(
            FirestoreError::from_http_status(409, "exists"),
            FirestoreError::AlreadyExists(_)
        ));
        assert!(matches!(
            FirestoreError::from_http_status(400, "bad field"),
            FirestoreError::RequestFailed(_)
        ));
    }

    #[test]
    fn test_precondition_detection() {
        let err = FirestoreError::from_http_status(
            400,
            r#"{"error":{"status":"FAILED_PRECONDITION"}}"#,
        );
        assert!(err.is_precondition_failed());
        let err = FirestoreError::from_http_status(409, r#"{"error":{"status":"ABORTED"}}"#);
        assert!(err.is_precondition_failed());
        assert!(!FirestoreError::not_found("x").is_precondition_failed());
    }

    #[test]
    fn test_retryable() {
        assert!(FirestoreError::from_http_status(500, "boom").is_retryable());
        assert!(FirestoreError::RateLimited(10).is_retryable());
        assert!(!FirestoreError::from_http_status(403, "no").is_retryable());
        assert_eq!(FirestoreError::RateLimited(250).retry_after_ms(), Some(250));
        assert_eq!(FirestoreError::ServerError(502, "x".into()).http_status(), Some(502));
    }
}
