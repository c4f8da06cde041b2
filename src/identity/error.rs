//! Error types for identity resolution.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::api::response::ApiResponse;

/// Message returned to the client when no identity could be established.
pub const IDENTITY_UNKNOWN_MESSAGE: &str = "unable to establish visitor identity";

/// Errors that can occur while resolving or provisioning a visitor identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The entropy source could not supply bytes for a new token.
    Generation(String),

    /// No record exists for the given store key.
    ///
    /// Handled locally by reprovisioning; never reaches the client.
    NotFound(String),

    /// The store was unreachable, failed, or did not answer in time.
    Infrastructure(String),
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation(msg) => write!(f, "Token generation failed: {}", msg),
            Self::NotFound(key) => write!(f, "Identity not found: key={}", key),
            Self::Infrastructure(msg) => write!(f, "Identity store error: {}", msg),
        }
    }
}

impl std::error::Error for IdentityError {}

/// Result type for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;

impl From<redis::RedisError> for IdentityError {
    fn from(err: redis::RedisError) -> Self {
        Self::Infrastructure(err.to_string())
    }
}

impl IdentityError {
    /// Whether this error is a plain store miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        // Detail stays in the logs; the client only learns that identity failed.
        tracing::error!(error = %self, "identity could not be established, aborting request");
        (
            StatusCode::UNAUTHORIZED,
            ApiResponse::<()>::error(IDENTITY_UNKNOWN_MESSAGE),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_error_display() {
        assert_eq!(
            IdentityError::NotFound("visitor:abc".to_string()).to_string(),
            "Identity not found: key=visitor:abc"
        );
        assert_eq!(
            IdentityError::Generation("no entropy".to_string()).to_string(),
            "Token generation failed: no entropy"
        );
        assert_eq!(
            IdentityError::Infrastructure("connection refused".to_string()).to_string(),
            "Identity store error: connection refused"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(IdentityError::NotFound("k".to_string()).is_not_found());
        assert!(!IdentityError::Infrastructure("x".to_string()).is_not_found());
        assert!(!IdentityError::Generation("x".to_string()).is_not_found());
    }

    #[test]
    fn test_into_response_is_unauthorized() {
        let response = IdentityError::Infrastructure("timeout".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
