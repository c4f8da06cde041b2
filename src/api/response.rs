//! Uniform JSON envelope for every response body.

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// `{"success": .., "message": .., "data"?: .., "error"?: ..}`
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            error: None,
        }
    }

    /// Failure envelope without internal detail.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: None,
        }
    }

    /// Attach a client-safe error description.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let body = ApiResponse::success("ok", Some(serde_json::json!({ "n": 1 })));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": true, "message": "ok", "data": { "n": 1 } })
        );
    }

    #[test]
    fn test_error_envelope_omits_empty_fields() {
        let body = ApiResponse::<()>::error("nope");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "success": false, "message": "nope" }));
    }

    #[test]
    fn test_error_envelope_with_error() {
        let body = ApiResponse::<()>::error("nope").with_error("bad input");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "bad input");
    }
}
