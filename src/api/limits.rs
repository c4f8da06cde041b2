//! Request size limits enforced ahead of identity resolution.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::response::ApiResponse;

pub const HEADERS_TOO_LARGE: &str = "request headers too large";

/// Bytes the request line and header block occupy on the wire.
pub fn header_block_size(req: &Request) -> usize {
    // "METHOD SP target SP HTTP/1.1 CRLF"
    let request_line = req.method().as_str().len() + req.uri().to_string().len() + 12;

    req.headers().iter().fold(request_line, |total, (name, value)| {
        // "name: value CRLF"
        total + name.as_str().len() + value.len() + 4
    })
}

/// Reject requests whose header block exceeds `limit` bytes with 431.
pub async fn enforce_header_limit(
    State(limit): State<usize>,
    req: Request,
    next: Next,
) -> Response {
    let size = header_block_size(&req);
    if size > limit {
        tracing::warn!(size, limit, "request headers exceed limit, rejecting");
        return (
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            ApiResponse::<()>::error(HEADERS_TOO_LARGE),
        )
            .into_response();
    }

    next.run(req).await
}
