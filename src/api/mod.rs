// HTTP routes for the gateway

pub mod limits;
pub mod response;

use std::sync::Arc;

use axum::{
    Router,
    http::{StatusCode, Uri},
    middleware,
    routing::get,
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;

use crate::config::HttpConfig;
use crate::identity::{Identity, IdentityResolver, identity_middleware};
use limits::enforce_header_limit;
use response::ApiResponse;

pub const INSTANCE_HEALTHY: &str = "instance is healthy";
pub const IDENTITY_RESOLVED: &str = "visitor identity resolved";
pub const ROUTE_NOT_FOUND: &str = "route not found";

/// Build the gateway router.
///
/// Every route, including the fallback, sits behind the identity middleware,
/// so handlers can rely on an `Identity` being present. Oversized headers and
/// bodies are rejected before an identity is resolved.
pub fn create_router(resolver: Arc<IdentityResolver>, http: &HttpConfig) -> Router {
    let v1 = Router::new()
        .route("/health", get(health_check))
        .route("/identity", get(current_identity));

    Router::new()
        .nest("/api/v1", v1)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(resolver, identity_middleware))
        .layer(middleware::from_fn_with_state(
            http.max_header_bytes,
            enforce_header_limit,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(http.max_body_bytes))
                .layer(RequestBodyTimeoutLayer::new(http.read_timeout))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    http.write_timeout,
                )),
        )
}

async fn health_check() -> ApiResponse<Value> {
    ApiResponse::success(
        INSTANCE_HEALTHY,
        Some(serde_json::json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

/// Echo the identity the middleware resolved for this request.
async fn current_identity(identity: Identity) -> ApiResponse<Identity> {
    ApiResponse::success(IDENTITY_RESOLVED, Some(identity))
}

async fn not_found(uri: Uri) -> (StatusCode, ApiResponse<()>) {
    (
        StatusCode::NOT_FOUND,
        ApiResponse::error(ROUTE_NOT_FOUND).with_error(format!("no route for {}", uri.path())),
    )
}
