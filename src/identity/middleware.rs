//! Axum middleware attaching the visitor identity to every request.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::identity::resolver::IdentityResolver;

/// Resolve the visitor identity before the rest of the chain runs.
///
/// On success the `Identity` is inserted into the request extensions and,
/// if it was provisioned during this request, the visitor cookie is written
/// onto the response. On failure the request is answered with 401 and the
/// chain is never invoked; no cookie is set.
pub async fn identity_middleware(
    State(resolver): State<Arc<IdentityResolver>>,
    mut req: Request,
    next: Next,
) -> Response {
    let resolution = match resolver.resolve(req.headers()).await {
        Ok(resolution) => resolution,
        Err(e) => return e.into_response(),
    };

    let issue = resolution.is_provisioned();
    let identity = resolution.into_identity();
    let token = identity.id().clone();

    req.extensions_mut().insert(identity);
    let mut response = next.run(req).await;

    if issue {
        resolver.cookies().issue(response.headers_mut(), &token);
    }

    response
}
