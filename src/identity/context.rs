//! Visitor identity for request-scoped use.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::identity::error::IdentityError;
use crate::types::VisitorToken;

/// Visitor identity resolved for the current request.
///
/// The middleware attaches this to the request extensions before any
/// downstream handler runs. It is immutable once created; state changes go
/// through an `IdentityWriter`, never through this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque token, also the cookie value and store key suffix
    id: VisitorToken,
    /// Only ever read from the store, never from client-supplied data
    #[serde(rename = "isAuthenticated")]
    is_authenticated: bool,
}

impl Identity {
    /// Create an identity with an explicit authentication state.
    pub fn new(id: VisitorToken, is_authenticated: bool) -> Self {
        Self {
            id,
            is_authenticated,
        }
    }

    /// Create a freshly provisioned, unauthenticated identity.
    pub fn anonymous(id: VisitorToken) -> Self {
        Self::new(id, false)
    }

    /// Get the visitor token.
    pub fn id(&self) -> &VisitorToken {
        &self.id
    }

    /// Check whether the visitor has been authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = IdentityError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Identity>().cloned().ok_or_else(|| {
            IdentityError::Infrastructure("identity middleware is not installed".to_string())
        })
    }
}
