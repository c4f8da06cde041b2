//! Visitor identity resolution and provisioning.
//!
//! Every inbound request is given a durable, opaque visitor identity without
//! requiring login:
//!
//! - **Token**: a URL-safe base64 string drawn from the OS CSPRNG
//! - **Cookie**: carries only the token, never the authentication state
//! - **Store**: one hash per visitor at `visitor:<token>`
//!
//! ## Security Model
//!
//! - Authentication state is always read from the store, never from the client
//! - A cookie naming an unknown record is silently replaced, not trusted
//! - Store failures abort the request with 401; no request proceeds without an identity
//! - Tokens are logged only as fingerprints
//!
//! ## Usage
//!
//! ```ignore
//! let resolver = Arc::new(IdentityResolver::with_store(config, store)?);
//!
//! let app = Router::new()
//!     .route("/whoami", get(|identity: Identity| async move { identity.id().to_string() }))
//!     .layer(middleware::from_fn_with_state(resolver, identity_middleware));
//! ```

mod context;
mod cookies;
mod error;
mod middleware;
mod resolver;
mod store;
mod token;

pub use context::Identity;
pub use cookies::CookieCodec;
pub use error::{IDENTITY_UNKNOWN_MESSAGE, IdentityError, IdentityResult};
pub use middleware::identity_middleware;
pub use resolver::{Action, CookieState, IdentityResolver, ProvisionReason, Resolution, decide};
pub use store::{
    FIELD_ID, FIELD_IS_AUTHENTICATED, IdentityReader, IdentityWriter, InMemoryIdentityStore,
    RedisIdentityStore, identity_from_fields, identity_to_fields,
};
pub use token::{OsTokenGenerator, TokenGenerator};
