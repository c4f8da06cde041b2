// Core modules
pub mod api;
pub mod config;
pub mod identity;
pub mod logging;
pub mod server;
mod types;

// Re-export key types and functions
pub use config::{
    ConfigError, Environment, GatewayConfig, HttpConfig, IdentityConfig, ServeArgs, StoreArgs,
    StoreConfig,
};
pub use identity::{
    Identity, IdentityError, IdentityReader, IdentityResolver, IdentityWriter,
    InMemoryIdentityStore, RedisIdentityStore, identity_middleware,
};
pub use types::{VISITOR_KEY_PREFIX, VisitorKey, VisitorToken};

use std::sync::Arc;

use anyhow::Result;
use axum::Router;

/// Convenience function to build the gateway router over any identity store.
///
/// This creates the resolver from the identity configuration and wraps the
/// routes in the identity middleware.
pub fn create_app<S>(config: &GatewayConfig, store: S) -> Result<Router>
where
    S: IdentityReader + IdentityWriter + 'static,
{
    let resolver = IdentityResolver::with_store(config.identity.clone(), store)?;
    Ok(api::create_router(Arc::new(resolver), &config.http))
}
