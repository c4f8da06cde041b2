//! Visitor identity storage.
//!
//! Reading and writing are separate capabilities so callers depend only on
//! what they use. `RedisIdentityStore` backs production; `InMemoryIdentityStore`
//! is a drop-in fake for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;

use crate::config::StoreConfig;
use crate::identity::context::Identity;
use crate::identity::error::{IdentityError, IdentityResult};
use crate::types::{VisitorKey, VisitorToken};

/// Hash field holding the visitor token.
pub const FIELD_ID: &str = "id";
/// Hash field holding the authentication flag.
pub const FIELD_IS_AUTHENTICATED: &str = "isAuthenticated";

/// Read capability over visitor records.
#[async_trait]
pub trait IdentityReader: Send + Sync {
    /// Fetch the identity stored for `id`.
    ///
    /// Returns `IdentityError::NotFound` when no record exists and
    /// `IdentityError::Infrastructure` on transport failure.
    async fn get(&self, id: &VisitorToken) -> IdentityResult<Identity>;
}

/// Write capability over visitor records.
#[async_trait]
pub trait IdentityWriter: Send + Sync {
    /// Overwrite the full record for `id`.
    async fn set(&self, id: &VisitorToken, identity: &Identity) -> IdentityResult<()>;
}

/// Encode an identity as store hash fields.
pub fn identity_to_fields(identity: &Identity) -> [(&'static str, String); 2] {
    let flag = if identity.is_authenticated() { "1" } else { "0" };
    [
        (FIELD_ID, identity.id().to_string()),
        (FIELD_IS_AUTHENTICATED, flag.to_string()),
    ]
}

/// Decode the hash fields stored for `token` into an identity.
///
/// An empty hash means the key does not exist. A hash whose `id` field is
/// missing or names a different token is unusable and is reported as missing
/// too, so the visitor gets reprovisioned instead of locked out.
pub fn identity_from_fields(
    token: &VisitorToken,
    fields: &HashMap<String, String>,
) -> IdentityResult<Identity> {
    let key = token.store_key();
    if fields.is_empty() {
        return Err(IdentityError::NotFound(key.into_inner()));
    }

    let Some(id) = fields.get(FIELD_ID).filter(|id| !id.is_empty()) else {
        tracing::warn!(key = %key, "visitor record has no id field, treating as missing");
        return Err(IdentityError::NotFound(key.into_inner()));
    };

    if id.as_str() != token.as_str() {
        tracing::warn!(
            key = %key,
            stored = %VisitorToken::new(id.clone()).fingerprint(),
            "visitor record id does not match its key, treating as missing"
        );
        return Err(IdentityError::NotFound(key.into_inner()));
    }

    let is_authenticated = matches!(
        fields.get(FIELD_IS_AUTHENTICATED).map(String::as_str),
        Some("1") | Some("true")
    );

    Ok(Identity::new(token.clone(), is_authenticated))
}

/// Redis-backed identity store.
///
/// Each visitor is one hash at `visitor:<token>`. The connection manager is
/// multiplexed and cheap to clone, so concurrent requests share it without
/// locking.
#[derive(Clone)]
pub struct RedisIdentityStore {
    conn: ConnectionManager,
}

impl RedisIdentityStore {
    /// Connect to the store described by `config`.
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        let url = config.connection_url()?;
        let client = redis::Client::open(url.as_str())?;
        let conn = ConnectionManager::new(client).await?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = config.database,
            "connected to identity store"
        );

        Ok(Self { conn })
    }

    /// Round-trip a PING to verify the store is reachable.
    pub async fn ping(&self) -> IdentityResult<()> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply != "PONG" {
            return Err(IdentityError::Infrastructure(format!(
                "unexpected PING reply: {}",
                reply
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityReader for RedisIdentityStore {
    async fn get(&self, id: &VisitorToken) -> IdentityResult<Identity> {
        let key = id.store_key();
        let mut conn = self.conn.clone();

        let fields: HashMap<String, String> = conn.hgetall(key.as_str()).await?;
        identity_from_fields(id, &fields)
    }
}

#[async_trait]
impl IdentityWriter for RedisIdentityStore {
    async fn set(&self, id: &VisitorToken, identity: &Identity) -> IdentityResult<()> {
        let key = id.store_key();
        let mut conn = self.conn.clone();

        let fields = identity_to_fields(identity);
        let _: () = conn.hset_multiple(key.as_str(), &fields[..]).await?;
        Ok(())
    }
}

/// In-memory identity store.
///
/// Stores records as the same hash fields the Redis store writes, so the
/// encoding is exercised identically.
#[derive(Clone, Default)]
pub struct InMemoryIdentityStore {
    records: Arc<RwLock<HashMap<VisitorKey, HashMap<String, String>>>>,
}

impl InMemoryIdentityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a record exists under `key`.
    pub async fn contains_key(&self, key: &VisitorKey) -> bool {
        self.records.read().await.contains_key(key)
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Raw hash fields stored under `key`.
    pub async fn fields(&self, key: &VisitorKey) -> Option<HashMap<String, String>> {
        self.records.read().await.get(key).cloned()
    }

    /// Drop a record, as store eviction would.
    pub async fn evict(&self, key: &VisitorKey) -> bool {
        self.records.write().await.remove(key).is_some()
    }
}

#[async_trait]
impl IdentityReader for InMemoryIdentityStore {
    async fn get(&self, id: &VisitorToken) -> IdentityResult<Identity> {
        let key = id.store_key();
        let records = self.records.read().await;
        let fields = records.get(&key).cloned().unwrap_or_default();
        identity_from_fields(id, &fields)
    }
}

#[async_trait]
impl IdentityWriter for InMemoryIdentityStore {
    async fn set(&self, id: &VisitorToken, identity: &Identity) -> IdentityResult<()> {
        let fields = identity_to_fields(identity)
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        self.records.write().await.insert(id.store_key(), fields);
        Ok(())
    }
}
