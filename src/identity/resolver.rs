//! Visitor identity resolution.
//!
//! Every request lands in exactly one of three states, decided from the
//! cookie and the store:
//!
//! | State     | Meaning                              | Action                         |
//! |-----------|--------------------------------------|--------------------------------|
//! | `NoCookie`| no (or empty) visitor cookie         | provision a new identity       |
//! | `Known`   | cookie present, record found         | reuse the stored identity      |
//! | `Unknown` | cookie present, record missing       | provision, overwrite the cookie|
//!
//! Store transport failures and token generation failures abort resolution;
//! only a store miss is recovered locally.

use std::future::Future;
use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, IdentityConfig};
use crate::identity::context::Identity;
use crate::identity::cookies::CookieCodec;
use crate::identity::error::{IdentityError, IdentityResult};
use crate::identity::store::{IdentityReader, IdentityWriter};
use crate::identity::token::{OsTokenGenerator, TokenGenerator};
use crate::types::VisitorToken;

/// What the cookie and the store say about the visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieState {
    NoCookie,
    Known(Identity),
    Unknown(VisitorToken),
}

/// Why a new identity was provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionReason {
    /// First contact: the request carried no visitor cookie.
    NoCookie,
    /// The cookie named a record the store does not have (evicted, stale or forged).
    UnknownCookie,
}

/// Next step for a classified request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Reuse(Identity),
    Provision(ProvisionReason),
}

/// Map a cookie state to the action to take.
pub fn decide(state: CookieState) -> Action {
    match state {
        CookieState::NoCookie => Action::Provision(ProvisionReason::NoCookie),
        CookieState::Known(identity) => Action::Reuse(identity),
        CookieState::Unknown(_) => Action::Provision(ProvisionReason::UnknownCookie),
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    identity: Identity,
    provisioned: Option<ProvisionReason>,
}

impl Resolution {
    /// Identity resolved from an existing record.
    pub fn reused(identity: Identity) -> Self {
        Self {
            identity,
            provisioned: None,
        }
    }

    /// Identity created during this request.
    pub fn provisioned(identity: Identity, reason: ProvisionReason) -> Self {
        Self {
            identity,
            provisioned: Some(reason),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn into_identity(self) -> Identity {
        self.identity
    }

    /// Whether a new cookie must be issued on the response.
    pub fn is_provisioned(&self) -> bool {
        self.provisioned.is_some()
    }

    pub fn reason(&self) -> Option<ProvisionReason> {
        self.provisioned
    }
}

/// Resolves or provisions the visitor identity for a request.
///
/// Holds no per-request state; one instance is shared by every request.
pub struct IdentityResolver {
    config: IdentityConfig,
    cookies: CookieCodec,
    reader: Arc<dyn IdentityReader>,
    writer: Arc<dyn IdentityWriter>,
    tokens: Arc<dyn TokenGenerator>,
}

impl IdentityResolver {
    /// Create a resolver from explicit collaborators.
    pub fn new(
        config: IdentityConfig,
        reader: Arc<dyn IdentityReader>,
        writer: Arc<dyn IdentityWriter>,
        tokens: Arc<dyn TokenGenerator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let cookies = CookieCodec::from_config(&config)?;

        Ok(Self {
            config,
            cookies,
            reader,
            writer,
            tokens,
        })
    }

    /// Create a resolver over a single store providing both capabilities,
    /// generating tokens from the OS CSPRNG.
    pub fn with_store<S>(config: IdentityConfig, store: S) -> Result<Self, ConfigError>
    where
        S: IdentityReader + IdentityWriter + 'static,
    {
        let store = Arc::new(store);
        let reader: Arc<dyn IdentityReader> = store.clone();
        let writer: Arc<dyn IdentityWriter> = store;
        Self::new(config, reader, writer, Arc::new(OsTokenGenerator))
    }

    /// Get the cookie codec.
    pub fn cookies(&self) -> &CookieCodec {
        &self.cookies
    }

    /// Classify the request from its cookie and the store.
    pub async fn classify(&self, headers: &HeaderMap) -> IdentityResult<CookieState> {
        let Some(token) = self.cookies.extract(headers) else {
            return Ok(CookieState::NoCookie);
        };

        match self.within_deadline("get", self.reader.get(&token)).await {
            Ok(identity) => Ok(CookieState::Known(identity)),
            Err(IdentityError::NotFound(_)) => Ok(CookieState::Unknown(token)),
            Err(e) => Err(e),
        }
    }

    /// Resolve the visitor identity for a request.
    pub async fn resolve(&self, headers: &HeaderMap) -> IdentityResult<Resolution> {
        let state = self.classify(headers).await?;

        if let CookieState::Unknown(stale) = &state {
            if self.config.flag_unknown_cookies {
                warn!(
                    token = %stale.fingerprint(),
                    "visitor cookie has no stored identity, reprovisioning"
                );
            } else {
                debug!(
                    token = %stale.fingerprint(),
                    "visitor cookie has no stored identity, reprovisioning"
                );
            }
        }

        match decide(state) {
            Action::Reuse(identity) => {
                debug!(token = %identity.id().fingerprint(), "visitor identity reused");
                Ok(Resolution::reused(identity))
            }
            Action::Provision(reason) => {
                let identity = self.provision().await?;
                info!(
                    token = %identity.id().fingerprint(),
                    reason = ?reason,
                    "visitor identity provisioned"
                );
                Ok(Resolution::provisioned(identity, reason))
            }
        }
    }

    /// Generate a token and persist a fresh unauthenticated identity for it.
    pub async fn provision(&self) -> IdentityResult<Identity> {
        let token = self.tokens.generate(self.config.token_bytes)?;
        let identity = Identity::anonymous(token);

        self.within_deadline("set", self.writer.set(identity.id(), &identity))
            .await?;

        Ok(identity)
    }

    async fn within_deadline<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = IdentityResult<T>>,
    ) -> IdentityResult<T> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(IdentityError::Infrastructure(format!(
                "store {} timed out after {:?}",
                operation, self.config.store_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::store::InMemoryIdentityStore;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use axum::http::header::COOKIE;
    use std::time::Duration;

    struct FailingStore;

    #[async_trait]
    impl IdentityReader for FailingStore {
        async fn get(&self, _id: &VisitorToken) -> IdentityResult<Identity> {
            Err(IdentityError::Infrastructure("connection refused".to_string()))
        }
    }

    #[async_trait]
    impl IdentityWriter for FailingStore {
        async fn set(&self, _id: &VisitorToken, _identity: &Identity) -> IdentityResult<()> {
            Err(IdentityError::Infrastructure("connection refused".to_string()))
        }
    }

    struct HangingStore;

    #[async_trait]
    impl IdentityReader for HangingStore {
        async fn get(&self, _id: &VisitorToken) -> IdentityResult<Identity> {
            std::future::pending().await
        }
    }

    /// Writer whose calls never complete.
    struct HangingWriter;

    #[async_trait]
    impl IdentityWriter for HangingWriter {
        async fn set(&self, _id: &VisitorToken, _identity: &Identity) -> IdentityResult<()> {
            std::future::pending().await
        }
    }

    struct NoEntropy;

    impl TokenGenerator for NoEntropy {
        fn generate(&self, _byte_size: usize) -> IdentityResult<VisitorToken> {
            Err(IdentityError::Generation("entropy source unavailable".to_string()))
        }
    }

    fn cookie(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("visitor_info={}", token)).unwrap(),
        );
        headers
    }

    fn resolver(store: InMemoryIdentityStore) -> IdentityResolver {
        IdentityResolver::with_store(IdentityConfig::default(), store).unwrap()
    }

    #[test]
    fn test_decide_table() {
        let identity = Identity::anonymous(VisitorToken::new("tok"));

        assert_eq!(
            decide(CookieState::NoCookie),
            Action::Provision(ProvisionReason::NoCookie)
        );
        assert_eq!(
            decide(CookieState::Known(identity.clone())),
            Action::Reuse(identity)
        );
        assert_eq!(
            decide(CookieState::Unknown(VisitorToken::new("tok"))),
            Action::Provision(ProvisionReason::UnknownCookie)
        );
    }

    #[tokio::test]
    async fn test_classify_states() {
        let store = InMemoryIdentityStore::new();
        let known = Identity::new(VisitorToken::new("known"), true);
        store.set(known.id(), &known).await.unwrap();
        let resolver = resolver(store);

        assert_eq!(
            resolver.classify(&HeaderMap::new()).await.unwrap(),
            CookieState::NoCookie
        );
        assert_eq!(
            resolver.classify(&cookie("known")).await.unwrap(),
            CookieState::Known(known)
        );
        assert_eq!(
            resolver.classify(&cookie("ghost")).await.unwrap(),
            CookieState::Unknown(VisitorToken::new("ghost"))
        );
    }

    #[tokio::test]
    async fn test_resolve_without_cookie_provisions() {
        let store = InMemoryIdentityStore::new();
        let resolver = resolver(store.clone());

        let resolution = resolver.resolve(&HeaderMap::new()).await.unwrap();

        assert_eq!(resolution.reason(), Some(ProvisionReason::NoCookie));
        assert!(!resolution.identity().is_authenticated());
        assert_eq!(resolution.identity().id().as_str().len(), 22);
        let stored = store.get(resolution.identity().id()).await.unwrap();
        assert_eq!(&stored, resolution.identity());
    }

    #[tokio::test]
    async fn test_resolve_known_cookie_reuses_stored_identity() {
        let store = InMemoryIdentityStore::new();
        let known = Identity::new(VisitorToken::new("known"), true);
        store.set(known.id(), &known).await.unwrap();
        let resolver = resolver(store.clone());

        let resolution = resolver.resolve(&cookie("known")).await.unwrap();

        assert!(!resolution.is_provisioned());
        assert_eq!(resolution.into_identity(), known);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_unknown_cookie_reprovisions() {
        let store = InMemoryIdentityStore::new();
        let resolver = resolver(store.clone());

        let resolution = resolver.resolve(&cookie("abc123")).await.unwrap();

        assert_eq!(resolution.reason(), Some(ProvisionReason::UnknownCookie));
        assert_ne!(resolution.identity().id().as_str(), "abc123");
        assert!(!store.contains_key(&VisitorToken::new("abc123").store_key()).await);
        assert!(store.contains_key(&resolution.identity().id().store_key()).await);
    }

    #[tokio::test]
    async fn test_resolve_aborts_on_store_failure() {
        let resolver =
            IdentityResolver::with_store(IdentityConfig::default(), FailingStore).unwrap();

        let with_cookie = resolver.resolve(&cookie("tok")).await;
        assert!(matches!(with_cookie, Err(IdentityError::Infrastructure(_))));

        let without_cookie = resolver.resolve(&HeaderMap::new()).await;
        assert!(matches!(without_cookie, Err(IdentityError::Infrastructure(_))));
    }

    #[tokio::test]
    async fn test_resolve_aborts_on_generation_failure() {
        let store = InMemoryIdentityStore::new();
        let resolver = IdentityResolver::new(
            IdentityConfig::default(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(NoEntropy),
        )
        .unwrap();

        let result = resolver.resolve(&HeaderMap::new()).await;

        assert!(matches!(result, Err(IdentityError::Generation(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_resolve_times_out_on_hung_store() {
        let config = IdentityConfig {
            store_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let memory = InMemoryIdentityStore::new();
        let resolver = IdentityResolver::new(
            config,
            Arc::new(HangingStore),
            Arc::new(memory),
            Arc::new(OsTokenGenerator),
        )
        .unwrap();

        let result = resolver.resolve(&cookie("tok")).await;
        assert!(matches!(result, Err(IdentityError::Infrastructure(msg)) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_provision_times_out_on_hung_write() {
        let config = IdentityConfig {
            store_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let resolver = IdentityResolver::new(
            config,
            Arc::new(InMemoryIdentityStore::new()),
            Arc::new(HangingWriter),
            Arc::new(OsTokenGenerator),
        )
        .unwrap();

        for headers in [HeaderMap::new(), cookie("stale")] {
            let result = resolver.resolve(&headers).await;
            assert!(matches!(
                result,
                Err(IdentityError::Infrastructure(msg)) if msg.starts_with("store set timed out")
            ));
        }
    }

    #[tokio::test]
    async fn test_concurrent_stale_cookie_reprovisions_independently() {
        let store = InMemoryIdentityStore::new();
        let resolver = Arc::new(resolver(store.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.resolve(&cookie("stale")).await })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let resolution = handle.await.unwrap().unwrap();
            assert!(resolution.is_provisioned());
            ids.insert(resolution.into_identity().id().clone());
        }

        assert_eq!(ids.len(), 8);
        assert_eq!(store.len().await, 8);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = IdentityConfig {
            token_bytes: 0,
            ..Default::default()
        };
        assert!(IdentityResolver::with_store(config, InMemoryIdentityStore::new()).is_err());
    }
}
