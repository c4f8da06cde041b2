//! HTTP server lifecycle.
//!
//! Binds the listener, serves the router, and drains in-flight requests on
//! SIGINT/SIGTERM within the configured shutdown deadline.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::identity::RedisIdentityStore;

/// Connect to the store and serve until a shutdown signal arrives.
pub async fn serve(config: GatewayConfig) -> Result<()> {
    let store = RedisIdentityStore::connect(&config.store)
        .await
        .context("Failed to connect to identity store")?;
    store
        .ping()
        .await
        .context("Identity store did not answer PING")?;

    let app = crate::create_app(&config, store)?;

    let listener = TcpListener::bind(config.http.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.http.bind))?;

    info!(
        bind = %config.http.bind,
        environment = %config.environment,
        cookie = %config.identity.cookie_name,
        "Gateway listening on http://{}",
        config.http.bind
    );

    serve_with_shutdown(listener, app, config.http.shutdown_timeout, shutdown_signal()).await
}

/// Serve `app` until `signal` resolves, then give in-flight requests
/// `deadline` to finish.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    app: axum::Router,
    deadline: std::time::Duration,
    signal: F,
) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            result.context("Server task panicked")??;
            return Ok(());
        }
        _ = signal => {}
    }

    info!("shutdown signal received");
    let _ = stop_tx.send(true);

    match tokio::time::timeout(deadline, server).await {
        Ok(result) => {
            result.context("Server task panicked")??;
            info!("http server shutdown completed");
            Ok(())
        }
        Err(_) => {
            error!(deadline = ?deadline, "graceful shutdown timed out");
            Err(anyhow::anyhow!(
                "Graceful shutdown did not complete within {:?}",
                deadline
            ))
        }
    }
}

/// Resolve on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use crate::config::{HttpConfig, IdentityConfig};
    use crate::identity::{IdentityResolver, InMemoryIdentityStore};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let resolver = Arc::new(
            IdentityResolver::with_store(IdentityConfig::default(), InMemoryIdentityStore::new())
                .unwrap(),
        );
        let app = create_router(resolver, &HttpConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(serve_with_shutdown(
            listener,
            app,
            Duration::from_secs(5),
            async move {
                let _ = rx.await;
            },
        ));

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
