//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::layer::RateLimitLayer;
use crate::config::HttpConfig;
use crate::error::{RateWindowError, Result};
use crate::ratelimit::RateDecisionEngine;

/// Build the application router.
///
/// Only routes wrapped in the rate limit layer are limited; health checks
/// stay reachable for clients that are over their limit.
pub fn router(rate_limit: RateLimitLayer) -> Router {
    Router::new()
        .route("/", get(current_time).layer(rate_limit))
        .route("/healthz", get(health))
}

/// Current UTC time in RFC 3339 format.
async fn current_time() -> String {
    chrono::Utc::now().to_rfc3339()
}

async fn health() -> &'static str {
    "ok"
}

/// HTTP server for the rate limited service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The decision engine shared by all requests
    engine: Arc<RateDecisionEngine>,
    /// Key extraction and failure policy
    http: HttpConfig,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, engine: Arc<RateDecisionEngine>, http: HttpConfig) -> Self {
        Self { addr, engine, http }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = router(RateLimitLayer::new(self.engine, &self.http)?);

        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            RateWindowError::Io(e)
        })?;

        info!(
            addr = %self.addr,
            key_header = %self.http.key_header,
            on_store_failure = ?self.http.on_store_failure,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                RateWindowError::Io(e)
            })
    }
}
