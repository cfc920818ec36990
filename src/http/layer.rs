//! Rate limiting middleware for HTTP requests.

use std::{
    convert::Infallible,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use http::{HeaderName, Request, StatusCode};
use tower::{Layer, Service};
use tracing::{debug, error, warn};

use crate::config::{HttpConfig, StoreFailurePolicy};
use crate::error::{LimitError, RateWindowError, Result};
use crate::ratelimit::RateDecisionEngine;

/// Body sent with every rejection. Carries no detail about the limit.
pub const TOO_MANY_REQUESTS_BODY: &str = "Too-many-requests";

/// Body sent when the store is down and the policy is to report it.
pub const STORE_FAILURE_BODY: &str = "Internal server error";

/// Tower layer that evaluates the rate limit before the wrapped handler runs.
#[derive(Clone)]
pub struct RateLimitLayer {
    engine: Arc<RateDecisionEngine>,
    key_header: HeaderName,
    on_store_failure: StoreFailurePolicy,
}

impl RateLimitLayer {
    /// Create a layer from the HTTP configuration.
    pub fn new(engine: Arc<RateDecisionEngine>, config: &HttpConfig) -> Result<Self> {
        let key_header = HeaderName::try_from(config.key_header.as_str()).map_err(|e| {
            RateWindowError::Config(format!("Invalid key header {:?}: {e}", config.key_header))
        })?;

        Ok(Self {
            engine,
            key_header,
            on_store_failure: config.on_store_failure,
        })
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, next: S) -> Self::Service {
        RateLimitService {
            next,
            layer: self.clone(),
        }
    }
}

/// Service produced by [`RateLimitLayer`].
#[derive(Clone)]
pub struct RateLimitService<S> {
    next: S,
    layer: RateLimitLayer,
}

impl<S, ReqBody> Service<Request<ReqBody>> for RateLimitService<S>
where
    S: Service<Request<ReqBody>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, std::result::Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Keep the service that was polled ready and leave a fresh clone behind.
        let clone = self.next.clone();
        let mut next = std::mem::replace(&mut self.next, clone);
        let layer = self.layer.clone();

        Box::pin(async move {
            let Some(key) = extract_key(&req, &layer.key_header) else {
                debug!(header = %layer.key_header, "No client key on request - skipping rate limit");
                return next.call(req).await;
            };

            let err = match layer.engine.evaluate(&key).await {
                Ok(_) => return next.call(req).await,
                Err(err) => err,
            };

            match err {
                LimitError::RateLimitExceeded { .. } => {
                    debug!(key = %key, "Request rejected due to rate limit");
                    Ok(too_many_requests())
                }
                LimitError::StoreUnavailable(e) => match layer.on_store_failure {
                    StoreFailurePolicy::Error => {
                        error!(key = %key, error = %e, "Rate limit store unavailable");
                        Ok((StatusCode::INTERNAL_SERVER_ERROR, STORE_FAILURE_BODY).into_response())
                    }
                    StoreFailurePolicy::Allow => {
                        warn!(key = %key, error = %e, "Rate limit store unavailable - failing open");
                        next.call(req).await
                    }
                    StoreFailurePolicy::Deny => {
                        warn!(key = %key, error = %e, "Rate limit store unavailable - failing closed");
                        Ok(too_many_requests())
                    }
                },
            }
        })
    }
}

fn too_many_requests() -> Response<Body> {
    (StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS_BODY).into_response()
}

/// Extract the client key from a request header.
///
/// For comma-separated values such as `X-Forwarded-For` chains the first
/// entry identifies the client. Empty or non-ASCII values yield no key.
fn extract_key<B>(req: &Request<B>, header: &HeaderName) -> Option<String> {
    let value = req.headers().get(header)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();

    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(header: &str, value: &str) -> Request<()> {
        Request::builder().header(header, value).body(()).unwrap()
    }

    #[test]
    fn test_extract_key_first_forwarded_entry() {
        let header = HeaderName::from_static("x-forwarded-for");
        let req = request_with("x-forwarded-for", " 203.0.113.7 , 10.0.0.1");

        assert_eq!(extract_key(&req, &header).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_extract_key_missing_or_empty() {
        let header = HeaderName::from_static("x-forwarded-for");

        let req = Request::builder().body(()).unwrap();
        assert_eq!(extract_key(&req, &header), None);

        let req = request_with("x-forwarded-for", "  ");
        assert_eq!(extract_key(&req, &header), None);
    }

    #[test]
    fn test_extract_key_custom_header() {
        let header = HeaderName::from_static("x-client-id");
        let req = request_with("x-client-id", "tenant-42");

        assert_eq!(extract_key(&req, &header).as_deref(), Some("tenant-42"));
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let engine = Arc::new(RateDecisionEngine::new(
            Arc::new(crate::ratelimit::InMemoryWindowStore::new()),
            Default::default(),
        ));
        let config = HttpConfig {
            key_header: "not a header".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            RateLimitLayer::new(engine, &config),
            Err(RateWindowError::Config(_))
        ));
    }
}
