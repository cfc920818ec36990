//! Rate decision engine.

use std::sync::Arc;

use tracing::{debug, instrument, trace, warn};

use super::backend::WindowStore;
use super::clock::{Clock, SystemClock};
use crate::config::WindowConfig;
use crate::error::{LimitError, StoreError};

/// Result of evaluating one request against its key's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionResult {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// Entries in the window after recording this request.
    pub observed_count: u64,
}

/// Decides whether a request is within its key's sliding window limit.
///
/// The engine holds no per-key state. Every call records the request in the
/// shared store first and then compares the resulting count to the limit, so
/// denied requests also occupy a slot until they age out of the window.
pub struct RateDecisionEngine {
    /// Shared store holding the request history
    store: Arc<dyn WindowStore>,
    /// Time source for window boundaries
    clock: Arc<dyn Clock>,
    /// Window length and request ceiling
    config: WindowConfig,
}

impl RateDecisionEngine {
    /// Create an engine that reads the wall clock.
    pub fn new(store: Arc<dyn WindowStore>, config: WindowConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    /// Create an engine with an explicit time source.
    pub fn with_clock(store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>, config: WindowConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// The window configuration this engine enforces.
    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Record a request for `key` and report the decision.
    ///
    /// `key` must be non-empty; callers without an identifying key should
    /// skip limiting instead of calling this.
    ///
    /// Store failures are returned as errors; a denial is a normal result with
    /// `allowed == false`.
    #[instrument(skip(self), level = "trace")]
    pub async fn decide(&self, key: &str) -> Result<DecisionResult, StoreError> {
        let now = self.clock.now_millis();

        let observed_count = self
            .store
            .apply_window(key, now, self.config.window())
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Window store unavailable");
                e
            })?;

        let allowed = observed_count <= self.config.max_requests.get();

        trace!(
            key = %key,
            now = now,
            observed_count = observed_count,
            allowed = allowed,
            "Evaluated sliding window"
        );

        Ok(DecisionResult {
            allowed,
            observed_count,
        })
    }

    /// Record a request for `key`, failing with a typed error unless it is admitted.
    ///
    /// Returns [`LimitError::RateLimitExceeded`] when the window holds more
    /// than `max_requests` entries and [`LimitError::StoreUnavailable`] when
    /// the store could not be consulted. No retry is attempted.
    pub async fn evaluate(&self, key: &str) -> Result<DecisionResult, LimitError> {
        let decision = self.decide(key).await?;

        if !decision.allowed {
            debug!(
                key = %key,
                observed_count = decision.observed_count,
                max_requests = self.config.max_requests.get(),
                "Rate limit exceeded"
            );
            return Err(LimitError::RateLimitExceeded {
                observed_count: decision.observed_count,
                max_requests: self.config.max_requests.get(),
            });
        }

        Ok(decision)
    }
}
