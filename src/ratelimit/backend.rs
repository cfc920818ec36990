//! Window store trait for abstracting local and shared implementations.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Trait for window store implementations.
///
/// This trait abstracts over both the process-local `InMemoryWindowStore` and
/// the shared `RedisWindowStore` so the decision engine works with either.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Prune, record and count in one indivisible step.
    ///
    /// Removes every entry for `key` scored at or before `now_millis - window`,
    /// records one new entry scored `now_millis`, and returns the resulting
    /// number of entries. No other call for the same key may observe or
    /// interleave with the intermediate state.
    async fn apply_window(
        &self,
        key: &str,
        now_millis: i64,
        window: Duration,
    ) -> Result<u64, StoreError>;
}
