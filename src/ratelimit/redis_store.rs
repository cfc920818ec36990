//! Redis-backed window store using one sorted set per key.
//!
//! Every request is a member of the key's sorted set, scored by its arrival
//! time in milliseconds. Pruning, recording and counting run as a single
//! `MULTI`/`EXEC` transaction, so all instances sharing the Redis server see a
//! total order of window updates per key.

use std::time::Duration;

use async_trait::async_trait;
use deadpool::managed::Object;
use redis::RedisError;
use tracing::{debug, info, warn};

use super::backend::WindowStore;
use super::redis_pool::{create_pool, Manager, Pool};
use super::window::{window_cutoff, WindowEntry};
use crate::config::RedisConfig;
use crate::error::StoreError;

/// Redis window store implementation.
pub struct RedisWindowStore {
    /// Redis connection pool.
    pool: Pool,
    /// Key prefix for all rate limit keys.
    key_prefix: String,
    /// Upper bound for one window transaction, including connection checkout.
    response_timeout: Duration,
}

impl RedisWindowStore {
    /// Create a store and verify the server answers.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let store = Self::new(config)?;
        store.ping().await?;

        info!(
            key_prefix = %store.key_prefix,
            response_timeout = ?store.response_timeout,
            "Connected to Redis window store"
        );

        Ok(store)
    }

    /// Create a store without contacting the server.
    pub fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let pool = create_pool(config)
            .map_err(|e| StoreError::Connection(format!("Failed to create Redis connection pool: {e}")))?;

        Ok(Self {
            pool,
            key_prefix: config.key_prefix.clone(),
            response_timeout: config.response_timeout(),
        })
    }

    /// Check that the server is reachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.with_timeout(async {
            let mut conn = self.connection().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .map_err(|e| StoreError::Connection(format!("Failed to ping Redis server: {e}")))?;
            Ok(())
        })
        .await
    }

    /// Remove the whole history of a key.
    pub async fn reset(&self, key: &str) -> Result<(), StoreError> {
        let redis_key = self.redis_key(key);
        self.with_timeout(async {
            let mut conn = self.connection().await?;
            let _: () = redis::cmd("DEL")
                .arg(&redis_key)
                .query_async(&mut *conn)
                .await
                .map_err(query_error)?;
            Ok(())
        })
        .await
    }

    /// The namespaced Redis key for a rate limit key.
    fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Result<Object<Manager>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.response_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.response_timeout, "Redis call timed out");
                Err(StoreError::Timeout(self.response_timeout))
            }
        }
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn apply_window(
        &self,
        key: &str,
        now_millis: i64,
        window: Duration,
    ) -> Result<u64, StoreError> {
        let redis_key = self.redis_key(key);
        let cutoff = window_cutoff(now_millis, window);
        let entry = WindowEntry::unique(now_millis);

        let count = self
            .with_timeout(async {
                let mut conn = self.connection().await?;

                let (count,): (u64,) = redis::pipe()
                    .atomic()
                    .zrembyscore(&redis_key, "-inf", cutoff)
                    .ignore()
                    .zadd(&redis_key, entry.member(), now_millis)
                    .ignore()
                    .zcard(&redis_key)
                    .query_async(&mut *conn)
                    .await
                    .map_err(query_error)?;

                Ok(count)
            })
            .await?;

        debug!(
            key = %redis_key,
            cutoff = cutoff,
            count = count,
            "Applied Redis window"
        );

        Ok(count)
    }
}

fn query_error(e: RedisError) -> StoreError {
    if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Query(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    fn unique_prefix() -> String {
        format!("ratewindow-test:{}:", uuid::Uuid::new_v4().simple())
    }

    /// A server that accepts connections and never answers.
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        format!("redis://{addr}")
    }

    async fn silent_store() -> RedisWindowStore {
        let mut config = RedisConfig::new(silent_server().await);
        config.response_timeout_ms = 300;
        RedisWindowStore::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_redis_key_uses_prefix() {
        let mut config = RedisConfig::new("redis://localhost:6379");
        config.key_prefix = "test:".to_string();

        let store = RedisWindowStore::new(&config).unwrap();

        assert_eq!(store.redis_key("10.0.0.1"), "test:10.0.0.1");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_store_error() {
        let mut config = RedisConfig::new("redis://127.0.0.1:1");
        config.response_timeout_ms = 500;

        let store = RedisWindowStore::new(&config).unwrap();
        let err = assert_err!(store.apply_window("k", 0, Duration::from_secs(1)).await);

        assert!(matches!(
            err,
            StoreError::Connection(_) | StoreError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn test_connect_fails_fast_without_server() {
        let mut config = RedisConfig::new("redis://127.0.0.1:1");
        config.response_timeout_ms = 500;

        assert!(RedisWindowStore::connect(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out() {
        let store = silent_store().await;

        let started = std::time::Instant::now();
        let err = assert_err!(store.apply_window("k", 0, Duration::from_secs(1)).await);

        assert!(matches!(err, StoreError::Timeout(t) if t == Duration::from_millis(300)));
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_engine_reports_timeout_as_store_unavailable() {
        let store = std::sync::Arc::new(silent_store().await);
        let engine = crate::ratelimit::RateDecisionEngine::new(store, Default::default());

        let err = assert_err!(engine.evaluate("10.0.0.1").await);

        assert!(matches!(
            err,
            crate::error::LimitError::StoreUnavailable(StoreError::Timeout(_))
        ));
        assert!(!err.is_exceeded());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server at REDIS_URL"]
    async fn test_apply_window_against_redis() {
        let mut config = RedisConfig::new(redis_url());
        config.key_prefix = unique_prefix();
        let store = RedisWindowStore::connect(&config).await.unwrap();
        let window = Duration::from_secs(10);

        assert_eq!(store.apply_window("k", 1_000, window).await.unwrap(), 1);
        assert_eq!(store.apply_window("k", 1_000, window).await.unwrap(), 2);
        assert_eq!(store.apply_window("other", 1_000, window).await.unwrap(), 1);

        // 11_000 is exactly one window after 1_000: both entries are pruned.
        assert_eq!(store.apply_window("k", 11_000, window).await.unwrap(), 1);

        store.reset("k").await.unwrap();
        store.reset("other").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires a running Redis server at REDIS_URL"]
    async fn test_concurrent_transactions_are_totally_ordered() {
        let mut config = RedisConfig::new(redis_url());
        config.key_prefix = unique_prefix();
        let store = std::sync::Arc::new(RedisWindowStore::connect(&config).await.unwrap());

        let tasks = (0..32).map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .apply_window("k", 5_000, Duration::from_secs(60))
                    .await
                    .unwrap()
            })
        });

        let mut counts: Vec<u64> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        counts.sort_unstable();

        assert_eq!(counts, (1..=32).collect::<Vec<u64>>());
        store.reset("k").await.unwrap();
    }
}
