//! Redis connection pool.
//!
//! The manager is adapted from the `deadpool-redis` manager: connections are
//! multiplexed and checked with a numbered `PING` before reuse.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use deadpool::managed::{self, Metrics};
use redis::{aio::MultiplexedConnection, Client, RedisError, RedisResult};

use crate::config::RedisConfig;

/// Redis connection pool.
pub type Pool = managed::Pool<Manager>;

/// Manager for Redis connections.
#[derive(Debug)]
pub struct Manager {
    client: Client,
    ping_number: AtomicUsize,
}

impl Manager {
    /// Create a new Redis pool manager.
    pub fn new(config: &RedisConfig) -> RedisResult<Self> {
        Ok(Self {
            client: Client::open(config.url.as_str())?,
            ping_number: AtomicUsize::new(0),
        })
    }
}

impl managed::Manager for Manager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> Result<MultiplexedConnection, Self::Error> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(
        &self,
        conn: &mut MultiplexedConnection,
        _: &Metrics,
    ) -> managed::RecycleResult<Self::Error> {
        let ping_number = self.ping_number.fetch_add(1, Ordering::Relaxed).to_string();

        let (n,) = redis::Pipeline::with_capacity(2)
            .cmd("UNWATCH")
            .ignore()
            .cmd("PING")
            .arg(&ping_number)
            .query_async::<(String,)>(conn)
            .await?;

        if n == ping_number {
            Ok(())
        } else {
            Err(managed::RecycleError::message("Invalid PING response"))
        }
    }
}

/// Create a Redis connection pool from configuration.
pub fn create_pool(config: &RedisConfig) -> RedisResult<Pool> {
    let manager = Manager::new(config)?;

    let mut pool_config = managed::PoolConfig::default();

    if let Some(max_size) = config.pool.max_size {
        pool_config.max_size = max_size;
    }

    if let Some(timeout_wait) = config.pool.timeout_wait_ms {
        pool_config.timeouts.wait = Some(Duration::from_millis(timeout_wait));
    }

    if let Some(timeout_create) = config.pool.timeout_create_ms {
        pool_config.timeouts.create = Some(Duration::from_millis(timeout_create));
    }

    if let Some(timeout_recycle) = config.pool.timeout_recycle_ms {
        pool_config.timeouts.recycle = Some(Duration::from_millis(timeout_recycle));
    }

    Pool::builder(manager)
        .config(pool_config)
        .runtime(deadpool::Runtime::Tokio1)
        .build()
        .map_err(|e| RedisError::from((redis::ErrorKind::IoError, "Failed to create pool", e.to_string())))
}
