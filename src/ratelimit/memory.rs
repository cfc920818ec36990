//! Process-local window store.
//!
//! Useful for tests and single-instance deployments. Instances do not share
//! state, so it does not enforce a limit across processes.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::backend::WindowStore;
use super::window::{is_within_window, window_cutoff, WindowEntry};
use crate::error::StoreError;

/// In-memory window store keyed by rate limit key.
///
/// Each key's entries are mutated while holding the map shard's write lock,
/// which makes prune, record and count atomic per key.
#[derive(Debug, Default)]
pub struct InMemoryWindowStore {
    windows: DashMap<String, BTreeSet<WindowEntry>>,
    next_token: AtomicU64,
}

impl InMemoryWindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held for `key`.
    pub fn entry_count(&self, key: &str) -> usize {
        self.windows.get(key).map(|w| w.len()).unwrap_or(0)
    }

    /// Number of keys with recorded history.
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }

    /// Drop all recorded history.
    pub fn clear(&self) {
        self.windows.clear();
    }
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    async fn apply_window(
        &self,
        key: &str,
        now_millis: i64,
        window: Duration,
    ) -> Result<u64, StoreError> {
        let cutoff = window_cutoff(now_millis, window);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.windows.entry(key.to_string()).or_default();

        let before = entries.len();
        entries.retain(|entry| is_within_window(entry.timestamp_millis, cutoff));

        entries.insert(WindowEntry::new(now_millis, token.to_string()));
        let count = entries.len() as u64;

        trace!(
            key = %key,
            pruned = before + 1 - entries.len(),
            count = count,
            "Applied in-memory window"
        );

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_records_and_counts() {
        let store = InMemoryWindowStore::new();

        assert_eq!(store.apply_window("k", 0, WINDOW).await.unwrap(), 1);
        assert_eq!(store.apply_window("k", 1, WINDOW).await.unwrap(), 2);
        assert_eq!(store.entry_count("k"), 2);
        assert_eq!(store.entry_count("other"), 0);
    }

    #[tokio::test]
    async fn test_same_millisecond_entries_do_not_overwrite() {
        let store = InMemoryWindowStore::new();

        for expected in 1..=5 {
            let count = store.apply_window("k", 1_000, WINDOW).await.unwrap();
            assert_eq!(count, expected);
        }
    }

    #[tokio::test]
    async fn test_prune_boundary_is_inclusive() {
        let store = InMemoryWindowStore::new();
        store.apply_window("k", 0, WINDOW).await.unwrap();
        store.apply_window("k", 1, WINDOW).await.unwrap();

        // At 10_000 the entry at 0 is exactly one window old and pruned, 1 is kept.
        let count = store.apply_window("k", 10_000, WINDOW).await.unwrap();
        assert_eq!(count, 2);

        // At 10_001 the entry at 1 goes as well.
        let count = store.apply_window("k", 10_001, WINDOW).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.entry_count("k"), 2);
    }

    #[tokio::test]
    async fn test_stale_entries_do_not_accumulate() {
        let store = InMemoryWindowStore::new();
        for t in 0..100 {
            store.apply_window("k", t, WINDOW).await.unwrap();
        }

        let count = store.apply_window("k", 1_000_000, WINDOW).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.entry_count("k"), 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = InMemoryWindowStore::new();
        store.apply_window("a", 0, WINDOW).await.unwrap();
        store.apply_window("a", 0, WINDOW).await.unwrap();

        assert_eq!(store.apply_window("b", 0, WINDOW).await.unwrap(), 1);
        assert_eq!(store.entry_count("a"), 2);
        assert_eq!(store.key_count(), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryWindowStore::new();
        store.apply_window("k", 0, WINDOW).await.unwrap();

        store.clear();
        assert_eq!(store.key_count(), 0);
        assert_eq!(store.apply_window("k", 0, WINDOW).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_observe_distinct_counts() {
        let store = Arc::new(InMemoryWindowStore::new());

        let tasks = (0..64).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.apply_window("k", 500, WINDOW).await.unwrap() })
        });

        let mut counts: Vec<u64> = join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        counts.sort_unstable();

        // Every transaction saw the cumulative effect of all earlier ones.
        assert_eq!(counts, (1..=64).collect::<Vec<u64>>());
    }
}
