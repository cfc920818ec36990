//! Sliding window log entries and boundary arithmetic.

use std::fmt;
use std::time::Duration;

/// A duration in whole milliseconds, saturating at `i64::MAX`.
pub fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Score at or below which entries fall outside the window ending at `now_millis`.
///
/// An entry recorded exactly `window` ago is already expired; one recorded a
/// millisecond later is still inside. Windows too long to express in
/// milliseconds keep every entry.
pub fn window_cutoff(now_millis: i64, window: Duration) -> i64 {
    now_millis.saturating_sub(duration_millis(window))
}

/// Whether an entry with `timestamp_millis` still counts at a window `cutoff`.
pub fn is_within_window(timestamp_millis: i64, cutoff: i64) -> bool {
    timestamp_millis > cutoff
}

/// One recorded request: scored by its timestamp, made unique by its token.
///
/// Ordering is by timestamp first so a sorted collection of entries is also
/// sorted by score.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowEntry {
    /// Request time in epoch milliseconds.
    pub timestamp_millis: i64,
    /// Disambiguator for requests sharing a millisecond.
    pub token: String,
}

impl WindowEntry {
    /// Create an entry.
    pub fn new(timestamp_millis: i64, token: impl Into<String>) -> Self {
        Self {
            timestamp_millis,
            token: token.into(),
        }
    }

    /// Create an entry with a random token, unique across processes.
    pub fn unique(timestamp_millis: i64) -> Self {
        Self::new(timestamp_millis, uuid::Uuid::new_v4().simple().to_string())
    }

    /// The sorted set member that stores this entry.
    pub fn member(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for WindowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.timestamp_millis, self.token)
    }
}
