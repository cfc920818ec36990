//! Sliding window log rate limiting.

mod backend;
mod clock;
mod limiter;
mod memory;
mod redis_pool;
mod redis_store;
mod window;

pub use backend::WindowStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{DecisionResult, RateDecisionEngine};
pub use memory::InMemoryWindowStore;
pub use redis_store::RedisWindowStore;
pub use window::{is_within_window, window_cutoff, WindowEntry};
