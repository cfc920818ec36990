//! Ratewindow - Distributed Sliding Window Rate Limiter
//!
//! This crate enforces "at most N requests per key within a trailing window of
//! W seconds" across any number of stateless service instances. Request
//! history lives in a shared store (Redis sorted sets) that is pruned,
//! appended to and counted in a single atomic transaction per request.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
