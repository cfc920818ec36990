//! HTTP surface: protected routes composed with the rate limit layer.

mod layer;
mod server;

pub use layer::{RateLimitLayer, RateLimitService, STORE_FAILURE_BODY, TOO_MANY_REQUESTS_BODY};
pub use server::{router, HttpServer};
