//! Resilience primitives wrapped around every outbound stage call:
//! retry with backoff and jitter, circuit breaking, and the client
//! that composes them with the per-call timeout.

mod breaker;
mod client;
mod retry;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitRegistry, CircuitState};
pub use client::ResilientClient;
pub use retry::{backoff_delay, JitterStrategy, RetryConfig};
