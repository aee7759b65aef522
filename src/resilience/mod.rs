//! Retry and reconnection policy.
//!
//! Both network layers share one evaluator: the HTTP client retries on status
//! codes, the WebSocket session reconnects on close codes. The evaluator is pure
//! so it can be exercised with injected attempt counts.
//!
//! ```rust
//! use gladia_live::resilience::retry::{Decision, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::http_default()
//!     .with_max_attempts(3)
//!     .with_max_delay(Duration::from_millis(500));
//!
//! assert!(policy.matches(503));
//! assert_eq!(
//!     policy.decide(2, policy.matches(503)),
//!     Decision::Retry { delay: Duration::from_millis(500) }
//! );
//! assert_eq!(policy.decide(3, true), Decision::Fail);
//! ```

pub mod retry;

pub use retry::{CodeRange, Decision, RetryPolicy, WebSocketRetryPolicy};
