use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Backoff function of the 1-based attempt number.
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Decision for how to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry { delay: Duration },
    Fail,
}

/// A retryable status or close code: either one value or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeRange {
    Single(u16),
    Inclusive(u16, u16),
}

impl CodeRange {
    pub fn contains(&self, code: u16) -> bool {
        match *self {
            CodeRange::Single(c) => c == code,
            CodeRange::Inclusive(lo, hi) => lo <= code && code <= hi,
        }
    }
}

impl From<u16> for CodeRange {
    fn from(code: u16) -> Self {
        CodeRange::Single(code)
    }
}

impl From<(u16, u16)> for CodeRange {
    fn from((lo, hi): (u16, u16)) -> Self {
        CodeRange::Inclusive(lo, hi)
    }
}

/// `0` means unlimited, `1` means no retry, otherwise `attempt < max_attempts`.
pub fn should_retry(attempt: u32, max_attempts: u32) -> bool {
    match max_attempts {
        0 => true,
        1 => false,
        max => attempt < max,
    }
}

/// True if `code` equals a single entry or falls inside an inclusive range.
pub fn matches_code(code: u16, ranges: &[CodeRange]) -> bool {
    ranges.iter().any(|r| r.contains(code))
}

/// Default backoff: `300ms * 2^(attempt-1)`.
pub fn exponential_backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1);
    let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
    Duration::from_millis(300u64.saturating_mul(factor))
}

/// Retry rules shared by the HTTP client and the WebSocket session.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub codes: Vec<CodeRange>,
    pub max_delay: Duration,
    pub delay: DelayFn,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, codes: Vec<CodeRange>, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            codes,
            max_delay,
            delay: Arc::new(exponential_backoff),
        }
    }

    /// HTTP defaults: 2 attempts on 408, 413, 429 and 5xx, delays capped at 10s.
    pub fn http_default() -> Self {
        Self::new(
            2,
            vec![408.into(), 413.into(), 429.into(), (500, 599).into()],
            Duration::from_secs(10),
        )
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_codes<I, C>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<CodeRange>,
    {
        self.codes = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.delay = Arc::new(delay);
        self
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        should_retry(attempt, self.max_attempts)
    }

    pub fn matches(&self, code: u16) -> bool {
        matches_code(code, &self.codes)
    }

    pub fn compute_delay(&self, attempt: u32) -> Duration {
        (self.delay)(attempt).min(self.max_delay)
    }

    /// Decide what to do after `attempt` (1-based) failed.
    ///
    /// `retryable` is the caller's classification of the failure, e.g. a status code
    /// match or a network error.
    pub fn decide(&self, attempt: u32, retryable: bool) -> Decision {
        if retryable && self.should_retry(attempt) {
            Decision::Retry {
                delay: self.compute_delay(attempt),
            }
        } else {
            Decision::Fail
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("codes", &self.codes)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

/// Reconnection rules for a WebSocket session.
///
/// `per_connection` bounds physical attempts inside one logical connection and
/// classifies close codes; `max_connections` bounds logical connections (0 = unlimited).
#[derive(Debug, Clone)]
pub struct WebSocketRetryPolicy {
    pub per_connection: RetryPolicy,
    pub max_connections: u32,
}

impl WebSocketRetryPolicy {
    pub fn new(per_connection: RetryPolicy, max_connections: u32) -> Self {
        Self {
            per_connection,
            max_connections,
        }
    }

    /// WebSocket defaults: 5 attempts per connection, delays capped at 2s,
    /// reconnect on 1002..=4399 and 4500..=9999, unlimited connections.
    pub fn ws_default() -> Self {
        Self::new(
            RetryPolicy::new(
                5,
                vec![(1002, 4399).into(), (4500, 9999).into()],
                Duration::from_secs(2),
            ),
            0,
        )
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn connections_exhausted(&self, connection_count: u32) -> bool {
        self.max_connections > 0 && connection_count >= self.max_connections
    }
}

impl Default for WebSocketRetryPolicy {
    fn default() -> Self {
        Self::ws_default()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::http_default()
    }
}
