// =============================================================================
// Circuit breaker — CLOSED / OPEN / HALF_OPEN
// =============================================================================
//
// State machine follows the same parking_lot + tracing style as the rest of
// this crate's concurrency primitives (`exchange::reconnect::ReconnectState`).
// =============================================================================

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    failure_count: u32,
    opened_at: Option<Instant>,
}

/// Fails fast once `failure_threshold` consecutive failures are recorded
/// within the breaker's open lifetime, then probes again after
/// `recovery_timeout` by allowing exactly one half-open trial call.
pub struct CircuitBreaker {
    label: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(label: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            label: label.into(),
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: State::Closed,
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call may proceed right now. Transitions `Open -> HalfOpen`
    /// in place when the recovery timeout has elapsed.
    pub fn call_allowed(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => true,
            State::HalfOpen => true,
            State::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.recovery_timeout {
                    inner.state = State::HalfOpen;
                    info!(breaker = %self.label, "circuit half-open, allowing trial call");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != State::Closed {
            info!(breaker = %self.label, "circuit closed after successful call");
        }
        inner.state = State::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::HalfOpen => {
                warn!(breaker = %self.label, "trial call failed, circuit re-opened");
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
            }
            State::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    warn!(
                        breaker = %self.label,
                        failures = inner.failure_count,
                        "failure threshold reached, circuit opened"
                    );
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            State::Open => {}
        }
    }

    /// Run `f` if the breaker allows it, recording the outcome. Returns
    /// `None` without calling `f` if the breaker is open.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Option<Result<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.call_allowed() {
            return None;
        }
        let result = f().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        assert!(cb.call_allowed());
        cb.record_failure();
        cb.record_failure();
        assert!(cb.call_allowed());
        cb.record_failure();
        assert!(!cb.call_allowed());
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new("test", 1, Duration::from_millis(0));
        cb.record_failure();
        assert!(cb.call_allowed()); // recovery_timeout elapsed immediately -> half-open
        cb.record_failure();
        assert!(!cb.call_allowed());
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = CircuitBreaker::new("test", 2, Duration::from_secs(60));
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert!(cb.call_allowed());
    }
}
