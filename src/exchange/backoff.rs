// =============================================================================
// Exponential backoff — REST retry helper
// =============================================================================
//
// `delay = min(base * factor^attempt, max_delay)`. Hand-rolled rather than
// pulling in the `backoff` crate since the formula is this simple; used only
// for REST fetch retries — the WebSocket reconnect loop uses its own fixed
// delay, per `exchange::mod`.
// =============================================================================

use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// Retry `f` up to `policy.max_retries` times, sleeping
/// `policy.delay_for_attempt(attempt)` between attempts. Returns the last
/// error if every attempt fails.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &BackoffPolicy, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= policy.max_retries {
                    return Err(e);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(attempt, %e, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_then_caps() {
        let p = BackoffPolicy {
            base: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(5),
            max_retries: 5,
        };
        assert_eq!(p.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(p.delay_for_attempt(3), Duration::from_secs(5)); // capped
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(1),
            factor: 1.0,
            max_delay: Duration::from_millis(1),
            max_retries: 5,
        };
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with_backoff(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("not yet")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(1),
            factor: 1.0,
            max_delay: Duration::from_millis(1),
            max_retries: 2,
        };
        let result: Result<(), &str> =
            retry_with_backoff(&policy, || async { Err("always fails") }).await;
        assert_eq!(result, Err("always fails"));
    }
}
