//! Exponential backoff for connection acquisition.
//!
//! Only [`BenchError::Unreachable`] is retried. Every other error is returned
//! from the first attempt that produced it.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::core::BenchError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Backoff {
    #[serde(with = "humantime_serde", default = "Backoff::default_initial_interval")]
    pub initial_interval: Duration,
    #[serde(with = "humantime_serde", default = "Backoff::default_max_interval")]
    pub max_interval: Duration,
    #[serde(with = "humantime_serde", default = "Backoff::default_max_time")]
    pub max_time: Duration,
    #[serde(default = "Backoff::default_jitter")]
    pub jitter: bool,
}

impl Backoff {
    fn default_initial_interval() -> Duration {
        Duration::from_secs(1)
    }

    fn default_max_interval() -> Duration {
        Duration::from_secs(2)
    }

    fn default_max_time() -> Duration {
        Duration::from_secs(60)
    }

    fn default_jitter() -> bool {
        true
    }

    /// Upper bound of the wait before retry number `attempt` (0-based).
    pub fn interval(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_interval
            .saturating_mul(factor)
            .min(self.max_interval)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.interval(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        rand::thread_rng().gen_range(Duration::ZERO..=ceiling)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// next wait would push the total past `max_time`. An attempt still
    /// running when `max_time` is reached is dropped.
    pub async fn retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, BenchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BenchError>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            // A single attempt never outlives what is left of the total budget.
            let remaining = self.max_time.saturating_sub(started.elapsed());
            let err = match tokio::time::timeout(remaining, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if err.is_transient() => err,
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    let elapsed = started.elapsed();
                    warn!("{what}: attempt {} still pending after {elapsed:?}", attempt + 1);
                    return Err(BenchError::ConnectTimeout {
                        elapsed,
                        last: "attempt timed out".to_string(),
                    });
                }
            };

            let delay = self.delay(attempt);
            let elapsed = started.elapsed();
            if elapsed + delay > self.max_time {
                warn!("{what}: giving up after {} attempts ({elapsed:?})", attempt + 1);
                return Err(BenchError::ConnectTimeout {
                    elapsed,
                    last: err.to_string(),
                });
            }

            debug!("{what}: attempt {} failed ({err}), retrying in {delay:?}", attempt + 1);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_interval: Self::default_initial_interval(),
            max_interval: Self::default_max_interval(),
            max_time: Self::default_max_time(),
            jitter: Self::default_jitter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_interval_doubles_then_caps() {
        let backoff = Backoff::default();
        assert_eq!(backoff.interval(0), Duration::from_secs(1));
        assert_eq!(backoff.interval(1), Duration::from_secs(2));
        assert_eq!(backoff.interval(2), Duration::from_secs(2));
        assert_eq!(backoff.interval(40), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_reachable_fails_within_bound() {
        let backoff = Backoff::default();
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = backoff
            .retry("test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(BenchError::Unreachable("connection refused".into()))
            })
            .await;

        let elapsed = started.elapsed();
        assert!(matches!(result, Err(BenchError::ConnectTimeout { .. })));
        assert!(elapsed <= backoff.max_time + backoff.max_interval);
        assert!(attempts.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_jitter_waits_until_bound() {
        let backoff = Backoff {
            jitter: false,
            max_time: Duration::from_secs(10),
            ..Backoff::default()
        };
        let started = Instant::now();

        let result: Result<(), _> = backoff
            .retry("test", || async { Err(BenchError::Unreachable("down".into())) })
            .await;

        assert!(result.is_err());
        // 1 + 2 + 2 + 2 + 2 = 9s, the next 2s wait would overrun the 10s bound.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(9));
        assert!(elapsed < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_errors() {
        let backoff = Backoff::default();
        let attempts = AtomicU32::new(0);

        let value = backoff
            .retry("test", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(BenchError::Unreachable("starting up".into()))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_is_cut_at_bound() {
        let backoff = Backoff {
            max_time: Duration::from_secs(5),
            ..Backoff::default()
        };
        let started = Instant::now();

        let result: Result<(), _> = backoff
            .retry("test", || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(BenchError::Unreachable("syn timeout".into()))
            })
            .await;

        assert!(matches!(result, Err(BenchError::ConnectTimeout { .. })));
        assert!(started.elapsed() <= backoff.max_time + backoff.max_interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempts_share_one_budget() {
        let backoff = Backoff {
            jitter: false,
            max_time: Duration::from_secs(10),
            ..Backoff::default()
        };
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = backoff
            .retry("test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(4)).await;
                Err(BenchError::Unreachable("slow refusal".into()))
            })
            .await;

        assert!(matches!(result, Err(BenchError::ConnectTimeout { .. })));
        let elapsed = started.elapsed();
        assert!(elapsed <= backoff.max_time + backoff.max_interval, "{elapsed:?}");
        assert!(attempts.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_query_errors_are_not_retried() {
        let backoff = Backoff::default();
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = backoff
            .retry("test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(BenchError::QueryError("syntax error".into()))
            })
            .await;

        assert!(matches!(result, Err(BenchError::QueryError(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
