//! Bounded retry with an explicit backoff schedule
//!
//! Each page request gets at most `max_attempts` tries. Only transient errors
//! (rate limits, 5xx, timeouts) are retried; a server wait hint is honoured up
//! to `max_backoff`.

use super::FetchContext;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before retry n (0-based); the last entry repeats
    pub backoff: Vec<Duration>,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config
                .backoff_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Policy that retries without sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Vec::new(),
            max_backoff: Duration::ZERO,
        }
    }

    /// Wait before retry number `retry` (0-based) after `err`
    pub fn delay_for(&self, retry: u32, err: &PipelineError) -> Duration {
        let scheduled = self
            .backoff
            .get(retry as usize)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO);

        let hinted = err
            .retry_after_secs()
            .map(Duration::from_secs)
            .unwrap_or(Duration::ZERO);

        scheduled.max(hinted).min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned
    /// when attempts are exhausted; `Timeout` if the wait would cross the run
    /// deadline.
    pub async fn run<T, F, Fut>(&self, label: &str, ctx: &FetchContext, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    warn!("{}: giving up after {} attempts: {}", label, attempt, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt - 1, &e);
                    if let Some(remaining) = ctx.remaining() {
                        if delay >= remaining {
                            return Err(PipelineError::Timeout);
                        }
                    }
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        label, attempt, self.max_attempts, e, delay
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    debug!("{}: retry {}", label, attempt + 1);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn server_error() -> PipelineError {
        PipelineError::Api {
            status: 503,
            message: "busy".into(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::immediate(3);
        let calls = AtomicU32::new(0);

        let result = policy
            .run("page", &FetchContext::default(), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(server_error())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let policy = RetryPolicy::immediate(4);
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run("page", &FetchContext::default(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::RateLimited { retry_after_secs: 0 }) }
            })
            .await;

        assert!(matches!(result, Err(PipelineError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let policy = RetryPolicy::immediate(5);
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run("page", &FetchContext::default(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(PipelineError::Api {
                        status: 403,
                        message: "forbidden".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(PipelineError::Api { status: 403, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_crossing_deadline_times_out() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: vec![Duration::from_secs(30)],
            max_backoff: Duration::from_secs(60),
        };
        let ctx = FetchContext::with_deadline(tokio::time::Instant::now() + Duration::from_secs(1));

        let result: Result<()> = policy
            .run("page", &ctx, |_| async { Err(server_error()) })
            .await;

        assert!(matches!(result, Err(PipelineError::Timeout)));
    }

    #[test]
    fn test_delay_schedule_repeats_last_entry() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff: vec![Duration::from_millis(100), Duration::from_millis(400)],
            max_backoff: Duration::from_secs(10),
        };
        let err = server_error();
        assert_eq!(policy.delay_for(0, &err), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1, &err), Duration::from_millis(400));
        assert_eq!(policy.delay_for(7, &err), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_honours_hint_up_to_cap() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: vec![Duration::from_millis(100)],
            max_backoff: Duration::from_secs(5),
        };
        let short = PipelineError::RateLimited { retry_after_secs: 2 };
        let long = PipelineError::RateLimited { retry_after_secs: 900 };
        assert_eq!(policy.delay_for(0, &short), Duration::from_secs(2));
        assert_eq!(policy.delay_for(0, &long), Duration::from_secs(5));
    }

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::from_config(&PipelineConfig::default());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff.len(), 3);
        assert_eq!(policy.max_backoff, Duration::from_secs(60));
    }
}
