//! Bounded retry with exponential backoff and a per-attempt timeout.
//!
//! Network capabilities (answer generation, remote embedding) are wrapped in
//! [`retry`] driven by an explicit [`RetryPolicy`]. An attempt that fails with
//! [`AttemptError::Permanent`] (for example an HTTP 4xx other than 429) stops
//! immediately; transient failures and timeouts are retried until the policy
//! is exhausted.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// How often and how patiently to retry a call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Factor applied to the delay after every failed attempt.
    pub backoff_multiplier: f64,
    /// Upper bound on a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Upper bound on the sleep between two attempts.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

impl RetryPolicy {
    /// Delay slept before attempt number `attempt` (1-based). Zero for the
    /// first attempt, never more than [`MAX_DELAY`].
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_DELAY)
            .min(MAX_DELAY)
    }
}

/// Outcome of one failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// Worth retrying: rate limits, server errors, connection failures.
    Transient(String),
    /// Retrying cannot help: bad request, authentication, malformed response.
    Permanent(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Transient(msg) | AttemptError::Permanent(msg) => f.write_str(msg),
        }
    }
}

/// The retry budget ran out (or a permanent error stopped it early).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub reason: String,
}

/// Run `op` under `policy`. `op` receives the 1-based attempt number.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_reason = String::from("no attempt made");

    for attempt in 1..=max_attempts {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match tokio::time::timeout(policy.timeout, op(attempt)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(AttemptError::Permanent(reason))) => {
                debug!(label, attempt, %reason, "permanent failure, not retrying");
                return Err(RetryExhausted {
                    attempts: attempt,
                    reason,
                });
            }
            Ok(Err(AttemptError::Transient(reason))) => {
                debug!(label, attempt, %reason, "transient failure");
                last_reason = reason;
            }
            Err(_) => {
                debug!(label, attempt, timeout = ?policy.timeout, "attempt timed out");
                last_reason = format!("timed out after {:?}", policy.timeout);
            }
        }
    }

    Err(RetryExhausted {
        attempts: max_attempts,
        reason: last_reason,
    })
}

/// Classify an HTTP status: 429 and 5xx are transient, everything else is not.
pub fn classify_status(status: reqwest::StatusCode, message: String) -> AttemptError {
    if status.as_u16() == 429 || status.is_server_error() {
        AttemptError::Transient(message)
    } else {
        AttemptError::Permanent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn delays_grow_exponentially() {
        let p = fast_policy(5);
        assert_eq!(p.delay_before(1), Duration::ZERO);
        assert_eq!(p.delay_before(2), Duration::from_millis(100));
        assert_eq!(p.delay_before(3), Duration::from_millis(200));
        assert_eq!(p.delay_before(4), Duration::from_millis(400));
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 1e300,
            timeout: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_before(3), MAX_DELAY);
        assert_eq!(policy.delay_before(u32::MAX), MAX_DELAY);

        let nan = RetryPolicy {
            backoff_multiplier: f64::NAN,
            ..policy
        };
        assert_eq!(nan.delay_before(1), Duration::ZERO);
        assert_eq!(nan.delay_before(3), MAX_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out = retry(&fast_policy(3), "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(AttemptError::Transient("busy".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(out, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts_and_last_reason() {
        let out: Result<(), _> = retry(&fast_policy(4), "test", |attempt| async move {
            Err(AttemptError::Transient(format!("fail {}", attempt)))
        })
        .await;
        assert_eq!(
            out,
            Err(RetryExhausted {
                attempts: 4,
                reason: "fail 4".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = retry(&fast_policy(5), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::Permanent("401 unauthorized".into())) }
        })
        .await;
        assert_eq!(out.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_attempt_times_out() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            backoff_multiplier: 1.0,
            timeout: Duration::from_secs(1),
        };
        let out: Result<(), _> = retry(&policy, "test", |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await;
        let err = out.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(err.reason.contains("timed out"));
    }

    #[test]
    fn status_classification() {
        use reqwest::StatusCode;
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            AttemptError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, String::new()),
            AttemptError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            AttemptError::Permanent(_)
        ));
    }
}
