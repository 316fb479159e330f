//! Back-off policy for transient model-service failures.
//!
//! The policy only decides whether and how long to wait; the caller owns the
//! loop so every attempt can be metered on its own.

use std::time::Duration;

use crate::error::LlmError;

const MAX_DELAY_MS: u64 = 60_000;

/// Network failures, 429 and 5xx are worth another attempt; everything else
/// would fail the same way again.
#[must_use]
pub fn is_retriable(err: &LlmError) -> bool {
    match err {
        LlmError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        LlmError::RateLimited { .. } => true,
        LlmError::UnexpectedStatus { status, .. } => *status >= 500,
        LlmError::EmptyResponse | LlmError::Deserialize { .. } | LlmError::InvalidBaseUrl(_) => {
            false
        }
    }
}

/// Exponential back-off: `base_ms * 2^(n-1)` before retry `n`, raised to any
/// `Retry-After` the service sent, capped at 60 s, then jittered by ±25 %.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub max_retries: u32,
    pub base_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_ms: 1_000,
        }
    }
}

impl Backoff {
    #[must_use]
    pub fn new(max_retries: u32, base_ms: u64) -> Self {
        Self {
            max_retries,
            base_ms,
        }
    }

    /// Never retry.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Whether `err` earns another attempt after `retries_done` retries.
    #[must_use]
    pub fn should_retry(self, retries_done: u32, err: &LlmError) -> bool {
        retries_done < self.max_retries && is_retriable(err)
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_ms(self, retry: u32, err: &LlmError) -> u64 {
        let shift = retry.saturating_sub(1).min(10);
        let exponential = self.base_ms.saturating_mul(1u64 << shift);
        let requested = match err {
            LlmError::RateLimited {
                retry_after_secs: Some(secs),
            } => secs.saturating_mul(1_000),
            _ => 0,
        };
        exponential.max(requested).min(MAX_DELAY_MS)
    }

    /// Jittered pause before retry number `retry`.
    #[must_use]
    pub fn pause(self, retry: u32, err: &LlmError) -> Duration {
        Duration::from_millis(jitter(self.delay_ms(retry, err)))
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn jitter(ms: u64) -> u64 {
    let factor = 0.75 + rand::random::<f64>() * 0.5;
    (ms as f64 * factor) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bad_json() -> LlmError {
        LlmError::Deserialize {
            context: "completion".to_owned(),
            source: serde_json::from_str::<u8>("nope").unwrap_err(),
        }
    }

    #[test]
    fn classifies_transient_errors() {
        assert!(is_retriable(&LlmError::RateLimited {
            retry_after_secs: None
        }));
        assert!(is_retriable(&LlmError::UnexpectedStatus {
            status: 502,
            body: String::new()
        }));
        assert!(!is_retriable(&LlmError::UnexpectedStatus {
            status: 403,
            body: "forbidden".to_owned()
        }));
        assert!(!is_retriable(&LlmError::EmptyResponse));
        assert!(!is_retriable(&bad_json()));
    }

    #[test]
    fn delay_doubles_and_caps() {
        let backoff = Backoff {
            max_retries: 20,
            base_ms: 1_000,
        };
        let err = LlmError::EmptyResponse;
        assert_eq!(backoff.delay_ms(1, &err), 1_000);
        assert_eq!(backoff.delay_ms(2, &err), 2_000);
        assert_eq!(backoff.delay_ms(3, &err), 4_000);
        assert_eq!(backoff.delay_ms(9, &err), MAX_DELAY_MS);
    }

    #[test]
    fn delay_honours_retry_after() {
        let backoff = Backoff::default();
        let err = LlmError::RateLimited {
            retry_after_secs: Some(7),
        };
        assert_eq!(backoff.delay_ms(1, &err), 7_000);
        let huge = LlmError::RateLimited {
            retry_after_secs: Some(3_600),
        };
        assert_eq!(backoff.delay_ms(1, &huge), MAX_DELAY_MS);
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        for _ in 0..100 {
            let ms = jitter(1_000);
            assert!((750..=1_250).contains(&ms), "jittered delay {ms}");
        }
    }

    #[test]
    fn retries_stop_at_the_limit() {
        let backoff = Backoff::new(2, 0);
        let transient = LlmError::UnexpectedStatus {
            status: 503,
            body: String::new(),
        };
        assert!(backoff.should_retry(0, &transient));
        assert!(backoff.should_retry(1, &transient));
        assert!(!backoff.should_retry(2, &transient));
        assert!(!backoff.should_retry(0, &bad_json()));
        assert!(!Backoff::none().should_retry(0, &transient));
    }

    #[test]
    fn pause_is_jittered_around_the_delay() {
        let backoff = Backoff::new(3, 400);
        let pause = backoff.pause(2, &LlmError::EmptyResponse);
        assert!((600..=1_000).contains(&pause.as_millis()), "{pause:?}");
        assert_eq!(Backoff::none().pause(1, &LlmError::EmptyResponse), Duration::ZERO);
    }
}
