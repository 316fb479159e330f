//! Per-run metered access to the two model services.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use painscout_llm::{Backoff, BudgetGovernor, CompletionRequest, ModelService};

use crate::error::FinderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Web-search-augmented model; slow, longer timeout.
    Search,
    /// Fast classification model.
    Classify,
}

impl ServiceKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Classify => "classify",
        }
    }
}

/// Wraps every model call of one finder run. Each HTTP attempt, retries
/// included, checks the rate-limit window, runs under the per-service
/// timeout, is reported to the governor and counts as one read.
pub struct ModelGateway {
    search: Arc<dyn ModelService>,
    classify: Arc<dyn ModelService>,
    governor: Arc<BudgetGovernor>,
    search_timeout: Duration,
    classify_timeout: Duration,
    retry: Backoff,
    reads: AtomicU32,
}

impl ModelGateway {
    #[must_use]
    pub fn new(
        search: Arc<dyn ModelService>,
        classify: Arc<dyn ModelService>,
        governor: Arc<BudgetGovernor>,
        search_timeout: Duration,
        classify_timeout: Duration,
    ) -> Self {
        Self {
            search,
            classify,
            governor,
            search_timeout,
            classify_timeout,
            retry: Backoff::none(),
            reads: AtomicU32::new(0),
        }
    }

    /// Retry transient service errors with `retry`.
    #[must_use]
    pub fn with_retry(mut self, retry: Backoff) -> Self {
        self.retry = retry;
        self
    }

    /// Send one request, retrying transient service errors, and return the
    /// raw response text.
    ///
    /// # Errors
    ///
    /// - [`FinderError::RateLimited`] when the governor's window is exhausted
    ///   before an attempt (that attempt is not sent and not counted).
    /// - [`FinderError::Timeout`] when the service does not answer in time.
    /// - [`FinderError::Llm`] for a service failure that is not retried or
    ///   outlasts the retry budget.
    pub async fn call(
        &self,
        kind: ServiceKind,
        request: &CompletionRequest,
    ) -> Result<String, FinderError> {
        let mut retries = 0;
        loop {
            match self.attempt(kind, request).await {
                Err(FinderError::Llm(e)) if self.retry.should_retry(retries, &e) => {
                    retries += 1;
                    let pause = self.retry.pause(retries, &e);
                    tracing::warn!(
                        service = kind.label(),
                        retry = retries,
                        delay_ms = u64::try_from(pause.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "transient model error, backing off"
                    );
                    tokio::time::sleep(pause).await;
                }
                outcome => return outcome,
            }
        }
    }

    async fn attempt(
        &self,
        kind: ServiceKind,
        request: &CompletionRequest,
    ) -> Result<String, FinderError> {
        if !self.governor.can_make_request() {
            tracing::warn!(service = kind.label(), "rate limit window exhausted, skipping call");
            return Err(FinderError::RateLimited);
        }

        let (service, timeout) = match kind {
            ServiceKind::Search => (&self.search, self.search_timeout),
            ServiceKind::Classify => (&self.classify, self.classify_timeout),
        };

        self.reads.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, service.complete(request)).await;
        let elapsed_ms = started.elapsed().as_millis();

        match outcome {
            Ok(Ok(completion)) => {
                self.governor.track_request(completion.rate_limit.as_ref());
                tracing::debug!(
                    service = kind.label(),
                    model = service.name(),
                    elapsed_ms,
                    chars = completion.text.len(),
                    "model call completed"
                );
                Ok(completion.text)
            }
            Ok(Err(e)) => {
                self.governor.track_request(None);
                tracing::debug!(service = kind.label(), elapsed_ms, error = %e, "model call failed");
                Err(FinderError::Llm(e))
            }
            Err(_) => {
                self.governor.track_request(None);
                tracing::debug!(service = kind.label(), elapsed_ms, "model call timed out");
                Err(FinderError::Timeout {
                    service: kind.label(),
                    timeout_ms: timeout.as_millis(),
                })
            }
        }
    }

    /// Calls sent so far in this run, including failed ones.
    #[must_use]
    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use painscout_llm::{Completion, LlmError, RateLimitSnapshot};

    use super::*;

    struct Fixed {
        delay: Duration,
        result: fn() -> Result<Completion, LlmError>,
    }

    #[async_trait]
    impl ModelService for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, LlmError> {
            tokio::time::sleep(self.delay).await;
            (self.result)()
        }
    }

    fn ok_with_snapshot() -> Result<Completion, LlmError> {
        Ok(Completion {
            text: "{}".to_string(),
            rate_limit: Some(RateLimitSnapshot {
                limit: 100,
                remaining: 42,
                reset_at: None,
            }),
        })
    }

    fn failing() -> Result<Completion, LlmError> {
        Err(LlmError::EmptyResponse)
    }

    fn gateway(search: Fixed, governor: Arc<BudgetGovernor>) -> ModelGateway {
        let classify = Arc::new(Fixed {
            delay: Duration::ZERO,
            result: ok_with_snapshot,
        });
        ModelGateway::new(
            Arc::new(search),
            classify,
            governor,
            Duration::from_millis(20),
            Duration::from_millis(20),
        )
    }

    #[tokio::test]
    async fn successful_call_tracks_reported_window() {
        let governor = Arc::new(BudgetGovernor::new(1_000, 450));
        let gw = gateway(
            Fixed {
                delay: Duration::ZERO,
                result: ok_with_snapshot,
            },
            Arc::clone(&governor),
        );

        let text = gw
            .call(ServiceKind::Search, &CompletionRequest::new("x"))
            .await
            .unwrap();
        assert_eq!(text, "{}");
        assert_eq!(gw.reads(), 1);
        assert_eq!(governor.monthly_used(), 1);
        assert_eq!(governor.status().remaining, 42);
    }

    #[tokio::test]
    async fn slow_service_times_out_and_still_counts() {
        let governor = Arc::new(BudgetGovernor::new(1_000, 450));
        let gw = gateway(
            Fixed {
                delay: Duration::from_secs(5),
                result: ok_with_snapshot,
            },
            Arc::clone(&governor),
        );

        let err = gw
            .call(ServiceKind::Search, &CompletionRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, FinderError::Timeout { service: "search", .. }));
        assert_eq!(gw.reads(), 1);
        assert_eq!(governor.monthly_used(), 1);
    }

    #[tokio::test]
    async fn service_error_is_wrapped() {
        let governor = Arc::new(BudgetGovernor::new(1_000, 450));
        let gw = gateway(
            Fixed {
                delay: Duration::ZERO,
                result: failing,
            },
            governor,
        );

        let err = gw
            .call(ServiceKind::Search, &CompletionRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, FinderError::Llm(LlmError::EmptyResponse)));
    }

    #[tokio::test]
    async fn exhausted_window_refuses_without_counting() {
        let governor = Arc::new(BudgetGovernor::new(1_000, 0));
        let gw = gateway(
            Fixed {
                delay: Duration::ZERO,
                result: ok_with_snapshot,
            },
            Arc::clone(&governor),
        );

        let err = gw
            .call(ServiceKind::Classify, &CompletionRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, FinderError::RateLimited));
        assert_eq!(gw.reads(), 0);
        assert_eq!(governor.monthly_used(), 0);
    }

    /// Answers 503 for the first `failures` attempts, then succeeds.
    struct Flaky {
        failures: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl ModelService for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, LlmError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(LlmError::UnexpectedStatus {
                    status: 503,
                    body: "overloaded".to_string(),
                });
            }
            ok_with_snapshot()
        }
    }

    fn flaky_gateway(
        failures: usize,
        governor: Arc<BudgetGovernor>,
        retry: Backoff,
    ) -> (Arc<Flaky>, ModelGateway) {
        let flaky = Arc::new(Flaky {
            failures,
            attempts: AtomicUsize::new(0),
        });
        let gw = ModelGateway::new(
            Arc::clone(&flaky) as Arc<dyn ModelService>,
            Arc::clone(&flaky) as Arc<dyn ModelService>,
            governor,
            Duration::from_millis(50),
            Duration::from_millis(50),
        )
        .with_retry(retry);
        (flaky, gw)
    }

    #[tokio::test]
    async fn every_retry_attempt_is_metered() {
        let governor = Arc::new(BudgetGovernor::new(1_000, 450));
        let (flaky, gw) = flaky_gateway(2, Arc::clone(&governor), Backoff::new(3, 0));

        let text = gw
            .call(ServiceKind::Search, &CompletionRequest::new("x"))
            .await
            .unwrap();
        assert_eq!(text, "{}");
        assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(gw.reads(), 3);
        assert_eq!(governor.monthly_used(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_report_every_attempt() {
        let governor = Arc::new(BudgetGovernor::new(1_000, 450));
        let (flaky, gw) = flaky_gateway(usize::MAX, Arc::clone(&governor), Backoff::new(3, 0));

        let err = gw
            .call(ServiceKind::Classify, &CompletionRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FinderError::Llm(LlmError::UnexpectedStatus { status: 503, .. })
        ));
        assert_eq!(flaky.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(governor.monthly_used(), 4);
        assert_eq!(governor.status().remaining, 446);
    }

    #[tokio::test]
    async fn retry_stops_when_window_runs_out() {
        let governor = Arc::new(BudgetGovernor::new(1_000, 1));
        let (flaky, gw) = flaky_gateway(usize::MAX, Arc::clone(&governor), Backoff::new(3, 0));

        let err = gw
            .call(ServiceKind::Search, &CompletionRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, FinderError::RateLimited));
        assert_eq!(flaky.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(gw.reads(), 1);
        assert_eq!(governor.monthly_used(), 1);
    }
}
