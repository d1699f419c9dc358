//! Extraction call with timeout and retry.
//!
//! ## Retry Strategy
//!
//! Only `Transient` errors are retried. Backoff is exponential
//! (`retry_backoff_ms * 2^(attempt-1)`): with a 500 ms base and 3 retries
//! the waits are 500 ms, 1 s, 2 s. A single wait never exceeds
//! [`MAX_BACKOFF_MS`]. `Permanent` and `Unavailable` errors
//! return immediately; retrying a corrupt file or a revoked key only burns
//! quota.

use crate::config::BatchConfig;
use crate::error::ExtractionError;
use crate::extract::{Extraction, TableExtractor};
use crate::model::SourceDocument;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Ceiling on one retry wait.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Wait before retry number `attempt` (1-based): `base_ms * 2^(attempt-1)`,
/// saturating at [`MAX_BACKOFF_MS`].
pub fn backoff_delay(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Result of [`extract_with_retry`].
#[derive(Debug)]
pub struct ExtractionAttempt {
    pub result: Result<Extraction, ExtractionError>,
    /// Calls made, including the first.
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Call `extractor` for `document`, retrying transient failures.
///
/// Each call is bounded by `api_timeout_secs`; a timeout counts as a
/// transient failure.
pub async fn extract_with_retry(
    extractor: &dyn TableExtractor,
    document: &SourceDocument,
    config: &BatchConfig,
) -> ExtractionAttempt {
    let start = Instant::now();
    let call_timeout = Duration::from_secs(config.api_timeout_secs);
    let mut attempts = 0u32;

    let result = loop {
        if attempts > 0 {
            let backoff = backoff_delay(config.retry_backoff_ms, attempts);
            warn!(
                "{}: retry {}/{} after {}ms",
                document.name, attempts, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
        attempts += 1;

        let outcome = match timeout(call_timeout, extractor.analyze(document)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ExtractionError::transient(format!(
                "no response within {}s",
                config.api_timeout_secs
            ))),
        };

        match outcome {
            Ok(extraction) => {
                debug!(
                    "{}: {} tables from {} in {:?}",
                    document.name,
                    extraction.tables.len(),
                    extractor.name(),
                    start.elapsed()
                );
                break Ok(extraction);
            }
            Err(e) if e.is_retryable() && attempts <= config.max_retries => {
                warn!("{}: attempt {} failed: {}", document.name, attempts, e.message);
            }
            Err(e) => break Err(e),
        }
    };

    ExtractionAttempt {
        result,
        attempts,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionErrorKind;
    use crate::model::RawTable;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with `kind` for the first `failures` calls, then succeeds.
    struct Flaky {
        kind: ExtractionErrorKind,
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TableExtractor for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn analyze(&self, _document: &SourceDocument) -> Result<Extraction, ExtractionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(ExtractionError::new(self.kind, format!("failure {n}")))
            } else {
                Ok(Extraction::new(vec![RawTable::new(vec![vec!["ID".into()]])]))
            }
        }
    }

    struct Slow;

    #[async_trait]
    impl TableExtractor for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn analyze(&self, _document: &SourceDocument) -> Result<Extraction, ExtractionError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(Extraction::default())
        }
    }

    fn config(max_retries: u32) -> BatchConfig {
        BatchConfig::builder()
            .max_retries(max_retries)
            .retry_backoff_ms(1)
            .api_timeout_secs(1)
            .build()
            .unwrap()
    }

    fn doc() -> SourceDocument {
        SourceDocument::new("a.pdf", b"%PDF".to_vec())
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let x = Flaky {
            kind: ExtractionErrorKind::Transient,
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let attempt = extract_with_retry(&x, &doc(), &config(3)).await;
        assert!(attempt.result.is_ok());
        assert_eq!(attempt.attempts, 3);
    }

    #[tokio::test]
    async fn retry_budget_is_respected() {
        let x = Flaky {
            kind: ExtractionErrorKind::Transient,
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let attempt = extract_with_retry(&x, &doc(), &config(2)).await;
        assert_eq!(attempt.result.unwrap_err().kind, ExtractionErrorKind::Transient);
        assert_eq!(attempt.attempts, 3);
        assert_eq!(x.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let x = Flaky {
            kind: ExtractionErrorKind::Permanent,
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let attempt = extract_with_retry(&x, &doc(), &config(3)).await;
        assert_eq!(attempt.result.unwrap_err().kind, ExtractionErrorKind::Permanent);
        assert_eq!(attempt.attempts, 1);
    }

    #[test]
    fn backoff_doubles_then_saturates() {
        assert_eq!(backoff_delay(500, 1), 500);
        assert_eq!(backoff_delay(500, 2), 1000);
        assert_eq!(backoff_delay(500, 3), 2000);
        assert_eq!(backoff_delay(500, 40), MAX_BACKOFF_MS);
        assert_eq!(backoff_delay(u64::MAX, 2), MAX_BACKOFF_MS);
        assert_eq!(backoff_delay(1, u32::MAX), MAX_BACKOFF_MS);
    }

    #[tokio::test(start_paused = true)]
    async fn long_retry_budget_does_not_overflow() {
        let x = Flaky {
            kind: ExtractionErrorKind::Transient,
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let config = BatchConfig::builder()
            .max_retries(u32::MAX)
            .retry_backoff_ms(u64::MAX / 2)
            .build()
            .unwrap();
        let attempt = extract_with_retry(&x, &doc(), &config).await;
        assert!(attempt.result.is_err());
        assert_eq!(attempt.attempts, crate::config::MAX_RETRIES + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_count_as_transient() {
        let attempt = extract_with_retry(&Slow, &doc(), &config(1)).await;
        let err = attempt.result.unwrap_err();
        assert_eq!(err.kind, ExtractionErrorKind::Transient);
        assert!(err.message.contains("1s"));
        assert_eq!(attempt.attempts, 2);
    }
}
