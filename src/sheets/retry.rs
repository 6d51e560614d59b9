//! Quota-aware retry for single-cell writes.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{CellPosition, SheetClient};
use crate::error::SheetError;
use crate::model::CellValue;

/// Bounded exponential backoff for quota rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per write, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl RetryPolicy {
    /// `2^attempt` seconds plus `jitter` (expected in `[0, 1)`).
    pub fn backoff(&self, attempt: u32, jitter: f64) -> Duration {
        Duration::from_secs_f64(2f64.powi(attempt as i32) + jitter)
    }
}

/// Suspends the pipeline between retries.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Real sleep on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Write one cell, backing off on quota errors.
///
/// Any other error is returned immediately. If every attempt is rejected
/// for quota the write fails with `RetriesExhausted`.
pub async fn update_with_backoff(
    client: &dyn SheetClient,
    delay: &dyn Delay,
    policy: &RetryPolicy,
    position: CellPosition,
    value: &CellValue,
) -> Result<(), SheetError> {
    let a1 = position.to_a1();
    for attempt in 0..policy.max_attempts {
        match client.update_cell(&a1, value).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_quota_exceeded() => {
                if attempt + 1 == policy.max_attempts {
                    break;
                }
                let wait = policy.backoff(attempt, rand::random::<f64>());
                warn!(
                    position = %a1,
                    attempt = attempt + 1,
                    "Quota exceeded. Retrying in {:.2} seconds...",
                    wait.as_secs_f64()
                );
                delay.wait(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(SheetError::RetriesExhausted {
        position: a1,
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `quota_failures` calls with a quota error.
    struct FlakySheet {
        quota_failures: u32,
        fatal: bool,
        calls: AtomicU32,
    }

    impl FlakySheet {
        fn new(quota_failures: u32) -> Self {
            Self {
                quota_failures,
                fatal: false,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SheetClient for FlakySheet {
        async fn read_all(&self) -> Result<Vec<Vec<String>>, SheetError> {
            Ok(vec![])
        }

        async fn update_cell(&self, _a1: &str, _value: &CellValue) -> Result<(), SheetError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fatal {
                return Err(SheetError::Api {
                    status: 403,
                    message: "The caller does not have permission".into(),
                });
            }
            if call < self.quota_failures {
                return Err(SheetError::QuotaExceeded("Quota exceeded for quota metric".into()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingDelay {
        waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Delay for RecordingDelay {
        async fn wait(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }

    async fn write(
        sheet: &FlakySheet,
        delay: &RecordingDelay,
        position: CellPosition,
    ) -> Result<(), SheetError> {
        let value = CellValue::from("x");
        update_with_backoff(sheet, delay, &RetryPolicy::default(), position, &value).await
    }

    #[tokio::test]
    async fn success_on_first_attempt_never_waits() {
        let sheet = FlakySheet::new(0);
        let delay = RecordingDelay::default();
        write(&sheet, &delay, CellPosition::new(3, 0))
            .await
            .unwrap();
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 1);
        assert!(delay.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn four_quota_failures_then_success() {
        let sheet = FlakySheet::new(4);
        let delay = RecordingDelay::default();
        write(&sheet, &delay, CellPosition::new(3, 0))
            .await
            .unwrap();

        assert_eq!(sheet.calls.load(Ordering::SeqCst), 5);
        let waits = delay.waits.lock().unwrap();
        assert_eq!(waits.len(), 4);
        for (attempt, wait) in waits.iter().enumerate() {
            let base = 2f64.powi(attempt as i32);
            let secs = wait.as_secs_f64();
            assert!(secs >= base && secs < base + 1.0, "wait {secs} for attempt {attempt}");
        }
    }

    #[tokio::test]
    async fn persistent_quota_exhausts_retries() {
        let sheet = FlakySheet::new(u32::MAX);
        let delay = RecordingDelay::default();
        let err = write(&sheet, &delay, CellPosition::new(7, 9))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SheetError::RetriesExhausted { ref position, attempts: 5 } if position == "J7"
        ));
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 5);
        assert_eq!(delay.waits.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn other_errors_abort_without_waiting() {
        let sheet = FlakySheet {
            fatal: true,
            ..FlakySheet::new(0)
        };
        let delay = RecordingDelay::default();
        let err = write(&sheet, &delay, CellPosition::new(3, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, SheetError::Api { status: 403, .. }));
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 1);
        assert!(delay.waits.lock().unwrap().is_empty());
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0, 0.0), Duration::from_secs(1));
        assert_eq!(policy.backoff(3, 0.5), Duration::from_secs_f64(8.5));
    }
}
