use std::future::Future;
use std::time::Instant;

use chrono::Utc;
use tf_core::error::{Result, TaskError};
use tf_core::types::{ExecutionResult, RetryAttemptRecord};
use tf_telemetry::metrics::MetricsCollector;
use tf_telemetry::status::{elapsed_ms, ExecutionStatus};
use tracing::{info, warn};

use crate::container::ContainerManager;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub const MAX_ATTEMPTS_LIMIT: u32 = 2;

/// How many times a retryable stage may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` must be in `[1, 2]`.
    pub fn new(max_attempts: u32) -> Result<Self> {
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&max_attempts) {
            return Err(TaskError::validation(format!(
                "max_attempts must be between 1 and {MAX_ATTEMPTS_LIMIT}, got {max_attempts}"
            )));
        }
        Ok(Self { max_attempts })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `attempt` up to `max_attempts` times, strictly one after another.
    ///
    /// Between failed attempts the execution's containers are cleaned up
    /// (best-effort) so the next attempt starts fresh. The successful
    /// result carries every attempt record; after the last failure its
    /// error is returned unchanged.
    pub async fn run<F, Fut>(
        &self,
        operation: &str,
        execution_id: &str,
        containers: &dyn ContainerManager,
        metrics: &MetricsCollector,
        mut attempt: F,
    ) -> Result<ExecutionResult>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = (Option<String>, Result<ExecutionResult>)>,
    {
        let mut records: Vec<RetryAttemptRecord> = Vec::new();
        let mut last_error = None;

        for n in 1..=self.max_attempts {
            let start_time = Utc::now();
            let start = Instant::now();
            info!(operation, attempt = n, max_attempts = self.max_attempts, status = %ExecutionStatus::InProgress, "attempt started");

            let (container_id, outcome) = attempt(n).await;
            let duration_ms = elapsed_ms(start);
            metrics.record_retry_attempt(operation, outcome.is_ok());

            match outcome {
                Ok(mut result) => {
                    records.push(RetryAttemptRecord {
                        attempt: n,
                        start_time,
                        duration_ms,
                        success: true,
                        error_type: None,
                        error_message: None,
                        exit_code: Some(result.exit_code),
                        container_id,
                    });
                    result.attempt_count = n;
                    result.final_attempt = n;
                    result.retry_attempts = records;
                    return Ok(result);
                }
                Err(e) => {
                    warn!(operation, attempt = n, error = %e, status = %ExecutionStatus::Failed, "attempt failed");
                    records.push(RetryAttemptRecord {
                        attempt: n,
                        start_time,
                        duration_ms,
                        success: false,
                        error_type: Some(e.kind()),
                        error_message: Some(e.message().to_string()),
                        exit_code: e.exit_code(),
                        container_id,
                    });
                    last_error = Some(e);
                }
            }

            if n < self.max_attempts {
                match containers.cleanup_expired(0, Some(execution_id)).await {
                    Ok(stats) => info!(operation, removed = stats.removed, "cleaned up before retry"),
                    Err(e) => warn!(operation, error = %e, "cleanup before retry failed"),
                }
            }
        }

        warn!(operation, attempts = records.len(), "all attempts failed");
        Err(last_error.unwrap_or_else(|| {
            TaskError::execution(format!("{operation} made no attempts"), None)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tf_core::error::ErrorKind;

    #[test]
    fn bounds() {
        assert!(RetryPolicy::new(0).is_err());
        assert!(RetryPolicy::new(1).is_ok());
        assert!(RetryPolicy::new(2).is_ok());
        let err = RetryPolicy::new(3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(RetryPolicy::default().max_attempts(), 2);
    }
}
