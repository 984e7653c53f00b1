use std::fmt;
use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Lifecycle marker carried in the `status` field of structured log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Started,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Started => "STARTED",
            ExecutionStatus::InProgress => "IN_PROGRESS",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milliseconds elapsed since `start`.
pub fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Run `fut`, logging STARTED on entry and COMPLETED or FAILED with
/// `duration_ms` on exit. Returns the output together with the duration.
pub async fn timed<F, T, E>(operation: &str, fut: F) -> (Result<T, E>, u64)
where
    F: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    info!(operation, status = %ExecutionStatus::Started, "operation started");
    let start = Instant::now();
    let result = fut.await;
    let duration_ms = elapsed_ms(start);
    match &result {
        Ok(_) => info!(
            operation,
            status = %ExecutionStatus::Completed,
            duration_ms,
            "operation completed"
        ),
        Err(e) => warn!(
            operation,
            status = %ExecutionStatus::Failed,
            duration_ms,
            error = %e,
            "operation failed"
        ),
    }
    (result, duration_ms)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
