//! Telemetry for taskforge: logging setup, execution spans with correlation
//! identifiers, the status vocabulary used in structured log lines, and an
//! in-process metrics collector.
//!
//! Key components:
//! - **Logging**: human-readable and JSON output via `tracing-subscriber`
//! - **Tracing**: correlation ids and per-execution spans
//! - **Status**: `ExecutionStatus` and the `timed` helper that logs entry/exit with `duration_ms`
//! - **Metrics**: counters, gauges and duration histograms with Prometheus export

pub mod logging;
pub mod metrics;
pub mod status;
pub mod tracing_setup;
