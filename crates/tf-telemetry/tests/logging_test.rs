use tf_telemetry::logging;

#[test]
fn init_logging_human() {
    // Second call is a safe no-op.
    logging::init_logging("test-service", "debug");
    logging::init_logging("test-service", "info");

    tracing::info!(key = "value", "human-readable log line");
}

#[test]
fn init_logging_json() {
    // The global subscriber may already be set by another test; this must
    // then silently no-op.
    logging::init_logging_json("test-service-json", "info");

    tracing::info!(key = "value", "json log line");
}

#[test]
fn init_logging_by_format_name() {
    logging::init_logging_with_format("fmt-test", "warn", "JSON");
    logging::init_logging_with_format("fmt-test", "warn", "human");
}
