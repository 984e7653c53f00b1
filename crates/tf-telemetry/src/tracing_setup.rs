use uuid::Uuid;

/// Generate a correlation id (32 hex characters, OpenTelemetry trace-id sized).
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().as_simple().to_string()
}

/// Generate a span id (16 hex characters).
pub fn generate_span_id() -> String {
    Uuid::new_v4().as_simple().to_string()[..16].to_string()
}

/// Span covering one orchestrator or cache operation for one execution.
///
/// Every event logged inside the span inherits the correlation, project and
/// execution identifiers.
pub fn execution_span(
    correlation_id: &str,
    project_id: &str,
    execution_id: &str,
    operation: &str,
) -> tracing::Span {
    tracing::info_span!(
        "execution",
        correlation_id = %correlation_id,
        project_id = %project_id,
        execution_id = %execution_id,
        span_id = %generate_span_id(),
        operation = %operation,
    )
}

/// Span for a cache operation, keyed by the cache entry it touches.
pub fn cache_span(operation: &str, cache_key: &str) -> tracing::Span {
    tracing::info_span!(
        "cache",
        operation = %operation,
        cache_key = %cache_key,
        span_id = %generate_span_id(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_format() {
        let id = generate_correlation_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn span_id_format() {
        let id = generate_span_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn spans_can_be_entered() {
        let span = execution_span(&generate_correlation_id(), "proj", "exec", "build");
        let _guard = span.enter();
        let child = cache_span("clone", "repo_0123456789ab");
        let _child_guard = child.enter();
    }
}
