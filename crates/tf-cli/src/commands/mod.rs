pub mod cache;
pub mod containers;
pub mod run;
pub mod template;

use std::path::Path;

use serde::Serialize;
use tf_telemetry::metrics::MetricsCollector;

/// Pretty-print `value` as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read a token from the named environment variable, if one was given.
pub fn token_from_env(var: Option<&str>) -> anyhow::Result<Option<String>> {
    match var {
        None => Ok(None),
        Some(name) => std::env::var(name)
            .map(Some)
            .map_err(|_| anyhow::anyhow!("environment variable {name} is not set")),
    }
}

/// Export `metrics` to `path`, as JSON when the extension is `.json` and in
/// Prometheus text format otherwise.
pub fn write_metrics(path: &Path, metrics: &MetricsCollector) -> anyhow::Result<()> {
    let body = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::to_string_pretty(&metrics.export_json())?
    } else {
        metrics.export_prometheus()
    };
    std::fs::write(path, body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_format_follows_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let metrics = MetricsCollector::new();
        metrics.record_operation("clone", "success", 12);

        let prom = tmp.path().join("tf.prom");
        write_metrics(&prom, &metrics).unwrap();
        let text = std::fs::read_to_string(&prom).unwrap();
        assert!(text.contains("operation=\"clone\""));

        let json = tmp.path().join("tf.json");
        write_metrics(&json, &metrics).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert!(value.is_object());
    }
}
