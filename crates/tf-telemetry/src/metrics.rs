use ahash::AHashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

pub const OPERATIONS_TOTAL: &str = "taskforge_operations_total";
pub const RETRY_ATTEMPTS_TOTAL: &str = "taskforge_retry_attempts_total";
pub const OPERATION_DURATION_MS: &str = "taskforge_operation_duration_ms";
pub const CACHE_ENTRIES: &str = "taskforge_cache_entries";

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

/// A histogram that tracks the distribution of observed values across buckets.
#[derive(Debug)]
pub struct Histogram {
    pub buckets: Vec<f64>,
    pub counts: Vec<AtomicU64>,
    pub sum: AtomicU64,
    pub count: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value into the histogram.
    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        // sum is stored as f64 bits so it can be updated atomically
        let mut current = self.sum.load(Ordering::Relaxed);
        loop {
            let new = (f64::from_bits(current) + value).to_bits();
            match self
                .sum
                .compare_exchange_weak(current, new, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        for (i, boundary) in self.buckets.iter().enumerate() {
            if value <= *boundary {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_sum(&self) -> f64 {
        f64::from_bits(self.sum.load(Ordering::Relaxed))
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Millisecond buckets spanning cache lookups (<2s) up to long builds (>60s).
fn default_duration_ms_buckets() -> Vec<f64> {
    vec![
        10.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_000.0, 5_000.0, 10_000.0, 30_000.0,
        60_000.0, 120_000.0,
    ]
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// A sorted list of key=value pairs distinguishing series of one metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut v: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        Self(v)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Format labels as `{key="value",key2="value2"}`.
    pub fn prometheus_str(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let inner: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect();
        format!("{{{}}}", inner.join(","))
    }
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

type HistogramKey = (String, Labels);

/// Counters, gauges and duration histograms for engine operations.
///
/// Thread-safe: registration goes through `RwLock`s, values are atomics.
#[derive(Debug)]
pub struct MetricsCollector {
    counters: RwLock<AHashMap<(String, Labels), AtomicU64>>,
    gauges: RwLock<AHashMap<String, AtomicI64>>,
    histograms: RwLock<AHashMap<HistogramKey, Histogram>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(AHashMap::new()),
            gauges: RwLock::new(AHashMap::new()),
            histograms: RwLock::new(AHashMap::new()),
        }
    }

    // -- Counters -----------------------------------------------------------

    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_counter_by(name, labels, 1);
    }

    pub fn increment_counter_by(&self, name: &str, labels: &[(&str, &str)], amount: u64) {
        let key = (name.to_string(), Labels::new(labels));
        {
            let map = read(&self.counters);
            if let Some(c) = map.get(&key) {
                c.fetch_add(amount, Ordering::Relaxed);
                return;
            }
        }
        let mut map = write(&self.counters);
        map.entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(amount, Ordering::Relaxed);
    }

    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        read(&self.counters)
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    // -- Gauges -------------------------------------------------------------

    pub fn set_gauge(&self, name: &str, value: i64) {
        {
            let map = read(&self.gauges);
            if let Some(g) = map.get(name) {
                g.store(value, Ordering::Relaxed);
                return;
            }
        }
        write(&self.gauges)
            .entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn get_gauge(&self, name: &str) -> i64 {
        read(&self.gauges)
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    // -- Histograms ---------------------------------------------------------

    /// Record a value. Unknown histograms are created with millisecond buckets.
    pub fn record_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = (name.to_string(), Labels::new(labels));
        {
            let map = read(&self.histograms);
            if let Some(h) = map.get(&key) {
                h.observe(value);
                return;
            }
        }
        write(&self.histograms)
            .entry(key)
            .or_insert_with(|| Histogram::new(default_duration_ms_buckets()))
            .observe(value);
    }

    /// (count, sum) of a histogram series, zero when never observed.
    pub fn histogram_stats(&self, name: &str, labels: &[(&str, &str)]) -> (u64, f64) {
        let key = (name.to_string(), Labels::new(labels));
        read(&self.histograms)
            .get(&key)
            .map(|h| (h.get_count(), h.get_sum()))
            .unwrap_or((0, 0.0))
    }

    // -- Engine helpers -----------------------------------------------------

    /// Count one finished operation and record its duration.
    pub fn record_operation(&self, operation: &str, outcome: &str, duration_ms: u64) {
        self.increment_counter(
            OPERATIONS_TOTAL,
            &[("operation", operation), ("outcome", outcome)],
        );
        self.record_histogram(
            OPERATION_DURATION_MS,
            &[("operation", operation)],
            duration_ms as f64,
        );
    }

    /// Count one attempt of a retried operation.
    pub fn record_retry_attempt(&self, operation: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.increment_counter(
            RETRY_ATTEMPTS_TOTAL,
            &[("operation", operation), ("outcome", outcome)],
        );
    }

    // -- Export --------------------------------------------------------------

    /// Export all metrics in Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        {
            let map = read(&self.counters);
            let mut grouped: AHashMap<&str, Vec<(&Labels, u64)>> = AHashMap::new();
            for ((name, labels), val) in map.iter() {
                grouped
                    .entry(name.as_str())
                    .or_default()
                    .push((labels, val.load(Ordering::Relaxed)));
            }
            let mut names: Vec<&&str> = grouped.keys().collect();
            names.sort();
            for name in names {
                out.push_str(&format!("# TYPE {name} counter\n"));
                for (labels, value) in &grouped[name] {
                    out.push_str(&format!("{name}{} {value}\n", labels.prometheus_str()));
                }
            }
        }

        {
            let map = read(&self.gauges);
            let mut names: Vec<&String> = map.keys().collect();
            names.sort();
            for name in names {
                let val = map[name].load(Ordering::Relaxed);
                out.push_str(&format!("# TYPE {name} gauge\n{name} {val}\n"));
            }
        }

        {
            let map = read(&self.histograms);
            let mut keys: Vec<&HistogramKey> = map.keys().collect();
            keys.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1 .0.cmp(&b.1 .0)));
            let mut last_name: Option<&str> = None;
            for key in keys {
                let (name, labels) = key;
                if last_name != Some(name.as_str()) {
                    out.push_str(&format!("# TYPE {name} histogram\n"));
                    last_name = Some(name.as_str());
                }
                let h = &map[key];
                let mut cumulative_labels = labels.0.clone();
                for (i, boundary) in h.buckets.iter().enumerate() {
                    cumulative_labels.push(("le".into(), boundary.to_string()));
                    let l = Labels(cumulative_labels.clone());
                    out.push_str(&format!(
                        "{name}_bucket{} {}\n",
                        l.prometheus_str(),
                        h.counts[i].load(Ordering::Relaxed)
                    ));
                    cumulative_labels.pop();
                }
                cumulative_labels.push(("le".into(), "+Inf".into()));
                out.push_str(&format!(
                    "{name}_bucket{} {}\n",
                    Labels(cumulative_labels).prometheus_str(),
                    h.get_count()
                ));
                out.push_str(&format!("{name}_sum{} {}\n", labels.prometheus_str(), h.get_sum()));
                out.push_str(&format!(
                    "{name}_count{} {}\n",
                    labels.prometheus_str(),
                    h.get_count()
                ));
            }
        }

        out
    }

    /// Export all metrics as a JSON value.
    pub fn export_json(&self) -> serde_json::Value {
        let mut counters_json = serde_json::Map::new();
        for ((name, labels), val) in read(&self.counters).iter() {
            counters_json.insert(
                format!("{name}{}", labels.prometheus_str()),
                serde_json::json!(val.load(Ordering::Relaxed)),
            );
        }

        let mut gauges_json = serde_json::Map::new();
        for (name, val) in read(&self.gauges).iter() {
            gauges_json.insert(name.clone(), serde_json::json!(val.load(Ordering::Relaxed)));
        }

        let mut histograms_json = serde_json::Map::new();
        for ((name, labels), h) in read(&self.histograms).iter() {
            histograms_json.insert(
                format!("{name}{}", labels.prometheus_str()),
                serde_json::json!({
                    "sum": h.get_sum(),
                    "count": h.get_count(),
                }),
            );
        }

        serde_json::json!({
            "counters": counters_json,
            "gauges": gauges_json,
            "histograms": histograms_json,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Global singleton
// ---------------------------------------------------------------------------

/// Process-wide collector, used by components built without an explicit one.
pub fn global_metrics() -> &'static MetricsCollector {
    use std::sync::OnceLock;
    static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
    INSTANCE.get_or_init(MetricsCollector::new)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
