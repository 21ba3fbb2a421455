// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Metrics recording for hook activity.
//!
//! [`MetricsRecorder`] is the contract the session controller records
//! against. [`HookMetrics`] keeps everything in process (counters by label
//! set, per-tool stats, latency histograms) and is what tests and the log
//! backend use; the OTLP meter lives in `telemetry::otlp`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::TelemetryError;

/// Instrument names.
pub mod names {
    pub const TOOL_CALLS_TOTAL: &str = "claude.tool_calls_total";
    pub const TOOL_CALLS_ERRORS_TOTAL: &str = "claude.tool_calls_errors_total";
    pub const TOOL_CALL_DURATION_MS: &str = "claude.tool_call_duration_ms";
    pub const TURNS_TOTAL: &str = "claude.turns_total";
    pub const CACHE_HITS_TOTAL: &str = "claude.cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "claude.cache_misses_total";
    pub const CACHE_CREATIONS_TOTAL: &str = "claude.cache_creations_total";
    pub const MODEL_REQUESTS_TOTAL: &str = "claude.model_requests_total";
    pub const CONTEXT_COMPACTIONS_TOTAL: &str = "claude.context_compactions_total";
    pub const PROMPT_LATENCY_MS: &str = "claude.prompt_latency_ms";
}

/// Sink for the hook metrics.
///
/// Implementations must be cheap and must not fail; a broken backend simply
/// drops the data point.
pub trait MetricsRecorder: Send + Sync {
    /// One completed tool call, labelled by `tool.name`.
    fn record_tool_call(&self, tool_name: &str, duration_ms: f64, error: bool);

    /// `count` completed turns, labelled by `model`.
    fn record_turn(&self, model: &str, count: u64);

    /// One cache hit or miss (hit when `cache_read_tokens > 0`), plus a
    /// cache creation when `cache_creation_tokens > 0`.
    fn record_cache_usage(&self, cache_read_tokens: u64, cache_creation_tokens: u64, model: &str);

    /// One request to `model`.
    fn record_model_request(&self, model: &str);

    /// One context compaction, labelled by `trigger` and `model`.
    fn record_compaction(&self, trigger: &str, model: &str);

    /// Time between the end of one session and the next prompt.
    fn record_prompt_latency(&self, latency_ms: f64, model: &str);

    /// Push buffered data points, blocking at most `timeout`.
    fn force_flush(&self, _timeout: Duration) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Recorder that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn record_tool_call(&self, _tool_name: &str, _duration_ms: f64, _error: bool) {}
    fn record_turn(&self, _model: &str, _count: u64) {}
    fn record_cache_usage(&self, _read: u64, _creation: u64, _model: &str) {}
    fn record_model_request(&self, _model: &str) {}
    fn record_compaction(&self, _trigger: &str, _model: &str) {}
    fn record_prompt_latency(&self, _latency_ms: f64, _model: &str) {}
}

/// Sorted `key=value` pairs identifying one time series.
pub type LabelSet = Vec<(String, String)>;

fn labels(pairs: &[(&str, &str)]) -> LabelSet {
    let mut set: LabelSet = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    set.sort();
    set
}

/// In-process metrics registry.
#[derive(Debug)]
pub struct HookMetrics {
    /// Counter values by instrument name and label set.
    counters: RwLock<BTreeMap<(String, LabelSet), u64>>,

    /// Histograms by instrument name.
    histograms: RwLock<HashMap<String, Histogram>>,

    /// Per-tool call statistics.
    tools: RwLock<HashMap<String, ToolMetrics>>,

    /// Start time for calculating uptime.
    start_time: Instant,
}

impl HookMetrics {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            histograms: RwLock::new(HashMap::new()),
            tools: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
        lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
        lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add(&self, name: &str, value: u64, pairs: &[(&str, &str)]) {
        let mut counters = Self::write(&self.counters);
        *counters.entry((name.to_string(), labels(pairs))).or_insert(0) += value;
    }

    fn observe(&self, name: &str, value_ms: f64) {
        let mut histograms = Self::write(&self.histograms);
        histograms
            .entry(name.to_string())
            .or_default()
            .record(value_ms);
    }

    /// Sum of a counter across all label sets.
    pub fn counter(&self, name: &str) -> u64 {
        Self::read(&self.counters)
            .iter()
            .filter(|((n, _), _)| n == name)
            .map(|(_, v)| *v)
            .sum()
    }

    /// Value of a counter for one exact label set.
    pub fn counter_with(&self, name: &str, pairs: &[(&str, &str)]) -> u64 {
        Self::read(&self.counters)
            .get(&(name.to_string(), labels(pairs)))
            .copied()
            .unwrap_or(0)
    }

    /// Get a histogram by instrument name.
    pub fn histogram(&self, name: &str) -> Option<Histogram> {
        Self::read(&self.histograms).get(name).cloned()
    }

    /// Get metrics for a specific tool.
    pub fn tool_metrics(&self, name: &str) -> Option<ToolMetrics> {
        Self::read(&self.tools).get(name).cloned()
    }

    /// Get uptime since the registry was created.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: Self::read(&self.counters).clone(),
            tools: Self::read(&self.tools).clone(),
            histograms: Self::read(&self.histograms).clone(),
            uptime: self.uptime(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        Self::write(&self.counters).clear();
        Self::write(&self.histograms).clear();
        Self::write(&self.tools).clear();
    }
}

impl Default for HookMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder for HookMetrics {
    fn record_tool_call(&self, tool_name: &str, duration_ms: f64, error: bool) {
        let attrs = [("tool.name", tool_name)];
        self.add(names::TOOL_CALLS_TOTAL, 1, &attrs);
        if error {
            self.add(names::TOOL_CALLS_ERRORS_TOTAL, 1, &attrs);
        }
        self.observe(names::TOOL_CALL_DURATION_MS, duration_ms);

        let mut tools = Self::write(&self.tools);
        tools
            .entry(tool_name.to_string())
            .or_default()
            .record(duration_ms, !error);
    }

    fn record_turn(&self, model: &str, count: u64) {
        self.add(names::TURNS_TOTAL, count, &[("model", model)]);
    }

    fn record_cache_usage(&self, cache_read_tokens: u64, cache_creation_tokens: u64, model: &str) {
        let attrs = [("model", model)];
        if cache_read_tokens > 0 {
            self.add(names::CACHE_HITS_TOTAL, 1, &attrs);
        } else {
            self.add(names::CACHE_MISSES_TOTAL, 1, &attrs);
        }
        if cache_creation_tokens > 0 {
            self.add(names::CACHE_CREATIONS_TOTAL, 1, &attrs);
        }
    }

    fn record_model_request(&self, model: &str) {
        self.add(names::MODEL_REQUESTS_TOTAL, 1, &[("model", model)]);
    }

    fn record_compaction(&self, trigger: &str, model: &str) {
        self.add(
            names::CONTEXT_COMPACTIONS_TOTAL,
            1,
            &[("trigger", trigger), ("model", model)],
        );
    }

    fn record_prompt_latency(&self, latency_ms: f64, _model: &str) {
        self.observe(names::PROMPT_LATENCY_MS, latency_ms);
    }

    /// Nothing to export; the current report goes to the debug log.
    fn force_flush(&self, _timeout: Duration) -> Result<(), TelemetryError> {
        debug!(report = %self.snapshot().format_report(), "Hook metrics");
        Ok(())
    }
}

/// Call statistics for one tool.
#[derive(Debug, Clone)]
pub struct ToolMetrics {
    /// Total number of invocations.
    pub invocations: u64,

    /// Number of successful invocations.
    pub successes: u64,

    /// Number of failed invocations.
    pub failures: u64,

    /// Total time spent in this tool, in milliseconds.
    pub total_ms: f64,

    /// Minimum call duration.
    pub min_ms: f64,

    /// Maximum call duration.
    pub max_ms: f64,
}

impl ToolMetrics {
    /// Create new empty tool metrics.
    pub fn new() -> Self {
        Self {
            invocations: 0,
            successes: 0,
            failures: 0,
            total_ms: 0.0,
            min_ms: f64::MAX,
            max_ms: 0.0,
        }
    }

    /// Record one call.
    pub fn record(&mut self, duration_ms: f64, success: bool) {
        self.invocations += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_ms += duration_ms;
        self.min_ms = self.min_ms.min(duration_ms);
        self.max_ms = self.max_ms.max(duration_ms);
    }

    /// Average call duration in milliseconds.
    pub fn avg_ms(&self) -> f64 {
        if self.invocations == 0 {
            0.0
        } else {
            self.total_ms / self.invocations as f64
        }
    }

    /// Success rate (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.invocations == 0 {
            1.0
        } else {
            self.successes as f64 / self.invocations as f64
        }
    }
}

impl Default for ToolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-bucket histogram over millisecond values.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Upper bucket bounds in milliseconds.
    /// Default: [10ms, 100ms, 1s, 10s, 1min, 10min, +inf]
    buckets: Vec<f64>,

    /// Count per bucket (one extra for overflow).
    counts: Vec<u64>,

    /// Sum of all recorded values.
    sum: f64,
}

impl Histogram {
    /// Create a histogram with custom upper bounds (in milliseconds).
    pub fn with_buckets(buckets: Vec<f64>) -> Self {
        let counts = vec![0; buckets.len() + 1];
        Self {
            buckets,
            counts,
            sum: 0.0,
        }
    }

    /// Record a value.
    pub fn record(&mut self, value_ms: f64) {
        let idx = self
            .buckets
            .iter()
            .position(|&b| value_ms <= b)
            .unwrap_or(self.buckets.len());
        self.counts[idx] += 1;
        self.sum += value_ms;
    }

    /// Number of recorded values.
    pub fn count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Sum of recorded values.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Get counts for each bucket.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Approximate percentile, as the upper bound of the bucket it falls in.
    pub fn percentile(&self, p: f64) -> f64 {
        let total = self.count();
        if total == 0 {
            return 0.0;
        }

        let target = (total as f64 * p / 100.0).ceil() as u64;
        let mut cumulative = 0u64;

        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return match self.buckets.get(i) {
                    Some(bound) => *bound,
                    None => self.buckets.last().copied().unwrap_or(0.0) * 10.0,
                };
            }
        }

        0.0
    }

    /// p50 (median).
    pub fn p50(&self) -> f64 {
        self.percentile(50.0)
    }

    /// p99.
    pub fn p99(&self) -> f64 {
        self.percentile(99.0)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::with_buckets(vec![10.0, 100.0, 1_000.0, 10_000.0, 60_000.0, 600_000.0])
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<(String, LabelSet), u64>,
    pub tools: HashMap<String, ToolMetrics>,
    pub histograms: HashMap<String, Histogram>,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Hook Metrics ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n\n", self.uptime));

        if !self.counters.is_empty() {
            report.push_str("Counters:\n");
            for ((name, labels), value) in &self.counters {
                let labels = labels
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(",");
                report.push_str(&format!("  {}{{{}}} {}\n", name, labels, value));
            }
            report.push('\n');
        }

        if !self.tools.is_empty() {
            let mut names: Vec<_> = self.tools.keys().collect();
            names.sort();
            report.push_str("Tools:\n");
            for name in names {
                let metrics = &self.tools[name];
                report.push_str(&format!(
                    "  {}: {} calls, {:.1}% success, avg {:.1}ms\n",
                    name,
                    metrics.invocations,
                    metrics.success_rate() * 100.0,
                    metrics.avg_ms()
                ));
            }
            report.push('\n');
        }

        for (name, hist) in &self.histograms {
            report.push_str(&format!(
                "{}: {} samples, p50 {}ms, p99 {}ms\n",
                name,
                hist.count(),
                hist.p50(),
                hist.p99()
            ));
        }

        report
    }
}
