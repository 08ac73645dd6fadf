//! Thread-safe store of counters, gauges and bounded histograms.
//!
//! Storage is sharded (`DashMap`), so concurrent writers only contend when
//! their keys share a shard. Each histogram window has its own lock.

use crate::metrics::ring_buffer::BoundedRing;
use crate::metrics::types::{HistogramStats, MetricKey, MetricsSnapshot, Sample};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default number of samples retained per histogram key
pub const DEFAULT_HISTOGRAM_CAPACITY: usize = 1000;

/// Process-wide metric store
#[derive(Debug)]
pub struct MetricRegistry {
    counters: DashMap<MetricKey, AtomicU64>,
    gauges: DashMap<MetricKey, f64>,
    histograms: DashMap<MetricKey, Mutex<BoundedRing<Sample>>>,
    histogram_capacity: usize,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HISTOGRAM_CAPACITY)
    }
}

impl MetricRegistry {
    /// Create a registry whose histograms retain `histogram_capacity` samples
    pub fn new(histogram_capacity: usize) -> Self {
        assert!(histogram_capacity > 0, "Capacity must be greater than 0");

        Self {
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
            histogram_capacity,
        }
    }

    /// Add `delta` to a counter, creating it at zero if absent.
    ///
    /// Negative deltas are ignored: counters never decrease.
    pub fn increment_counter(&self, name: &str, delta: i64, tags: &[(&str, &str)]) {
        let Ok(delta) = u64::try_from(delta) else {
            tracing::trace!(metric = name, delta, "Ignoring negative counter delta");
            return;
        };

        let key = MetricKey::new(name, tags);
        if let Some(counter) = self.counters.get(&key) {
            counter.fetch_add(delta, Ordering::Relaxed);
            return;
        }

        self.counters
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Increment a counter by one
    pub fn increment(&self, name: &str, tags: &[(&str, &str)]) {
        self.increment_counter(name, 1, tags);
    }

    /// Overwrite a gauge
    pub fn set_gauge(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.gauges.insert(MetricKey::new(name, tags), value);
    }

    /// Append a histogram sample, evicting the oldest once the window is full.
    ///
    /// NaN and infinite values are ignored.
    pub fn record_histogram(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        if !value.is_finite() {
            tracing::trace!(metric = name, value, "Ignoring non-finite histogram sample");
            return;
        }

        let sample = Sample {
            value,
            timestamp: Utc::now(),
        };
        let window = self
            .histograms
            .entry(MetricKey::new(name, tags))
            .or_insert_with(|| Mutex::new(BoundedRing::new(self.histogram_capacity)));
        window.lock().push(sample);
    }

    /// Record a duration, in seconds, into the histogram `<name>.duration`
    pub fn record_timing(&self, name: &str, duration: Duration, tags: &[(&str, &str)]) {
        self.record_histogram(&format!("{}.duration", name), duration.as_secs_f64(), tags);
    }

    /// Current value of a counter
    pub fn counter(&self, name: &str, tags: &[(&str, &str)]) -> Option<u64> {
        self.counters
            .get(&MetricKey::new(name, tags))
            .map(|c| c.load(Ordering::Relaxed))
    }

    /// Most recently set value of a gauge
    pub fn gauge(&self, name: &str, tags: &[(&str, &str)]) -> Option<f64> {
        self.gauges.get(&MetricKey::new(name, tags)).map(|g| *g)
    }

    /// Retained histogram values in arrival order
    pub fn histogram_values(&self, name: &str, tags: &[(&str, &str)]) -> Vec<f64> {
        self.histograms
            .get(&MetricKey::new(name, tags))
            .map(|window| window.lock().iter().map(|s| s.value).collect())
            .unwrap_or_default()
    }

    /// Statistics over the retained samples of one histogram
    pub fn histogram_stats(&self, name: &str, tags: &[(&str, &str)]) -> Option<HistogramStats> {
        HistogramStats::from_values(&self.histogram_values(name, tags))
    }

    /// Point-in-time copy of every metric.
    ///
    /// Each shard is read independently, so writes racing with the snapshot
    /// may or may not be included.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().load(Ordering::Relaxed)))
            .collect();

        let gauges = self
            .gauges
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()))
            .collect();

        let mut histograms = BTreeMap::new();
        for entry in &self.histograms {
            let values: Vec<f64> = entry.value().lock().iter().map(|s| s.value).collect();
            if let Some(stats) = HistogramStats::from_values(&values) {
                histograms.insert(entry.key().to_string(), stats);
            }
        }

        MetricsSnapshot {
            counters,
            gauges,
            histograms,
            timestamp: Utc::now(),
        }
    }
}
