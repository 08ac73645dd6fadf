//! Request performance instrumentation.
//!
//! Every completed inbound request becomes an immutable [`RequestRecord`]
//! in a bounded rolling window. Per-endpoint aggregates are updated
//! incrementally alongside it and are never recompacted against window
//! evictions, so over long runs they describe all requests seen while the
//! window only describes the last `capacity`.

use crate::metrics::{BoundedRing, MetricRegistry};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Requests retained in the rolling window by default
pub const DEFAULT_RING_CAPACITY: usize = 1000;

/// Counter incremented once per request
pub const REQUESTS_TOTAL: &str = "http_requests_total";
/// Counter incremented once per request with status >= 400
pub const REQUEST_ERRORS_TOTAL: &str = "http_request_errors_total";
/// Histogram of request durations in seconds
pub const REQUEST_DURATION: &str = "http_request_duration_seconds";

/// One completed request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    /// Duration in seconds
    pub duration: f64,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Option<String>,
}

impl RequestRecord {
    /// Build a record stamped with the current time
    pub fn new(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        status_code: u16,
        duration: Duration,
        actor_id: Option<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            status_code,
            duration: duration.as_secs_f64(),
            timestamp: Utc::now(),
            actor_id,
        }
    }

    /// Whether the response was a client or server error
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

/// Running aggregate for one (method, endpoint) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
    pub method: String,
    pub endpoint: String,
    pub count: u64,
    /// Cumulative duration in seconds
    pub total_time: f64,
    pub errors: u64,
    pub min_time: f64,
    pub max_time: f64,
    pub status_codes: BTreeMap<u16, u64>,
}

impl EndpointStats {
    fn new(method: &str, endpoint: &str) -> Self {
        Self {
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            count: 0,
            total_time: 0.0,
            errors: 0,
            min_time: f64::INFINITY,
            max_time: 0.0,
            status_codes: BTreeMap::new(),
        }
    }

    fn observe(&mut self, record: &RequestRecord) {
        self.count += 1;
        self.total_time += record.duration;
        self.min_time = self.min_time.min(record.duration);
        self.max_time = self.max_time.max(record.duration);
        *self.status_codes.entry(record.status_code).or_insert(0) += 1;
        if record.is_error() {
            self.errors += 1;
        }
    }

    /// Mean duration in seconds
    pub fn avg_time(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_time / self.count as f64
        }
    }
}

/// An entry of the slowest-endpoints ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowEndpoint {
    pub method: String,
    pub endpoint: String,
    pub avg_time: f64,
    pub count: usize,
}

/// Aggregate view of the requests inside a time window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    /// Requests inside the window
    pub requests_per_hour: usize,
    /// Mean duration in seconds
    pub avg_response_time: f64,
    /// Percentage of requests with status >= 400
    pub error_rate: f64,
    pub slowest_endpoints: Vec<SlowEndpoint>,
    /// Lifetime count of error responses by status code
    pub error_breakdown: BTreeMap<u16, u64>,
    pub window_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct Window {
    records: BoundedRing<RequestRecord>,
    endpoints: HashMap<(String, String), EndpointStats>,
    error_counts: BTreeMap<u16, u64>,
}

/// Records completed requests and summarizes recent performance
#[derive(Debug)]
pub struct RequestInstrumentation {
    window: Mutex<Window>,
    registry: Arc<MetricRegistry>,
    summary_window: Duration,
    slowest_limit: usize,
}

impl RequestInstrumentation {
    /// Create instrumentation keeping `capacity` requests
    pub fn new(registry: Arc<MetricRegistry>, capacity: usize) -> Self {
        Self {
            window: Mutex::new(Window {
                records: BoundedRing::new(capacity),
                endpoints: HashMap::new(),
                error_counts: BTreeMap::new(),
            }),
            registry,
            summary_window: Duration::from_secs(3600),
            slowest_limit: 10,
        }
    }

    /// Window used by [`Self::current_summary`]
    pub fn with_summary_window(mut self, window: Duration) -> Self {
        self.summary_window = window;
        self
    }

    /// Number of endpoints reported as slowest
    pub fn with_slowest_limit(mut self, limit: usize) -> Self {
        self.slowest_limit = limit;
        self
    }

    /// Record a completed request
    pub fn record_request(
        &self,
        endpoint: &str,
        method: &str,
        status_code: u16,
        duration: Duration,
        actor_id: Option<&str>,
    ) {
        self.record(RequestRecord::new(
            endpoint,
            method,
            status_code,
            duration,
            actor_id.map(str::to_string),
        ));
    }

    /// Record a prebuilt request record
    pub fn record(&self, record: RequestRecord) {
        let status = record.status_code.to_string();
        let method = record.method.clone();
        let endpoint = record.endpoint.clone();
        let duration = record.duration;
        let is_error = record.is_error();

        {
            let mut window = self.window.lock();
            window
                .endpoints
                .entry((record.method.clone(), record.endpoint.clone()))
                .or_insert_with(|| EndpointStats::new(&record.method, &record.endpoint))
                .observe(&record);
            if is_error {
                *window.error_counts.entry(record.status_code).or_insert(0) += 1;
            }
            window.records.push(record);
        }

        let tags = [("method", method.as_str()), ("endpoint", endpoint.as_str())];
        let status_tags = [tags[0], tags[1], ("status", status.as_str())];
        self.registry.increment(REQUESTS_TOTAL, &status_tags);
        self.registry.record_histogram(REQUEST_DURATION, duration, &tags);
        if is_error {
            self.registry.increment(REQUEST_ERRORS_TOTAL, &status_tags);
        }
    }

    /// Requests currently held in the rolling window
    pub fn len(&self) -> usize {
        self.window.lock().records.len()
    }

    /// Whether no request has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Newest `limit` records, oldest first
    pub fn recent_requests(&self, limit: usize) -> Vec<RequestRecord> {
        self.window.lock().records.recent(limit)
    }

    /// Summary over the configured window
    pub fn current_summary(&self) -> PerformanceSummary {
        self.summary(self.summary_window)
    }

    /// Summary over the requests newer than `now - window`.
    ///
    /// With no requests in the window every rate is zero.
    pub fn summary(&self, window: Duration) -> PerformanceSummary {
        let now = Utc::now();
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w));

        let (recent, error_breakdown) = {
            let guard = self.window.lock();
            let recent: Vec<RequestRecord> = guard
                .records
                .iter()
                .filter(|r| cutoff.map_or(true, |c| r.timestamp > c))
                .cloned()
                .collect();
            (recent, guard.error_counts.clone())
        };

        let mut summary = PerformanceSummary {
            requests_per_hour: recent.len(),
            avg_response_time: 0.0,
            error_rate: 0.0,
            slowest_endpoints: Vec::new(),
            error_breakdown,
            window_seconds: window.as_secs(),
            timestamp: now,
        };
        if recent.is_empty() {
            return summary;
        }

        let total = recent.len() as f64;
        let total_time: f64 = recent.iter().map(|r| r.duration).sum();
        let errors = recent.iter().filter(|r| r.is_error()).count();
        summary.avg_response_time = total_time / total;
        summary.error_rate = errors as f64 / total * 100.0;
        summary.slowest_endpoints = slowest_endpoints(&recent, self.slowest_limit);
        summary
    }

    /// Lifetime per-endpoint aggregates, slowest average first
    pub fn endpoint_stats(&self) -> Vec<EndpointStats> {
        let mut stats: Vec<EndpointStats> =
            self.window.lock().endpoints.values().cloned().collect();
        stats.sort_by(|a, b| {
            b.avg_time()
                .total_cmp(&a.avg_time())
                .then_with(|| b.count.cmp(&a.count))
                .then_with(|| a.endpoint.cmp(&b.endpoint))
                .then_with(|| a.method.cmp(&b.method))
        });
        stats
    }
}

/// Rank endpoints by mean duration; ties go to the busier endpoint, then
/// to the lexicographically smaller name.
fn slowest_endpoints(records: &[RequestRecord], limit: usize) -> Vec<SlowEndpoint> {
    let mut grouped: HashMap<(&str, &str), (f64, usize)> = HashMap::new();
    for record in records {
        let entry = grouped
            .entry((record.method.as_str(), record.endpoint.as_str()))
            .or_insert((0.0, 0));
        entry.0 += record.duration;
        entry.1 += 1;
    }

    let mut ranked: Vec<SlowEndpoint> = grouped
        .into_iter()
        .map(|((method, endpoint), (total, count))| SlowEndpoint {
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            avg_time: total / count as f64,
            count,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.avg_time
            .total_cmp(&a.avg_time)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.endpoint.cmp(&b.endpoint))
            .then_with(|| a.method.cmp(&b.method))
    });
    ranked.truncate(limit);
    ranked
}
