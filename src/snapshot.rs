//! Merged telemetry snapshot, dotted-path lookup and the text exposition.

use crate::core::{Result, VigilError};
use crate::metrics::MetricsSnapshot;
use crate::monitoring::SystemSample;
use crate::requests::PerformanceSummary;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;

/// Everything an alert rule can address, read once per evaluation
#[derive(Debug, Clone, Serialize)]
pub struct MergedSnapshot {
    pub app: MetricsSnapshot,
    pub system: SystemSample,
    pub performance: PerformanceSummary,
}

impl MergedSnapshot {
    /// Convert to the JSON tree paths are resolved against
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Look up a dotted path such as `system.cpu.percent`.
///
/// Numeric segments index arrays. Object keys may themselves contain dots
/// (registry keys such as `app.gauges.queue.depth`), so at each object the
/// longest run of remaining segments naming an existing key wins.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let segments: Vec<&str> = path.split('.').collect();
    resolve_segments(root, &segments)
}

fn resolve_segments<'a>(node: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    if segments.is_empty() {
        return Some(node);
    }
    match node {
        Value::Object(map) => (1..=segments.len()).rev().find_map(|take| {
            let key = segments[..take].join(".");
            map.get(&key)
                .and_then(|child| resolve_segments(child, &segments[take..]))
        }),
        Value::Array(items) => {
            let index: usize = segments[0].parse().ok()?;
            resolve_segments(items.get(index)?, &segments[1..])
        },
        _ => None,
    }
}

/// Resolve `path` to a number
pub fn resolve_number(root: &Value, path: &str) -> Result<f64> {
    let value =
        resolve_path(root, path).ok_or_else(|| VigilError::PathNotFound(path.to_string()))?;
    value.as_f64().ok_or_else(|| VigilError::NotNumeric {
        path: path.to_string(),
    })
}

/// Flat text exposition: counters then gauges, one `<key> <value>` per line.
/// Histograms are not exposed.
pub fn render_text(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();
    for (key, value) in &snapshot.counters {
        let _ = writeln!(out, "{} {}", key, value);
    }
    for (key, value) in &snapshot.gauges {
        let _ = writeln!(out, "{} {}", key, value);
    }
    out
}
