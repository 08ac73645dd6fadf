//! Core metric types: keys, histogram samples and snapshot shapes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

/// Metric identity: a name plus an unordered tag set.
///
/// Tags are held sorted so two keys built from the same pairs in any order
/// compare, hash and render identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    name: String,
    tags: BTreeMap<String, String>,
}

impl MetricKey {
    /// Build a key from a name and tag pairs
    pub fn new(name: impl Into<String>, tags: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            tags: tags
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    /// Metric name without tags
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag set, sorted by key
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }
}

impl fmt::Display for MetricKey {
    /// Renders `name` or `name[k1=v1,k2=v2]`.
    ///
    /// `[`, `]`, `,`, `=` and `\` inside the name, tag keys or tag values are
    /// escaped with a backslash, so distinct keys never render alike.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_escaped(f, &self.name)?;
        if self.tags.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        for (i, (k, v)) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write_escaped(f, k)?;
            f.write_str("=")?;
            write_escaped(f, v)?;
        }
        f.write_str("]")
    }
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '[' | ']' | ',' | '=' | '\\')
}

fn write_escaped(f: &mut fmt::Formatter<'_>, part: &str) -> fmt::Result {
    if !part.contains(is_delimiter) {
        return f.write_str(part);
    }
    for c in part.chars() {
        if is_delimiter(c) {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    Ok(())
}

/// A single histogram observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Observed value
    pub value: f64,
    /// Arrival time
    pub timestamp: DateTime<Utc>,
}

/// Distribution summary over the retained samples of one histogram
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Point-in-time copy of everything held by the registry.
///
/// Keys are rendered `MetricKey`s. `BTreeMap` keeps serialization and the
/// text exposition ordered.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, HistogramStats>,
    pub timestamp: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Look up a counter by name and tags
    pub fn counter(&self, name: &str, tags: &[(&str, &str)]) -> Option<u64> {
        self.counters.get(&MetricKey::new(name, tags).to_string()).copied()
    }

    /// Look up a gauge by name and tags
    pub fn gauge(&self, name: &str, tags: &[(&str, &str)]) -> Option<f64> {
        self.gauges.get(&MetricKey::new(name, tags).to_string()).copied()
    }
}
