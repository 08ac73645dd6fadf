//! Declarative threshold rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Threshold comparison.
///
/// Strings outside the known set deserialize to [`Comparison::Unknown`] so a
/// bad rule can be reported instead of failing the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Comparison {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Unknown(String),
}

impl Comparison {
    /// Apply the comparison. `None` for an unknown operator.
    ///
    /// `Eq` is exact equality, so computed values rarely match it.
    #[allow(clippy::float_cmp)]
    pub fn evaluate(&self, value: f64, threshold: f64) -> Option<bool> {
        match self {
            Self::Gt => Some(value > threshold),
            Self::Lt => Some(value < threshold),
            Self::Gte => Some(value >= threshold),
            Self::Lte => Some(value <= threshold),
            Self::Eq => Some(value == threshold),
            Self::Unknown(_) => None,
        }
    }

    /// Whether this is one of the supported operators
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Operator as written in configuration
    pub fn as_str(&self) -> &str {
        match self {
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Eq => "eq",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for Comparison {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "gt" => Self::Gt,
            "lt" => Self::Lt,
            "gte" => Self::Gte,
            "lte" => Self::Lte,
            "eq" => Self::Eq,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<Comparison> for String {
    fn from(comparison: Comparison) -> Self {
        comparison.as_str().to_string()
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

/// A threshold on one value of the merged snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique rule id, also the id of the alerts it raises
    pub id: String,
    /// Dotted path into the merged snapshot
    pub path: String,
    pub operator: Comparison,
    pub threshold: f64,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
}

impl AlertRule {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        operator: Comparison,
        threshold: f64,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            operator,
            threshold,
            message: message.into(),
            severity,
        }
    }
}

/// Rules used when none are configured
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            "high_cpu",
            "system.cpu.percent",
            Comparison::Gt,
            80.0,
            "High CPU usage detected",
            Severity::Warning,
        ),
        AlertRule::new(
            "high_memory",
            "system.memory.percent",
            Comparison::Gt,
            85.0,
            "High memory usage detected",
            Severity::Warning,
        ),
        AlertRule::new(
            "high_error_rate",
            "performance.error_rate",
            Comparison::Gt,
            5.0,
            "High error rate detected",
            Severity::Critical,
        ),
        AlertRule::new(
            "slow_response_time",
            "performance.avg_response_time",
            Comparison::Gt,
            2.0,
            "Slow response times detected",
            Severity::Warning,
        ),
    ]
}
