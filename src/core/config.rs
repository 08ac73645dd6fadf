//! Configuration management for Vigil.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI and environment variable overrides (see `cli`)
//! - Validation and defaults

use crate::alerts::{default_rules, AlertRule};
use crate::core::{Result, VigilError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration for Vigil
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Metric registry configuration
    pub metrics: MetricsConfig,
    /// Request instrumentation configuration
    pub requests: RequestConfig,
    /// Resource sampler configuration
    pub system: SystemConfig,
    /// Alert evaluator configuration
    pub alerts: AlertConfig,
    /// Collaborator health checks
    pub health: HealthConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP surface
    pub bind_address: IpAddr,
    /// Port for the HTTP surface
    pub port: u16,
    /// Enable permissive CORS headers
    pub enable_cors: bool,
}

/// Metric registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Samples retained per histogram key
    pub histogram_capacity: usize,
}

/// Request instrumentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Completed requests retained in the rolling window
    pub ring_capacity: usize,
    /// Window used for the performance summary
    #[serde(with = "humantime_serde")]
    pub summary_window: Duration,
    /// Number of endpoints reported as slowest
    pub slowest_limit: usize,
}

/// Resource sampler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Mount point reported in the disk figures
    pub disk_path: PathBuf,
    /// Measurement interval for CPU usage
    #[serde(with = "humantime_serde")]
    pub cpu_sample_interval: Duration,
}

/// Alert evaluator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// How often the evaluator ticks
    #[serde(with = "humantime_serde")]
    pub evaluation_interval: Duration,
    /// Resolved alerts kept in history
    pub history_capacity: usize,
    /// History entries returned by `/alerts`
    pub history_limit: usize,
    /// Soft per-rule time budget
    #[serde(with = "humantime_serde")]
    pub rule_budget: Duration,
    /// Pending notifications before new ones are dropped
    pub notification_queue: usize,
    /// Alert rules
    pub rules: Vec<AlertRule>,
}

/// Collaborator health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Timeout applied to every probe
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// TCP reachability probes
    pub probes: Vec<ProbeConfig>,
}

/// A single TCP reachability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Name reported under `services` in `/health/detailed`
    pub name: String,
    /// `host:port` that must accept a connection
    pub address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Emit JSON lines instead of compact text
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: 9100,
            enable_cors: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            histogram_capacity: 1000,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        RequestConfig {
            ring_capacity: 1000,
            summary_window: Duration::from_secs(3600), // 1 hour
            slowest_limit: 10,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            disk_path: PathBuf::from("/"),
            cpu_sample_interval: Duration::from_secs(1),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            evaluation_interval: Duration::from_secs(60),
            history_capacity: 1000,
            history_limit: 50,
            rule_budget: Duration::from_millis(250),
            notification_queue: 256,
            rules: default_rules(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            probe_timeout: Duration::from_secs(2),
            probes: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.metrics.histogram_capacity == 0 {
            return Err(VigilError::config("histogram_capacity must be greater than 0"));
        }

        if self.requests.ring_capacity == 0 {
            return Err(VigilError::config("ring_capacity must be greater than 0"));
        }

        if self.requests.slowest_limit == 0 {
            return Err(VigilError::config("slowest_limit must be greater than 0"));
        }

        if self.requests.summary_window.is_zero() {
            return Err(VigilError::config("summary_window must be greater than 0"));
        }

        if self.alerts.evaluation_interval.is_zero() {
            return Err(VigilError::config("evaluation_interval must be greater than 0"));
        }

        if self.alerts.history_capacity == 0 {
            return Err(VigilError::config("history_capacity must be greater than 0"));
        }

        if self.alerts.notification_queue == 0 {
            return Err(VigilError::config("notification_queue must be greater than 0"));
        }

        let mut rule_ids = HashSet::new();
        for rule in &self.alerts.rules {
            if rule.id.is_empty() {
                return Err(VigilError::config("alert rule id must not be empty"));
            }
            if !rule_ids.insert(rule.id.as_str()) {
                return Err(VigilError::config(format!("duplicate alert rule id '{}'", rule.id)));
            }
            if rule.path.is_empty() {
                return Err(VigilError::config(format!(
                    "alert rule '{}' has an empty metric path",
                    rule.id
                )));
            }
            if !rule.operator.is_known() {
                return Err(VigilError::config(format!(
                    "alert rule '{}' uses unknown operator '{}'",
                    rule.id, rule.operator
                )));
            }
        }

        let mut probe_names = HashSet::new();
        for probe in &self.health.probes {
            if probe.name.is_empty() || probe.address.is_empty() {
                return Err(VigilError::config("health probes need a name and an address"));
            }
            if !probe_names.insert(probe.name.as_str()) {
                return Err(VigilError::config(format!("duplicate health probe '{}'", probe.name)));
            }
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| VigilError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set HTTP port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set bind address
    pub fn bind_address(mut self, address: IpAddr) -> Self {
        self.config.server.bind_address = address;
        self
    }

    /// Set histogram capacity
    pub fn histogram_capacity(mut self, capacity: usize) -> Self {
        self.config.metrics.histogram_capacity = capacity;
        self
    }

    /// Set request ring capacity
    pub fn ring_capacity(mut self, capacity: usize) -> Self {
        self.config.requests.ring_capacity = capacity;
        self
    }

    /// Set evaluation interval
    pub fn evaluation_interval(mut self, interval: Duration) -> Self {
        self.config.alerts.evaluation_interval = interval;
        self
    }

    /// Replace the alert rules
    pub fn rules(mut self, rules: Vec<AlertRule>) -> Self {
        self.config.alerts.rules = rules;
        self
    }

    /// Add a TCP health probe
    pub fn probe(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.config.health.probes.push(ProbeConfig {
            name: name.into(),
            address: address.into(),
        });
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
