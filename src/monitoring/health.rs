//! Health checks of external collaborators (database, cache, ...).

use crate::core::{ProbeConfig, Result, VigilError};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// A reachability check of one collaborator
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Name reported in the health payload
    fn name(&self) -> &str;

    /// Succeeds when the collaborator is reachable
    async fn check(&self) -> Result<()>;
}

/// Probe that succeeds when `address` accepts a TCP connection
#[derive(Debug, Clone)]
pub struct TcpProbe {
    name: String,
    address: String,
}

impl TcpProbe {
    /// Create a probe for `host:port`
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl From<&ProbeConfig> for TcpProbe {
    fn from(config: &ProbeConfig) -> Self {
        Self::new(config.name.clone(), config.address.clone())
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<()> {
        TcpStream::connect(&self.address)
            .await
            .map(|_| ())
            .map_err(|e| VigilError::probe(&self.name, format!("{}: {}", self.address, e)))
    }
}

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    pub error: Option<String>,
}

impl ServiceStatus {
    fn healthy() -> Self {
        Self {
            status: "healthy",
            error: None,
        }
    }

    fn unhealthy(error: String) -> Self {
        Self {
            status: "unhealthy",
            error: Some(error),
        }
    }

    /// Whether the probe passed
    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of every probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub services: BTreeMap<String, ServiceStatus>,
}

impl HealthReport {
    /// True when every probe passed (and trivially when there are none)
    pub fn is_healthy(&self) -> bool {
        self.services.values().all(ServiceStatus::is_healthy)
    }
}

/// Run all probes concurrently, each bounded by `timeout`
pub async fn run_probes(probes: &[Arc<dyn HealthProbe>], timeout: Duration) -> HealthReport {
    let checks = probes.iter().map(|probe| async move {
        let outcome = match tokio::time::timeout(timeout, probe.check()).await {
            Ok(Ok(())) => ServiceStatus::healthy(),
            Ok(Err(e)) => ServiceStatus::unhealthy(e.to_string()),
            Err(_) => ServiceStatus::unhealthy(
                VigilError::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }
                .to_string(),
            ),
        };
        if !outcome.is_healthy() {
            tracing::warn!(probe = probe.name(), "Health probe failed: {:?}", outcome.error);
        }
        (probe.name().to_string(), outcome)
    });

    HealthReport {
        services: join_all(checks).await.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    struct Stalled;

    #[async_trait]
    impl HealthProbe for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn check(&self) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tcp_probe_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let probe = TcpProbe::new("database", address);
        assert!(probe.check().await.is_ok());
    }

    #[tokio::test]
    async fn test_tcp_probe_reports_refusal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let probes: Vec<Arc<dyn HealthProbe>> = vec![Arc::new(TcpProbe::new("cache", address))];
        let report = run_probes(&probes, Duration::from_secs(2)).await;
        assert!(!report.is_healthy());
        assert_eq!(report.services["cache"].status, "unhealthy");
    }

    #[tokio::test]
    async fn test_slow_probe_times_out() {
        let probes: Vec<Arc<dyn HealthProbe>> = vec![Arc::new(Stalled)];
        let report = run_probes(&probes, Duration::from_millis(20)).await;
        let status = &report.services["stalled"];
        assert!(status.error.as_deref().unwrap().contains("20ms"));
    }

    #[tokio::test]
    async fn test_no_probes_is_healthy() {
        let report = run_probes(&[], Duration::from_secs(1)).await;
        assert!(report.is_healthy());
        assert!(report.services.is_empty());
    }
}
