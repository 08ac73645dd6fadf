//! Main application entry point for Vigil.

use crate::alerts::{
    shutdown_delivery, spawn_delivery, Alert, AlertEvaluator, LogDelivery, NotificationSink,
    QueuedSink,
};
use crate::api::{self, ApiConfig, ApiState};
use crate::core::{Config, Result};
use crate::metrics::MetricRegistry;
use crate::monitoring::{HealthProbe, ResourceSampler, TcpProbe};
use crate::requests::RequestInstrumentation;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long queued notifications get to drain on shutdown
const DELIVERY_GRACE: Duration = Duration::from_secs(5);

/// Coordinates every Vigil component.
pub struct Application {
    registry: Arc<MetricRegistry>,
    requests: Arc<RequestInstrumentation>,
    sampler: Arc<ResourceSampler>,
    evaluator: Arc<AlertEvaluator>,
    probes: Arc<[Arc<dyn HealthProbe>]>,
    /// Sending side of the notification queue, closed on shutdown
    sink: Arc<QueuedSink>,
    /// Receiving end of the notification queue, drained once running
    alert_queue: mpsc::Receiver<Alert>,
    config: Config,
}

impl Application {
    /// Create an Application sampling the host through `sysinfo`.
    pub fn new(config: Config) -> Result<Self> {
        let sampler = ResourceSampler::with_sysinfo(
            config.system.disk_path.clone(),
            config.system.cpu_sample_interval,
        );
        Self::with_sampler(config, sampler)
    }

    /// Create an Application with a custom resource sampler.
    pub fn with_sampler(config: Config, sampler: ResourceSampler) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(MetricRegistry::new(config.metrics.histogram_capacity));
        let requests = Arc::new(
            RequestInstrumentation::new(Arc::clone(&registry), config.requests.ring_capacity)
                .with_summary_window(config.requests.summary_window)
                .with_slowest_limit(config.requests.slowest_limit),
        );
        let sampler = Arc::new(sampler);

        let (sink, alert_queue) = QueuedSink::new(config.alerts.notification_queue);
        let sink = Arc::new(sink);
        let evaluator = Arc::new(
            AlertEvaluator::new(
                Arc::clone(&registry),
                Arc::clone(&requests),
                Arc::clone(&sampler),
                Arc::clone(&sink) as Arc<dyn NotificationSink>,
                config.alerts.rules.clone(),
            )
            .with_history_capacity(config.alerts.history_capacity)
            .with_rule_budget(config.alerts.rule_budget),
        );

        let probes: Arc<[Arc<dyn HealthProbe>]> = config
            .health
            .probes
            .iter()
            .map(|p| Arc::new(TcpProbe::from(p)) as Arc<dyn HealthProbe>)
            .collect();

        Ok(Self {
            registry,
            requests,
            sampler,
            evaluator,
            probes,
            sink,
            alert_queue,
            config,
        })
    }

    /// Handles for the HTTP surface.
    pub fn api_state(&self) -> ApiState {
        ApiState {
            registry: Arc::clone(&self.registry),
            requests: Arc::clone(&self.requests),
            sampler: Arc::clone(&self.sampler),
            evaluator: Arc::clone(&self.evaluator),
            probes: Arc::clone(&self.probes),
            config: ApiConfig::from(&self.config),
        }
    }

    /// Run the evaluator schedule and the HTTP server until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            "Starting Vigil with {} alert rules, evaluating every {:?}",
            self.evaluator.rules().len(),
            self.config.alerts.evaluation_interval
        );

        let state = self.api_state();
        let delivery_handle = spawn_delivery(self.alert_queue, Arc::new(LogDelivery));
        let evaluator_handle = self.evaluator.start(self.config.alerts.evaluation_interval);

        let shutdown = tokio::signal::ctrl_c();
        let result = tokio::select! {
            result = api::start_server(state) => {
                if let Err(e) = &result {
                    tracing::error!("API server error: {}", e);
                }
                result
            }
            _ = shutdown => {
                tracing::info!("Received shutdown signal, stopping...");
                Ok(())
            }
        };

        evaluator_handle.abort();
        if shutdown_delivery(&self.sink, delivery_handle, DELIVERY_GRACE).await {
            tracing::debug!("Queued alerts delivered");
        }
        result
    }

    /// Get a reference to the metric registry.
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Get a reference to the request instrumentation.
    pub fn requests(&self) -> &Arc<RequestInstrumentation> {
        &self.requests
    }

    /// Get a reference to the alert evaluator.
    pub fn evaluator(&self) -> &Arc<AlertEvaluator> {
        &self.evaluator
    }
}
