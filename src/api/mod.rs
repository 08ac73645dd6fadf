//! HTTP surface.
//!
//! Five read-only endpoints:
//! - `GET /metrics`: flat text exposition of counters and gauges
//! - `GET /metrics/endpoints`: cumulative per-endpoint request statistics
//! - `GET /health`: liveness
//! - `GET /health/detailed`: collaborator probes plus system and performance
//! - `GET /alerts`: evaluates the rules, then lists active and resolved alerts
//!
//! Every request, including unmatched ones, passes through the
//! instrumentation middleware.

mod middleware;

pub use middleware::{instrument_requests, ActorId, RESPONSE_TIME_HEADER};

use crate::alerts::{Alert, AlertEvaluator};
use crate::core::{Config, Result, VigilError};
use crate::metrics::MetricRegistry;
use crate::monitoring::{run_probes, HealthProbe, ResourceSampler, ServiceStatus, SystemSample};
use crate::requests::{EndpointStats, PerformanceSummary, RequestInstrumentation};
use crate::snapshot::render_text;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address to bind
    pub bind_address: IpAddr,
    /// Port to listen on (default: 9100)
    pub port: u16,
    /// Enable CORS headers
    pub enable_cors: bool,
    /// Timeout for each health probe
    pub probe_timeout: Duration,
    /// Resolved alerts returned by `/alerts`
    pub history_limit: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ApiConfig {
    fn from(config: &Config) -> Self {
        Self {
            bind_address: config.server.bind_address,
            port: config.server.port,
            enable_cors: config.server.enable_cors,
            probe_timeout: config.health.probe_timeout,
            history_limit: config.alerts.history_limit,
        }
    }
}

/// Shared handles behind every handler.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<MetricRegistry>,
    pub requests: Arc<RequestInstrumentation>,
    pub sampler: Arc<ResourceSampler>,
    pub evaluator: Arc<AlertEvaluator>,
    pub probes: Arc<[Arc<dyn HealthProbe>]>,
    pub config: ApiConfig,
}

/// Liveness response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    version: &'static str,
}

/// Detailed health response.
#[derive(Debug, Serialize)]
struct DetailedHealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    services: BTreeMap<String, ServiceStatus>,
    system: SystemSample,
    performance: PerformanceSummary,
}

/// Alert listing response.
#[derive(Debug, Serialize)]
struct AlertsResponse {
    active_alerts: Vec<Alert>,
    alert_history: Vec<Alert>,
    timestamp: DateTime<Utc>,
}

/// Endpoint statistics response.
#[derive(Debug, Serialize)]
struct EndpointsResponse {
    endpoints: Vec<EndpointStats>,
    timestamp: DateTime<Utc>,
}

/// Build the router with instrumentation, tracing and optional CORS.
pub fn router(state: ApiState) -> Router {
    let enable_cors = state.config.enable_cors;

    let mut app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/metrics/endpoints", get(endpoints_handler))
        .route("/health", get(health_handler))
        .route("/health/detailed", get(detailed_health_handler))
        .route("/alerts", get(alerts_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            instrument_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Start the API server and serve until the task is dropped.
pub async fn start_server(state: ApiState) -> Result<()> {
    let addr = SocketAddr::new(state.config.bind_address, state.config.port);
    let app = router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| VigilError::network(format!("Failed to bind to {}: {}", addr, e)))?;
    tracing::info!("Starting API server on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// GET /metrics - counters then gauges as text
async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        render_text(&state.registry.snapshot()),
    )
}

/// GET /metrics/endpoints
async fn endpoints_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(EndpointsResponse {
        endpoints: state.requests.endpoint_stats(),
        timestamp: Utc::now(),
    })
}

/// GET /health - always healthy while the process serves
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /health/detailed - 503 when any probe fails
async fn detailed_health_handler(
    State(state): State<ApiState>,
) -> std::result::Result<Response, HttpError> {
    let report = run_probes(&state.probes, state.config.probe_timeout).await;

    let sampler = Arc::clone(&state.sampler);
    let system = tokio::task::spawn_blocking(move || sampler.sample())
        .await
        .map_err(VigilError::from)?;

    let healthy = report.is_healthy();
    let (status, code) = if healthy {
        ("healthy", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    let body = DetailedHealthResponse {
        status,
        timestamp: Utc::now(),
        services: report.services,
        system,
        performance: state.requests.current_summary(),
    };
    Ok((code, Json(body)).into_response())
}

/// GET /alerts - runs one evaluation first
async fn alerts_handler(
    State(state): State<ApiState>,
) -> std::result::Result<Json<AlertsResponse>, HttpError> {
    state.evaluator.tick_blocking().await?;

    Ok(Json(AlertsResponse {
        active_alerts: state.evaluator.active_alerts(),
        alert_history: state.evaluator.alert_history(state.config.history_limit),
        timestamp: Utc::now(),
    }))
}

/// HTTP-specific error type.
#[derive(Debug)]
pub enum HttpError {
    Internal(String),
}

impl From<VigilError> for HttpError {
    fn from(err: VigilError) -> Self {
        tracing::error!(category = err.category(), "Request failed: {}", err);
        HttpError::Internal(err.to_string())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            HttpError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::Internal(msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}
