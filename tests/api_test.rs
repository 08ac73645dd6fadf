//! HTTP surface tests driven through the router without binding a port.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::fake_sampler;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceExt;
use vigil_lib::api::{router, ActorId, RESPONSE_TIME_HEADER};
use vigil_lib::core::{Config, ConfigBuilder};
use vigil_lib::requests::REQUESTS_TOTAL;
use vigil_lib::Application;

fn app_with(config: Config) -> Application {
    let (_, sampler) = fake_sampler();
    Application::with_sampler(config, sampler).unwrap()
}

async fn get(app: &Application, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router(app.api_state())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app_with(Config::default());
    let (status, headers, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["timestamp"].is_string());

    let elapsed = headers[RESPONSE_TIME_HEADER].to_str().unwrap();
    assert!(elapsed.ends_with('s'));
    assert_eq!(elapsed.split('.').nth(1).map(str::len), Some(4));
}

#[tokio::test]
async fn test_requests_are_instrumented() {
    let app = app_with(Config::default());
    get(&app, "/health").await;
    get(&app, "/health").await;
    get(&app, "/does-not-exist").await;

    let registry = app.registry();
    assert_eq!(
        registry.counter(
            REQUESTS_TOTAL,
            &[("method", "GET"), ("endpoint", "/health"), ("status", "200")]
        ),
        Some(2)
    );
    assert_eq!(
        registry.counter(
            REQUESTS_TOTAL,
            &[("method", "GET"), ("endpoint", "unknown"), ("status", "404")]
        ),
        Some(1)
    );
    assert_eq!(app.requests().len(), 3);
}

#[tokio::test]
async fn test_actor_extension_is_recorded() {
    let app = app_with(Config::default());
    let request = Request::builder()
        .uri("/health")
        .extension(ActorId("user-42".to_string()))
        .body(Body::empty())
        .unwrap();
    router(app.api_state()).oneshot(request).await.unwrap();

    let recent = app.requests().recent_requests(1);
    assert_eq!(recent[0].actor_id.as_deref(), Some("user-42"));
}

#[tokio::test]
async fn test_metrics_text() {
    let app = app_with(Config::default());
    app.registry().increment_counter("jobs_processed", 3, &[("queue", "emails")]);
    app.registry().set_gauge("queue_depth", 12.5, &[]);

    let (status, headers, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers["content-type"].to_str().unwrap().starts_with("text/plain"));

    let text = String::from_utf8(body).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec!["jobs_processed[queue=emails] 3", "queue_depth 12.5"]);
}

#[tokio::test]
async fn test_detailed_health_reports_failed_probe() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let up = listener.local_addr().unwrap().to_string();
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let down = closed.local_addr().unwrap().to_string();
    drop(closed);

    let config = ConfigBuilder::new()
        .probe("database", up)
        .probe("cache", down)
        .build()
        .unwrap();
    let app = app_with(config);

    let (status, _, body) = get(&app, "/health/detailed").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let body = json(&body);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["database"]["status"], "healthy");
    assert_eq!(body["services"]["cache"]["status"], "unhealthy");
    assert_eq!(body["system"]["cpu"]["count"], 8);
    assert_eq!(body["performance"]["requests_per_hour"], 0);
}

#[tokio::test]
async fn test_detailed_health_without_probes() {
    let app = app_with(Config::default());
    let (status, _, body) = get(&app, "/health/detailed").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "healthy");
}

#[tokio::test]
async fn test_alerts_endpoint_evaluates_first() {
    let (host, sampler) = fake_sampler();
    let app = Application::with_sampler(Config::default(), sampler).unwrap();
    host.lock().memory_percent = 92.0;

    let (status, _, body) = get(&app, "/alerts").await;
    assert_eq!(status, StatusCode::OK);

    let body = json(&body);
    let active = body["active_alerts"].as_array().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], "high_memory");
    assert_eq!(active[0]["count"], 1);
    assert_eq!(active[0]["state"], "firing");
    assert!(body["alert_history"].as_array().unwrap().is_empty());

    host.lock().memory_percent = 40.0;
    let (_, _, body) = get(&app, "/alerts").await;
    let body = json(&body);
    assert!(body["active_alerts"].as_array().unwrap().is_empty());
    assert_eq!(body["alert_history"][0]["id"], "high_memory");
}

#[tokio::test]
async fn test_endpoint_stats() {
    let app = app_with(Config::default());
    get(&app, "/health").await;
    get(&app, "/metrics").await;

    let (status, _, body) = get(&app, "/metrics/endpoints").await;
    assert_eq!(status, StatusCode::OK);

    let body = json(&body);
    let mut endpoints: Vec<&str> = body["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["endpoint"].as_str().unwrap())
        .collect();
    endpoints.sort_unstable();
    assert_eq!(endpoints, vec!["/health", "/metrics"]);
}
