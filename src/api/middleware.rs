//! Request instrumentation middleware.

use super::ApiState;
use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Response header carrying the handling time, e.g. `0.012s`
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";

/// Route label used when no route matched
const UNKNOWN_ENDPOINT: &str = "unknown";

/// Caller identity, attached as a request extension by an upstream
/// authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorId(pub String);

/// Record every completed request and stamp its handling time
pub async fn instrument_requests(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| UNKNOWN_ENDPOINT.to_string(), |p| p.as_str().to_string());
    let actor = req.extensions().get::<ActorId>().map(|a| a.0.clone());

    let mut response = next.run(req).await;
    let elapsed = start.elapsed();

    state.requests.record_request(
        &endpoint,
        &method,
        response.status().as_u16(),
        elapsed,
        actor.as_deref(),
    );

    if let Ok(value) = HeaderValue::from_str(&format!("{:.3}s", elapsed.as_secs_f64())) {
        response.headers_mut().insert(RESPONSE_TIME_HEADER, value);
    }
    response
}
