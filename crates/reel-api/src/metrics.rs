//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle to render it.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "reel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "reel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "reel_http_requests_in_flight";
    pub const RATE_LIMIT_HITS_TOTAL: &str = "reel_rate_limit_hits_total";
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_rate_limit_hit(path: &str) {
    let labels = [("path", sanitize_path(path))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Replace ids with placeholders so label cardinality stays bounded.
///
/// Any segment following `shorts` or `scenes` is an id, as is the provider
/// name under the admin catalog route.
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut previous = "";
    for segment in path.split('/') {
        let normalized = match previous {
            "shorts" => ":short_id",
            "scenes" if segment != "order" => ":scene_id",
            "providers" => ":provider",
            _ => segment,
        };
        out.push(normalized);
        previous = segment;
    }
    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/shorts/3f2a9c/scenes/77b1/regenerate"),
            "/api/shorts/:short_id/scenes/:scene_id/regenerate"
        );
        assert_eq!(
            sanitize_path("/api/shorts/3f2a9c/scenes/order"),
            "/api/shorts/:short_id/scenes/order"
        );
        assert_eq!(
            sanitize_path("/api/admin/models/providers/fal"),
            "/api/admin/models/providers/:provider"
        );
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
