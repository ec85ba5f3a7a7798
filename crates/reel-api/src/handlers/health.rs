//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub store: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: Option<u64>) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }
}

/// Readiness probe.
///
/// With the Firestore backend a sentinel document read must succeed (a
/// missing document still proves connectivity). The in-memory backend is
/// always ready.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let store = match &state.firestore {
        Some(firestore) => {
            let start = Instant::now();
            match firestore.get_document("_health", "_check").await {
                Ok(_) => CheckStatus::ok(Some(start.elapsed().as_millis() as u64)),
                Err(e) => CheckStatus::error(e.to_string()),
            }
        }
        None => CheckStatus::ok(None),
    };

    let all_ok = store.status == "ok";
    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks { store },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_state;
    use reel_models::Credits;

    #[tokio::test]
    async fn test_memory_backend_is_ready() {
        let (state, _store) = memory_state(Credits::ZERO);
        let Json(response) = ready(State(state)).await.ok().unwrap();
        assert_eq!(response.status, "ready");
        assert!(response.checks.store.latency_ms.is_none());
    }
}
