//! API routes.

use axum::middleware;
use axum::routing::{get, patch, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::admin::{get_default_models, get_provider_models, put_default_models};
use crate::handlers::credits::{get_balance, get_credit_history};
use crate::handlers::scenes::{
    add_scene, regenerate_scene, regenerate_scene_image, remove_scene, reorder_scenes,
    update_scene,
};
use crate::handlers::shorts::{
    approve_script, complete, create_short, generate_media, generate_videos, get_short, publish,
    regenerate_script,
};
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    ClientRateLimiter,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let short_routes = Router::new()
        .route("/shorts", post(create_short))
        .route("/shorts/:short_id", get(get_short))
        .route("/shorts/:short_id/script/regenerate", post(regenerate_script))
        .route("/shorts/:short_id/script/approve", post(approve_script))
        // Billed per scene; partial failure returns a report
        .route("/shorts/:short_id/media", post(generate_media))
        .route("/shorts/:short_id/videos", post(generate_videos))
        .route("/shorts/:short_id/publish", post(publish))
        .route("/shorts/:short_id/complete", post(complete));

    let scene_routes = Router::new()
        .route("/shorts/:short_id/scenes", post(add_scene))
        .route("/shorts/:short_id/scenes/order", put(reorder_scenes))
        .route(
            "/shorts/:short_id/scenes/:scene_id/regenerate",
            post(regenerate_scene),
        )
        .route("/scenes/:scene_id", patch(update_scene).delete(remove_scene))
        .route(
            "/scenes/:scene_id/image/regenerate",
            post(regenerate_scene_image),
        );

    let credit_routes = Router::new()
        .route("/credits", get(get_balance))
        .route("/credits/history", get(get_credit_history));

    // Superadmin only; enforced by the AdminUser extractor
    let admin_routes = Router::new()
        .route(
            "/admin/models/defaults",
            get(get_default_models).put(put_default_models),
        )
        .route(
            "/admin/models/providers/:provider",
            get(get_provider_models),
        );

    let rate_limiter =
        ClientRateLimiter::new(state.config.rate_limit_rps, state.config.rate_limit_burst);

    let api_routes = Router::new()
        .merge(short_routes)
        .merge(scene_routes)
        .merge(credit_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use reel_models::Credits;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_is_public() {
        let (state, _store) = memory_state(Credits::ZERO);
        let app = create_router(state, None);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_api_requires_bearer_token() {
        let (state, _store) = memory_state(Credits::ZERO);
        let app = create_router(state, None);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/credits")
                    .header("x-forwarded-for", "203.0.113.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_metrics_route_absent_when_disabled() {
        let (state, _store) = memory_state(Credits::ZERO);
        let app = create_router(state, None);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
