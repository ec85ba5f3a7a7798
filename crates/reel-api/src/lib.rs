//! Axum HTTP API server.
//!
//! This crate provides:
//! - Routes for every pipeline operation on shorts and scenes
//! - Firebase ID token verification
//! - Credit balance and history, admin model configuration
//! - Rate limiting, security headers and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use reel_models::Credits;
    use reel_pipeline::adapters::{FalClient, FalConfig, OpenRouterClient, OpenRouterConfig};
    use reel_pipeline::{Adapters, CreditLedger, MemoryStore, ModelResolver, Pipeline};

    use crate::auth::{AuthUser, JwksCache, SUPERADMIN_ROLE};
    use crate::config::ApiConfig;
    use crate::state::AppState;

    /// State over an in-memory store with unconfigured providers.
    pub fn memory_state(initial_balance: Credits) -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new().with_initial_balance(initial_balance));
        let openrouter = Arc::new(OpenRouterClient::new(OpenRouterConfig::default()).unwrap());
        let fal = Arc::new(FalClient::new(FalConfig::default()).unwrap());

        let resolver = ModelResolver::new(store.clone())
            .with_catalog(openrouter.clone())
            .with_catalog(fal.clone());
        let adapters = Adapters {
            script: openrouter.clone(),
            scene_writer: openrouter,
            image: fal.clone(),
            video: fal,
        };
        let pipeline = Pipeline::new(
            store.clone(),
            CreditLedger::new(store.clone()),
            Arc::new(resolver),
            adapters,
        );

        let state = AppState::from_parts(
            ApiConfig::default(),
            pipeline,
            JwksCache::new("").unwrap(),
            None,
        );
        (state, store)
    }

    pub fn user(uid: &str) -> AuthUser {
        AuthUser {
            uid: uid.to_string(),
            email: None,
            email_verified: false,
            role: None,
        }
    }

    pub fn admin(uid: &str) -> AuthUser {
        AuthUser {
            role: Some(SUPERADMIN_ROLE.to_string()),
            ..user(uid)
        }
    }
}
