//! Application state.

use std::sync::Arc;

use anyhow::Context;
use reel_firestore::FirestoreClient;
use reel_pipeline::adapters::{FalClient, OpenRouterClient};
use reel_pipeline::store::{CreditStore, ModelConfigStore, ShortStore};
use reel_pipeline::{
    Adapters, CreditLedger, FirestoreStore, MemoryStore, ModelResolver, Pipeline, PipelineConfig,
    StoreBackend,
};
use tracing::{info, warn};

use crate::auth::JwksCache;
use crate::config::ApiConfig;

struct Stores {
    shorts: Arc<dyn ShortStore>,
    credits: Arc<dyn CreditStore>,
    settings: Arc<dyn ModelConfigStore>,
    firestore: Option<Arc<FirestoreClient>>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<Pipeline>,
    pub jwks: Arc<JwksCache>,
    /// Present when the Firestore backend is in use; probed by `/ready`.
    pub firestore: Option<Arc<FirestoreClient>>,
}

impl AppState {
    /// Build the pipeline and its backends from the environment.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let pipeline_config = PipelineConfig::from_env();

        let stores = match pipeline_config.store_backend {
            StoreBackend::Firestore => {
                let client = FirestoreClient::from_env()
                    .await
                    .context("Failed to create Firestore client")?;
                let store = Arc::new(FirestoreStore::new(client.clone()));
                Stores {
                    shorts: store.clone(),
                    credits: store.clone(),
                    settings: store,
                    firestore: Some(Arc::new(client)),
                }
            }
            StoreBackend::Memory => {
                warn!("Using in-memory store; data is lost on restart");
                let store = Arc::new(MemoryStore::new());
                Stores {
                    shorts: store.clone(),
                    credits: store.clone(),
                    settings: store,
                    firestore: None,
                }
            }
        };

        let openrouter = Arc::new(OpenRouterClient::from_env()?);
        let fal = Arc::new(FalClient::from_env()?);

        let resolver = ModelResolver::new(stores.settings)
            .with_ttls(pipeline_config.defaults_ttl, pipeline_config.catalog_ttl)
            .with_catalog(openrouter.clone())
            .with_catalog(fal.clone());

        let adapters = Adapters {
            script: openrouter.clone(),
            scene_writer: openrouter,
            image: fal.clone(),
            video: fal,
        };

        let pipeline = Pipeline::new(
            stores.shorts,
            CreditLedger::new(stores.credits),
            Arc::new(resolver),
            adapters,
        );

        let jwks = JwksCache::new(config.firebase_project_id.clone())?;
        if config.firebase_project_id.is_empty() {
            warn!("FIREBASE_PROJECT_ID not set; every authenticated route will return 401");
        } else {
            match jwks.refresh_keys().await {
                Ok(count) => info!("Loaded {} JWKS keys", count),
                Err(e) => warn!("Initial JWKS fetch failed, will retry on demand: {}", e),
            }
        }

        Ok(Self::from_parts(config, pipeline, jwks, stores.firestore))
    }

    pub fn from_parts(
        config: ApiConfig,
        pipeline: Pipeline,
        jwks: JwksCache,
        firestore: Option<Arc<FirestoreClient>>,
    ) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
            jwks: Arc::new(jwks),
            firestore,
        }
    }
}
