//! Model resolver.
//!
//! Decides which model serves each feature: an admin override from the
//! settings store when one exists, otherwise the feature's baseline. Both the
//! overrides and the upstream provider catalogs are served from TTL caches.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reel_models::{FeatureKey, ModelCapability, ModelInfo, ModelProvider};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::adapters::ModelCatalog;
use crate::error::{PipelineError, PipelineResult};
use crate::store::ModelConfigStore;

struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

impl<T> Cached<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// The model serving one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultModel {
    pub feature: FeatureKey,
    pub model_id: String,
    pub baseline_model_id: String,
    /// An admin override is in effect.
    pub is_override: bool,
}

pub struct ModelResolver {
    store: Arc<dyn ModelConfigStore>,
    catalogs: HashMap<ModelProvider, Arc<dyn ModelCatalog>>,
    defaults_ttl: Duration,
    catalog_ttl: Duration,
    defaults: RwLock<Option<Cached<BTreeMap<FeatureKey, String>>>>,
    models: RwLock<HashMap<ModelProvider, Cached<Vec<ModelInfo>>>>,
}

impl ModelResolver {
    pub fn new(store: Arc<dyn ModelConfigStore>) -> Self {
        Self {
            store,
            catalogs: HashMap::new(),
            defaults_ttl: Duration::from_secs(300),
            catalog_ttl: Duration::from_secs(3600),
            defaults: RwLock::new(None),
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Register the catalog for its provider, replacing any earlier one.
    pub fn with_catalog(mut self, catalog: Arc<dyn ModelCatalog>) -> Self {
        self.catalogs.insert(catalog.provider(), catalog);
        self
    }

    pub fn with_ttls(mut self, defaults_ttl: Duration, catalog_ttl: Duration) -> Self {
        self.defaults_ttl = defaults_ttl;
        self.catalog_ttl = catalog_ttl;
        self
    }

    // =========================================================================
    // Default models
    // =========================================================================

    /// Model id for `feature`.
    ///
    /// Never fails: if the settings store is unreachable the baseline is
    /// used and a warning logged.
    pub async fn get_default_model(&self, feature: FeatureKey) -> String {
        match self.overrides().await {
            Ok(overrides) => overrides
                .get(&feature)
                .cloned()
                .unwrap_or_else(|| feature.baseline_model().to_string()),
            Err(e) => {
                warn!(
                    feature = %feature,
                    error = %e,
                    "Failed to load default models, using baseline"
                );
                feature.baseline_model().to_string()
            }
        }
    }

    /// Resolved model for every feature.
    pub async fn get_default_models(&self) -> PipelineResult<Vec<DefaultModel>> {
        let overrides = self.overrides().await?;
        Ok(FeatureKey::ALL
            .iter()
            .map(|feature| {
                let baseline = feature.baseline_model().to_string();
                match overrides.get(feature) {
                    Some(model) => DefaultModel {
                        feature: *feature,
                        model_id: model.clone(),
                        baseline_model_id: baseline,
                        is_override: true,
                    },
                    None => DefaultModel {
                        feature: *feature,
                        model_id: baseline.clone(),
                        baseline_model_id: baseline,
                        is_override: false,
                    },
                }
            })
            .collect())
    }

    /// Validate and store admin overrides keyed by feature name.
    ///
    /// Nothing is written unless every key is a known feature and every
    /// model id is non-empty.
    pub async fn save_default_models(&self, models: &BTreeMap<String, String>) -> PipelineResult<()> {
        if models.is_empty() {
            return Err(PipelineError::validation("No default models supplied"));
        }

        let mut parsed = BTreeMap::new();
        for (key, model) in models {
            let feature: FeatureKey = key
                .parse()
                .map_err(|e| PipelineError::validation(format!("{}", e)))?;
            let model = model.trim();
            if model.is_empty() {
                return Err(PipelineError::validation(format!(
                    "Model id for '{}' must not be empty",
                    key
                )));
            }
            parsed.insert(feature, model.to_string());
        }

        self.store.save_default_models(&parsed).await?;
        self.invalidate_defaults().await;
        info!(count = parsed.len(), "Default models updated");
        Ok(())
    }

    pub async fn invalidate_defaults(&self) {
        *self.defaults.write().await = None;
    }

    async fn overrides(&self) -> PipelineResult<BTreeMap<FeatureKey, String>> {
        if let Some(cached) = self.defaults.read().await.as_ref() {
            if cached.is_fresh(self.defaults_ttl) {
                return Ok(cached.value.clone());
            }
        }

        let loaded = self.store.load_default_models().await?;
        debug!(count = loaded.len(), "Loaded default model overrides");
        *self.defaults.write().await = Some(Cached::new(loaded.clone()));
        Ok(loaded)
    }

    // =========================================================================
    // Provider catalogs
    // =========================================================================

    /// Models offered by `provider`, optionally restricted to `capability`.
    ///
    /// The full list is cached per provider; the capability filter is
    /// applied afterwards. `force_refresh` bypasses and repopulates the cache.
    pub async fn get_models_from_provider(
        &self,
        provider: ModelProvider,
        force_refresh: bool,
        capability: Option<ModelCapability>,
    ) -> PipelineResult<Vec<ModelInfo>> {
        let models = self.catalog_models(provider, force_refresh).await?;
        Ok(match capability {
            Some(cap) => models.into_iter().filter(|m| m.supports(cap)).collect(),
            None => models,
        })
    }

    async fn catalog_models(
        &self,
        provider: ModelProvider,
        force_refresh: bool,
    ) -> PipelineResult<Vec<ModelInfo>> {
        if !force_refresh {
            if let Some(cached) = self.models.read().await.get(&provider) {
                if cached.is_fresh(self.catalog_ttl) {
                    return Ok(cached.value.clone());
                }
            }
        }

        let catalog = self.catalogs.get(&provider).ok_or_else(|| {
            PipelineError::validation(format!("No model catalog configured for {}", provider))
        })?;
        let models = catalog.list_models().await?;
        info!(
            provider = %provider,
            count = models.len(),
            refreshed = force_refresh,
            "Fetched provider model catalog"
        );

        self.models
            .write()
            .await
            .insert(provider, Cached::new(models.clone()));
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterError, MockModelCatalog};
    use crate::error::ErrorKind;
    use crate::store::{MemoryStore, MockModelConfigStore, StoreError};

    fn model(id: &str, capability: ModelCapability) -> ModelInfo {
        ModelInfo {
            id: id.into(),
            name: id.into(),
            provider: ModelProvider::Fal,
            capabilities: vec![capability],
            description: None,
            context_length: None,
        }
    }

    fn fal_catalog(times: usize) -> MockModelCatalog {
        let mut catalog = MockModelCatalog::new();
        catalog.expect_provider().return_const(ModelProvider::Fal);
        catalog.expect_list_models().times(times).returning(|| {
            Ok(vec![
                model("fal-ai/flux/schnell", ModelCapability::Image),
                model("fal-ai/kling-video", ModelCapability::Video),
            ])
        });
        catalog
    }

    #[tokio::test]
    async fn test_baseline_without_override() {
        let resolver = ModelResolver::new(Arc::new(MemoryStore::new()));
        assert_eq!(
            resolver.get_default_model(FeatureKey::ImageGeneration).await,
            "fal-ai/flux/schnell"
        );
    }

    #[tokio::test]
    async fn test_save_then_read_override() {
        let resolver = ModelResolver::new(Arc::new(MemoryStore::new()));
        // Prime the cache so the save has something to invalidate.
        resolver.get_default_model(FeatureKey::ScriptGeneration).await;

        let mut models = BTreeMap::new();
        models.insert("script_generation".to_string(), " openai/gpt-4o-mini ".to_string());
        resolver.save_default_models(&models).await.unwrap();

        assert_eq!(
            resolver.get_default_model(FeatureKey::ScriptGeneration).await,
            "openai/gpt-4o-mini"
        );
        let all = resolver.get_default_models().await.unwrap();
        assert_eq!(all.len(), FeatureKey::ALL.len());
        let script = all
            .iter()
            .find(|d| d.feature == FeatureKey::ScriptGeneration)
            .unwrap();
        assert!(script.is_override);
        assert!(!all
            .iter()
            .find(|d| d.feature == FeatureKey::VideoGeneration)
            .unwrap()
            .is_override);
    }

    #[tokio::test]
    async fn test_unknown_feature_rejects_whole_batch() {
        let mut store = MockModelConfigStore::new();
        store.expect_save_default_models().times(0);
        let resolver = ModelResolver::new(Arc::new(store));

        let mut models = BTreeMap::new();
        models.insert("image_generation".to_string(), "fal-ai/flux/dev".to_string());
        models.insert("upscale".to_string(), "x".to_string());

        let err = resolver.save_default_models(&models).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_empty_model_id_rejected() {
        let resolver = ModelResolver::new(Arc::new(MemoryStore::new()));
        let mut models = BTreeMap::new();
        models.insert("video_generation".to_string(), "   ".to_string());
        assert!(resolver.save_default_models(&models).await.is_err());
    }

    #[tokio::test]
    async fn test_store_failure_falls_back_to_baseline() {
        let mut store = MockModelConfigStore::new();
        store
            .expect_load_default_models()
            .returning(|| Err(StoreError::Backend("unavailable".into())));
        let resolver = ModelResolver::new(Arc::new(store));

        assert_eq!(
            resolver.get_default_model(FeatureKey::SceneRegeneration).await,
            "google/gemini-2.5-flash"
        );
    }

    #[tokio::test]
    async fn test_overrides_are_cached_until_ttl() {
        let mut store = MockModelConfigStore::new();
        store
            .expect_load_default_models()
            .times(1)
            .returning(|| Ok(BTreeMap::new()));
        let resolver = ModelResolver::new(Arc::new(store));

        for _ in 0..3 {
            resolver.get_default_model(FeatureKey::ImageGeneration).await;
        }
    }

    #[tokio::test]
    async fn test_expired_overrides_are_reloaded() {
        let mut store = MockModelConfigStore::new();
        store
            .expect_load_default_models()
            .times(2)
            .returning(|| Ok(BTreeMap::new()));
        let resolver = ModelResolver::new(Arc::new(store))
            .with_ttls(Duration::ZERO, Duration::from_secs(3600));

        resolver.get_default_model(FeatureKey::ImageGeneration).await;
        resolver.get_default_model(FeatureKey::ImageGeneration).await;
    }

    #[tokio::test]
    async fn test_catalog_cache_and_capability_filter() {
        let resolver = ModelResolver::new(Arc::new(MemoryStore::new()))
            .with_catalog(Arc::new(fal_catalog(1)));

        let all = resolver
            .get_models_from_provider(ModelProvider::Fal, false, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let video = resolver
            .get_models_from_provider(ModelProvider::Fal, false, Some(ModelCapability::Video))
            .await
            .unwrap();
        assert_eq!(video.len(), 1);
        assert_eq!(video[0].id, "fal-ai/kling-video");
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let resolver = ModelResolver::new(Arc::new(MemoryStore::new()))
            .with_catalog(Arc::new(fal_catalog(2)));

        resolver
            .get_models_from_provider(ModelProvider::Fal, false, None)
            .await
            .unwrap();
        resolver
            .get_models_from_provider(ModelProvider::Fal, true, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_catalog_failure_is_adapter_failure() {
        let mut catalog = MockModelCatalog::new();
        catalog.expect_provider().return_const(ModelProvider::OpenRouter);
        catalog
            .expect_list_models()
            .returning(|| Err(AdapterError::provider("upstream down")));
        let resolver =
            ModelResolver::new(Arc::new(MemoryStore::new())).with_catalog(Arc::new(catalog));

        let err = resolver
            .get_models_from_provider(ModelProvider::OpenRouter, false, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterFailure);

        let err = resolver
            .get_models_from_provider(ModelProvider::Fal, false, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
