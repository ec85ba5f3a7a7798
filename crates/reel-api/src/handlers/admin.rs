//! Admin handlers for default model configuration and provider catalogs.
//!
//! Every route here requires the superadmin role.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use reel_models::{ModelCapability, ModelInfo, ModelProvider};
use reel_pipeline::DefaultModel;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AdminUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DefaultModelsResponse {
    pub models: Vec<DefaultModel>,
}

/// Feature name -> model id overrides.
#[derive(Debug, Deserialize)]
pub struct UpdateDefaultModelsRequest {
    pub models: BTreeMap<String, String>,
}

pub async fn get_default_models(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<DefaultModelsResponse>> {
    let models = state.pipeline.resolver().get_default_models().await?;
    Ok(Json(DefaultModelsResponse { models }))
}

pub async fn put_default_models(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(request): Json<UpdateDefaultModelsRequest>,
) -> ApiResult<Json<DefaultModelsResponse>> {
    let resolver = state.pipeline.resolver();
    resolver.save_default_models(&request.models).await?;
    info!(
        admin = %admin.uid,
        features = ?request.models.keys().collect::<Vec<_>>(),
        "Default models changed"
    );

    let models = resolver.get_default_models().await?;
    Ok(Json(DefaultModelsResponse { models }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderModelsQuery {
    /// Bypass the catalog cache.
    #[serde(default)]
    pub refresh: bool,
    /// One of: text, image, video.
    pub capability: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProviderModelsResponse {
    pub provider: ModelProvider,
    pub models: Vec<ModelInfo>,
}

pub async fn get_provider_models(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(provider): Path<String>,
    Query(query): Query<ProviderModelsQuery>,
) -> ApiResult<Json<ProviderModelsResponse>> {
    let provider = ModelProvider::from_str(&provider).ok_or_else(|| {
        ApiError::bad_request(format!(
            "Unknown provider '{}'. Must be one of: openrouter, fal",
            provider
        ))
    })?;
    let capability = match query.capability.as_deref() {
        Some(raw) => Some(ModelCapability::from_str(raw).ok_or_else(|| {
            ApiError::bad_request(format!(
                "Invalid capability '{}'. Must be one of: text, image, video",
                raw
            ))
        })?),
        None => None,
    };

    let models = state
        .pipeline
        .resolver()
        .get_models_from_provider(provider, query.refresh, capability)
        .await?;
    Ok(Json(ProviderModelsResponse { provider, models }))
}
