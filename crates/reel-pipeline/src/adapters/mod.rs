//! Generation adapters.
//!
//! Each trait wraps one kind of external AI call and returns a normalized
//! result. The orchestrator only sees these traits; the HTTP providers
//! live in the submodules.

pub mod fal;
pub mod openrouter;

use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use reel_models::{ModelInfo, ModelProvider, SceneDraft};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::metrics::record_adapter_call;

pub use fal::{FalClient, FalConfig};
pub use openrouter::{OpenRouterClient, OpenRouterConfig};

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Coarse classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    Timeout,
    /// The provider refused the input (content policy, bad prompt).
    Rejected,
    Provider,
    InvalidResponse,
    NotConfigured,
}

impl AdapterErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterErrorKind::Timeout => "timeout",
            AdapterErrorKind::Rejected => "rejected",
            AdapterErrorKind::Provider => "provider",
            AdapterErrorKind::InvalidResponse => "invalid_response",
            AdapterErrorKind::NotConfigured => "not_configured",
        }
    }
}

impl fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failed generation call.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind} error: {message}")]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Timeout, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Rejected, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Provider, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::InvalidResponse, message)
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::NotConfigured, message)
    }

    /// Classify a non-success HTTP response.
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        let message = format!("{} returned {}: {}", provider, status, truncate(body, 300));
        match status {
            400 | 422 => Self::rejected(message),
            408 | 504 => Self::timeout(message),
            _ => Self::provider(message),
        }
    }

    fn from_transport(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(format!("{} request timed out: {}", provider, err))
        } else if err.is_decode() {
            Self::invalid_response(format!("{} response could not be decoded: {}", provider, err))
        } else {
            Self::provider(format!("{} request failed: {}", provider, err))
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Premise handed to the script generator.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRequest {
    pub title: String,
    pub theme: String,
    pub synopsis: Option<String>,
    pub style_id: Option<String>,
    pub tone_id: Option<String>,
    pub target_duration_secs: u32,
}

/// A generated script.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedScript {
    pub synopsis: Option<String>,
    pub scenes: Vec<SceneDraft>,
}

/// Input for writing one scene against the surrounding script.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRequest {
    pub title: String,
    pub theme: String,
    pub synopsis: Option<String>,
    /// Narration of every scene in order, without the one being written.
    pub neighbours: Vec<String>,
    /// Zero-based position the scene occupies.
    pub position: u32,
    /// Current content when rewriting an existing scene.
    pub current: Option<SceneDraft>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub image_url: String,
    pub prompt: String,
    pub duration_secs: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedVideo {
    pub url: String,
}

/// Writes a full script for a short.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate_script(
        &self,
        model_id: &str,
        request: &ScriptRequest,
    ) -> AdapterResult<GeneratedScript>;
}

/// Writes or rewrites a single scene.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SceneWriter: Send + Sync {
    async fn write_scene(&self, model_id: &str, request: &SceneRequest)
        -> AdapterResult<SceneDraft>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(
        &self,
        model_id: &str,
        request: &ImageRequest,
    ) -> AdapterResult<GeneratedImage>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    async fn generate_video(
        &self,
        model_id: &str,
        request: &VideoRequest,
    ) -> AdapterResult<GeneratedVideo>;
}

/// Lists the models an upstream provider offers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    fn provider(&self) -> ModelProvider;

    async fn list_models(&self) -> AdapterResult<Vec<ModelInfo>>;
}

/// Send a provider request and decode its JSON body, recording metrics.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    operation: &str,
    request: reqwest::RequestBuilder,
) -> AdapterResult<T> {
    let start = Instant::now();
    let result = send_inner(provider, request).await;
    let elapsed = start.elapsed().as_secs_f64();

    match &result {
        Ok(_) => record_adapter_call(provider, operation, "success", elapsed),
        Err(e) => {
            warn!(
                provider = provider,
                operation = operation,
                kind = %e.kind,
                error = %e.message,
                "Provider call failed"
            );
            record_adapter_call(provider, operation, e.kind.as_str(), elapsed);
        }
    }
    result
}

async fn send_inner<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> AdapterResult<T> {
    let response = request
        .send()
        .await
        .map_err(|e| AdapterError::from_transport(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AdapterError::from_status(provider, status.as_u16(), &body));
    }

    response
        .json()
        .await
        .map_err(|e| AdapterError::from_transport(provider, e))
}

/// Strip a surrounding markdown code fence from model output.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            AdapterError::from_status("fal", 422, "nsfw").kind,
            AdapterErrorKind::Rejected
        );
        assert_eq!(
            AdapterError::from_status("fal", 504, "").kind,
            AdapterErrorKind::Timeout
        );
        assert_eq!(
            AdapterError::from_status("openrouter", 503, "busy").kind,
            AdapterErrorKind::Provider
        );
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let err = AdapterError::from_status("fal", 500, &body);
        assert!(err.message.len() < 400);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }
}
