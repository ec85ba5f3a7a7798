//! AI model catalog types.
//!
//! Upstream providers expose model lists that the admin surface browses when
//! choosing which model serves a feature.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Upstream model catalog provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// OpenRouter (text models)
    OpenRouter,
    /// fal.ai (image and video models)
    Fal,
}

impl ModelProvider {
    pub const ALL: &'static [ModelProvider] = &[ModelProvider::OpenRouter, ModelProvider::Fal];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProvider::OpenRouter => "openrouter",
            ModelProvider::Fal => "fal",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openrouter" => Some(ModelProvider::OpenRouter),
            "fal" => Some(ModelProvider::Fal),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a model can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ModelCapability {
    Text,
    Image,
    Video,
}

impl ModelCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelCapability::Text => "text",
            ModelCapability::Image => "image",
            ModelCapability::Video => "video",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(ModelCapability::Text),
            "image" => Some(ModelCapability::Image),
            "video" => Some(ModelCapability::Video),
            _ => None,
        }
    }
}

/// A model listed by an upstream catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelInfo {
    /// Provider-scoped model id (e.g. "google/gemini-2.5-flash")
    pub id: String,
    /// Display name
    pub name: String,
    pub provider: ModelProvider,
    #[serde(default)]
    pub capabilities: Vec<ModelCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,
}

impl ModelInfo {
    pub fn supports(&self, capability: ModelCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Whether a model id refers to a free-tier text model.
///
/// OpenRouter marks zero-cost variants with a `:free` suffix.
pub fn is_free_tier_model(model_id: &str) -> bool {
    model_id.ends_with(":free")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(ModelProvider::from_str("OpenRouter"), Some(ModelProvider::OpenRouter));
        assert_eq!(ModelProvider::from_str("fal"), Some(ModelProvider::Fal));
        assert_eq!(ModelProvider::from_str("replicate"), None);
    }

    #[test]
    fn test_free_tier_detection() {
        assert!(is_free_tier_model("meta-llama/llama-3.3-70b-instruct:free"));
        assert!(!is_free_tier_model("google/gemini-2.5-flash"));
    }
}
