//! Feature cost table.
//!
//! Every AI-backed operation is billed under a feature key. The table maps
//! each key to its credit price, the operation type recorded in the audit
//! trail, and the model capability that serves it. It is static and pure.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credit_transaction::CreditOperationType;
use crate::credits::Credits;
use crate::model_catalog::{is_free_tier_model, ModelCapability};

/// Price of a full script generation.
pub const SCRIPT_GENERATION_PRICE: Credits = Credits::whole(2);
/// Price of rewriting one scene.
pub const SCENE_REGENERATION_PRICE: Credits = Credits::from_hundredths(50);
/// Price of one scene image.
pub const IMAGE_GENERATION_PRICE: Credits = Credits::whole(2);
/// Price of one scene video clip.
pub const VIDEO_GENERATION_PRICE: Credits = Credits::whole(5);

/// Billable feature key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKey {
    ScriptGeneration,
    SceneRegeneration,
    ImageGeneration,
    VideoGeneration,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown feature key: {0}")]
pub struct UnknownFeature(pub String);

impl FeatureKey {
    pub const ALL: &'static [FeatureKey] = &[
        FeatureKey::ScriptGeneration,
        FeatureKey::SceneRegeneration,
        FeatureKey::ImageGeneration,
        FeatureKey::VideoGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKey::ScriptGeneration => "script_generation",
            FeatureKey::SceneRegeneration => "scene_regeneration",
            FeatureKey::ImageGeneration => "image_generation",
            FeatureKey::VideoGeneration => "video_generation",
        }
    }

    /// List price for one unit of this feature.
    pub fn price(&self) -> Credits {
        match self {
            FeatureKey::ScriptGeneration => SCRIPT_GENERATION_PRICE,
            FeatureKey::SceneRegeneration => SCENE_REGENERATION_PRICE,
            FeatureKey::ImageGeneration => IMAGE_GENERATION_PRICE,
            FeatureKey::VideoGeneration => VIDEO_GENERATION_PRICE,
        }
    }

    /// Unit price once the serving model is known.
    ///
    /// Script generation on a free-tier text model costs nothing.
    pub fn price_for_model(&self, model_id: &str) -> Credits {
        match self {
            FeatureKey::ScriptGeneration if is_free_tier_model(model_id) => Credits::ZERO,
            _ => self.price(),
        }
    }

    pub fn operation_type(&self) -> CreditOperationType {
        match self {
            FeatureKey::ScriptGeneration => CreditOperationType::ScriptGeneration,
            FeatureKey::SceneRegeneration => CreditOperationType::SceneRegeneration,
            FeatureKey::ImageGeneration => CreditOperationType::ImageGeneration,
            FeatureKey::VideoGeneration => CreditOperationType::VideoGeneration,
        }
    }

    /// Model capability required to serve this feature.
    pub fn capability(&self) -> ModelCapability {
        match self {
            FeatureKey::ScriptGeneration | FeatureKey::SceneRegeneration => ModelCapability::Text,
            FeatureKey::ImageGeneration => ModelCapability::Image,
            FeatureKey::VideoGeneration => ModelCapability::Video,
        }
    }

    /// Model used when no admin override is configured.
    pub fn baseline_model(&self) -> &'static str {
        match self {
            FeatureKey::ScriptGeneration | FeatureKey::SceneRegeneration => {
                "google/gemini-2.5-flash"
            }
            FeatureKey::ImageGeneration => "fal-ai/flux/schnell",
            FeatureKey::VideoGeneration => "fal-ai/kling-video/v2.1/standard/image-to-video",
        }
    }
}

impl FromStr for FeatureKey {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_table() {
        assert_eq!(FeatureKey::ScriptGeneration.price(), Credits::whole(2));
        assert_eq!(FeatureKey::SceneRegeneration.price(), Credits::from_hundredths(50));
        assert_eq!(FeatureKey::ImageGeneration.price().times(3), Credits::whole(6));
        assert_eq!(FeatureKey::VideoGeneration.price().times(2), Credits::whole(10));
    }

    #[test]
    fn test_free_model_script_is_free() {
        let key = FeatureKey::ScriptGeneration;
        assert_eq!(key.price_for_model("deepseek/deepseek-r1:free"), Credits::ZERO);
        assert_eq!(key.price_for_model("google/gemini-2.5-flash"), Credits::whole(2));
        // Only whole-script generation gets the free-tier discount.
        assert_eq!(
            FeatureKey::SceneRegeneration.price_for_model("deepseek/deepseek-r1:free"),
            Credits::from_hundredths(50)
        );
    }

    #[test]
    fn test_parse_round_trip_all_keys() {
        for key in FeatureKey::ALL {
            assert_eq!(key.as_str().parse::<FeatureKey>().unwrap(), *key);
        }
        assert!("thumbnail_generation".parse::<FeatureKey>().is_err());
    }

    #[test]
    fn test_operation_type_matches_key() {
        for key in FeatureKey::ALL {
            assert_eq!(key.operation_type().as_str(), key.as_str());
        }
    }
}
