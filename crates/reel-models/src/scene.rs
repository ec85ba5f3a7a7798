//! Scene models.
//!
//! Scenes live in a flat `users/{uid}/scenes` collection keyed by scene id,
//! with `short_id` and `order` fields linking them to their parent.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::short::ShortId;

pub const MIN_SCENE_DURATION_SECS: u32 = 1;
pub const MAX_SCENE_DURATION_SECS: u32 = 30;
pub const DEFAULT_SCENE_DURATION_SECS: u32 = 5;

/// Unique identifier for a scene.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SceneId(pub String);

impl SceneId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SceneId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SceneId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SceneId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One scene of a short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    pub id: SceneId,
    pub short_id: ShortId,
    pub user_id: String,

    /// Zero-based position within the short
    pub order: u32,

    #[serde(default)]
    pub narration: String,

    #[serde(default)]
    pub visual_description: String,

    /// Prompt sent to the image model
    #[serde(default)]
    pub visual_prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    pub duration_secs: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scene {
    /// Build a scene from a draft. The order is assigned by the caller's
    /// re-indexing pass.
    pub fn from_draft(
        short_id: &ShortId,
        user_id: impl Into<String>,
        order: u32,
        draft: &SceneDraft,
    ) -> Self {
        let now = Utc::now();
        let visual_prompt = draft
            .visual_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| draft.visual_description.clone());
        Self {
            id: SceneId::new(),
            short_id: short_id.clone(),
            user_id: user_id.into(),
            order,
            narration: draft.narration.clone(),
            visual_description: draft.visual_description.clone(),
            visual_prompt,
            negative_prompt: draft.negative_prompt.clone(),
            image_url: None,
            video_url: None,
            duration_secs: clamp_duration(draft.duration_secs),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    pub fn has_video(&self) -> bool {
        self.video_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Replace the written content with a regenerated draft, keeping
    /// identity, order and media.
    pub fn apply_rewrite(&mut self, draft: &SceneDraft) {
        self.narration = draft.narration.clone();
        self.visual_description = draft.visual_description.clone();
        self.visual_prompt = draft
            .visual_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| draft.visual_description.clone());
        if draft.negative_prompt.is_some() {
            self.negative_prompt = draft.negative_prompt.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// Clamp an AI-supplied duration into the allowed range.
pub fn clamp_duration(secs: u32) -> u32 {
    secs.clamp(MIN_SCENE_DURATION_SECS, MAX_SCENE_DURATION_SECS)
}

fn default_duration() -> u32 {
    DEFAULT_SCENE_DURATION_SECS
}

/// Scene content before it has an id or position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SceneDraft {
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub narration: String,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub visual_description: String,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub visual_prompt: Option<String>,

    #[serde(default)]
    #[validate(length(max = 1000))]
    pub negative_prompt: Option<String>,

    #[serde(default = "default_duration")]
    #[validate(range(min = 1, max = 30))]
    pub duration_secs: u32,
}

/// Direct edit of a scene's content. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ScenePatch {
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub narration: Option<String>,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub visual_description: Option<String>,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub visual_prompt: Option<String>,

    #[serde(default)]
    #[validate(range(min = 1, max = 30))]
    pub duration_secs: Option<u32>,
}

impl ScenePatch {
    pub fn is_empty(&self) -> bool {
        self.narration.is_none()
            && self.visual_description.is_none()
            && self.visual_prompt.is_none()
            && self.duration_secs.is_none()
    }

    pub fn apply(&self, scene: &mut Scene) {
        if let Some(narration) = &self.narration {
            scene.narration = narration.clone();
        }
        if let Some(desc) = &self.visual_description {
            scene.visual_description = desc.clone();
        }
        if let Some(prompt) = &self.visual_prompt {
            scene.visual_prompt = prompt.clone();
        }
        if let Some(duration) = self.duration_secs {
            scene.duration_secs = duration;
        }
        scene.updated_at = Utc::now();
    }
}

/// Input for inserting a scene.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct AddSceneInput {
    /// Insert position, `0..=scene_count`
    pub order: u32,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub narration: Option<String>,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub visual_description: Option<String>,

    #[serde(default = "default_duration")]
    #[validate(range(min = 1, max = 30))]
    pub duration_secs: u32,

    /// Write the scene text with the text model (billed as a scene regeneration)
    #[serde(default)]
    pub generate_with_ai: bool,

    #[serde(default)]
    #[validate(length(max = 1000))]
    pub ai_instructions: Option<String>,
}

/// Input for replacing one scene's image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, Validate)]
pub struct RegenerateImageInput {
    #[serde(default)]
    #[validate(length(min = 1, max = 2000))]
    pub new_prompt: Option<String>,

    #[serde(default)]
    #[validate(length(max = 1000))]
    pub new_negative_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(narration: &str) -> SceneDraft {
        SceneDraft {
            narration: narration.to_string(),
            visual_description: "rain on neon signs".to_string(),
            visual_prompt: None,
            negative_prompt: None,
            duration_secs: 45,
        }
    }

    #[test]
    fn test_from_draft_defaults_prompt_and_clamps_duration() {
        let scene = Scene::from_draft(&ShortId::from("s1"), "u1", 2, &draft("hello"));
        assert_eq!(scene.order, 2);
        assert_eq!(scene.visual_prompt, "rain on neon signs");
        assert_eq!(scene.duration_secs, MAX_SCENE_DURATION_SECS);
        assert!(!scene.has_image());
    }

    #[test]
    fn test_patch_applies_only_present_fields() {
        let mut scene = Scene::from_draft(&ShortId::from("s1"), "u1", 0, &draft("before"));
        let patch = ScenePatch {
            narration: Some("after".into()),
            duration_secs: Some(8),
            ..Default::default()
        };
        patch.apply(&mut scene);
        assert_eq!(scene.narration, "after");
        assert_eq!(scene.duration_secs, 8);
        assert_eq!(scene.visual_description, "rain on neon signs");
    }

    #[test]
    fn test_patch_rejects_out_of_range_duration() {
        let patch = ScenePatch {
            duration_secs: Some(31),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
        let patch = ScenePatch {
            duration_secs: Some(0),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_rewrite_keeps_media() {
        let mut scene = Scene::from_draft(&ShortId::from("s1"), "u1", 0, &draft("a"));
        scene.image_url = Some("https://cdn/img.png".into());
        scene.apply_rewrite(&draft("b"));
        assert_eq!(scene.narration, "b");
        assert!(scene.has_image());
    }
}
