//! Short models and the generation status machine.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::scene::SceneDraft;

/// Unique identifier for a short.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ShortId(pub String);

impl ShortId {
    /// Generate a new random short ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ShortId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ShortId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ShortId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a short.
///
/// Writes are gated by [`ShortStatus::allowed_transitions`]; nothing else
/// decides which moves are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShortStatus {
    #[default]
    Draft,
    GeneratingScript,
    ScriptReady,
    ScriptApproved,
    GeneratingImages,
    ImagesReady,
    GeneratingVideo,
    VideoReady,
    Published,
    Completed,
    Failed,
}

/// A status move the transition table does not list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move short from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ShortStatus,
    pub to: ShortStatus,
}

impl ShortStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShortStatus::Draft => "DRAFT",
            ShortStatus::GeneratingScript => "GENERATING_SCRIPT",
            ShortStatus::ScriptReady => "SCRIPT_READY",
            ShortStatus::ScriptApproved => "SCRIPT_APPROVED",
            ShortStatus::GeneratingImages => "GENERATING_IMAGES",
            ShortStatus::ImagesReady => "IMAGES_READY",
            ShortStatus::GeneratingVideo => "GENERATING_VIDEO",
            ShortStatus::VideoReady => "VIDEO_READY",
            ShortStatus::Published => "PUBLISHED",
            ShortStatus::Completed => "COMPLETED",
            ShortStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        use ShortStatus::*;
        [
            Draft,
            GeneratingScript,
            ScriptReady,
            ScriptApproved,
            GeneratingImages,
            ImagesReady,
            GeneratingVideo,
            VideoReady,
            Published,
            Completed,
            Failed,
        ]
        .into_iter()
        .find(|status| status.as_str() == s)
    }

    /// Statuses reachable in one step.
    pub fn allowed_transitions(&self) -> &'static [ShortStatus] {
        use ShortStatus::*;
        match self {
            Draft => &[GeneratingScript, ScriptReady],
            GeneratingScript => &[ScriptReady, Failed],
            ScriptReady => &[ScriptApproved, GeneratingScript],
            ScriptApproved => &[GeneratingImages, GeneratingScript],
            GeneratingImages => &[ImagesReady, Failed],
            ImagesReady => &[GeneratingImages, GeneratingVideo, GeneratingScript, Published],
            GeneratingVideo => &[VideoReady, Failed],
            VideoReady => &[GeneratingImages, GeneratingVideo, GeneratingScript, Published],
            Published => &[Completed],
            Completed => &[],
            Failed => &[GeneratingScript, GeneratingImages, GeneratingVideo],
        }
    }

    pub fn can_transition_to(&self, next: ShortStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Check a single-step move.
    pub fn transition(self, next: ShortStatus) -> Result<ShortStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }

    /// Check a two-step move whose intermediate status is never persisted.
    ///
    /// Script regeneration goes `current -> GENERATING_SCRIPT -> SCRIPT_READY`
    /// but only commits the final status, so a failed call leaves the short
    /// where it was.
    pub fn transition_via(
        self,
        via: ShortStatus,
        next: ShortStatus,
    ) -> Result<ShortStatus, InvalidTransition> {
        self.transition(via)?;
        via.transition(next)
    }

    /// The script was approved and the short has not gone back for a new one.
    pub fn has_approved_script(&self) -> bool {
        matches!(
            self,
            ShortStatus::ScriptApproved
                | ShortStatus::GeneratingImages
                | ShortStatus::ImagesReady
                | ShortStatus::GeneratingVideo
                | ShortStatus::VideoReady
                | ShortStatus::Published
                | ShortStatus::Completed
        )
    }

    /// Scenes may still be edited.
    pub fn accepts_scene_edits(&self) -> bool {
        !matches!(self, ShortStatus::Published | ShortStatus::Completed)
    }
}

impl fmt::Display for ShortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A short stored in Firestore under `users/{uid}/shorts/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Short {
    pub id: ShortId,

    /// Owning user
    pub user_id: String,

    pub title: String,

    /// Premise the script is written from
    pub theme: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_id: Option<String>,

    /// Tone / climate reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_id: Option<String>,

    /// Text model chosen for script work; resolver default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    pub target_duration_secs: u32,

    #[serde(default)]
    pub status: ShortStatus,

    /// Bumped by every structural scene mutation
    #[serde(default)]
    pub revision: u64,

    #[serde(default)]
    pub scene_count: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Short {
    pub fn new(user_id: impl Into<String>, input: &CreateShortInput) -> Self {
        let now = Utc::now();
        Self {
            id: ShortId::new(),
            user_id: user_id.into(),
            title: input.title.clone(),
            theme: input.theme.clone(),
            synopsis: input.synopsis.clone(),
            style_id: input.style_id.clone(),
            tone_id: input.tone_id.clone(),
            model_id: input.model_id.clone(),
            target_duration_secs: input.target_duration_secs,
            status: ShortStatus::Draft,
            revision: 0,
            scene_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a short.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct CreateShortInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(min = 1, max = 4000))]
    pub theme: String,

    #[serde(default)]
    #[validate(length(max = 4000))]
    pub synopsis: Option<String>,

    #[serde(default)]
    pub style_id: Option<String>,

    #[serde(default)]
    pub tone_id: Option<String>,

    #[serde(default)]
    #[validate(length(min = 1, max = 200))]
    pub model_id: Option<String>,

    #[validate(range(min = 5, max = 600))]
    pub target_duration_secs: u32,

    /// When present the short starts in `SCRIPT_READY` with these scenes.
    #[serde(default)]
    #[validate(nested)]
    pub scenes: Option<Vec<SceneDraft>>,
}
