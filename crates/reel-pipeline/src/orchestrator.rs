//! Pipeline orchestrator.
//!
//! This module handles:
//! - The short lifecycle, with every status write checked against the
//!   transition table
//! - Scene creation, editing, reordering and removal
//! - Credit settlement around every billable generation call
//!
//! Billable work always goes through [`Pipeline::run_charged`]: validate,
//! deduct, run, and refund if anything after the deduction fails.

use std::future::Future;
use std::sync::Arc;

use reel_models::{
    AddSceneInput, ChargeContext, CreateShortInput, Credits, FeatureKey, RegenerateImageInput,
    Scene, SceneDraft, SceneId, ScenePatch, Short, ShortId, ShortStatus,
};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use validator::Validate;

use crate::adapters::{
    ImageGenerator, ImageRequest, SceneRequest, SceneWriter, ScriptGenerator, ScriptRequest,
    VideoGenerator, VideoRequest,
};
use crate::error::{ErrorKind, PipelineError, PipelineResult};
use crate::ledger::{Charge, CreditLedger, REASON_GENERATION_FAILED, REASON_PERSIST_FAILED};
use crate::metrics::record_scene_media;
use crate::ordering::{insert_scene, remove_scene, reorder_scenes, replace_scenes};
use crate::resolver::ModelResolver;
use crate::store::{ShortStore, StatusChange};

// =============================================================================
// Types
// =============================================================================

/// The generation backends the pipeline calls.
#[derive(Clone)]
pub struct Adapters {
    pub script: Arc<dyn ScriptGenerator>,
    pub scene_writer: Arc<dyn SceneWriter>,
    pub image: Arc<dyn ImageGenerator>,
    pub video: Arc<dyn VideoGenerator>,
}

/// A short with its scenes in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortDetail {
    pub short: Short,
    pub scenes: Vec<Scene>,
}

/// A scene whose media could not be generated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneFailure {
    pub scene_id: SceneId,
    pub order: u32,
    pub code: ErrorKind,
    pub message: String,
}

/// Outcome of a media batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaReport {
    pub short: Short,
    pub scenes: Vec<Scene>,
    pub generated: u32,
    /// Scenes that already had the media and were not charged.
    pub skipped: u32,
    pub failures: Vec<SceneFailure>,
    pub credits_charged: Credits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    fn feature(&self) -> FeatureKey {
        match self {
            MediaKind::Image => FeatureKey::ImageGeneration,
            MediaKind::Video => FeatureKey::VideoGeneration,
        }
    }

    fn generating(&self) -> ShortStatus {
        match self {
            MediaKind::Image => ShortStatus::GeneratingImages,
            MediaKind::Video => ShortStatus::GeneratingVideo,
        }
    }

    fn ready(&self) -> ShortStatus {
        match self {
            MediaKind::Image => ShortStatus::ImagesReady,
            MediaKind::Video => ShortStatus::VideoReady,
        }
    }

    fn is_done(&self, scene: &Scene) -> bool {
        match self {
            MediaKind::Image => scene.has_image(),
            MediaKind::Video => scene.has_video(),
        }
    }

    /// Scene has what it needs for this kind of media.
    fn is_eligible(&self, scene: &Scene) -> bool {
        match self {
            MediaKind::Image => true,
            MediaKind::Video => scene.has_image(),
        }
    }

    /// Reason a pending scene cannot be rendered, checked before any charge.
    fn missing_input(&self, scene: &Scene) -> Option<&'static str> {
        match self {
            MediaKind::Image if scene.visual_prompt.trim().is_empty() => {
                Some("Scene has no visual prompt")
            }
            _ => None,
        }
    }

    /// Short already holds this kind of media for every scene.
    fn is_settled(&self, status: ShortStatus) -> bool {
        match self {
            MediaKind::Image => {
                matches!(status, ShortStatus::ImagesReady | ShortStatus::VideoReady)
            }
            MediaKind::Video => status == ShortStatus::VideoReady,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

pub struct Pipeline {
    shorts: Arc<dyn ShortStore>,
    ledger: CreditLedger,
    resolver: Arc<ModelResolver>,
    adapters: Adapters,
}

impl Pipeline {
    pub fn new(
        shorts: Arc<dyn ShortStore>,
        ledger: CreditLedger,
        resolver: Arc<ModelResolver>,
        adapters: Adapters,
    ) -> Self {
        Self {
            shorts,
            ledger,
            resolver,
            adapters,
        }
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    /// Run `work` under the credit protocol for `charge`.
    ///
    /// Zero-cost charges skip the ledger. Any error from `work` refunds the
    /// deduction before it is returned.
    pub async fn run_charged<T, F, Fut>(
        &self,
        user_id: &str,
        charge: &Charge,
        work: F,
    ) -> PipelineResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PipelineResult<T>>,
    {
        let span = info_span!(
            "charged_operation",
            user_id = %user_id,
            feature = %charge.feature,
            credits = %charge.cost()
        );

        async {
            if charge.cost().is_zero() {
                return work().await;
            }

            self.ledger.validate(user_id, charge).await?;
            self.ledger.deduct(user_id, charge).await?;

            match work().await {
                Ok(value) => Ok(value),
                Err(e) => {
                    let reason = match e {
                        PipelineError::AdapterFailure(_) => REASON_GENERATION_FAILED,
                        _ => REASON_PERSIST_FAILED,
                    };
                    // A failed refund is logged by the ledger; the original error wins.
                    let _ = self.ledger.refund(user_id, charge, reason).await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    // =========================================================================
    // Shorts
    // =========================================================================

    /// Create a short, in `SCRIPT_READY` when scenes are supplied.
    pub async fn create_short(
        &self,
        user_id: &str,
        input: CreateShortInput,
    ) -> PipelineResult<ShortDetail> {
        input.validate()?;

        let mut short = Short::new(user_id, &input);
        let drafts = input.scenes.unwrap_or_default();
        let scenes: Vec<Scene> = drafts
            .iter()
            .enumerate()
            .map(|(i, draft)| Scene::from_draft(&short.id, user_id, i as u32, draft))
            .collect();
        if !scenes.is_empty() {
            short.status = short.status.transition(ShortStatus::ScriptReady)?;
            short.scene_count = scenes.len() as u32;
        }

        self.shorts.create_short(&short, &scenes).await?;
        info!(
            user_id = user_id,
            short_id = %short.id,
            status = %short.status,
            scenes = scenes.len(),
            "Short created"
        );
        Ok(ShortDetail { short, scenes })
    }

    pub async fn get_short(&self, user_id: &str, short_id: &ShortId) -> PipelineResult<ShortDetail> {
        let short = self.load_short(user_id, short_id).await?;
        let scenes = self.shorts.list_scenes(user_id, short_id).await?;
        Ok(ShortDetail { short, scenes })
    }

    /// Approve the script.
    ///
    /// A short whose script is already approved, including one that has
    /// moved on to media or publishing, is returned unchanged.
    pub async fn approve_script(&self, user_id: &str, short_id: &ShortId) -> PipelineResult<Short> {
        let short = self.load_short(user_id, short_id).await?;
        if short.status.has_approved_script() {
            return Ok(short);
        }

        let next = short.status.transition(ShortStatus::ScriptApproved)?;
        if short.scene_count == 0 {
            return Err(PipelineError::validation("Cannot approve a script without scenes"));
        }

        let short = self
            .shorts
            .update_status(user_id, short_id, short.status, next)
            .await?;
        info!(user_id = user_id, short_id = %short_id, "Script approved");
        Ok(short)
    }

    /// Write a new script and replace every scene with it.
    ///
    /// The short only ever moves to `SCRIPT_READY`; if generation or the
    /// write fails, status and scenes are left as they were.
    pub async fn regenerate_script(
        &self,
        user_id: &str,
        short_id: &ShortId,
    ) -> PipelineResult<ShortDetail> {
        let short = self.load_short(user_id, short_id).await?;
        let next = short
            .status
            .transition_via(ShortStatus::GeneratingScript, ShortStatus::ScriptReady)?;
        let current = self.shorts.list_scenes(user_id, short_id).await?;

        let model = self.text_model(&short, FeatureKey::ScriptGeneration).await;
        let charge = Charge::new(FeatureKey::ScriptGeneration, 1)
            .with_model(model.as_str())
            .with_context(
                ChargeContext::new()
                    .with_short_id(short_id.as_str())
                    .with_details(&short.title),
            );

        let short_ref = &short;
        let current_ref = current.as_slice();
        let model_ref = model.as_str();
        let detail = self
            .run_charged(user_id, &charge, move || {
                self.write_script(short_ref, current_ref, model_ref, next)
            })
            .await?;

        info!(
            user_id = user_id,
            short_id = %short_id,
            model = %model,
            scenes = detail.scenes.len(),
            "Script regenerated"
        );
        Ok(detail)
    }

    async fn write_script(
        &self,
        short: &Short,
        current: &[Scene],
        model: &str,
        next: ShortStatus,
    ) -> PipelineResult<ShortDetail> {
        let request = ScriptRequest {
            title: short.title.clone(),
            theme: short.theme.clone(),
            synopsis: short.synopsis.clone(),
            style_id: short.style_id.clone(),
            tone_id: short.tone_id.clone(),
            target_duration_secs: short.target_duration_secs,
        };
        let script = self.adapters.script.generate_script(model, &request).await?;

        let fresh = script
            .scenes
            .iter()
            .map(|draft| Scene::from_draft(&short.id, &short.user_id, 0, draft))
            .collect();
        let mut layout = replace_scenes(current, fresh);
        layout.changes.status = Some(StatusChange {
            from: short.status,
            to: next,
        });
        layout.changes.synopsis = script.synopsis;

        let updated = self
            .shorts
            .commit_scene_changes(&short.user_id, &short.id, short.revision, layout.changes)
            .await?;
        Ok(ShortDetail {
            short: updated,
            scenes: layout.scenes,
        })
    }

    /// Render an image for every scene that lacks one.
    pub async fn generate_media(
        &self,
        user_id: &str,
        short_id: &ShortId,
    ) -> PipelineResult<MediaReport> {
        self.run_media_batch(user_id, short_id, MediaKind::Image).await
    }

    /// Render a clip for every scene that has an image but no video.
    pub async fn generate_videos(
        &self,
        user_id: &str,
        short_id: &ShortId,
    ) -> PipelineResult<MediaReport> {
        self.run_media_batch(user_id, short_id, MediaKind::Video).await
    }

    async fn run_media_batch(
        &self,
        user_id: &str,
        short_id: &ShortId,
        kind: MediaKind,
    ) -> PipelineResult<MediaReport> {
        let short = self.load_short(user_id, short_id).await?;
        let scenes = self.shorts.list_scenes(user_id, short_id).await?;
        if scenes.is_empty() {
            return Err(PipelineError::validation("Short has no scenes"));
        }
        if kind == MediaKind::Video && scenes.iter().any(|s| !s.has_image()) {
            return Err(PipelineError::validation(
                "Every scene needs an image before videos can be generated",
            ));
        }

        let pending: Vec<Scene> = scenes
            .iter()
            .filter(|s| kind.is_eligible(s) && !kind.is_done(s))
            .cloned()
            .collect();
        let skipped = scenes.iter().filter(|s| kind.is_done(s)).count() as u32;

        if pending.is_empty() {
            if skipped == 0 {
                return Err(PipelineError::validation(format!(
                    "No scene is ready for {} generation",
                    kind.as_str()
                )));
            }
            if kind.is_settled(short.status) {
                return Ok(MediaReport {
                    short,
                    scenes,
                    generated: 0,
                    skipped,
                    failures: Vec::new(),
                    credits_charged: Credits::ZERO,
                });
            }
        }

        let generating = short.status.transition(kind.generating())?;
        let model = self.resolver.get_default_model(kind.feature()).await;
        if pending.iter().any(|s| kind.missing_input(s).is_none()) {
            self.ledger
                .validate(user_id, &Charge::new(kind.feature(), 1))
                .await?;
        }

        self.shorts
            .update_status(user_id, short_id, short.status, generating)
            .await?;
        info!(
            user_id = user_id,
            short_id = %short_id,
            media = kind.as_str(),
            pending = pending.len(),
            skipped = skipped,
            "Media batch started"
        );

        let mut generated = 0;
        let mut credits_charged = Credits::ZERO;
        let mut failures = Vec::new();
        let mut out_of_credits = false;

        for scene in pending {
            if let Some(reason) = kind.missing_input(&scene) {
                failures.push(SceneFailure {
                    scene_id: scene.id.clone(),
                    order: scene.order,
                    code: ErrorKind::Validation,
                    message: reason.to_string(),
                });
                continue;
            }
            if out_of_credits {
                failures.push(SceneFailure {
                    scene_id: scene.id.clone(),
                    order: scene.order,
                    code: ErrorKind::InsufficientCredits,
                    message: "Skipped after credits ran out".to_string(),
                });
                continue;
            }

            let scene_id = scene.id.clone();
            let order = scene.order;
            let charge = Charge::new(kind.feature(), 1).with_model(model.as_str()).with_context(
                ChargeContext::new()
                    .with_short_id(short_id.as_str())
                    .with_scene_id(scene_id.as_str())
                    .with_details(&scene.visual_prompt),
            );

            let model_ref = model.as_str();
            let result = self
                .run_charged(user_id, &charge, move || {
                    self.render_scene_media(kind, model_ref, scene)
                })
                .instrument(info_span!("scene_media", scene_id = %scene_id, media = kind.as_str()))
                .await;
            record_scene_media(kind.as_str(), result.is_ok());

            match result {
                Ok(_) => {
                    generated += 1;
                    credits_charged = credits_charged.saturating_add(charge.cost());
                }
                Err(e) => {
                    warn!(
                        user_id = user_id,
                        short_id = %short_id,
                        scene_id = %scene_id,
                        error = %e,
                        "Scene {} generation failed",
                        kind.as_str()
                    );
                    out_of_credits = matches!(e, PipelineError::InsufficientCredits { .. });
                    failures.push(SceneFailure {
                        scene_id,
                        order,
                        code: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let outcome = if failures.is_empty() {
            kind.ready()
        } else {
            ShortStatus::Failed
        };
        let short = match self
            .shorts
            .update_status(user_id, short_id, generating, outcome)
            .await
        {
            Ok(short) => short,
            Err(e) => {
                self.release_batch(user_id, short_id, generating).await;
                return Err(e.into());
            }
        };
        let scenes = self.shorts.list_scenes(user_id, short_id).await?;

        info!(
            user_id = user_id,
            short_id = %short_id,
            media = kind.as_str(),
            generated = generated,
            failed = failures.len(),
            credits = %credits_charged,
            status = %short.status,
            "Media batch finished"
        );
        Ok(MediaReport {
            short,
            scenes,
            generated,
            skipped,
            failures,
            credits_charged,
        })
    }

    /// Best-effort `GENERATING_* -> FAILED` after the batch outcome could not
    /// be written, so a retry can pick the short up again.
    async fn release_batch(&self, user_id: &str, short_id: &ShortId, generating: ShortStatus) {
        match self
            .shorts
            .update_status(user_id, short_id, generating, ShortStatus::Failed)
            .await
        {
            Ok(_) => warn!(
                user_id = user_id,
                short_id = %short_id,
                "Media batch outcome not saved, short marked failed"
            ),
            Err(e) => warn!(
                user_id = user_id,
                short_id = %short_id,
                status = %generating,
                error = %e,
                "Failed to release short after media batch"
            ),
        }
    }

    async fn render_scene_media(
        &self,
        kind: MediaKind,
        model: &str,
        mut scene: Scene,
    ) -> PipelineResult<Scene> {
        match kind {
            MediaKind::Image => {
                let request = ImageRequest {
                    prompt: scene.visual_prompt.clone(),
                    negative_prompt: scene.negative_prompt.clone(),
                };
                let image = self.adapters.image.generate_image(model, &request).await?;
                scene.image_url = Some(image.url);
            }
            MediaKind::Video => {
                let request = VideoRequest {
                    image_url: scene.image_url.clone().unwrap_or_default(),
                    prompt: scene.visual_prompt.clone(),
                    duration_secs: scene.duration_secs,
                };
                let video = self.adapters.video.generate_video(model, &request).await?;
                scene.video_url = Some(video.url);
            }
        }
        scene.updated_at = chrono::Utc::now();
        self.shorts.save_scene(&scene).await?;
        Ok(scene)
    }

    /// `IMAGES_READY | VIDEO_READY -> PUBLISHED`. Every scene needs an image.
    pub async fn publish(&self, user_id: &str, short_id: &ShortId) -> PipelineResult<Short> {
        self.advance(user_id, short_id, ShortStatus::Published).await
    }

    /// `PUBLISHED -> COMPLETED`.
    pub async fn complete(&self, user_id: &str, short_id: &ShortId) -> PipelineResult<Short> {
        self.advance(user_id, short_id, ShortStatus::Completed).await
    }

    async fn advance(
        &self,
        user_id: &str,
        short_id: &ShortId,
        next: ShortStatus,
    ) -> PipelineResult<Short> {
        let short = self.load_short(user_id, short_id).await?;
        let next = short.status.transition(next)?;
        if next == ShortStatus::Published {
            let scenes = self.shorts.list_scenes(user_id, short_id).await?;
            if let Some(scene) = scenes.iter().find(|s| !s.has_image()) {
                return Err(PipelineError::validation(format!(
                    "Scene {} has no image yet",
                    scene.order
                )));
            }
        }
        let short = self
            .shorts
            .update_status(user_id, short_id, short.status, next)
            .await?;
        info!(user_id = user_id, short_id = %short_id, status = %next, "Short status advanced");
        Ok(short)
    }

    // =========================================================================
    // Scenes
    // =========================================================================

    /// Rewrite one scene's text with the text model.
    pub async fn regenerate_scene(
        &self,
        user_id: &str,
        short_id: &ShortId,
        scene_id: &SceneId,
        instructions: Option<String>,
    ) -> PipelineResult<Scene> {
        let short = self.load_short(user_id, short_id).await?;
        ensure_editable(&short)?;
        let scenes = self.shorts.list_scenes(user_id, short_id).await?;
        let scene = scenes
            .iter()
            .find(|s| &s.id == scene_id)
            .cloned()
            .ok_or_else(|| PipelineError::not_found(format!("Scene {}", scene_id)))?;

        let model = self.text_model(&short, FeatureKey::SceneRegeneration).await;
        let charge = Charge::new(FeatureKey::SceneRegeneration, 1)
            .with_model(model.as_str())
            .with_context(
                ChargeContext::new()
                    .with_short_id(short_id.as_str())
                    .with_scene_id(scene_id.as_str())
                    .with_optional_details(instructions.as_deref()),
            );

        let request = scene_request(&short, &scenes, scene.order, Some(&scene), instructions);
        let model_ref = model.as_str();
        let request_ref = &request;
        let scene = self
            .run_charged(user_id, &charge, move || {
                self.rewrite_scene(model_ref, request_ref, scene)
            })
            .await?;

        info!(user_id = user_id, short_id = %short_id, scene_id = %scene_id, "Scene regenerated");
        Ok(scene)
    }

    async fn rewrite_scene(
        &self,
        model: &str,
        request: &SceneRequest,
        mut scene: Scene,
    ) -> PipelineResult<Scene> {
        let draft = self.adapters.scene_writer.write_scene(model, request).await?;
        scene.apply_rewrite(&draft);
        self.shorts.save_scene(&scene).await?;
        Ok(scene)
    }

    /// Replace one scene's image, optionally with new prompts.
    pub async fn regenerate_scene_image(
        &self,
        user_id: &str,
        scene_id: &SceneId,
        input: RegenerateImageInput,
    ) -> PipelineResult<Scene> {
        input.validate()?;
        let scene = self.load_scene(user_id, scene_id).await?;
        let short = self.load_short(user_id, &scene.short_id).await?;
        ensure_editable(&short)?;

        let mut candidate = scene;
        if let Some(prompt) = input.new_prompt {
            candidate.visual_prompt = prompt;
        }
        if let Some(negative) = input.new_negative_prompt {
            candidate.negative_prompt = Some(negative).filter(|n| !n.trim().is_empty());
        }
        if candidate.visual_prompt.trim().is_empty() {
            return Err(PipelineError::validation("Scene has no visual prompt"));
        }

        let model = self
            .resolver
            .get_default_model(FeatureKey::ImageGeneration)
            .await;
        let charge = Charge::new(FeatureKey::ImageGeneration, 1)
            .with_model(model.as_str())
            .with_context(
                ChargeContext::new()
                    .with_short_id(short.id.as_str())
                    .with_scene_id(scene_id.as_str())
                    .with_details(&candidate.visual_prompt),
            );

        let model_ref = model.as_str();
        let scene = self
            .run_charged(user_id, &charge, move || {
                self.render_scene_media(MediaKind::Image, model_ref, candidate)
            })
            .await?;

        info!(user_id = user_id, scene_id = %scene_id, "Scene image regenerated");
        Ok(scene)
    }

    /// Insert a scene at `input.order`, optionally written by the text model.
    pub async fn add_scene(
        &self,
        user_id: &str,
        short_id: &ShortId,
        input: AddSceneInput,
    ) -> PipelineResult<ShortDetail> {
        input.validate()?;
        let short = self.load_short(user_id, short_id).await?;
        ensure_editable(&short)?;
        let scenes = self.shorts.list_scenes(user_id, short_id).await?;
        if input.order as usize > scenes.len() {
            return Err(PipelineError::validation(format!(
                "Scene position {} is out of range 0..={}",
                input.order,
                scenes.len()
            )));
        }

        let detail = if input.generate_with_ai {
            let model = self.text_model(&short, FeatureKey::SceneRegeneration).await;
            let charge = Charge::new(FeatureKey::SceneRegeneration, 1)
                .with_model(model.as_str())
                .with_context(
                    ChargeContext::new()
                        .with_short_id(short_id.as_str())
                        .with_optional_details(input.ai_instructions.as_deref()),
                );
            let request = scene_request(
                &short,
                &scenes,
                input.order,
                None,
                input.ai_instructions.clone(),
            );

            let (short_ref, model_ref, request_ref, input_ref) =
                (&short, model.as_str(), &request, &input);
            self.run_charged(user_id, &charge, move || async move {
                let mut draft = self
                    .adapters
                    .scene_writer
                    .write_scene(model_ref, request_ref)
                    .await?;
                draft.duration_secs = input_ref.duration_secs;
                self.insert_and_commit(short_ref, scenes, input_ref.order, &draft)
                    .await
            })
            .await?
        } else {
            let draft = SceneDraft {
                narration: input.narration.clone().unwrap_or_default(),
                visual_description: input.visual_description.clone().unwrap_or_default(),
                visual_prompt: None,
                negative_prompt: None,
                duration_secs: input.duration_secs,
            };
            self.insert_and_commit(&short, scenes, input.order, &draft)
                .await?
        };

        info!(
            user_id = user_id,
            short_id = %short_id,
            order = input.order,
            ai = input.generate_with_ai,
            "Scene added"
        );
        Ok(detail)
    }

    async fn insert_and_commit(
        &self,
        short: &Short,
        scenes: Vec<Scene>,
        order: u32,
        draft: &SceneDraft,
    ) -> PipelineResult<ShortDetail> {
        let scene = Scene::from_draft(&short.id, &short.user_id, order, draft);
        let mut layout = insert_scene(scenes, order, scene)?;
        // A draft with its first scene has a script.
        if short.status == ShortStatus::Draft {
            layout.changes.status = Some(StatusChange {
                from: ShortStatus::Draft,
                to: ShortStatus::Draft.transition(ShortStatus::ScriptReady)?,
            });
        }

        let updated = self
            .shorts
            .commit_scene_changes(&short.user_id, &short.id, short.revision, layout.changes)
            .await?;
        Ok(ShortDetail {
            short: updated,
            scenes: layout.scenes,
        })
    }

    /// Direct edit of a scene's text or duration. Free.
    pub async fn update_scene(
        &self,
        user_id: &str,
        scene_id: &SceneId,
        patch: ScenePatch,
    ) -> PipelineResult<Scene> {
        patch.validate()?;
        if patch.is_empty() {
            return Err(PipelineError::validation("Nothing to update"));
        }

        let mut scene = self.load_scene(user_id, scene_id).await?;
        let short = self.load_short(user_id, &scene.short_id).await?;
        ensure_editable(&short)?;

        patch.apply(&mut scene);
        self.shorts.save_scene(&scene).await?;
        info!(user_id = user_id, scene_id = %scene_id, "Scene updated");
        Ok(scene)
    }

    /// Delete a scene and close the gap it leaves.
    pub async fn remove_scene(
        &self,
        user_id: &str,
        scene_id: &SceneId,
    ) -> PipelineResult<ShortDetail> {
        let scene = self.load_scene(user_id, scene_id).await?;
        let short = self.load_short(user_id, &scene.short_id).await?;
        ensure_editable(&short)?;
        let scenes = self.shorts.list_scenes(user_id, &short.id).await?;

        let layout = remove_scene(scenes, scene_id)?;
        let updated = self
            .shorts
            .commit_scene_changes(user_id, &short.id, short.revision, layout.changes)
            .await?;
        info!(
            user_id = user_id,
            short_id = %short.id,
            scene_id = %scene_id,
            remaining = layout.scenes.len(),
            "Scene removed"
        );
        Ok(ShortDetail {
            short: updated,
            scenes: layout.scenes,
        })
    }

    /// Reorder scenes to match `scene_ids`, which must list each scene once.
    pub async fn reorder_scenes(
        &self,
        user_id: &str,
        short_id: &ShortId,
        scene_ids: &[SceneId],
    ) -> PipelineResult<ShortDetail> {
        let short = self.load_short(user_id, short_id).await?;
        ensure_editable(&short)?;
        let scenes = self.shorts.list_scenes(user_id, short_id).await?;

        let layout = reorder_scenes(scenes, scene_ids)?;
        let updated = self
            .shorts
            .commit_scene_changes(user_id, short_id, short.revision, layout.changes)
            .await?;
        info!(user_id = user_id, short_id = %short_id, "Scenes reordered");
        Ok(ShortDetail {
            short: updated,
            scenes: layout.scenes,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load_short(&self, user_id: &str, short_id: &ShortId) -> PipelineResult<Short> {
        self.shorts
            .get_short(user_id, short_id)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("Short {}", short_id)))
    }

    async fn load_scene(&self, user_id: &str, scene_id: &SceneId) -> PipelineResult<Scene> {
        self.shorts
            .get_scene(user_id, scene_id)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("Scene {}", scene_id)))
    }

    /// The short's chosen text model, else the feature default.
    async fn text_model(&self, short: &Short, feature: FeatureKey) -> String {
        match short.model_id.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(model) => model.to_string(),
            None => self.resolver.get_default_model(feature).await,
        }
    }
}

fn ensure_editable(short: &Short) -> PipelineResult<()> {
    if short.status.accepts_scene_edits() {
        Ok(())
    } else {
        Err(PipelineError::validation(format!(
            "Scenes of a {} short can no longer be edited",
            short.status
        )))
    }
}

fn scene_request(
    short: &Short,
    scenes: &[Scene],
    position: u32,
    current: Option<&Scene>,
    instructions: Option<String>,
) -> SceneRequest {
    let neighbours = scenes
        .iter()
        .filter(|s| current.map_or(true, |c| c.id != s.id))
        .map(|s| s.narration.clone())
        .collect();
    SceneRequest {
        title: short.title.clone(),
        theme: short.theme.clone(),
        synopsis: short.synopsis.clone(),
        neighbours,
        position,
        current: current.map(|s| SceneDraft {
            narration: s.narration.clone(),
            visual_description: s.visual_description.clone(),
            visual_prompt: Some(s.visual_prompt.clone()),
            negative_prompt: s.negative_prompt.clone(),
            duration_secs: s.duration_secs,
        }),
        instructions,
    }
}
