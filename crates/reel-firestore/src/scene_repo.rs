//! Scene repository.
//!
//! Scenes are stored flat under `users/{uid}/scenes` so a scene can be
//! addressed by id alone; `short_id` links each one to its parent.

use std::collections::HashMap;

use reel_models::{Scene, SceneId, ShortId};
use tracing::warn;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{
    Document, Fields, Precondition, StructuredQuery, ToFirestoreValue, Value, Write,
};

/// Upper bound on scenes returned for one short.
const MAX_SCENES_PER_SHORT: i32 = 200;

/// Fields rewritten by [`SceneRepository::save`].
const CONTENT_FIELDS: &[&str] = &[
    "narration",
    "visual_description",
    "visual_prompt",
    "negative_prompt",
    "image_url",
    "video_url",
    "duration_secs",
    "updated_at",
];

/// Repository for scene documents.
pub struct SceneRepository {
    client: FirestoreClient,
    user_id: String,
}

impl SceneRepository {
    pub fn new(client: FirestoreClient, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }

    pub(crate) fn collection(&self) -> String {
        scenes_collection(&self.user_id)
    }

    /// Get a scene by ID.
    pub async fn get(&self, scene_id: &SceneId) -> FirestoreResult<Option<Scene>> {
        let collection = self.collection();
        let doc = self
            .client
            .with_retry("get_scene", || {
                self.client.get_document(&collection, scene_id.as_str())
            })
            .await?;

        doc.map(|d| document_to_scene(&d, scene_id.as_str()))
            .transpose()
    }

    /// All scenes of a short, sorted by order index.
    pub async fn list_for_short(&self, short_id: &ShortId) -> FirestoreResult<Vec<Scene>> {
        let parent = format!("users/{}", self.user_id);
        let query = StructuredQuery::collection("scenes")
            .filter_eq("short_id", short_id.as_str().to_firestore_value())
            .limit(MAX_SCENES_PER_SHORT);

        let docs = self
            .client
            .with_retry("list_scenes", || {
                self.client.run_query(&parent, query.clone())
            })
            .await?;

        let mut scenes = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc.doc_id().unwrap_or_default().to_string();
            match document_to_scene(&doc, &id) {
                Ok(scene) => scenes.push(scene),
                Err(e) => warn!(
                    user_id = %self.user_id,
                    scene_id = %id,
                    error = %e,
                    "Failed to parse scene document"
                ),
            }
        }

        // Sorted here rather than in the query so no composite index is needed.
        scenes.sort_by_key(|s| s.order);
        Ok(scenes)
    }

    /// Overwrite one scene's content and media fields in place.
    ///
    /// `order` is left out of the mask so a concurrent reorder is never
    /// undone. Fails with `NotFound` if the scene was deleted meanwhile.
    pub async fn save(&self, scene: &Scene) -> FirestoreResult<()> {
        let write = Write::patch(
            Document::named(
                self.client
                    .full_document_name(&self.collection(), scene.id.as_str()),
                scene_to_fields(scene),
            ),
            CONTENT_FIELDS,
        )
        .with_precondition(Precondition::exists());

        match self.client.commit(vec![write]).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_precondition_failed() => Err(FirestoreError::not_found(format!(
                "Scene {} no longer exists",
                scene.id
            ))),
            Err(e) => Err(e),
        }
    }

    /// Commit write that upserts `scene`.
    pub fn upsert_write(&self, scene: &Scene) -> Write {
        Write::upsert(Document::named(
            self.client
                .full_document_name(&self.collection(), scene.id.as_str()),
            scene_to_fields(scene),
        ))
    }

    /// Commit write that deletes `scene_id`.
    pub fn delete_write(&self, scene_id: &SceneId) -> Write {
        Write::delete(
            self.client
                .full_document_name(&self.collection(), scene_id.as_str()),
        )
    }
}

pub(crate) fn scenes_collection(user_id: &str) -> String {
    format!("users/{}/scenes", user_id)
}

pub(crate) fn scene_to_fields(scene: &Scene) -> HashMap<String, Value> {
    Fields::new()
        .set("id", scene.id.as_str())
        .set("short_id", scene.short_id.as_str())
        .set("user_id", scene.user_id.as_str())
        .set("order", scene.order)
        .set("narration", scene.narration.as_str())
        .set("visual_description", scene.visual_description.as_str())
        .set("visual_prompt", scene.visual_prompt.as_str())
        .set_opt("negative_prompt", scene.negative_prompt.as_deref())
        .set_opt("image_url", scene.image_url.as_deref())
        .set_opt("video_url", scene.video_url.as_deref())
        .set("duration_secs", scene.duration_secs)
        .set("created_at", scene.created_at)
        .set("updated_at", scene.updated_at)
        .into_inner()
}

pub(crate) fn document_to_scene(doc: &Document, scene_id: &str) -> FirestoreResult<Scene> {
    if doc.fields.is_none() {
        return Err(FirestoreError::invalid_response(format!(
            "Scene {} has no fields",
            scene_id
        )));
    }

    let short_id: String = doc.get("short_id").ok_or_else(|| {
        FirestoreError::invalid_response(format!("Scene {} is missing short_id", scene_id))
    })?;
    let order: u32 = doc.get("order").ok_or_else(|| {
        FirestoreError::invalid_response(format!("Scene {} is missing order", scene_id))
    })?;
    let created_at = doc.get("created_at").unwrap_or_else(chrono::Utc::now);

    Ok(Scene {
        id: SceneId::from(scene_id),
        short_id: ShortId::from(short_id),
        user_id: doc.get("user_id").unwrap_or_default(),
        order,
        narration: doc.get("narration").unwrap_or_default(),
        visual_description: doc.get("visual_description").unwrap_or_default(),
        visual_prompt: doc.get("visual_prompt").unwrap_or_default(),
        negative_prompt: doc.get("negative_prompt"),
        image_url: doc.get("image_url"),
        video_url: doc.get("video_url"),
        duration_secs: doc.get("duration_secs").unwrap_or(5),
        created_at,
        updated_at: doc.get("updated_at").unwrap_or(created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::SceneDraft;

    #[test]
    fn test_scene_fields_round_trip() {
        let draft = SceneDraft {
            narration: "The vendor counts coins.".into(),
            visual_description: "close-up of hands".into(),
            visual_prompt: None,
            negative_prompt: Some("blurry".into()),
            duration_secs: 6,
        };
        let mut scene = Scene::from_draft(&ShortId::from("sh1"), "u1", 3, &draft);
        scene.image_url = Some("https://cdn.example/1.png".into());

        let doc = Document::new(scene_to_fields(&scene));
        let parsed = document_to_scene(&doc, scene.id.as_str()).unwrap();

        assert_eq!(parsed.order, 3);
        assert_eq!(parsed.short_id, scene.short_id);
        assert_eq!(parsed.negative_prompt.as_deref(), Some("blurry"));
        assert_eq!(parsed.image_url, scene.image_url);
        assert!(parsed.video_url.is_none());
    }

    #[test]
    fn test_missing_order_is_rejected() {
        let doc = Document::new(Fields::new().set("short_id", "sh1").into_inner());
        assert!(document_to_scene(&doc, "sc1").is_err());
    }
}
