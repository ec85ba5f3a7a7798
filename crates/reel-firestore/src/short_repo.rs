//! Short repository.
//!
//! Structural scene changes are written together with the parent short in a
//! single commit guarded by the short's `updateTime`, so two writers racing
//! on the same short cannot both renumber its scenes.

use std::collections::HashMap;

use chrono::Utc;
use reel_models::{Scene, SceneId, Short, ShortId, ShortStatus};
use tracing::info;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::scene_repo::SceneRepository;
use crate::types::{Document, Fields, Precondition, Value, Write};

/// A short together with the `updateTime` it was read at.
#[derive(Debug, Clone)]
pub struct VersionedShort {
    pub short: Short,
    pub update_time: Option<String>,
}

/// Repository for short documents.
pub struct ShortRepository {
    client: FirestoreClient,
    user_id: String,
}

impl ShortRepository {
    pub fn new(client: FirestoreClient, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }

    fn collection(&self) -> String {
        format!("users/{}/shorts", self.user_id)
    }

    /// Create a short and its initial scenes in one commit.
    pub async fn create(&self, short: &Short, scenes: &[Scene]) -> FirestoreResult<()> {
        let scene_repo = SceneRepository::new(self.client.clone(), &self.user_id);
        let mut writes = Vec::with_capacity(scenes.len() + 1);
        writes.push(
            Write::upsert(self.named_document(short)).with_precondition(Precondition::missing()),
        );
        writes.extend(scenes.iter().map(|s| scene_repo.upsert_write(s)));

        self.client.commit(writes).await?;
        info!(
            user_id = %self.user_id,
            short_id = %short.id,
            scenes = scenes.len(),
            "Created short"
        );
        Ok(())
    }

    /// Get a short by ID.
    pub async fn get(&self, short_id: &ShortId) -> FirestoreResult<Option<Short>> {
        Ok(self.get_versioned(short_id).await?.map(|v| v.short))
    }

    /// Get a short along with its document `updateTime`.
    pub async fn get_versioned(
        &self,
        short_id: &ShortId,
    ) -> FirestoreResult<Option<VersionedShort>> {
        let collection = self.collection();
        let doc = self
            .client
            .with_retry("get_short", || {
                self.client.get_document(&collection, short_id.as_str())
            })
            .await?;

        match doc {
            Some(d) => Ok(Some(VersionedShort {
                short: document_to_short(&d, short_id.as_str())?,
                update_time: d.update_time.clone(),
            })),
            None => Ok(None),
        }
    }

    /// Write a new status if the short has not changed since `update_time`.
    pub async fn update_status(
        &self,
        short_id: &ShortId,
        status: ShortStatus,
        update_time: Option<&str>,
    ) -> FirestoreResult<()> {
        let fields = Fields::new()
            .set("status", status.as_str())
            .set("updated_at", Utc::now())
            .into_inner();

        self.client
            .update_document_with_precondition(
                &self.collection(),
                short_id.as_str(),
                fields,
                Some(vec!["status".to_string(), "updated_at".to_string()]),
                update_time,
            )
            .await?;
        Ok(())
    }

    /// Atomically rewrite the short document and apply scene upserts and
    /// deletes, failing with `PreconditionFailed` if the short moved since
    /// `update_time`.
    pub async fn commit_structure(
        &self,
        short: &Short,
        update_time: Option<&str>,
        upserts: &[Scene],
        deletes: &[SceneId],
    ) -> FirestoreResult<()> {
        let scene_repo = SceneRepository::new(self.client.clone(), &self.user_id);

        let mut writes = Vec::with_capacity(1 + upserts.len() + deletes.len());
        writes.push(
            Write::upsert(self.named_document(short))
                .with_precondition(Precondition::unchanged_since(update_time)),
        );
        writes.extend(upserts.iter().map(|s| scene_repo.upsert_write(s)));
        writes.extend(deletes.iter().map(|id| scene_repo.delete_write(id)));

        self.client.commit(writes).await?;
        info!(
            user_id = %self.user_id,
            short_id = %short.id,
            revision = short.revision,
            upserts = upserts.len(),
            deletes = deletes.len(),
            "Committed scene changes"
        );
        Ok(())
    }

    fn named_document(&self, short: &Short) -> Document {
        Document::named(
            self.client
                .full_document_name(&self.collection(), short.id.as_str()),
            short_to_fields(short),
        )
    }
}

fn short_to_fields(short: &Short) -> HashMap<String, Value> {
    Fields::new()
        .set("id", short.id.as_str())
        .set("user_id", short.user_id.as_str())
        .set("title", short.title.as_str())
        .set("theme", short.theme.as_str())
        .set_opt("synopsis", short.synopsis.as_deref())
        .set_opt("style_id", short.style_id.as_deref())
        .set_opt("tone_id", short.tone_id.as_deref())
        .set_opt("model_id", short.model_id.as_deref())
        .set("target_duration_secs", short.target_duration_secs)
        .set("status", short.status.as_str())
        .set("revision", short.revision)
        .set("scene_count", short.scene_count)
        .set("created_at", short.created_at)
        .set("updated_at", short.updated_at)
        .into_inner()
}

fn document_to_short(doc: &Document, short_id: &str) -> FirestoreResult<Short> {
    if doc.fields.is_none() {
        return Err(FirestoreError::invalid_response(format!(
            "Short {} has no fields",
            short_id
        )));
    }

    let status_str: String = doc.get("status").unwrap_or_default();
    let status = ShortStatus::from_str(&status_str).ok_or_else(|| {
        FirestoreError::invalid_response(format!(
            "Short {} has unknown status '{}'",
            short_id, status_str
        ))
    })?;
    let created_at = doc.get("created_at").unwrap_or_else(Utc::now);

    Ok(Short {
        id: ShortId::from(short_id),
        user_id: doc.get("user_id").unwrap_or_default(),
        title: doc.get("title").unwrap_or_default(),
        theme: doc.get("theme").unwrap_or_default(),
        synopsis: doc.get("synopsis"),
        style_id: doc.get("style_id"),
        tone_id: doc.get("tone_id"),
        model_id: doc.get("model_id"),
        target_duration_secs: doc.get("target_duration_secs").unwrap_or(60),
        status,
        revision: doc.get("revision").unwrap_or(0),
        scene_count: doc.get("scene_count").unwrap_or(0),
        created_at,
        updated_at: doc.get("updated_at").unwrap_or(created_at),
    })
}
