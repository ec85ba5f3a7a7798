//! Admin-configured default models (`settings/default_models`).

use std::collections::BTreeMap;

use chrono::Utc;
use reel_models::FeatureKey;
use tracing::{info, warn};

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::types::{Fields, FromFirestoreValue};

const COLLECTION: &str = "settings";
const DOC_ID: &str = "default_models";

/// Repository for the feature -> model override document.
pub struct ModelConfigRepository {
    client: FirestoreClient,
}

impl ModelConfigRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Load every override. Unknown keys in the document are ignored.
    pub async fn load(&self) -> FirestoreResult<BTreeMap<FeatureKey, String>> {
        let doc = self
            .client
            .with_retry("get_default_models", || {
                self.client.get_document(COLLECTION, DOC_ID)
            })
            .await?;

        let mut models = BTreeMap::new();
        let Some(fields) = doc.and_then(|d| d.fields) else {
            return Ok(models);
        };

        for (key, value) in &fields {
            if key == "updated_at" {
                continue;
            }
            match (key.parse::<FeatureKey>(), String::from_firestore_value(value)) {
                (Ok(feature), Some(model)) if !model.is_empty() => {
                    models.insert(feature, model);
                }
                _ => warn!(field = %key, "Ignoring unrecognized default model entry"),
            }
        }
        Ok(models)
    }

    /// Merge `models` into the document, leaving other keys untouched.
    pub async fn save(&self, models: &BTreeMap<FeatureKey, String>) -> FirestoreResult<()> {
        let mut fields = Fields::new().set("updated_at", Utc::now());
        let mut mask = vec!["updated_at".to_string()];
        for (feature, model) in models {
            fields = fields.set(feature.as_str(), model.as_str());
            mask.push(feature.as_str().to_string());
        }

        self.client
            .update_document(COLLECTION, DOC_ID, fields.into_inner(), Some(mask))
            .await?;
        info!(count = models.len(), "Saved default model overrides");
        Ok(())
    }
}
