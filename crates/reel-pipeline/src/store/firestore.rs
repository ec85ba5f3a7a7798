//! Firestore-backed store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use reel_firestore::{
    CreditBalanceRepository, CreditTransactionRepository, DebitResult, FirestoreClient,
    ModelConfigRepository, SceneRepository, ShortRepository,
};
use reel_models::{
    CreditTransaction, Credits, FeatureKey, Scene, SceneId, Short, ShortId, ShortStatus,
};
use tracing::debug;

use super::{
    CreditStore, DebitOutcome, ModelConfigStore, SceneChanges, ShortStore, StoreError,
    StoreResult, TransactionPage,
};

/// Store backed by the Firestore REST repositories.
#[derive(Clone)]
pub struct FirestoreStore {
    client: FirestoreClient,
}

impl FirestoreStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    fn shorts(&self, user_id: &str) -> ShortRepository {
        ShortRepository::new(self.client.clone(), user_id)
    }

    fn scenes(&self, user_id: &str) -> SceneRepository {
        SceneRepository::new(self.client.clone(), user_id)
    }
}

#[async_trait]
impl ShortStore for FirestoreStore {
    async fn create_short(&self, short: &Short, scenes: &[Scene]) -> StoreResult<()> {
        self.shorts(&short.user_id).create(short, scenes).await?;
        Ok(())
    }

    async fn get_short(&self, user_id: &str, short_id: &ShortId) -> StoreResult<Option<Short>> {
        Ok(self.shorts(user_id).get(short_id).await?)
    }

    async fn list_scenes(&self, user_id: &str, short_id: &ShortId) -> StoreResult<Vec<Scene>> {
        Ok(self.scenes(user_id).list_for_short(short_id).await?)
    }

    async fn get_scene(&self, user_id: &str, scene_id: &SceneId) -> StoreResult<Option<Scene>> {
        Ok(self.scenes(user_id).get(scene_id).await?)
    }

    async fn update_status(
        &self,
        user_id: &str,
        short_id: &ShortId,
        expected: ShortStatus,
        next: ShortStatus,
    ) -> StoreResult<Short> {
        let repo = self.shorts(user_id);
        let versioned = repo
            .get_versioned(short_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("shorts/{}", short_id)))?;

        if versioned.short.status != expected {
            return Err(StoreError::conflict(format!(
                "Short {} is {}, expected {}",
                short_id, versioned.short.status, expected
            )));
        }

        repo.update_status(short_id, next, versioned.update_time.as_deref())
            .await?;
        debug!(short_id = %short_id, from = %expected, to = %next, "Short status updated");

        let mut short = versioned.short;
        short.status = next;
        short.updated_at = Utc::now();
        Ok(short)
    }

    async fn save_scene(&self, scene: &Scene) -> StoreResult<()> {
        self.scenes(&scene.user_id).save(scene).await?;
        Ok(())
    }

    async fn commit_scene_changes(
        &self,
        user_id: &str,
        short_id: &ShortId,
        expected_revision: u64,
        changes: SceneChanges,
    ) -> StoreResult<Short> {
        let repo = self.shorts(user_id);
        let versioned = repo
            .get_versioned(short_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("shorts/{}", short_id)))?;

        let mut short = versioned.short;
        if short.revision != expected_revision {
            return Err(StoreError::conflict(format!(
                "Short {} is at revision {}, expected {}",
                short_id, short.revision, expected_revision
            )));
        }
        if let Some(change) = changes.status {
            if short.status != change.from {
                return Err(StoreError::conflict(format!(
                    "Short {} is {}, expected {}",
                    short_id, short.status, change.from
                )));
            }
            short.status = change.to;
        }

        short.revision += 1;
        short.scene_count = changes.scene_count;
        short.updated_at = Utc::now();
        if let Some(synopsis) = changes.synopsis {
            short.synopsis = Some(synopsis);
        }

        // The updateTime precondition catches writers that slipped in
        // between the read above and this commit.
        repo.commit_structure(
            &short,
            versioned.update_time.as_deref(),
            &changes.upserts,
            &changes.deletes,
        )
        .await?;
        Ok(short)
    }
}

#[async_trait]
impl CreditStore for FirestoreStore {
    async fn balance(&self, user_id: &str) -> StoreResult<Credits> {
        Ok(CreditBalanceRepository::new(self.client.clone(), user_id)
            .balance()
            .await?)
    }

    async fn try_debit(&self, tx: CreditTransaction) -> StoreResult<DebitOutcome> {
        let repo = CreditBalanceRepository::new(self.client.clone(), &tx.user_id);
        Ok(match repo.debit(tx).await? {
            DebitResult::Debited(tx) => DebitOutcome::Debited(tx),
            DebitResult::Insufficient { available } => DebitOutcome::Insufficient { available },
        })
    }

    async fn credit(&self, tx: CreditTransaction) -> StoreResult<CreditTransaction> {
        let repo = CreditBalanceRepository::new(self.client.clone(), &tx.user_id);
        Ok(repo.credit(tx).await?)
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> StoreResult<TransactionPage> {
        let (transactions, next_cursor) =
            CreditTransactionRepository::new(self.client.clone(), user_id)
                .list_page(limit, cursor)
                .await?;
        Ok(TransactionPage {
            transactions,
            next_cursor,
        })
    }
}

#[async_trait]
impl ModelConfigStore for FirestoreStore {
    async fn load_default_models(&self) -> StoreResult<BTreeMap<FeatureKey, String>> {
        Ok(ModelConfigRepository::new(self.client.clone()).load().await?)
    }

    async fn save_default_models(
        &self,
        models: &BTreeMap<FeatureKey, String>,
    ) -> StoreResult<()> {
        ModelConfigRepository::new(self.client.clone())
            .save(models)
            .await?;
        Ok(())
    }
}
