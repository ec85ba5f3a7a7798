//! Persistence seams for the pipeline.
//!
//! Two backends implement every trait: [`FirestoreStore`] for production and
//! [`MemoryStore`] for local runs and tests.

mod firestore;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use reel_firestore::FirestoreError;
use reel_models::{
    CreditTransaction, Credits, FeatureKey, Scene, SceneId, Short, ShortId, ShortStatus,
};
use thiserror::Error;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A concurrent writer changed the record first.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

impl From<FirestoreError> for StoreError {
    fn from(err: FirestoreError) -> Self {
        match err {
            FirestoreError::NotFound(path) => StoreError::NotFound(path),
            e if e.is_precondition_failed() => StoreError::Conflict(e.to_string()),
            e => StoreError::Backend(e.to_string()),
        }
    }
}

/// Expected and new status written together with a scene commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: ShortStatus,
    pub to: ShortStatus,
}

/// One atomic structural change to a short's scenes.
///
/// `upserts` must carry final order indices; the store writes them as given.
#[derive(Debug, Clone, Default)]
pub struct SceneChanges {
    pub upserts: Vec<Scene>,
    pub deletes: Vec<SceneId>,
    pub scene_count: u32,
    pub status: Option<StatusChange>,
    pub synopsis: Option<String>,
}

/// Storage for shorts and their scenes.
#[async_trait]
pub trait ShortStore: Send + Sync {
    /// Persist a new short with its initial scenes in one write.
    async fn create_short(&self, short: &Short, scenes: &[Scene]) -> StoreResult<()>;

    async fn get_short(&self, user_id: &str, short_id: &ShortId) -> StoreResult<Option<Short>>;

    /// Scenes of a short sorted by order.
    async fn list_scenes(&self, user_id: &str, short_id: &ShortId) -> StoreResult<Vec<Scene>>;

    async fn get_scene(&self, user_id: &str, scene_id: &SceneId) -> StoreResult<Option<Scene>>;

    /// Move the short from `expected` to `next`, failing with `Conflict` if
    /// its status is no longer `expected`.
    async fn update_status(
        &self,
        user_id: &str,
        short_id: &ShortId,
        expected: ShortStatus,
        next: ShortStatus,
    ) -> StoreResult<Short>;

    /// Overwrite one scene's content and media. Never touches `order`.
    async fn save_scene(&self, scene: &Scene) -> StoreResult<()>;

    /// Apply `changes` and bump the short's revision, failing with
    /// `Conflict` if the revision is no longer `expected_revision`.
    async fn commit_scene_changes(
        &self,
        user_id: &str,
        short_id: &ShortId,
        expected_revision: u64,
        changes: SceneChanges,
    ) -> StoreResult<Short>;
}

/// Outcome of a conditional debit.
#[derive(Debug, Clone, PartialEq)]
pub enum DebitOutcome {
    Debited(CreditTransaction),
    Insufficient { available: Credits },
}

/// One page of credit history, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPage {
    pub transactions: Vec<CreditTransaction>,
    pub next_cursor: Option<String>,
}

/// Storage for credit balances and their audit trail.
#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn balance(&self, user_id: &str) -> StoreResult<Credits>;

    /// Decrement by `tx.credits_amount` only if the balance covers it, and
    /// record `tx` with the resulting balance.
    async fn try_debit(&self, tx: CreditTransaction) -> StoreResult<DebitOutcome>;

    /// Increment by `tx.credits_amount` and record `tx`.
    async fn credit(&self, tx: CreditTransaction) -> StoreResult<CreditTransaction>;

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> StoreResult<TransactionPage>;
}

/// Storage for admin feature -> model overrides.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelConfigStore: Send + Sync {
    async fn load_default_models(&self) -> StoreResult<BTreeMap<FeatureKey, String>>;

    async fn save_default_models(&self, models: &BTreeMap<FeatureKey, String>)
        -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firestore_errors_map_to_store_errors() {
        assert!(matches!(
            StoreError::from(FirestoreError::PreconditionFailed("stale".into())),
            StoreError::Conflict(_)
        ));
        assert!(matches!(
            StoreError::from(FirestoreError::not_found("users/u1/scenes/x")),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            StoreError::from(FirestoreError::ServerError(503, "down".into())),
            StoreError::Backend(_)
        ));
    }
}
