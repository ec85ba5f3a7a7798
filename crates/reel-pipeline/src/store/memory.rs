//! In-memory store.
//!
//! All state sits behind one lock, so every check-and-write is atomic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reel_models::{
    CreditTransaction, Credits, FeatureKey, PlanTier, Scene, SceneId, Short, ShortId,
    ShortStatus,
};
use tokio::sync::Mutex;

use super::{
    CreditStore, DebitOutcome, ModelConfigStore, SceneChanges, ShortStore, StoreError,
    StoreResult, TransactionPage,
};

#[derive(Default)]
struct State {
    shorts: HashMap<ShortId, Short>,
    scenes: HashMap<SceneId, Scene>,
    balances: HashMap<String, Credits>,
    transactions: Vec<CreditTransaction>,
    default_models: BTreeMap<FeatureKey, String>,
}

/// Process-local implementation of every store trait.
pub struct MemoryStore {
    state: Mutex<State>,
    initial_balance: Credits,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// New users start with the free plan allowance.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            initial_balance: PlanTier::Free.initial_credits(),
        }
    }

    pub fn with_initial_balance(mut self, credits: Credits) -> Self {
        self.initial_balance = credits;
        self
    }

    /// Set a user's balance directly.
    pub async fn set_balance(&self, user_id: &str, credits: Credits) {
        self.state
            .lock()
            .await
            .balances
            .insert(user_id.to_string(), credits);
    }

    /// Every recorded transaction for `user_id`, oldest first.
    pub async fn transactions_for(&self, user_id: &str) -> Vec<CreditTransaction> {
        self.state
            .lock()
            .await
            .transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect()
    }

    fn balance_of(&self, state: &State, user_id: &str) -> Credits {
        state
            .balances
            .get(user_id)
            .copied()
            .unwrap_or(self.initial_balance)
    }
}

fn owned_short<'a>(state: &'a State, user_id: &str, short_id: &ShortId) -> Option<&'a Short> {
    state.shorts.get(short_id).filter(|s| s.user_id == user_id)
}

fn sorted_scenes(state: &State, short_id: &ShortId) -> Vec<Scene> {
    let mut scenes: Vec<Scene> = state
        .scenes
        .values()
        .filter(|s| &s.short_id == short_id)
        .cloned()
        .collect();
    scenes.sort_by_key(|s| s.order);
    scenes
}

#[async_trait]
impl ShortStore for MemoryStore {
    async fn create_short(&self, short: &Short, scenes: &[Scene]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.shorts.contains_key(&short.id) {
            return Err(StoreError::conflict(format!("Short {} already exists", short.id)));
        }
        state.shorts.insert(short.id.clone(), short.clone());
        for scene in scenes {
            state.scenes.insert(scene.id.clone(), scene.clone());
        }
        Ok(())
    }

    async fn get_short(&self, user_id: &str, short_id: &ShortId) -> StoreResult<Option<Short>> {
        let state = self.state.lock().await;
        Ok(owned_short(&state, user_id, short_id).cloned())
    }

    async fn list_scenes(&self, user_id: &str, short_id: &ShortId) -> StoreResult<Vec<Scene>> {
        let state = self.state.lock().await;
        if owned_short(&state, user_id, short_id).is_none() {
            return Ok(Vec::new());
        }
        Ok(sorted_scenes(&state, short_id))
    }

    async fn get_scene(&self, user_id: &str, scene_id: &SceneId) -> StoreResult<Option<Scene>> {
        let state = self.state.lock().await;
        Ok(state
            .scenes
            .get(scene_id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn update_status(
        &self,
        user_id: &str,
        short_id: &ShortId,
        expected: ShortStatus,
        next: ShortStatus,
    ) -> StoreResult<Short> {
        let mut state = self.state.lock().await;
        let short = state
            .shorts
            .get_mut(short_id)
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("shorts/{}", short_id)))?;

        if short.status != expected {
            return Err(StoreError::conflict(format!(
                "Short {} is {}, expected {}",
                short_id, short.status, expected
            )));
        }
        short.status = next;
        short.updated_at = Utc::now();
        Ok(short.clone())
    }

    async fn save_scene(&self, scene: &Scene) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .scenes
            .get_mut(&scene.id)
            .filter(|s| s.user_id == scene.user_id)
            .ok_or_else(|| StoreError::NotFound(format!("scenes/{}", scene.id)))?;

        let order = stored.order;
        *stored = scene.clone();
        stored.order = order;
        Ok(())
    }

    async fn commit_scene_changes(
        &self,
        user_id: &str,
        short_id: &ShortId,
        expected_revision: u64,
        changes: SceneChanges,
    ) -> StoreResult<Short> {
        let mut state = self.state.lock().await;
        let short = state
            .shorts
            .get(short_id)
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("shorts/{}", short_id)))?;

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
        }

        let mut updated = short.clone();
        updated.revision += 1;
        updated.scene_count = changes.scene_count;
        updated.updated_at = Utc::now();
        if let Some(change) = changes.status {
            updated.status = change.to;
        }
        if let Some(synopsis) = changes.synopsis {
            updated.synopsis = Some(synopsis);
        }

        for id in &changes.deletes {
            state.scenes.remove(id);
        }
        for scene in changes.upserts {
            state.scenes.insert(scene.id.clone(), scene);
        }
        state.shorts.insert(short_id.clone(), updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl CreditStore for MemoryStore {
    async fn balance(&self, user_id: &str) -> StoreResult<Credits> {
        let state = self.state.lock().await;
        Ok(self.balance_of(&state, user_id))
    }

    async fn try_debit(&self, tx: CreditTransaction) -> StoreResult<DebitOutcome> {
        let mut state = self.state.lock().await;
        let available = self.balance_of(&state, &tx.user_id);
        let Some(remaining) = available.checked_sub(tx.credits_amount) else {
            return Ok(DebitOutcome::Insufficient { available });
        };

        let recorded = CreditTransaction {
            balance_after: remaining,
            ..tx
        };
        state.balances.insert(recorded.user_id.clone(), remaining);
        state.transactions.push(recorded.clone());
        Ok(DebitOutcome::Debited(recorded))
    }

    async fn credit(&self, tx: CreditTransaction) -> StoreResult<CreditTransaction> {
        let mut state = self.state.lock().await;
        let balance = self
            .balance_of(&state, &tx.user_id)
            .saturating_add(tx.credits_amount);
        let recorded = CreditTransaction {
            balance_after: balance,
            ..tx
        };
        state.balances.insert(recorded.user_id.clone(), balance);
        state.transactions.push(recorded.clone());
        Ok(recorded)
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> StoreResult<TransactionPage> {
        let limit = limit.unwrap_or(50).clamp(1, 100) as usize;
        let before: Option<DateTime<Utc>> = cursor
            .map(|c| {
                DateTime::parse_from_rfc3339(c)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| StoreError::Backend(format!("Invalid cursor '{}': {}", c, e)))
            })
            .transpose()?;

        let state = self.state.lock().await;
        let mut transactions: Vec<CreditTransaction> = state
            .transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .filter(|tx| before.map_or(true, |b| tx.timestamp < b))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        transactions.reverse();
        transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        transactions.truncate(limit);

        let next_cursor = if transactions.len() == limit {
            transactions.last().map(|tx| tx.timestamp.to_rfc3339())
        } else {
            None
        };
        Ok(TransactionPage {
            transactions,
            next_cursor,
        })
    }
}

#[async_trait]
impl ModelConfigStore for MemoryStore {
    async fn load_default_models(&self) -> StoreResult<BTreeMap<FeatureKey, String>> {
        Ok(self.state.lock().await.default_models.clone())
    }

    async fn save_default_models(
        &self,
        models: &BTreeMap<FeatureKey, String>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for (feature, model) in models {
            state.default_models.insert(*feature, model.clone());
        }
        Ok(())
    }
}
