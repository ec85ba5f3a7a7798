//! Credit ledger.
//!
//! This module handles:
//! - Balance validation ahead of billable work
//! - Conditional deduction that never leaves a balance negative
//! - Compensating refunds when the billed work fails
//! - Balance and history reads for the API
//!
//! Every mutation writes a [`CreditTransaction`] in the same store operation
//! as the balance change, so the audit trail and the balance cannot drift.

use std::sync::Arc;

use reel_models::{ChargeContext, CreditTransaction, Credits, FeatureKey, TransactionKind};
use tracing::{debug, error, info};

use crate::error::{PipelineError, PipelineResult};
use crate::metrics::{record_deduction, record_insufficient, record_refund, record_refund_failure};
use crate::store::{CreditStore, DebitOutcome, TransactionPage};

/// Refund reason used when a billed generation call fails.
pub const REASON_GENERATION_FAILED: &str = "generation_failed";

/// Refund reason used when the artifact could not be saved.
pub const REASON_PERSIST_FAILED: &str = "persist_failed";

// =============================================================================
// Charge
// =============================================================================

/// A billable request: what is being bought, how many, and for what.
///
/// The cost is always derived from the feature table, never supplied by the
/// caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Charge {
    pub feature: FeatureKey,
    pub quantity: u32,
    /// Serving model, when the price depends on it.
    pub model_id: Option<String>,
    pub context: ChargeContext,
}

impl Charge {
    pub fn new(feature: FeatureKey, quantity: u32) -> Self {
        Self {
            feature,
            quantity,
            model_id: None,
            context: ChargeContext::default(),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_context(mut self, context: ChargeContext) -> Self {
        self.context = context;
        self
    }

    pub fn cost(&self) -> Credits {
        let unit = match &self.model_id {
            Some(model) => self.feature.price_for_model(model),
            None => self.feature.price(),
        };
        unit.times(self.quantity)
    }

    fn transaction(&self, user_id: &str, kind: TransactionKind) -> CreditTransaction {
        CreditTransaction::new(
            user_id,
            kind,
            self.feature,
            self.cost(),
            self.quantity,
            Credits::ZERO,
        )
        .with_context(&self.context)
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// Validate, deduct and refund against a [`CreditStore`].
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn CreditStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn CreditStore>) -> Self {
        Self { store }
    }

    pub async fn balance(&self, user_id: &str) -> PipelineResult<Credits> {
        Ok(self.store.balance(user_id).await?)
    }

    /// Check that `charge` is affordable without changing anything.
    ///
    /// Returns the cost.
    pub async fn validate(&self, user_id: &str, charge: &Charge) -> PipelineResult<Credits> {
        let required = charge.cost();
        let available = self.store.balance(user_id).await?;
        if available < required {
            debug!(
                user_id = user_id,
                feature = %charge.feature,
                required = %required,
                available = %available,
                "Credit validation failed"
            );
            record_insufficient(charge.feature);
            return Err(PipelineError::InsufficientCredits {
                required,
                available,
            });
        }
        Ok(required)
    }

    /// Deduct the cost of `charge` if the balance covers it.
    ///
    /// A debit that loses a race to a concurrent one reports
    /// `InsufficientCredits` with the balance it saw.
    pub async fn deduct(&self, user_id: &str, charge: &Charge) -> PipelineResult<CreditTransaction> {
        let tx = charge.transaction(user_id, TransactionKind::Deduction);
        let required = tx.credits_amount;

        match self.store.try_debit(tx).await? {
            DebitOutcome::Debited(tx) => {
                record_deduction(charge.feature, tx.credits_amount);
                info!(
                    user_id = user_id,
                    feature = %charge.feature,
                    credits = %tx.credits_amount,
                    balance_after = %tx.balance_after,
                    "Credits deducted"
                );
                Ok(tx)
            }
            DebitOutcome::Insufficient { available } => {
                record_insufficient(charge.feature);
                Err(PipelineError::InsufficientCredits {
                    required,
                    available,
                })
            }
        }
    }

    /// Return the cost of `charge` with a compensating audit record.
    pub async fn refund(
        &self,
        user_id: &str,
        charge: &Charge,
        reason: &str,
    ) -> PipelineResult<CreditTransaction> {
        let tx = charge
            .transaction(user_id, TransactionKind::Refund)
            .with_reason(reason);
        let amount = tx.credits_amount;

        match self.store.credit(tx).await {
            Ok(tx) => {
                record_refund(charge.feature, tx.credits_amount);
                info!(
                    user_id = user_id,
                    feature = %charge.feature,
                    credits = %tx.credits_amount,
                    balance_after = %tx.balance_after,
                    reason = reason,
                    "Credits refunded"
                );
                Ok(tx)
            }
            Err(e) => {
                record_refund_failure(charge.feature);
                error!(
                    user_id = user_id,
                    feature = %charge.feature,
                    credits = %amount,
                    reason = reason,
                    error = %e,
                    "Credit refund failed; balance must be corrected manually"
                );
                Err(e.into())
            }
        }
    }

    pub async fn history(
        &self,
        user_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> PipelineResult<TransactionPage> {
        Ok(self.store.list_transactions(user_id, limit, cursor).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ledger_with(balance: Credits) -> (CreditLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new().with_initial_balance(balance));
        (CreditLedger::new(store.clone()), store)
    }

    #[test]
    fn test_charge_cost_uses_model_price() {
        let charge = Charge::new(FeatureKey::ScriptGeneration, 1);
        assert_eq!(charge.cost(), Credits::whole(2));

        let free = charge.clone().with_model("meta-llama/llama-3.3-70b-instruct:free");
        assert_eq!(free.cost(), Credits::ZERO);

        let images = Charge::new(FeatureKey::ImageGeneration, 3).with_model("fal-ai/flux/schnell");
        assert_eq!(images.cost(), Credits::whole(6));
    }

    #[tokio::test]
    async fn test_validate_does_not_mutate() {
        let (ledger, store) = ledger_with(Credits::whole(1));
        let err = ledger
            .validate("u1", &Charge::new(FeatureKey::ScriptGeneration, 1))
            .await
            .unwrap_err();

        match err {
            PipelineError::InsufficientCredits {
                required,
                available,
            } => {
                assert_eq!(required, Credits::whole(2));
                assert_eq!(available, Credits::whole(1));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(store.transactions_for("u1").await.is_empty());
        assert_eq!(ledger.balance("u1").await.unwrap(), Credits::whole(1));
    }

    #[tokio::test]
    async fn test_half_credit_deduction_is_exact() {
        let (ledger, store) = ledger_with(Credits::whole(5));
        let charge = Charge::new(FeatureKey::SceneRegeneration, 1)
            .with_context(ChargeContext::new().with_short_id("sh1").with_scene_id("sc1"));

        let tx = ledger.deduct("u1", &charge).await.unwrap();
        assert_eq!(tx.balance_after, Credits::from_hundredths(450));
        assert_eq!(tx.scene_id.as_deref(), Some("sc1"));

        let recorded = store.transactions_for("u1").await;
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].reason.is_none());
    }

    #[tokio::test]
    async fn test_refund_restores_balance_with_reason() {
        let (ledger, store) = ledger_with(Credits::whole(10));
        let charge = Charge::new(FeatureKey::VideoGeneration, 1);

        ledger.deduct("u1", &charge).await.unwrap();
        let refund = ledger
            .refund("u1", &charge, REASON_GENERATION_FAILED)
            .await
            .unwrap();

        assert!(refund.is_refund());
        assert_eq!(refund.balance_after, Credits::whole(10));
        assert_eq!(store.transactions_for("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_deducts_never_overdraw() {
        let (ledger, _store) = ledger_with(Credits::whole(10));
        let charge = Charge::new(FeatureKey::ImageGeneration, 1);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let ledger = ledger.clone();
                let charge = charge.clone();
                tokio::spawn(async move { ledger.deduct("u1", &charge).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(PipelineError::InsufficientCredits { .. }) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(succeeded, 5);
        assert_eq!(ledger.balance("u1").await.unwrap(), Credits::ZERO);
    }
}
