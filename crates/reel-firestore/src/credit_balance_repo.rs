//! Credit balance repository.
//!
//! The balance lives on the user document (`users/{uid}`) as integer
//! hundredths of a credit. Every mutation is a compare-and-set on the
//! document's `updateTime` that also creates the matching transaction
//! record in the same commit, so the audit trail can never drift from the
//! balance.
//!
//! A user without a balance field is backfilled from their plan's initial
//! allowance on first access.

use std::time::Duration;

use chrono::Utc;
use reel_models::{CreditTransaction, Credits, PlanTier};
use tracing::{debug, info, warn};

use crate::client::FirestoreClient;
use crate::credit_transaction_repo::transaction_write;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_conflict;
use crate::types::{Document, Fields, Precondition, Write};

/// Maximum retries for atomic credit operations (optimistic locking).
const MAX_CREDIT_RETRIES: u32 = 5;

/// Base delay for linear backoff on retry (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 50;

const BALANCE_FIELD: &str = "credit_balance";
const SYNCED_AT_FIELD: &str = "credits_synced_at";

/// Outcome of a conditional debit.
#[derive(Debug, Clone, PartialEq)]
pub enum DebitResult {
    /// Balance decremented; the recorded transaction carries the new balance.
    Debited(CreditTransaction),
    /// Balance was too low; nothing was written.
    Insufficient { available: Credits },
}

/// Balance as read from the user document.
#[derive(Debug, Clone)]
struct BalanceSnapshot {
    balance: Credits,
    update_time: Option<String>,
    /// The stored document has no balance field yet.
    backfilled: bool,
}

/// Repository for a user's credit balance.
pub struct CreditBalanceRepository {
    client: FirestoreClient,
    user_id: String,
}

impl CreditBalanceRepository {
    pub fn new(client: FirestoreClient, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }

    /// Current balance, persisting the plan default on first access.
    pub async fn balance(&self) -> FirestoreResult<Credits> {
        for attempt in 0..MAX_CREDIT_RETRIES {
            let snapshot = self.read().await?;
            if !snapshot.backfilled {
                return Ok(snapshot.balance);
            }

            let write = self.balance_write(snapshot.balance, snapshot.update_time.as_deref());
            match self.client.commit(vec![write]).await {
                Ok(_) => {
                    info!(
                        user_id = %self.user_id,
                        credits = %snapshot.balance,
                        "Backfilled credit balance from plan"
                    );
                    return Ok(snapshot.balance);
                }
                Err(e) if e.is_precondition_failed() => {
                    self.on_conflict("backfill_balance", attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::request_failed(
            "Failed to initialize credit balance due to concurrent updates",
        ))
    }

    /// Decrement the balance by `tx.credits_amount` if it is sufficient and
    /// record `tx` in the same commit.
    pub async fn debit(&self, tx: CreditTransaction) -> FirestoreResult<DebitResult> {
        let mut last_error = None;

        for attempt in 0..MAX_CREDIT_RETRIES {
            let snapshot = self.read().await?;
            let Some(remaining) = snapshot.balance.checked_sub(tx.credits_amount) else {
                debug!(
                    user_id = %self.user_id,
                    required = %tx.credits_amount,
                    available = %snapshot.balance,
                    "Insufficient credits"
                );
                return Ok(DebitResult::Insufficient {
                    available: snapshot.balance,
                });
            };

            let recorded = CreditTransaction {
                balance_after: remaining,
                ..tx.clone()
            };
            match self.commit_mutation(&snapshot, remaining, &recorded).await {
                Ok(()) => {
                    info!(
                        user_id = %self.user_id,
                        feature = %recorded.feature,
                        credits = %recorded.credits_amount,
                        balance_after = %remaining,
                        "Debited credits"
                    );
                    return Ok(DebitResult::Debited(recorded));
                }
                Err(e) if e.is_precondition_failed() => {
                    self.on_conflict("debit_credits", attempt).await;
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(user_id = %self.user_id, error = %e, "Failed to debit credits");
                    return Err(e);
                }
            }
        }

        warn!(
            user_id = %self.user_id,
            retries = MAX_CREDIT_RETRIES,
            error = ?last_error,
            "Credit debit failed after retries"
        );
        Err(FirestoreError::request_failed(
            "Failed to debit credits due to concurrent updates",
        ))
    }

    /// Increment the balance by `tx.credits_amount` and record `tx`.
    pub async fn credit(&self, tx: CreditTransaction) -> FirestoreResult<CreditTransaction> {
        for attempt in 0..MAX_CREDIT_RETRIES {
            let snapshot = self.read().await?;
            let new_balance = snapshot.balance.saturating_add(tx.credits_amount);
            let recorded = CreditTransaction {
                balance_after: new_balance,
                ..tx.clone()
            };

            match self.commit_mutation(&snapshot, new_balance, &recorded).await {
                Ok(()) => {
                    info!(
                        user_id = %self.user_id,
                        feature = %recorded.feature,
                        credits = %recorded.credits_amount,
                        balance_after = %new_balance,
                        "Credited credits"
                    );
                    return Ok(recorded);
                }
                Err(e) if e.is_precondition_failed() => {
                    self.on_conflict("credit_credits", attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::request_failed(
            "Failed to credit credits due to concurrent updates",
        ))
    }

    async fn read(&self) -> FirestoreResult<BalanceSnapshot> {
        let doc = self
            .client
            .with_retry("get_credit_balance", || {
                self.client.get_document("users", &self.user_id)
            })
            .await?;

        Ok(match doc {
            Some(d) => match d.get::<Credits>(BALANCE_FIELD) {
                Some(balance) => BalanceSnapshot {
                    balance,
                    update_time: d.update_time.clone(),
                    backfilled: false,
                },
                None => {
                    let plan = d
                        .get::<String>("plan")
                        .map(|p| PlanTier::from_str(&p))
                        .unwrap_or_default();
                    BalanceSnapshot {
                        balance: plan.initial_credits(),
                        update_time: d.update_time.clone(),
                        backfilled: true,
                    }
                }
            },
            None => BalanceSnapshot {
                balance: PlanTier::default().initial_credits(),
                update_time: None,
                backfilled: true,
            },
        })
    }

    async fn commit_mutation(
        &self,
        snapshot: &BalanceSnapshot,
        new_balance: Credits,
        tx: &CreditTransaction,
    ) -> FirestoreResult<()> {
        let writes = vec![
            self.balance_write(new_balance, snapshot.update_time.as_deref()),
            transaction_write(&self.client, &self.user_id, tx),
        ];
        self.client.commit(writes).await.map(|_| ())
    }

    fn balance_write(&self, balance: Credits, update_time: Option<&str>) -> Write {
        let fields = Fields::new()
            .set(BALANCE_FIELD, balance)
            .set(SYNCED_AT_FIELD, Utc::now())
            .into_inner();
        Write::patch(
            Document::named(
                self.client.full_document_name("users", &self.user_id),
                fields,
            ),
            &[BALANCE_FIELD, SYNCED_AT_FIELD],
        )
        .with_precondition(Precondition::unchanged_since(update_time))
    }

    async fn on_conflict(&self, operation: &str, attempt: u32) {
        debug!(
            user_id = %self.user_id,
            attempt = attempt + 1,
            operation = operation,
            "Credit balance precondition failed, retrying"
        );
        record_conflict(operation);
        let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
        tokio::time::sleep(delay).await;
    }
}
