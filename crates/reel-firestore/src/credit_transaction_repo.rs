//! Credit transaction repository for the credit audit trail.

use std::collections::HashMap;

use reel_models::{CreditTransaction, Credits, FeatureKey, TransactionKind};
use tracing::warn;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, Fields, Precondition, StructuredQuery, Value, Write};

/// Repository for credit transaction documents.
pub struct CreditTransactionRepository {
    client: FirestoreClient,
    user_id: String,
}

impl CreditTransactionRepository {
    pub fn new(client: FirestoreClient, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }

    /// Record a standalone transaction.
    pub async fn create(&self, transaction: &CreditTransaction) -> FirestoreResult<()> {
        self.client
            .create_document(
                &transactions_collection(&self.user_id),
                &transaction.id,
                transaction_to_fields(transaction),
            )
            .await?;
        Ok(())
    }

    /// List transactions newest first.
    ///
    /// `cursor` is the RFC 3339 timestamp returned as the previous page's
    /// next cursor. `limit` is clamped to `1..=100`.
    pub async fn list_page(
        &self,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> FirestoreResult<(Vec<CreditTransaction>, Option<String>)> {
        let effective_limit = limit.unwrap_or(50).clamp(1, 100);

        let mut query = StructuredQuery::collection("credit_transactions")
            .order_by("timestamp", "DESCENDING")
            .limit(effective_limit as i32);
        if let Some(ts) = cursor {
            query = query.start_after(vec![Value::TimestampValue(ts.to_string())]);
        }

        let parent = format!("users/{}", self.user_id);
        let docs = self
            .client
            .with_retry("list_credit_transactions", || {
                self.client.run_query(&parent, query.clone())
            })
            .await?;

        let mut transactions = Vec::with_capacity(docs.len());
        for doc in docs {
            let tx_id = doc.doc_id().unwrap_or_default().to_string();
            match document_to_transaction(&doc, &tx_id) {
                Ok(tx) => transactions.push(tx),
                Err(e) => warn!(
                    user_id = %self.user_id,
                    tx_id = %tx_id,
                    error = %e,
                    "Failed to parse credit transaction document"
                ),
            }
        }

        let next_cursor = if transactions.len() as u32 == effective_limit {
            transactions.last().map(|tx| tx.timestamp.to_rfc3339())
        } else {
            None
        };

        Ok((transactions, next_cursor))
    }
}

fn transactions_collection(user_id: &str) -> String {
    format!("users/{}/credit_transactions", user_id)
}

/// Commit write that creates `tx`; fails if the id already exists.
pub(crate) fn transaction_write(
    client: &FirestoreClient,
    user_id: &str,
    tx: &CreditTransaction,
) -> Write {
    Write::upsert(Document::named(
        client.full_document_name(&transactions_collection(user_id), &tx.id),
        transaction_to_fields(tx),
    ))
    .with_precondition(Precondition::missing())
}

fn transaction_to_fields(tx: &CreditTransaction) -> HashMap<String, Value> {
    Fields::new()
        .set("id", tx.id.as_str())
        .set("user_id", tx.user_id.as_str())
        .set("timestamp", tx.timestamp)
        .set("kind", tx.kind.as_str())
        .set("feature", tx.feature.as_str())
        .set("operation_type", tx.operation_type.as_str())
        .set("credits_amount", tx.credits_amount)
        .set("quantity", tx.quantity)
        .set("balance_after", tx.balance_after)
        .set_opt("short_id", tx.short_id.as_deref())
        .set_opt("scene_id", tx.scene_id.as_deref())
        .set_opt("details", tx.details.as_deref())
        .set_opt("reason", tx.reason.as_deref())
        .set("created_at", tx.created_at)
        .into_inner()
}

fn document_to_transaction(doc: &Document, tx_id: &str) -> FirestoreResult<CreditTransaction> {
    let feature_str: String = doc.get("feature").unwrap_or_default();
    let feature: FeatureKey = feature_str.parse().map_err(|_| {
        FirestoreError::invalid_response(format!(
            "Transaction {} has unknown feature '{}'",
            tx_id, feature_str
        ))
    })?;

    let kind = doc
        .get::<String>("kind")
        .and_then(|k| TransactionKind::from_str(&k))
        .unwrap_or(TransactionKind::Deduction);

    let credits_amount: Credits = doc.get("credits_amount").unwrap_or_default();
    let balance_after: Credits = doc.get("balance_after").unwrap_or_default();
    let timestamp = doc.get("timestamp").unwrap_or_else(chrono::Utc::now);

    let mut tx = CreditTransaction::new(
        doc.get::<String>("user_id").unwrap_or_default(),
        kind,
        feature,
        credits_amount,
        doc.get("quantity").unwrap_or(1),
        balance_after,
    );
    tx.id = tx_id.to_string();
    tx.timestamp = timestamp;
    tx.created_at = doc.get("created_at").unwrap_or(timestamp);
    tx.short_id = doc.get("short_id");
    tx.scene_id = doc.get("scene_id");
    tx.details = doc.get("details");
    tx.reason = doc.get("reason");
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToFirestoreValue;
    use reel_models::ChargeContext;

    #[test]
    fn test_transaction_fields_round_trip() {
        let ctx = ChargeContext::new()
            .with_short_id("sh1")
            .with_scene_id("sc2")
            .with_details("rewrite the opening");
        let tx = CreditTransaction::new(
            "u1",
            TransactionKind::Refund,
            FeatureKey::SceneRegeneration,
            Credits::from_hundredths(50),
            1,
            Credits::whole(5),
        )
        .with_context(&ctx)
        .with_reason("generation_failed");

        let doc = Document::new(transaction_to_fields(&tx));
        let parsed = document_to_transaction(&doc, &tx.id).unwrap();

        assert_eq!(parsed.kind, TransactionKind::Refund);
        assert_eq!(parsed.credits_amount, Credits::from_hundredths(50));
        assert_eq!(parsed.balance_after, Credits::whole(5));
        assert_eq!(parsed.scene_id.as_deref(), Some("sc2"));
        assert_eq!(parsed.reason.as_deref(), Some("generation_failed"));
        assert_eq!(parsed.id, tx.id);
    }

    #[test]
    fn test_unknown_feature_is_rejected() {
        let doc = Document::new(Fields::new().set("feature", "upscale").into_inner());
        assert!(document_to_transaction(&doc, "t1").is_err());
    }

    #[test]
    fn test_amounts_stored_as_integers() {
        let tx = CreditTransaction::new(
            "u1",
            TransactionKind::Deduction,
            FeatureKey::ImageGeneration,
            Credits::whole(2),
            1,
            Credits::whole(8),
        );
        let fields = transaction_to_fields(&tx);
        assert_eq!(
            fields.get("credits_amount"),
            Some(&Value::IntegerValue("200".into()))
        );
        assert_eq!(
            fields.get("kind"),
            Some(&"deduction".to_firestore_value())
        );
    }
}
