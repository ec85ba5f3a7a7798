//! Credit transaction data models.
//!
//! Every balance mutation appends one transaction: a deduction when an AI
//! operation is charged, a refund when the operation it paid for failed.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credits::Credits;
use crate::feature::FeatureKey;

/// Type of credit operation recorded for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CreditOperationType {
    /// Full script generation
    ScriptGeneration,
    /// Rewriting a single scene
    SceneRegeneration,
    /// Scene image rendering
    ImageGeneration,
    /// Scene video rendering
    VideoGeneration,
    /// Manual admin adjustment
    AdminAdjustment,
}

impl CreditOperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScriptGeneration => "script_generation",
            Self::SceneRegeneration => "scene_regeneration",
            Self::ImageGeneration => "image_generation",
            Self::VideoGeneration => "video_generation",
            Self::AdminAdjustment => "admin_adjustment",
        }
    }

    /// Returns a human-readable label for the operation type.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ScriptGeneration => "Script Generation",
            Self::SceneRegeneration => "Scene Regeneration",
            Self::ImageGeneration => "Image Generation",
            Self::VideoGeneration => "Video Generation",
            Self::AdminAdjustment => "Admin Adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "script_generation" => Some(Self::ScriptGeneration),
            "scene_regeneration" => Some(Self::SceneRegeneration),
            "image_generation" => Some(Self::ImageGeneration),
            "video_generation" => Some(Self::VideoGeneration),
            "admin_adjustment" => Some(Self::AdminAdjustment),
            _ => None,
        }
    }
}

/// Direction of a balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deduction,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deduction => "deduction",
            TransactionKind::Refund => "refund",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deduction" => Some(TransactionKind::Deduction),
            "refund" => Some(TransactionKind::Refund),
            _ => None,
        }
    }
}

/// Maximum length of the `details` text kept on a transaction.
pub const MAX_DETAILS_LEN: usize = 200;

/// A credit transaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreditTransaction {
    /// Unique identifier for this transaction (UUID)
    pub id: String,

    /// User whose balance moved
    pub user_id: String,

    /// When the transaction occurred
    pub timestamp: DateTime<Utc>,

    pub kind: TransactionKind,

    /// Feature the credits were charged for
    pub feature: FeatureKey,

    pub operation_type: CreditOperationType,

    /// Credits moved (always positive; `kind` gives the direction)
    pub credits_amount: Credits,

    /// Units charged (scenes, scripts)
    pub quantity: u32,

    /// Balance after this transaction
    pub balance_after: Credits,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,

    /// Truncated prompt or operation description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Why credits were returned (refunds only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Create a new transaction for `feature`.
    pub fn new(
        user_id: impl Into<String>,
        kind: TransactionKind,
        feature: FeatureKey,
        credits_amount: Credits,
        quantity: u32,
        balance_after: Credits,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            timestamp: now,
            kind,
            feature,
            operation_type: feature.operation_type(),
            credits_amount,
            quantity,
            balance_after,
            short_id: None,
            scene_id: None,
            details: None,
            reason: None,
            created_at: now,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Copy short, scene and details from a charge context.
    pub fn with_context(mut self, ctx: &ChargeContext) -> Self {
        self.short_id = ctx.short_id.clone();
        self.scene_id = ctx.scene_id.clone();
        self.details = ctx.details.clone();
        self
    }

    pub fn is_refund(&self) -> bool {
        self.kind == TransactionKind::Refund
    }
}

/// Context for recording a credit transaction.
///
/// Passed alongside deduct and refund requests to capture what the credits
/// are being used for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChargeContext {
    pub short_id: Option<String>,
    pub scene_id: Option<String>,
    pub details: Option<String>,
}

impl ChargeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_short_id(mut self, short_id: impl Into<String>) -> Self {
        self.short_id = Some(short_id.into());
        self
    }

    pub fn with_scene_id(mut self, scene_id: impl Into<String>) -> Self {
        self.scene_id = Some(scene_id.into());
        self
    }

    /// Set details, truncated to [`MAX_DETAILS_LEN`] characters.
    pub fn with_details(mut self, details: impl AsRef<str>) -> Self {
        self.details = Some(truncate_chars(details.as_ref(), MAX_DETAILS_LEN));
        self
    }

    /// Set details if Some, otherwise no-op.
    pub fn with_optional_details(self, details: Option<&str>) -> Self {
        match details {
            Some(d) => self.with_details(d),
            None => self,
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction_derives_operation_type() {
        let tx = CreditTransaction::new(
            "user-1",
            TransactionKind::Deduction,
            FeatureKey::SceneRegeneration,
            Credits::from_hundredths(50),
            1,
            Credits::from_hundredths(450),
        );
        assert_eq!(tx.operation_type, CreditOperationType::SceneRegeneration);
        assert!(tx.reason.is_none());
        assert!(!tx.is_refund());
    }

    #[test]
    fn test_context_details_truncated() {
        let long = "é".repeat(MAX_DETAILS_LEN + 50);
        let ctx = ChargeContext::new().with_short_id("s1").with_details(&long);
        assert_eq!(ctx.details.as_ref().unwrap().chars().count(), MAX_DETAILS_LEN);

        let tx = CreditTransaction::new(
            "u",
            TransactionKind::Refund,
            FeatureKey::ImageGeneration,
            Credits::whole(2),
            1,
            Credits::whole(10),
        )
        .with_context(&ctx)
        .with_reason("generation_failed");
        assert_eq!(tx.short_id.as_deref(), Some("s1"));
        assert_eq!(tx.reason.as_deref(), Some("generation_failed"));
    }

    #[test]
    fn test_serialized_shape() {
        let tx = CreditTransaction::new(
            "u",
            TransactionKind::Deduction,
            FeatureKey::VideoGeneration,
            Credits::whole(5),
            1,
            Credits::whole(5),
        );
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["kind"], "deduction");
        assert_eq!(json["feature"], "video_generation");
        assert_eq!(json["credits_amount"], 5.0);
        assert!(json.get("reason").is_none());
    }
}
