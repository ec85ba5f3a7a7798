//! Shared data models for the Reel backend.
//!
//! This crate provides Serde-serializable types for:
//! - Shorts, scenes and the generation status machine
//! - Credit amounts, the feature cost table and credit transactions
//! - Plan tiers
//! - AI model catalog entries

pub mod credit_transaction;
pub mod credits;
pub mod feature;
pub mod model_catalog;
pub mod plan;
pub mod scene;
pub mod short;

pub use credit_transaction::{
    ChargeContext, CreditOperationType, CreditTransaction, TransactionKind,
};
pub use credits::Credits;
pub use feature::{FeatureKey, UnknownFeature};
pub use model_catalog::{is_free_tier_model, ModelCapability, ModelInfo, ModelProvider};
pub use plan::PlanTier;
pub use scene::{
    clamp_duration, AddSceneInput, RegenerateImageInput, Scene, SceneDraft, SceneId, ScenePatch,
    DEFAULT_SCENE_DURATION_SECS,
};
pub use short::{CreateShortInput, InvalidTransition, Short, ShortId, ShortStatus};
