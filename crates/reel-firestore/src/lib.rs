//! Firestore REST API client.
//!
//! This crate provides:
//! - A REST client with token caching, read retries and atomic commits
//! - Typed repositories for shorts, scenes and default model settings
//! - Credit balance compare-and-set with a transaction audit trail
//! - Service account authentication via gcp_auth, or the local emulator

pub mod client;
pub mod credit_balance_repo;
pub mod credit_transaction_repo;
pub mod error;
pub mod metrics;
pub mod model_config_repo;
pub mod retry;
pub mod scene_repo;
pub mod short_repo;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use credit_balance_repo::{CreditBalanceRepository, DebitResult};
pub use credit_transaction_repo::CreditTransactionRepository;
pub use error::{FirestoreError, FirestoreResult};
pub use model_config_repo::ModelConfigRepository;
pub use retry::RetryConfig;
pub use scene_repo::SceneRepository;
pub use short_repo::{ShortRepository, VersionedShort};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
