//! Short generation pipeline.
//!
//! This crate provides:
//! - The orchestrator that drives a short from draft to published
//! - The credit ledger (validate, deduct, refund)
//! - The model resolver with cached admin defaults and provider catalogs
//! - Generation adapters for OpenRouter and fal.ai
//! - Firestore and in-memory storage backends

pub mod adapters;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod ordering;
pub mod orchestrator;
pub mod prompts;
pub mod resolver;
pub mod store;


pub use adapters::{AdapterError, AdapterErrorKind};
pub use config::{PipelineConfig, StoreBackend};
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use ledger::{Charge, CreditLedger};
pub use orchestrator::{Adapters, MediaReport, Pipeline, SceneFailure, ShortDetail};
pub use resolver::{DefaultModel, ModelResolver};
pub use store::{FirestoreStore, MemoryStore, TransactionPage};
