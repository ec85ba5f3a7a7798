//! Request handlers.

pub mod admin;
pub mod credits;
pub mod health;
pub mod scenes;
pub mod shorts;

pub use health::{health, ready};
