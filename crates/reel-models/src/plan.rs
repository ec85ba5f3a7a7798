//! Plan tiers and their starting credit allowance.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::credits::Credits;

/// Plan tier enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Studio,
}

impl PlanTier {
    /// Parse from string (case-insensitive). Unknown plans fall back to free.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pro" => PlanTier::Pro,
            "studio" => PlanTier::Studio,
            _ => PlanTier::Free,
        }
    }

    /// Balance seeded when a user's credit record is first created.
    pub fn initial_credits(&self) -> Credits {
        match self {
            PlanTier::Free => Credits::whole(10),
            PlanTier::Pro => Credits::whole(200),
            PlanTier::Studio => Credits::whole(1000),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Studio => "studio",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
