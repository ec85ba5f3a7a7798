//! Pipeline configuration.

use std::time::Duration;

use tracing::warn;
use url::Url;

/// Which persistence backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local maps; for local runs and tests.
    Memory,
}

impl StoreBackend {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => StoreBackend::Memory,
            _ => StoreBackend::Firestore,
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub store_backend: StoreBackend,
    /// How long admin model overrides are served from cache.
    pub defaults_ttl: Duration,
    /// How long provider model catalogs are served from cache.
    pub catalog_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Firestore,
            defaults_ttl: Duration::from_secs(300),
            catalog_ttl: Duration::from_secs(3600),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_backend: std::env::var("STORE_BACKEND")
                .map(|s| StoreBackend::from_str(&s))
                .unwrap_or(defaults.store_backend),
            defaults_ttl: env_duration_secs("MODEL_DEFAULTS_TTL_SECS", defaults.defaults_ttl),
            catalog_ttl: env_duration_secs("MODEL_CATALOG_TTL_SECS", defaults.catalog_ttl),
        }
    }
}

/// Read a whole number of seconds from `key`, falling back to `default`.
pub(crate) fn env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Read a base URL from `key`, ignoring values that do not parse.
///
/// A trailing slash is removed so callers can append paths with `/`.
pub(crate) fn validated_base_url(key: &str, default: &str) -> String {
    let Ok(raw) = std::env::var(key) else {
        return default.to_string();
    };
    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            url.as_str().trim_end_matches('/').to_string()
        }
        _ => {
            warn!(var = key, value = %raw, "Ignoring invalid base URL");
            default.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!(StoreBackend::from_str("memory"), StoreBackend::Memory);
        assert_eq!(StoreBackend::from_str(" Memory "), StoreBackend::Memory);
        assert_eq!(StoreBackend::from_str("firestore"), StoreBackend::Firestore);
        assert_eq!(StoreBackend::from_str(""), StoreBackend::Firestore);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("STORE_BACKEND", "memory");
        std::env::set_var("MODEL_DEFAULTS_TTL_SECS", "10");
        std::env::remove_var("MODEL_CATALOG_TTL_SECS");

        let config = PipelineConfig::from_env();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.defaults_ttl, Duration::from_secs(10));
        assert_eq!(config.catalog_ttl, Duration::from_secs(3600));

        std::env::remove_var("STORE_BACKEND");
        std::env::remove_var("MODEL_DEFAULTS_TTL_SECS");
    }

    #[test]
    #[serial]
    fn test_invalid_base_url_falls_back() {
        std::env::set_var("REEL_TEST_BASE_URL", "not a url");
        assert_eq!(
            validated_base_url("REEL_TEST_BASE_URL", "https://fal.run"),
            "https://fal.run"
        );

        std::env::set_var("REEL_TEST_BASE_URL", "http://localhost:8089/");
        assert_eq!(
            validated_base_url("REEL_TEST_BASE_URL", "https://fal.run"),
            "http://localhost:8089"
        );
        std::env::remove_var("REEL_TEST_BASE_URL");
    }
}
