//! API configuration.

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second, per client IP
    pub rate_limit_rps: u32,
    /// Rate limit burst
    pub rate_limit_burst: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Firebase project whose ID tokens are accepted
    pub firebase_project_id: String,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            max_body_size: 1024 * 1024, // 1MB
            firebase_project_id: String::new(),
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            firebase_project_id: std::env::var("FIREBASE_PROJECT_ID")
                .or_else(|_| std::env::var("GCP_PROJECT_ID"))
                .unwrap_or_default(),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("API_PORT", "9100");
        std::env::set_var("CORS_ORIGINS", "https://reel.app, https://admin.reel.app,");
        std::env::set_var("RATE_LIMIT_RPS", "not-a-number");

        let config = ApiConfig::from_env();
        assert_eq!(config.port, 9100);
        assert_eq!(
            config.cors_origins,
            vec!["https://reel.app".to_string(), "https://admin.reel.app".to_string()]
        );
        assert_eq!(config.rate_limit_rps, 10);

        std::env::remove_var("API_PORT");
        std::env::remove_var("CORS_ORIGINS");
        std::env::remove_var("RATE_LIMIT_RPS");
    }

    #[test]
    #[serial]
    fn test_production_flag() {
        std::env::set_var("ENVIRONMENT", "Production");
        assert!(ApiConfig::from_env().is_production());
        std::env::remove_var("ENVIRONMENT");
        assert!(!ApiConfig::from_env().is_production());
    }
}
