//! Token caching for Firestore authentication.
//!
//! Tokens are refreshed a minute before expiry behind a write lock, so only
//! one task hits the token endpoint at a time. A refresh failure falls back
//! to the cached token while it is still usable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh margin: refresh token 60 seconds before expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Conservative token TTL when expiry is unknown (50 minutes).
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore/Datastore access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Bearer token the Firestore emulator accepts as a privileged caller.
pub const EMULATOR_TOKEN: &str = "owner";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Where access tokens come from.
#[derive(Clone)]
pub enum TokenSource {
    /// Service-account tokens from `gcp_auth`.
    Provider(Arc<dyn TokenProvider>),
    /// A fixed token (the emulator, tests).
    Static(String),
}

/// Thread-safe token cache with single-flight refresh.
pub struct TokenCache {
    source: TokenSource,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(source: TokenSource) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
        }
    }

    /// Cache that always hands out the emulator token.
    pub fn emulator() -> Self {
        Self::new(TokenSource::Static(EMULATOR_TOKEN.to_string()))
    }

    /// Invalidate the cached token.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        let auth = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Provider(auth) => auth,
        };

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = cache.as_ref() {
            if cached.is_valid() {
                return Ok(cached.access_token.clone());
            }
        }

        Self::refresh_token(auth.as_ref(), &mut cache).await
    }

    async fn refresh_token(
        auth: &dyn TokenProvider,
        cache: &mut Option<CachedToken>,
    ) -> FirestoreResult<String> {
        match auth.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let access_token = token.as_str().to_string();

                let now = Utc::now();
                let exp = token.expires_at();
                let expires_at = if exp > now {
                    match (exp - now).to_std() {
                        Ok(ttl) => Instant::now() + ttl,
                        Err(_) => Instant::now() + TOKEN_DEFAULT_TTL,
                    }
                } else {
                    // Already expired: force a refresh on the next request.
                    Instant::now()
                };

                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });

                debug!("Refreshed Firestore auth token");
                Ok(access_token)
            }
            Err(e) => {
                if let Some(cached) = cache.as_ref() {
                    if cached.is_usable() {
                        warn!("Token refresh failed, using existing token: {}", e);
                        return Ok(cached.access_token.clone());
                    }
                }

                Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(TOKEN_REFRESH_MARGIN, Duration::from_secs(60));
        assert!(FIRESTORE_SCOPE.contains("datastore"));
    }

    #[tokio::test]
    async fn test_static_source_survives_invalidate() {
        let cache = TokenCache::emulator();
        assert_eq!(cache.get_token().await.unwrap(), EMULATOR_TOKEN);
        cache.invalidate().await;
        assert_eq!(cache.get_token().await.unwrap(), EMULATOR_TOKEN);
    }
}
