//! Builder for configuring catalog clients

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheConfig, CacheStore, Clock, KeyValueStorage, MemoryStorage, SystemClock};
use crate::config::Config;
use crate::matching::{DEFAULT_MATCH_THRESHOLD, MatchEngine};
use crate::providers::{
    AuthProvider, CatalogClient, DEFAULT_BASE_URL, NoAuth, RetryConfig, RetryingFetcher,
    StaticTokenAuth,
};
use crate::{Result, TrackcheckError};

/// Main entry point for creating catalog clients.
pub struct Trackcheck;

impl Trackcheck {
    /// Create a new builder for configuring the client.
    pub fn builder() -> TrackcheckBuilder {
        TrackcheckBuilder::new()
    }
}

/// Builder for configuring catalog clients.
pub struct TrackcheckBuilder {
    base_url: Option<String>,
    auth: Option<Arc<dyn AuthProvider>>,
    storage: Option<Arc<dyn KeyValueStorage>>,
    clock: Option<Arc<dyn Clock>>,
    cache: CacheConfig,
    retry: RetryConfig,
    threshold: f64,
    default_timeout_secs: Option<u64>,
    http_client: Option<reqwest::Client>,
}

impl Default for TrackcheckBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackcheckBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            auth: None,
            storage: None,
            clock: None,
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            threshold: DEFAULT_MATCH_THRESHOLD,
            default_timeout_secs: None,
            http_client: None,
        }
    }

    /// Apply the `[api]`, `[matching]`, `[cache]` and `[retry]` sections.
    pub fn config(mut self, config: &Config) -> Self {
        self.base_url = Some(config.api.base_url.clone());
        self.default_timeout_secs = Some(config.api.timeout_secs);
        self.threshold = config.matching.threshold;
        self.cache = config.cache_config();
        self.retry = config.retry_config();
        self
    }

    /// Catalog API base URL (e.g. a mock server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Credential source. Without one, lookups are cache-only.
    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Shorthand for a non-expiring [`StaticTokenAuth`].
    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.auth(Arc::new(StaticTokenAuth::new(token)))
    }

    /// Durable storage for the cache. Defaults to an in-memory store.
    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Time source for cache timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Minimum composite score for a match.
    pub fn match_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set default timeout for all requests (seconds).
    pub fn timeout(mut self, secs: u64) -> Self {
        self.default_timeout_secs = Some(secs);
        self
    }

    /// Use a preconfigured HTTP client. Overrides [`timeout`](Self::timeout).
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<CatalogClient> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(TrackcheckError::Configuration(format!(
                "match threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        self.cache.validate()?;
        self.retry.validate()?;

        // =====================================================================
        // HTTP layer
        // =====================================================================

        let http = match self.http_client {
            Some(client) => client,
            None => {
                let timeout_secs = self.default_timeout_secs.unwrap_or(30);
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(timeout_secs))
                    .build()
                    .map_err(|e| TrackcheckError::Configuration(format!("HTTP client: {e}")))?
            }
        };
        let fetcher = RetryingFetcher::new(http, self.retry);

        // =====================================================================
        // Cache and matching
        // =====================================================================

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::unbounded()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let cache = CacheStore::with_clock(self.cache, storage, clock)?;
        let engine = Arc::new(MatchEngine::new(self.threshold));

        let auth = self.auth.unwrap_or_else(|| Arc::new(NoAuth));
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(CatalogClient::new(fetcher, auth, cache, engine, base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_unauthenticated_client() {
        let client = Trackcheck::builder().build().unwrap();
        assert!(!client.is_authenticated());
        assert_eq!(client.engine().threshold(), DEFAULT_MATCH_THRESHOLD);
        assert!(client.cache().is_enabled());
    }

    #[test]
    fn bearer_token_authenticates() {
        let client = Trackcheck::builder().bearer_token("tok").build().unwrap();
        assert!(client.is_authenticated());
    }

    #[test]
    fn rejects_invalid_threshold() {
        assert!(Trackcheck::builder().match_threshold(1.2).build().is_err());
        assert!(Trackcheck::builder().match_threshold(-0.1).build().is_err());
    }

    #[test]
    fn rejects_invalid_retry() {
        let retry = RetryConfig::new()
            .initial_delay(Duration::from_secs(5))
            .max_delay(Duration::from_secs(1));
        assert!(Trackcheck::builder().retry(retry).build().is_err());
    }

    #[test]
    fn applies_config_sections() {
        let config = Config::from_toml_str("[matching]\nthreshold = 0.5\n[cache]\nenabled = false\n").unwrap();
        let client = Trackcheck::builder().config(&config).build().unwrap();
        assert_eq!(client.engine().threshold(), 0.5);
        assert!(!client.cache().is_enabled());
    }
}
