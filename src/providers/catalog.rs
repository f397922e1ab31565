//! Catalog client: cache-first, multi-strategy track search.
//!
//! [`CatalogClient::search_track`] runs this sequence per call:
//!
//! 1. Clean inputs (NFC, drop U+FFFD), build the cache key, return a valid
//!    cached result if there is one.
//! 2. In cache-only mode, return an empty list without touching the network.
//! 3. Without a live credential, fail with [`TrackcheckError::AuthenticationRequired`].
//! 4. Run the planned strategies in order (see [`strategy`](super::strategy)),
//!    stopping at the first non-empty result. A non-ok response counts as
//!    zero results for that strategy.
//! 5. Cache the final result (possibly empty) and return it.
//!
//! Network or decoding failures abort the search: they are logged and an
//! empty list is returned without caching, so a later call can retry.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use tracing::{debug, error, info, warn};
use unicode_normalization::UnicodeNormalization;

use super::auth::AuthProvider;
use super::retry::{self, RetryingFetcher};
use super::strategy::{self, PlannedQuery};
use crate::cache::{CacheStats, CacheStore, ExpiredCounts, search_key};
use crate::matching::MatchEngine;
use crate::telemetry;
use crate::traits::TrackLookup;
use crate::types::RemoteTrack;
use crate::{Result, TrackcheckError};

/// Default catalog API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.spotify.com/v1";

static TRACK_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/track/([a-zA-Z0-9]+)").expect("track url regex"));

/// Extract the track id from a catalog track URL
/// (`https://open.spotify.com/track/<id>?si=...`).
pub fn extract_track_id(url: &str) -> Option<&str> {
    TRACK_URL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// NFC and strip replacement characters left by broken tag decoding.
fn clean_input(s: &str) -> String {
    s.nfc().filter(|c| *c != '\u{FFFD}').collect()
}

/// Client for the remote catalog, fronted by the local cache.
pub struct CatalogClient {
    fetcher: RetryingFetcher,
    auth: Arc<dyn AuthProvider>,
    cache: CacheStore,
    engine: Arc<MatchEngine>,
    base_url: String,
}

impl CatalogClient {
    /// Assemble a client. Prefer [`Trackcheck::builder()`](crate::Trackcheck::builder).
    pub fn new(
        fetcher: RetryingFetcher,
        auth: Arc<dyn AuthProvider>,
        cache: CacheStore,
        engine: Arc<MatchEngine>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            auth,
            cache,
            engine,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    pub fn fetcher(&self) -> &RetryingFetcher {
        &self.fetcher
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    /// Search the catalog for `(title, artist, album)`. See the module docs.
    pub async fn search_track(
        &self,
        title: &str,
        artist: &str,
        album: &str,
        cache_only: bool,
    ) -> Result<Vec<RemoteTrack>> {
        let title = clean_input(title);
        let artist = clean_input(artist);
        let album = clean_input(album);
        let key = search_key(&title, &artist, &album);

        if let Some(cached) = self.cache.cached_search(&key) {
            info!(title = %title, artist = %artist, album = %album, "using cached search result");
            return Ok(cached);
        }

        if cache_only {
            info!(title = %title, artist = %artist, album = %album, "no cached data (cache-only mode)");
            return Ok(Vec::new());
        }

        let token = self.token()?;

        let mut results = Vec::new();
        for planned in strategy::plan(&title, &artist, &album) {
            debug!(strategy = %planned.strategy, query = %planned.query, "searching catalog");
            match self.run_query(&planned, &token).await {
                Ok(found) => results = found,
                Err(e) => {
                    error!(
                        strategy = %planned.strategy,
                        error = %e,
                        "catalog search failed"
                    );
                    return Ok(Vec::new());
                }
            }
            if !results.is_empty() {
                info!(
                    strategy = %planned.strategy,
                    count = results.len(),
                    "search returned results"
                );
                break;
            }
        }

        if results.is_empty() {
            info!(title = %title, artist = %artist, "search returned no results");
        }
        self.cache.put_search(key, results.clone());
        Ok(results)
    }

    /// Pick the best candidate and cache it when caching is enabled.
    pub fn find_best_match(
        &self,
        candidates: &[RemoteTrack],
        title: &str,
        artist: &str,
        album: &str,
    ) -> Option<RemoteTrack> {
        let best = self.engine.find_best_match(candidates, title, artist, album)?;
        if self.cache.is_enabled() {
            self.cache.put_track(best.track.clone());
        }
        Some(best.track)
    }

    /// Fetch a track by id, cache first.
    ///
    /// Returns `Ok(None)` on a cache-only miss or a 404.
    pub async fn get_track(&self, id: &str, cache_only: bool) -> Result<Option<RemoteTrack>> {
        if let Some(cached) = self.cache.cached_track(id) {
            debug!(id, "using cached track");
            return Ok(Some(cached));
        }
        if cache_only {
            info!(id, "no cached track (cache-only mode)");
            return Ok(None);
        }

        let token = self.token()?;
        let request = self
            .fetcher
            .client()
            .get(format!("{}/tracks/{id}", self.base_url))
            .bearer_auth(&token)
            .build()
            .map_err(|e| TrackcheckError::Http(e.to_string()))?;

        let response = self.fetcher.fetch(request).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            metrics::counter!(telemetry::REQUESTS_TOTAL, "strategy" => "by_id", "status" => "error")
                .increment(1);
            info!(id, "track not found in catalog");
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            metrics::counter!(telemetry::REQUESTS_TOTAL, "strategy" => "by_id", "status" => "error")
                .increment(1);
            return Err(TrackcheckError::RateLimited {
                retry_after: retry::retry_after(&response),
            });
        }
        if !status.is_success() {
            metrics::counter!(telemetry::REQUESTS_TOTAL, "strategy" => "by_id", "status" => "error")
                .increment(1);
            let message = response.text().await.unwrap_or_default();
            return Err(TrackcheckError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let track: RemoteTrack = response
            .json()
            .await
            .map_err(|e| TrackcheckError::Http(format!("failed to decode track {id}: {e}")))?;
        metrics::counter!(telemetry::REQUESTS_TOTAL, "strategy" => "by_id", "status" => "ok")
            .increment(1);
        self.cache.put_track(track.clone());
        Ok(Some(track))
    }

    /// Fetch a track from a catalog URL.
    pub async fn get_track_from_url(&self, url: &str, cache_only: bool) -> Result<Option<RemoteTrack>> {
        let id = extract_track_id(url).ok_or_else(|| {
            TrackcheckError::InvalidInput(format!(
                "invalid track URL {url:?}, expected https://open.spotify.com/track/<id>"
            ))
        })?;
        self.get_track(id, cache_only).await
    }

    pub fn has_cached_data(&self) -> bool {
        self.cache.has_cached_data()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cleanup_cache(&self) -> ExpiredCounts {
        self.cache.cleanup_expired()
    }

    /// Persist pending cache writes now.
    pub fn flush_cache(&self) {
        self.cache.flush();
    }

    fn token(&self) -> Result<String> {
        if !self.auth.is_authenticated() {
            return Err(TrackcheckError::AuthenticationRequired);
        }
        self.auth
            .bearer_token()
            .ok_or(TrackcheckError::AuthenticationRequired)
    }

    /// Run one strategy. Non-ok statuses give zero results; network and
    /// decoding failures are errors.
    async fn run_query(&self, planned: &PlannedQuery, token: &str) -> Result<Vec<RemoteTrack>> {
        let limit = planned.limit.to_string();
        let request = self
            .fetcher
            .client()
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", planned.query.as_str()),
                ("type", "track"),
                ("limit", limit.as_str()),
            ])
            .bearer_auth(token)
            .build()
            .map_err(|e| TrackcheckError::Http(e.to_string()))?;

        let response = self.fetcher.fetch(request).await?;
        let status = response.status();
        if !status.is_success() {
            warn!(
                strategy = %planned.strategy,
                status = status.as_u16(),
                "search request failed"
            );
            metrics::counter!(telemetry::REQUESTS_TOTAL,
                "strategy" => planned.strategy.as_str(),
                "status" => "error",
            )
            .increment(1);
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TrackcheckError::Http(format!("failed to decode search response: {e}")))?;
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "strategy" => planned.strategy.as_str(),
            "status" => "ok",
        )
        .increment(1);

        Ok(parse_items(&body))
    }
}

/// Tracks from `tracks.items`, skipping records without the required fields.
fn parse_items(body: &serde_json::Value) -> Vec<RemoteTrack> {
    let Some(items) = body.pointer("/tracks/items").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<RemoteTrack>(item.clone()) {
            Ok(track) => Some(track),
            Err(e) => {
                warn!(error = %e, "skipping malformed catalog record");
                None
            }
        })
        .collect()
}

#[async_trait]
impl TrackLookup for CatalogClient {
    async fn search_track(
        &self,
        title: &str,
        artist: &str,
        album: &str,
        cache_only: bool,
    ) -> Result<Vec<RemoteTrack>> {
        CatalogClient::search_track(self, title, artist, album, cache_only).await
    }

    fn find_best_match(
        &self,
        candidates: &[RemoteTrack],
        title: &str,
        artist: &str,
        album: &str,
    ) -> Option<RemoteTrack> {
        CatalogClient::find_best_match(self, candidates, title, artist, album)
    }
}
