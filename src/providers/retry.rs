//! Retry configuration, delay calculation, and the retrying HTTP fetcher.
//!
//! [`RetryingFetcher`] is a pure resilience wrapper around `reqwest`: it
//! retries HTTP 429 responses and network-level failures with exponential
//! backoff plus jitter, and passes every other response through unchanged.
//! It does no caching and knows nothing about the catalog.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use tracing::{error, warn};

use crate::telemetry;
use crate::{Result, TrackcheckError};

/// Configuration for retry behaviour.
///
/// Delay before retry `n` (0-indexed) is `min(initial_delay * 2^n, max_delay)`
/// unless the server sent `Retry-After`, plus uniform jitter in `[0, jitter)`.
///
/// ```rust
/// # use trackcheck::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_retries(5)
///     .initial_delay(Duration::from_millis(200))
///     .jitter(Duration::ZERO);
/// assert_eq!(config.delay_for_attempt(2), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial request. 0 = no retry. Default: 3.
    pub max_retries: u32,
    /// Base delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 60s.
    pub max_delay: Duration,
    /// Upper bound (exclusive) of random jitter added to each delay. Default: 500ms.
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries after the initial request.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the jitter bound. `Duration::ZERO` disables jitter.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Check the delays are consistent.
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay > self.max_delay {
            return Err(TrackcheckError::Configuration(format!(
                "retry initial_delay ({:?}) exceeds max_delay ({:?})",
                self.initial_delay, self.max_delay
            )));
        }
        Ok(())
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Uses exponential backoff: `initial_delay * 2^attempt`, capped at `max_delay`.
    /// Does NOT include jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Calculate the effective delay, respecting a server `Retry-After` hint.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }

    /// Sample jitter uniformly from `[0, jitter)`.
    pub fn sample_jitter(&self) -> Duration {
        let bound = self.jitter.as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(fastrand::u64(0..bound))
    }
}

/// Parse a `Retry-After` header given in whole seconds.
pub(crate) fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Whether a reqwest error happened below HTTP (connect, timeout, transport).
fn is_network_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request()
}

/// HTTP client wrapper that retries rate limits and network failures.
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    http: reqwest::Client,
    config: RetryConfig,
}

impl RetryingFetcher {
    pub fn new(http: reqwest::Client, config: RetryConfig) -> Self {
        Self { http, config }
    }

    /// The underlying client, for building requests.
    pub fn client(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `request`, retrying 429s and network failures up to
    /// `max_retries` times.
    ///
    /// After the last retry a 429 response is returned as-is (callers treat
    /// it as a failure) and a network failure becomes [`TrackcheckError::Http`].
    /// Requests with a streaming body cannot be retried and are sent once.
    pub async fn fetch(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let url = request.url().clone();
        let mut pending = Some(request);
        let mut retry_count: u32 = 0;

        loop {
            let Some(current) = pending.take() else {
                return Err(TrackcheckError::Http(format!("request to {url} could not be retried")));
            };
            pending = current.try_clone();

            match self.http.execute(current).await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if retry_count >= self.config.max_retries || pending.is_none() {
                        error!(
                            url = %url,
                            retries = retry_count,
                            "rate limited, giving up"
                        );
                        return Ok(response);
                    }
                    let hint = retry_after(&response);
                    let delay = self.config.effective_delay(retry_count, hint) + self.config.sample_jitter();
                    warn!(
                        url = %url,
                        attempt = retry_count + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        retry_after_s = hint.map(|d| d.as_secs()),
                        "rate limited, retrying"
                    );
                    metrics::counter!(telemetry::RETRIES_TOTAL, "reason" => "rate_limited").increment(1);
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Ok(response) => return Ok(response),
                Err(e) if is_network_error(&e) => {
                    if retry_count >= self.config.max_retries || pending.is_none() {
                        error!(
                            url = %url,
                            retries = retry_count,
                            error = %e,
                            "network failure, giving up"
                        );
                        return Err(TrackcheckError::Http(e.to_string()));
                    }
                    let delay = self.config.delay_for_attempt(retry_count) + self.config.sample_jitter();
                    warn!(
                        url = %url,
                        attempt = retry_count + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "network failure, retrying"
                    );
                    metrics::counter!(telemetry::RETRIES_TOTAL, "reason" => "network").increment(1);
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(TrackcheckError::Http(e.to_string())),
            }
        }
    }
}
