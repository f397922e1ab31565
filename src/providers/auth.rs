//! Bearer credential providers for the catalog API.
//!
//! The catalog client only reads credentials: [`AuthProvider::is_authenticated`]
//! gates live lookups and [`AuthProvider::bearer_token`] is attached to each
//! request. Obtaining or refreshing a token is up to the provider.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::{info, warn};

use super::retry::RetryingFetcher;
use crate::{Result, TrackcheckError};

/// Default token endpoint for the client-credentials flow.
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Source of bearer credentials.
pub trait AuthProvider: Send + Sync {
    /// Whether a non-expired credential is held.
    fn is_authenticated(&self) -> bool;

    /// The bearer token, only while [`is_authenticated`](Self::is_authenticated) is true.
    fn bearer_token(&self) -> Option<String>;
}

/// Never authenticated. Lookups can only be served from cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn is_authenticated(&self) -> bool {
        false
    }

    fn bearer_token(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
struct Token {
    access_token: String,
    expires_at: Option<Instant>,
}

impl Token {
    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// A fixed token, optionally with a lifetime.
#[derive(Debug, Clone)]
pub struct StaticTokenAuth {
    token: Token,
}

impl StaticTokenAuth {
    /// A token that never expires.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Token {
                access_token: token.into(),
                expires_at: None,
            },
        }
    }

    /// A token valid for `lifetime` from now.
    pub fn expiring_in(token: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            token: Token {
                access_token: token.into(),
                expires_at: Some(Instant::now() + lifetime),
            },
        }
    }
}

impl AuthProvider for StaticTokenAuth {
    fn is_authenticated(&self) -> bool {
        !self.token.access_token.is_empty() && self.token.is_live()
    }

    fn bearer_token(&self) -> Option<String> {
        self.is_authenticated().then(|| self.token.access_token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth client-credentials flow.
///
/// Call [`authenticate`](Self::authenticate) before lookups and again once
/// [`is_authenticated`](AuthProvider::is_authenticated) turns false.
pub struct ClientCredentialsAuth {
    client_id: String,
    client_secret: String,
    token_url: String,
    token: RwLock<Option<Token>>,
}

impl ClientCredentialsAuth {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            token: RwLock::new(None),
        }
    }

    /// Use a different token endpoint (e.g. a mock server).
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Request a fresh access token.
    ///
    /// A non-success status becomes [`TrackcheckError::AuthenticationFailed`].
    pub async fn authenticate(&self, fetcher: &RetryingFetcher) -> Result<()> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(TrackcheckError::AuthenticationFailed(
                "client id and secret are required".into(),
            ));
        }

        let request = fetcher
            .client()
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .build()
            .map_err(|e| TrackcheckError::Http(e.to_string()))?;

        let response = fetcher.fetch(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "token request rejected");
            return Err(TrackcheckError::AuthenticationFailed(format!(
                "{} {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| TrackcheckError::AuthenticationFailed(format!("invalid token response: {e}")))?;

        let expires_at = body.expires_in.map(|secs| Instant::now() + Duration::from_secs(secs));
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(Token {
            access_token: body.access_token,
            expires_at,
        });
        info!(expires_in_s = body.expires_in, "authenticated with catalog");
        Ok(())
    }

    /// Drop the held token.
    pub fn logout(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn live_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|token| token.is_live())
            .map(|token| token.access_token.clone())
    }
}

impl AuthProvider for ClientCredentialsAuth {
    fn is_authenticated(&self) -> bool {
        self.live_token().is_some()
    }

    fn bearer_token(&self) -> Option<String> {
        self.live_token()
    }
}
