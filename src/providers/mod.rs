//! Remote catalog access.
//!
//! - [`retry`]: [`RetryingFetcher`], backoff around every HTTP call.
//! - [`auth`]: bearer credential providers.
//! - [`strategy`]: which queries a search runs, in which order.
//! - [`catalog`]: [`CatalogClient`], cache-first search and lookup by id.

pub mod auth;
pub mod catalog;
pub mod retry;
pub mod strategy;

pub use auth::{AuthProvider, ClientCredentialsAuth, DEFAULT_TOKEN_URL, NoAuth, StaticTokenAuth};
pub use catalog::{CatalogClient, DEFAULT_BASE_URL, extract_track_id};
pub use retry::{RetryConfig, RetryingFetcher};
pub use strategy::{PlannedQuery, SearchStrategy};
