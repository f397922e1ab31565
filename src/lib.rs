//! Trackcheck - match local audio files against a remote music catalog
//!
//! This crate resolves local track metadata (title, artist, album) to
//! catalog tracks through fuzzy, CJK-aware matching, caches lookups durably
//! under a storage quota, and flags files whose duration differs from the
//! catalog version.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trackcheck::{LocalTrack, TrackComparator, Trackcheck};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> trackcheck::Result<()> {
//!     let client = Trackcheck::builder()
//!         .bearer_token("your-access-token")
//!         .build()?;
//!
//!     let comparator = TrackComparator::new(Arc::new(client));
//!     let tracks = vec![LocalTrack::new(
//!         "bohemian.mp3",
//!         "Bohemian Rhapsody",
//!         "Queen",
//!         Some("A Night at the Opera".into()),
//!         354_000,
//!     )];
//!
//!     let summary = comparator.compare_all(&tracks, &CancellationToken::new()).await?;
//!     for row in &summary.results {
//!         println!("{}: {}", row.file_name, row.status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod compare;
pub mod config;
pub mod error;
pub mod gateway;
pub mod matching;
pub mod providers;
pub mod telemetry;
pub mod traits;
pub mod types;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheStats, CacheStore, FileStorage, KeyValueStorage, MemoryStorage};
pub use compare::TrackComparator;
pub use config::{Config, Secrets};
pub use error::{Result, TrackcheckError};
pub use gateway::{Trackcheck, TrackcheckBuilder};
pub use matching::{MatchEngine, SimilarityScorer};
pub use providers::{
    AuthProvider, CatalogClient, ClientCredentialsAuth, NoAuth, RetryConfig, RetryingFetcher,
    StaticTokenAuth,
};
pub use traits::TrackLookup;

// Re-export all types
pub use types::{
    AlbumRef, ArtistRef, ComparisonStatus, ComparisonSummary, LocalTrack, MatchResult,
    RemoteTrack, ScoreBreakdown, TrackComparison,
};
