//! Core TrackLookup trait

use async_trait::async_trait;

use crate::{RemoteTrack, Result};

/// Catalog lookups as seen by the comparison loop.
///
/// Implemented by [`CatalogClient`](crate::CatalogClient); tests substitute
/// scripted implementations.
#[async_trait]
pub trait TrackLookup: Send + Sync {
    /// Candidate tracks for `(title, artist, album)`.
    ///
    /// Lookup failures reduce to an empty list; only
    /// [`AuthenticationRequired`](crate::TrackcheckError::AuthenticationRequired)
    /// is returned as an error.
    async fn search_track(
        &self,
        title: &str,
        artist: &str,
        album: &str,
        cache_only: bool,
    ) -> Result<Vec<RemoteTrack>>;

    /// Best candidate above the match threshold, if any.
    fn find_best_match(
        &self,
        candidates: &[RemoteTrack],
        title: &str,
        artist: &str,
        album: &str,
    ) -> Option<RemoteTrack>;
}
