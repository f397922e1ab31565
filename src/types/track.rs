//! Local and remote track records.
//!
//! [`LocalTrack`] is produced by the file metadata collaborator and is
//! immutable once built. [`RemoteTrack`] is a catalog record; the core only
//! reads it.

use serde::{Deserialize, Serialize};

use super::comparison::round_to_nearest_second;

/// Metadata for an audio file held locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTrack {
    /// File name the metadata was read from.
    pub file_name: String,
    /// Track title.
    pub title: String,
    /// Artist name (may be empty).
    pub artist: String,
    /// Album name, if the file carries one.
    pub album: Option<String>,
    /// Duration in milliseconds, rounded to the nearest second.
    pub duration_ms: u64,
}

impl LocalTrack {
    /// Create a local track. The duration is rounded to the nearest second.
    pub fn new(
        file_name: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        album: Option<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            title: title.into(),
            artist: artist.into(),
            album: album.filter(|a| !a.trim().is_empty()),
            duration_ms: round_to_nearest_second(duration_ms),
        }
    }

    /// Album name, or the empty string when absent.
    pub fn album_or_empty(&self) -> &str {
        self.album.as_deref().unwrap_or("")
    }
}

/// An artist credited on a catalog track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

impl ArtistRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The album a catalog track belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRef {
    #[serde(default)]
    pub name: String,
}

impl AlbumRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A track record returned by the remote catalog (a search candidate).
///
/// `id`, `name` and `duration_ms` are required; records missing them are
/// skipped at the parsing boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<AlbumRef>,
    pub duration_ms: u64,
}

impl RemoteTrack {
    /// Create a catalog track with no artists or album.
    pub fn new(id: impl Into<String>, name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artists: Vec::new(),
            album: None,
            duration_ms,
        }
    }

    /// Add a credited artist.
    pub fn with_artist(mut self, name: impl Into<String>) -> Self {
        self.artists.push(ArtistRef::new(name));
        self
    }

    /// Set the album.
    pub fn with_album(mut self, name: impl Into<String>) -> Self {
        self.album = Some(AlbumRef::new(name));
        self
    }

    /// Album name, if present and non-empty.
    pub fn album_name(&self) -> Option<&str> {
        self.album
            .as_ref()
            .map(|a| a.name.as_str())
            .filter(|n| !n.is_empty())
    }

    /// Artist names joined with `separator`.
    pub fn artist_names(&self, separator: &str) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_track_rounds_duration() {
        let track = LocalTrack::new("a.mp3", "Song", "Artist", None, 183_499);
        assert_eq!(track.duration_ms, 183_000);
        let track = LocalTrack::new("a.mp3", "Song", "Artist", None, 183_500);
        assert_eq!(track.duration_ms, 184_000);
    }

    #[test]
    fn local_track_blank_album_is_none() {
        let track = LocalTrack::new("a.mp3", "Song", "Artist", Some("  ".into()), 1_000);
        assert!(track.album.is_none());
        assert_eq!(track.album_or_empty(), "");
    }

    #[test]
    fn remote_track_deserializes_catalog_shape() {
        let json = serde_json::json!({
            "id": "4u7EnebtmKWzUH433cf5Qv",
            "name": "Bohemian Rhapsody",
            "artists": [{"name": "Queen", "id": "1dfeR4HaWDbWqFHLkxsg1d"}],
            "album": {"name": "A Night at the Opera", "album_type": "album"},
            "duration_ms": 354_320,
            "popularity": 88
        });
        let track: RemoteTrack = serde_json::from_value(json).unwrap();
        assert_eq!(track.artist_names(", "), "Queen");
        assert_eq!(track.album_name(), Some("A Night at the Opera"));
        assert_eq!(track.duration_ms, 354_320);
    }

    #[test]
    fn remote_track_missing_duration_is_rejected() {
        let json = serde_json::json!({"id": "x", "name": "No Duration"});
        assert!(serde_json::from_value::<RemoteTrack>(json).is_err());
    }
}
