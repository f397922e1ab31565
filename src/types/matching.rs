//! Match scoring results.

use serde::{Deserialize, Serialize};

use super::RemoteTrack;

/// Per-component scores behind a composite match score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Title similarity in [0, 1].
    pub name: f64,
    /// Artist similarity in [0, 1].
    pub artist: f64,
    /// Album bonus in [0, 1].
    pub album: f64,
}

impl ScoreBreakdown {
    /// Weighted composite: `0.55 * name + 0.25 * artist + 0.20 * album`.
    pub fn composite(&self) -> f64 {
        self.name * 0.55 + self.artist * 0.25 + self.album * 0.20
    }
}

/// A scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub track: RemoteTrack,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}
