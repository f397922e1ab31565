//! Public types for the Trackcheck API.

mod comparison;
mod matching;
mod track;

pub use comparison::{
    ComparisonStatus, ComparisonSummary, TrackComparison, format_duration,
    round_to_nearest_second,
};
pub use matching::{MatchResult, ScoreBreakdown};
pub use track::{AlbumRef, ArtistRef, LocalTrack, RemoteTrack};
