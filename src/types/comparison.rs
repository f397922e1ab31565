//! Duration comparison outcomes.

use serde::{Deserialize, Serialize};

use super::RemoteTrack;

/// Outcome of comparing one local file against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    /// Durations agree within the length tolerance.
    Ok,
    /// Durations differ by more than the length tolerance but within the
    /// warning tolerance.
    Warning,
    /// Durations differ by more than the warning tolerance.
    Error,
    /// No catalog track matched closely enough.
    NotFound,
    /// The lookup itself failed.
    Failed,
}

impl ComparisonStatus {
    /// Classify an absolute duration difference.
    pub fn from_difference(difference_ms: u64, length_tolerance_ms: u64, warning_tolerance_ms: u64) -> Self {
        if difference_ms <= length_tolerance_ms {
            ComparisonStatus::Ok
        } else if difference_ms <= warning_tolerance_ms {
            ComparisonStatus::Warning
        } else {
            ComparisonStatus::Error
        }
    }

    /// Whether this outcome should be counted as an issue.
    pub fn is_issue(&self) -> bool {
        !matches!(self, ComparisonStatus::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonStatus::Ok => "OK",
            ComparisonStatus::Warning => "WARNING",
            ComparisonStatus::Error => "ERROR",
            ComparisonStatus::NotFound => "NOT FOUND",
            ComparisonStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result row for one local file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackComparison {
    pub file_name: String,
    /// Title used for the successful lookup (possibly stripped of a trailing number).
    pub title: String,
    /// Title as read from the file.
    pub original_title: String,
    /// Whether the match was only found after stripping a trailing number.
    pub title_modified: bool,
    pub artist: String,
    pub local_duration_ms: u64,
    pub remote_duration_ms: Option<u64>,
    pub difference_ms: Option<u64>,
    pub status: ComparisonStatus,
    /// The matched catalog track.
    pub matched: Option<RemoteTrack>,
    /// Why nothing matched (set for `NotFound`).
    pub not_found_reason: Option<String>,
    /// Human-readable detail for `Error` and `Failed`.
    pub details: Option<String>,
}

impl TrackComparison {
    pub fn has_issue(&self) -> bool {
        self.status.is_issue()
    }
}

/// Results of a multi-file comparison run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub results: Vec<TrackComparison>,
    /// Number of rows with an issue.
    pub issues: usize,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
}

/// Round milliseconds to the nearest whole second (half rounds up).
pub fn round_to_nearest_second(ms: u64) -> u64 {
    (ms + 500) / 1000 * 1000
}

/// Format milliseconds as `m:ss`, rounding to the nearest second.
pub fn format_duration(ms: u64) -> String {
    let total_seconds = round_to_nearest_second(ms) / 1000;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}
