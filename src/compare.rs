//! Duration comparison of local files against the catalog.
//!
//! [`TrackComparator`] drives a [`TrackLookup`] one file at a time. Lookups
//! are strictly sequential so the catalog sees at most one request in flight.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::matching::{has_trailing_number, strip_trailing_number};
use crate::traits::TrackLookup;
use crate::types::{
    ComparisonStatus, ComparisonSummary, LocalTrack, RemoteTrack, TrackComparison, format_duration,
};
use crate::{Result, TrackcheckError};

/// Default tolerance for an OK comparison (ms).
pub const DEFAULT_LENGTH_TOLERANCE_MS: u64 = 1000;

/// Default tolerance for a warning (ms); beyond it the comparison is an error.
pub const DEFAULT_WARNING_TOLERANCE_MS: u64 = 5000;

/// Compares local track durations with their catalog matches.
pub struct TrackComparator {
    lookup: Arc<dyn TrackLookup>,
    length_tolerance_ms: u64,
    warning_tolerance_ms: u64,
    cache_only: bool,
}

impl TrackComparator {
    pub fn new(lookup: Arc<dyn TrackLookup>) -> Self {
        Self {
            lookup,
            length_tolerance_ms: DEFAULT_LENGTH_TOLERANCE_MS,
            warning_tolerance_ms: DEFAULT_WARNING_TOLERANCE_MS,
            cache_only: false,
        }
    }

    pub fn length_tolerance_ms(mut self, ms: u64) -> Self {
        self.length_tolerance_ms = ms;
        self
    }

    pub fn warning_tolerance_ms(mut self, ms: u64) -> Self {
        self.warning_tolerance_ms = ms;
        self
    }

    /// Serve lookups from the cache only.
    pub fn cache_only(mut self, cache_only: bool) -> Self {
        self.cache_only = cache_only;
        self
    }

    /// Compare one local file.
    ///
    /// When nothing matches and the title ends in a number ("Song 2"), the
    /// lookup is repeated with the number stripped, matching without the album.
    pub async fn compare(&self, track: &LocalTrack) -> Result<TrackComparison> {
        let album = track.album_or_empty();
        let candidates = self
            .lookup
            .search_track(&track.title, &track.artist, album, self.cache_only)
            .await?;
        let mut best = self
            .lookup
            .find_best_match(&candidates, &track.title, &track.artist, album);

        let mut title = track.title.clone();
        let mut title_modified = false;
        let mut not_found_reason = None;

        if best.is_none() {
            let mut reason = self.not_found_reason(track, &candidates);

            if has_trailing_number(&track.title) {
                let stripped = strip_trailing_number(&track.title);
                debug!(original = %track.title, stripped = %stripped, "retrying without trailing number");
                let retry = self
                    .lookup
                    .search_track(&stripped, &track.artist, album, self.cache_only)
                    .await?;
                best = self.lookup.find_best_match(&retry, &stripped, &track.artist, "");
                if best.is_some() {
                    title = stripped;
                    title_modified = true;
                } else {
                    reason.push_str(&format!(" Tried without the number ({stripped}) but still no match."));
                }
            }

            if best.is_none() {
                not_found_reason = Some(reason);
            }
        }

        let Some(matched) = best else {
            info!(file = %track.file_name, "no catalog match");
            return Ok(TrackComparison {
                file_name: track.file_name.clone(),
                title,
                original_title: track.title.clone(),
                title_modified,
                artist: track.artist.clone(),
                local_duration_ms: track.duration_ms,
                remote_duration_ms: None,
                difference_ms: None,
                status: ComparisonStatus::NotFound,
                matched: None,
                not_found_reason,
                details: None,
            });
        };

        let remote_ms = matched.duration_ms;
        let difference = track.duration_ms.abs_diff(remote_ms);
        let status = ComparisonStatus::from_difference(
            difference,
            self.length_tolerance_ms,
            self.warning_tolerance_ms,
        );
        let details = (status == ComparisonStatus::Error).then(|| {
            let direction = if track.duration_ms > remote_ms {
                "longer"
            } else {
                "shorter"
            };
            format!(
                "The track is {} {direction} than the catalog version.",
                format_duration(difference)
            )
        });
        debug!(
            file = %track.file_name,
            local_ms = track.duration_ms,
            remote_ms,
            difference_ms = difference,
            status = %status,
            "compared durations"
        );

        Ok(TrackComparison {
            file_name: track.file_name.clone(),
            title,
            original_title: track.title.clone(),
            title_modified,
            artist: track.artist.clone(),
            local_duration_ms: track.duration_ms,
            remote_duration_ms: Some(remote_ms),
            difference_ms: Some(difference),
            status,
            matched: Some(matched),
            not_found_reason: None,
            details,
        })
    }

    /// Compare every track in order.
    ///
    /// Cancellation stops the run between or during tracks and returns what
    /// was collected so far with `cancelled` set. A missing credential aborts
    /// the run; any other per-track failure becomes a `Failed` row.
    pub async fn compare_all(
        &self,
        tracks: &[LocalTrack],
        cancel: &CancellationToken,
    ) -> Result<ComparisonSummary> {
        let mut summary = ComparisonSummary::default();

        for track in tracks {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                outcome = self.compare(track) => outcome,
            };

            let row = match outcome {
                Ok(row) => row,
                Err(TrackcheckError::AuthenticationRequired) => {
                    return Err(TrackcheckError::AuthenticationRequired);
                }
                Err(e) => {
                    warn!(
                        file = %track.file_name,
                        error = %e,
                        transient = e.is_transient(),
                        retry_after_s = e.retry_after().map(|d| d.as_secs()),
                        "comparison failed"
                    );
                    failed_row(track, &e)
                }
            };
            if row.has_issue() {
                summary.issues += 1;
            }
            summary.results.push(row);
        }

        if summary.cancelled {
            info!(completed = summary.results.len(), total = tracks.len(), "comparison cancelled");
        }
        Ok(summary)
    }

    fn not_found_reason(&self, track: &LocalTrack, candidates: &[RemoteTrack]) -> String {
        if let Some(closest) = candidates.first() {
            return format!(
                "Found {} results, but none matched closely enough. The closest match was \"{}\" by {}.",
                candidates.len(),
                closest.name,
                closest.artist_names(", ")
            );
        }

        let mut reason = String::from("No search results returned.");
        if track.artist.is_empty() {
            reason.push_str(" Consider adding artist information to the file.");
            if self.cache_only {
                reason.push_str(" Limited cache data may prevent finding tracks without artist information.");
            } else {
                reason.push_str(" Catalog searches are more effective with artist names.");
            }
        } else {
            if track.artist.contains('/') {
                reason.push_str(&format!(
                    " Check if \"{}\" is spelled correctly or appears differently in the catalog.",
                    track.artist
                ));
            }
            if self.cache_only {
                reason.push_str(" This track may not be in the local cache yet. Authenticate to search the catalog directly.");
            } else {
                reason.push_str(" The track might be region-restricted or recently added.");
            }
        }
        reason
    }
}

fn failed_row(track: &LocalTrack, error: &TrackcheckError) -> TrackComparison {
    TrackComparison {
        file_name: track.file_name.clone(),
        title: track.title.clone(),
        original_title: track.title.clone(),
        title_modified: false,
        artist: track.artist.clone(),
        local_duration_ms: track.duration_ms,
        remote_duration_ms: None,
        difference_ms: None,
        status: ComparisonStatus::Failed,
        matched: None,
        not_found_reason: None,
        details: Some(error.to_string()),
    }
}
