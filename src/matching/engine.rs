//! Candidate scoring and best-match selection.
//!
//! Each candidate gets a composite score (see [`ScoreBreakdown::composite`])
//! from three components:
//!
//! - **name**: featuring-aware title similarity, or the best weighted score
//!   across title variations (raw, normalised, trailing number stripped).
//! - **artist**: 1.0 when no artist is queried or a credited artist matches
//!   exactly; otherwise similarity against all credited artists.
//! - **album**: a bonus in `[0, 1]`, with a separate heuristic for CJK album
//!   names, which are often one or two characters long.
//!
//! The engine is pure: it never touches the cache. Callers that want the
//! winning track cached do so themselves (see `CatalogClient::find_best_match`).

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::normalize::{
    has_cjk, has_featuring_marker, has_trailing_number, split_featuring, strip_trailing_number,
};
use super::similarity::SimilarityScorer;
use crate::telemetry;
use crate::types::{MatchResult, RemoteTrack, ScoreBreakdown};

/// Default minimum composite score for a match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;

/// Float tolerance for the threshold comparison.
pub const SCORE_EPSILON: f64 = 1e-6;

/// Scores catalog candidates against a local track and picks the best one.
pub struct MatchEngine {
    scorer: Arc<SimilarityScorer>,
    threshold: f64,
}

/// Query-side values computed once per match pass.
struct Query<'a> {
    title: &'a str,
    artist: &'a str,
    album: &'a str,
    normalized_title: String,
    stripped_title: Option<String>,
    normalized_album: String,
    has_feat_marker: bool,
    feat_artist: Option<String>,
}

impl MatchEngine {
    /// Create an engine with its own scorer.
    pub fn new(threshold: f64) -> Self {
        Self::with_scorer(Arc::new(SimilarityScorer::new()), threshold)
    }

    /// Create an engine sharing an existing scorer (and its memo).
    pub fn with_scorer(scorer: Arc<SimilarityScorer>, threshold: f64) -> Self {
        Self { scorer, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn scorer(&self) -> &Arc<SimilarityScorer> {
        &self.scorer
    }

    /// Whether a composite score clears the threshold.
    ///
    /// Scores within half an epsilon below the threshold are treated as equal
    /// to it (float noise); anything further below is rejected.
    pub fn accepts(&self, score: f64) -> bool {
        self.threshold - score < SCORE_EPSILON / 2.0
    }

    /// Pick the best candidate for `(title, artist, album)`.
    ///
    /// Returns `None` when there are no usable candidates or the best score
    /// is below the threshold. Ties go to the earlier candidate. Candidates
    /// without an id or name are skipped.
    pub fn find_best_match(
        &self,
        candidates: &[RemoteTrack],
        title: &str,
        artist: &str,
        album: &str,
    ) -> Option<MatchResult> {
        if candidates.is_empty() {
            metrics::counter!(telemetry::MATCHES_TOTAL, "outcome" => "no_candidates").increment(1);
            return None;
        }

        let query = self.query(title, artist, album);
        debug!(
            candidates = candidates.len(),
            title,
            artist,
            album,
            cjk = has_cjk(&format!("{title}{artist}{album}")),
            "scoring candidates"
        );

        let mut best: Option<MatchResult> = None;
        let mut highest = -1.0_f64;
        let mut scored: Vec<(&RemoteTrack, ScoreBreakdown, f64)> = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if candidate.id.is_empty() || candidate.name.is_empty() {
                warn!(id = %candidate.id, name = %candidate.name, "skipping malformed candidate");
                continue;
            }

            let breakdown = self.breakdown(&query, candidate);
            let score = breakdown.composite();
            trace!(
                name = %candidate.name,
                artists = %candidate.artist_names(", "),
                album = candidate.album_name().unwrap_or("Unknown"),
                score,
                "candidate score"
            );
            scored.push((candidate, breakdown, score));

            if score > highest {
                highest = score;
                best = Some(MatchResult {
                    track: candidate.clone(),
                    score,
                    breakdown,
                });
            }
        }

        log_top_candidates(title, &mut scored);

        let Some(best) = best else {
            metrics::counter!(telemetry::MATCHES_TOTAL, "outcome" => "no_candidates").increment(1);
            return None;
        };

        if !self.accepts(best.score) {
            debug!(
                title,
                score = best.score,
                threshold = self.threshold,
                "best candidate below threshold"
            );
            metrics::counter!(telemetry::MATCHES_TOTAL, "outcome" => "below_threshold").increment(1);
            return None;
        }

        debug!(
            title,
            matched = %best.track.name,
            artists = %best.track.artist_names(", "),
            score = best.score,
            "best match"
        );
        metrics::counter!(telemetry::MATCHES_TOTAL, "outcome" => "matched").increment(1);
        Some(best)
    }

    /// Score a single candidate without applying the threshold.
    pub fn score_candidate(
        &self,
        candidate: &RemoteTrack,
        title: &str,
        artist: &str,
        album: &str,
    ) -> ScoreBreakdown {
        let query = self.query(title, artist, album);
        self.breakdown(&query, candidate)
    }

    fn query<'a>(&self, title: &'a str, artist: &'a str, album: &'a str) -> Query<'a> {
        let normalizer = self.scorer.normalizer();
        let feat = split_featuring(title);
        Query {
            title,
            artist,
            album,
            normalized_title: normalizer.normalize(title),
            stripped_title: has_trailing_number(title).then(|| strip_trailing_number(title)),
            normalized_album: normalizer.normalize(album),
            has_feat_marker: has_featuring_marker(title),
            feat_artist: (feat.has_feat && !feat.feat_artist.is_empty()).then_some(feat.feat_artist),
        }
    }

    fn breakdown(&self, query: &Query<'_>, candidate: &RemoteTrack) -> ScoreBreakdown {
        ScoreBreakdown {
            name: self.name_score(query, candidate),
            artist: self.artist_score(query, candidate),
            album: self.album_bonus(query, candidate),
        }
    }

    fn name_score(&self, query: &Query<'_>, candidate: &RemoteTrack) -> f64 {
        if query.has_feat_marker || has_featuring_marker(&candidate.name) {
            return self.scorer.compare_with_featuring(query.title, &candidate.name);
        }

        let normalized_name = self.scorer.normalizer().normalize(&candidate.name);
        let candidate_variations = [(candidate.name.as_str(), 1.0), (normalized_name.as_str(), 0.9)];

        let mut query_variations = vec![(query.title, 1.0), (query.normalized_title.as_str(), 0.9)];
        if let Some(stripped) = &query.stripped_title {
            query_variations.push((stripped.as_str(), 0.85));
        }

        let mut best = 0.0_f64;
        for (query_name, query_weight) in &query_variations {
            for (candidate_name, candidate_weight) in &candidate_variations {
                let score = self.scorer.score(candidate_name, query_name);
                best = best.max(score * query_weight * candidate_weight);
            }
        }
        best
    }

    fn artist_score(&self, query: &Query<'_>, candidate: &RemoteTrack) -> f64 {
        if query.artist.is_empty() {
            return 1.0;
        }

        let wanted = query.artist.to_lowercase();
        let exact = candidate
            .artists
            .iter()
            .any(|a| a.name.to_lowercase() == wanted);

        let mut score = if exact {
            1.0
        } else {
            self.scorer.score(&candidate.artist_names(" "), query.artist)
        };

        if let Some(feat_artist) = &query.feat_artist {
            let featured = candidate
                .artists
                .iter()
                .any(|a| a.name.to_lowercase().contains(feat_artist.as_str()));
            if featured {
                score = score.max(0.9);
            }
        }
        score
    }

    fn album_bonus(&self, query: &Query<'_>, candidate: &RemoteTrack) -> f64 {
        if query.normalized_album.is_empty() {
            return 0.0;
        }
        let Some(remote_album) = candidate.album_name() else {
            return 0.0;
        };
        let remote_normalized = self.scorer.normalizer().normalize(remote_album);

        let local = query.normalized_album.as_str();
        let remote = remote_normalized.as_str();
        trace!(local, remote, "album comparison");

        if !has_cjk(local) {
            return if remote == local {
                1.0
            } else if remote.contains(local) || local.contains(remote) {
                0.5
            } else {
                0.0
            };
        }

        let local_len = local.chars().count();
        if local_len > 2 {
            let similarity = self.scorer.score(remote, local);
            return if similarity > 0.5 { 0.1 * similarity } else { 0.0 };
        }

        if remote == local {
            return 1.0;
        }
        if remote.contains(local) {
            return 0.7;
        }
        if local_len == 1 {
            return single_char_album_bonus(query.album.trim(), remote_album.trim(), local, remote);
        }
        char_presence_ratio(local, remote) * 0.15
    }
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

/// Bonus for a one-character CJK album name that is not contained in the
/// candidate album: raw equality, then code-point proximity, then per-char
/// presence.
fn single_char_album_bonus(raw_local: &str, raw_remote: &str, local: &str, remote: &str) -> f64 {
    if raw_local == raw_remote {
        return 1.0;
    }

    if let Some(wanted) = raw_local.chars().next() {
        let wanted = wanted as i64;
        for c in raw_remote.chars() {
            let distance = (c as i64 - wanted).abs();
            if distance == 0 {
                return 0.25;
            }
            if distance < 100 {
                return 0.15 * (1.0 - distance as f64 / 100.0);
            }
        }
    }

    char_presence_ratio(local, remote) * 0.15
}

/// Fraction of characters of `local` that occur anywhere in `remote`.
fn char_presence_ratio(local: &str, remote: &str) -> f64 {
    let total = local.chars().count();
    if total == 0 {
        return 0.0;
    }
    let present = local.chars().filter(|c| remote.contains(*c)).count();
    present as f64 / total as f64
}

fn log_top_candidates(title: &str, scored: &mut [(&RemoteTrack, ScoreBreakdown, f64)]) {
    if scored.is_empty() || !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    scored.sort_by(|a, b| b.2.total_cmp(&a.2));
    for (rank, (track, breakdown, score)) in scored.iter().take(3).enumerate() {
        debug!(
            title,
            rank = rank + 1,
            candidate = %track.name,
            artists = %track.artist_names(", "),
            album = track.album_name().unwrap_or("Unknown"),
            score = *score,
            name_score = breakdown.name,
            artist_score = breakdown.artist,
            album_bonus = breakdown.album,
            "top candidate"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn queen() -> RemoteTrack {
        RemoteTrack::new("4u7EnebtmKWzUH433cf5Qv", "Bohemian Rhapsody", 354_320)
            .with_artist("Queen")
            .with_album("A Night at the Opera")
    }

    #[test]
    fn no_candidates_is_none() {
        let engine = MatchEngine::default();
        assert!(engine.find_best_match(&[], "Song", "Artist", "").is_none());
    }

    #[test]
    fn exact_title_and_artist_without_album() {
        let engine = MatchEngine::default();
        let result = engine
            .find_best_match(&[queen()], "Bohemian Rhapsody", "Queen", "")
            .expect("match");
        assert!(approx(result.breakdown.name, 1.0));
        assert!(approx(result.breakdown.artist, 1.0));
        assert_eq!(result.breakdown.album, 0.0);
        assert!(approx(result.score, 0.8));
    }

    #[test]
    fn trailing_number_title_matches_plain_remote() {
        let engine = MatchEngine::default();
        let candidate = RemoteTrack::new("id1", "Song Title", 200_000).with_artist("Band");
        let result = engine
            .find_best_match(&[candidate], "Song Title 2", "Band", "")
            .expect("match");
        assert!(result.breakdown.name >= 0.85);
        assert!(engine.accepts(result.score));
    }

    #[test]
    fn cjk_partial_title_scores_containment() {
        let engine = MatchEngine::default();
        let candidate = RemoteTrack::new("id1", "曖昧な関係", 200_000).with_artist("歌手");
        let breakdown = engine.score_candidate(&candidate, "曖昧", "歌手", "");
        assert!(approx(breakdown.name, 0.9 * 2.0 / 5.0), "got {}", breakdown.name);
        assert!(approx(breakdown.artist, 1.0));
        assert!(engine.find_best_match(&[candidate.clone()], "曖昧", "歌手", "").is_none());

        let lenient = MatchEngine::new(0.4);
        assert!(lenient.find_best_match(&[candidate], "曖昧", "歌手", "").is_some());
    }

    #[test]
    fn threshold_boundary() {
        let engine = MatchEngine::new(0.7);
        assert!(engine.accepts(0.7));
        assert!(engine.accepts(0.75));
        assert!(!engine.accepts(0.699999));
        assert!(!engine.accepts(0.7 - SCORE_EPSILON));
    }

    #[test]
    fn ties_go_to_first_candidate() {
        let engine = MatchEngine::default();
        let first = RemoteTrack::new("first", "Song", 1_000).with_artist("Band");
        let second = RemoteTrack::new("second", "Song", 2_000).with_artist("Band");
        let result = engine
            .find_best_match(&[first, second], "Song", "Band", "")
            .expect("match");
        assert_eq!(result.track.id, "first");
    }

    #[test]
    fn malformed_candidates_are_skipped() {
        let engine = MatchEngine::default();
        let broken = RemoteTrack::new("", "Song", 1_000).with_artist("Band");
        let nameless = RemoteTrack::new("x", "", 1_000).with_artist("Band");
        let good = RemoteTrack::new("good", "Song", 1_000).with_artist("Band");
        let result = engine
            .find_best_match(&[broken, nameless, good], "Song", "Band", "")
            .expect("match");
        assert_eq!(result.track.id, "good");

        let only_broken = RemoteTrack::new("", "Song", 1_000);
        assert!(engine.find_best_match(&[only_broken], "Song", "", "").is_none());
    }

    #[test]
    fn missing_artist_defaults_to_full_score() {
        let engine = MatchEngine::default();
        let breakdown = engine.score_candidate(&queen(), "Bohemian Rhapsody", "", "");
        assert_eq!(breakdown.artist, 1.0);
    }

    #[test]
    fn artist_match_is_case_insensitive() {
        let engine = MatchEngine::default();
        let breakdown = engine.score_candidate(&queen(), "Bohemian Rhapsody", "QUEEN", "");
        assert_eq!(breakdown.artist, 1.0);
    }

    #[test]
    fn featured_artist_raises_artist_score() {
        let engine = MatchEngine::default();
        let candidate = RemoteTrack::new("id", "Old Town Road (feat. Billy Ray Cyrus)", 157_000)
            .with_artist("Lil Nas X")
            .with_artist("Billy Ray Cyrus");
        let breakdown = engine.score_candidate(
            &candidate,
            "Old Town Road (feat. Billy Ray Cyrus)",
            "Someone Else",
            "",
        );
        assert!(breakdown.artist >= 0.9);
        assert!(approx(breakdown.name, 1.0));
    }

    #[test]
    fn latin_album_bonus() {
        let engine = MatchEngine::default();
        let exact = engine.score_candidate(&queen(), "Bohemian Rhapsody", "Queen", "A Night at the Opera");
        assert_eq!(exact.album, 1.0);
        let partial = engine.score_candidate(&queen(), "Bohemian Rhapsody", "Queen", "Night at the Opera");
        assert_eq!(partial.album, 0.5);
        let other = engine.score_candidate(&queen(), "Bohemian Rhapsody", "Queen", "Greatest Hits");
        assert_eq!(other.album, 0.0);
    }

    #[test]
    fn noise_only_remote_album_is_contained() {
        let engine = MatchEngine::default();
        let candidate = RemoteTrack::new("id", "Song", 1_000).with_album("(Deluxe)");
        let breakdown = engine.score_candidate(&candidate, "Song", "", "Album");
        assert_eq!(breakdown.album, 0.5);

        // Single CJK character falls through to the raw code-point check.
        let cjk = RemoteTrack::new("id", "歌", 1_000).with_album("(夜)");
        let breakdown = engine.score_candidate(&cjk, "歌", "", "夜");
        assert_eq!(breakdown.album, 0.25);
    }

    #[test]
    fn short_cjk_album_bonus() {
        let engine = MatchEngine::default();
        let base = RemoteTrack::new("id", "歌", 1_000);

        let exact = engine.score_candidate(&base.clone().with_album("夜"), "歌", "", "夜");
        assert_eq!(exact.album, 1.0);

        let contained = engine.score_candidate(&base.clone().with_album("夜の歌"), "歌", "", "夜");
        assert_eq!(contained.album, 0.7);

        // U+591C vs U+5915 (distance 7)
        let nearby = engine.score_candidate(&base.clone().with_album("夕"), "歌", "", "夜");
        assert!(approx(nearby.album, 0.15 * (1.0 - 7.0 / 100.0)), "got {}", nearby.album);

        let two = engine.score_candidate(&base.with_album("東京"), "歌", "", "東西");
        assert!(approx(two.album, 0.15 * 0.5), "got {}", two.album);
    }

    #[test]
    fn long_cjk_album_uses_similarity() {
        let engine = MatchEngine::default();
        let candidate = RemoteTrack::new("id", "歌", 1_000).with_album("東京の夜空");
        let breakdown = engine.score_candidate(&candidate, "歌", "", "東京の夜");
        // containment: 0.9 * 4/5 = 0.72 > 0.5
        assert!(approx(breakdown.album, 0.1 * 0.72), "got {}", breakdown.album);
    }
}
