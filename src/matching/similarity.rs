//! Script-aware string similarity.
//!
//! [`SimilarityScorer::score`] returns a value in `[0, 1]`:
//!
//! 1. Either input empty → 0.
//! 2. Equal after normalisation → 1.
//! 3. One normalised string contains the other → `0.9 * shorter / longer`.
//! 4. Either side contains CJK → greedy multiset character overlap divided
//!    by the longer length (whitespace tokenisation is meaningless there).
//! 5. Otherwise → `0.7 * word_similarity + 0.3 * positional_char_similarity`.
//!
//! Scores are computed on the lexicographically ordered pair, so the result
//! is symmetric by construction, and memoised in a bounded per-scorer cache.

use std::collections::HashMap;

use moka::sync::Cache;

use super::normalize::{Normalizer, has_cjk, split_featuring};

const DEFAULT_MEMO_CAPACITY: u64 = 50_000;

/// Memoising similarity scorer.
pub struct SimilarityScorer {
    normalizer: Normalizer,
    memo: Cache<(String, String), f64>,
}

impl SimilarityScorer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMO_CAPACITY)
    }

    /// Create a scorer whose memo holds at most `max_entries` pairs.
    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            normalizer: Normalizer::with_capacity(max_entries),
            memo: Cache::new(max_entries),
        }
    }

    /// The normaliser this scorer uses (shares its memo).
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Similarity of `a` and `b` in `[0, 1]`. Symmetric.
    pub fn score(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.memo
            .get_with((lo.to_string(), hi.to_string()), || self.compute(lo, hi))
    }

    /// Compare titles that may carry featuring clauses.
    ///
    /// When both sides have one, main titles and featured artists are scored
    /// separately and combined `0.8 / 0.2`. Otherwise identical lowercase
    /// strings score 1 and everything else falls back to [`score`](Self::score).
    pub fn compare_with_featuring(&self, local_title: &str, remote_title: &str) -> f64 {
        let local = split_featuring(local_title);
        let remote = split_featuring(remote_title);

        if local.has_feat && remote.has_feat {
            let title_sim = self.score(&local.main_title, &remote.main_title);
            let feat_sim = self.score(&local.feat_artist, &remote.feat_artist);
            return title_sim * 0.8 + feat_sim * 0.2;
        }

        if local_title.to_lowercase() == remote_title.to_lowercase() {
            return 1.0;
        }

        self.score(local_title, remote_title)
    }

    /// Drop memoised scores and normalisations.
    pub fn clear_memo(&self) {
        self.memo.invalidate_all();
        self.normalizer.clear();
    }

    fn compute(&self, a: &str, b: &str) -> f64 {
        let norm_a = self.normalizer.normalize(a);
        let norm_b = self.normalizer.normalize(b);

        if norm_a == norm_b {
            return 1.0;
        }

        let len_a = norm_a.chars().count();
        let len_b = norm_b.chars().count();

        if norm_a.contains(&norm_b) || norm_b.contains(&norm_a) {
            return 0.9 * len_a.min(len_b) as f64 / len_a.max(len_b) as f64;
        }

        if has_cjk(&norm_a) || has_cjk(&norm_b) {
            return char_overlap(&norm_a, &norm_b, len_a.max(len_b));
        }

        let word_sim = word_similarity(&norm_a, &norm_b);
        let char_sim = positional_char_similarity(&norm_a, &norm_b, len_a.max(len_b));
        word_sim * 0.7 + char_sim * 0.3
    }
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Greedy multiset overlap: each character of `a` consumes at most one equal
/// character of `b`.
fn char_overlap(a: &str, b: &str, longest: usize) -> f64 {
    let mut unused: HashMap<char, usize> = HashMap::new();
    for c in b.chars() {
        *unused.entry(c).or_default() += 1;
    }
    let mut matches = 0usize;
    for c in a.chars() {
        if let Some(count) = unused.get_mut(&c) {
            if *count > 0 {
                *count -= 1;
                matches += 1;
            }
        }
    }
    matches as f64 / longest as f64
}

/// Fraction of words in `a` that are contained in, or contain, some word in
/// `b`. Words shorter than two characters never match but still count
/// toward the denominator.
fn word_similarity(a: &str, b: &str) -> f64 {
    let words_a: Vec<&str> = a.split_whitespace().collect();
    let words_b: Vec<&str> = b.split_whitespace().collect();
    let denominator = words_a.len().max(words_b.len());
    if denominator == 0 {
        return 0.0;
    }

    let matches = words_a
        .iter()
        .filter(|wa| wa.chars().count() >= 2)
        .filter(|wa| {
            words_b
                .iter()
                .any(|wb| wb.chars().count() >= 2 && (wa.contains(*wb) || wb.contains(**wa)))
        })
        .count();

    matches as f64 / denominator as f64
}

/// Fraction of positions (over the shared prefix length) holding the same
/// character, divided by the longer length.
fn positional_char_similarity(a: &str, b: &str, longest: usize) -> f64 {
    let matches = a.chars().zip(b.chars()).filter(|(x, y)| x == y).count();
    matches as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_scores_zero() {
        let scorer = SimilarityScorer::new();
        assert_eq!(scorer.score("", "anything"), 0.0);
        assert_eq!(scorer.score("anything", ""), 0.0);
    }

    #[test]
    fn exact_after_normalisation() {
        let scorer = SimilarityScorer::new();
        assert_eq!(scorer.score("Bohemian Rhapsody", "bohemian rhapsody (Remastered)"), 1.0);
    }

    #[test]
    fn containment_scaled_by_length_ratio() {
        let scorer = SimilarityScorer::new();
        // "song title" (10) inside "song title remix" (16)
        let s = scorer.score("Song Title", "Song Title Remix");
        assert!(approx(s, 0.9 * 10.0 / 16.0), "got {s}");
    }

    #[test]
    fn cjk_containment() {
        let scorer = SimilarityScorer::new();
        let s = scorer.score("曖昧", "曖昧な関係");
        assert!(approx(s, 0.9 * 2.0 / 5.0), "got {s}");
    }

    #[test]
    fn cjk_character_overlap() {
        let scorer = SimilarityScorer::new();
        // 3 of 4 characters shared, order ignored
        let s = scorer.score("恋愛写真", "写真恋歌");
        assert!(approx(s, 3.0 / 4.0), "got {s}");
    }

    #[test]
    fn latin_word_and_char_hybrid() {
        let scorer = SimilarityScorer::new();
        // words: "hello"~"hello" matches, "world" vs "there" no -> 1/2
        // chars: "hello world" vs "hello there": h,e,l,l,o,' ' match (6), then
        // w/t o/h r/e l/r d/e -> 6/11
        let s = scorer.score("hello world", "hello there");
        assert!(approx(s, 0.7 * 0.5 + 0.3 * 6.0 / 11.0), "got {s}");
    }

    #[test]
    fn short_words_are_ignored_for_matching() {
        let scorer = SimilarityScorer::new();
        let s = scorer.score("a b", "a c");
        // no eligible words, char positions: 'a',' ' match -> 2/3
        assert!(approx(s, 0.3 * 2.0 / 3.0), "got {s}");
    }

    #[test]
    fn symmetric_for_asymmetric_word_counts() {
        let scorer = SimilarityScorer::new();
        let fresh = SimilarityScorer::new();
        let pairs = [
            ("ab abd", "abd ac"),
            ("hello world", "world hello again"),
            ("恋愛写真", "写真恋歌"),
            ("Song (Live)", "Other Song"),
        ];
        for (a, b) in pairs {
            assert_eq!(scorer.score(a, b), fresh.score(b, a), "asymmetric for {a:?}/{b:?}");
        }
    }

    #[test]
    fn noise_only_strings_compare_equal_after_normalization() {
        let scorer = SimilarityScorer::new();
        // Both normalise to "".
        assert_eq!(scorer.score("(Intro)", "(Outro)"), 1.0);
        assert_eq!(scorer.score("(Intro)", "(intro)"), 1.0);
        // "" is contained in anything but shares no length with it.
        assert_eq!(scorer.score("(Intro)", "Song"), 0.0);
    }

    #[test]
    fn featuring_split_comparison() {
        let scorer = SimilarityScorer::new();
        let s = scorer.compare_with_featuring(
            "Old Town Road (feat. Billy Ray Cyrus)",
            "Old Town Road (feat. Billy Ray Cyrus) - Remix",
        );
        assert!(approx(s, 1.0), "got {s}");
    }

    #[test]
    fn featuring_identical_lowercase() {
        let scorer = SimilarityScorer::new();
        assert_eq!(scorer.compare_with_featuring("Song ft. X", "SONG FT. X"), 1.0);
    }

    #[test]
    fn featuring_falls_back_to_score() {
        let scorer = SimilarityScorer::new();
        let s = scorer.compare_with_featuring("Stay feat. Justin Bieber", "Stay");
        assert_eq!(s, scorer.score("Stay feat. Justin Bieber", "Stay"));
        assert_eq!(s, 1.0);
    }
}
