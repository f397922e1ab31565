//! String normalisation for title/artist/album comparison.
//!
//! [`normalize`] canonicalises a string (NFC, lowercase) and strips the
//! noise that commonly differs between local tags and catalog records:
//! parentheticals, bracketed suffixes, `feat.` clauses and trailing
//! numbers. [`Normalizer`] wraps it in a bounded memo owned by the scorer
//! that uses it, so there is no process-wide state.

use std::sync::LazyLock;

use moka::sync::Cache;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Default number of memoised normalisations per [`Normalizer`].
const DEFAULT_MEMO_CAPACITY: u64 = 10_000;

static PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(.*?\)").expect("parenthetical regex"));

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]").expect("bracket regex"));

// `feat` must stand alone as a word ("defeat", "feather" are kept).
static FEATURING_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<lead>^|[^a-z])feat(?:\.|uring\b|\b).*$").expect("featuring regex")
});

// Every trailing whitespace-separated number token, so the result is stable
// under re-normalisation ("song 2 3" -> "song").
static TRAILING_NUMBERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\s+\d+)+\s*$").expect("trailing numbers regex"));

static TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\d+\s*$").expect("trailing number regex"));

static FEATURING_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)(?:\s*[(\[]feat\.?\s*|\s+feat\.?\s+)(.*?)(?:[)\]]|\s*$)")
        .expect("featuring split regex")
});

static PARENTHETICAL_FEAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(.*?feat.*?\)").expect("parenthetical feat regex"));

/// Normalise a string for comparison.
///
/// NFC, lowercase, then strips `(...)`, `[...]`, a `feat.` clause with
/// everything after it, and trailing bare number tokens. Empty input gives
/// an empty string. Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let canonical: String = s.nfc().collect::<String>().to_lowercase().nfc().collect();
    let stripped = PARENTHETICAL.replace_all(&canonical, "");
    let stripped = BRACKETED.replace_all(&stripped, "");
    let stripped = FEATURING_TAIL.replace(&stripped, "${lead}");
    let stripped = TRAILING_NUMBERS.replace(stripped.trim_end(), "");
    stripped.trim().to_string()
}

/// A title split into its main part and featured artist.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeaturingSplit {
    pub main_title: String,
    pub feat_artist: String,
    pub has_feat: bool,
}

/// Detect a `(feat. X)` / `[feat. X]` / `feat. X` clause.
///
/// Without one, the whole NFC-lowercased trimmed string is returned as
/// `main_title` and `has_feat` is false.
pub fn split_featuring(s: &str) -> FeaturingSplit {
    if s.is_empty() {
        return FeaturingSplit::default();
    }
    let lowered: String = s.nfc().collect::<String>().to_lowercase();
    match FEATURING_SPLIT.captures(&lowered) {
        Some(caps) => FeaturingSplit {
            main_title: caps.get(1).map_or("", |m| m.as_str()).trim().to_string(),
            feat_artist: caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
            has_feat: true,
        },
        None => FeaturingSplit {
            main_title: lowered.trim().to_string(),
            feat_artist: String::new(),
            has_feat: false,
        },
    }
}

/// Whether a raw title carries a featuring marker (`feat.`, `ft.`, or a
/// parenthetical mentioning `feat`).
pub fn has_featuring_marker(s: &str) -> bool {
    let lowered = s.to_lowercase();
    lowered.contains("feat.") || lowered.contains("ft.") || PARENTHETICAL_FEAT.is_match(s)
}

/// Whether `c` is a CJK code point: Hiragana/Katakana, CJK Unified
/// Ideographs (including extension A), compatibility ideographs and forms,
/// and halfwidth Katakana.
pub fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x3040..=0x30FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xF900..=0xFAFF
            | 0xFE30..=0xFE4F
            | 0xFF66..=0xFF9F
    )
}

/// Whether `s` contains any CJK code point.
pub fn has_cjk(s: &str) -> bool {
    s.chars().any(is_cjk)
}

/// Whether the raw title ends with a whitespace-separated number ("On & On 2").
pub fn has_trailing_number(s: &str) -> bool {
    TRAILING_NUMBER.is_match(s)
}

/// Remove one trailing whitespace-separated number and trim.
pub fn strip_trailing_number(s: &str) -> String {
    TRAILING_NUMBER.replace(s, "").trim().to_string()
}

/// Memoising wrapper around [`normalize`].
///
/// The memo is bounded (moka LRU) and scoped to this instance; call
/// [`clear`](Self::clear) between comparison batches to drop it.
pub struct Normalizer {
    memo: Cache<String, String>,
}

impl Normalizer {
    /// Create a normaliser with the default memo capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMO_CAPACITY)
    }

    /// Create a normaliser with a custom memo capacity.
    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            memo: Cache::new(max_entries),
        }
    }

    /// Normalise `s`, reusing a memoised result when available.
    pub fn normalize(&self, s: &str) -> String {
        if s.is_empty() {
            return String::new();
        }
        self.memo.get_with(s.to_string(), || normalize(s))
    }

    /// Drop all memoised entries.
    pub fn clear(&self) {
        self.memo.invalidate_all();
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}
