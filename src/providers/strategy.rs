//! Search strategy planning.
//!
//! A lookup tries up to three queries, most specific first, and stops at the
//! first one that returns anything:
//!
//! 1. [`SearchStrategy::Primary`]: field-qualified `track:` / `artist:` /
//!    `album:` terms.
//! 2. [`SearchStrategy::CjkFallback`]: the plain fields joined by spaces, only
//!    when the input contains CJK text (field qualifiers tend to miss there).
//! 3. [`SearchStrategy::Loose`]: `"artist title"`, only when both are given.

use std::fmt;

use crate::matching::has_cjk;

/// One search attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    Primary,
    CjkFallback,
    Loose,
}

/// A concrete query for one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuery {
    pub strategy: SearchStrategy,
    pub query: String,
    pub limit: u32,
}

impl SearchStrategy {
    /// Result limit sent with the query.
    pub fn limit(&self) -> u32 {
        match self {
            SearchStrategy::Primary => 5,
            SearchStrategy::CjkFallback => 10,
            SearchStrategy::Loose => 2,
        }
    }

    /// Metric/log label.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Primary => "primary",
            SearchStrategy::CjkFallback => "cjk",
            SearchStrategy::Loose => "loose",
        }
    }

    /// Build this strategy's query, or `None` when it does not apply.
    pub fn query(&self, title: &str, artist: &str, album: &str) -> Option<String> {
        let query = match self {
            SearchStrategy::Primary => {
                let mut parts = Vec::with_capacity(3);
                if !title.is_empty() {
                    parts.push(format!("track:{title}"));
                }
                if !artist.is_empty() {
                    parts.push(format!("artist:{artist}"));
                }
                let album = clean_album(album);
                if !album.is_empty() {
                    parts.push(format!("album:{album}"));
                }
                parts.join(" ")
            }
            SearchStrategy::CjkFallback => {
                if !has_cjk(&format!("{title}{artist}{album}")) {
                    return None;
                }
                [title, artist, album]
                    .into_iter()
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            }
            SearchStrategy::Loose => {
                if title.is_empty() || artist.is_empty() {
                    return None;
                }
                format!("{artist} {title}")
            }
        };
        (!query.is_empty()).then_some(query)
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queries to run, in order, for the given (already cleaned) inputs.
pub fn plan(title: &str, artist: &str, album: &str) -> Vec<PlannedQuery> {
    [
        SearchStrategy::Primary,
        SearchStrategy::CjkFallback,
        SearchStrategy::Loose,
    ]
    .into_iter()
    .filter_map(|strategy| {
        strategy.query(title, artist, album).map(|query| PlannedQuery {
            strategy,
            query,
            limit: strategy.limit(),
        })
    })
    .collect()
}

/// Trailing `.,;:!` runs confuse the album qualifier.
fn clean_album(album: &str) -> &str {
    album
        .trim_end_matches(['.', ',', ';', ':', '!'])
        .trim()
}
