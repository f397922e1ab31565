//! Fuzzy matching of local track metadata against catalog candidates.

pub mod engine;
pub mod normalize;
pub mod similarity;

pub use engine::{DEFAULT_MATCH_THRESHOLD, MatchEngine, SCORE_EPSILON};
pub use normalize::{
    FeaturingSplit, Normalizer, has_cjk, has_trailing_number, normalize, split_featuring,
    strip_trailing_number,
};
pub use similarity::SimilarityScorer;
