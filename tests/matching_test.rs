use trackcheck::matching::{normalize, split_featuring};
use trackcheck::{MatchEngine, RemoteTrack, SimilarityScorer};

const SAMPLES: &[&str] = &[
    "Bohemian Rhapsody",
    "bohemian rhapsody (Remastered 2011)",
    "Song (feat. Someone)",
    "Song ft. Someone Else",
    "On & On 2",
    "曖昧",
    "曖昧な関係",
    "東京の夜",
    "Don't Stop Me Now",
    "",
    "   ",
    "!!!",
];

#[test]
fn similarity_is_symmetric_and_bounded() {
    let scorer = SimilarityScorer::new();
    for a in SAMPLES {
        for b in SAMPLES {
            let ab = scorer.score(a, b);
            let ba = scorer.score(b, a);
            assert_eq!(ab, ba, "score({a:?}, {b:?}) is not symmetric");
            assert!((0.0..=1.0).contains(&ab), "score({a:?}, {b:?}) = {ab}");
        }
    }
}

#[test]
fn normalization_is_idempotent() {
    for s in SAMPLES {
        let once = normalize(s);
        assert_eq!(normalize(&once), once, "normalize({s:?})");
    }
}

#[test]
fn featuring_clause_is_split() {
    let split = split_featuring("Song (feat. Someone)");
    assert!(split.has_feat);
    assert_eq!(split.main_title, "song");
    assert_eq!(split.feat_artist, "someone");
    assert!(!split_featuring("Feather").has_feat);
}

#[test]
fn exact_candidate_beats_remaster() {
    let engine = MatchEngine::new(0.7);
    let candidates = vec![
        RemoteTrack::new("live", "Bohemian Rhapsody - Live Aid", 360_000)
            .with_artist("Queen")
            .with_album("Live Aid"),
        RemoteTrack::new("studio", "Bohemian Rhapsody", 354_320)
            .with_artist("Queen")
            .with_album("A Night at the Opera"),
    ];

    let best = engine
        .find_best_match(&candidates, "Bohemian Rhapsody", "Queen", "A Night at the Opera")
        .expect("should match");
    assert_eq!(best.track.id, "studio");
    assert!((best.score - 1.0).abs() < 1e-9, "got {}", best.score);
}

#[test]
fn cjk_exact_title_matches() {
    let engine = MatchEngine::new(0.7);
    let candidates = vec![
        RemoteTrack::new("a", "曖昧な関係", 200_000).with_artist("歌手"),
        RemoteTrack::new("b", "曖昧", 210_000).with_artist("歌手"),
    ];
    let best = engine.find_best_match(&candidates, "曖昧", "歌手", "").expect("should match");
    assert_eq!(best.track.id, "b");
}

#[test]
fn shared_scorer_memo_can_be_cleared() {
    let scorer = std::sync::Arc::new(SimilarityScorer::new());
    let engine = MatchEngine::with_scorer(scorer.clone(), 0.7);
    let candidates = [RemoteTrack::new("1", "Song", 1000).with_artist("Band")];
    let first = engine.find_best_match(&candidates, "Song", "Band", "").unwrap();
    scorer.clear_memo();
    let second = engine.find_best_match(&candidates, "Song", "Band", "").unwrap();
    assert_eq!(first.score, second.score);
}

#[test]
fn candidate_scoring_exactly_the_threshold_is_accepted() {
    let candidates = [RemoteTrack::new("1", "Song", 1000).with_artist("Band")];
    let score = MatchEngine::new(0.7)
        .score_candidate(&candidates[0], "Song", "Band", "")
        .composite();
    // Exact title and artist without an album: 0.55 + 0.25.
    assert!((score - 0.8).abs() < 1e-9, "got {score}");

    let at = MatchEngine::new(score);
    let best = at.find_best_match(&candidates, "Song", "Band", "").expect("score equals threshold");
    assert_eq!(best.track.id, "1");

    let above = MatchEngine::new(score + 1e-6);
    assert!(above.find_best_match(&candidates, "Song", "Band", "").is_none());
}
