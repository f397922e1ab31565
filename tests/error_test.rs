use std::time::Duration;

use trackcheck::{Result, TrackcheckError};

#[test]
fn test_error_display() {
    let err = TrackcheckError::InvalidInput("track abc".to_string());
    assert!(err.to_string().contains("track abc"));

    let err = TrackcheckError::QuotaExceeded {
        needed: 2048,
        available: 1024,
    };
    assert!(err.to_string().contains("2048"));
    assert!(err.is_quota_exceeded());
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(TrackcheckError::AuthenticationRequired)
    }
    assert!(returns_error().is_err());
}

#[test]
fn json_errors_convert() {
    fn parse() -> Result<serde_json::Value> {
        Ok(serde_json::from_str("{not json")?)
    }
    assert!(matches!(parse(), Err(TrackcheckError::Json(_))));
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(TrackcheckError::RateLimited { retry_after: None }.is_transient());
    assert!(TrackcheckError::Http("connection reset".into()).is_transient());
    assert!(
        TrackcheckError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient()
    );
}

#[test]
fn permanent_errors() {
    assert!(!TrackcheckError::AuthenticationRequired.is_transient());
    assert!(!TrackcheckError::AuthenticationFailed("bad secret".into()).is_transient());
    assert!(!TrackcheckError::InvalidInput("url".into()).is_transient());
    assert!(
        !TrackcheckError::Api {
            status: 404,
            message: "missing".into()
        }
        .is_transient()
    );
}

#[test]
fn retry_after_hint() {
    let err = TrackcheckError::RateLimited {
        retry_after: Some(Duration::from_secs(3)),
    };
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    assert_eq!(TrackcheckError::Http("x".into()).retry_after(), None);
}
