//! Telemetry metric name constants.
//!
//! Centralised metric names for trackcheck operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `trackcheck_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `strategy` — search strategy (e.g. "primary", "cjk", "loose", "by_id")
//! - `status` — outcome: "ok" or "error"
//! - `kind` — cache map: "search" or "track"
//! - `reason` — retry cause: "rate_limited" or "network"

/// Total catalog requests issued (after retries resolved).
///
/// Labels: `strategy`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "trackcheck_requests_total";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `reason`.
pub const RETRIES_TOTAL: &str = "trackcheck_retries_total";

/// Total cache hits.
///
/// Labels: `kind`.
pub const CACHE_HITS_TOTAL: &str = "trackcheck_cache_hits_total";

/// Total cache misses.
///
/// Labels: `kind`.
pub const CACHE_MISSES_TOTAL: &str = "trackcheck_cache_misses_total";

/// Total cache entries evicted by quota enforcement.
pub const CACHE_EVICTIONS_TOTAL: &str = "trackcheck_cache_evictions_total";

/// Total match passes.
///
/// Labels: `outcome` ("matched" | "below_threshold" | "no_candidates").
pub const MATCHES_TOTAL: &str = "trackcheck_matches_total";
