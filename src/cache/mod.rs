//! Local cache for catalog lookups.
//!
//! - [`CacheStore`]: search results and resolved tracks with TTL validity,
//!   size accounting and quota-driven eviction, persisted through a
//!   [`KeyValueStorage`] with debounced flushes.
//! - [`MemoryStorage`] / [`FileStorage`]: storage backends. Both can be
//!   capped to simulate a real quota.
//! - [`Clock`]: time source for entry timestamps ([`ManualClock`] in tests).

pub mod clock;
pub mod storage;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::{CacheConfig, CacheEntry, CacheStats, CacheStore, ExpiredCounts, search_key};
