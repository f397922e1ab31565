use std::sync::Arc;
use std::time::Duration;

use trackcheck::cache::{CacheConfig, CacheStore, FileStorage, ManualClock, MemoryStorage, search_key};
use trackcheck::RemoteTrack;

fn track(id: &str) -> RemoteTrack {
    RemoteTrack::new(id, format!("Song {id}"), 180_000).with_artist("Band")
}

fn store_with(config: CacheConfig, storage: Arc<MemoryStorage>, clock: Arc<ManualClock>) -> CacheStore {
    CacheStore::with_clock(config, storage, clock).expect("valid cache config")
}

// ============================================================================
// Debounced persistence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn burst_of_writes_is_persisted_once() {
    let storage = Arc::new(MemoryStorage::unbounded());
    let clock = Arc::new(ManualClock::new(0));
    let config = CacheConfig::new().flush_delay(Duration::from_millis(500));
    let store = store_with(config, storage.clone(), clock);

    for i in 0..5 {
        store.put_search(search_key(&format!("title {i}"), "band", ""), vec![track(&i.to_string())]);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(storage.write_count(), 0, "nothing persisted inside the quiet window");

    tokio::time::sleep(Duration::from_millis(600)).await;
    // One persist writes the search map and the track map.
    assert_eq!(storage.write_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn explicit_flush_cancels_pending_write() {
    let storage = Arc::new(MemoryStorage::unbounded());
    let store = store_with(CacheConfig::new(), storage.clone(), Arc::new(ManualClock::new(0)));

    store.put_track(track("a"));
    store.flush();
    assert_eq!(storage.write_count(), 2);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(storage.write_count(), 2, "debounced flush was cancelled");
}

#[test]
fn concurrent_flushes_leave_latest_state_persisted() {
    let storage = Arc::new(MemoryStorage::unbounded());
    let store = store_with(CacheConfig::new(), storage.clone(), Arc::new(ManualClock::new(0)));

    // No runtime here, so every put persists synchronously as well.
    let workers: Vec<_> = (0..8)
        .map(|w| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..5 {
                    store.put_track(track(&format!("w{w}-{i}")));
                    store.flush();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let reloaded = store_with(CacheConfig::new(), storage, Arc::new(ManualClock::new(0)));
    assert_eq!(reloaded.stats().track_count, 40);
}

// ============================================================================
// Quota handling
// ============================================================================

#[test]
fn persisted_size_stays_within_quota() {
    let storage = Arc::new(MemoryStorage::unbounded());
    let clock = Arc::new(ManualClock::new(0));
    let config = CacheConfig::new()
        .max_size_bytes(4000)
        .cleanup_threshold_bytes(3000)
        .min_remaining_bytes(1000);
    let store = store_with(config, storage.clone(), clock.clone());

    for i in 0..100 {
        store.put_track(track(&format!("{i:03}")));
        clock.advance(1);
        // max_size_bytes - min_remaining_bytes
        assert!(storage.used_bytes() <= 3000, "persisted {} bytes", storage.used_bytes());
        assert!(store.approx_size_bytes() <= 3000);
    }
    assert!(store.has_cached_data());
    // The newest entry always survives pruning.
    assert!(store.cached_track("099").is_some());
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = CacheConfig::new().max_size_bytes(1000).cleanup_threshold_bytes(2000);
    let err = CacheStore::with_clock(
        config,
        Arc::new(MemoryStorage::unbounded()),
        Arc::new(ManualClock::new(0)),
    )
    .err()
    .expect("cleanup threshold above the maximum must be rejected");
    assert!(matches!(err, trackcheck::TrackcheckError::Configuration(_)));
}

#[test]
fn storage_rejection_evicts_oldest_first() {
    let clock = Arc::new(ManualClock::new(1000));
    // Measure the persisted size of ten tracks with an unlimited store.
    let reference = store_with(
        CacheConfig::new(),
        Arc::new(MemoryStorage::unbounded()),
        Arc::new(ManualClock::new(1000)),
    );
    let ids: Vec<String> = (0..10).map(|i| format!("t{i:02}")).collect();
    for id in &ids {
        reference.put_track(track(id));
    }
    let full_size = reference.approx_size_bytes();

    // The same ten tracks do not fit into a slightly smaller store.
    let storage = Arc::new(MemoryStorage::with_capacity(full_size - 1));
    let store = store_with(CacheConfig::new(), storage.clone(), clock.clone());
    for id in &ids {
        store.put_track(track(id));
        clock.advance(1);
    }

    let stats = store.stats();
    assert_eq!(stats.track_count, 7);
    for id in &ids[..3] {
        assert!(store.track_entry(id).is_none(), "{id} should have been evicted");
    }
    for id in &ids[3..] {
        assert!(store.track_entry(id).is_some(), "{id} should remain");
    }
    assert!(storage.used_bytes() < full_size);
}

// ============================================================================
// Expiry across reloads
// ============================================================================

#[test]
fn persisted_entries_keep_their_age_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let config = CacheConfig::new().max_age(Duration::from_secs(60));

    let first = CacheStore::with_clock(config.clone(), Arc::new(FileStorage::new(dir.path())), clock.clone())
        .unwrap();
    let key = search_key("Song", "Band", "");
    first.put_search(key.clone(), vec![track("a")]);
    first.put_track(track("a"));
    first.flush();

    clock.advance(30_000);
    let second = CacheStore::with_clock(config, Arc::new(FileStorage::new(dir.path())), clock.clone())
        .unwrap();
    assert_eq!(second.cached_search(&key).map(|r| r.len()), Some(1));
    assert!(second.cached_track("a").is_some());

    clock.advance(30_000);
    assert!(second.cached_search(&key).is_none(), "expired at exactly max_age");
    let removed = second.cleanup_expired();
    assert_eq!(removed.searches_removed, 1);
    assert_eq!(removed.tracks_removed, 1);
    assert!(!second.has_cached_data());
}

#[test]
fn disabled_cache_ignores_writes_and_reads() {
    let storage = Arc::new(MemoryStorage::unbounded());
    let store = store_with(CacheConfig::new(), storage.clone(), Arc::new(ManualClock::new(0)));
    store.put_track(track("a"));
    store.set_enabled(false);

    assert!(store.cached_track("a").is_none());
    store.put_track(track("b"));
    assert!(store.track_entry("b").is_none());

    // The toggle survives a reload.
    let reloaded = store_with(CacheConfig::new(), storage, Arc::new(ManualClock::new(0)));
    assert!(!reloaded.is_enabled());
}
