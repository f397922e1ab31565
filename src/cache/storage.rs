//! Durable key-value storage backends for the cache.
//!
//! [`KeyValueStorage`] is the persistence seam of [`CacheStore`](super::CacheStore):
//! string values under string keys, with an optional capacity that makes
//! writes fail with [`TrackcheckError::QuotaExceeded`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, warn};

use crate::{Result, TrackcheckError};

/// Durable string storage with a capacity limit.
pub trait KeyValueStorage: Send + Sync {
    /// Read a value. Missing keys give `Ok(None)`.
    fn read_string(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    ///
    /// Fails with [`TrackcheckError::QuotaExceeded`] when the value does not fit.
    fn write_string(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

fn quota_check(capacity: Option<usize>, used_by_others: usize, needed: usize) -> Result<()> {
    match capacity {
        Some(capacity) if used_by_others + needed > capacity => Err(TrackcheckError::QuotaExceeded {
            needed,
            available: capacity.saturating_sub(used_by_others),
        }),
        _ => Ok(()),
    }
}

// ============================================================================
// In-memory storage
// ============================================================================

/// In-process storage, optionally capped at a number of value bytes.
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
    capacity: Option<usize>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    /// Storage without a capacity limit.
    pub fn unbounded() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            capacity: None,
            writes: AtomicUsize::new(0),
        }
    }

    /// Storage that rejects writes once stored values exceed `bytes`.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            capacity: Some(bytes),
            ..Self::unbounded()
        }
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Total bytes of stored values.
    pub fn used_bytes(&self) -> usize {
        self.values
            .lock()
            .map(|values| values.values().map(String::len).sum())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|e| TrackcheckError::Storage(format!("failed to acquire storage lock: {e}")))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn read_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write_string(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.lock()?;
        let used_by_others: usize = values
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, v)| v.len())
            .sum();
        quota_check(self.capacity, used_by_others, value.len())?;
        values.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

// ============================================================================
// File storage
// ============================================================================

/// One JSON file per key in a directory, written atomically (tmp + rename).
pub struct FileStorage {
    dir: PathBuf,
    capacity: Option<usize>,
}

impl FileStorage {
    /// Storage rooted at `dir` (created on first write).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            capacity: None,
        }
    }

    /// Storage in the platform cache directory (`~/.cache/trackcheck` on Linux).
    pub fn default_location() -> Result<Self> {
        let base = dirs::cache_dir().ok_or_else(|| {
            TrackcheckError::Configuration("could not determine cache directory".into())
        })?;
        Ok(Self::new(base.join("trackcheck")))
    }

    /// Cap the total size of stored files.
    pub fn capacity(mut self, bytes: usize) -> Self {
        self.capacity = Some(bytes);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(TrackcheckError::InvalidInput(format!("invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn used_by_others(&self, exclude: &Path) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return 0;
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let path = entry.path();
                path != exclude && path.extension().is_some_and(|ext| ext == "json")
            })
            .filter_map(|entry| entry.metadata().ok())
            .map(|metadata| metadata.len() as usize)
            .sum()
    }
}

impl KeyValueStorage for FileStorage {
    fn read_string(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TrackcheckError::Storage(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    fn write_string(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        quota_check(self.capacity, self.used_by_others(&path), value.len())?;

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            TrackcheckError::Storage(format!(
                "failed to create cache dir {}: {e}",
                self.dir.display()
            ))
        })?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, value).map_err(|e| {
            TrackcheckError::Storage(format!("failed to write {}: {e}", tmp_path.display()))
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| {
            TrackcheckError::Storage(format!(
                "failed to rename {} → {}: {e}",
                tmp_path.display(),
                path.display()
            ))
        })?;

        debug!(path = %path.display(), bytes = value.len(), "wrote storage file");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove storage file");
                Err(TrackcheckError::Storage(format!(
                    "failed to remove {}: {e}",
                    path.display()
                )))
            }
        }
    }
}
