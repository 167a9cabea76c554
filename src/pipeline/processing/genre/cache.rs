use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::CacheError;

/// Key-value store of resolved genre lists, keyed by artist id.
///
/// Reads may be stale and writes are last-write-wins; a miss is always safe
/// because the resolver falls back to `unknown`.
pub trait GenreCache: Send + Sync {
    fn get(&self, artist_id: &str) -> Result<Option<Vec<String>>, CacheError>;

    fn put(&self, artist_id: &str, genres: &[String]) -> Result<(), CacheError>;

    /// Write only when the artist has no entry yet. Returns whether a write happened.
    fn put_if_absent(&self, artist_id: &str, genres: &[String]) -> Result<bool, CacheError> {
        if self.get(artist_id)?.is_some() {
            return Ok(false);
        }
        self.put(artist_id, genres)?;
        Ok(true)
    }

    /// Persist pending writes, if the cache is backed by durable storage.
    fn flush(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Process-local cache guarded by a reader-writer lock.
#[derive(Default)]
pub struct InMemoryGenreCache {
    entries: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryGenreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, Vec<String>>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Result<HashMap<String, Vec<String>>, CacheError> {
        self.entries
            .read()
            .map(|e| e.clone())
            .map_err(|_| CacheError::Unavailable("lock poisoned".to_string()))
    }
}

impl GenreCache for InMemoryGenreCache {
    fn get(&self, artist_id: &str) -> Result<Option<Vec<String>>, CacheError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CacheError::Unavailable("lock poisoned".to_string()))?;
        Ok(entries.get(artist_id).cloned())
    }

    fn put(&self, artist_id: &str, genres: &[String]) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| CacheError::Unavailable("lock poisoned".to_string()))?;
        entries.insert(artist_id.to_string(), genres.to_vec());
        Ok(())
    }

    fn put_if_absent(&self, artist_id: &str, genres: &[String]) -> Result<bool, CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| CacheError::Unavailable("lock poisoned".to_string()))?;
        if entries.contains_key(artist_id) {
            return Ok(false);
        }
        entries.insert(artist_id.to_string(), genres.to_vec());
        Ok(true)
    }
}

/// JSON-file-backed cache. Loaded once on open, written back atomically by [`flush`].
///
/// [`flush`]: GenreCache::flush
pub struct FileGenreCache {
    path: PathBuf,
    inner: InMemoryGenreCache,
    dirty: AtomicBool,
}

impl FileGenreCache {
    /// Open the cache at `path`. A missing or unreadable file yields an empty cache;
    /// individual corrupt entries are skipped.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring genre cache at {}: {}", path.display(), e);
                HashMap::new()
            }
        };
        info!("Loaded {} cached genre entries from {}", entries.len(), path.display());
        Self {
            path,
            inner: InMemoryGenreCache::from_entries(entries),
            dirty: AtomicBool::new(false),
        }
    }

    fn load(path: &Path) -> Result<HashMap<String, Vec<String>>, CacheError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(path)?;
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(&content)?;
        let mut entries = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            match serde_json::from_value::<Vec<String>>(value) {
                Ok(genres) => {
                    entries.insert(key, genres);
                }
                Err(_) => warn!("{}", CacheError::Corrupt { key }),
            }
        }
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl GenreCache for FileGenreCache {
    fn get(&self, artist_id: &str) -> Result<Option<Vec<String>>, CacheError> {
        self.inner.get(artist_id)
    }

    fn put(&self, artist_id: &str, genres: &[String]) -> Result<(), CacheError> {
        self.inner.put(artist_id, genres)?;
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn put_if_absent(&self, artist_id: &str, genres: &[String]) -> Result<bool, CacheError> {
        let written = self.inner.put_if_absent(artist_id, genres)?;
        if written {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(written)
    }

    /// Persist pending writes. The file is replaced by rename, so readers never
    /// observe a half-written cache.
    fn flush(&self) -> Result<(), CacheError> {
        if !self.dirty.load(Ordering::Acquire) {
            debug!("Genre cache unchanged, skipping flush");
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let snapshot = self.inner.snapshot()?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&snapshot)?)?;
        fs::rename(&tmp, &self.path)?;
        self.dirty.store(false, Ordering::Release);
        info!("Flushed {} genre cache entries to {}", snapshot.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_put_if_absent_writes_once() {
        let cache = InMemoryGenreCache::new();
        assert!(cache.put_if_absent("a1", &labels(&["pop"])).unwrap());
        assert!(!cache.put_if_absent("a1", &labels(&["rock"])).unwrap());
        assert_eq!(cache.get("a1").unwrap(), Some(labels(&["pop"])));
    }

    #[test]
    fn test_file_cache_round_trips_through_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache").join("genres.json");

        let cache = FileGenreCache::open(&path);
        assert!(cache.is_empty());
        cache.put("a1", &labels(&["pop", "rock"])).unwrap();
        cache.flush().unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = FileGenreCache::open(&path);
        assert_eq!(reopened.get("a1").unwrap(), Some(labels(&["pop", "rock"])));
    }

    #[test]
    fn test_corrupt_file_and_entries_are_treated_as_misses() {
        let dir = tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();
        assert!(FileGenreCache::open(&broken).is_empty());

        let partial = dir.path().join("partial.json");
        fs::write(&partial, r#"{"a1": ["pop"], "a2": 42}"#).unwrap();
        let cache = FileGenreCache::open(&partial);
        assert_eq!(cache.get("a1").unwrap(), Some(labels(&["pop"])));
        assert_eq!(cache.get("a2").unwrap(), None);
    }
}
