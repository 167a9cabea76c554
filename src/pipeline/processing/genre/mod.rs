//! Genre resolution: turn whatever genre text a record carries into a canonical
//! label list, falling back to the injected cache and finally to `unknown`.

pub mod cache;

pub use cache::{FileGenreCache, GenreCache, InMemoryGenreCache};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::constants::UNKNOWN_GENRE;
use crate::error::{CacheError, RecordError};
use crate::pipeline::processing::normalize::{normalize_genre, normalize_id, split_genre_text};

/// Where a resolved genre list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenreSource {
    /// The record carried its own genre text
    Record,
    /// Filled from the cache by artist id
    Cache,
    /// Nothing available; the list is `["unknown"]`
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenreResolution {
    pub genres: Vec<String>,
    pub source: GenreSource,
    pub delimiters_normalized: bool,
}

impl GenreResolution {
    fn fallback() -> Self {
        Self {
            genres: vec![UNKNOWN_GENRE.to_string()],
            source: GenreSource::Fallback,
            delimiters_normalized: false,
        }
    }
}

pub struct GenreResolver {
    cache: Arc<dyn GenreCache>,
    cache_errors: AtomicU64,
}

impl GenreResolver {
    pub fn new(cache: Arc<dyn GenreCache>) -> Self {
        Self {
            cache,
            cache_errors: AtomicU64::new(0),
        }
    }

    /// Resolver over an empty process-local cache.
    pub fn uncached() -> Self {
        Self::new(Arc::new(InMemoryGenreCache::new()))
    }

    /// Persist cache writes made during the run.
    pub fn flush(&self) -> Result<(), CacheError> {
        self.cache.flush()
    }

    /// Number of cache reads or writes that failed and were treated as misses.
    pub fn cache_errors(&self) -> u64 {
        self.cache_errors.load(Ordering::Relaxed)
    }

    /// Split the genre text fields of a record into labels, without consulting the cache.
    pub fn parse(raw_genres: &[String]) -> Result<(Vec<String>, bool), RecordError> {
        let mut labels: Vec<String> = Vec::new();
        let mut normalized = false;
        for text in raw_genres {
            let tokens = split_genre_text(text)?;
            normalized |= tokens.delimiters_normalized;
            for label in tokens.labels {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }
        Ok((labels, normalized))
    }

    /// Resolve the genre list for one record.
    ///
    /// A malformed list literal is a record error; a cache failure is not.
    pub fn resolve(
        &self,
        artist_id: Option<&str>,
        raw_genres: &[String],
    ) -> Result<GenreResolution, RecordError> {
        let (labels, delimiters_normalized) = Self::parse(raw_genres)?;
        if !labels.is_empty() {
            return Ok(GenreResolution {
                genres: labels,
                source: GenreSource::Record,
                delimiters_normalized,
            });
        }

        let Some(artist_id) = artist_id.map(normalize_id).filter(|id| !id.is_empty()) else {
            return Ok(GenreResolution::fallback());
        };

        match self.cache.get(&artist_id) {
            Ok(Some(cached)) => {
                let mut genres: Vec<String> = Vec::new();
                for label in cached.iter().map(|g| normalize_genre(g)) {
                    if !label.is_empty() && !genres.contains(&label) {
                        genres.push(label);
                    }
                }
                if genres.is_empty() {
                    return Ok(GenreResolution::fallback());
                }
                debug!(artist_id = %artist_id, "Genres filled from cache");
                Ok(GenreResolution {
                    genres,
                    source: GenreSource::Cache,
                    delimiters_normalized,
                })
            }
            Ok(None) => Ok(GenreResolution::fallback()),
            Err(e) => {
                self.cache_errors.fetch_add(1, Ordering::Relaxed);
                warn!(artist_id = %artist_id, "Genre cache lookup failed, using fallback: {}", e);
                Ok(GenreResolution::fallback())
            }
        }
    }

    /// Remember genres obtained for an artist. At most one write per artist id;
    /// `unknown`-only lists are never cached.
    pub fn learn(&self, artist_id: &str, genres: &[String]) -> bool {
        let artist_id = normalize_id(artist_id);
        let artist_id = artist_id.as_str();
        if artist_id.is_empty() || genres.is_empty() || genres.iter().all(|g| g == UNKNOWN_GENRE) {
            return false;
        }
        match self.cache.put_if_absent(artist_id, genres) {
            Ok(written) => written,
            Err(e) => {
                self.cache_errors.fetch_add(1, Ordering::Relaxed);
                warn!(artist_id, "Genre cache write failed: {}", e);
                false
            }
        }
    }
}
