use std::collections::{BTreeMap, HashMap};

use crate::error::Result;
use crate::types::Artist;

/// Persistent surrogate-key allocation for the dimension tables.
///
/// Lookups are insert-if-missing, so calling them repeatedly with the same
/// natural key always yields the same id.
pub trait DimensionStore {
    fn genre_id(&mut self, name: &str) -> Result<i64>;

    fn location_id(&mut self, state_code: &str) -> Result<i64>;

    /// Insert or refresh an artist row and return the name now stored for it.
    /// An empty name never overwrites a known one.
    fn upsert_artist(&mut self, artist: &Artist) -> Result<String>;

    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct KeyState {
    genre_key: HashMap<String, i64>,
    location_key: HashMap<String, i64>,
    artist_label: BTreeMap<String, String>,
    genre_seq: i64,
    location_seq: i64,
}

/// In-memory key space. Used for dry runs and tests; rollback restores the
/// state captured by the last `begin`.
#[derive(Debug, Default)]
pub struct KeySpace {
    state: KeyState,
    checkpoint: Option<KeyState>,
}

impl KeySpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn genre_count(&self) -> usize {
        self.state.genre_key.len()
    }

    pub fn location_count(&self) -> usize {
        self.state.location_key.len()
    }

    pub fn artist_name(&self, artist_id: &str) -> Option<&str> {
        self.state.artist_label.get(artist_id).map(String::as_str)
    }
}

impl DimensionStore for KeySpace {
    fn genre_id(&mut self, name: &str) -> Result<i64> {
        if let Some(id) = self.state.genre_key.get(name) {
            return Ok(*id);
        }
        self.state.genre_seq += 1;
        let id = self.state.genre_seq;
        self.state.genre_key.insert(name.to_string(), id);
        Ok(id)
    }

    fn location_id(&mut self, state_code: &str) -> Result<i64> {
        if let Some(id) = self.state.location_key.get(state_code) {
            return Ok(*id);
        }
        self.state.location_seq += 1;
        let id = self.state.location_seq;
        self.state.location_key.insert(state_code.to_string(), id);
        Ok(id)
    }

    fn upsert_artist(&mut self, artist: &Artist) -> Result<String> {
        let label = self
            .state
            .artist_label
            .entry(artist.artist_id.clone())
            .or_default();
        if !artist.name.is_empty() {
            *label = artist.name.clone();
        }
        Ok(label.clone())
    }

    fn begin(&mut self) -> Result<()> {
        self.checkpoint = Some(self.state.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.checkpoint = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if let Some(saved) = self.checkpoint.take() {
            self.state = saved;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_idempotent() {
        let mut keys = KeySpace::new();
        let pop = keys.genre_id("pop").unwrap();
        let rock = keys.genre_id("rock").unwrap();
        assert_ne!(pop, rock);
        assert_eq!(keys.genre_id("pop").unwrap(), pop);
        assert_eq!(keys.location_id("CA").unwrap(), keys.location_id("CA").unwrap());
        assert_eq!(keys.genre_count(), 2);
        assert_eq!(keys.location_count(), 1);
    }

    #[test]
    fn test_empty_name_does_not_erase_label() {
        let mut keys = KeySpace::new();
        keys.upsert_artist(&Artist { artist_id: "A1".into(), name: "Wednesday".into() }).unwrap();
        let kept = keys.upsert_artist(&Artist { artist_id: "A1".into(), name: String::new() }).unwrap();
        assert_eq!(kept, "Wednesday");
        assert_eq!(keys.artist_name("A1"), Some("Wednesday"));
    }

    #[test]
    fn test_rollback_discards_new_keys() {
        let mut keys = KeySpace::new();
        keys.genre_id("pop").unwrap();
        keys.begin().unwrap();
        keys.genre_id("rock").unwrap();
        keys.rollback().unwrap();
        assert_eq!(keys.genre_count(), 1);
        // sequence restored too
        assert_eq!(keys.genre_id("jazz").unwrap(), 2);
    }
}
