//! Schema mapping: project cleaned and exploded records onto the star schema.
//!
//! `fact_artist_trends` is built from cleaned (pre-explosion) records so an
//! artist's score is never repeated per genre. `fact_genre_trends` is the
//! arithmetic mean of `trend_score` over the exploded records of each
//! (genre, location, date), i.e. the mean across contributing artists.

pub mod dim_store;
pub mod keyspace;

pub use dim_store::SqliteDimensionStore;
pub use keyspace::{DimensionStore, KeySpace};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, instrument};

use crate::error::{Result, TrendsError};
use crate::types::{
    Artist, ArtistGenre, ArtistTrend, CleanedRecord, ExplodedRecord, Genre, GenreTrend, Location,
    StarSchema,
};

pub struct SchemaMapper<'a> {
    store: &'a mut dyn DimensionStore,
}

impl<'a> SchemaMapper<'a> {
    pub fn new(store: &'a mut dyn DimensionStore) -> Self {
        Self { store }
    }

    /// Map one batch. New natural keys are interned in sorted order, so a fresh
    /// store assigns the same ids regardless of input row order.
    #[instrument(skip_all, fields(cleaned = cleaned.len(), exploded = exploded.len()))]
    pub fn map(&mut self, cleaned: &[CleanedRecord], exploded: &[ExplodedRecord]) -> Result<StarSchema> {
        let genre_ids = self.intern_genres(exploded)?;
        let location_ids = self.intern_locations(cleaned, exploded)?;
        let artists = self.upsert_artists(cleaned)?;

        let genres: Vec<Genre> = sorted_by_id(&genre_ids)
            .into_iter()
            .map(|(name, genre_id)| Genre { genre_id, name })
            .collect();
        let locations: Vec<Location> = sorted_by_id(&location_ids)
            .into_iter()
            .map(|(state_code, location_id)| Location { location_id, state_code })
            .collect();

        let artist_genres: Vec<ArtistGenre> = exploded
            .iter()
            .map(|e| {
                Ok(ArtistGenre {
                    artist_id: e.artist_id.clone(),
                    genre_id: lookup(&genre_ids, &e.genre, "genre")?,
                })
            })
            .collect::<Result<BTreeSet<_>>>()?
            .into_iter()
            .collect();

        let artist_trends = build_artist_trends(cleaned, &location_ids)?;
        let genre_trends = build_genre_trends(exploded, &genre_ids, &location_ids)?;

        let schema = StarSchema {
            artists,
            genres,
            locations,
            artist_genres,
            artist_trends,
            genre_trends,
        };
        info!(
            "Mapped batch: {} artists, {} genres, {} locations, {} artist-genre links, {} artist trends, {} genre trends",
            schema.artists.len(),
            schema.genres.len(),
            schema.locations.len(),
            schema.artist_genres.len(),
            schema.artist_trends.len(),
            schema.genre_trends.len()
        );
        Ok(schema)
    }

    fn intern_genres(&mut self, exploded: &[ExplodedRecord]) -> Result<HashMap<String, i64>> {
        let names: BTreeSet<&str> = exploded.iter().map(|e| e.genre.as_str()).collect();
        let mut ids = HashMap::with_capacity(names.len());
        for name in names {
            ids.insert(name.to_string(), self.store.genre_id(name)?);
        }
        Ok(ids)
    }

    fn intern_locations(
        &mut self,
        cleaned: &[CleanedRecord],
        exploded: &[ExplodedRecord],
    ) -> Result<HashMap<String, i64>> {
        let codes: BTreeSet<&str> = cleaned
            .iter()
            .map(|c| c.location.as_str())
            .chain(exploded.iter().map(|e| e.location.as_str()))
            .collect();
        let mut ids = HashMap::with_capacity(codes.len());
        for code in codes {
            ids.insert(code.to_string(), self.store.location_id(code)?);
        }
        Ok(ids)
    }

    /// One row per artist id. The name comes from the artist's latest observation
    /// that carries one, else from the store.
    fn upsert_artists(&mut self, cleaned: &[CleanedRecord]) -> Result<Vec<Artist>> {
        let mut latest: BTreeMap<&str, (chrono::NaiveDate, u64, &str)> = BTreeMap::new();
        for record in cleaned {
            let candidate = (record.date, record.source_row, record.artist.as_str());
            let slot = latest
                .entry(record.artist_id.as_str())
                .or_insert((record.date, record.source_row, ""));
            if !candidate.2.is_empty() && (slot.2.is_empty() || (candidate.0, candidate.1) > (slot.0, slot.1)) {
                *slot = candidate;
            }
        }

        let mut artists = Vec::with_capacity(latest.len());
        for (artist_id, (_, _, name)) in latest {
            let mut artist = Artist {
                artist_id: artist_id.to_string(),
                name: name.to_string(),
            };
            artist.name = self.store.upsert_artist(&artist)?;
            artists.push(artist);
        }
        Ok(artists)
    }
}

fn sorted_by_id(ids: &HashMap<String, i64>) -> Vec<(String, i64)> {
    let mut rows: Vec<(String, i64)> = ids.iter().map(|(k, v)| (k.clone(), *v)).collect();
    rows.sort_by_key(|(_, id)| *id);
    rows
}

fn lookup(ids: &HashMap<String, i64>, key: &str, kind: &str) -> Result<i64> {
    ids.get(key)
        .copied()
        .ok_or_else(|| TrendsError::Invariant(format!("{} '{}' has no dimension key", kind, key)))
}

fn build_artist_trends(
    cleaned: &[CleanedRecord],
    location_ids: &HashMap<String, i64>,
) -> Result<Vec<ArtistTrend>> {
    let mut rows: BTreeMap<(String, i64, chrono::NaiveDate), f64> = BTreeMap::new();
    for record in cleaned {
        let location_id = lookup(location_ids, &record.location, "location")?;
        let key = (record.artist_id.clone(), location_id, record.date);
        if rows.insert(key, record.trend_score).is_some() {
            return Err(TrendsError::Invariant(format!(
                "duplicate artist trend for ({}, {}, {}); records must be deduplicated before mapping",
                record.artist_id, record.location, record.date
            )));
        }
    }
    Ok(rows
        .into_iter()
        .map(|((artist_id, location_id, trend_date), trend_score)| ArtistTrend {
            artist_id,
            location_id,
            trend_date,
            trend_score,
        })
        .collect())
}

fn build_genre_trends(
    exploded: &[ExplodedRecord],
    genre_ids: &HashMap<String, i64>,
    location_ids: &HashMap<String, i64>,
) -> Result<Vec<GenreTrend>> {
    let mut groups: BTreeMap<(i64, i64, chrono::NaiveDate), (f64, u32)> = BTreeMap::new();
    for record in exploded {
        let genre_id = lookup(genre_ids, &record.genre, "genre")?;
        let location_id = lookup(location_ids, &record.location, "location")?;
        let acc = groups.entry((genre_id, location_id, record.date)).or_insert((0.0, 0));
        acc.0 += record.trend_score;
        acc.1 += 1;
    }
    Ok(groups
        .into_iter()
        .map(|((genre_id, location_id, trend_date), (sum, n))| GenreTrend {
            genre_id,
            location_id,
            trend_date,
            aggregated_score: sum / f64::from(n),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::explode::explode_batch;
    use chrono::NaiveDate;

    fn cleaned(row: u64, artist_id: &str, name: &str, genres: &[&str], location: &str, score: f64) -> CleanedRecord {
        CleanedRecord {
            source_row: row,
            artist: name.to_string(),
            artist_id: artist_id.to_string(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            location: location.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            trend_score: score,
            score_imputed: false,
            genre_defaulted: false,
            extracted_at: None,
        }
    }

    fn batch() -> Vec<CleanedRecord> {
        vec![
            cleaned(1, "A1", "Alvvays", &["pop", "rock"], "CA", 40.0),
            cleaned(2, "A2", "Snail Mail", &["rock"], "CA", 80.0),
            cleaned(3, "A2", "", &["rock"], "NY", 10.0),
        ]
    }

    #[test]
    fn test_artist_trends_do_not_repeat_per_genre() {
        let cleaned = batch();
        let exploded = explode_batch(&cleaned);
        let mut keys = KeySpace::new();
        let schema = SchemaMapper::new(&mut keys).map(&cleaned, &exploded).unwrap();

        assert_eq!(exploded.len(), 4);
        assert_eq!(schema.artist_trends.len(), 3);
        assert_eq!(schema.artist_genres.len(), 3);
        assert_eq!(schema.genres.len(), 2);
        assert_eq!(schema.locations.len(), 2);
    }

    #[test]
    fn test_genre_trend_is_mean_across_artists() {
        let cleaned = batch();
        let exploded = explode_batch(&cleaned);
        let mut keys = KeySpace::new();
        let schema = SchemaMapper::new(&mut keys).map(&cleaned, &exploded).unwrap();

        let rock = schema.genres.iter().find(|g| g.name == "rock").unwrap().genre_id;
        let ca = schema.locations.iter().find(|l| l.state_code == "CA").unwrap().location_id;
        let row = schema
            .genre_trends
            .iter()
            .find(|t| t.genre_id == rock && t.location_id == ca)
            .unwrap();
        assert_eq!(row.aggregated_score, 60.0);
        for trend in &schema.genre_trends {
            assert!((0.0..=100.0).contains(&trend.aggregated_score));
        }
    }

    #[test]
    fn test_mapping_twice_yields_same_dimensions() {
        let cleaned = batch();
        let exploded = explode_batch(&cleaned);
        let mut keys = KeySpace::new();
        let first = SchemaMapper::new(&mut keys).map(&cleaned, &exploded).unwrap();
        let second = SchemaMapper::new(&mut keys).map(&cleaned, &exploded).unwrap();

        assert_eq!(first.genres, second.genres);
        assert_eq!(first.locations, second.locations);
        assert_eq!(first.artists, second.artists);
        assert_eq!(keys.genre_count(), 2);
        assert_eq!(keys.location_count(), 2);
    }

    #[test]
    fn test_ids_do_not_depend_on_row_order() {
        let cleaned = batch();
        let mut reversed = cleaned.clone();
        reversed.reverse();

        let mut a = KeySpace::new();
        let mut b = KeySpace::new();
        let one = SchemaMapper::new(&mut a).map(&cleaned, &explode_batch(&cleaned)).unwrap();
        let two = SchemaMapper::new(&mut b).map(&reversed, &explode_batch(&reversed)).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn test_artist_name_keeps_latest_non_empty() {
        let cleaned = batch();
        let mut keys = KeySpace::new();
        let schema = SchemaMapper::new(&mut keys).map(&cleaned, &explode_batch(&cleaned)).unwrap();
        let a2 = schema.artists.iter().find(|a| a.artist_id == "A2").unwrap();
        assert_eq!(a2.name, "Snail Mail");
    }

    #[test]
    fn test_unnamed_artist_published_with_stored_name() {
        let mut keys = KeySpace::new();
        let earlier = vec![cleaned(1, "A1", "Alvvays", &["pop"], "CA", 40.0)];
        SchemaMapper::new(&mut keys).map(&earlier, &explode_batch(&earlier)).unwrap();

        let unnamed = vec![cleaned(1, "A1", "", &["pop"], "NY", 20.0)];
        let schema = SchemaMapper::new(&mut keys)
            .map(&unnamed, &explode_batch(&unnamed))
            .unwrap();
        assert_eq!(schema.artists[0].name, "Alvvays");
        assert_eq!(keys.artist_name("A1"), Some("Alvvays"));
    }

    #[test]
    fn test_duplicate_natural_key_is_rejected() {
        let mut cleaned = batch();
        cleaned.push(cleaned[0].clone());
        let mut keys = KeySpace::new();
        let err = SchemaMapper::new(&mut keys)
            .map(&cleaned, &explode_batch(&cleaned))
            .unwrap_err();
        assert!(matches!(err, TrendsError::Invariant(_)));
    }
}
