use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One extracted (artist, location, date) observation as read from an extract file.
///
/// Every field the extractor may omit is optional here; the quality gate decides
/// what is repairable and what is dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawTrendRecord {
    /// 1-based position of the row in its extract file
    pub source_row: u64,
    pub artist: Option<String>,
    pub artist_id: Option<String>,
    /// Genre text as delivered: delimited strings, list literals or single labels
    pub genres: Vec<String>,
    pub location: Option<String>,
    pub date: Option<NaiveDate>,
    pub trend_score: Option<f64>,
    pub extracted_at: Option<DateTime<Utc>>,
}

impl RawTrendRecord {
    /// Minimal record for a given key; convenient for building fixtures.
    pub fn new(source_row: u64, artist_id: &str, location: &str, date: NaiveDate) -> Self {
        Self {
            source_row,
            artist: None,
            artist_id: Some(artist_id.to_string()),
            genres: Vec::new(),
            location: Some(location.to_string()),
            date: Some(date),
            trend_score: None,
            extracted_at: None,
        }
    }

    pub fn with_artist(mut self, artist: &str) -> Self {
        self.artist = Some(artist.to_string());
        self
    }

    pub fn with_genres(mut self, genres: &str) -> Self {
        self.genres = vec![genres.to_string()];
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.trend_score = Some(score);
        self
    }

    pub fn with_extracted_at(mut self, at: DateTime<Utc>) -> Self {
        self.extracted_at = Some(at);
        self
    }
}

/// Natural key of a trend observation. At most one cleaned record exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub artist_id: String,
    pub location: String,
    pub date: NaiveDate,
}

/// A raw record that passed the quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub source_row: u64,
    pub artist: String,
    pub artist_id: String,
    /// Non-empty, lower-cased, no duplicates
    pub genres: Vec<String>,
    /// Upper-cased region code
    pub location: String,
    pub date: NaiveDate,
    /// Always within [0, 100]
    pub trend_score: f64,
    /// The extract carried no score and it was zeroed
    pub score_imputed: bool,
    /// The genre list was replaced with `unknown`
    pub genre_defaulted: bool,
    pub extracted_at: Option<DateTime<Utc>>,
}

impl CleanedRecord {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            artist_id: self.artist_id.clone(),
            location: self.location.clone(),
            date: self.date,
        }
    }
}

/// A cleaned record narrowed to a single genre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplodedRecord {
    pub artist_id: String,
    pub genre: String,
    pub location: String,
    pub date: NaiveDate,
    pub trend_score: f64,
}

// Output rows. Field names are the column names of the published tables.

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Artist {
    pub artist_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Genre {
    pub genre_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub location_id: i64,
    pub state_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtistGenre {
    pub artist_id: String,
    pub genre_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistTrend {
    pub artist_id: String,
    pub location_id: i64,
    pub trend_date: NaiveDate,
    pub trend_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreTrend {
    pub genre_id: i64,
    pub location_id: i64,
    pub trend_date: NaiveDate,
    pub aggregated_score: f64,
}

/// The five normalized tables plus the genre rollup for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StarSchema {
    pub artists: Vec<Artist>,
    pub genres: Vec<Genre>,
    pub locations: Vec<Location>,
    pub artist_genres: Vec<ArtistGenre>,
    pub artist_trends: Vec<ArtistTrend>,
    pub genre_trends: Vec<GenreTrend>,
}
