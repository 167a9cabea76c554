use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::constants::{MAX_TREND_SCORE, MIN_TREND_SCORE};
use crate::error::{DropReason, RecordError};
use crate::pipeline::processing::genre::{GenreResolution, GenreResolver, GenreSource};
use crate::pipeline::processing::normalize::{
    non_blank, normalize_id, normalize_name, normalize_state_code,
};
use crate::types::{CleanedRecord, RawTrendRecord};

/// Trait for implementing record validation and repair
pub trait QualityGate: Send + Sync {
    /// Turn one raw record into a cleaned record, or say why it must be dropped.
    ///
    /// `genres` is the resolver's answer for this record, computed beforehand.
    fn assess(
        &self,
        record: &RawTrendRecord,
        genres: Result<GenreResolution, RecordError>,
    ) -> Result<CleanedRecord, RecordError>;
}

/// Configuration for the cleaning rules
#[derive(Debug, Clone)]
pub struct QualityGateConfig {
    /// Inclusive lower bound for trend scores
    pub min_score: f64,
    /// Inclusive upper bound for trend scores
    pub max_score: f64,
    /// Value substituted for a missing score
    pub missing_score: f64,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_score: MIN_TREND_SCORE,
            max_score: MAX_TREND_SCORE,
            missing_score: 0.0,
        }
    }
}

/// Applies the cleaning rules in a fixed order:
///
/// 1. `artist_id`, `location` and `date` must be present (dropped otherwise; they
///    form the natural key and cannot be inferred).
/// 2. A missing score becomes 0, keeping the time series continuous.
/// 3. A score outside [0, 100] drops the row. Out-of-range values are corrupt
///    extraction, not noise, so they are never clamped.
/// 4. A malformed genre list drops the row; an empty one becomes `["unknown"]`.
/// 5. String fields are trimmed and canonicalized.
#[derive(Default)]
pub struct DefaultQualityGate {
    pub config: QualityGateConfig,
}

impl DefaultQualityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: QualityGateConfig) -> Self {
        Self { config }
    }
}

impl QualityGate for DefaultQualityGate {
    fn assess(
        &self,
        record: &RawTrendRecord,
        genres: Result<GenreResolution, RecordError>,
    ) -> Result<CleanedRecord, RecordError> {
        let artist_id = non_blank(record.artist_id.as_deref())
            .ok_or(RecordError::MissingKey { field: "artist_id" })?;
        let location = non_blank(record.location.as_deref())
            .ok_or(RecordError::MissingKey { field: "location" })?;
        let date = record.date.ok_or(RecordError::MissingKey { field: "date" })?;

        let (trend_score, score_imputed) = match record.trend_score {
            Some(score) => (score, false),
            None => (self.config.missing_score, true),
        };

        if !(self.config.min_score..=self.config.max_score).contains(&trend_score) {
            return Err(RecordError::ScoreOutOfRange { score: trend_score });
        }

        let resolution = genres?;

        Ok(CleanedRecord {
            source_row: record.source_row,
            artist: record.artist.as_deref().map(normalize_name).unwrap_or_default(),
            artist_id: normalize_id(artist_id),
            genres: resolution.genres,
            location: normalize_state_code(location),
            date,
            trend_score,
            score_imputed,
            genre_defaulted: resolution.source == GenreSource::Fallback,
            extracted_at: record.extracted_at,
        })
    }
}

/// Counters produced by one cleaning pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub received: u64,
    pub accepted: u64,
    pub dropped: BTreeMap<DropReason, u64>,
    pub score_zeroed: u64,
    pub genre_defaulted: u64,
    pub genre_from_cache: u64,
    pub genre_delimiters_normalized: u64,
}

impl CleaningReport {
    pub fn dropped_total(&self) -> u64 {
        self.dropped.values().sum()
    }

    pub fn dropped_for(&self, reason: DropReason) -> u64 {
        self.dropped.get(&reason).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: &CleaningReport) {
        self.received += other.received;
        self.accepted += other.accepted;
        for (reason, count) in &other.dropped {
            *self.dropped.entry(*reason).or_default() += count;
        }
        self.score_zeroed += other.score_zeroed;
        self.genre_defaulted += other.genre_defaulted;
        self.genre_from_cache += other.genre_from_cache;
        self.genre_delimiters_normalized += other.genre_delimiters_normalized;
    }
}

/// Resolve genres for and clean every record of a partition.
#[instrument(skip_all, fields(records = records.len()))]
pub fn clean_batch(
    gate: &dyn QualityGate,
    resolver: &GenreResolver,
    records: &[RawTrendRecord],
) -> (Vec<CleanedRecord>, CleaningReport) {
    let mut report = CleaningReport::default();
    let mut cleaned = Vec::with_capacity(records.len());

    for record in records {
        report.received += 1;
        let resolution = resolver.resolve(record.artist_id.as_deref(), &record.genres);
        if let Ok(r) = &resolution {
            if r.delimiters_normalized {
                report.genre_delimiters_normalized += 1;
            }
            if r.source == GenreSource::Cache {
                report.genre_from_cache += 1;
            }
        }

        match gate.assess(record, resolution) {
            Ok(clean) => {
                if clean.score_imputed {
                    report.score_zeroed += 1;
                }
                if clean.genre_defaulted {
                    report.genre_defaulted += 1;
                }
                report.accepted += 1;
                cleaned.push(clean);
            }
            Err(e) => {
                debug!(
                    source_row = record.source_row,
                    reason = %e.reason(),
                    "Dropping record: {}",
                    e
                );
                *report.dropped.entry(e.reason()).or_default() += 1;
            }
        }
    }

    info!(
        "Cleaned {} of {} records ({} dropped, {} score-zeroed, {} genre-defaulted)",
        report.accepted,
        report.received,
        report.dropped_total(),
        report.score_zeroed,
        report.genre_defaulted
    );
    (cleaned, report)
}
