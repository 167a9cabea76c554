//! Collapse cleaned records to one per (artist_id, location, date).
//!
//! When duplicates disagree the winner is chosen by, in order:
//! 1. latest `extracted_at` (a record with a timestamp beats one without),
//! 2. an observed score over an imputed (null → 0) one,
//! 3. the lowest source row, i.e. first seen in the extract,
//! 4. the higher score, then the remaining fields, so that identical inputs
//!    always produce the same winner.
//!
//! Conflicting scores are never averaged.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::types::{CleanedRecord, NaturalKey};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DedupReport {
    pub input: u64,
    pub output: u64,
    /// Records discarded because another record won their key
    pub collapsed: u64,
    /// Keys whose candidates carried different scores
    pub conflicting_keys: u64,
}

impl DedupReport {
    pub fn merge(&mut self, other: &DedupReport) {
        self.input += other.input;
        self.output += other.output;
        self.collapsed += other.collapsed;
        self.conflicting_keys += other.conflicting_keys;
    }
}

/// Total preference order between two candidates for the same key.
/// `Ordering::Greater` means `a` should be kept over `b`.
pub fn preference(a: &CleanedRecord, b: &CleanedRecord) -> Ordering {
    a.extracted_at
        .cmp(&b.extracted_at)
        .then_with(|| b.score_imputed.cmp(&a.score_imputed))
        .then_with(|| b.source_row.cmp(&a.source_row))
        .then_with(|| a.trend_score.total_cmp(&b.trend_score))
        .then_with(|| a.artist.cmp(&b.artist))
        .then_with(|| a.genres.cmp(&b.genres))
}

struct Slot {
    record: CleanedRecord,
    conflicting: bool,
}

/// Deduplicate a set of cleaned records. Output is sorted by natural key.
#[instrument(skip_all, fields(records = records.len()))]
pub fn deduplicate(records: Vec<CleanedRecord>) -> (Vec<CleanedRecord>, DedupReport) {
    let mut report = DedupReport {
        input: records.len() as u64,
        ..Default::default()
    };
    let mut slots: HashMap<NaturalKey, Slot> = HashMap::with_capacity(records.len());

    for record in records {
        let key = record.natural_key();
        match slots.get_mut(&key) {
            None => {
                slots.insert(
                    key,
                    Slot {
                        record,
                        conflicting: false,
                    },
                );
            }
            Some(slot) => {
                report.collapsed += 1;
                if slot.record.trend_score.to_bits() != record.trend_score.to_bits() {
                    slot.conflicting = true;
                }
                if preference(&record, &slot.record) == Ordering::Greater {
                    debug!(
                        artist_id = %key.artist_id,
                        location = %key.location,
                        date = %key.date,
                        kept_row = record.source_row,
                        dropped_row = slot.record.source_row,
                        "Duplicate replaced earlier candidate"
                    );
                    slot.record = record;
                }
            }
        }
    }

    let mut survivors: Vec<(NaturalKey, Slot)> = slots.into_iter().collect();
    survivors.sort_by(|a, b| a.0.cmp(&b.0));

    report.conflicting_keys = survivors.iter().filter(|(_, s)| s.conflicting).count() as u64;
    let deduped: Vec<CleanedRecord> = survivors.into_iter().map(|(_, s)| s.record).collect();
    report.output = deduped.len() as u64;

    info!(
        "Deduplicated {} records into {} ({} collapsed, {} keys with conflicting scores)",
        report.input, report.output, report.collapsed, report.conflicting_keys
    );
    (deduped, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn record(row: u64, artist_id: &str, score: f64) -> CleanedRecord {
        CleanedRecord {
            source_row: row,
            artist: "Artist".to_string(),
            artist_id: artist_id.to_string(),
            genres: vec!["pop".to_string()],
            location: "CA".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            trend_score: score,
            score_imputed: false,
            genre_defaulted: false,
            extracted_at: None,
        }
    }

    #[test]
    fn test_one_record_per_natural_key() {
        let mut other_day = record(3, "A1", 10.0);
        other_day.date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let input = vec![record(1, "A1", 10.0), record(2, "A1", 10.0), other_day, record(4, "A2", 5.0)];

        let (out, report) = deduplicate(input);
        assert_eq!(out.len(), 3);
        assert_eq!(report.collapsed, 1);
        assert_eq!(report.conflicting_keys, 0);
    }

    #[test]
    fn test_winner_is_independent_of_row_order() {
        let a = record(7, "A1", 30.0);
        let b = record(2, "A1", 55.0);
        let c = record(9, "A1", 80.0);

        let orders = vec![
            vec![a.clone(), b.clone(), c.clone()],
            vec![c.clone(), b.clone(), a.clone()],
            vec![b.clone(), c.clone(), a.clone()],
        ];
        for order in orders {
            let (out, report) = deduplicate(order);
            assert_eq!(out.len(), 1);
            // first seen in the extract wins
            assert_eq!(out[0].source_row, 2);
            assert_eq!(out[0].trend_score, 55.0);
            assert_eq!(report.conflicting_keys, 1);
        }
    }

    #[test]
    fn test_latest_extraction_wins() {
        let mut older = record(1, "A1", 20.0);
        older.extracted_at = Some(Utc.with_ymd_and_hms(2025, 1, 2, 8, 0, 0).unwrap());
        let mut newer = record(5, "A1", 60.0);
        newer.extracted_at = Some(Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap());

        let (out, _) = deduplicate(vec![newer.clone(), older.clone()]);
        assert_eq!(out[0].trend_score, 60.0);
        let (out, _) = deduplicate(vec![older, newer]);
        assert_eq!(out[0].trend_score, 60.0);
    }

    #[test]
    fn test_observed_score_beats_imputed_zero() {
        let mut imputed = record(1, "A1", 0.0);
        imputed.score_imputed = true;
        let observed = record(4, "A1", 35.0);

        let (out, _) = deduplicate(vec![imputed, observed]);
        assert_eq!(out[0].trend_score, 35.0);
        assert!(!out[0].score_imputed);
    }

    #[test]
    fn test_scores_are_never_averaged() {
        let (out, _) = deduplicate(vec![record(1, "A1", 10.0), record(2, "A1", 90.0)]);
        assert_eq!(out[0].trend_score, 10.0);
    }
}
