use tracing::{info, instrument};

use crate::types::{CleanedRecord, ExplodedRecord};

/// Expand one cleaned record into one record per distinct genre.
///
/// Cleaned genre lists are already de-duplicated; this repeats the check so the
/// fan-out never exceeds the number of distinct genres.
pub fn explode_record(record: &CleanedRecord) -> Vec<ExplodedRecord> {
    let mut out: Vec<ExplodedRecord> = Vec::with_capacity(record.genres.len());
    for genre in &record.genres {
        if out.iter().any(|e| &e.genre == genre) {
            continue;
        }
        out.push(ExplodedRecord {
            artist_id: record.artist_id.clone(),
            genre: genre.clone(),
            location: record.location.clone(),
            date: record.date,
            trend_score: record.trend_score,
        });
    }
    out
}

/// Explode a batch. Output order follows input order.
#[instrument(skip_all, fields(records = records.len()))]
pub fn explode_batch(records: &[CleanedRecord]) -> Vec<ExplodedRecord> {
    let exploded: Vec<ExplodedRecord> = records.iter().flat_map(explode_record).collect();
    info!("Exploded {} records into {} genre rows", records.len(), exploded.len());
    exploded
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cleaned(genres: &[&str]) -> CleanedRecord {
        CleanedRecord {
            source_row: 1,
            artist: "Artist".to_string(),
            artist_id: "A1".to_string(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            location: "CA".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            trend_score: 42.0,
            score_imputed: false,
            genre_defaulted: false,
            extracted_at: None,
        }
    }

    #[test]
    fn test_fan_out_matches_genre_count() {
        let rows = explode_record(&cleaned(&["pop", "rock"]));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].genre, "pop");
        assert_eq!(rows[1].genre, "rock");
        for row in &rows {
            assert_eq!(row.artist_id, "A1");
            assert_eq!(row.location, "CA");
            assert_eq!(row.trend_score, 42.0);
        }
    }

    #[test]
    fn test_duplicate_genres_are_not_repeated() {
        let rows = explode_record(&cleaned(&["pop", "pop", "rock"]));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_batch_preserves_record_order() {
        let mut second = cleaned(&["jazz"]);
        second.artist_id = "A2".to_string();
        let rows = explode_batch(&[cleaned(&["pop", "rock"]), second]);
        let ids: Vec<&str> = rows.iter().map(|r| r.artist_id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "A1", "A2"]);
    }
}
