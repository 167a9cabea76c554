use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::constants::{
    ARTIST_GENRES, DIM_ARTISTS, DIM_GENRES, DIM_LOCATIONS, FACT_ARTIST_TRENDS, FACT_GENRE_TRENDS,
    METRICS_FILE, STAGING_DIR, SUCCESS_MARKER,
};
use crate::error::{Result, TrendsError};
use crate::types::{ArtistTrend, GenreTrend, StarSchema};

/// One run's output, ready to publish.
#[derive(Debug)]
pub struct OutputPartition<'a> {
    pub run_date: NaiveDate,
    pub schema: &'a StarSchema,
    /// Written verbatim as `_metrics.json`
    pub metrics: serde_json::Value,
}

/// Destination for published partitions. A publish either fully replaces the
/// partition for `run_date` or leaves whatever was there before untouched.
pub trait PartitionSink: Send + Sync {
    fn publish(&self, partition: &OutputPartition<'_>) -> Result<PathBuf>;
}

/// Writes partitions as CSV files under `<root>/run_date=YYYY-MM-DD/`.
#[derive(Debug, Clone)]
pub struct CsvPartitionWriter {
    root: PathBuf,
}

impl CsvPartitionWriter {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn partition_dir(&self, run_date: NaiveDate) -> PathBuf {
        self.root.join(format!("run_date={}", run_date))
    }

    fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    fn write_all(&self, dir: &Path, partition: &OutputPartition<'_>) -> Result<()> {
        let schema = partition.schema;
        write_table(&dir.join(format!("{}.csv", DIM_ARTISTS)), &["artist_id", "name"], &schema.artists)?;
        write_table(&dir.join(format!("{}.csv", DIM_GENRES)), &["genre_id", "name"], &schema.genres)?;
        write_table(
            &dir.join(format!("{}.csv", DIM_LOCATIONS)),
            &["location_id", "state_code"],
            &schema.locations,
        )?;
        write_table(
            &dir.join(format!("{}.csv", ARTIST_GENRES)),
            &["artist_id", "genre_id"],
            &schema.artist_genres,
        )?;

        let mut by_date: BTreeMap<NaiveDate, Vec<&ArtistTrend>> = BTreeMap::new();
        for row in &schema.artist_trends {
            by_date.entry(row.trend_date).or_default().push(row);
        }
        write_date_partitions(
            &dir.join(FACT_ARTIST_TRENDS),
            &["artist_id", "location_id", "trend_date", "trend_score"],
            &by_date,
        )?;

        let mut by_date: BTreeMap<NaiveDate, Vec<&GenreTrend>> = BTreeMap::new();
        for row in &schema.genre_trends {
            by_date.entry(row.trend_date).or_default().push(row);
        }
        write_date_partitions(
            &dir.join(FACT_GENRE_TRENDS),
            &["genre_id", "location_id", "trend_date", "aggregated_score"],
            &by_date,
        )?;

        fs::write(
            dir.join(METRICS_FILE),
            serde_json::to_vec_pretty(&partition.metrics)?,
        )?;
        // Marker last: readers treat a partition without it as incomplete
        fs::write(dir.join(SUCCESS_MARKER), b"")?;
        Ok(())
    }

    /// Swap the staged directory into place. The previous partition, if any, is
    /// moved aside first and restored if the swap fails.
    fn promote(&self, staged: &Path, target: &Path) -> Result<()> {
        let previous = if target.exists() {
            let aside = self
                .staging_root()
                .join(format!("replaced-{}", Uuid::new_v4()));
            fs::rename(target, &aside)?;
            Some(aside)
        } else {
            None
        };

        if let Err(e) = fs::rename(staged, target) {
            if let Some(aside) = &previous {
                if let Err(restore) = fs::rename(aside, target) {
                    warn!(
                        "Could not restore previous partition from {}: {}",
                        aside.display(),
                        restore
                    );
                }
            }
            return Err(e.into());
        }

        if let Some(aside) = previous {
            if let Err(e) = fs::remove_dir_all(&aside) {
                warn!("Could not remove replaced partition {}: {}", aside.display(), e);
            }
        }
        Ok(())
    }
}

impl PartitionSink for CsvPartitionWriter {
    #[instrument(skip_all, fields(run_date = %partition.run_date))]
    fn publish(&self, partition: &OutputPartition<'_>) -> Result<PathBuf> {
        let target = self.partition_dir(partition.run_date);
        let staged = self
            .staging_root()
            .join(format!("run_date={}-{}", partition.run_date, Uuid::new_v4()));

        let result = fs::create_dir_all(&staged)
            .map_err(TrendsError::from)
            .and_then(|_| self.write_all(&staged, partition))
            .and_then(|_| self.promote(&staged, &target));

        match result {
            Ok(()) => {
                info!("Published partition {}", target.display());
                Ok(target)
            }
            Err(e) => {
                if staged.exists() {
                    if let Err(cleanup) = fs::remove_dir_all(&staged) {
                        debug!("Could not remove staging dir {}: {}", staged.display(), cleanup);
                    }
                }
                Err(TrendsError::Publish(format!("{}: {}", target.display(), e)))
            }
        }
    }
}

fn write_table<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    wtr.write_record(headers)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

fn write_date_partitions<T: Serialize>(
    table_dir: &Path,
    headers: &[&str],
    by_date: &BTreeMap<NaiveDate, Vec<&T>>,
) -> Result<()> {
    fs::create_dir_all(table_dir)?;
    for (date, rows) in by_date {
        let dir = table_dir.join(format!("trend_date={}", date));
        fs::create_dir_all(&dir)?;
        write_table(&dir.join("part-00000.csv"), headers, rows)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Artist, Genre, Location};
    use tempfile::tempdir;

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn schema(score: f64) -> StarSchema {
        StarSchema {
            artists: vec![Artist { artist_id: "A1".into(), name: "Alvvays".into() }],
            genres: vec![Genre { genre_id: 1, name: "pop".into() }],
            locations: vec![Location { location_id: 1, state_code: "CA".into() }],
            artist_genres: Vec::new(),
            artist_trends: vec![ArtistTrend {
                artist_id: "A1".into(),
                location_id: 1,
                trend_date: run_date(),
                trend_score: score,
            }],
            genre_trends: Vec::new(),
        }
    }

    #[test]
    fn test_publish_layout() {
        let dir = tempdir().unwrap();
        let writer = CsvPartitionWriter::new(dir.path());
        let schema = schema(42.0);
        let out = writer
            .publish(&OutputPartition {
                run_date: run_date(),
                schema: &schema,
                metrics: serde_json::json!({"records_received": 1}),
            })
            .unwrap();

        assert_eq!(out, dir.path().join("run_date=2025-01-01"));
        assert!(out.join(SUCCESS_MARKER).exists());
        assert!(out.join(METRICS_FILE).exists());
        let artists = fs::read_to_string(out.join("dim_artists.csv")).unwrap();
        assert_eq!(artists, "artist_id,name\nA1,Alvvays\n");
        let links = fs::read_to_string(out.join("artist_genres.csv")).unwrap();
        assert_eq!(links, "artist_id,genre_id\n");
        let fact = out
            .join(FACT_ARTIST_TRENDS)
            .join("trend_date=2025-01-01")
            .join("part-00000.csv");
        let fact = fs::read_to_string(fact).unwrap();
        assert!(fact.starts_with("artist_id,location_id,trend_date,trend_score\nA1,1,2025-01-01,42"));
        // staging is emptied after promotion
        assert_eq!(fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn test_republish_replaces_partition() {
        let dir = tempdir().unwrap();
        let writer = CsvPartitionWriter::new(dir.path());
        for score in [10.0, 20.0] {
            let schema = schema(score);
            writer
                .publish(&OutputPartition {
                    run_date: run_date(),
                    schema: &schema,
                    metrics: serde_json::Value::Null,
                })
                .unwrap();
        }
        let fact = fs::read_to_string(
            writer
                .partition_dir(run_date())
                .join(FACT_ARTIST_TRENDS)
                .join("trend_date=2025-01-01")
                .join("part-00000.csv"),
        )
        .unwrap();
        assert!(fact.contains(",20"));
        assert!(!fact.contains(",10"));
    }

    #[test]
    fn test_failed_publish_keeps_previous_partition() {
        let dir = tempdir().unwrap();
        let writer = CsvPartitionWriter::new(dir.path());
        let first = schema(10.0);
        writer
            .publish(&OutputPartition { run_date: run_date(), schema: &first, metrics: serde_json::Value::Null })
            .unwrap();

        // Block the staging area so the next publish cannot write
        fs::remove_dir_all(dir.path().join(STAGING_DIR)).unwrap();
        fs::write(dir.path().join(STAGING_DIR), b"not a directory").unwrap();

        let second = schema(20.0);
        let err = writer
            .publish(&OutputPartition { run_date: run_date(), schema: &second, metrics: serde_json::Value::Null })
            .unwrap_err();
        assert!(matches!(err, TrendsError::Publish(_)));

        let target = writer.partition_dir(run_date());
        assert!(target.join(SUCCESS_MARKER).exists());
        let fact = fs::read_to_string(
            target.join(FACT_ARTIST_TRENDS).join("trend_date=2025-01-01").join("part-00000.csv"),
        )
        .unwrap();
        assert!(fact.contains(",10"));
    }
}
