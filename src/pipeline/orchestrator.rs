//! Batch orchestration: ingest → learn genres → (resolve, clean, dedup, explode)
//! per partition → map → publish.
//!
//! Records are partitioned by a hash of their full natural key, so every
//! duplicate of a key lands in the same partition and deduplication needs no
//! cross-partition merge. Genre-cache writes happen in a sequential pass before
//! the parallel stages, which makes cache contents independent of scheduling.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{BatchError, DropReason, Stage, TrendsError};
use crate::idempotency::{compute_run_id, sha256_hex};
use crate::metrics::{IngestMetrics, TransformMetrics};
use crate::pipeline::ingestion::{parse_extract, BatchInput, Extract, IngestReport};
use crate::pipeline::processing::catalog::{DimensionStore, SchemaMapper};
use crate::pipeline::processing::dedup::{deduplicate, DedupReport};
use crate::pipeline::processing::explode::explode_batch;
use crate::pipeline::processing::genre::{GenreResolution, GenreResolver, GenreSource};
use crate::pipeline::processing::normalize::{non_blank, normalize_id, normalize_state_code};
use crate::pipeline::processing::quality_gate::{
    clean_batch, CleaningReport, DefaultQualityGate, QualityGate,
};
use crate::pipeline::storage::{OutputPartition, PartitionSink};
use crate::types::{CleanedRecord, ExplodedRecord, RawTrendRecord, StarSchema};

/// Row counts through one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub rows_in: u64,
    pub rows_out: u64,
    pub rows_dropped: u64,
    pub rows_modified: u64,
}

impl StageReport {
    fn log(&self) {
        info!(
            stage = %self.stage,
            rows_in = self.rows_in,
            rows_out = self.rows_out,
            rows_dropped = self.rows_dropped,
            rows_modified = self.rows_modified,
            "Stage complete"
        );
    }
}

/// Per-run summary, written to `_metrics.json` with the published partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetrics {
    pub run_id: String,
    pub run_date: NaiveDate,
    pub input: Option<PathBuf>,
    pub workers: usize,
    pub records_received: u64,
    /// Keyed by reason code; every code is always present
    pub records_dropped: BTreeMap<String, u64>,
    pub records_dropped_total: u64,
    pub records_score_zeroed: u64,
    pub records_genre_defaulted: u64,
    pub records_genre_from_cache: u64,
    pub genre_delimiters_normalized: u64,
    pub genres_learned: u64,
    pub genre_cache_errors: u64,
    pub bad_dates: u64,
    pub unparseable_scores: u64,
    pub records_after_clean: u64,
    pub records_after_dedup: u64,
    pub duplicates_collapsed: u64,
    pub conflicting_keys: u64,
    pub records_after_explode: u64,
    pub dim_artists: u64,
    pub dim_genres: u64,
    pub dim_locations: u64,
    pub artist_genres: u64,
    pub artist_trend_rows: u64,
    pub genre_trend_rows: u64,
    pub stages: Vec<StageReport>,
    pub duration_secs: f64,
}

impl RunMetrics {
    fn new(run_id: &str, run_date: NaiveDate, workers: usize) -> Self {
        let records_dropped = [
            DropReason::MissingKey,
            DropReason::ScoreOutOfRange,
            DropReason::MalformedGenres,
            DropReason::MalformedRow,
        ]
        .iter()
        .map(|r| (r.code().to_string(), 0))
        .collect();
        Self {
            run_id: run_id.to_string(),
            run_date,
            input: None,
            workers,
            records_received: 0,
            records_dropped,
            records_dropped_total: 0,
            records_score_zeroed: 0,
            records_genre_defaulted: 0,
            records_genre_from_cache: 0,
            genre_delimiters_normalized: 0,
            genres_learned: 0,
            genre_cache_errors: 0,
            bad_dates: 0,
            unparseable_scores: 0,
            records_after_clean: 0,
            records_after_dedup: 0,
            duplicates_collapsed: 0,
            conflicting_keys: 0,
            records_after_explode: 0,
            dim_artists: 0,
            dim_genres: 0,
            dim_locations: 0,
            artist_genres: 0,
            artist_trend_rows: 0,
            genre_trend_rows: 0,
            stages: Vec::new(),
            duration_secs: 0.0,
        }
    }

    pub fn dropped_for(&self, reason: DropReason) -> u64 {
        self.records_dropped.get(reason.code()).copied().unwrap_or(0)
    }

    fn add_drops(&mut self, reason: DropReason, count: u64) {
        *self.records_dropped.entry(reason.code().to_string()).or_default() += count;
        self.records_dropped_total += count;
    }

    fn push_stage(&mut self, report: StageReport) {
        report.log();
        self.stages.push(report);
    }
}

/// Everything a transform produces before publishing.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub cleaned: Vec<CleanedRecord>,
    pub exploded: Vec<ExplodedRecord>,
    pub schema: StarSchema,
    pub metrics: RunMetrics,
}

/// Result of a published run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub run_date: NaiveDate,
    pub output: PathBuf,
    pub metrics: RunMetrics,
}

struct PartitionOutput {
    cleaned: Vec<CleanedRecord>,
    exploded: Vec<ExplodedRecord>,
    cleaning: CleaningReport,
    dedup: DedupReport,
}

pub struct TransformPipeline {
    gate: Box<dyn QualityGate>,
    resolver: GenreResolver,
    dims: Box<dyn DimensionStore>,
    sink: Box<dyn PartitionSink>,
    workers: usize,
}

impl TransformPipeline {
    pub fn new(dims: Box<dyn DimensionStore>, sink: Box<dyn PartitionSink>) -> Self {
        Self {
            gate: Box::new(DefaultQualityGate::new()),
            resolver: GenreResolver::uncached(),
            dims,
            sink,
            workers: 1,
        }
    }

    pub fn with_gate(mut self, gate: Box<dyn QualityGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_resolver(mut self, resolver: GenreResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Number of partitions processed in parallel. 0 and 1 both mean a single
    /// sequential pass.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Read, transform and publish one extract file.
    #[instrument(skip_all, fields(input = %batch.path.display(), run_date = %batch.batch_date))]
    pub fn run(&mut self, batch: &BatchInput) -> Result<RunSummary, BatchError> {
        let started = Instant::now();
        let bytes = std::fs::read(&batch.path).map_err(|e| {
            let run_id = compute_run_id(batch.batch_date, &sha256_hex(batch.path.to_string_lossy().as_bytes()));
            BatchError::new(run_id, Stage::Ingest, e)
        })?;
        let run_id = compute_run_id(batch.batch_date, &sha256_hex(&bytes));
        info!(run_id = %run_id, "Starting transform of {}", batch.path.display());

        let extract = parse_extract(&bytes, &batch.path)
            .map_err(|e| BatchError::new(run_id.clone(), Stage::Ingest, e))?;
        let mut output = self.transform(&run_id, batch.batch_date, extract)?;
        output.metrics.input = Some(batch.path.clone());
        output.metrics.duration_secs = started.elapsed().as_secs_f64();
        self.publish(output)
    }

    /// Run every stage up to and including mapping. Dimension keys created here
    /// are committed to the store; nothing is published.
    pub fn transform(
        &mut self,
        run_id: &str,
        run_date: NaiveDate,
        extract: Extract,
    ) -> Result<TransformOutput, BatchError> {
        let mut metrics = RunMetrics::new(run_id, run_date, self.workers);
        let Extract { records, report } = extract;
        self.record_ingest(&mut metrics, &report, records.len());

        metrics.genres_learned = learn_genres(self.gate.as_ref(), &self.resolver, &records);

        let partitions = partition_records(records, self.workers);
        let outputs = self.process_partitions(partitions, run_id)?;

        let mut cleaning = CleaningReport::default();
        let mut dedup = DedupReport::default();
        let mut cleaned = Vec::new();
        let mut exploded = Vec::new();
        for part in outputs {
            cleaning.merge(&part.cleaning);
            dedup.merge(&part.dedup);
            cleaned.extend(part.cleaned);
            exploded.extend(part.exploded);
        }
        cleaned.sort_by(|a, b| a.natural_key().cmp(&b.natural_key()));
        // Stable: genres of one record keep their order
        exploded.sort_by(|a, b| {
            (&a.artist_id, &a.location, a.date).cmp(&(&b.artist_id, &b.location, b.date))
        });

        self.record_cleaning(&mut metrics, &cleaning);
        metrics.records_after_dedup = cleaned.len() as u64;
        metrics.duplicates_collapsed = dedup.collapsed;
        metrics.conflicting_keys = dedup.conflicting_keys;
        metrics.push_stage(StageReport {
            stage: Stage::Dedup,
            rows_in: dedup.input,
            rows_out: dedup.output,
            rows_dropped: dedup.collapsed,
            rows_modified: 0,
        });
        metrics.records_after_explode = exploded.len() as u64;
        metrics.push_stage(StageReport {
            stage: Stage::Explode,
            rows_in: cleaned.len() as u64,
            rows_out: exploded.len() as u64,
            rows_dropped: 0,
            rows_modified: 0,
        });
        metrics.genre_cache_errors = self.resolver.cache_errors();

        let schema = self
            .map_dimensions(&cleaned, &exploded)
            .map_err(|e| BatchError::new(run_id, Stage::Map, e))?;
        metrics.dim_artists = schema.artists.len() as u64;
        metrics.dim_genres = schema.genres.len() as u64;
        metrics.dim_locations = schema.locations.len() as u64;
        metrics.artist_genres = schema.artist_genres.len() as u64;
        metrics.artist_trend_rows = schema.artist_trends.len() as u64;
        metrics.genre_trend_rows = schema.genre_trends.len() as u64;
        metrics.push_stage(StageReport {
            stage: Stage::Map,
            rows_in: exploded.len() as u64,
            rows_out: metrics.artist_trend_rows + metrics.genre_trend_rows,
            rows_dropped: 0,
            rows_modified: 0,
        });

        Ok(TransformOutput {
            cleaned,
            exploded,
            schema,
            metrics,
        })
    }

    /// Publish a transformed batch and persist the genre cache.
    pub fn publish(&mut self, output: TransformOutput) -> Result<RunSummary, BatchError> {
        let TransformOutput {
            schema, mut metrics, ..
        } = output;
        let run_id = metrics.run_id.clone();
        let run_date = metrics.run_date;

        let snapshot = serde_json::to_value(&metrics)
            .map_err(|e| BatchError::new(run_id.clone(), Stage::Publish, e))?;
        let partition = OutputPartition {
            run_date,
            schema: &schema,
            metrics: snapshot,
        };
        let path = self.sink.publish(&partition).map_err(|e| {
            TransformMetrics::record_failure(Stage::Publish);
            BatchError::new(run_id.clone(), Stage::Publish, e)
        })?;
        metrics.push_stage(StageReport {
            stage: Stage::Publish,
            rows_in: metrics.artist_trend_rows + metrics.genre_trend_rows,
            rows_out: metrics.artist_trend_rows + metrics.genre_trend_rows,
            rows_dropped: 0,
            rows_modified: 0,
        });

        if let Err(e) = self.resolver.flush() {
            warn!("Genre cache not persisted: {}", e);
        }

        TransformMetrics::record_run(&metrics);
        info!(
            run_id = %run_id,
            received = metrics.records_received,
            dropped = metrics.records_dropped_total,
            after_dedup = metrics.records_after_dedup,
            after_explode = metrics.records_after_explode,
            "Run complete, published {}",
            path.display()
        );
        Ok(RunSummary {
            run_id,
            run_date,
            output: path,
            metrics,
        })
    }

    fn record_ingest(&self, metrics: &mut RunMetrics, report: &IngestReport, parsed: usize) {
        metrics.records_received = report.rows_read;
        metrics.bad_dates = report.bad_dates;
        metrics.unparseable_scores = report.unparseable_scores;
        metrics.add_drops(DropReason::MalformedRow, report.malformed_rows);
        IngestMetrics::record_extract(report);
        metrics.push_stage(StageReport {
            stage: Stage::Ingest,
            rows_in: report.rows_read,
            rows_out: parsed as u64,
            rows_dropped: report.malformed_rows,
            rows_modified: report.unparseable_scores,
        });
    }

    fn record_cleaning(&self, metrics: &mut RunMetrics, cleaning: &CleaningReport) {
        for (reason, count) in &cleaning.dropped {
            metrics.add_drops(*reason, *count);
        }
        metrics.records_score_zeroed = cleaning.score_zeroed;
        metrics.records_genre_defaulted = cleaning.genre_defaulted;
        metrics.records_genre_from_cache = cleaning.genre_from_cache;
        metrics.genre_delimiters_normalized = cleaning.genre_delimiters_normalized;
        metrics.records_after_clean = cleaning.accepted;
        metrics.push_stage(StageReport {
            stage: Stage::Clean,
            rows_in: cleaning.received,
            rows_out: cleaning.accepted,
            rows_dropped: cleaning.dropped_total(),
            rows_modified: cleaning.score_zeroed + cleaning.genre_defaulted,
        });
    }

    fn process_partitions(
        &self,
        partitions: Vec<Vec<RawTrendRecord>>,
        run_id: &str,
    ) -> Result<Vec<PartitionOutput>, BatchError> {
        let gate = self.gate.as_ref();
        let resolver = &self.resolver;
        if partitions.len() <= 1 {
            return Ok(partitions
                .iter()
                .map(|p| process_partition(gate, resolver, p))
                .collect());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(partitions.len())
            .thread_name(|i| format!("trends-worker-{}", i))
            .build()
            .map_err(|e| {
                BatchError::new(run_id, Stage::Clean, TrendsError::Config(format!("worker pool: {}", e)))
            })?;
        Ok(pool.install(|| {
            partitions
                .par_iter()
                .map(|p| process_partition(gate, resolver, p))
                .collect()
        }))
    }

    /// Intern dimension keys inside one store transaction.
    fn map_dimensions(
        &mut self,
        cleaned: &[CleanedRecord],
        exploded: &[ExplodedRecord],
    ) -> Result<StarSchema, TrendsError> {
        self.dims.begin()?;
        let mapped = SchemaMapper::new(self.dims.as_mut()).map(cleaned, exploded);
        match mapped {
            Ok(schema) => {
                self.dims.commit()?;
                Ok(schema)
            }
            Err(e) => {
                if let Err(rollback) = self.dims.rollback() {
                    warn!("Dimension rollback failed: {}", rollback);
                }
                TransformMetrics::record_failure(Stage::Map);
                Err(e)
            }
        }
    }
}

/// Resolve, clean, deduplicate and explode one partition.
fn process_partition(
    gate: &dyn QualityGate,
    resolver: &GenreResolver,
    records: &[RawTrendRecord],
) -> PartitionOutput {
    let (cleaned, cleaning) = clean_batch(gate, resolver, records);
    let (deduped, dedup) = deduplicate(cleaned);
    let exploded = explode_batch(&deduped);
    PartitionOutput {
        cleaned: deduped,
        exploded,
        cleaning,
        dedup,
    }
}

/// Seed the genre cache from records that carry their own genres, in source
/// order. Only records the quality gate accepts are learned from. Returns the
/// number of new cache entries.
fn learn_genres(gate: &dyn QualityGate, resolver: &GenreResolver, records: &[RawTrendRecord]) -> u64 {
    let mut learned = 0;
    for record in records {
        let Ok((genres, delimiters_normalized)) = GenreResolver::parse(&record.genres) else {
            continue;
        };
        if genres.is_empty() {
            continue;
        }
        let resolution = GenreResolution {
            genres,
            source: GenreSource::Record,
            delimiters_normalized,
        };
        let Ok(clean) = gate.assess(record, Ok(resolution)) else {
            continue;
        };
        if resolver.learn(&clean.artist_id, &clean.genres) {
            learned += 1;
        }
    }
    if learned > 0 {
        debug!("Cached genres for {} new artists", learned);
    }
    learned
}

/// Split records into `workers` partitions by natural-key hash. Records with a
/// missing key field are kept (the quality gate drops them) and hashed on what
/// they have.
fn partition_records(records: Vec<RawTrendRecord>, workers: usize) -> Vec<Vec<RawTrendRecord>> {
    let workers = workers.max(1);
    if workers == 1 {
        return vec![records];
    }
    let mut partitions: Vec<Vec<RawTrendRecord>> = (0..workers).map(|_| Vec::new()).collect();
    for record in records {
        let mut hasher = DefaultHasher::new();
        non_blank(record.artist_id.as_deref()).map(normalize_id).hash(&mut hasher);
        non_blank(record.location.as_deref())
            .map(normalize_state_code)
            .hash(&mut hasher);
        record.date.hash(&mut hasher);
        let idx = (hasher.finish() % workers as u64) as usize;
        partitions[idx].push(record);
    }
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::catalog::KeySpace;
    use crate::pipeline::processing::genre::InMemoryGenreCache;
    use crate::constants::UNKNOWN_GENRE;
    use crate::pipeline::processing::quality_gate::QualityGateConfig;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct NullSink;

    impl PartitionSink for NullSink {
        fn publish(&self, _partition: &OutputPartition<'_>) -> crate::error::Result<PathBuf> {
            Ok(PathBuf::from("/dev/null"))
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn pipeline(workers: usize) -> TransformPipeline {
        TransformPipeline::new(Box::new(KeySpace::new()), Box::new(NullSink)).with_workers(workers)
    }

    fn extract(records: Vec<RawTrendRecord>) -> Extract {
        Extract {
            report: IngestReport {
                rows_read: records.len() as u64,
                ..Default::default()
            },
            records,
        }
    }

    #[test]
    fn test_out_of_range_duplicate_loses() {
        let records = vec![
            RawTrendRecord::new(1, "A1", "ca", date()).with_genres("Pop;Rock").with_score(150.0),
            RawTrendRecord::new(2, "A1", "ca", date()).with_genres("Pop;Rock").with_score(42.0),
        ];
        let out = pipeline(1).transform("run", date(), extract(records)).unwrap();

        assert_eq!(out.exploded.len(), 2);
        let genres: Vec<&str> = out.exploded.iter().map(|e| e.genre.as_str()).collect();
        assert_eq!(genres, vec!["pop", "rock"]);
        for row in &out.exploded {
            assert_eq!(row.artist_id, "A1");
            assert_eq!(row.location, "CA");
            assert_eq!(row.trend_score, 42.0);
        }
        assert_eq!(out.metrics.dropped_for(DropReason::ScoreOutOfRange), 1);
        assert_eq!(out.metrics.records_after_dedup, 1);
        assert_eq!(out.schema.artist_trends.len(), 1);
    }

    #[test]
    fn test_counts_balance() {
        let records = vec![
            RawTrendRecord::new(1, "A1", "CA", date()).with_score(10.0),
            RawTrendRecord::new(2, "", "CA", date()).with_score(10.0),
            RawTrendRecord::new(3, "A2", "NY", date()),
            RawTrendRecord::new(4, "A2", "NY", date()).with_score(-1.0),
            RawTrendRecord::new(5, "A3", "TX", date()).with_genres("['pop'"),
        ];
        let out = pipeline(1).transform("run", date(), extract(records)).unwrap();
        let m = &out.metrics;
        assert_eq!(m.records_received, 5);
        assert_eq!(m.dropped_for(DropReason::MissingKey), 1);
        assert_eq!(m.dropped_for(DropReason::ScoreOutOfRange), 1);
        assert_eq!(m.dropped_for(DropReason::MalformedGenres), 1);
        assert_eq!(m.records_received, m.records_dropped_total + m.records_after_clean);
        assert_eq!(m.records_score_zeroed, 1);
        assert_eq!(m.records_genre_defaulted, 2);
        assert_eq!(m.records_after_explode, 2);
    }

    #[test]
    fn test_cached_genres_fill_empty_records() {
        let cache = InMemoryGenreCache::from_entries(HashMap::from([(
            "A9".to_string(),
            vec!["Shoegaze".to_string()],
        )]));
        let mut pipeline = pipeline(1).with_resolver(GenreResolver::new(Arc::new(cache)));
        let records = vec![
            RawTrendRecord::new(1, "A9", "CA", date()).with_score(5.0),
            // learned before cleaning, so the earlier row for A1 benefits too
            RawTrendRecord::new(2, "A1", "CA", date()).with_score(5.0),
            RawTrendRecord::new(3, "A1", "NY", date()).with_genres("emo").with_score(5.0),
        ];
        let out = pipeline.transform("run", date(), extract(records)).unwrap();
        let genres: Vec<(&str, &str)> = out
            .exploded
            .iter()
            .map(|e| (e.artist_id.as_str(), e.genre.as_str()))
            .collect();
        assert_eq!(genres, vec![("A1", "emo"), ("A1", "emo"), ("A9", "shoegaze")]);
        assert_eq!(out.metrics.records_genre_from_cache, 2);
        assert_eq!(out.metrics.genres_learned, 1);
    }

    #[test]
    fn test_infinite_scores_are_out_of_range() {
        let data = "artist_id,genres,location,date,trend_score\n\
                    A1,pop,CA,2025-01-01,1e999\n\
                    A2,pop,CA,2025-01-01,-inf\n";
        let parsed = parse_extract(data.as_bytes(), std::path::Path::new("x.csv")).unwrap();
        let out = pipeline(1).transform("run", date(), parsed).unwrap();

        assert_eq!(out.metrics.dropped_for(DropReason::ScoreOutOfRange), 2);
        assert_eq!(out.metrics.records_score_zeroed, 0);
        assert!(out.schema.artist_trends.is_empty());
        assert!(out.schema.genre_trends.is_empty());
    }

    #[test]
    fn test_dropped_rows_do_not_teach_genres() {
        let cache = Arc::new(InMemoryGenreCache::new());
        let mut pipeline = pipeline(1).with_resolver(GenreResolver::new(cache.clone()));
        let records = vec![
            RawTrendRecord::new(1, "A1", "CA", date()).with_genres("metal").with_score(150.0),
            RawTrendRecord::new(2, "A1", "NY", date()).with_score(10.0),
            RawTrendRecord::new(3, "A2", "", date()).with_genres("jazz").with_score(10.0),
        ];
        let out = pipeline.transform("run", date(), extract(records)).unwrap();

        assert_eq!(out.exploded.len(), 1);
        assert_eq!(out.exploded[0].genre, UNKNOWN_GENRE);
        assert_eq!(out.metrics.genres_learned, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_custom_gate_and_latest_extraction() {
        let strict = DefaultQualityGate::with_config(QualityGateConfig {
            max_score: 50.0,
            ..Default::default()
        });
        let mut pipeline = pipeline(2).with_gate(Box::new(strict));
        let earlier = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 1, 1, 20, 0, 0).unwrap();
        let records = vec![
            RawTrendRecord::new(1, "A1", "CA", date())
                .with_artist("Alvvays")
                .with_score(30.0)
                .with_extracted_at(later),
            RawTrendRecord::new(2, "A1", "CA", date()).with_score(10.0).with_extracted_at(earlier),
            RawTrendRecord::new(3, "A2", "CA", date()).with_score(75.0),
        ];
        let out = pipeline.transform("run", date(), extract(records)).unwrap();

        assert_eq!(out.metrics.dropped_for(DropReason::ScoreOutOfRange), 1);
        assert_eq!(out.cleaned.len(), 1);
        assert_eq!(out.cleaned[0].trend_score, 30.0);
        assert_eq!(out.cleaned[0].artist, "Alvvays");
        assert_eq!(out.metrics.duplicates_collapsed, 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut records = Vec::new();
        for i in 0..200u64 {
            let artist = format!("A{}", i % 7);
            let location = ["CA", "ny", "TX ", "wa"][(i % 4) as usize];
            let day = date() + chrono::Duration::days((i % 3) as i64);
            let mut record = RawTrendRecord::new(i + 1, &artist, location, day)
                .with_genres(["pop;rock", "indie|emo", "", "['jazz', 'soul']"][(i % 4) as usize]);
            if i % 11 != 0 {
                record = record.with_score((i % 101) as f64);
            }
            records.push(record);
        }

        let sequential = pipeline(1).transform("run", date(), extract(records.clone())).unwrap();
        let parallel = pipeline(4).transform("run", date(), extract(records)).unwrap();

        assert_eq!(sequential.cleaned, parallel.cleaned);
        assert_eq!(sequential.exploded, parallel.exploded);
        assert_eq!(sequential.schema, parallel.schema);
        assert_eq!(
            sequential.metrics.records_dropped,
            parallel.metrics.records_dropped
        );
    }

    #[test]
    fn test_partitioning_keeps_keys_together() {
        let records: Vec<RawTrendRecord> = (0..50u64)
            .map(|i| RawTrendRecord::new(i, &format!("A{}", i % 5), " ca", date()))
            .chain((0..50u64).map(|i| RawTrendRecord::new(100 + i, &format!("A{}", i % 5), "CA ", date())))
            .collect();
        let partitions = partition_records(records, 3);
        for part in &partitions {
            for other in &partitions {
                if std::ptr::eq(part, other) {
                    continue;
                }
                for r in part {
                    assert!(!other.iter().any(|o| o.artist_id == r.artist_id));
                }
            }
        }
    }
}
