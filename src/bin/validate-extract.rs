use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

use artist_trends::idempotency::{compute_run_id, file_sha256};
use artist_trends::pipeline::ingestion::{batch_date_from_filename, read_extract};
use artist_trends::pipeline::processing::catalog::KeySpace;
use artist_trends::pipeline::processing::genre::{FileGenreCache, GenreResolver};
use artist_trends::pipeline::storage::{OutputPartition, PartitionSink};
use artist_trends::pipeline::TransformPipeline;
use std::sync::Arc;

/// Ingest and clean an extract without publishing anything.
#[derive(Parser, Debug)]
#[command(name = "validate-extract", version, about = "Dry-run the transform over an extract file")]
struct Cli {
    /// Extract file to validate (.csv or .ndjson)
    path: PathBuf,

    /// Run date; derived from the file name, else today
    #[arg(long)]
    run_date: Option<NaiveDate>,

    /// Genre cache to read (never written)
    #[arg(long)]
    genre_cache: Option<PathBuf>,

    /// Partition workers
    #[arg(long, default_value_t = 1)]
    workers: usize,
}

/// Sink for dry runs; dimension keys live only in memory.
struct DiscardSink;

impl PartitionSink for DiscardSink {
    fn publish(&self, _partition: &OutputPartition<'_>) -> artist_trends::error::Result<PathBuf> {
        Ok(PathBuf::new())
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let run_date = args
        .run_date
        .or_else(|| batch_date_from_filename(&args.path))
        .unwrap_or_else(|| chrono::Utc::now().date_naive());
    let digest = file_sha256(&args.path)
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    let run_id = compute_run_id(run_date, &digest);

    let extract = match read_extract(&args.path) {
        Ok(extract) => extract,
        Err(e) => {
            eprintln!("invalid: {}", e);
            std::process::exit(1)
        }
    };

    let resolver = match &args.genre_cache {
        Some(path) => GenreResolver::new(Arc::new(FileGenreCache::open(path))),
        None => GenreResolver::uncached(),
    };
    let mut pipeline = TransformPipeline::new(Box::new(KeySpace::new()), Box::new(DiscardSink))
        .with_resolver(resolver)
        .with_workers(args.workers);

    let output = pipeline
        .transform(&run_id, run_date, extract)
        .context("Transform failed")?;

    println!("valid");
    println!(
        "{}",
        serde_json::to_string_pretty(&output.metrics).context("Failed to render metrics")?
    );
    Ok(())
}
