use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use artist_trends::config::Config;
use artist_trends::logging;
use artist_trends::metrics;
use artist_trends::pipeline::ingestion::{find_latest_batch, one_off_batch, BatchInput};
use artist_trends::pipeline::processing::catalog::SqliteDimensionStore;
use artist_trends::pipeline::processing::genre::{FileGenreCache, GenreResolver};
use artist_trends::pipeline::storage::CsvPartitionWriter;
use artist_trends::pipeline::{RunSummary, TransformPipeline};

#[derive(Parser)]
#[command(name = "artist_trends")]
#[command(about = "Transform extracted artist trend batches into a partitioned star schema")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = artist_trends::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Partition workers (overrides config and TRENDS_WORKERS)
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the latest batch under raw_root, or TRANSFORM_ONE_OFF_INPUT when set
    Run,
    /// Process one extract file
    Transform {
        /// Extract file (.csv or .ndjson)
        #[arg(long)]
        input: PathBuf,
        /// Run date (YYYY-MM-DD); derived from the file name when omitted
        #[arg(long)]
        run_date: Option<NaiveDate>,
    },
}

fn resolve_batch(config: &Config, command: &Commands) -> Result<BatchInput> {
    match command {
        Commands::Transform { input, run_date } => match run_date {
            Some(date) => Ok(BatchInput {
                path: input.clone(),
                batch_date: *date,
            }),
            None => one_off_batch(input)
                .with_context(|| format!("Cannot use {} as input", input.display())),
        },
        Commands::Run => match &config.pipeline.one_off_input {
            Some(path) => {
                info!("Using one-off input {}", path.display());
                one_off_batch(path).with_context(|| format!("Cannot use {} as input", path.display()))
            }
            None => find_latest_batch(&config.paths.raw_root, &config.pipeline.input_template)
                .with_context(|| {
                    format!("No batch to process under {}", config.paths.raw_root.display())
                }),
        },
    }
}

fn build_pipeline(config: &Config) -> Result<TransformPipeline> {
    let dims = SqliteDimensionStore::open(&config.paths.dims_db).with_context(|| {
        format!("Failed to open dimension store {}", config.paths.dims_db.display())
    })?;
    let cache = FileGenreCache::open(&config.paths.genre_cache);
    let sink = CsvPartitionWriter::new(&config.paths.output_root);

    Ok(TransformPipeline::new(Box::new(dims), Box::new(sink))
        .with_resolver(GenreResolver::new(Arc::new(cache)))
        .with_workers(config.pipeline.workers))
}

fn print_summary(summary: &RunSummary) {
    let m = &summary.metrics;
    println!("\n📊 Transform results for {}:", summary.run_date);
    println!("   Run id: {}", summary.run_id);
    println!("   Records received: {}", m.records_received);
    println!("   Records dropped: {}", m.records_dropped_total);
    for (reason, count) in &m.records_dropped {
        println!("     - {}: {}", reason, count);
    }
    println!("   Score-zeroed: {}", m.records_score_zeroed);
    println!("   Genre-defaulted: {}", m.records_genre_defaulted);
    println!("   After dedup: {}", m.records_after_dedup);
    println!("   After explode: {}", m.records_after_explode);
    println!("   Output: {}", summary.output.display());
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let mut config = Config::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(workers) = cli.workers {
        config.pipeline.workers = workers;
    }
    metrics::init_metrics(config.metrics.listen_addr()?);

    let command = cli.command.unwrap_or(Commands::Run);
    let batch = resolve_batch(&config, &command)?;
    let mut pipeline = build_pipeline(&config)?;

    println!("🚀 Transforming {} ({})", batch.path.display(), batch.batch_date);
    match pipeline.run(&batch) {
        Ok(summary) => {
            print_summary(&summary);
            if let Some(rendered) = metrics::render() {
                debug!("Final metrics:\n{}", rendered);
            }
            println!("✅ Transform completed successfully");
            Ok(())
        }
        Err(e) => {
            error!(run_id = %e.run_id, stage = %e.stage, "Transform failed: {}", e.cause);
            eprintln!("❌ Transform failed during {}: {}", e.stage, e.cause);
            eprintln!("   Run id: {} (previous partitions were left untouched)", e.run_id);
            std::process::exit(1)
        }
    }
}
