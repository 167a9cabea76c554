use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Structural failures. Any of these aborts the batch it occurs in.
#[derive(Error, Debug)]
pub enum TrendsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema mismatch in {path}: {details}")]
    SchemaMismatch { path: PathBuf, details: String },

    #[error("No input batch found under {0}")]
    NoBatch(PathBuf),

    #[error("Output destination not writable: {0}")]
    Publish(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, TrendsError>;

/// Pipeline stage a batch failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Clean,
    Dedup,
    Explode,
    Map,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingest => "ingest",
            Stage::Clean => "clean",
            Stage::Dedup => "dedup",
            Stage::Explode => "explode",
            Stage::Map => "map",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Fatal per-run failure, carrying enough context for the caller to retry.
#[derive(Error, Debug)]
#[error("batch {run_id} failed during {stage}: {cause}")]
pub struct BatchError {
    pub run_id: String,
    pub stage: Stage,
    #[source]
    pub cause: TrendsError,
}

impl BatchError {
    pub fn new(run_id: impl Into<String>, stage: Stage, cause: impl Into<TrendsError>) -> Self {
        Self {
            run_id: run_id.into(),
            stage,
            cause: cause.into(),
        }
    }
}

/// Stable reason codes for dropped rows, as reported in run metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropReason {
    MissingKey,
    ScoreOutOfRange,
    MalformedGenres,
    MalformedRow,
}

impl DropReason {
    pub fn code(&self) -> &'static str {
        match self {
            DropReason::MissingKey => "missing-key",
            DropReason::ScoreOutOfRange => "score-out-of-range",
            DropReason::MalformedGenres => "malformed-genres",
            DropReason::MalformedRow => "malformed-row",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Recoverable per-row failure. The row is dropped and counted; the batch continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("missing required field: {field}")]
    MissingKey { field: &'static str },

    #[error("trend score {score} outside [0, 100]")]
    ScoreOutOfRange { score: f64 },

    #[error("malformed genre list: {raw}")]
    MalformedGenres { raw: String },
}

impl RecordError {
    pub fn reason(&self) -> DropReason {
        match self {
            RecordError::MissingKey { .. } => DropReason::MissingKey,
            RecordError::ScoreOutOfRange { .. } => DropReason::ScoreOutOfRange,
            RecordError::MalformedGenres { .. } => DropReason::MalformedGenres,
        }
    }
}

/// Genre cache failure. Never fatal: callers treat it as a cache miss.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("genre cache unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt genre cache entry for {key}")]
    Corrupt { key: String },

    #[error("genre cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("genre cache serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
