//! Extract readers: delimited text and line-delimited JSON into [`RawTrendRecord`]s.
//!
//! Row-level problems (wrong field count, invalid JSON after the first line) drop
//! the row and count it as `malformed-row`. Structural problems (unreadable file,
//! missing required columns, a first JSON record that does not match the record
//! schema) fail the whole extract.

use chrono::{DateTime, NaiveDateTime, Utc};
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, Read};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, TrendsError};
use crate::pipeline::processing::normalize::{non_blank, parse_extract_date};
use crate::types::RawTrendRecord;

const RECORD_SCHEMA_JSON: &str = include_str!("../../../schemas/raw_trend_record.v1.json");

static RECORD_SCHEMA: Lazy<std::result::Result<JSONSchema, String>> = Lazy::new(|| {
    let schema: Value = serde_json::from_str(RECORD_SCHEMA_JSON).map_err(|e| e.to_string())?;
    JSONSchema::compile(&schema).map_err(|e| e.to_string())
});

/// Columns that must be present in a delimited extract. `id` is accepted for `artist_id`.
const REQUIRED_COLUMNS: [&str; 3] = ["artist_id", "location", "date"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractFormat {
    Csv,
    Ndjson,
}

impl ExtractFormat {
    /// `.ndjson`/`.jsonl`/`.json` are line-delimited JSON; anything else is delimited text.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "ndjson" | "jsonl" | "json" => ExtractFormat::Ndjson,
            _ => ExtractFormat::Csv,
        }
    }
}

/// Counters produced while reading an extract.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub rows_read: u64,
    pub malformed_rows: u64,
    /// Non-empty dates that could not be parsed; the record keeps `date = None`
    pub bad_dates: u64,
    /// Non-empty scores that were not finite numbers; treated as missing
    pub unparseable_scores: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Extract {
    pub records: Vec<RawTrendRecord>,
    pub report: IngestReport,
}

/// Read one extract file, choosing the reader from its extension.
pub fn read_extract(path: &Path) -> Result<Extract> {
    let bytes = fs::read(path)?;
    parse_extract(&bytes, path)
}

/// Parse extract content already in memory. `origin` selects the format and
/// is reported in errors.
#[instrument(skip_all, fields(path = %origin.display(), bytes = bytes.len()))]
pub fn parse_extract(bytes: &[u8], origin: &Path) -> Result<Extract> {
    let extract = match ExtractFormat::from_path(origin) {
        ExtractFormat::Csv => read_csv(bytes, origin)?,
        ExtractFormat::Ndjson => read_ndjson(bytes, origin)?,
    };
    info!(
        "Read {} records from {} ({} malformed, {} bad dates, {} unparseable scores)",
        extract.records.len(),
        origin.display(),
        extract.report.malformed_rows,
        extract.report.bad_dates,
        extract.report.unparseable_scores
    );
    Ok(extract)
}

/// Field positions resolved from a CSV header row.
struct ColumnMap {
    artist: Option<usize>,
    artist_id: usize,
    genres: Option<usize>,
    location: usize,
    date: usize,
    trend_score: Option<usize>,
    extracted_at: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord, origin: &Path) -> Result<Self> {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_lowercase(), i))
            .collect();
        let find = |names: &[&str]| names.iter().find_map(|n| index.get(*n).copied());

        let artist_id = find(&["artist_id", "id"]);
        let location = find(&["location"]);
        let date = find(&["date"]);
        let (Some(artist_id), Some(location), Some(date)) = (artist_id, location, date) else {
            let missing: Vec<&str> = REQUIRED_COLUMNS
                .iter()
                .zip([artist_id, location, date])
                .filter(|(_, found)| found.is_none())
                .map(|(name, _)| *name)
                .collect();
            return Err(TrendsError::SchemaMismatch {
                path: origin.to_path_buf(),
                details: format!("missing required column(s): {}", missing.join(", ")),
            });
        };

        Ok(Self {
            artist: find(&["artist", "artist_name", "name"]),
            artist_id,
            genres: find(&["genres", "genre"]),
            location,
            date,
            trend_score: find(&["trend_score", "score"]),
            extracted_at: find(&["extracted_at"]),
        })
    }
}

/// Read a delimited extract with a header row.
pub fn read_csv<R: Read>(reader: R, origin: &Path) -> Result<Extract> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let columns = ColumnMap::from_headers(&headers, origin)?;

    let mut extract = Extract::default();
    for (i, row) in rdr.records().enumerate() {
        let source_row = i as u64 + 1;
        extract.report.rows_read += 1;
        let row = match row {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                debug!(source_row, reason = "malformed-row", "Dropping row: {}", e);
                extract.report.malformed_rows += 1;
                continue;
            }
        };

        let field = |idx: Option<usize>| idx.and_then(|i| row.get(i));
        let record = RawTrendRecord {
            source_row,
            artist: non_blank(field(columns.artist)).map(str::to_string),
            artist_id: non_blank(field(Some(columns.artist_id))).map(str::to_string),
            genres: non_blank(field(columns.genres))
                .map(|g| vec![g.to_string()])
                .unwrap_or_default(),
            location: non_blank(field(Some(columns.location))).map(str::to_string),
            date: parse_date_field(field(Some(columns.date)), &mut extract.report),
            trend_score: parse_score_text(field(columns.trend_score), &mut extract.report),
            extracted_at: non_blank(field(columns.extracted_at)).and_then(parse_timestamp),
        };
        extract.records.push(record);
    }
    Ok(extract)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenreField {
    List(Vec<Option<String>>),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoreField {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct JsonRow {
    #[serde(default)]
    artist: Option<String>,
    #[serde(default, alias = "id")]
    artist_id: Option<String>,
    #[serde(default)]
    genres: Option<GenreField>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    trend_score: Option<ScoreField>,
    #[serde(default)]
    extracted_at: Option<String>,
}

fn schema_violations(value: &Value) -> Result<Option<String>> {
    let schema = RECORD_SCHEMA
        .as_ref()
        .map_err(|e| TrendsError::Config(format!("record schema does not compile: {}", e)))?;
    match schema.validate(value) {
        Ok(()) => Ok(None),
        Err(errors) => Ok(Some(
            errors
                .map(|e| format!("{} at '{}'", e, e.instance_path))
                .collect::<Vec<_>>()
                .join("; "),
        )),
    }
}

/// Read a line-delimited JSON extract. Each line is checked against the record
/// schema before it is deserialized.
pub fn read_ndjson<R: BufRead>(reader: R, origin: &Path) -> Result<Extract> {
    let mut extract = Extract::default();
    let mut seen_first = false;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let source_row = i as u64 + 1;
        extract.report.rows_read += 1;

        let parsed: std::result::Result<JsonRow, String> = serde_json::from_str::<Value>(&line)
            .map_err(|e| e.to_string())
            .and_then(|value| match schema_violations(&value) {
                Ok(None) => serde_json::from_value(value).map_err(|e| e.to_string()),
                Ok(Some(details)) => Err(details),
                Err(e) => Err(e.to_string()),
            });

        let row = match parsed {
            Ok(row) => row,
            Err(details) if !seen_first => {
                return Err(TrendsError::SchemaMismatch {
                    path: origin.to_path_buf(),
                    details: format!("line {}: {}", source_row, details),
                });
            }
            Err(details) => {
                debug!(source_row, reason = "malformed-row", "Dropping row: {}", details);
                extract.report.malformed_rows += 1;
                continue;
            }
        };
        seen_first = true;

        let genres = match row.genres {
            Some(GenreField::List(items)) => items.into_iter().flatten().collect(),
            Some(GenreField::Text(text)) if !text.trim().is_empty() => vec![text],
            _ => Vec::new(),
        };
        let trend_score = match row.trend_score {
            Some(ScoreField::Number(n)) => numeric_score(n, &mut extract.report),
            Some(ScoreField::Text(text)) => parse_score_text(Some(&text), &mut extract.report),
            None => None,
        };

        extract.records.push(RawTrendRecord {
            source_row,
            artist: non_blank(row.artist.as_deref()).map(str::to_string),
            artist_id: non_blank(row.artist_id.as_deref()).map(str::to_string),
            genres,
            location: non_blank(row.location.as_deref()).map(str::to_string),
            date: parse_date_field(row.date.as_deref(), &mut extract.report),
            trend_score,
            extracted_at: non_blank(row.extracted_at.as_deref()).and_then(parse_timestamp),
        });
    }

    if extract.report.rows_read > 0 && !seen_first {
        warn!("No usable rows in {}", origin.display());
    }
    Ok(extract)
}

fn parse_date_field(value: Option<&str>, report: &mut IngestReport) -> Option<chrono::NaiveDate> {
    let text = non_blank(value)?;
    let date = parse_extract_date(text);
    if date.is_none() {
        report.bad_dates += 1;
    }
    date
}

fn parse_score_text(value: Option<&str>, report: &mut IngestReport) -> Option<f64> {
    let text = non_blank(value)?;
    if matches!(text.to_ascii_lowercase().as_str(), "nan" | "null" | "none") {
        return None;
    }
    match text.parse::<f64>() {
        Ok(n) => numeric_score(n, report),
        Err(_) => {
            report.unparseable_scores += 1;
            None
        }
    }
}

/// Infinite values are kept so the quality gate rejects them as out of range.
fn numeric_score(n: f64, report: &mut IngestReport) -> Option<f64> {
    if n.is_nan() {
        report.unparseable_scores += 1;
        None
    } else {
        Some(n)
    }
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y_%m_%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}
