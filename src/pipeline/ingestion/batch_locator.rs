use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, TrendsError};
use crate::pipeline::processing::normalize::parse_extract_date;

static BATCH_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}_\d{2}_\d{2}$").expect("valid batch dir regex"));

static FILE_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}[_-]\d{2}[_-]\d{2})").expect("valid file date regex"));

/// An extract file selected for processing, with the date it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchInput {
    pub path: PathBuf,
    pub batch_date: NaiveDate,
}

/// Pick the latest `YYYY_MM_DD` folder under `raw_root` and the extract inside it
/// named by `template` (`{date}` is replaced with the folder name). File names
/// are matched case-insensitively.
pub fn find_latest_batch(raw_root: &Path, template: &str) -> Result<BatchInput> {
    if !raw_root.is_dir() {
        return Err(TrendsError::NoBatch(raw_root.to_path_buf()));
    }

    let mut folders: Vec<String> = Vec::new();
    for entry in fs::read_dir(raw_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if BATCH_DIR_RE.is_match(&name) {
            folders.push(name);
        }
    }
    folders.sort();

    let Some(latest) = folders.pop() else {
        return Err(TrendsError::NoBatch(raw_root.to_path_buf()));
    };
    let folder = raw_root.join(&latest);
    let batch_date = parse_extract_date(&latest)
        .ok_or_else(|| TrendsError::NoBatch(folder.clone()))?;

    let wanted = template.replace("{date}", &latest).to_lowercase();
    debug!("Looking for '{}' in {}", wanted, folder.display());
    for entry in fs::read_dir(&folder)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name == wanted && entry.file_type()?.is_file() {
            let path = entry.path();
            info!("Using latest batch {} ({})", path.display(), batch_date);
            return Ok(BatchInput { path, batch_date });
        }
    }
    Err(TrendsError::NoBatch(folder.join(wanted)))
}

/// Date embedded in an extract file name, e.g. `spotify_rising_with_trends_2025_01_01.csv`.
pub fn batch_date_from_filename(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_string_lossy();
    FILE_DATE_RE
        .captures_iter(&name)
        .filter_map(|c| c.get(1))
        .find_map(|m| parse_extract_date(m.as_str()))
}

/// Resolve a one-off input file: the batch date comes from its name.
pub fn one_off_batch(path: &Path) -> Result<BatchInput> {
    if !path.is_file() {
        return Err(TrendsError::NoBatch(path.to_path_buf()));
    }
    let batch_date = batch_date_from_filename(path).ok_or_else(|| {
        TrendsError::Config(format!(
            "cannot derive a batch date from file name {}",
            path.display()
        ))
    })?;
    Ok(BatchInput {
        path: path.to_path_buf(),
        batch_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_INPUT_TEMPLATE;
    use tempfile::tempdir;

    #[test]
    fn test_latest_folder_wins() {
        let dir = tempdir().unwrap();
        for day in ["2025_01_01", "2025_01_03", "2025_01_02"] {
            let folder = dir.path().join(day);
            fs::create_dir_all(&folder).unwrap();
            fs::write(folder.join(format!("spotify_rising_with_trends_{}.csv", day)), "x").unwrap();
        }
        fs::create_dir_all(dir.path().join("scratch")).unwrap();

        let batch = find_latest_batch(dir.path(), DEFAULT_INPUT_TEMPLATE).unwrap();
        assert_eq!(batch.batch_date, NaiveDate::from_ymd_opt(2025, 1, 3).unwrap());
        assert!(batch.path.ends_with("2025_01_03/spotify_rising_with_trends_2025_01_03.csv"));
    }

    #[test]
    fn test_file_name_match_ignores_case() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("2025_02_10");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("Spotify_Rising_With_Trends_2025_02_10.CSV"), "x").unwrap();

        let batch = find_latest_batch(dir.path(), DEFAULT_INPUT_TEMPLATE).unwrap();
        assert_eq!(batch.batch_date, NaiveDate::from_ymd_opt(2025, 2, 10).unwrap());
    }

    #[test]
    fn test_missing_extract_is_no_batch() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("2025_01_01")).unwrap();
        let err = find_latest_batch(dir.path(), DEFAULT_INPUT_TEMPLATE).unwrap_err();
        assert!(matches!(err, TrendsError::NoBatch(_)));

        let empty = tempdir().unwrap();
        assert!(find_latest_batch(empty.path(), DEFAULT_INPUT_TEMPLATE).is_err());
    }

    #[test]
    fn test_date_from_filename() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(
            batch_date_from_filename(Path::new("raw/spotify_rising_with_trends_2025_03_09.csv")),
            Some(date)
        );
        assert_eq!(batch_date_from_filename(Path::new("trends-2025-03-09.ndjson")), Some(date));
        assert_eq!(batch_date_from_filename(Path::new("trends.csv")), None);
    }
}
