use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Streaming digest of a file's content.
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Stable identity of a run: the same input content on the same run date always
/// yields the same id.
pub fn compute_run_id(run_date: NaiveDate, input_sha256_hex: &str) -> String {
    // Simple canonical string; can be evolved later
    let mut s = String::new();
    s.push_str(&run_date.to_string());
    s.push('|');
    s.push_str(input_sha256_hex);
    sha256_hex(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_run_id_is_stable() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let digest = sha256_hex(b"artist_id,location,date\n");
        assert_eq!(compute_run_id(date, &digest), compute_run_id(date, &digest));
        assert_ne!(
            compute_run_id(date, &digest),
            compute_run_id(date.succ_opt().unwrap(), &digest)
        );
        assert_eq!(compute_run_id(date, &digest).len(), 64);
    }

    #[test]
    fn test_file_digest_matches_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extract.csv");
        std::fs::write(&path, b"a,b\n1,2\n").unwrap();
        assert_eq!(file_sha256(&path).unwrap(), sha256_hex(b"a,b\n1,2\n"));
    }
}
