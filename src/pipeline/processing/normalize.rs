//! Field canonicalizers shared by every stage.
//!
//! All functions here are total: they never fail on odd input, and an empty
//! string maps to an empty string. The only fallible helper is
//! [`split_genre_text`], which rejects list literals with unbalanced brackets.

use chrono::NaiveDate;

use crate::constants::{ALTERNATE_GENRE_DELIMITERS, GENRE_DELIMITER};
use crate::error::RecordError;

/// Trimmed text with case preserved. Used for identifiers whose case is significant
/// (Spotify artist ids are case-sensitive base62).
pub fn normalize_id(value: &str) -> String {
    value.trim().to_string()
}

/// Trimmed, lower-cased key.
pub fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Region codes are upper-cased: `" ca "` becomes `"CA"`.
pub fn normalize_state_code(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Display name: trimmed, inner whitespace runs collapsed to one space.
pub fn normalize_name(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_token_noise(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '[' | ']' | '(' | ')')
}

/// A single genre label: surrounding quotes, brackets and parentheses stripped, lower-cased.
pub fn normalize_genre(token: &str) -> String {
    token.trim_matches(is_token_noise).to_lowercase()
}

/// Optional text field: `None` when absent or blank after trimming.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Parse an extract date. Accepts `YYYY-MM-DD`, `YYYY_MM_DD` and timestamps with a date prefix.
pub fn parse_extract_date(value: &str) -> Option<NaiveDate> {
    let text = value.trim().replace('_', "-");
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        return Some(date);
    }
    // "2025-01-01T00:00:00Z" or "2025-01-01 00:00:00"
    if text.len() > 10 && text.is_char_boundary(10) {
        let (day, rest) = text.split_at(10);
        if rest.starts_with('T') || rest.starts_with(' ') {
            return NaiveDate::parse_from_str(day, "%Y-%m-%d").ok();
        }
    }
    None
}

/// Result of splitting one genre text field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenreTokens {
    pub labels: Vec<String>,
    /// `|` or `,` were rewritten to `;` before splitting
    pub delimiters_normalized: bool,
}

/// Split a delimited genre field into normalized labels.
///
/// Accepts `"pop; rock"`, `"pop|rock"`, `"pop, rock"`, `"['midwest emo', 'emo']"` and
/// `'["indie pop"]'`. Empty labels are discarded and duplicates removed, keeping
/// first-seen order.
pub fn split_genre_text(raw: &str) -> Result<GenreTokens, RecordError> {
    let text = raw.trim();
    let mut tokens = GenreTokens::default();
    if text.is_empty() {
        return Ok(tokens);
    }

    let opens = text.starts_with('[');
    let closes = text.ends_with(']');
    if opens != closes {
        return Err(RecordError::MalformedGenres {
            raw: text.to_string(),
        });
    }

    if opens && closes {
        if let Some(items) = parse_list_literal(text) {
            for item in items {
                push_label(&mut tokens.labels, &item);
            }
            return Ok(tokens);
        }
    }

    let normalized: String = text
        .chars()
        .map(|c| {
            if ALTERNATE_GENRE_DELIMITERS.contains(&c) {
                tokens.delimiters_normalized = true;
                GENRE_DELIMITER
            } else {
                c
            }
        })
        .collect();

    for part in normalized.split(GENRE_DELIMITER) {
        push_label(&mut tokens.labels, part);
    }
    Ok(tokens)
}

fn parse_list_literal(text: &str) -> Option<Vec<String>> {
    let json_ready = text.replace('\'', "\"");
    let values: Vec<serde_json::Value> = serde_json::from_str(&json_ready).ok()?;
    Some(
        values
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
            .collect(),
    )
}

fn push_label(labels: &mut Vec<String>, token: &str) {
    let label = normalize_genre(token);
    if !label.is_empty() && !labels.contains(&label) {
        labels.push(label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_normalizers() {
        assert_eq!(normalize_key("  Pop "), "pop");
        assert_eq!(normalize_state_code(" ca"), "CA");
        assert_eq!(normalize_id(" 4Z8W4fKeB5YxbusRsdQVPb "), "4Z8W4fKeB5YxbusRsdQVPb");
        assert_eq!(normalize_name("  The   Beths "), "The Beths");
        assert_eq!(normalize_key(""), "");
        assert_eq!(normalize_state_code(""), "");
    }

    #[test]
    fn test_parse_extract_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2025, 8, 27);
        assert_eq!(parse_extract_date("2025_08_27"), expected);
        assert_eq!(parse_extract_date(" 2025-08-27 "), expected);
        assert_eq!(parse_extract_date("2025-08-27T10:00:00Z"), expected);
        assert_eq!(parse_extract_date("27/08/2025"), None);
        assert_eq!(parse_extract_date(""), None);
    }

    #[test]
    fn test_split_delimited_genres() {
        let tokens = split_genre_text("Pop;Rock").unwrap();
        assert_eq!(tokens.labels, vec!["pop", "rock"]);
        assert!(!tokens.delimiters_normalized);

        let tokens = split_genre_text("indie pop | Bedroom Pop, pop").unwrap();
        assert_eq!(tokens.labels, vec!["indie pop", "bedroom pop", "pop"]);
        assert!(tokens.delimiters_normalized);
    }

    #[test]
    fn test_split_list_literals() {
        let tokens = split_genre_text("['midwest emo', 'emo']").unwrap();
        assert_eq!(tokens.labels, vec!["midwest emo", "emo"]);

        let tokens = split_genre_text(r#"["Indie Pop"]"#).unwrap();
        assert_eq!(tokens.labels, vec!["indie pop"]);

        // Apostrophes break the JSON rewrite; falls back to splitting
        let tokens = split_genre_text("['rock 'n' roll', 'blues']").unwrap();
        assert!(tokens.labels.contains(&"blues".to_string()));
    }

    #[test]
    fn test_split_drops_empty_and_duplicate_labels() {
        let tokens = split_genre_text(" ; pop ;; POP ; ").unwrap();
        assert_eq!(tokens.labels, vec!["pop"]);
        assert!(split_genre_text("   ").unwrap().labels.is_empty());
    }

    #[test]
    fn test_unbalanced_list_is_malformed() {
        let err = split_genre_text("['pop', 'rock'").unwrap_err();
        assert!(matches!(err, RecordError::MalformedGenres { .. }));
    }
}
