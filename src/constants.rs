/// Genre label used when no genre could be resolved for an artist
pub const UNKNOWN_GENRE: &str = "unknown";

/// Canonical genre delimiter; alternate delimiters are rewritten to this one
pub const GENRE_DELIMITER: char = ';';
pub const ALTERNATE_GENRE_DELIMITERS: [char; 2] = ['|', ','];

// Trend score domain (Google Trends interest is 0..=100)
pub const MIN_TREND_SCORE: f64 = 0.0;
pub const MAX_TREND_SCORE: f64 = 100.0;

/// Default extract file name template; `{date}` is the `YYYY_MM_DD` batch folder name
pub const DEFAULT_INPUT_TEMPLATE: &str = "spotify_rising_with_trends_{date}.csv";

// Output table names
pub const DIM_ARTISTS: &str = "dim_artists";
pub const DIM_GENRES: &str = "dim_genres";
pub const DIM_LOCATIONS: &str = "dim_locations";
pub const ARTIST_GENRES: &str = "artist_genres";
pub const FACT_ARTIST_TRENDS: &str = "fact_artist_trends";
pub const FACT_GENRE_TRENDS: &str = "fact_genre_trends";

// Partition markers
pub const SUCCESS_MARKER: &str = "_SUCCESS";
pub const METRICS_FILE: &str = "_metrics.json";
pub const STAGING_DIR: &str = ".staging";

/// Get all output table names in the order they are written
pub fn output_tables() -> Vec<&'static str> {
    vec![
        DIM_ARTISTS,
        DIM_GENRES,
        DIM_LOCATIONS,
        ARTIST_GENRES,
        FACT_ARTIST_TRENDS,
        FACT_GENRE_TRENDS,
    ]
}
