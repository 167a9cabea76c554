// Pipeline ingestion: locating extract batches and reading them into raw records

pub mod batch_locator;
pub mod extract;

// Re-export key types and functions for external use
pub use batch_locator::{batch_date_from_filename, find_latest_batch, one_off_batch, BatchInput};
pub use extract::{
    parse_extract, read_csv, read_extract, read_ndjson, Extract, ExtractFormat, IngestReport,
};
