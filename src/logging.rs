use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "artist_trends=info";

/// Initializes the logging system with both console and file output.
///
/// `RUST_LOG` is honored; without it only this crate logs, at `info`.
pub fn init_logging() {
    let _ = fs::create_dir_all("logs");

    // Daily-rotated JSON file, written off the hot path
    let file_appender = tracing_appender::rolling::daily("logs", "artist_trends.log");
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    // try_init: a second call (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    // We need to keep the guard alive so logs are flushed on exit
    std::mem::forget(_guard);
}
