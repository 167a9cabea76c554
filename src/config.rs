use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::DEFAULT_INPUT_TEMPLATE;
use crate::error::{Result, TrendsError};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Environment variables that override the file configuration.
pub const ENV_ONE_OFF_INPUT: &str = "TRANSFORM_ONE_OFF_INPUT";
pub const ENV_OUTPUT_ROOT: &str = "TRENDS_OUTPUT_ROOT";
pub const ENV_WORKERS: &str = "TRENDS_WORKERS";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub pipeline: PipelineConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Folder holding one `YYYY_MM_DD` subfolder per extraction batch
    pub raw_root: PathBuf,
    pub output_root: PathBuf,
    pub genre_cache: PathBuf,
    pub dims_db: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_root: PathBuf::from("data/raw"),
            output_root: PathBuf::from("data/transformed"),
            genre_cache: PathBuf::from("data/cache/genres.json"),
            dims_db: PathBuf::from("data/dims/dims.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Partition workers; 0 or 1 runs single-threaded
    pub workers: usize,
    pub input_template: String,
    /// Process this file instead of auto-detecting the latest batch
    pub one_off_input: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            input_template: DEFAULT_INPUT_TEMPLATE.to_string(),
            one_off_input: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus HTTP listener, e.g. `127.0.0.1:9898`. Unset disables the listener.
    pub listen_addr: Option<String>,
}

impl MetricsConfig {
    pub fn listen_addr(&self) -> Result<Option<SocketAddr>> {
        self.listen_addr
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse::<SocketAddr>()
                    .map_err(|e| TrendsError::Config(format!("invalid metrics.listen_addr '{}': {}", s, e)))
            })
            .transpose()
    }
}

impl Config {
    /// Load from `config_path`. A missing file yields the defaults.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let config_content = fs::read_to_string(config_path).map_err(|e| {
                TrendsError::Config(format!(
                    "Failed to read config file '{}': {}",
                    config_path.display(),
                    e
                ))
            })?;
            let config: Config = toml::from_str(&config_content)?;
            info!("Loaded configuration from {}", config_path.display());
            config
        } else {
            debug!("No config file at {}, using defaults", config_path.display());
            Config::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`, so tests need not touch the process env.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(input) = lookup(ENV_ONE_OFF_INPUT).filter(|v| !v.trim().is_empty()) {
            self.pipeline.one_off_input = Some(PathBuf::from(input.trim()));
        }
        if let Some(root) = lookup(ENV_OUTPUT_ROOT).filter(|v| !v.trim().is_empty()) {
            self.paths.output_root = PathBuf::from(root.trim());
        }
        if let Some(workers) = lookup(ENV_WORKERS).filter(|v| !v.trim().is_empty()) {
            self.pipeline.workers = workers.trim().parse().map_err(|e| {
                TrendsError::Config(format!("invalid {} '{}': {}", ENV_WORKERS, workers, e))
            })?;
        }
        Ok(())
    }
}
