use std::{path::Path, path::PathBuf, time::Duration};

use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

use crate::{bucket::BucketSpan, sizing};

pub const DEFAULT_CONFIG_FILE: &str = "hourgate.toml";
pub const ENV_PREFIX: &str = "HOURGATE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Bytes mapped per window; derived from memory and core count when unset.
    #[serde(default)]
    pub window_size_bytes: Option<usize>,
    #[serde(default = "default_bucket_span_secs")]
    pub bucket_span_secs: u32,
    #[serde(default = "default_barrier_poll_ms")]
    pub barrier_poll_ms: u64,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub path: PathBuf,
    /// Overrides the symbol derived from the file name.
    #[serde(default)]
    pub symbol: Option<String>,
}

impl SourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            symbol: None,
        }
    }

    pub fn with_symbol(path: impl Into<PathBuf>, symbol: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            symbol: Some(symbol.into()),
        }
    }
}

fn default_bucket_span_secs() -> u32 {
    BucketSpan::HOUR.secs()
}

fn default_barrier_poll_ms() -> u64 {
    50
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            window_size_bytes: None,
            bucket_span_secs: default_bucket_span_secs(),
            barrier_poll_ms: default_barrier_poll_ms(),
            sources: Vec::new(),
        }
    }
}

impl IngestConfig {
    /// Loads `hourgate.toml` from the working directory (if present) overlaid with
    /// `HOURGATE_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_span_secs == 0 {
            return Err(ConfigError::Message(
                "bucket_span_secs must be greater than zero".to_string(),
            ));
        }
        if self.window_size_bytes == Some(0) {
            return Err(ConfigError::Message(
                "window_size_bytes must be greater than zero".to_string(),
            ));
        }
        if let Some(source) = self.sources.iter().find(|s| s.path.as_os_str().is_empty()) {
            return Err(ConfigError::Message(format!(
                "source {source:?} has an empty path"
            )));
        }
        Ok(())
    }

    pub fn window_size(&self) -> usize {
        self.window_size_bytes
            .unwrap_or_else(sizing::default_window_size)
    }

    pub fn bucket_span(&self) -> BucketSpan {
        BucketSpan::from_secs(self.bucket_span_secs).unwrap_or_default()
    }

    pub fn barrier_poll_interval(&self) -> Duration {
        Duration::from_millis(self.barrier_poll_ms.max(1))
    }
}
