use crate::error::{RefineryError, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub inputs: InputsConfig,
    pub geocode: GeocodeConfig,
    pub outputs: OutputsConfig,
}

/// Paths of the four tabular exports consumed by a run.
#[derive(Debug, Deserialize)]
pub struct InputsConfig {
    pub profile: PathBuf,
    pub cleaned: PathBuf,
    pub bulk_profile: PathBuf,
    pub interests: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeConfig {
    /// Persisted address cache, read at start and rewritten at end of run.
    pub cache_path: PathBuf,
    /// Per-lookup timeout. A lookup that exceeds it yields unknown coordinates.
    pub timeout_seconds: u64,
    /// Upper bound on in-flight geocoder requests.
    pub max_concurrent_lookups: usize,
}

#[derive(Debug, Deserialize)]
pub struct OutputsConfig {
    pub master: PathBuf,
    pub layers_dir: PathBuf,
}

impl Config {
    pub fn load(config_path: &str) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            RefineryError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path, e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }
}
