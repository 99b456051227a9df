use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug)]
pub struct BasaltConfig {
    #[serde(default = "defaults::cnc_dir")]
    pub cnc_dir: String,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default = "defaults::counters_capacity")]
    pub counters_capacity: usize,
    #[serde(default = "defaults::heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "defaults::liveness_timeout_ms")]
    pub liveness_timeout_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    pub fn cnc_dir() -> String {
        "/tmp/basalt".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn counters_capacity() -> usize {
        256
    }

    pub fn heartbeat_interval_ms() -> u64 {
        1_000
    }

    pub fn liveness_timeout_ms() -> u64 {
        10_000
    }
}

impl BasaltConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let basalt_config: BasaltConfig = toml::from_str(&toml_to_str)?;
        Ok(basalt_config)
    }

    /// Loads `path` when it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(toml::from_str("")?)
        }
    }
}
