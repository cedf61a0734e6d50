//! Configuration for reliquary

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reliquary")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for the database and run working directories
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// HTTP port for the public ARK resolver
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Name Assigning Authority Number for minted ARKs
    #[serde(default = "default_naan")]
    pub naan: String,

    /// Shoulder prefix for assigned names
    #[serde(default = "default_shoulder")]
    pub shoulder: String,

    /// Length of the random part of an assigned name (check char excluded)
    #[serde(default = "default_name_length")]
    pub name_length: usize,

    /// Base URL the minted ARK resolves under
    #[serde(default = "default_resolver_base")]
    pub resolver_base: String,

    /// Seconds of executor silence before a run is failed with a timeout
    #[serde(default = "default_executor_timeout")]
    pub executor_timeout_secs: u64,

    /// Seconds between scans for queued runs to dispatch
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval_secs: u64,

    /// External reconstruction command; when unset, queued runs are left
    /// for an out-of-process executor to pick up
    #[serde(default)]
    pub reconstructor_command: Option<PathBuf>,
}

fn default_http_port() -> u16 {
    8097
}

fn default_naan() -> String {
    "99999".to_string()
}

fn default_shoulder() -> String {
    "t1".to_string()
}

fn default_name_length() -> usize {
    8
}

fn default_resolver_base() -> String {
    "http://localhost:8097".to_string()
}

fn default_executor_timeout() -> u64 {
    6 * 60 * 60
}

fn default_dispatch_interval() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            http_port: default_http_port(),
            naan: default_naan(),
            shoulder: default_shoulder(),
            name_length: default_name_length(),
            resolver_base: default_resolver_base(),
            executor_timeout_secs: default_executor_timeout(),
            dispatch_interval_secs: default_dispatch_interval(),
            reconstructor_command: None,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get database path
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("reliquary.db")
    }

    /// Get working directory for run outputs
    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.naan, "99999");
        assert_eq!(parsed.shoulder, "t1");
        assert_eq!(parsed.name_length, 8);
        assert_eq!(parsed.executor_timeout_secs, 6 * 60 * 60);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed.http_port, 8097);
        assert!(parsed.reconstructor_command.is_none());
    }
}
