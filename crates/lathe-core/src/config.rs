//! Orchestrator configuration.
//!
//! Settings come from TOML files (`~/.lathe/config.toml`, then
//! `./lathe.toml`), each overriding the keys it sets, followed by the
//! `LATHE_DATABASE`, `LATHE_LOG_DIR` and `LATHE_MODEL_DIR` environment
//! variables.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lathe_training::{DatasetId, DatasetRecord, InMemoryDatasetCatalog, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A dataset registered with the catalog at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub id: i64,
    pub owner_id: i64,
    pub file_reference: String,
}

/// Runtime settings for the scheduler, runners and status service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory holding one log file per job.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Directory holding trained model artifacts.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Runners allowed past Pending at the same time.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Duration of one simulated epoch.
    #[serde(default = "default_epoch_delay_ms")]
    pub epoch_delay_ms: u64,

    /// Wait between scheduling a runner and its Pending -> Running write.
    #[serde(default = "default_runner_start_delay_ms")]
    pub runner_start_delay_ms: u64,

    /// Back-off before retrying a failed checkpoint write.
    #[serde(default = "default_checkpoint_retry_delay_ms")]
    pub checkpoint_retry_delay_ms: u64,

    /// Log lines returned with a status query.
    #[serde(default = "default_status_log_lines")]
    pub status_log_lines: usize,

    #[serde(default = "default_log_lines")]
    pub default_log_lines: usize,

    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,

    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Loaded models kept in memory for prediction.
    #[serde(default = "default_model_cache_size")]
    pub model_cache_size: usize,

    /// trace, debug, info, warn or error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("lathe.db")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_epoch_delay_ms() -> u64 {
    2000
}

fn default_runner_start_delay_ms() -> u64 {
    1000
}

fn default_checkpoint_retry_delay_ms() -> u64 {
    100
}

fn default_status_log_lines() -> usize {
    10
}

fn default_log_lines() -> usize {
    50
}

fn default_max_log_lines() -> usize {
    1000
}

fn default_page_size() -> usize {
    50
}

fn default_model_cache_size() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_dir: default_log_dir(),
            model_dir: default_model_dir(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            epoch_delay_ms: default_epoch_delay_ms(),
            runner_start_delay_ms: default_runner_start_delay_ms(),
            checkpoint_retry_delay_ms: default_checkpoint_retry_delay_ms(),
            status_log_lines: default_status_log_lines(),
            default_log_lines: default_log_lines(),
            max_log_lines: default_max_log_lines(),
            default_page_size: default_page_size(),
            model_cache_size: default_model_cache_size(),
            log_level: default_log_level(),
            datasets: Vec::new(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl OrchestratorConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let table = Self::read_table(path)?;
        let config: Self = toml::Value::Table(table)
            .try_into()
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn read_table(path: &Path) -> ConfigResult<toml::Table> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {e}", path.display())))?;
        content
            .parse::<toml::Table>()
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".lathe")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from("lathe.toml")
    }

    /// Discover and load configuration files, then apply environment overrides.
    ///
    /// Missing files are skipped; files that exist but do not parse are errors.
    pub fn discover_and_load() -> ConfigResult<Self> {
        let paths = [Self::default_global_path(), Self::default_local_path()];
        let mut config = Self::load_layered(paths.iter().map(PathBuf::as_path))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Merges the given files in order, later keys overriding earlier ones.
    pub fn load_layered<'a>(paths: impl IntoIterator<Item = &'a Path>) -> ConfigResult<Self> {
        let mut merged = toml::Table::new();
        for path in paths {
            match Self::read_table(path) {
                Ok(table) => merged.extend(table),
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Overrides storage locations from `LATHE_*` variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("LATHE_DATABASE").filter(|v| !v.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("LATHE_LOG_DIR").filter(|v| !v.is_empty()) {
            self.log_dir = PathBuf::from(path);
        }
        if let Some(path) = lookup("LATHE_MODEL_DIR").filter(|v| !v.is_empty()) {
            self.model_dir = PathBuf::from(path);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("max_concurrent_jobs", self.max_concurrent_jobs),
            ("max_log_lines", self.max_log_lines),
            ("default_page_size", self.default_page_size),
            ("model_cache_size", self.model_cache_size),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{key} must be greater than 0")));
            }
        }

        for (key, value) in
            [("status_log_lines", self.status_log_lines), ("default_log_lines", self.default_log_lines)]
        {
            if value == 0 || value > self.max_log_lines {
                return Err(ConfigError::InvalidValue(format!(
                    "{key} must be between 1 and max_log_lines ({}), got {value}",
                    self.max_log_lines
                )));
            }
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "log_level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            )));
        }

        let mut seen = HashSet::new();
        for dataset in &self.datasets {
            if !seen.insert(dataset.id) {
                return Err(ConfigError::InvalidValue(format!(
                    "dataset {} is listed more than once",
                    dataset.id
                )));
            }
        }

        Ok(())
    }

    pub fn epoch_delay(&self) -> Duration {
        Duration::from_millis(self.epoch_delay_ms)
    }

    pub fn runner_start_delay(&self) -> Duration {
        Duration::from_millis(self.runner_start_delay_ms)
    }

    pub fn checkpoint_retry_delay(&self) -> Duration {
        Duration::from_millis(self.checkpoint_retry_delay_ms)
    }

    /// Builds the dataset catalog from the `datasets` entries.
    pub fn dataset_catalog(&self) -> InMemoryDatasetCatalog {
        InMemoryDatasetCatalog::with_datasets(self.datasets.iter().map(|d| DatasetRecord {
            id: DatasetId(d.id),
            owner_id: UserId(d.owner_id),
            file_reference: d.file_reference.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lathe_training::DatasetCatalog;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.database_path, PathBuf::from("lathe.db"));
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.status_log_lines, 10);
        assert_eq!(config.default_log_lines, 50);
        assert_eq!(config.max_log_lines, 1000);
        assert_eq!(config.runner_start_delay(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lathe.toml");
        std::fs::write(
            &path,
            r#"
max_concurrent_jobs = 2
epoch_delay_ms = 10

[[datasets]]
id = 1
owner_id = 1
file_reference = "data/reviews.csv"
"#,
        )
        .unwrap();

        let config = OrchestratorConfig::load_from_file(&path).unwrap();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.epoch_delay_ms, 10);
        assert_eq!(config.model_cache_size, 8);

        let catalog = config.dataset_catalog();
        assert_eq!(catalog.get_dataset(DatasetId(1)).unwrap().owner_id, UserId(1));
    }

    #[test]
    fn test_load_missing_file() {
        let result = OrchestratorConfig::load_from_file(Path::new("/nonexistent/lathe.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lathe.toml");
        std::fs::write(&path, "max_concurrent_jobs = [").unwrap();
        assert!(matches!(
            OrchestratorConfig::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_layered_override() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.toml");
        let local = temp.path().join("local.toml");
        std::fs::write(&global, "max_concurrent_jobs = 8\nlog_level = \"debug\"\n").unwrap();
        std::fs::write(&local, "max_concurrent_jobs = 1\n").unwrap();
        let missing = temp.path().join("missing.toml");

        let config = OrchestratorConfig::load_layered([
            global.as_path(),
            missing.as_path(),
            local.as_path(),
        ])
        .unwrap();
        assert_eq!(config.max_concurrent_jobs, 1);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = OrchestratorConfig::default();
        config.apply_env_overrides(|key| match key {
            "LATHE_DATABASE" => Some("/tmp/jobs.db".to_string()),
            "LATHE_LOG_DIR" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.database_path, PathBuf::from("/tmp/jobs.db"));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = OrchestratorConfig { max_concurrent_jobs: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let config = OrchestratorConfig { default_log_lines: 2000, ..Default::default() };
        assert!(config.validate().is_err());

        let config = OrchestratorConfig { log_level: "loud".to_string(), ..Default::default() };
        assert!(config.validate().is_err());

        let dup = DatasetConfig { id: 1, owner_id: 1, file_reference: "a.csv".to_string() };
        let config =
            OrchestratorConfig { datasets: vec![dup.clone(), dup], ..Default::default() };
        assert!(config.validate().is_err());
    }
}
