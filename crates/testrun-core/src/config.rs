//! Runner configuration.
//!
//! Key=value format read from `.testrun/config` (or `--config`).
//! Precedence: CLI flags > `--config` file > `.testrun/config` > defaults.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Default config file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".testrun/config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
}

/// Runner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base log directory; loop iterations get `loop{i}` subdirectories.
    pub log_dir: PathBuf,
    /// Host identifier override used in log file names.
    pub host: Option<String>,
    /// Write `results.json` after the run.
    pub results_json: bool,
    /// Write `report.tsv` after the run.
    pub report_tsv: bool,
    /// Mirror orchestrator logging into `{log_dir}/{module}.log` during the run.
    pub run_log: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("testLogs"),
            host: None,
            results_json: true,
            report_tsv: true,
            run_log: true,
        }
    }
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Load `.testrun/config` if present, then an explicit file if given.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            config.load_file(default_path)?;
        }
        if let Some(path) = explicit {
            config.load_file(path)?;
        }
        Ok(config)
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    /// Parse config content (key=value format).
    fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "log_dir" => self.log_dir = PathBuf::from(value),
            "host" => {
                self.host = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "results_json" => self.results_json = Self::parse_bool(key, value)?,
            "report_tsv" => self.report_tsv = Self::parse_bool(key, value)?,
            "run_log" => self.run_log = Self::parse_bool(key, value)?,
            _ => {
                warn!(key, "unknown config key");
            }
        }
        Ok(())
    }

    fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }
}
