//! Configuration loader and validator for the grade sync client.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub service: Service,
    #[serde(default)]
    pub autosave: Autosave,
}

/// Grading service endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub base_url: String,
    #[serde(default)]
    pub token: String,
    pub teacher_id: i64,
}

/// Autosave timings, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Autosave {
    pub debounce_ms: u64,
    pub saved_clear_ms: u64,
    pub error_clear_ms: u64,
    pub discard_stale_responses: bool,
}

impl Default for Autosave {
    fn default() -> Self {
        Self {
            debounce_ms: 800,
            saved_clear_ms: 2000,
            error_clear_ms: 3000,
            discard_stale_responses: false,
        }
    }
}

impl Autosave {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn saved_clear(&self) -> Duration {
        Duration::from_millis(self.saved_clear_ms)
    }

    pub fn error_clear(&self) -> Duration {
        Duration::from_millis(self.error_clear_ms)
    }
}

impl Config {
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let raw = self.service.base_url.trim();
        // Url::join drops the last segment unless the base ends in '/'.
        let with_slash = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{}/", raw)
        };
        Url::parse(&with_slash).map_err(|_| ConfigError::Invalid("service.base_url must be a valid URL"))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `gradesync.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("gradesync.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.service.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("service.base_url must be non-empty"));
    }
    cfg.base_url()?;
    if cfg.service.teacher_id <= 0 {
        return Err(ConfigError::Invalid("service.teacher_id must be > 0"));
    }

    if cfg.autosave.debounce_ms == 0 {
        return Err(ConfigError::Invalid("autosave.debounce_ms must be > 0"));
    }
    if cfg.autosave.saved_clear_ms == 0 {
        return Err(ConfigError::Invalid("autosave.saved_clear_ms must be > 0"));
    }
    if cfg.autosave.error_clear_ms == 0 {
        return Err(ConfigError::Invalid("autosave.error_clear_ms must be > 0"));
    }

    Ok(())
}

/// Returns the canonical example YAML.
pub fn example() -> &'static str {
    r#"service:
  base_url: "http://localhost:8080/api/"
  token: "YOUR_API_TOKEN"
  teacher_id: 1

autosave:
  debounce_ms: 800
  saved_clear_ms: 2000
  error_clear_ms: 3000
  discard_stale_responses: false
"#
}
