//! Configuration system for the staffql server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, dataset, LLM endpoint, logging)
//! 2. .env file - picked up by `dotenvy` in `main` before loading
//!
//! Environment variables always override config.yaml values. A missing
//! config file is not an error; defaults apply.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Inference endpoint used when neither config nor `OLLAMA_API_URL` names one
pub const DEFAULT_OLLAMA_API_URL: &str = "http://localhost:11434/api/generate";

/// Model identifier sent with every generate request
pub const DEFAULT_MODEL: &str = "phi3:mini";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Dataset loaded at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// File read once at startup; format chosen by extension
    pub path: PathBuf,

    /// Name the dataset is queryable under
    pub table: String,

    /// Local build of the `read_stat` extension, instead of the community download
    pub extension_path: Option<PathBuf>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("Employee.sav"),
            table: staffql_duck::DEFAULT_TABLE.to_string(),
            extension_path: None,
        }
    }
}

/// DuckDB target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file the dataset is written into; a scratch file when unset
    pub path: Option<PathBuf>,
}

/// Natural-language translator endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_url: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_OLLAMA_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub dataset: DatasetConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], falling back to defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            return Self::load(path);
        }
        let mut config = Config::default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("STAFFQL_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("STAFFQL_SERVER_PORT") {
            if let Ok(port_num) = port.parse() {
                self.server.port = port_num;
            }
        }

        if let Ok(path) = std::env::var("STAFFQL_DATASET") {
            self.dataset.path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("READ_STAT_EXTENSION_PATH") {
            self.dataset.extension_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("STAFFQL_DATABASE") {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Ok(url) = std::env::var("OLLAMA_API_URL") {
            self.llm.api_url = url;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            self.llm.model = model;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    /// Address the HTTP listener binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Where and how the engine materializes the dataset
    pub fn engine_options(&self) -> staffql_duck::EngineOptions {
        staffql_duck::EngineOptions {
            database: self.database.path.clone(),
            table: self.dataset.table.clone(),
            extension_path: self.dataset.extension_path.clone(),
        }
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }
}
