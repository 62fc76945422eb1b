//! Configuration management for the model runner
//!
//! This module handles all configuration settings, including server settings,
//! packaged-model metadata, batch scoring defaults and logging.

use crate::error::{Result, RunnerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// What the packaged model predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// Single numeric prediction per row
    Regression,
    /// Two-class probabilities per row
    Binary,
    /// Single anomaly score per row
    Anomaly,
    /// Feature transformation, no scoring
    Transform,
    /// Free-form payload in, free-form payload out
    Unstructured,
}

impl TargetType {
    /// Whether inputs and outputs follow the tabular frame schema
    pub fn is_structured(&self) -> bool {
        !matches!(self, TargetType::Unstructured)
    }

    /// Whether class labels must be configured
    pub fn requires_labels(&self) -> bool {
        matches!(self, TargetType::Binary)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Regression => "regression",
            TargetType::Binary => "binary",
            TargetType::Anomaly => "anomaly",
            TargetType::Transform => "transform",
            TargetType::Unstructured => "unstructured",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regression" => Ok(TargetType::Regression),
            "binary" => Ok(TargetType::Binary),
            "anomaly" => Ok(TargetType::Anomaly),
            "transform" => Ok(TargetType::Transform),
            "unstructured" => Ok(TargetType::Unstructured),
            other => Err(RunnerError::config(format!(
                "Unknown target type '{other}', expected one of: regression, binary, anomaly, transform, unstructured"
            ))),
        }
    }
}

/// Positive/negative class names for binary classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLabels {
    pub positive: String,
    pub negative: String,
}

/// Main configuration structure for the model runner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Packaged model configuration
    #[serde(default)]
    pub model: ModelConfig,
    /// Batch scoring configuration
    #[serde(default)]
    pub batch: BatchConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Path prefix all routes are mounted under (may be empty)
    pub url_prefix: String,
    /// Enable CORS
    pub enable_cors: bool,
}

/// Packaged model configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Directory holding the model artifact and any custom code
    pub code_dir: PathBuf,
    /// What the model predicts
    pub target_type: TargetType,
    /// Positive class name (binary only)
    pub positive_class_label: Option<String>,
    /// Negative class name (binary only)
    pub negative_class_label: Option<String>,
    /// Memory hint in MB forwarded to hook runtimes hosting non-native code
    pub max_heap_mb: Option<usize>,
}

/// Batch scoring configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Content type assumed for input files when none is given
    pub default_content_type: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
    /// Enable request logging
    pub log_requests: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            url_prefix: String::new(),
            enable_cors: true,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            code_dir: PathBuf::from("."),
            target_type: TargetType::Regression,
            positive_class_label: None,
            negative_class_label: None,
            max_heap_mb: None,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_content_type: "text/plain;charset=utf8".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            log_requests: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        if let Ok(host) = std::env::var("PLINTH_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("PLINTH_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| RunnerError::config("Invalid port number"))?;
        }
        if let Ok(prefix) = std::env::var("PLINTH_URL_PREFIX") {
            config.server.url_prefix = prefix;
        }

        // Model configuration
        if let Ok(code_dir) = std::env::var("PLINTH_CODE_DIR") {
            config.model.code_dir = PathBuf::from(code_dir);
        }
        if let Ok(target_type) = std::env::var("PLINTH_TARGET_TYPE") {
            config.model.target_type = target_type.parse()?;
        }
        if let Ok(label) = std::env::var("PLINTH_POSITIVE_CLASS_LABEL") {
            config.model.positive_class_label = Some(label);
        }
        if let Ok(label) = std::env::var("PLINTH_NEGATIVE_CLASS_LABEL") {
            config.model.negative_class_label = Some(label);
        }
        if let Ok(max_heap) = std::env::var("PLINTH_MAX_HEAP_MB") {
            config.model.max_heap_mb = Some(
                max_heap
                    .parse()
                    .map_err(|_| RunnerError::config("Invalid max heap size"))?,
            );
        }

        // Batch configuration
        if let Ok(content_type) = std::env::var("PLINTH_DEFAULT_CONTENT_TYPE") {
            config.batch.default_content_type = content_type;
        }

        // Logging configuration
        if let Ok(log_level) = std::env::var("PLINTH_LOG_LEVEL") {
            config.logging.level = log_level;
        }
        if let Ok(log_format) = std::env::var("PLINTH_LOG_FORMAT") {
            config.logging.format = log_format;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RunnerError::config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| RunnerError::config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate server configuration
        if self.server.port == 0 {
            return Err(RunnerError::config("Server port cannot be 0"));
        }
        if self.server.url_prefix.contains(char::is_whitespace) {
            return Err(RunnerError::config("URL prefix cannot contain whitespace"));
        }

        // Validate model configuration
        if !self.model.code_dir.is_dir() {
            return Err(RunnerError::config(format!(
                "Code directory {} does not exist",
                self.model.code_dir.display()
            )));
        }
        if self.model.target_type.requires_labels() {
            let labels = self.class_labels()?;
            if labels.is_none() {
                return Err(RunnerError::config(
                    "Binary target type requires positive and negative class labels",
                ));
            }
        }

        // Validate logging configuration
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(RunnerError::config(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }
        if !["pretty", "json"].contains(&self.logging.format.as_str()) {
            return Err(RunnerError::config("Log format must be one of: pretty, json"));
        }

        Ok(())
    }

    /// Class labels when both are configured, rejecting half-configured pairs
    pub fn class_labels(&self) -> Result<Option<ClassLabels>> {
        match (
            &self.model.positive_class_label,
            &self.model.negative_class_label,
        ) {
            (Some(positive), Some(negative)) => {
                if positive.is_empty() || negative.is_empty() {
                    return Err(RunnerError::config("Class labels cannot be empty"));
                }
                if positive == negative {
                    return Err(RunnerError::config("Class labels must differ"));
                }
                Ok(Some(ClassLabels {
                    positive: positive.clone(),
                    negative: negative.clone(),
                }))
            }
            (None, None) => Ok(None),
            _ => Err(RunnerError::config(
                "Both class labels must be provided together",
            )),
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Mount prefix normalized to either empty or `/prefix` form
    pub fn url_prefix(&self) -> String {
        let trimmed = self.server.url_prefix.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}
