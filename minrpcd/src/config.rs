//! # Daemon Configuration
//!
//! Settings come from an optional JSON file and are then overridden by
//! command-line flags. Every field has a default, so a partial file is fine.

use log::LevelFilter;
use minrpc_server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Daemon error types
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Logger error: {0}")]
    Logger(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where sessions come from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TransportMode {
    /// One session over stdin and stdout
    #[default]
    Stdio,
    /// One session per accepted TCP connection
    Tcp { addr: String },
}

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub transport: TransportMode,
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`
    pub log_level: String,
    /// Serve a single TCP connection, then exit
    pub once: bool,
    /// Settings applied to every session
    pub server: ServerConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::default(),
            log_level: "info".to_string(),
            once: false,
            server: ServerConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Parses a JSON document
    pub fn from_json(text: &str) -> Result<Self, DaemonError> {
        serde_json::from_str(text).map_err(|e| DaemonError::Config(e.to_string()))
    }

    /// Loads a JSON config file
    pub fn load(path: &Path) -> Result<Self, DaemonError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// The configured log level
    pub fn level_filter(&self) -> Result<LevelFilter, DaemonError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| DaemonError::InvalidLogLevel(self.log_level.clone()))
    }
}
