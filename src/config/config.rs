use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use clap::Parser;
use dimse::{DimseConfig, RemoteNode};
use serde::Deserialize;
use thiserror::Error;

use crate::config::http_config::HttpConfig;
use crate::config::logging_config::LoggingConfig;
use crate::config::service_config::ServiceConfig;
use crate::config::Cli;
use crate::dataset::DatasetConfig;
use crate::storage::StorageConfig;

/// Complete service configuration, loaded once at startup and shared
/// read-only afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dimse: DimseConfig,
    pub peer: RemoteNode,
    #[serde(default)]
    pub dataset: DatasetConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Service id must not be empty")]
    InvalidServiceId,

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Invalid HTTP configuration: {0}")]
    InvalidHttp(String),

    #[error("Invalid storage configuration: {0}")]
    InvalidStorage(String),

    #[error("Invalid DIMSE configuration: {0}")]
    InvalidDimse(String),

    #[error("Invalid peer '{0}': {1}")]
    InvalidPeer(String, String),

    #[error("Invalid dataset configuration: {0}")]
    InvalidDataset(String),
}

impl Config {
    /// Load the file named by `--config` on the command line
    pub fn from_args() -> Result<Self, ConfigError> {
        let cli = Cli::parse();
        Self::load_from_path(&cli.config)
    }

    /// Read, parse and validate a TOML configuration file
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.id.trim().is_empty() {
            return Err(ConfigError::InvalidServiceId);
        }

        if self.logging.log_to_file && self.logging.log_file_path.trim().is_empty() {
            return Err(ConfigError::InvalidLogging(
                "log_file_path is required when log_to_file is enabled".to_string(),
            ));
        }

        self.bind_addr()?;
        if self.http.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidHttp(
                "max_upload_bytes must be greater than 0".to_string(),
            ));
        }

        if self.storage.backend != "filesystem" {
            return Err(ConfigError::InvalidStorage(format!(
                "unknown backend '{}'",
                self.storage.backend
            )));
        }
        if self.storage.path.trim().is_empty() {
            return Err(ConfigError::InvalidStorage("path must not be empty".to_string()));
        }

        self.dimse
            .validate()
            .map_err(|e| ConfigError::InvalidDimse(e.to_string()))?;
        self.peer
            .validate()
            .map_err(|e| ConfigError::InvalidPeer(self.peer.to_string(), e.to_string()))?;
        self.dataset.validate().map_err(ConfigError::InvalidDataset)?;

        Ok(())
    }

    /// Socket address the HTTP adapter listens on
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.http.bind_address.parse().map_err(|_| {
            ConfigError::InvalidHttp(format!(
                "bind_address '{}' is not an IP address",
                self.http.bind_address
            ))
        })?;
        Ok(SocketAddr::new(ip, self.http.bind_port))
    }
}
