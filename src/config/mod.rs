mod tests;
mod service_config;
mod logging_config;
mod http_config;
pub mod config;

use clap::Parser;
use std::path::PathBuf;

pub use config::{Config, ConfigError};
pub use http_config::HttpConfig;
pub use logging_config::LoggingConfig;
pub use service_config::ServiceConfig;

/// Command line arguments of the service binary.
#[derive(Debug, Parser)]
#[command(
    name = "scopebridge",
    about = "Convert uploaded images to DICOM and store them on a PACS"
)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "scopebridge.toml")]
    pub config: PathBuf,
}
