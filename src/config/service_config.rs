use serde::Deserialize;

/// Identity and verbosity of the running service
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub id: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            id: "scopebridge".to_string(),
            log_level: default_log_level(),
        }
    }
}

/// Default log level, overridden by `RUST_LOG` when set
fn default_log_level() -> String {
    "info".to_string()
}
