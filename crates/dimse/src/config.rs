//! Configuration types for the storage SCU

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{DEFAULT_DIMSE_PORT, IMPLICIT_VR_LITTLE_ENDIAN};

/// Configuration for outbound DIMSE associations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimseConfig {
    /// Local (calling) Application Entity Title
    #[serde(default = "default_local_aet")]
    pub local_aet: String,

    /// Maximum PDU size in bytes accepted by this node
    #[serde(default = "default_max_pdu")]
    pub max_pdu: u32,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Socket read/write timeout in milliseconds while associated
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Transfer syntaxes proposed for the storage class (in order of preference)
    #[serde(default = "default_transfer_syntaxes")]
    pub transfer_syntaxes: Vec<String>,

    /// Whether one association serves a whole batch or a single object
    #[serde(default)]
    pub association_mode: AssociationMode,

    /// Retry policy applied when opening an association
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Association reuse strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMode {
    /// Single open, multiple sequential sends
    #[default]
    PerBatch,
    /// Fresh association for every object
    PerObject,
}

/// Bounded retry with exponential backoff for association opening
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first one (0 disables retrying)
    #[serde(default)]
    pub max_retries: u32,

    /// Delay before the first retry, doubled on every further retry
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single backoff delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

/// Configuration for the remote DICOM node (the archive peer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Remote (called) Application Entity Title
    pub ae_title: String,

    /// Remote host address
    pub host: String,

    /// Remote port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connection timeout in milliseconds (overrides global setting)
    pub connect_timeout_ms: Option<u64>,
}

impl Default for DimseConfig {
    fn default() -> Self {
        Self {
            local_aet: default_local_aet(),
            max_pdu: default_max_pdu(),
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
            transfer_syntaxes: default_transfer_syntaxes(),
            association_mode: AssociationMode::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl DimseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get read/write timeout as Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_ae_title(&self.local_aet, "Local")?;

        if self.max_pdu < 16384 || self.max_pdu > 131072 {
            return Err(crate::error::DimseError::config(
                "Max PDU size must be between 16384 and 131072 bytes",
            ));
        }

        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(crate::error::DimseError::config(
                "Timeouts must be greater than 0",
            ));
        }

        if self.transfer_syntaxes.is_empty() {
            return Err(crate::error::DimseError::config(
                "At least one transfer syntax must be proposed",
            ));
        }

        Ok(())
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay to wait before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        let delay = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

impl RemoteNode {
    /// Create a new remote node configuration
    pub fn new(ae_title: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            ae_title: ae_title.into(),
            host: host.into(),
            port,
            connect_timeout_ms: None,
        }
    }

    /// Set connection timeout for this node
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = Some(timeout_ms);
        self
    }

    /// `host:port` socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the remote node configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_ae_title(&self.ae_title, "Remote")?;

        if self.host.trim().is_empty() {
            return Err(crate::error::DimseError::config(
                "Remote host cannot be empty",
            ));
        }

        if self.port == 0 {
            return Err(crate::error::DimseError::config(
                "Remote port must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Display for RemoteNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.ae_title, self.host, self.port)
    }
}

fn validate_ae_title(aet: &str, which: &str) -> crate::error::Result<()> {
    if aet.trim().is_empty() || aet.len() > 16 {
        return Err(crate::error::DimseError::config(format!(
            "{} AE title must be 1-16 characters",
            which
        )));
    }
    if aet.contains('\\') || aet.chars().any(|c| c.is_control()) {
        return Err(crate::error::DimseError::config(format!(
            "{} AE title contains forbidden characters",
            which
        )));
    }
    Ok(())
}

// Default value functions
fn default_local_aet() -> String {
    "SCOPEBRIDGE".to_string()
}

fn default_port() -> u16 {
    DEFAULT_DIMSE_PORT
}

fn default_max_pdu() -> u32 {
    16384
}

fn default_connect_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_read_timeout() -> u64 {
    60_000
}

fn default_transfer_syntaxes() -> Vec<String> {
    vec![IMPLICIT_VR_LITTLE_ENDIAN.to_string()]
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    8_000
}
