//! Error types for DIMSE operations

use thiserror::Error;

use crate::types::AssociationState;

/// Result type alias for DIMSE operations
pub type Result<T> = std::result::Result<T, DimseError>;

/// Error types that can occur during DIMSE operations
#[derive(Error, Debug)]
pub enum DimseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("DICOM object error: {0}")]
    DicomObject(String),

    #[error("DICOM UL error: {0}")]
    DicomUl(String),

    #[error("Association rejected: {0}")]
    AssociationRejected(String),

    #[error("No presentation context accepted for {0}")]
    NoAcceptedContext(String),

    #[error("Invalid association state: expected {expected:?}, found {found:?}")]
    InvalidState {
        expected: AssociationState,
        found: AssociationState,
    },

    #[error("C-STORE failed with status {code:#06X}")]
    StoreStatus { code: u16 },

    #[error("Unexpected response from peer: {0}")]
    UnexpectedResponse(String),

    #[error("Timeout occurred: {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl DimseError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new upper layer error
    pub fn ul(msg: impl Into<String>) -> Self {
        Self::DicomUl(msg.into())
    }

    /// Create a new DICOM object error
    pub fn object(msg: impl Into<String>) -> Self {
        Self::DicomObject(msg.into())
    }

    /// Raw DIMSE status code carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DimseError::StoreStatus { code } => Some(*code),
            _ => None,
        }
    }

    /// Check if this error is recoverable by opening a new association
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DimseError::Network(_) | DimseError::Timeout(_))
    }
}
