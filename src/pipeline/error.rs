use dimse::DimseError;
use serde::Serialize;
use thiserror::Error;

use crate::dataset::DatasetError;
use crate::storage::StorageError;

/// Stable failure categories reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    ConfigError,
    InputError,
    DecodeError,
    EncodeError,
    AssociationError,
    TransmissionError,
    IoError,
    Cancelled,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::ConfigError => "ConfigError",
            ErrorCategory::InputError => "InputError",
            ErrorCategory::DecodeError => "DecodeError",
            ErrorCategory::EncodeError => "EncodeError",
            ErrorCategory::AssociationError => "AssociationError",
            ErrorCategory::TransmissionError => "TransmissionError",
            ErrorCategory::IoError => "IoError",
            ErrorCategory::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Error raised while processing a batch
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("Association failed: {0}")]
    Association(DimseError),

    #[error("Transmission failed: {0}")]
    Transmission(DimseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Batch cancelled")]
    Cancelled,
}

impl BatchError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BatchError::Input(_) => ErrorCategory::InputError,
            BatchError::Dataset(DatasetError::Decode(_)) => ErrorCategory::DecodeError,
            BatchError::Dataset(DatasetError::Encode(_)) => ErrorCategory::EncodeError,
            BatchError::Dataset(DatasetError::Io(_)) | BatchError::Storage(_) => {
                ErrorCategory::IoError
            }
            BatchError::Association(_) => ErrorCategory::AssociationError,
            BatchError::Transmission(_) => ErrorCategory::TransmissionError,
            BatchError::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Raw peer status code of a rejected store
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BatchError::Transmission(e) => e.status_code(),
            _ => None,
        }
    }

    /// Classify a failure to open the association
    pub fn from_open(err: DimseError) -> Self {
        match err {
            DimseError::Cancelled => BatchError::Cancelled,
            other => BatchError::Association(other),
        }
    }

    /// Classify a failure of the store exchange
    pub fn from_send(err: DimseError) -> Self {
        match err {
            DimseError::Cancelled => BatchError::Cancelled,
            DimseError::StoreStatus { .. } => BatchError::Transmission(err),
            DimseError::DicomObject(msg) => BatchError::Dataset(DatasetError::Encode(msg)),
            other => BatchError::Association(other),
        }
    }
}
