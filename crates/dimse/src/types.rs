//! Common types for DIMSE operations

use serde::{Deserialize, Serialize};

/// A presentation context proposed by this node during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationContext {
    /// Abstract syntax (SOP Class UID)
    pub abstract_syntax: String,

    /// Transfer syntaxes offered for this abstract syntax, in order of preference
    pub transfer_syntaxes: Vec<String>,
}

/// A presentation context accepted by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedContext {
    /// Presentation context identifier (odd number)
    pub id: u8,

    /// Transfer syntax selected by the acceptor
    pub transfer_syntax: String,
}

/// Lifecycle of a storage association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationState {
    Idle,
    Requesting,
    Established,
    Releasing,
    Failed,
    Closed,
}

/// DIMSE operation status, classified from the raw status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimseStatus {
    /// Operation completed successfully
    Success,
    /// Operation is pending (more responses to follow)
    Pending(u16),
    /// Operation cancelled
    Cancel,
    /// Warning occurred during operation
    Warning(u16),
    /// Operation failed with error
    Failure(u16),
}

impl PresentationContext {
    pub fn new(abstract_syntax: impl Into<String>, transfer_syntaxes: Vec<String>) -> Self {
        Self {
            abstract_syntax: abstract_syntax.into(),
            transfer_syntaxes,
        }
    }
}

impl DimseStatus {
    /// Classify a raw status code as defined in PS3.7 Annex C
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0000 => DimseStatus::Success,
            0x0001 | 0x0107 | 0x0116 | 0xB000..=0xBFFF => DimseStatus::Warning(code),
            0xFF00 | 0xFF01 => DimseStatus::Pending(code),
            0xFE00 => DimseStatus::Cancel,
            _ => DimseStatus::Failure(code),
        }
    }

    /// The raw status code
    pub fn code(&self) -> u16 {
        match self {
            DimseStatus::Success => 0x0000,
            DimseStatus::Cancel => 0xFE00,
            DimseStatus::Pending(code) | DimseStatus::Warning(code) | DimseStatus::Failure(code) => {
                *code
            }
        }
    }

    /// Only the zero status is a successful store; warnings count as failures.
    pub fn is_success(&self) -> bool {
        matches!(self, DimseStatus::Success)
    }
}

impl std::fmt::Display for AssociationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssociationState::Idle => "idle",
            AssociationState::Requesting => "requesting",
            AssociationState::Established => "established",
            AssociationState::Releasing => "releasing",
            AssociationState::Failed => "failed",
            AssociationState::Closed => "closed",
        };
        f.write_str(name)
    }
}
