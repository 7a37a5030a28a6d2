//! DIMSE (DICOM Message Service Element) storage client
//!
//! This crate provides the Service Class User side of the DICOM storage
//! service: association negotiation with a remote archive, the C-STORE
//! request/response exchange and the release/abort teardown.
//!
//! # Features
//! - Association lifecycle with guaranteed close (release or abort)
//! - C-STORE of in-memory DICOM objects in the negotiated transfer syntax
//! - Optional bounded retry with exponential backoff when opening
//! - Pluggable transport through the [`Connector`] / [`AssociationLink`] traits

pub mod association;
pub mod config;
pub mod error;
pub mod scu;
pub mod types;

// Re-export commonly used types
pub use association::{AssociationLink, Connector, UlConnector};
pub use config::{AssociationMode, DimseConfig, RemoteNode, RetryPolicy};
pub use error::{DimseError, Result};
pub use scu::{CloseKind, StoreScu, StoreSession};
pub use types::{AssociationState, DimseStatus, NegotiatedContext, PresentationContext};

/// Default DICOM port (non-TLS)
pub const DEFAULT_DIMSE_PORT: u16 = 11112;

/// Implicit VR Little Endian transfer syntax UID
pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
