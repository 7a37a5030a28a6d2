pub mod coordinator;
pub mod error;


// Re-exports for convenience
pub use coordinator::{
    BatchFailure, BatchLogEntry, BatchResult, EntryStatus, TransmissionCoordinator, UploadedFile,
};
pub use error::{BatchError, ErrorCategory};
