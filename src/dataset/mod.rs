//! Conversion of raster images into DICOM objects
//!
//! A [`StudyContext`] is allocated once per batch and shared by every object
//! built from that batch, so all of them land in the same study and series.

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::uid::UidAllocator;

pub mod builder;
mod config;
pub mod raster;


pub use builder::{DatasetBuilder, TransmittableObject, IMPLICIT_VR_LITTLE_ENDIAN};
pub use config::{
    required_modality, DatasetConfig, CT_IMAGE_STORAGE, SECONDARY_CAPTURE_IMAGE_STORAGE,
    VL_ENDOSCOPIC_IMAGE_STORAGE,
};
pub use raster::ImageRecord;

/// Error type for object construction
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode DICOM object: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Patient and study identity shared by all objects of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyContext {
    pub study_uid: String,
    pub series_uid: String,
    pub patient_name: String,
    pub patient_id: String,
    pub study_date: String,
    pub study_time: String,
}

impl StudyContext {
    /// Allocate fresh study and series UIDs, stamping date, time and patient
    /// ID from `now`.
    pub fn new(uids: &UidAllocator, patient_name: &str, now: DateTime<Local>) -> Self {
        Self {
            study_uid: uids.next(),
            series_uid: uids.next(),
            patient_name: patient_name.trim().to_string(),
            patient_id: format!("ID-{}", now.format("%Y%m%d%H%M%S")),
            study_date: now.format("%Y%m%d").to_string(),
            study_time: now.format("%H%M%S").to_string(),
        }
    }
}
