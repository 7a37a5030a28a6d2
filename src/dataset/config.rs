use serde::Deserialize;

use crate::uid::{is_valid_uid, DEFAULT_UID_ROOT};

/// Secondary Capture Image Storage
pub const SECONDARY_CAPTURE_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.7";

/// CT Image Storage
pub const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";

/// VL Endoscopic Image Storage
pub const VL_ENDOSCOPIC_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.77.1.1";

/// Object class and descriptive fields stamped on every produced object
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    #[serde(default = "default_uid_root")]
    pub uid_root: String,

    #[serde(default = "default_sop_class_uid")]
    pub sop_class_uid: String,

    #[serde(default = "default_modality")]
    pub modality: String,

    #[serde(default = "default_description")]
    pub study_description: String,

    #[serde(default = "default_description")]
    pub series_description: String,

    #[serde(default = "default_implementation_class_uid")]
    pub implementation_class_uid: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            uid_root: default_uid_root(),
            sop_class_uid: default_sop_class_uid(),
            modality: default_modality(),
            study_description: default_description(),
            series_description: default_description(),
            implementation_class_uid: default_implementation_class_uid(),
        }
    }
}

impl DatasetConfig {
    /// Checks UID syntax and that the object class agrees with the modality.
    pub fn validate(&self) -> Result<(), String> {
        // room for "." plus a 20 digit suffix
        if !is_valid_uid(&self.uid_root) || self.uid_root.len() > 43 {
            return Err(format!("invalid uid_root '{}'", self.uid_root));
        }
        if !is_valid_uid(&self.sop_class_uid) {
            return Err(format!("invalid sop_class_uid '{}'", self.sop_class_uid));
        }
        if !is_valid_uid(&self.implementation_class_uid) {
            return Err(format!(
                "invalid implementation_class_uid '{}'",
                self.implementation_class_uid
            ));
        }

        let modality = self.modality.as_str();
        if modality.is_empty()
            || modality.len() > 16
            || !modality.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(format!("invalid modality '{}'", self.modality));
        }

        if let Some(expected) = required_modality(&self.sop_class_uid) {
            if modality != expected {
                return Err(format!(
                    "sop_class_uid {} requires modality {}, got {}",
                    self.sop_class_uid, expected, modality
                ));
            }
        }
        Ok(())
    }
}

/// Modality mandated by a modality-specific storage class.
///
/// Secondary Capture accepts any modality and yields `None`.
pub fn required_modality(sop_class_uid: &str) -> Option<&'static str> {
    match sop_class_uid {
        CT_IMAGE_STORAGE => Some("CT"),
        VL_ENDOSCOPIC_IMAGE_STORAGE => Some("ES"),
        _ => None,
    }
}

fn default_uid_root() -> String {
    DEFAULT_UID_ROOT.to_string()
}

fn default_sop_class_uid() -> String {
    SECONDARY_CAPTURE_IMAGE_STORAGE.to_string()
}

fn default_modality() -> String {
    "OT".to_string()
}

fn default_description() -> String {
    "ENDOSCOPIA".to_string()
}

fn default_implementation_class_uid() -> String {
    "1.2.276.0.7230010.3.0.3.6.7".to_string()
}
