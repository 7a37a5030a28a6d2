use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::tags;
use dicom_object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use tracing::debug;

use super::{DatasetConfig, DatasetError, ImageRecord, StudyContext};
use crate::uid::UidAllocator;

/// Transfer syntax of every produced object
pub use dimse::IMPLICIT_VR_LITTLE_ENDIAN;

const MAX_PN_COMPONENT_GROUP: usize = 64;

/// One fully formed object, ready to be persisted or sent
#[derive(Debug, Clone)]
pub struct TransmittableObject {
    pub sop_instance_uid: String,
    pub instance_number: u32,
    pub rows: u16,
    pub columns: u16,
    pub lossy_conversion: bool,
    pub object: FileDicomObject<InMemDicomObject>,
}

/// Builds DICOM objects from raster images
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    config: DatasetConfig,
    uids: UidAllocator,
}

impl DatasetBuilder {
    pub fn new(config: DatasetConfig) -> Self {
        let uids = UidAllocator::new(config.uid_root.clone());
        Self { config, uids }
    }

    /// Open a new study for `patient_name`, stamped with the current time
    pub fn begin_study(&self, patient_name: &str) -> StudyContext {
        StudyContext::new(&self.uids, patient_name, Local::now())
    }

    /// Decode `image_bytes` and build the object at position
    /// `instance_number` (1-based) of the study.
    pub fn build(
        &self,
        image_bytes: &[u8],
        context: &StudyContext,
        instance_number: u32,
    ) -> Result<TransmittableObject, DatasetError> {
        validate_patient_name(&context.patient_name)?;

        let record = ImageRecord::decode(image_bytes)?;
        let sop_instance_uid = self.uids.next();
        let (rows, columns, samples) = (record.rows, record.columns, record.samples_per_pixel);
        let lossy_conversion = record.lossy_conversion;

        let mut obj = InMemDicomObject::new_empty();
        let mut put_str = |tag, vr, value: &str| {
            obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
        };
        put_str(tags::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 192");
        put_str(tags::SOP_CLASS_UID, VR::UI, &self.config.sop_class_uid);
        put_str(tags::SOP_INSTANCE_UID, VR::UI, &sop_instance_uid);
        put_str(tags::STUDY_DATE, VR::DA, &context.study_date);
        put_str(tags::STUDY_TIME, VR::TM, &context.study_time);
        put_str(tags::MODALITY, VR::CS, &self.config.modality);
        put_str(tags::STUDY_DESCRIPTION, VR::LO, &self.config.study_description);
        put_str(tags::SERIES_DESCRIPTION, VR::LO, &self.config.series_description);
        put_str(tags::PATIENT_NAME, VR::PN, &context.patient_name);
        put_str(tags::PATIENT_ID, VR::LO, &context.patient_id);
        put_str(tags::STUDY_INSTANCE_UID, VR::UI, &context.study_uid);
        put_str(tags::SERIES_INSTANCE_UID, VR::UI, &context.series_uid);
        put_str(tags::SERIES_NUMBER, VR::IS, "1");
        put_str(tags::INSTANCE_NUMBER, VR::IS, &instance_number.to_string());
        put_str(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "RGB");

        let mut put_us = |tag, value: u16| {
            obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
        };
        put_us(tags::SAMPLES_PER_PIXEL, samples);
        put_us(tags::PLANAR_CONFIGURATION, 0);
        put_us(tags::ROWS, rows);
        put_us(tags::COLUMNS, columns);
        put_us(tags::BITS_ALLOCATED, 8);
        put_us(tags::BITS_STORED, 8);
        put_us(tags::HIGH_BIT, 7);
        put_us(tags::PIXEL_REPRESENTATION, 0);

        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PrimitiveValue::from(record.into_padded_pixels()),
        ));

        let object = obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .media_storage_sop_class_uid(self.config.sop_class_uid.as_str())
                    .media_storage_sop_instance_uid(sop_instance_uid.as_str())
                    .transfer_syntax(IMPLICIT_VR_LITTLE_ENDIAN)
                    .implementation_class_uid(self.config.implementation_class_uid.as_str()),
            )
            .map_err(|e| DatasetError::Encode(e.to_string()))?;

        debug!(
            "Built instance {} ({}x{}, #{})",
            sop_instance_uid, columns, rows, instance_number
        );

        Ok(TransmittableObject {
            sop_instance_uid,
            instance_number,
            rows,
            columns,
            lossy_conversion,
            object,
        })
    }

    /// Write `object` as a Part-10 file named `name` inside `dir`.
    ///
    /// Fails if the file already exists.
    pub fn persist(
        &self,
        object: &TransmittableObject,
        dir: &Path,
        name: &str,
    ) -> Result<PathBuf, DatasetError> {
        let path = dir.join(name);
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        object
            .object
            .write_all(&mut writer)
            .map_err(|e| DatasetError::Encode(e.to_string()))?;
        writer.flush()?;
        Ok(path)
    }
}

fn validate_patient_name(name: &str) -> Result<(), DatasetError> {
    if name.contains('\\') || name.chars().any(|c| c.is_control()) {
        return Err(DatasetError::Encode(
            "patient name contains forbidden characters".to_string(),
        ));
    }
    if name
        .split('=')
        .any(|group| group.chars().count() > MAX_PN_COMPONENT_GROUP)
    {
        return Err(DatasetError::Encode(format!(
            "patient name component group exceeds {} characters",
            MAX_PN_COMPONENT_GROUP
        )));
    }
    Ok(())
}
