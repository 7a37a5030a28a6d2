use std::path::Path;
use std::sync::Arc;

use dimse::{AssociationMode, PresentationContext, RemoteNode, StoreScu, StoreSession};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use super::{BatchError, ErrorCategory};
use crate::config::Config;
use crate::dataset::{DatasetBuilder, StudyContext};
use crate::storage::{sanitize_file_name, Artifact, StorageBackend};

/// One uploaded image, in the order the caller presented it
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Success,
    Failure,
}

/// Outcome of one file of a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchLogEntry {
    pub file: String,
    pub instance_number: u32,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sop_instance_uid: Option<String>,
    pub message: String,
}

/// Why a batch stopped
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    /// Offending file, absent when the batch was rejected up front
    pub file: Option<String>,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// Structured result of [`TransmissionCoordinator::process_batch`]
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub request_id: String,
    pub study_uid: Option<String>,
    pub logs: Vec<BatchLogEntry>,
    pub failure: Option<BatchFailure>,
}

impl BatchResult {
    fn new(request_id: String) -> Self {
        Self {
            request_id,
            study_uid: None,
            logs: Vec::new(),
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    fn fail(&mut self, file: Option<String>, err: &BatchError) {
        self.failure = Some(BatchFailure {
            file,
            category: err.category(),
            message: err.to_string(),
            status_code: err.status_code(),
        });
    }
}

/// Drives a batch of uploads through conversion and storage on the peer.
///
/// Files are handled strictly in order and the first failure ends the batch:
/// files after it are never attempted.
pub struct TransmissionCoordinator {
    builder: DatasetBuilder,
    scu: StoreScu,
    peer: RemoteNode,
    contexts: Vec<PresentationContext>,
    storage: Arc<dyn StorageBackend>,
    mode: AssociationMode,
    retain_failed_artifacts: bool,
}

impl TransmissionCoordinator {
    pub fn new(config: &Config, storage: Arc<dyn StorageBackend>) -> Self {
        Self::with_scu(config, storage, StoreScu::new(config.dimse.clone()))
    }

    /// Build a coordinator around an existing SCU (custom transport)
    pub fn with_scu(config: &Config, storage: Arc<dyn StorageBackend>, scu: StoreScu) -> Self {
        let contexts = vec![PresentationContext::new(
            config.dataset.sop_class_uid.clone(),
            config.dimse.transfer_syntaxes.clone(),
        )];
        Self {
            builder: DatasetBuilder::new(config.dataset.clone()),
            mode: config.dimse.association_mode,
            scu,
            peer: config.peer.clone(),
            contexts,
            storage,
            retain_failed_artifacts: config.storage.retain_failed_artifacts,
        }
    }

    /// Convert and store every file of one upload.
    ///
    /// Blocking: run it on a blocking worker.
    pub fn process_batch(
        &self,
        files: Vec<UploadedFile>,
        patient_name: &str,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("batch", request_id = %request_id);
        let _enter = span.enter();

        let mut result = BatchResult::new(request_id.clone());
        let patient_name = patient_name.trim();
        if files.is_empty() || patient_name.is_empty() {
            warn!("Rejecting batch: files or patient name missing");
            result.fail(
                None,
                &BatchError::Input("files or patient name not provided".to_string()),
            );
            return result;
        }

        let workdir = match self.storage.request_workdir(&request_id) {
            Ok(dir) => dir,
            Err(e) => {
                error!("Failed to create working directory: {}", e);
                result.fail(None, &BatchError::Storage(e));
                return result;
            }
        };

        let context = self.builder.begin_study(patient_name);
        result.study_uid = Some(context.study_uid.clone());
        info!(
            "Processing {} file(s) into study {} for peer {}",
            files.len(),
            context.study_uid,
            self.peer
        );

        let mut session: Option<StoreSession> = None;
        for (index, file) in files.iter().enumerate() {
            let instance_number = index as u32 + 1;
            let name = sanitize_file_name(&file.name);
            let mut artifacts = Vec::new();

            match self.process_file(
                file,
                &name,
                instance_number,
                &context,
                workdir.path(),
                &mut session,
                &mut artifacts,
                cancel,
            ) {
                Ok(sop_instance_uid) => {
                    info!(file = %name, "Stored instance {}", sop_instance_uid);
                    result.logs.push(BatchLogEntry {
                        file: name,
                        instance_number,
                        status: EntryStatus::Success,
                        sop_instance_uid: Some(sop_instance_uid),
                        message: "converted and stored".to_string(),
                    });
                }
                Err(err) => {
                    error!(file = %name, category = %err.category(), "Batch aborted: {}", err);
                    result.logs.push(BatchLogEntry {
                        file: name.clone(),
                        instance_number,
                        status: EntryStatus::Failure,
                        sop_instance_uid: None,
                        message: err.to_string(),
                    });
                    result.fail(Some(name), &err);

                    if let Some(session) = session.take() {
                        session.close();
                    }
                    if self.retain_failed_artifacts {
                        for artifact in artifacts {
                            artifact.keep();
                        }
                        let kept = workdir.keep();
                        warn!("Retained artifacts of failed batch in {}", kept.display());
                    }
                    return result;
                }
            }
        }

        if let Some(session) = session.take() {
            session.close();
        }
        info!("All {} file(s) stored", result.logs.len());
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn process_file(
        &self,
        file: &UploadedFile,
        name: &str,
        instance_number: u32,
        context: &StudyContext,
        workdir: &Path,
        session: &mut Option<StoreSession>,
        artifacts: &mut Vec<Artifact>,
        cancel: &CancellationToken,
    ) -> Result<String, BatchError> {
        if cancel.is_cancelled() {
            return Err(BatchError::Cancelled);
        }

        let source_name = format!("{:04}.src", instance_number);
        artifacts.push(
            self.storage
                .write_artifact(workdir, &source_name, &file.bytes)?,
        );

        let object = self.builder.build(&file.bytes, context, instance_number)?;
        if object.lossy_conversion {
            warn!(file = %name, "Source image was converted to RGB");
        }

        let object_name = format!("{:04}.dcm", instance_number);
        let path = self.builder.persist(&object, workdir, &object_name)?;
        artifacts.push(Artifact::adopt(path));

        let mut active = match (self.mode, session.take()) {
            (AssociationMode::PerBatch, Some(open)) => open,
            (_, previous) => {
                if let Some(previous) = previous {
                    previous.close();
                }
                self.scu
                    .open(&self.peer, &self.contexts, cancel)
                    .established()
                    .map_err(BatchError::from_open)?
            }
        };

        let outcome = active.send(&object.object, cancel);
        match self.mode {
            AssociationMode::PerBatch => *session = Some(active),
            AssociationMode::PerObject => {
                active.close();
            }
        }
        outcome.map_err(BatchError::from_send)?;

        Ok(object.sop_instance_uid)
    }
}
