//! Service Class User (SCU) implementation for outbound C-STORE

use std::sync::Arc;
use std::time::{Duration, Instant};

use dicom_core::{dicom_value, DataElement, VR};
use dicom_dictionary_std::tags;
use dicom_encoding::TransferSyntaxIndex;
use dicom_object::{FileDicomObject, InMemDicomObject, StandardDataDictionary};
use dicom_transfer_syntax_registry::{entries, TransferSyntaxRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::association::{AssociationLink, Connector, UlConnector};
use crate::config::{DimseConfig, RemoteNode};
use crate::types::{AssociationState, DimseStatus, NegotiatedContext, PresentationContext};
use crate::{DimseError, Result};

const C_STORE_RQ: u16 = 0x0001;
const C_STORE_RSP: u16 = 0x8001;
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// DIMSE storage Service Class User
pub struct StoreScu {
    config: DimseConfig,
    connector: Arc<dyn Connector>,
}

/// How a session was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    Released,
    Aborted,
}

/// One association with the archive peer.
///
/// The session is closed exactly once: either explicitly through
/// [`StoreSession::close`] or when it is dropped.
pub struct StoreSession {
    peer: String,
    state: AssociationState,
    link: Option<Box<dyn AssociationLink>>,
    proposed: Vec<PresentationContext>,
    error: Option<DimseError>,
    next_message_id: u16,
    closed: bool,
}

impl StoreScu {
    /// Create a new SCU talking the DICOM upper layer protocol
    pub fn new(config: DimseConfig) -> Self {
        Self::with_connector(config, Arc::new(UlConnector))
    }

    /// Create a new SCU over a custom transport
    pub fn with_connector(config: DimseConfig, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    /// Negotiate an association with `node`, proposing `contexts`.
    ///
    /// Never fails outright: a session that could not be established is
    /// returned in the [`AssociationState::Failed`] state carrying the error.
    pub fn open(
        &self,
        node: &RemoteNode,
        contexts: &[PresentationContext],
        cancel: &CancellationToken,
    ) -> StoreSession {
        let mut session = StoreSession {
            peer: node.to_string(),
            state: AssociationState::Idle,
            link: None,
            proposed: contexts.to_vec(),
            error: None,
            next_message_id: 1,
            closed: false,
        };

        if let Err(e) = node.validate() {
            session.fail(e);
            return session;
        }
        if contexts.is_empty() {
            session.fail(DimseError::config("no presentation context to propose"));
            return session;
        }

        session.state = AssociationState::Requesting;
        let policy = &self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                session.fail(DimseError::Cancelled);
                return session;
            }

            info!("Requesting association with {}", node);
            match self.connector.connect(&self.config, node, contexts) {
                Ok(mut link) => {
                    if link.accepted_contexts().is_empty() {
                        let _ = link.abort();
                        session.fail(DimseError::NoAcceptedContext(node.to_string()));
                        return session;
                    }
                    info!("Association established with {}", node);
                    session.link = Some(link);
                    session.state = AssociationState::Established;
                    return session;
                }
                Err(e) if e.is_recoverable() && attempt < policy.max_retries => {
                    attempt += 1;
                    let delay = policy.backoff(attempt);
                    warn!(
                        "Association with {} failed (attempt {}): {}; retrying in {:?}",
                        node, attempt, e, delay
                    );
                    if !sleep_unless_cancelled(delay, cancel) {
                        session.fail(DimseError::Cancelled);
                        return session;
                    }
                }
                Err(e) => {
                    error!("Association with {} failed: {}", node, e);
                    session.fail(e);
                    return session;
                }
            }
        }
    }
}

impl StoreSession {
    pub fn state(&self) -> AssociationState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == AssociationState::Established
    }

    /// The error that moved this session to `Failed`, if any
    pub fn error(&self) -> Option<&DimseError> {
        self.error.as_ref()
    }

    /// Keep an established session, or close a failed one and return its error.
    pub fn established(mut self) -> Result<StoreSession> {
        if self.is_established() {
            return Ok(self);
        }
        let err = self.error.take().unwrap_or(DimseError::InvalidState {
            expected: AssociationState::Established,
            found: self.state,
        });
        self.close();
        Err(err)
    }

    /// Store one object: one C-STORE-RQ, exactly one C-STORE-RSP.
    ///
    /// Succeeds only on status 0x0000; any other status is returned as
    /// [`DimseError::StoreStatus`] carrying the raw code.
    pub fn send(
        &mut self,
        object: &FileDicomObject<InMemDicomObject>,
        cancel: &CancellationToken,
    ) -> Result<DimseStatus> {
        if self.state != AssociationState::Established {
            return Err(DimseError::InvalidState {
                expected: AssociationState::Established,
                found: self.state,
            });
        }
        if cancel.is_cancelled() {
            return Err(DimseError::Cancelled);
        }

        let sop_class_uid = object.meta().media_storage_sop_class_uid().to_string();
        let sop_instance_uid = object.meta().media_storage_sop_instance_uid().to_string();

        let link = self
            .link
            .as_mut()
            .ok_or_else(|| DimseError::ul("established session without a link"))?;
        let pc = select_context(&self.proposed, link.accepted_contexts(), &sop_class_uid)?;
        let ts = TransferSyntaxRegistry
            .get(&pc.transfer_syntax)
            .ok_or_else(|| {
                DimseError::NoAcceptedContext(format!(
                    "unsupported transfer syntax {}",
                    pc.transfer_syntax
                ))
            })?;

        let message_id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1).max(1);

        let mut cmd_data = Vec::with_capacity(128);
        store_req_command(&sop_class_uid, &sop_instance_uid, message_id)
            .write_dataset_with_ts(&mut cmd_data, &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased())
            .map_err(|e| DimseError::object(format!("could not encode command: {}", e)))?;

        let mut object_data = Vec::with_capacity(2048);
        object
            .write_dataset_with_ts(&mut object_data, ts)
            .map_err(|e| DimseError::object(format!("could not encode dataset: {}", e)))?;

        debug!(
            "Sending instance {} (~ {} kB), sop={}, ts={}, pc={}, message_id={}",
            sop_instance_uid,
            (cmd_data.len() + object_data.len()) / 1_000,
            sop_class_uid,
            pc.transfer_syntax,
            pc.id,
            message_id
        );

        let response = match link.exchange(pc.id, &cmd_data, &object_data) {
            Ok(response) => response,
            Err(e) => {
                // the association cannot be trusted after a broken exchange
                self.state = AssociationState::Failed;
                return Err(e);
            }
        };

        let status = read_store_status(&response, message_id)?;
        match status {
            DimseStatus::Success => {
                info!("Successfully stored instance {}", sop_instance_uid);
                Ok(status)
            }
            DimseStatus::Warning(code) | DimseStatus::Pending(code) => {
                warn!(
                    "Possible issue storing instance `{}` (status code {:04X}H)",
                    sop_instance_uid, code
                );
                Err(DimseError::StoreStatus { code })
            }
            DimseStatus::Cancel | DimseStatus::Failure(_) => {
                error!(
                    "Failed to store instance `{}` (status code {:04X}H)",
                    sop_instance_uid,
                    status.code()
                );
                Err(DimseError::StoreStatus {
                    code: status.code(),
                })
            }
        }
    }

    /// Release an established association, abort anything else.
    pub fn close(mut self) -> CloseKind {
        self.close_inner()
    }

    fn close_inner(&mut self) -> CloseKind {
        self.closed = true;
        let kind = match (self.state, self.link.take()) {
            (AssociationState::Established, Some(mut link)) => {
                self.state = AssociationState::Releasing;
                match link.release() {
                    Ok(()) => {
                        debug!("Association with {} released", self.peer);
                        CloseKind::Released
                    }
                    Err(e) => {
                        warn!("Release of association with {} failed: {}", self.peer, e);
                        CloseKind::Aborted
                    }
                }
            }
            (_, Some(mut link)) => {
                if let Err(e) = link.abort() {
                    warn!("Abort of association with {} failed: {}", self.peer, e);
                }
                CloseKind::Aborted
            }
            (_, None) => CloseKind::Aborted,
        };
        self.state = AssociationState::Closed;
        kind
    }

    fn fail(&mut self, error: DimseError) {
        self.state = AssociationState::Failed;
        self.error = Some(error);
    }
}

impl Drop for StoreSession {
    fn drop(&mut self) {
        if !self.closed {
            self.close_inner();
        }
    }
}

/// Presentation context IDs are assigned 1, 3, 5, ... in proposal order.
fn select_context(
    proposed: &[PresentationContext],
    accepted: &[NegotiatedContext],
    sop_class_uid: &str,
) -> Result<NegotiatedContext> {
    accepted
        .iter()
        .find(|pc| {
            let index = (pc.id as usize).saturating_sub(1) / 2;
            proposed
                .get(index)
                .map(|p| p.abstract_syntax == sop_class_uid)
                .unwrap_or(false)
        })
        .cloned()
        .ok_or_else(|| DimseError::NoAcceptedContext(sop_class_uid.to_string()))
}

fn store_req_command(
    storage_sop_class_uid: &str,
    storage_sop_instance_uid: &str,
    message_id: u16,
) -> InMemDicomObject<StandardDataDictionary> {
    InMemDicomObject::command_from_element_iter([
        DataElement::new(
            tags::AFFECTED_SOP_CLASS_UID,
            VR::UI,
            dicom_value!(Str, storage_sop_class_uid),
        ),
        DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [C_STORE_RQ])),
        DataElement::new(tags::MESSAGE_ID, VR::US, dicom_value!(U16, [message_id])),
        // medium priority
        DataElement::new(tags::PRIORITY, VR::US, dicom_value!(U16, [0x0000])),
        // a data set follows
        DataElement::new(
            tags::COMMAND_DATA_SET_TYPE,
            VR::US,
            dicom_value!(U16, [0x0000]),
        ),
        DataElement::new(
            tags::AFFECTED_SOP_INSTANCE_UID,
            VR::UI,
            dicom_value!(Str, storage_sop_instance_uid),
        ),
    ])
}

fn read_store_status(response: &[u8], message_id: u16) -> Result<DimseStatus> {
    let cmd_obj = InMemDicomObject::read_dataset_with_ts(
        response,
        &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased(),
    )
    .map_err(|e| DimseError::UnexpectedResponse(format!("could not read response: {}", e)))?;

    let command_field = cmd_obj
        .element(tags::COMMAND_FIELD)
        .ok()
        .and_then(|e| e.to_int::<u16>().ok());
    if command_field != Some(C_STORE_RSP) {
        return Err(DimseError::UnexpectedResponse(format!(
            "expected C-STORE-RSP, got command field {:?}",
            command_field
        )));
    }

    if let Some(responded_to) = cmd_obj
        .element(tags::MESSAGE_ID_BEING_RESPONDED_TO)
        .ok()
        .and_then(|e| e.to_int::<u16>().ok())
    {
        if responded_to != message_id {
            warn!(
                "Response refers to message {} but message {} was sent",
                responded_to, message_id
            );
        }
    }

    let code = cmd_obj
        .element(tags::STATUS)
        .map_err(|_| DimseError::UnexpectedResponse("status code missing in response".into()))?
        .to_int::<u16>()
        .map_err(|_| DimseError::UnexpectedResponse("status code is not an integer".into()))?;

    Ok(DimseStatus::from_code(code))
}

/// Returns false when cancelled before the delay elapsed
fn sleep_unless_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(CANCEL_POLL.min(deadline - now));
    }
}
