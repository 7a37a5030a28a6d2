//! Transport seam for storage associations
//!
//! [`Connector`] opens an association with a remote node and hands back an
//! [`AssociationLink`], which frames one command + dataset exchange at a time
//! and knows how to release or abort itself. [`UlConnector`] is the
//! production implementation on top of the DICOM upper layer protocol.

use std::io::Write;
use std::net::TcpStream;

use dicom_ul::pdu::{PDataValue, PDataValueType};
use dicom_ul::{ClientAssociation, ClientAssociationOptions, Pdu};
use tracing::{debug, warn};

use crate::config::{DimseConfig, RemoteNode};
use crate::types::{NegotiatedContext, PresentationContext};
use crate::{DimseError, Result};

/// An established association able to carry DIMSE exchanges
pub trait AssociationLink: Send {
    /// Presentation contexts accepted by the peer
    fn accepted_contexts(&self) -> &[NegotiatedContext];

    /// Send one command set (and its data set) on presentation context
    /// `pc_id` and return the encoded response command set.
    fn exchange(&mut self, pc_id: u8, command: &[u8], dataset: &[u8]) -> Result<Vec<u8>>;

    /// Graceful A-RELEASE
    fn release(&mut self) -> Result<()>;

    /// A-ABORT, tearing down the transport
    fn abort(&mut self) -> Result<()>;
}

/// Opens associations with remote nodes
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        config: &DimseConfig,
        node: &RemoteNode,
        contexts: &[PresentationContext],
    ) -> Result<Box<dyn AssociationLink>>;
}

/// Connector backed by the DICOM upper layer implementation of `dicom-ul`
#[derive(Debug, Clone, Copy, Default)]
pub struct UlConnector;

/// Link over a `dicom-ul` client association
pub struct UlLink {
    association: Option<ClientAssociation<TcpStream>>,
    contexts: Vec<NegotiatedContext>,
}

impl Connector for UlConnector {
    fn connect(
        &self,
        config: &DimseConfig,
        node: &RemoteNode,
        contexts: &[PresentationContext],
    ) -> Result<Box<dyn AssociationLink>> {
        let connect_timeout = node
            .connect_timeout_ms
            .map(std::time::Duration::from_millis)
            .unwrap_or_else(|| config.connect_timeout());

        let mut options = ClientAssociationOptions::new()
            .calling_ae_title(config.local_aet.as_str())
            .called_ae_title(node.ae_title.as_str())
            .max_pdu_length(config.max_pdu)
            .connection_timeout(connect_timeout)
            .read_timeout(config.read_timeout())
            .write_timeout(config.read_timeout());

        for pc in contexts {
            options = options.with_presentation_context(
                pc.abstract_syntax.as_str(),
                pc.transfer_syntaxes.iter().map(String::as_str).collect(),
            );
        }

        let association = options
            .establish_with(&node.socket_addr())
            .map_err(|e| classify_establish_error(&e.to_string()))?;

        let contexts: Vec<NegotiatedContext> = association
            .presentation_contexts()
            .iter()
            .map(|pc| NegotiatedContext {
                id: pc.id,
                transfer_syntax: pc.transfer_syntax.trim_end_matches('\0').to_string(),
            })
            .collect();

        debug!(
            "Association established with {} (acceptor max PDU {}, contexts {:?})",
            node,
            association.acceptor_max_pdu_length(),
            contexts
        );

        Ok(Box::new(UlLink {
            association: Some(association),
            contexts,
        }))
    }
}

impl AssociationLink for UlLink {
    fn accepted_contexts(&self) -> &[NegotiatedContext] {
        &self.contexts
    }

    fn exchange(&mut self, pc_id: u8, command: &[u8], dataset: &[u8]) -> Result<Vec<u8>> {
        let association = self
            .association
            .as_mut()
            .ok_or_else(|| DimseError::ul("association already closed"))?;

        let nbytes = command.len() + dataset.len();
        if nbytes < association.acceptor_max_pdu_length().saturating_sub(100) as usize {
            let pdu = Pdu::PData {
                data: vec![
                    PDataValue {
                        presentation_context_id: pc_id,
                        value_type: PDataValueType::Command,
                        is_last: true,
                        data: command.to_vec(),
                    },
                    PDataValue {
                        presentation_context_id: pc_id,
                        value_type: PDataValueType::Data,
                        is_last: true,
                        data: dataset.to_vec(),
                    },
                ],
            };
            association
                .send(&pdu)
                .map_err(|e| DimseError::ul(format!("failed to send C-STORE-RQ: {}", e)))?;
        } else {
            let pdu = Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: pc_id,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data: command.to_vec(),
                }],
            };
            association
                .send(&pdu)
                .map_err(|e| DimseError::ul(format!("failed to send C-STORE-RQ command: {}", e)))?;

            // the writer fragments by the acceptor's max PDU
            let mut pdata = association.send_pdata(pc_id);
            pdata.write_all(dataset)?;
            pdata.finish()?;
        }

        let mut response = Vec::new();
        loop {
            let pdu = association
                .receive()
                .map_err(|e| DimseError::ul(format!("failed to receive C-STORE-RSP: {}", e)))?;
            match pdu {
                Pdu::PData { data } => {
                    for value in data {
                        if value.value_type != PDataValueType::Command {
                            continue;
                        }
                        response.extend_from_slice(&value.data);
                        if value.is_last {
                            return Ok(response);
                        }
                    }
                }
                Pdu::AbortRQ { .. } => {
                    return Err(DimseError::UnexpectedResponse(
                        "peer aborted the association".to_string(),
                    ));
                }
                other => {
                    return Err(DimseError::UnexpectedResponse(format!("{:?}", other)));
                }
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        match self.association.take() {
            Some(association) => association
                .release()
                .map_err(|e| DimseError::ul(format!("release failed: {}", e))),
            None => Ok(()),
        }
    }

    fn abort(&mut self) -> Result<()> {
        match self.association.take() {
            Some(association) => association
                .abort()
                .map_err(|e| DimseError::ul(format!("abort failed: {}", e))),
            None => Ok(()),
        }
    }
}

impl Drop for UlLink {
    fn drop(&mut self) {
        if self.association.is_some() {
            warn!("Association link dropped while still open, aborting");
            let _ = self.abort();
        }
    }
}

/// Map an association establishment failure onto the error taxonomy
fn classify_establish_error(message: &str) -> DimseError {
    let msg_lower = message.to_lowercase();
    if msg_lower.contains("reject") {
        DimseError::AssociationRejected(message.to_string())
    } else if msg_lower.contains("no presentation contexts accepted") {
        DimseError::NoAcceptedContext(message.to_string())
    } else if msg_lower.contains("timed out") || msg_lower.contains("timeout") {
        DimseError::Timeout(message.to_string())
    } else if msg_lower.contains("connect") {
        DimseError::Network(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            message.to_string(),
        ))
    } else {
        DimseError::ul(message)
    }
}
