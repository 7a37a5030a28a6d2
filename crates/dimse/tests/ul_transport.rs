//! C-STORE over a real upper layer association, against an in-process
//! acceptor built with `dicom-ul`.

use std::net::{SocketAddr, TcpListener};
use std::thread::JoinHandle;

use dicom_core::{dicom_value, DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom_transfer_syntax_registry::entries;
use dicom_ul::association::{Association as _, SyncAssociation as _};
use dicom_ul::pdu::{PDataValue, PDataValueType, Pdu};
use dicom_ul::ServerAssociationOptions;
use dimse::{
    CloseKind, DimseConfig, DimseError, PresentationContext, RemoteNode, StoreScu,
    IMPLICIT_VR_LITTLE_ENDIAN,
};
use tokio_util::sync::CancellationToken;

type TestResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync + 'static>>;

const SCP_AE_TITLE: &str = "STORE-SCP";

/// Accept one association, answer one C-STORE per entry of `statuses`,
/// then handle the release. Returns the data set length of each store.
fn spawn_store_scp(
    statuses: Vec<u16>,
) -> TestResult<(JoinHandle<TestResult<Vec<usize>>>, SocketAddr)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let scp = ServerAssociationOptions::new()
        .accept_any()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(uids::SECONDARY_CAPTURE_IMAGE_STORAGE);

    let handle = std::thread::spawn(move || -> TestResult<Vec<usize>> {
        let (stream, _addr) = listener.accept()?;
        let mut association = scp.establish(stream)?;
        let mut received = Vec::new();

        for status in statuses {
            let mut command = Vec::new();
            let mut dataset = Vec::new();
            let mut command_done = false;
            let mut data_done = false;
            let mut pc_id = 1;

            while !(command_done && data_done) {
                match association.receive()? {
                    Pdu::PData { data } => {
                        for value in data {
                            pc_id = value.presentation_context_id;
                            match value.value_type {
                                PDataValueType::Command => {
                                    command.extend_from_slice(&value.data);
                                    command_done |= value.is_last;
                                }
                                PDataValueType::Data => {
                                    dataset.extend_from_slice(&value.data);
                                    data_done |= value.is_last;
                                }
                            }
                        }
                    }
                    other => return Err(format!("unexpected PDU {:?}", other).into()),
                }
            }

            let request = InMemDicomObject::read_dataset_with_ts(
                command.as_slice(),
                &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased(),
            )?;
            let message_id = request.element(tags::MESSAGE_ID)?.to_int::<u16>()?;

            let response = InMemDicomObject::command_from_element_iter([
                DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [0x8001])),
                DataElement::new(
                    tags::MESSAGE_ID_BEING_RESPONDED_TO,
                    VR::US,
                    dicom_value!(U16, [message_id]),
                ),
                DataElement::new(
                    tags::COMMAND_DATA_SET_TYPE,
                    VR::US,
                    dicom_value!(U16, [0x0101]),
                ),
                DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [status])),
            ]);
            let mut response_data = Vec::new();
            response.write_dataset_with_ts(
                &mut response_data,
                &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased(),
            )?;
            association.send(&Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: pc_id,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data: response_data,
                }],
            })?;

            received.push(dataset.len());
        }

        match association.receive()? {
            Pdu::ReleaseRQ => association.send(&Pdu::ReleaseRP)?,
            other => return Err(format!("expected release, got {:?}", other).into()),
        }
        Ok(received)
    });

    Ok((handle, addr))
}

fn secondary_capture(instance_uid: &str, pixel_bytes: usize) -> FileDicomObject<InMemDicomObject> {
    let obj = InMemDicomObject::from_element_iter([
        DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            dicom_value!(Str, uids::SECONDARY_CAPTURE_IMAGE_STORAGE),
        ),
        DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, dicom_value!(Str, instance_uid)),
        DataElement::new(tags::PATIENT_NAME, VR::PN, dicom_value!(Str, "DOE^JANE")),
        DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PrimitiveValue::U8(vec![0x5c_u8; pixel_bytes].into()),
        ),
    ]);
    obj.with_meta(
        FileMetaTableBuilder::new()
            .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
            .media_storage_sop_instance_uid(instance_uid)
            .transfer_syntax(IMPLICIT_VR_LITTLE_ENDIAN),
    )
    .expect("valid file meta")
}

fn encoded_len(object: &FileDicomObject<InMemDicomObject>) -> usize {
    let mut bytes = Vec::new();
    object
        .write_dataset_with_ts(&mut bytes, &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased())
        .expect("encodable object");
    bytes.len()
}

#[test]
fn store_over_upper_layer_single_pdu_and_fragmented() {
    let (scp, addr) = spawn_store_scp(vec![0x0000, 0x0000, 0xB000]).expect("acceptor");

    let scu = StoreScu::new(DimseConfig::default());
    let node = RemoteNode::new(SCP_AE_TITLE, "127.0.0.1", addr.port());
    let contexts = vec![PresentationContext::new(
        uids::SECONDARY_CAPTURE_IMAGE_STORAGE,
        vec![IMPLICIT_VR_LITTLE_ENDIAN.to_string()],
    )];
    let cancel = CancellationToken::new();

    let mut session = scu
        .open(&node, &contexts, &cancel)
        .established()
        .expect("association established");

    // fits in one P-DATA with the command
    let small = secondary_capture("1.2.826.0.1.3680043.10.1.1", 16);
    let status = session.send(&small, &cancel).expect("small object stored");
    assert!(status.is_success());

    // larger than the acceptor's max PDU, streamed in fragments
    let large = secondary_capture("1.2.826.0.1.3680043.10.1.2", 200_000);
    let status = session.send(&large, &cancel).expect("large object stored");
    assert!(status.is_success());

    let warning = secondary_capture("1.2.826.0.1.3680043.10.1.3", 16);
    let err = session
        .send(&warning, &cancel)
        .expect_err("warning status is not a success");
    assert!(matches!(err, DimseError::StoreStatus { code: 0xB000 }));

    assert_eq!(session.close(), CloseKind::Released);

    let received = scp.join().expect("acceptor thread").expect("acceptor");
    assert_eq!(
        received,
        vec![encoded_len(&small), encoded_len(&large), encoded_len(&warning)]
    );
}
