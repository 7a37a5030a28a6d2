use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use dicom_core::{dicom_value, DataElement, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use dicom_transfer_syntax_registry::entries;
use dimse::{
    AssociationLink, Connector, DimseConfig, NegotiatedContext, PresentationContext, RemoteNode,
    StoreScu,
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use scopebridge::adapters::http::{build_router, AppState};
use scopebridge::config::Config;
use scopebridge::pipeline::TransmissionCoordinator;
use scopebridge::storage::create_storage_backend;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "scopebridge-test-boundary";

/// Peer that accepts every association and stores everything
struct AcceptingPeer {
    stored: Arc<AtomicUsize>,
}

struct AcceptingLink {
    stored: Arc<AtomicUsize>,
    contexts: Vec<NegotiatedContext>,
}

impl Connector for AcceptingPeer {
    fn connect(
        &self,
        _config: &DimseConfig,
        _node: &RemoteNode,
        _contexts: &[PresentationContext],
    ) -> dimse::Result<Box<dyn AssociationLink>> {
        Ok(Box::new(AcceptingLink {
            stored: self.stored.clone(),
            contexts: vec![NegotiatedContext {
                id: 1,
                transfer_syntax: dimse::IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
            }],
        }))
    }
}

impl AssociationLink for AcceptingLink {
    fn accepted_contexts(&self) -> &[NegotiatedContext] {
        &self.contexts
    }

    fn exchange(&mut self, _pc_id: u8, _command: &[u8], _dataset: &[u8]) -> dimse::Result<Vec<u8>> {
        self.stored.fetch_add(1, Ordering::SeqCst);
        let response = InMemDicomObject::command_from_element_iter([
            DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [0x8001])),
            DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [0x0000])),
        ]);
        let mut bytes = Vec::new();
        response
            .write_dataset_with_ts(&mut bytes, &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased())
            .unwrap();
        Ok(bytes)
    }

    fn release(&mut self) -> dimse::Result<()> {
        Ok(())
    }

    fn abort(&mut self) -> dimse::Result<()> {
        Ok(())
    }
}

struct TestApp {
    _root: TempDir,
    stored: Arc<AtomicUsize>,
    router: axum::Router,
}

fn test_app() -> TestApp {
    let root = TempDir::new().expect("tempdir");
    let toml = format!(
        r#"
        [service]
        id = "test-service"

        [storage]
        path = "{}"

        [peer]
        ae_title = "ARCHIVE"
        host = "127.0.0.1"
        "#,
        root.path().join("storage").display()
    );
    let config: Config = toml::from_str(&toml).expect("parse config");
    config.validate().expect("valid config");

    let stored = Arc::new(AtomicUsize::new(0));
    let scu = StoreScu::with_connector(
        config.dimse.clone(),
        Arc::new(AcceptingPeer {
            stored: stored.clone(),
        }),
    );
    let storage = create_storage_backend(&config.storage).expect("storage");
    let coordinator = TransmissionCoordinator::with_scu(&config, storage, scu);

    let router = build_router(AppState {
        service_id: config.service.id.clone(),
        coordinator: Arc::new(coordinator),
        max_upload_bytes: config.http.max_upload_bytes,
    });
    TestApp {
        _root: root,
        stored,
        router,
    }
}

fn png() -> Vec<u8> {
    let img = RgbImage::from_pixel(4, 4, Rgb([12, 200, 90]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .expect("png encoding");
    buf.into_inner()
}

fn multipart_body(patient_name: Option<&str>, files: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(name) = patient_name {
        write!(
            body,
            "--{}\r\nContent-Disposition: form-data; name=\"patient_name\"\r\n\r\n{}\r\n",
            BOUNDARY, name
        )
        .unwrap();
    }
    for (file_name, bytes) in files {
        write!(
            body,
            "--{}\r\nContent-Disposition: form-data; name=\"folder\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, file_name
        )
        .unwrap();
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    write!(body, "--{}--\r\n", BOUNDARY).unwrap();
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn index_serves_upload_page() {
    let app = test_app();
    let response = app
        .router
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8_lossy(&bytes);
    assert!(html.contains("name=\"patient_name\""));
    assert!(html.contains("name=\"folder\""));
}

#[tokio::test]
async fn health_reports_service_id() {
    let app = test_app();
    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "test-service");
}

#[tokio::test]
async fn upload_without_patient_name_is_rejected() {
    let app = test_app();
    let body = multipart_body(None, &[("a.png", png())]);

    let response = app.router.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].is_string());
    assert_eq!(body["logs"], Value::Array(vec![]));
    assert_eq!(app.stored.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upload_stores_every_file() {
    let app = test_app();
    let body = multipart_body(Some("DOE^JANE"), &[("a.png", png()), ("b.png", png())]);

    let response = app.router.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["message"].is_string());
    assert!(body["request_id"].is_string());
    let logs = body["logs"].as_array().expect("logs array");
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["file"], "a.png");
    assert_eq!(logs[0]["status"], "success");
    assert_eq!(logs[1]["instance_number"], 2);
    assert_eq!(app.stored.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn upload_failure_reports_failed_file() {
    let app = test_app();
    let body = multipart_body(
        Some("DOE^JANE"),
        &[
            ("a.png", png()),
            ("b.jpg", b"not an image".to_vec()),
            ("c.png", png()),
        ],
    );

    let response = app.router.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["category"], "DecodeError");
    assert_eq!(body["failed_file"], "b.jpg");
    assert_eq!(body["logs"].as_array().map(|l| l.len()), Some(2));
    assert!(body["request_id"].is_string());
    assert_eq!(app.stored.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_multipart_upload_is_a_bad_request() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
