use crate::pipeline::{BatchResult, ErrorCategory, TransmissionCoordinator, UploadedFile};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const INDEX_HTML: &str = include_str!("../../../templates/index.html");

/// Shared state of the upload routes
#[derive(Clone)]
pub struct AppState {
    pub service_id: String,
    pub coordinator: Arc<TransmissionCoordinator>,
    pub max_upload_bytes: usize,
}

/// Build the HTTP router: upload page, upload endpoint and health probe
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    tracing::info!("Upload page requested");
    Html(INDEX_HTML)
}

async fn health(State(state): State<AppState>) -> Response {
    Json(json!({ "status": "ok", "service": state.service_id })).into_response()
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut files = Vec::new();
    let mut patient_name = String::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("Malformed upload: {}", e)),
        };

        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "folder" => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = match field.bytes().await {
                    Ok(bytes) => bytes,
                    Err(e) => return bad_request(format!("Failed to read '{}': {}", name, e)),
                };
                // browsers send an empty part when nothing was selected
                if name.is_empty() && bytes.is_empty() {
                    continue;
                }
                files.push(UploadedFile {
                    name,
                    bytes: bytes.to_vec(),
                });
            }
            "patient_name" => match field.text().await {
                Ok(text) => patient_name = text,
                Err(e) => return bad_request(format!("Failed to read patient name: {}", e)),
            },
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    tracing::info!("Received upload of {} file(s)", files.len());

    // cancelled when the client goes away and this future is dropped
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let coordinator = state.coordinator.clone();
    let worker_cancel = cancel.clone();
    let joined = tokio::task::spawn_blocking(move || {
        coordinator.process_batch(files, &patient_name, &worker_cancel)
    })
    .await;
    guard.disarm();

    match joined {
        Ok(result) => batch_response(result),
        Err(e) => {
            tracing::error!("Batch worker failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Unexpected error while processing the upload", "logs": [] })),
            )
                .into_response()
        }
    }
}

fn batch_response(result: BatchResult) -> Response {
    let Some(failure) = result.failure else {
        return (
            StatusCode::OK,
            Json(json!({
                "message": "Files converted and stored successfully",
                "request_id": result.request_id,
                "logs": result.logs,
            })),
        )
            .into_response();
    };

    if failure.category == ErrorCategory::InputError {
        return bad_request(failure.message);
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": failure.message,
            "request_id": result.request_id,
            "logs": result.logs,
            "failed_file": failure.file,
            "category": failure.category,
            "status_code": failure.status_code,
        })),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    tracing::warn!("Rejected upload: {}", message);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message, "logs": [] })),
    )
        .into_response()
}
