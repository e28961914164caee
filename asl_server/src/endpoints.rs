//! Endpoints of HTTP server.
//!
use std::{io::ErrorKind, path::Path, sync::Arc};

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Multipart},
    http::StatusCode,
    response::Html,
    Extension, Json,
};
use common::protocol::{ImagePredictionResponse, LandmarkPayload, LandmarkPredictionResponse};

use crate::{error::PredictError, AppState};

/// Multipart field carrying the uploaded image.
pub const FILE_FIELD: &str = "file";

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

pub async fn index(Extension(state): Extension<Arc<AppState>>) -> Result<Html<String>, StatusCode> {
    static_page(&state.static_dir, "index.html").await
}

pub async fn app_page(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Html<String>, StatusCode> {
    static_page(&state.static_dir, "app.html").await
}

pub async fn camera_page(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Html<String>, StatusCode> {
    static_page(&state.static_dir, "camera.html").await
}

pub async fn test_page(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Html<String>, StatusCode> {
    static_page(&state.static_dir, "test.html").await
}

async fn static_page(dir: &Path, name: &str) -> Result<Html<String>, StatusCode> {
    match tokio::fs::read_to_string(dir.join(name)).await {
        Ok(page) => Ok(Html(page)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::warn!("Page {name} not found in {}", dir.display());
            Err(StatusCode::NOT_FOUND)
        }
        Err(e) => {
            log::error!("Failed to read page {name}: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Classify an uploaded image and keep a copy of it under the static uploads.
pub async fn predict(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ImagePredictionResponse>, PredictError> {
    let (filename, bytes) = read_file_field(&mut multipart).await?;
    log::debug!("Received upload {} ({} bytes)", &filename, bytes.len());

    // Nothing is written until the bytes decode and classify
    let format = image::guess_format(&bytes)?;

    let pipeline = state.pipeline.clone();
    let job_bytes = bytes.clone();
    let result = state
        .pool
        .run(move || pipeline.predict_image(&job_bytes))
        .await?;

    let stored = state.uploads.store(format, &bytes).await?;

    Ok(Json(ImagePredictionResponse {
        filename,
        predicted_class: result.class_label,
        confidence: result.confidence,
        image_url: stored.url,
    }))
}

/// Classify landmarks that were extracted on the client.
pub async fn predict_json(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<LandmarkPayload>, JsonRejection>,
) -> Result<Json<LandmarkPredictionResponse>, PredictError> {
    let Json(payload) = payload.map_err(|e| PredictError::BadRequest(e.body_text()))?;

    let pipeline = state.pipeline.clone();
    let result = state
        .pool
        .run(move || pipeline.predict_landmarks(&payload))
        .await?;

    Ok(Json(LandmarkPredictionResponse {
        predicted_class: result.class_label,
        confidence: result.confidence,
    }))
}

async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Bytes), PredictError> {
    let bad_request = |e: axum::extract::multipart::MultipartError| {
        PredictError::BadRequest(format!("malformed multipart body: {e}"))
    };

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or("upload")
            .to_string();
        let bytes = field.bytes().await.map_err(bad_request)?;

        return Ok((filename, bytes));
    }

    Err(PredictError::BadRequest(format!(
        "multipart body has no `{FILE_FIELD}` field"
    )))
}
