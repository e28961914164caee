//! Error types of the inference service.
//!
//! Two families exist. [`LoadError`] only happens while the process starts and
//! is fatal. [`PredictError`] belongs to a single request and is mapped onto an
//! HTTP status by its [`IntoResponse`] implementation.
use std::{fmt, path::PathBuf};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::ErrorResponse;

use crate::meter::METER;

/// Startup failure. The process must not serve traffic after one of these.
#[derive(Debug)]
pub enum LoadError {
    /// Model artifact does not exist.
    ModelMissing(PathBuf),
    /// Model artifact exists but could not be turned into a runnable plan.
    ModelInvalid { path: PathBuf, reason: String },
    /// Neither a label list nor a label directory yields any label.
    NoLabels,
    /// Label directory could not be listed.
    LabelDir { path: PathBuf, reason: String },
    /// Label list and label directory disagree on content or order.
    LabelMismatch {
        configured: Vec<String>,
        from_dir: Vec<String>,
    },
    /// Label table and model output width differ.
    LabelCount { labels: usize, model_outputs: usize },
    /// Loaded classifier does not take the inputs of the configured variant.
    VariantMismatch { variant: String, inputs: usize },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::ModelMissing(path) => {
                write!(f, "model artifact not found: {}", path.display())
            }
            LoadError::ModelInvalid { path, reason } => {
                write!(f, "failed to load model {}: {reason}", path.display())
            }
            LoadError::NoLabels => write!(f, "no class labels configured"),
            LoadError::LabelDir { path, reason } => {
                write!(f, "failed to read label directory {}: {reason}", path.display())
            }
            LoadError::LabelMismatch {
                configured,
                from_dir,
            } => write!(
                f,
                "configured labels {configured:?} do not match label directory {from_dir:?}"
            ),
            LoadError::LabelCount {
                labels,
                model_outputs,
            } => write!(
                f,
                "label table has {labels} entries but the model outputs {model_outputs} classes"
            ),
            LoadError::VariantMismatch { variant, inputs } => write!(
                f,
                "{variant} pipeline cannot run a classifier with {inputs} input(s)"
            ),
        }
    }
}

impl std::error::Error for LoadError {}

/// Failure of a single prediction request.
#[derive(Debug)]
pub enum PredictError {
    /// Uploaded bytes are not a decodable image.
    ImageDecode(String),
    /// Request is malformed, e.g. the multipart body lacks a file.
    BadRequest(String),
    /// Input kind is not served by the loaded pipeline variant.
    UnsupportedInput(String),
    /// Detector or classifier failed, or returned something unusable.
    Inference(String),
    /// Blocking inference did not finish in time.
    Timeout { millis: u64 },
    /// Upload could not be stored.
    Storage(String),
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::ImageDecode(_) | PredictError::BadRequest(_) => StatusCode::BAD_REQUEST,
            PredictError::UnsupportedInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PredictError::Inference(_) | PredictError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PredictError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl fmt::Display for PredictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictError::ImageDecode(msg) => write!(f, "could not decode image: {msg}"),
            PredictError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            PredictError::UnsupportedInput(msg) => write!(f, "unsupported input: {msg}"),
            PredictError::Inference(msg) => write!(f, "inference failed: {msg}"),
            PredictError::Timeout { millis } => write!(f, "inference timed out after {millis} ms"),
            PredictError::Storage(msg) => write!(f, "could not store upload: {msg}"),
        }
    }
}

impl std::error::Error for PredictError {}

impl From<image::ImageError> for PredictError {
    fn from(err: image::ImageError) -> Self {
        PredictError::ImageDecode(err.to_string())
    }
}

impl From<tract_onnx::prelude::TractError> for PredictError {
    fn from(err: tract_onnx::prelude::TractError) -> Self {
        PredictError::Inference(err.to_string())
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status();
        METER.tick_failure();
        if status.is_server_error() {
            log::error!("Request failed: {}", &self);
        } else {
            log::warn!("Request rejected: {}", &self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            PredictError::ImageDecode("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PredictError::UnsupportedInput("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            PredictError::Inference("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            PredictError::Timeout { millis: 10 }.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
