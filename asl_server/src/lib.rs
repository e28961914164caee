pub mod classifier;
pub mod config;
pub mod detector;
pub mod endpoints;
pub mod error;
pub mod formatter;
pub mod fusion;
pub mod labels;
pub mod landmarks;
pub mod meter;
pub mod pipeline;
pub mod pool;
pub mod preprocess;
pub mod skeleton;
pub mod uploads;

use std::{path::PathBuf, sync::Arc};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use tower_http::services::ServeDir;

use crate::{
    endpoints::{app_page, camera_page, healthcheck, index, predict, predict_json, test_page},
    pipeline::InferencePipeline,
    pool::InferencePool,
    uploads::UploadStore,
};

/// Largest accepted request body.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Shared state of all handlers.
pub struct AppState {
    pub pipeline: Arc<InferencePipeline>,
    pub pool: InferencePool,
    pub uploads: UploadStore,
    pub static_dir: PathBuf,
}

impl AppState {
    /// Uploads are stored in the `uploads` folder of `static_dir`.
    pub fn new(pipeline: InferencePipeline, pool: InferencePool, static_dir: PathBuf) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            pool,
            uploads: UploadStore::new(static_dir.join("uploads")),
            static_dir,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.static_dir);

    Router::new()
        .route("/", get(index))
        .route("/app", get(app_page))
        .route("/camera", get(camera_page))
        .route("/test", get(test_page))
        .route("/healthcheck", get(healthcheck))
        .route("/predict", post(predict))
        .route("/predict_json", post(predict_json))
        .nest_service("/static", static_files)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(Extension(state))
}
