//! Storage of uploaded images.
//!
//! Every stored upload gets a fresh random name, so concurrent uploads never
//! overwrite each other. The extension comes from the detected image format,
//! never from the client filename.
use std::path::{Path, PathBuf};

use image::ImageFormat;
use uuid::Uuid;

use crate::error::PredictError;

/// URL prefix the uploads directory is served under.
pub const UPLOADS_URL: &str = "/static/uploads";

/// Location of a stored upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct UploadStore {
    dir: PathBuf,
    url_prefix: String,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: UPLOADS_URL.to_string(),
        }
    }

    /// Write `bytes`, already validated as an image of `format`.
    pub async fn store(
        &self,
        format: ImageFormat,
        bytes: &[u8],
    ) -> Result<StoredUpload, PredictError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_error(&self.dir, e))?;

        let name = format!("{}.{}", Uuid::new_v4().simple(), extension(format));
        let path = self.dir.join(&name);

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| storage_error(&path, e))?;
        log::debug!("Stored upload {} ({} bytes)", &name, bytes.len());

        Ok(StoredUpload {
            url: format!("{}/{name}", self.url_prefix),
            path,
        })
    }
}

fn extension(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("img")
}

fn storage_error(path: &Path, err: std::io::Error) -> PredictError {
    PredictError::Storage(format!("{}: {err}", path.display()))
}
