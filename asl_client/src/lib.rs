//! HTTP client for the ASL gesture classification server.
//!
use std::path::Path;

use common::{
    protocol::{ErrorResponse, ImagePredictionResponse, LandmarkPayload, LandmarkPredictionResponse},
    Error,
};
use reqwest::{multipart, Response};
use simple_error::SimpleError;

pub struct AslClient {
    http: reqwest::Client,
    base_url: String,
}

impl AslClient {
    /// `address` is either `host:port` or a full `http(s)://` URL.
    pub fn new(address: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url(address),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn healthcheck(&self) -> Result<bool, Error> {
        let response = self
            .http
            .get(format!("{}/healthcheck", &self.base_url))
            .send()
            .await?;

        Ok(response.status().is_success() && response.text().await? == "healthy")
    }

    /// Upload an image file to `/predict`.
    pub async fn predict_image(&self, path: &Path) -> Result<ImagePredictionResponse, Error> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        log::debug!("Uploading {} ({} bytes)", &filename, bytes.len());

        let part = multipart::Part::bytes(bytes).file_name(filename);
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/predict", &self.base_url))
            .multipart(form)
            .send()
            .await?;

        Ok(checked(response).await?.json().await?)
    }

    /// Send client-side landmarks to `/predict_json`.
    pub async fn predict_landmarks(
        &self,
        payload: &LandmarkPayload,
    ) -> Result<LandmarkPredictionResponse, Error> {
        let response = self
            .http
            .post(format!("{}/predict_json", &self.base_url))
            .json(payload)
            .send()
            .await?;

        Ok(checked(response).await?.json().await?)
    }
}

/// Parse a landmark JSON file, e.g. one exported by the camera page.
pub fn read_landmarks(path: &Path) -> Result<LandmarkPayload, Error> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

fn base_url(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

/// Turn a non-success response into an error carrying the server message.
async fn checked(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);

    Err(Box::new(SimpleError::new(format!(
        "server returned {status}: {message}"
    ))))
}
