//! Wire types of the prediction endpoints.
//!
use serde::{Deserialize, Serialize};

/// One landmark as sent by clients.
///
/// Coordinates are normalized to the image size. Clients without depth
/// information may leave out `z`.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Body of `POST /predict_json`.
///
/// `hands` holds the keypoints of all detected hands back to back, in
/// detection order. Both arrays may be empty or missing.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct LandmarkPayload {
    #[serde(default)]
    pub hands: Vec<LandmarkPoint>,
    #[serde(default)]
    pub pose: Vec<LandmarkPoint>,
}

/// Response of `POST /predict`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ImagePredictionResponse {
    pub filename: String,
    pub predicted_class: String,
    pub confidence: f32,
    pub image_url: String,
}

/// Response of `POST /predict_json`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LandmarkPredictionResponse {
    pub predicted_class: String,
    pub confidence: f32,
}

/// Error payload returned with every non-2xx status.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
