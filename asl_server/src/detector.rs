//! Keypoint detection backed by landmark ONNX models.
//!
//! Each landmark model takes an NHWC `[1, S, S, 3]` image in `[0, 1]` and
//! returns a flat keypoint array in input pixel units as its first output and
//! presence scores as its second output. A hand model may stack one keypoint
//! block per hand, each with its own score. Keypoints are normalized by `S`.
use std::path::{Path, PathBuf};

use image::RgbImage;
use tract_onnx::prelude::*;

use crate::{
    error::{LoadError, PredictError},
    landmarks::{
        DetectionResult, Keypoint, LandmarkDetector, LandmarkSet, HAND_KEYPOINTS, MAX_HANDS,
        POSE_KEYPOINTS,
    },
    preprocess::{ChannelOrder, ImagePreprocessor},
};

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Layout of a landmark model's input and output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandmarkModelSpec {
    /// Edge length of the square input.
    pub input_size: u32,
    /// Keypoints to keep from the output.
    pub keypoints: usize,
    /// Values per keypoint in the output; the first three are x, y and z.
    pub values_per_keypoint: usize,
    /// Minimum presence score for the keypoints to count as detected.
    pub presence_threshold: f32,
}

impl LandmarkModelSpec {
    /// 21 hand keypoints as `(x, y, z)` on a 224 px input.
    pub const fn hand() -> Self {
        Self {
            input_size: 224,
            keypoints: HAND_KEYPOINTS,
            values_per_keypoint: 3,
            presence_threshold: 0.5,
        }
    }

    /// 33 pose keypoints as `(x, y, z, visibility, presence)` on a 256 px input.
    pub const fn pose() -> Self {
        Self {
            input_size: 256,
            keypoints: POSE_KEYPOINTS,
            values_per_keypoint: 5,
            presence_threshold: 0.5,
        }
    }

    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    pub fn with_presence_threshold(mut self, threshold: f32) -> Self {
        self.presence_threshold = threshold;
        self
    }
}

/// Turn raw model output into a landmark set.
///
/// Returns `Ok(None)` when the presence score is below the threshold. A
/// presence value outside `[0, 1]` is a logit and gets squashed first.
pub fn decode_landmarks(
    raw: &[f32],
    presence: Option<f32>,
    spec: &LandmarkModelSpec,
) -> Result<Option<LandmarkSet>, PredictError> {
    let presence: Vec<f32> = presence.into_iter().collect();
    Ok(decode_landmark_sets(raw, &presence, spec, 1)?
        .into_iter()
        .next())
}

/// Turn raw model output holding up to `max_sets` consecutive keypoint blocks
/// into landmark sets, in output order.
///
/// `presence` holds one score per block. Without scores every block counts as
/// detected; with scores a block without its own score does not.
pub fn decode_landmark_sets(
    raw: &[f32],
    presence: &[f32],
    spec: &LandmarkModelSpec,
    max_sets: usize,
) -> Result<Vec<LandmarkSet>, PredictError> {
    let stride = spec.values_per_keypoint;
    let needed = spec.keypoints * stride;
    if stride < 3 || needed == 0 || raw.len() < needed {
        return Err(PredictError::Inference(format!(
            "landmark model returned {} values, expected at least {needed} with stride >= 3",
            raw.len()
        )));
    }

    let size = spec.input_size as f32;
    let sets = raw
        .chunks_exact(needed)
        .take(max_sets)
        .enumerate()
        .filter(|(i, _)| presence.is_empty() || is_present(presence.get(*i).copied(), spec))
        .map(|(_, block)| {
            let keypoints = block
                .chunks_exact(stride)
                .map(|v| Keypoint::new(v[0] / size, v[1] / size, v[2] / size))
                .collect();
            LandmarkSet::new(keypoints)
        })
        .collect();

    Ok(sets)
}

fn is_present(score: Option<f32>, spec: &LandmarkModelSpec) -> bool {
    let Some(score) = score else {
        return false;
    };
    let score = if (0.0..=1.0).contains(&score) {
        score
    } else {
        1.0 / (1.0 + (-score).exp())
    };

    score >= spec.presence_threshold
}

struct LandmarkModel {
    model: NnModel,
    spec: LandmarkModelSpec,
    max_sets: usize,
    preprocessor: ImagePreprocessor,
}

impl LandmarkModel {
    fn load(path: &Path, spec: LandmarkModelSpec, max_sets: usize) -> Result<Self, LoadError> {
        if !path.is_file() {
            return Err(LoadError::ModelMissing(path.to_path_buf()));
        }

        let size = spec.input_size as usize;
        let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, size, size, 3));
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, input_fact))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| LoadError::ModelInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        log::info!("Loaded landmark model from {}", path.display());

        Ok(Self {
            model,
            spec,
            max_sets,
            preprocessor: ImagePreprocessor::new(spec.input_size, spec.input_size, ChannelOrder::Rgb),
        })
    }

    fn run(&self, image: &RgbImage) -> Result<Vec<LandmarkSet>, PredictError> {
        let input: Tensor = self.preprocessor.process(image).into_batched().into();
        let raw_nn_out = self.model.run(tvec!(input.into()))?;

        let keypoints: Vec<f32> = raw_nn_out
            .first()
            .ok_or_else(|| PredictError::Inference("landmark model produced no outputs".into()))?
            .to_array_view::<f32>()?
            .iter()
            .copied()
            .collect();

        let presence: Vec<f32> = match raw_nn_out.get(1) {
            Some(out) => out.to_array_view::<f32>()?.iter().copied().collect(),
            None => vec![],
        };

        decode_landmark_sets(&keypoints, &presence, &self.spec, self.max_sets)
    }
}

/// Detector running an optional hand model and an optional pose model.
///
/// The hand model sees the whole frame and may output up to [`MAX_HANDS`]
/// keypoint blocks, each with its own presence score.
pub struct TractLandmarkDetector {
    hand: Option<LandmarkModel>,
    pose: Option<LandmarkModel>,
}

impl TractLandmarkDetector {
    pub fn load(
        hand: Option<(PathBuf, LandmarkModelSpec)>,
        pose: Option<(PathBuf, LandmarkModelSpec)>,
    ) -> Result<Self, LoadError> {
        let hand = hand
            .map(|(path, spec)| LandmarkModel::load(&path, spec, MAX_HANDS))
            .transpose()?;
        let pose = pose
            .map(|(path, spec)| LandmarkModel::load(&path, spec, 1))
            .transpose()?;

        Ok(Self { hand, pose })
    }
}

impl LandmarkDetector for TractLandmarkDetector {
    fn detect(&self, image: &RgbImage) -> Result<DetectionResult, PredictError> {
        let pose = match &self.pose {
            Some(model) => model.run(image)?.into_iter().next(),
            None => None,
        };
        let hands = match &self.hand {
            Some(model) => model.run(image)?,
            None => vec![],
        };

        Ok(DetectionResult::new(pose, hands))
    }
}
