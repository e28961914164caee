//! Landmark types and the fixed-length landmark feature vector.
//!
//! A [`LandmarkDetector`] finds keypoints on an image, [`LandmarkExtractor`]
//! flattens them into a [`LandmarkVector`] of exactly `dim` values: pose
//! keypoints first, then every hand in detection order, each keypoint as an
//! `(x, y, z)` triple. Missing values are zero padded on the right and surplus
//! values are cut off on the right, so an image without any detection yields
//! an all-zero vector instead of an error.
use std::sync::Arc;

use common::protocol::{LandmarkPayload, LandmarkPoint};
use image::RgbImage;

use crate::error::PredictError;

/// Keypoints of one pose skeleton.
pub const POSE_KEYPOINTS: usize = 33;
/// Keypoints of one hand skeleton.
pub const HAND_KEYPOINTS: usize = 21;
/// Hands taken from one detection pass.
pub const MAX_HANDS: usize = 2;
/// Values per keypoint in the flattened vector.
pub const VALUES_PER_KEYPOINT: usize = 3;
/// Default length of the landmark vector: 33 * 3 + 2 * 21 * 3.
pub const LANDMARK_DIM: usize =
    (POSE_KEYPOINTS + MAX_HANDS * HAND_KEYPOINTS) * VALUES_PER_KEYPOINT;

/// Detected point, normalized to the image width and height.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Pixel position on an image of the given size.
    pub fn to_pixel(&self, width: u32, height: u32) -> Option<(f32, f32)> {
        let (x, y) = (self.x * width as f32, self.y * height as f32);
        (x.is_finite() && y.is_finite()).then_some((x, y))
    }
}

impl From<LandmarkPoint> for Keypoint {
    fn from(point: LandmarkPoint) -> Self {
        Self::new(point.x, point.y, point.z)
    }
}

/// Ordered keypoints of one detection domain (one pose or one hand).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkSet(pub Vec<Keypoint>);

impl LandmarkSet {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self(keypoints)
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn flatten_into(&self, out: &mut Vec<f32>) {
        for kp in &self.0 {
            out.extend_from_slice(&[kp.x, kp.y, kp.z]);
        }
    }
}

/// Result of one detection pass over an image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub pose: Option<LandmarkSet>,
    /// At most [`MAX_HANDS`], in detection order.
    pub hands: Vec<LandmarkSet>,
}

impl DetectionResult {
    /// Build a detection result. Hands beyond [`MAX_HANDS`] are dropped and
    /// empty sets are treated as not detected.
    pub fn new(pose: Option<LandmarkSet>, mut hands: Vec<LandmarkSet>) -> Self {
        hands.retain(|hand| !hand.is_empty());
        if hands.len() > MAX_HANDS {
            log::debug!("Dropping {} surplus hands", hands.len() - MAX_HANDS);
            hands.truncate(MAX_HANDS);
        }

        Self {
            pose: pose.filter(|pose| !pose.is_empty()),
            hands,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pose.is_none() && self.hands.is_empty()
    }

    pub fn first_hand(&self) -> Option<&LandmarkSet> {
        self.hands.first()
    }
}

/// Flattened landmark features of fixed length.
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkVector(Vec<f32>);

impl LandmarkVector {
    /// All-zero vector, the fully degraded feature.
    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    /// Pad with zeros or truncate on the right to exactly `dim` values.
    pub fn fit(mut values: Vec<f32>, dim: usize) -> Self {
        if values.len() != dim {
            log::trace!("Fitting landmark vector of {} values to {dim}", values.len());
        }
        values.resize(dim, 0.0);
        Self(values)
    }

    /// Flatten a detection: pose first, then the hands in detection order.
    pub fn from_detection(detection: &DetectionResult, dim: usize) -> Self {
        if detection.is_empty() {
            return Self::zeros(dim);
        }

        let mut values = Vec::with_capacity(dim);
        if let Some(pose) = &detection.pose {
            pose.flatten_into(&mut values);
        }
        for hand in &detection.hands {
            hand.flatten_into(&mut values);
        }

        Self::fit(values, dim)
    }

    /// Flatten a client payload in the same pose-then-hands order.
    pub fn from_payload(payload: &LandmarkPayload, dim: usize) -> Self {
        let values = payload
            .pose
            .iter()
            .chain(payload.hands.iter())
            .flat_map(|p| [p.x, p.y, p.z])
            .collect();

        Self::fit(values, dim)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_all_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

/// Keypoint detection capability.
///
/// Implementations are shared between concurrent requests and must be safe
/// to call from several blocking threads at once.
pub trait LandmarkDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<DetectionResult, PredictError>;
}

/// Detector that never finds anything.
///
/// Used when no detector models are configured; every image request then
/// runs with zero landmark features.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDetector;

impl LandmarkDetector for NoopDetector {
    fn detect(&self, _image: &RgbImage) -> Result<DetectionResult, PredictError> {
        Ok(DetectionResult::empty())
    }
}

/// Turns images into landmark vectors through a shared detector.
#[derive(Clone)]
pub struct LandmarkExtractor {
    detector: Arc<dyn LandmarkDetector>,
    dim: usize,
}

impl LandmarkExtractor {
    pub fn new(detector: Arc<dyn LandmarkDetector>, dim: usize) -> Self {
        Self { detector, dim }
    }

    /// Run detection once and flatten it.
    ///
    /// The detection is returned as well so the skeleton overlay can reuse it.
    pub fn extract(
        &self,
        image: &RgbImage,
    ) -> Result<(DetectionResult, LandmarkVector), PredictError> {
        let detection = self.detector.detect(image)?;
        if detection.is_empty() {
            log::debug!("No landmarks detected, using zero features");
        }
        let vector = LandmarkVector::from_detection(&detection, self.dim);

        Ok((detection, vector))
    }
}

#[cfg(test)]
mod test {

    use super::*;

    fn landmark_set(n: usize, value: f32) -> LandmarkSet {
        LandmarkSet::new(vec![Keypoint::new(value, value, value); n])
    }

    struct FixedDetector(DetectionResult);

    impl LandmarkDetector for FixedDetector {
        fn detect(&self, _image: &RgbImage) -> Result<DetectionResult, PredictError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_default_dim() {
        assert_eq!(LANDMARK_DIM, 225);
    }

    #[test]
    fn test_length_is_fixed_for_every_detection_shape() {
        let detections = vec![
            DetectionResult::empty(),
            DetectionResult::new(Some(landmark_set(33, 0.5)), vec![]),
            DetectionResult::new(None, vec![landmark_set(21, 0.5)]),
            DetectionResult::new(None, vec![landmark_set(21, 0.5), landmark_set(21, 0.4)]),
            DetectionResult::new(Some(landmark_set(33, 0.5)), vec![landmark_set(21, 0.5)]),
            DetectionResult::new(
                Some(landmark_set(33, 0.5)),
                vec![landmark_set(21, 0.5), landmark_set(21, 0.4)],
            ),
        ];

        for detection in detections.iter() {
            let vector = LandmarkVector::from_detection(detection, LANDMARK_DIM);
            assert_eq!(vector.len(), LANDMARK_DIM);
        }
    }

    #[test]
    fn test_pose_comes_before_hands() {
        let detection = DetectionResult::new(
            Some(landmark_set(33, 0.1)),
            vec![landmark_set(21, 0.2), landmark_set(21, 0.3)],
        );
        let vector = LandmarkVector::from_detection(&detection, LANDMARK_DIM);
        let values = vector.as_slice();

        assert!(values[..99].iter().all(|v| *v == 0.1));
        assert!(values[99..162].iter().all(|v| *v == 0.2));
        assert!(values[162..].iter().all(|v| *v == 0.3));
    }

    #[test]
    fn test_hands_only_is_zero_padded() {
        let detection = DetectionResult::new(None, vec![landmark_set(21, 0.7)]);
        let vector = LandmarkVector::from_detection(&detection, LANDMARK_DIM);

        assert!(vector.as_slice()[..63].iter().all(|v| *v == 0.7));
        assert!(vector.as_slice()[63..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_surplus_hands_are_dropped() {
        let detection = DetectionResult::new(
            None,
            vec![
                landmark_set(21, 0.1),
                landmark_set(0, 0.9),
                landmark_set(21, 0.2),
                landmark_set(21, 0.3),
            ],
        );

        assert_eq!(detection.hands.len(), MAX_HANDS);
        assert_eq!(detection.hands[1], landmark_set(21, 0.2));
    }

    #[test]
    fn test_fit_pads_and_truncates() {
        let exact: Vec<f32> = (0..225).map(|v| v as f32).collect();
        assert_eq!(LandmarkVector::fit(exact.clone(), 225).into_inner(), exact);

        let short: Vec<f32> = vec![1.0; 150];
        let padded = LandmarkVector::fit(short, 225);
        assert_eq!(padded.len(), 225);
        assert!(padded.as_slice()[..150].iter().all(|v| *v == 1.0));
        assert!(padded.as_slice()[150..].iter().all(|v| *v == 0.0));

        let long: Vec<f32> = (0..300).map(|v| v as f32).collect();
        let truncated = LandmarkVector::fit(long.clone(), 225);
        assert_eq!(truncated.as_slice(), &long[..225]);
    }

    #[test]
    fn test_payload_order_and_missing_z() {
        let payload = LandmarkPayload {
            hands: vec![LandmarkPoint::new(0.3, 0.4, 0.0)],
            pose: vec![LandmarkPoint::new(0.1, 0.2, 0.5)],
        };
        let vector = LandmarkVector::from_payload(&payload, LANDMARK_DIM);

        assert_eq!(&vector.as_slice()[..6], &[0.1, 0.2, 0.5, 0.3, 0.4, 0.0]);
        assert_eq!(vector.len(), LANDMARK_DIM);
    }

    #[test]
    fn test_extractor_without_detection_yields_zeros() -> Result<(), PredictError> {
        let extractor = LandmarkExtractor::new(Arc::new(NoopDetector), LANDMARK_DIM);
        let image = RgbImage::new(32, 32);

        let (detection, vector) = extractor.extract(&image)?;

        assert!(detection.is_empty());
        assert!(vector.is_all_zero());
        assert_eq!(vector.len(), LANDMARK_DIM);

        Ok(())
    }

    #[test]
    fn test_extractor_returns_detection_for_reuse() -> Result<(), PredictError> {
        let detection = DetectionResult::new(None, vec![landmark_set(21, 0.5)]);
        let extractor =
            LandmarkExtractor::new(Arc::new(FixedDetector(detection.clone())), LANDMARK_DIM);

        let (found, vector) = extractor.extract(&RgbImage::new(8, 8))?;

        assert_eq!(found, detection);
        assert!(!vector.is_all_zero());

        Ok(())
    }
}
