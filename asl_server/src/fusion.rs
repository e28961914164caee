//! Assembly of classifier input tensors.
//!
//! The classifier either takes one image batch (`[1, H, W, 3]`) or the ordered
//! triple `(image, skeleton, landmarks)` with shapes `[1, H, W, 3]`,
//! `[1, H, W, 3]` and `[1, D]`.
use ndarray::{Array2, Array4, Axis};
use smallvec::SmallVec;
use tract_onnx::prelude::Tensor;

use crate::{
    error::PredictError,
    landmarks::LandmarkVector,
    preprocess::{ImagePreprocessor, NormalizedImageTensor},
};

/// Input signature of the loaded classifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FusionMode {
    /// One image input.
    Single,
    /// Image, skeleton overlay and landmark vector.
    Triple,
}

impl FusionMode {
    pub fn input_count(&self) -> usize {
        match self {
            FusionMode::Single => 1,
            FusionMode::Triple => 3,
        }
    }
}

/// Batched tensors in the order the classifier declares its inputs.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelInputs {
    Single {
        image: Array4<f32>,
    },
    Triple {
        image: Array4<f32>,
        skeleton: Array4<f32>,
        landmarks: Array2<f32>,
    },
}

impl ModelInputs {
    pub fn mode(&self) -> FusionMode {
        match self {
            ModelInputs::Single { .. } => FusionMode::Single,
            ModelInputs::Triple { .. } => FusionMode::Triple,
        }
    }

    pub fn shapes(&self) -> SmallVec<[Vec<usize>; 3]> {
        match self {
            ModelInputs::Single { image } => smallvec::smallvec![image.shape().to_vec()],
            ModelInputs::Triple {
                image,
                skeleton,
                landmarks,
            } => smallvec::smallvec![
                image.shape().to_vec(),
                skeleton.shape().to_vec(),
                landmarks.shape().to_vec(),
            ],
        }
    }

    /// Convert into tract tensors, preserving the input order.
    pub fn into_tensors(self) -> SmallVec<[Tensor; 3]> {
        match self {
            ModelInputs::Single { image } => smallvec::smallvec![image.into()],
            ModelInputs::Triple {
                image,
                skeleton,
                landmarks,
            } => smallvec::smallvec![image.into(), skeleton.into(), landmarks.into()],
        }
    }
}

/// Builds [`ModelInputs`] for one classifier signature.
#[derive(Clone, Copy, Debug)]
pub struct FeatureFusionAssembler {
    mode: FusionMode,
    width: u32,
    height: u32,
    landmark_dim: usize,
}

impl FeatureFusionAssembler {
    pub fn new(mode: FusionMode, preprocessor: &ImagePreprocessor, landmark_dim: usize) -> Self {
        Self {
            mode,
            width: preprocessor.width(),
            height: preprocessor.height(),
            landmark_dim,
        }
    }

    pub fn landmark_dim(&self) -> usize {
        self.landmark_dim
    }

    /// Single-input assembly for image-only classifiers.
    pub fn assemble_image(&self, image: NormalizedImageTensor) -> Result<ModelInputs, PredictError> {
        self.require_mode(FusionMode::Single)?;
        self.check_image(&image, "image")?;

        Ok(ModelInputs::Single {
            image: image.into_batched(),
        })
    }

    /// Triple-input assembly from all three modalities.
    pub fn assemble_fused(
        &self,
        image: NormalizedImageTensor,
        skeleton: NormalizedImageTensor,
        landmarks: LandmarkVector,
    ) -> Result<ModelInputs, PredictError> {
        self.require_mode(FusionMode::Triple)?;
        self.check_image(&image, "image")?;
        self.check_image(&skeleton, "skeleton")?;

        Ok(ModelInputs::Triple {
            image: image.into_batched(),
            skeleton: skeleton.into_batched(),
            landmarks: self.landmark_batch(landmarks),
        })
    }

    /// Triple-input assembly when only landmarks are available.
    ///
    /// Image and skeleton slots are filled with zero placeholders.
    pub fn assemble_blind(&self, landmarks: LandmarkVector) -> Result<ModelInputs, PredictError> {
        if self.mode != FusionMode::Triple {
            return Err(PredictError::UnsupportedInput(
                "landmark input needs a multimodal classifier".to_string(),
            ));
        }
        let placeholder = NormalizedImageTensor::zeros(self.width, self.height);

        self.assemble_fused(placeholder.clone(), placeholder, landmarks)
    }

    fn landmark_batch(&self, landmarks: LandmarkVector) -> Array2<f32> {
        let landmarks = if landmarks.len() == self.landmark_dim {
            landmarks
        } else {
            log::warn!(
                "Landmark vector has {} values, refitting to {}",
                landmarks.len(),
                self.landmark_dim
            );
            LandmarkVector::fit(landmarks.into_inner(), self.landmark_dim)
        };

        ndarray::Array1::from_vec(landmarks.into_inner()).insert_axis(Axis(0))
    }

    fn require_mode(&self, mode: FusionMode) -> Result<(), PredictError> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(PredictError::UnsupportedInput(format!(
                "classifier expects {} input(s), got {}",
                self.mode.input_count(),
                mode.input_count()
            )))
        }
    }

    fn check_image(&self, tensor: &NormalizedImageTensor, slot: &str) -> Result<(), PredictError> {
        let expected = [self.height as usize, self.width as usize, 3];
        if tensor.shape() == expected {
            Ok(())
        } else {
            Err(PredictError::Inference(format!(
                "{slot} tensor has shape {:?}, expected {:?}",
                tensor.shape(),
                expected
            )))
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::landmarks::LANDMARK_DIM;

    fn assembler(mode: FusionMode) -> FeatureFusionAssembler {
        FeatureFusionAssembler::new(mode, &ImagePreprocessor::default(), LANDMARK_DIM)
    }

    #[test]
    fn test_triple_shapes_and_order() -> Result<(), PredictError> {
        let white = image::RgbImage::from_pixel(64, 64, image::Rgb([255, 255, 255]));
        let image = ImagePreprocessor::default().process(&white);
        let skeleton = NormalizedImageTensor::zeros(64, 64);

        let inputs = assembler(FusionMode::Triple).assemble_fused(
            image,
            skeleton,
            LandmarkVector::fit(vec![1.0; LANDMARK_DIM], LANDMARK_DIM),
        )?;

        assert_eq!(
            inputs.shapes().to_vec(),
            vec![vec![1, 64, 64, 3], vec![1, 64, 64, 3], vec![1, 225]]
        );
        match inputs {
            ModelInputs::Triple {
                image,
                skeleton,
                landmarks,
            } => {
                assert!(image[[0, 0, 0, 0]] > 0.99);
                assert_eq!(skeleton[[0, 0, 0, 0]], 0.0);
                assert_eq!(landmarks[[0, 224]], 1.0);
            }
            _ => panic!("expected triple input"),
        }

        Ok(())
    }

    #[test]
    fn test_exact_landmarks_pass_unchanged() -> Result<(), PredictError> {
        let values: Vec<f32> = (0..225).map(|v| v as f32 / 225.0).collect();
        let inputs =
            assembler(FusionMode::Triple).assemble_blind(LandmarkVector::fit(values.clone(), 225))?;

        match inputs {
            ModelInputs::Triple { landmarks, .. } => {
                assert_eq!(landmarks.as_slice().unwrap(), values.as_slice());
            }
            _ => panic!("expected triple input"),
        }

        Ok(())
    }

    #[test]
    fn test_blind_input_uses_zero_placeholders() -> Result<(), PredictError> {
        let inputs = assembler(FusionMode::Triple).assemble_blind(LandmarkVector::zeros(225))?;

        match inputs {
            ModelInputs::Triple {
                image,
                skeleton,
                landmarks,
            } => {
                assert_eq!(image.shape(), &[1, 64, 64, 3]);
                assert!(image.iter().all(|v| *v == 0.0));
                assert!(skeleton.iter().all(|v| *v == 0.0));
                assert_eq!(landmarks.shape(), &[1, 225]);
            }
            _ => panic!("expected triple input"),
        }

        Ok(())
    }

    #[test]
    fn test_wrong_length_landmarks_are_refitted() -> Result<(), PredictError> {
        let wrong = LandmarkVector::fit(vec![1.0; 300], 300);
        let inputs = assembler(FusionMode::Triple).assemble_blind(wrong)?;

        assert_eq!(inputs.shapes()[2], vec![1, 225]);

        Ok(())
    }

    #[test]
    fn test_single_mode() -> Result<(), PredictError> {
        let single = assembler(FusionMode::Single);

        let inputs = single.assemble_image(NormalizedImageTensor::zeros(64, 64))?;
        assert_eq!(inputs.mode(), FusionMode::Single);
        assert_eq!(inputs.into_tensors().len(), 1);

        let blind = single.assemble_blind(LandmarkVector::zeros(225));
        assert!(matches!(blind, Err(PredictError::UnsupportedInput(_))));

        Ok(())
    }

    #[test]
    fn test_mode_and_shape_mismatch_are_rejected() {
        let triple = assembler(FusionMode::Triple);
        let result = triple.assemble_image(NormalizedImageTensor::zeros(64, 64));
        assert!(matches!(result, Err(PredictError::UnsupportedInput(_))));

        let result = triple.assemble_fused(
            NormalizedImageTensor::zeros(32, 32),
            NormalizedImageTensor::zeros(64, 64),
            LandmarkVector::zeros(225),
        );
        assert!(matches!(result, Err(PredictError::Inference(_))));
    }
}
