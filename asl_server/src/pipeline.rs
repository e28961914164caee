//! Per-request inference pipeline.
//!
//! One [`InferencePipeline`] is built at startup for the configured
//! [`PipelineVariant`] and shared by all requests. Every call runs
//! decode, feature extraction, fusion, inference and formatting once and
//! blocks the calling thread, so callers dispatch it through the
//! [`InferencePool`](crate::pool::InferencePool).
use std::sync::Arc;

use common::protocol::LandmarkPayload;
use image::RgbImage;

use crate::{
    classifier::Classifier,
    config::{PipelineVariant, ServerConfig},
    error::{LoadError, PredictError},
    formatter::{PredictionResult, PredictionResultFormatter, CONFIDENCE_PRECISION},
    fusion::{FeatureFusionAssembler, ModelInputs},
    labels::ClassLabelTable,
    landmarks::{LandmarkDetector, LandmarkExtractor, LandmarkVector, LANDMARK_DIM},
    meter::METER,
    preprocess::{crop_to_hand, decode_image, ImagePreprocessor},
    skeleton::SkeletonRenderer,
};

/// Tunables of an [`InferencePipeline`].
#[derive(Clone, Copy, Debug)]
pub struct PipelineOptions {
    pub preprocessor: ImagePreprocessor,
    pub landmark_dim: usize,
    pub padding_margin: u32,
    pub confidence_precision: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            preprocessor: ImagePreprocessor::default(),
            landmark_dim: LANDMARK_DIM,
            padding_margin: 20,
            confidence_precision: CONFIDENCE_PRECISION,
        }
    }
}

impl From<&ServerConfig> for PipelineOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(
                config.image_size,
                config.image_size,
                config.channel_order,
            ),
            landmark_dim: config.landmark_dim,
            padding_margin: config.padding_margin,
            confidence_precision: config.confidence_precision,
        }
    }
}

pub struct InferencePipeline {
    variant: PipelineVariant,
    classifier: Arc<dyn Classifier>,
    extractor: LandmarkExtractor,
    preprocessor: ImagePreprocessor,
    renderer: SkeletonRenderer,
    assembler: FeatureFusionAssembler,
    formatter: PredictionResultFormatter,
    padding_margin: u32,
}

impl InferencePipeline {
    /// Wire up the pipeline. Fails when the classifier's input signature does
    /// not fit the variant or its output width does not fit the labels.
    pub fn new(
        variant: PipelineVariant,
        classifier: Arc<dyn Classifier>,
        detector: Arc<dyn LandmarkDetector>,
        labels: Arc<ClassLabelTable>,
        options: PipelineOptions,
    ) -> Result<Self, LoadError> {
        let mode = variant.fusion_mode();
        if classifier.mode() != mode {
            return Err(LoadError::VariantMismatch {
                variant: format!("{variant:?}"),
                inputs: classifier.mode().input_count(),
            });
        }
        labels.check_model_outputs(classifier.num_classes())?;

        Ok(Self {
            variant,
            classifier,
            extractor: LandmarkExtractor::new(detector, options.landmark_dim),
            preprocessor: options.preprocessor,
            renderer: SkeletonRenderer::default(),
            assembler: FeatureFusionAssembler::new(
                mode,
                &options.preprocessor,
                options.landmark_dim,
            ),
            formatter: PredictionResultFormatter::new(labels, options.confidence_precision),
            padding_margin: options.padding_margin,
        })
    }

    pub fn variant(&self) -> PipelineVariant {
        self.variant
    }

    /// Classify uploaded image bytes.
    pub fn predict_image(&self, bytes: &[u8]) -> Result<PredictionResult, PredictError> {
        let image = decode_image(bytes)?;
        log::debug!("Decoded {}x{} image", image.width(), image.height());

        let inputs = match self.variant {
            PipelineVariant::Image => self
                .assembler
                .assemble_image(self.preprocessor.process(&image))?,
            PipelineVariant::HandCrop => match self.hand_crop(&image)? {
                Some(crop) => self.assembler.assemble_image(self.preprocessor.process(&crop))?,
                None => {
                    log::debug!("No hand to classify");
                    METER.tick_degraded();
                    return Ok(PredictionResult::no_hand());
                }
            },
            PipelineVariant::Multimodal => {
                let (detection, landmarks) = self.extractor.extract(&image)?;
                if detection.is_empty() {
                    METER.tick_degraded();
                }
                let skeleton = self.renderer.render(&image, &detection);

                self.assembler.assemble_fused(
                    self.preprocessor.process(&image),
                    self.preprocessor.process(&skeleton),
                    landmarks,
                )?
            }
        };

        self.classify(inputs)
    }

    /// Classify client-side landmarks with blind image and skeleton slots.
    pub fn predict_landmarks(
        &self,
        payload: &LandmarkPayload,
    ) -> Result<PredictionResult, PredictError> {
        if self.variant != PipelineVariant::Multimodal {
            return Err(PredictError::UnsupportedInput(format!(
                "landmark input is not served by the {:?} pipeline",
                self.variant
            )));
        }

        log::debug!(
            "Received {} pose and {} hand landmarks",
            payload.pose.len(),
            payload.hands.len()
        );
        let landmarks = LandmarkVector::from_payload(payload, self.assembler.landmark_dim());
        METER.tick_degraded();

        self.classify(self.assembler.assemble_blind(landmarks)?)
    }

    fn hand_crop(&self, image: &RgbImage) -> Result<Option<RgbImage>, PredictError> {
        let (detection, _) = self.extractor.extract(image)?;

        Ok(detection
            .first_hand()
            .and_then(|hand| crop_to_hand(image, hand, self.padding_margin)))
    }

    fn classify(&self, inputs: ModelInputs) -> Result<PredictionResult, PredictError> {
        let probabilities = self.classifier.predict(inputs)?;
        let result = self.formatter.format(&probabilities)?;
        METER.tick_prediction();

        log::debug!(
            "Predicted {} with confidence {}",
            result.class_label,
            result.confidence
        );

        Ok(result)
    }
}
