//! Classifier gateway.
//!
//! [`Classifier`] is the seam between the pipeline and the trained model. The
//! production implementation is [`TractClassifier`], which loads an ONNX
//! export with fixed input facts and runs it through tract.
use std::path::Path;

use tract_onnx::prelude::*;

use crate::{
    error::{LoadError, PredictError},
    fusion::{FusionMode, ModelInputs},
};

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Trained model returning a probability per class.
pub trait Classifier: Send + Sync {
    /// Input signature of the model.
    fn mode(&self) -> FusionMode;

    /// Width of the probability vector, if the model declares it.
    fn num_classes(&self) -> Option<usize> {
        None
    }

    fn predict(&self, inputs: ModelInputs) -> Result<Vec<f32>, PredictError>;
}

/// Sizes the input facts of a classifier are fixed to.
#[derive(Clone, Copy, Debug)]
pub struct InputGeometry {
    pub width: u32,
    pub height: u32,
    pub landmark_dim: usize,
}

/// ONNX classifier run by tract.
pub struct TractClassifier {
    model: NnModel,
    mode: FusionMode,
    num_classes: Option<usize>,
}

impl TractClassifier {
    /// Load and optimize the model. Fails if the file is missing, cannot be
    /// parsed, or does not declare the number of inputs `mode` needs.
    pub fn load(
        path: impl AsRef<Path>,
        mode: FusionMode,
        geometry: InputGeometry,
    ) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LoadError::ModelMissing(path.to_path_buf()));
        }
        let invalid = |reason: String| LoadError::ModelInvalid {
            path: path.to_path_buf(),
            reason,
        };

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| invalid(e.to_string()))?;

        if model.inputs.len() != mode.input_count() {
            return Err(invalid(format!(
                "model has {} inputs, {:?} pipeline needs {}",
                model.inputs.len(),
                mode,
                mode.input_count()
            )));
        }

        let image_fact = InferenceFact::dt_shape(
            f32::datum_type(),
            tvec!(1, geometry.height as usize, geometry.width as usize, 3),
        );
        let mut model = model
            .with_input_fact(0, image_fact.clone())
            .map_err(|e| invalid(e.to_string()))?;
        if mode == FusionMode::Triple {
            let landmark_fact =
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, geometry.landmark_dim));
            model = model
                .with_input_fact(1, image_fact)
                .and_then(|m| m.with_input_fact(2, landmark_fact))
                .map_err(|e| invalid(e.to_string()))?;
        }

        let model = model
            .into_optimized()
            .and_then(|m| m.into_runnable())
            .map_err(|e| invalid(e.to_string()))?;

        let num_classes = model
            .model()
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().and_then(|s| s.last().copied()));

        log::info!(
            "Loaded {:?} classifier from {} ({} classes)",
            mode,
            path.display(),
            num_classes.map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );

        Ok(Self {
            model,
            mode,
            num_classes,
        })
    }
}

impl Classifier for TractClassifier {
    fn mode(&self) -> FusionMode {
        self.mode
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    fn predict(&self, inputs: ModelInputs) -> Result<Vec<f32>, PredictError> {
        if inputs.mode() != self.mode {
            return Err(PredictError::Inference(format!(
                "got {:?} inputs for a {:?} model",
                inputs.mode(),
                self.mode
            )));
        }

        log::trace!("Running classifier on inputs {:?}", inputs.shapes());
        let raw_nn_out = self
            .model
            .run(inputs.into_tensors().into_iter().map(Into::into).collect())?;

        let probabilities = raw_nn_out
            .first()
            .ok_or_else(|| PredictError::Inference("model produced no outputs".to_string()))?
            .to_array_view::<f32>()?
            .iter()
            .copied()
            .collect();

        Ok(probabilities)
    }
}
