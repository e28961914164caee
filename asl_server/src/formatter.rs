//! Mapping of probability vectors to labelled predictions.
//!
use std::sync::Arc;

use crate::{error::PredictError, labels::ClassLabelTable};

/// Label returned when no hand was found to classify.
pub const NO_HAND_LABEL: &str = "NoHand";

/// Default number of decimal digits kept in the confidence.
pub const CONFIDENCE_PRECISION: u32 = 2;

/// Final prediction of one request.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionResult {
    pub class_label: String,
    pub confidence: f32,
}

impl PredictionResult {
    /// Sentinel result for the no-hand degraded path.
    pub fn no_hand() -> Self {
        Self {
            class_label: NO_HAND_LABEL.to_string(),
            confidence: 0.0,
        }
    }

    pub fn is_no_hand(&self) -> bool {
        self.class_label == NO_HAND_LABEL && self.confidence == 0.0
    }
}

/// Argmax over the probabilities, label lookup and rounding.
#[derive(Clone, Debug)]
pub struct PredictionResultFormatter {
    labels: Arc<ClassLabelTable>,
    precision: u32,
}

impl PredictionResultFormatter {
    pub fn new(labels: Arc<ClassLabelTable>, precision: u32) -> Self {
        Self { labels, precision }
    }

    pub fn format(&self, probabilities: &[f32]) -> Result<PredictionResult, PredictError> {
        if probabilities.len() != self.labels.len() {
            return Err(PredictError::Inference(format!(
                "model returned {} probabilities for {} labels",
                probabilities.len(),
                self.labels.len()
            )));
        }

        let (index, confidence) = argmax(probabilities)
            .ok_or_else(|| PredictError::Inference("empty probability vector".to_string()))?;
        if !confidence.is_finite() {
            return Err(PredictError::Inference(format!(
                "non-finite confidence {confidence} at index {index}"
            )));
        }

        let class_label = self
            .labels
            .get(index)
            .ok_or_else(|| PredictError::Inference(format!("no label for index {index}")))?
            .to_string();

        Ok(PredictionResult {
            class_label,
            confidence: round_to(confidence, self.precision),
        })
    }
}

/// Index and value of the largest element. The first maximum wins on ties.
fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if !(v > b) => best,
            _ => Some((i, v)),
        })
}

fn round_to(value: f32, digits: u32) -> f32 {
    let scale = 10f64.powi(digits as i32);
    ((value as f64 * scale).round() / scale) as f32
}

#[cfg(test)]
mod test {

    use super::*;

    fn formatter(labels: &[&str], precision: u32) -> PredictionResultFormatter {
        let labels = labels.iter().map(|l| l.to_string()).collect();
        PredictionResultFormatter::new(Arc::new(ClassLabelTable::new(labels).unwrap()), precision)
    }

    #[test]
    fn test_argmax_and_rounding() -> Result<(), PredictError> {
        let result = formatter(&["A", "B", "C"], 2).format(&[0.1, 0.8567, 0.0433])?;

        assert_eq!(result.class_label, "B");
        assert_eq!(result.confidence, 0.86);

        let result = formatter(&["A", "B", "C"], 3).format(&[0.1, 0.8567, 0.0433])?;
        assert_eq!(result.confidence, 0.857);

        Ok(())
    }

    #[test]
    fn test_first_maximum_wins() -> Result<(), PredictError> {
        let result = formatter(&["A", "B", "C"], 2).format(&[0.4, 0.4, 0.2])?;
        assert_eq!(result.class_label, "A");

        Ok(())
    }

    #[test]
    fn test_length_mismatch_is_inference_error() {
        let result = formatter(&["A", "B"], 2).format(&[0.2, 0.3, 0.5]);
        assert!(matches!(result, Err(PredictError::Inference(_))));
    }

    #[test]
    fn test_nan_probabilities_are_rejected() {
        let result = formatter(&["A", "B"], 2).format(&[f32::NAN, f32::NAN]);
        assert!(matches!(result, Err(PredictError::Inference(_))));
    }

    #[test]
    fn test_no_hand_sentinel() {
        let sentinel = PredictionResult::no_hand();
        assert_eq!(sentinel.class_label, "NoHand");
        assert_eq!(sentinel.confidence, 0.0);
        assert!(sentinel.is_no_hand());
    }
}
