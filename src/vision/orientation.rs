//! Document orientation classification
//!
//! Classifies a label crop as upright or rotated. Only the 180° verdict is
//! acted on by the rectifier; 90° cases are already handled by forcing
//! landscape.

use anyhow::{Context, Result};
use image::RgbImage;
use ort::value::TensorRef;
use std::path::PathBuf;
use tracing::debug;

use super::models::LazyModel;
use super::preprocess::{preprocess_for_classification, softmax, ClassifierPreprocess};

/// Classifier verdict
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationPrediction {
    /// Class label, e.g. "0" or "180"
    pub label: String,
    /// Probability of the predicted class
    pub score: f32,
}

/// Predicts the rotation of an image
pub trait OrientationClassifier: Send + Sync {
    /// Whether the classifier can run (model present and loadable)
    fn is_available(&self) -> bool;

    /// Classify a single image
    fn classify(&self, image: &RgbImage) -> Result<OrientationPrediction>;
}

/// Class labels of the four-way document orientation model, in output order
pub const ORIENTATION_LABELS: [&str; 4] = ["0", "90", "180", "270"];

/// Orientation classifier backed by an ONNX model
pub struct OnnxOrientationClassifier {
    model: LazyModel,
    preprocess: ClassifierPreprocess,
}

impl OnnxOrientationClassifier {
    /// Create a classifier for the model at `path`; the model loads on first use
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            model: LazyModel::new(path),
            preprocess: ClassifierPreprocess::default(),
        }
    }
}

impl OrientationClassifier for OnnxOrientationClassifier {
    fn is_available(&self) -> bool {
        self.model.is_available()
    }

    fn classify(&self, image: &RgbImage) -> Result<OrientationPrediction> {
        let input = preprocess_for_classification(image, &self.preprocess);

        let logits = self.model.with_session(|onnx| {
            let input_name = onnx.primary_input()?.to_string();
            let output_name = onnx.primary_output()?.to_string();

            let tensor = TensorRef::from_array_view(input.view())?;
            let outputs = onnx
                .session_mut()
                .run(ort::inputs![input_name.as_str() => tensor])?;
            let (_, data) = outputs[output_name.as_str()].try_extract_tensor::<f32>()?;
            Ok(data.to_vec())
        })?;

        let prediction = prediction_from_scores(&logits)
            .context("Orientation model returned no scores")?;
        debug!(
            "Orientation prediction: {} ({:.3})",
            prediction.label, prediction.score
        );
        Ok(prediction)
    }
}

/// Pick the top class from raw model output
///
/// Output that already sums to one is taken as probabilities, anything else
/// is passed through softmax first.
pub fn prediction_from_scores(scores: &[f32]) -> Option<OrientationPrediction> {
    if scores.is_empty() {
        return None;
    }

    let sum: f32 = scores.iter().sum();
    let is_probability = scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3;
    let probs = if is_probability {
        scores.to_vec()
    } else {
        softmax(scores)
    };

    let (index, score) = probs
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    let label = ORIENTATION_LABELS
        .get(index)
        .map(|l| l.to_string())
        .unwrap_or_else(|| index.to_string());

    Some(OrientationPrediction { label, score })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_from_probabilities() {
        let prediction = prediction_from_scores(&[0.1, 0.05, 0.8, 0.05]).unwrap();
        assert_eq!(prediction.label, "180");
        assert!((prediction.score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_prediction_from_logits() {
        let prediction = prediction_from_scores(&[5.0, 0.0, 1.0, 0.0]).unwrap();
        assert_eq!(prediction.label, "0");
        assert!(prediction.score > 0.9);
    }

    #[test]
    fn test_prediction_empty_scores() {
        assert!(prediction_from_scores(&[]).is_none());
    }

    #[test]
    fn test_missing_model_not_available() {
        let classifier = OnnxOrientationClassifier::new("/nonexistent/doc_ori.onnx");
        assert!(!classifier.is_available());
        assert!(classifier.classify(&RgbImage::new(8, 8)).is_err());
    }
}
