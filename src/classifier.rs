//! Classifier abstraction - ONNX Runtime integration
//!
//! The scoring path only needs "fixed-order row in, boolean out"; the trait
//! keeps the feature deriver decoupled from the model-loading mechanism.

use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::features::FEATURE_COUNT;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Failed to load model: {0}")]
    Load(String),

    #[error("Prediction failed: {0}")]
    Predict(String),
}

/// A binary fraud classifier over a fixed-order feature row
pub trait FraudClassifier {
    fn predict(&mut self, features: &[f32; FEATURE_COUNT]) -> Result<bool, ClassifierError>;
}

/// ONNX-backed classifier. The artifact is reloaded per request by the
/// handlers; the session is treated as immutable once built.
#[derive(Debug)]
pub struct OnnxClassifier {
    session: Session,
    input_name: String,
}

impl OnnxClassifier {
    pub fn load(model_path: &str) -> Result<Self, ClassifierError> {
        if !std::path::Path::new(model_path).exists() {
            return Err(ClassifierError::Load(format!("Model not found: {}", model_path)));
        }

        let session = Session::builder()
            .map_err(|e| ClassifierError::Load(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ClassifierError::Load(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| ClassifierError::Load(e.to_string()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        Ok(Self { session, input_name })
    }
}

impl FraudClassifier for OnnxClassifier {
    fn predict(&mut self, features: &[f32; FEATURE_COUNT]) -> Result<bool, ClassifierError> {
        let shape = vec![1_i64, FEATURE_COUNT as i64];
        let input_tensor = Tensor::from_array((shape, features.to_vec()))
            .map_err(|e| ClassifierError::Predict(format!("Failed to create input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![&self.input_name => input_tensor])
            .map_err(|e| ClassifierError::Predict(e.to_string()))?;

        // sklearn-style exports emit an int64 class label plus probabilities;
        // prefer the label, fall back to a probability tensor.
        for (_name, output) in outputs.iter() {
            if let Ok((_, labels)) = output.try_extract_tensor::<i64>() {
                if let Some(&label) = labels.first() {
                    return Ok(label != 0);
                }
            }
        }

        for (_name, output) in outputs.iter() {
            if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
                let dims: Vec<i64> = shape.iter().copied().collect();
                // [batch, num_classes] probability rows: fraud class is index 1
                if dims.len() == 2 && dims[1] >= 2 && data.len() >= 2 {
                    return Ok(data[1] > data[0]);
                }
                if let Some(&value) = data.first() {
                    return Ok(value >= 0.5);
                }
            }
        }

        Err(ClassifierError::Predict("model returned no usable output".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reports_missing_artifact() {
        let err = OnnxClassifier::load("/nonexistent/fraud_model.onnx").unwrap_err();
        assert!(matches!(err, ClassifierError::Load(_)));
        assert!(err.to_string().starts_with("Failed to load model:"));
    }
}
