//! Pretrained classifier adapters.
//!
//! Models are opaque scorers behind [`ProbabilityModel`]. The adapters in
//! [`content`] and [`url`] turn raw text into the feature vectors those
//! models expect and degrade to the neutral score when a model is missing
//! or misbehaves.

pub mod content;
pub mod url;

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use content::ContentClassifier;
pub use url::UrlClassifier;

/// A pretrained binary classifier: feature vector in, phishing probability out.
pub trait ProbabilityModel: Send + Sync {
    fn predict_probability(&self, features: &[f64]) -> Result<f64, ModelError>;

    /// Feature length the model was trained on.
    fn input_len(&self) -> usize;
}

/// Turns free text into a fixed-size vector.
pub trait TextEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f64>;

    fn dimension(&self) -> usize;
}

/// Logistic regression exported as `{"weights": [...], "bias": 0.0}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
}

impl LogisticModel {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let display = path.as_ref().display().to_string();
        let content = fs::read_to_string(&path).map_err(|source| ModelError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ModelError::Decode {
            path: display,
            source,
        })
    }
}

impl ProbabilityModel for LogisticModel {
    fn predict_probability(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.weights.len() {
            return Err(ModelError::FeatureLength {
                expected: self.weights.len(),
                actual: features.len(),
            });
        }

        let z: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        let p = 1.0 / (1.0 + (-z).exp());

        if p.is_finite() {
            Ok(p)
        } else {
            Err(ModelError::NonFinite)
        }
    }

    fn input_len(&self) -> usize {
        self.weights.len()
    }
}

/// Signed feature hashing over lowercase word tokens, L2-normalized.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    // FNV-1a; stable across builds so stored models stay valid.
    fn hash(token: &str) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
}

impl TextEmbedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = Self::hash(&token.to_lowercase());
            let index = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_logistic_model_predicts() {
        let model = LogisticModel::new(vec![0.0, 0.0], 0.0);
        assert!((model.predict_probability(&[1.0, 2.0]).unwrap() - 0.5).abs() < 1e-12);

        let model = LogisticModel::new(vec![10.0], 0.0);
        assert!(model.predict_probability(&[1.0]).unwrap() > 0.99);
        assert!(model.predict_probability(&[-1.0]).unwrap() < 0.01);
    }

    #[test]
    fn test_logistic_model_rejects_wrong_length() {
        let model = LogisticModel::new(vec![1.0, 1.0, 1.0], 0.0);
        match model.predict_probability(&[1.0]) {
            Err(ModelError::FeatureLength { expected, actual }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_logistic_model_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"weights": [0.5, -0.5], "bias": 1.0}}"#).unwrap();

        let model = LogisticModel::from_file(file.path()).unwrap();
        assert_eq!(model.input_len(), 2);
        assert_eq!(model.bias, 1.0);

        assert!(LogisticModel::from_file("/nonexistent/model.json").is_err());
    }

    #[test]
    fn test_hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("Verify your account now");
        let b = embedder.embed("verify YOUR account, now!");
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);

        let norm: f64 = a.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);

        assert!(embedder.embed("").iter().all(|v| *v == 0.0));
    }
}
