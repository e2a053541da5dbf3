use super::{HashingEmbedder, LogisticModel, ProbabilityModel, TextEmbedder};
use crate::types::SignalScore;
use std::path::Path;

/// Body-text classifier: embedding followed by a pretrained scorer.
pub struct ContentClassifier {
    embedder: Box<dyn TextEmbedder>,
    model: Option<Box<dyn ProbabilityModel>>,
}

impl ContentClassifier {
    pub fn new(embedder: Box<dyn TextEmbedder>, model: Option<Box<dyn ProbabilityModel>>) -> Self {
        if let Some(model) = &model {
            if model.input_len() != embedder.dimension() {
                log::warn!(
                    "Content model expects {} features but embedder produces {}",
                    model.input_len(),
                    embedder.dimension()
                );
            }
        }
        Self { embedder, model }
    }

    /// Classifier with no model; every body scores neutral.
    pub fn unavailable() -> Self {
        Self::new(Box::new(HashingEmbedder::new(1)), None)
    }

    /// Load a logistic model from disk. A load failure leaves the classifier
    /// without a model instead of failing startup.
    pub fn load<P: AsRef<Path>>(model_path: Option<P>, embedding_dimension: usize) -> Self {
        let embedder = Box::new(HashingEmbedder::new(embedding_dimension));

        let model = model_path.and_then(|path| match LogisticModel::from_file(&path) {
            Ok(model) => {
                log::info!("Loaded content model from {}", path.as_ref().display());
                Some(Box::new(model) as Box<dyn ProbabilityModel>)
            }
            Err(e) => {
                log::error!("Failed to load content model: {}", e);
                None
            }
        });

        Self::new(embedder, model)
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn score_content(&self, body: &str) -> SignalScore {
        if body.trim().is_empty() {
            return SignalScore::neutral();
        }

        let Some(model) = &self.model else {
            log::warn!("Content analysis not available");
            return SignalScore::neutral();
        };

        let embedding = self.embedder.embed(body);
        match model.predict_probability(&embedding) {
            Ok(probability) => SignalScore::from_probability(probability),
            Err(e) => {
                log::error!("Error in ML content analysis: {}", e);
                SignalScore::neutral()
            }
        }
    }
}
