use thiserror::Error;

/// Failure taxonomy for the scoring pipeline.
///
/// None of these escape [`crate::fusion::FusionEngine::analyze`]; adapters
/// map them to neutral scores and the engine records the message in the
/// result instead.
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("reputation oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("language model unavailable: {0}")]
    LlmUnavailable(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("malformed input: {0}")]
    InputMalformed(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors raised by a probability model or its loader.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode model file {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected {expected} features, got {actual}")]
    FeatureLength { expected: usize, actual: usize },

    #[error("model produced a non-finite probability")]
    NonFinite,
}

impl From<ModelError> for FusionError {
    fn from(e: ModelError) -> Self {
        FusionError::ModelUnavailable(e.to_string())
    }
}
