//! Language-model judgment of an email.
//!
//! [`LlmJudge::judge`] never fails: missing credentials, transport errors
//! and unparsable replies all produce a neutral verdict whose reason says
//! what went wrong.

pub mod gemini;
pub mod heuristics;
pub mod parser;
pub mod prompt;

use crate::error::FusionError;
use crate::types::{LlmVerdict, SignalScore, NEUTRAL_SCORE};
use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiClient;
pub use heuristics::HeuristicFlags;
pub use parser::{ParseError, ResponseParser};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API key configured")]
    MissingCredentials,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model returned no text")]
    EmptyResponse,
}

impl From<LlmError> for FusionError {
    fn from(e: LlmError) -> Self {
        FusionError::LlmUnavailable(e.to_string())
    }
}

impl From<ParseError> for FusionError {
    fn from(e: ParseError) -> Self {
        FusionError::MalformedResponse(e.to_string())
    }
}

/// Text-completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    fn name(&self) -> &str;

    /// False when every call would fail with [`LlmError::MissingCredentials`].
    fn has_credentials(&self) -> bool {
        true
    }
}

/// ML signals computed before the LLM call, passed along as context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorSignals {
    pub content: SignalScore,
    pub url_probability: f64,
}

impl PriorSignals {
    pub fn neutral() -> Self {
        Self {
            content: SignalScore::neutral(),
            url_probability: NEUTRAL_SCORE,
        }
    }
}

pub struct LlmJudge {
    model: Option<Box<dyn LanguageModel>>,
    body_char_limit: usize,
}

impl LlmJudge {
    pub fn new(model: Option<Box<dyn LanguageModel>>, body_char_limit: usize) -> Self {
        Self {
            model,
            body_char_limit,
        }
    }

    pub fn unavailable() -> Self {
        Self::new(None, 3000)
    }

    /// A model is configured and able to authenticate.
    pub fn is_available(&self) -> bool {
        self.model.as_ref().is_some_and(|m| m.has_credentials())
    }

    pub async fn judge(
        &self,
        sender: &str,
        subject: &str,
        body: &str,
        urls: &[String],
        prior: &PriorSignals,
    ) -> LlmVerdict {
        let Some(model) = &self.model else {
            return LlmVerdict::neutral("LLM not available");
        };

        let flags = HeuristicFlags::analyze(sender, urls);
        if !flags.is_empty() {
            log::debug!("Heuristic flags: {:?}", flags);
        }

        let prompt = prompt::build_prompt(&prompt::PromptInput {
            sender,
            subject,
            body,
            urls,
            flags: &flags,
            prior,
            body_char_limit: self.body_char_limit,
        });

        let raw = match model.complete(&prompt).await {
            Ok(raw) => raw,
            Err(LlmError::MissingCredentials) => {
                log::warn!("LLM API key not configured");
                return LlmVerdict::neutral("LLM not available: no API key configured");
            }
            Err(e) => {
                log::error!("Error in LLM analysis ({}): {}", model.name(), e);
                return LlmVerdict::neutral(format!("LLM analysis failed: {}", e));
            }
        };

        match ResponseParser::parse(&raw) {
            Ok(verdict) => {
                log::info!(
                    "LLM verdict: safe_score={:.3}, confidence={:.3}",
                    verdict.safe_score,
                    verdict.confidence
                );
                verdict
            }
            Err(e) => {
                log::warn!("Could not parse LLM response: {}", e);
                LlmVerdict::neutral(format!("LLM response could not be parsed: {}", e))
            }
        }
    }
}
