use crate::classifier::{ContentClassifier, UrlClassifier};
use crate::config::{Config, ReportingConfig, ReputationBackend};
use crate::llm::{GeminiClient, LanguageModel, LlmJudge};
use crate::reputation::{
    CommandOracle, DisabledOracle, HttpOracle, KeyMode, OracleStatus, ReputationOracle,
};
use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a request needs, built once at startup and shared read-only.
#[derive(Clone)]
pub struct ServiceContext {
    pub content: Arc<ContentClassifier>,
    pub url: Arc<UrlClassifier>,
    pub llm: Arc<LlmJudge>,
    pub oracle: Arc<dyn ReputationOracle>,
    pub key_mode: KeyMode,
    pub reporting: ReportingConfig,
}

/// Snapshot of which backends are usable, for `--status`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub content_model_loaded: bool,
    pub url_model_loaded: bool,
    pub llm_available: bool,
    pub key_mode: KeyMode,
    pub ledger: OracleStatus,
    pub auto_report: bool,
    pub min_confidence: f64,
}

impl ServiceContext {
    pub fn new(
        content: ContentClassifier,
        url: UrlClassifier,
        llm: LlmJudge,
        oracle: Arc<dyn ReputationOracle>,
    ) -> Self {
        Self {
            content: Arc::new(content),
            url: Arc::new(url),
            llm: Arc::new(llm),
            oracle,
            key_mode: KeyMode::default(),
            reporting: ReportingConfig::default(),
        }
    }

    pub fn with_key_mode(mut self, key_mode: KeyMode) -> Self {
        self.key_mode = key_mode;
        self
    }

    pub fn with_reporting(mut self, reporting: ReportingConfig) -> Self {
        self.reporting = reporting;
        self
    }

    /// Build the context from configuration. Missing models degrade to
    /// neutral scoring; only a malformed backend definition is an error.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let content = ContentClassifier::load(
            config.models.content_model.as_deref(),
            config.models.embedding_dimension,
        );
        let url = UrlClassifier::load(config.models.url_model.as_deref());

        let gemini = GeminiClient::new(
            config.llm.endpoint.clone(),
            config.llm.model.clone(),
            config.llm.api_key.clone(),
            config.llm.timeout(),
        )
        .context("failed to build LLM HTTP client")?;
        if config.llm.api_key.is_none() {
            log::warn!(
                "{} is not set; LLM verdicts will be neutral",
                config.llm.api_key_env
            );
        }
        let model: Box<dyn LanguageModel> = Box::new(gemini);
        let llm = LlmJudge::new(Some(model), config.llm.body_char_limit);

        let oracle = Self::build_oracle(config)?;

        Ok(Self::new(content, url, llm, oracle)
            .with_key_mode(config.reputation.key_mode)
            .with_reporting(config.reporting.clone()))
    }

    fn build_oracle(config: &Config) -> anyhow::Result<Arc<dyn ReputationOracle>> {
        let rep = &config.reputation;
        if !rep.enabled {
            log::info!("Reputation ledger disabled");
            return Ok(Arc::new(DisabledOracle));
        }

        let oracle: Arc<dyn ReputationOracle> = match &rep.backend {
            ReputationBackend::Command {
                program,
                args,
                working_dir,
            } => Arc::new(
                CommandOracle::new(program.clone(), args.clone())
                    .with_working_dir(working_dir.as_ref().map(PathBuf::from))
                    .with_timeouts(rep.read_timeout(), rep.write_timeout())
                    .with_confirmation(rep.confirmation.clone()),
            ),
            ReputationBackend::Http { url } => Arc::new(
                HttpOracle::new(url)
                    .with_context(|| format!("invalid reputation endpoint {url}"))?
                    .with_timeouts(rep.read_timeout(), rep.write_timeout()),
            ),
        };
        Ok(oracle)
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            content_model_loaded: self.content.is_available(),
            url_model_loaded: self.url.is_available(),
            llm_available: self.llm.is_available(),
            key_mode: self.key_mode,
            ledger: self.oracle.status(),
            auto_report: self.reporting.auto_report,
            min_confidence: self.reporting.min_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_without_models() {
        let mut config = Config::default();
        config.models.content_model = None;
        config.models.url_model = Some("/nonexistent/url_model.json".to_string());
        config.reputation.enabled = false;
        config.llm.api_key = None;

        let ctx = ServiceContext::from_config(&config).unwrap();
        let status = ctx.status();
        assert!(!status.content_model_loaded);
        assert!(!status.url_model_loaded);
        assert!(!status.llm_available);
        assert!(!status.ledger.enabled);
        assert_eq!(status.key_mode, KeyMode::SenderAddress);
    }

    #[test]
    fn test_llm_available_with_api_key() {
        let mut config = Config::default();
        config.models.content_model = None;
        config.models.url_model = None;
        config.llm.api_key = Some("test-key".to_string());

        let ctx = ServiceContext::from_config(&config).unwrap();
        assert!(ctx.status().llm_available);
    }

    #[test]
    fn test_from_config_selects_backend() {
        let mut config = Config::default();
        config.models.content_model = None;
        config.models.url_model = None;
        config.reputation.key_mode = KeyMode::Domain;
        config.reputation.backend = ReputationBackend::Http {
            url: "http://ledger.local:8080/api".to_string(),
        };

        let ctx = ServiceContext::from_config(&config).unwrap();
        assert_eq!(ctx.key_mode, KeyMode::Domain);
        assert_eq!(ctx.oracle.status().backend, "http");

        config.reputation.backend = ReputationBackend::Http {
            url: "mailto:nobody@example.test".to_string(),
        };
        assert!(ServiceContext::from_config(&config).is_err());
    }
}
