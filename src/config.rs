use crate::error::FusionError;
use crate::fusion::FusionWeights;
use crate::reputation::{KeyMode, DEFAULT_CONFIRMATION};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fusion: FusionConfig,
    pub reputation: ReputationConfig,
    pub llm: LlmConfig,
    pub models: ModelsConfig,
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub weights: FusionWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    pub enabled: bool,
    pub key_mode: KeyMode,
    pub backend: ReputationBackend,
    pub read_timeout_seconds: u64,
    pub write_timeout_seconds: u64,
    /// Substring a successful `classify` must print.
    pub confirmation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReputationBackend {
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        working_dir: Option<String>,
    },
    Http {
        url: String,
    },
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_mode: KeyMode::SenderAddress,
            backend: ReputationBackend::Command {
                program: "node".to_string(),
                args: vec!["blockchain/interact.js".to_string()],
                working_dir: None,
            },
            read_timeout_seconds: 15,
            write_timeout_seconds: 60,
            confirmation: DEFAULT_CONFIRMATION.to_string(),
        }
    }
}

impl ReputationConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    /// Inline key; usually left empty in favour of `api_key_env`.
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub timeout_seconds: u64,
    pub body_char_limit: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_seconds: 30,
            body_char_limit: 3000,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub content_model: Option<String>,
    pub url_model: Option<String>,
    pub embedding_dimension: usize,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            content_model: Some("/var/lib/phish-fusion/content_model.json".to_string()),
            url_model: Some("/var/lib/phish-fusion/url_model.json".to_string()),
            embedding_dimension: 384,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Report confident verdicts back to the ledger after analysis.
    pub auto_report: bool,
    pub min_confidence: f64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            auto_report: true,
            min_confidence: 0.8,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply the process environment on top of the file settings.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var(&self.llm.api_key_env).filter(|k| !k.trim().is_empty()) {
            self.llm.api_key = Some(key);
        }

        if let Some(value) = var("ENABLE_BLOCKCHAIN") {
            match parse_bool(&value) {
                Some(enabled) => self.reputation.enabled = enabled,
                None => log::warn!("Ignoring ENABLE_BLOCKCHAIN={value}"),
            }
        }

        if let Some(value) = var("AUTO_REPORT_CONFIDENT_CLASSIFICATIONS") {
            match parse_bool(&value) {
                Some(enabled) => self.reporting.auto_report = enabled,
                None => log::warn!("Ignoring AUTO_REPORT_CONFIDENT_CLASSIFICATIONS={value}"),
            }
        }

        if let Some(value) = var("MIN_CONFIDENCE_FOR_BLOCKCHAIN_REPORT") {
            match value.trim().parse::<f64>() {
                Ok(min) => self.reporting.min_confidence = min,
                Err(_) => log::warn!("Ignoring MIN_CONFIDENCE_FOR_BLOCKCHAIN_REPORT={value}"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), FusionError> {
        self.fusion.weights.validate()?;

        let min = self.reporting.min_confidence;
        if !(0.0..=1.0).contains(&min) {
            return Err(FusionError::Config(format!(
                "reporting.min_confidence must be within [0, 1], got {min}"
            )));
        }

        if self.reputation.read_timeout_seconds == 0 || self.reputation.write_timeout_seconds == 0
        {
            return Err(FusionError::Config(
                "reputation timeouts must be at least one second".to_string(),
            ));
        }

        match &self.reputation.backend {
            ReputationBackend::Command { program, .. } if program.trim().is_empty() => {
                return Err(FusionError::Config(
                    "reputation.backend.program must not be empty".to_string(),
                ));
            }
            ReputationBackend::Http { url } => {
                Url::parse(url).map_err(|e| {
                    FusionError::Config(format!("reputation.backend.url {url}: {e}"))
                })?;
            }
            _ => {}
        }

        if self.llm.timeout_seconds == 0 {
            return Err(FusionError::Config(
                "llm.timeout_seconds must be positive".to_string(),
            ));
        }
        if self.llm.body_char_limit == 0 {
            return Err(FusionError::Config(
                "llm.body_char_limit must be positive".to_string(),
            ));
        }
        if self.models.embedding_dimension == 0 {
            return Err(FusionError::Config(
                "models.embedding_dimension must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WeightVector;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.reputation.enabled);
        assert_eq!(config.reputation.key_mode, KeyMode::SenderAddress);
        assert_eq!(config.llm.body_char_limit, 3000);
        assert_eq!(config.reporting.min_confidence, 0.8);
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = Config::default();
        config.reputation.key_mode = KeyMode::Domain;
        config.reputation.backend = ReputationBackend::Http {
            url: "http://ledger.local:8545".to_string(),
        };
        config.fusion.weights.no_reputation = WeightVector::new(0.4, 0.1, 0.5, 0.0);

        let file = tempfile::NamedTempFile::new().unwrap();
        config.to_file(file.path()).unwrap();
        let loaded = Config::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
reputation:
  key_mode: domain
  backend:
    type: Command
    program: ledger-cli
fusion:
  weights:
    trust_ledger: { content: 0.0, url: 0.0, llm: 0.2, reputation: 0.8 }
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.reputation.key_mode, KeyMode::Domain);
        assert_eq!(config.reputation.read_timeout_seconds, 15);
        assert_eq!(
            config.reputation.backend,
            ReputationBackend::Command {
                program: "ledger-cli".to_string(),
                args: vec![],
                working_dir: None,
            }
        );
        assert_eq!(config.fusion.weights.trust_ledger.reputation, 0.8);
        assert_eq!(
            config.fusion.weights.no_reputation,
            FusionWeights::default().no_reputation
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::from_file("/nonexistent/phish-fusion.yaml").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GEMINI_API_KEY", "secret"),
            ("ENABLE_BLOCKCHAIN", "false"),
            ("AUTO_REPORT_CONFIDENT_CLASSIFICATIONS", "False"),
            ("MIN_CONFIDENCE_FOR_BLOCKCHAIN_REPORT", "0.9"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.llm.api_key.as_deref(), Some("secret"));
        assert!(!config.reputation.enabled);
        assert!(!config.reporting.auto_report);
        assert_eq!(config.reporting.min_confidence, 0.9);
    }

    #[test]
    fn test_bad_override_values_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            "ENABLE_BLOCKCHAIN" => Some("maybe".to_string()),
            "MIN_CONFIDENCE_FOR_BLOCKCHAIN_REPORT" => Some("high".to_string()),
            _ => None,
        });
        assert!(config.reputation.enabled);
        assert_eq!(config.reporting.min_confidence, 0.8);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.reporting.min_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fusion.weights.trust_ledger.reputation = -0.7;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.reputation.backend = ReputationBackend::Http {
            url: "not a url".to_string(),
        };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.reputation.read_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }
}
