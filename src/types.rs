use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const NEUTRAL_SCORE: f64 = 0.5;
pub const NO_ACTIONS: &str = "No actions required";

/// One email to score, as received from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailInput {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    /// URLs the caller already extracted (e.g. from HTML hrefs).
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default, alias = "force_llm")]
    pub force_refresh: bool,
}

impl EmailInput {
    pub fn new(
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
            urls: Vec::new(),
            force_refresh: false,
        }
    }

    pub fn with_urls(mut self, urls: Vec<String>) -> Self {
        self.urls = urls;
        self
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    pub probability: f64,
    pub confidence: f64,
}

impl SignalScore {
    pub fn neutral() -> Self {
        Self {
            probability: NEUTRAL_SCORE,
            confidence: NEUTRAL_SCORE,
        }
    }

    /// Score for a two-class probability; confidence is the winning class mass.
    pub fn from_probability(probability: f64) -> Self {
        let probability = probability.clamp(0.0, 1.0);
        Self {
            probability,
            confidence: probability.max(1.0 - probability),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmVerdict {
    /// 1.0 = clearly legitimate, 0.0 = clear phishing.
    pub safe_score: f64,
    pub reason: String,
    pub actions: Vec<String>,
    pub confidence: f64,
}

impl LlmVerdict {
    pub fn new(safe_score: f64, reason: impl Into<String>, actions: Vec<String>) -> Self {
        let safe_score = safe_score.clamp(0.0, 1.0);
        let actions = if actions.is_empty() {
            vec![NO_ACTIONS.to_string()]
        } else {
            actions
        };
        Self {
            safe_score,
            reason: reason.into(),
            actions,
            confidence: (safe_score - 0.5).abs() * 2.0,
        }
    }

    /// Verdict used whenever the language model cannot be consulted.
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self::new(NEUTRAL_SCORE, reason, vec![NO_ACTIONS.to_string()])
    }

    /// Phishing risk implied by the verdict.
    pub fn risk(&self) -> f64 {
        1.0 - self.safe_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consensus {
    Spam,
    Ham,
    #[default]
    Unknown,
}

impl Consensus {
    /// Risk contribution of a ledger consensus.
    pub fn risk(&self) -> f64 {
        match self {
            Consensus::Spam => 1.0,
            Consensus::Ham => 0.0,
            Consensus::Unknown => NEUTRAL_SCORE,
        }
    }

    /// Parse the ledger's machine-readable token.
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "SPAM" => Consensus::Spam,
            "HAM" => Consensus::Ham,
            _ => Consensus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub exists: bool,
    pub consensus: Consensus,
    pub reputation_score: u8,
    pub from_prior_incident: bool,
}

impl ReputationRecord {
    pub fn absent() -> Self {
        Self {
            exists: false,
            consensus: Consensus::Unknown,
            reputation_score: 50,
            from_prior_incident: false,
        }
    }

    /// Record for a key the ledger has a verdict on. Unknown tokens are absent.
    pub fn from_consensus(consensus: Consensus) -> Self {
        match consensus {
            Consensus::Spam => Self {
                exists: true,
                consensus,
                reputation_score: 10,
                from_prior_incident: true,
            },
            Consensus::Ham => Self {
                exists: true,
                consensus,
                reputation_score: 90,
                from_prior_incident: true,
            },
            Consensus::Unknown => Self::absent(),
        }
    }

    pub fn is_spam(&self) -> bool {
        self.exists && self.consensus == Consensus::Spam
    }
}

impl Default for ReputationRecord {
    fn default() -> Self {
        Self::absent()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub content: f64,
    pub url: f64,
    pub llm: f64,
    pub reputation: f64,
}

impl WeightVector {
    pub const fn new(content: f64, url: f64, llm: f64, reputation: f64) -> Self {
        Self {
            content,
            url,
            llm,
            reputation,
        }
    }

    pub fn sum(&self) -> f64 {
        self.content + self.url + self.llm + self.reputation
    }

    /// Scale so the components sum to 1. Negative components count as zero;
    /// an all-zero vector falls back to equal weights.
    pub fn normalized(&self) -> Self {
        let clamped = Self::new(
            self.content.max(0.0),
            self.url.max(0.0),
            self.llm.max(0.0),
            self.reputation.max(0.0),
        );
        let total = clamped.sum();
        if total <= f64::EPSILON || !total.is_finite() {
            return Self::new(0.25, 0.25, 0.25, 0.25);
        }
        Self::new(
            clamped.content / total,
            clamped.url / total,
            clamped.llm / total,
            clamped.reputation / total,
        )
    }
}

/// Probability contributed by each source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub content: f64,
    pub url: f64,
    pub llm: f64,
    pub reputation: f64,
}

impl ComponentScores {
    pub fn neutral() -> Self {
        Self {
            content: NEUTRAL_SCORE,
            url: NEUTRAL_SCORE,
            llm: NEUTRAL_SCORE,
            reputation: NEUTRAL_SCORE,
        }
    }

    pub fn weighted_sum(&self, weights: &WeightVector) -> f64 {
        weights.content * self.content
            + weights.url * self.url
            + weights.llm * self.llm
            + weights.reputation * self.reputation
    }
}

/// Which of the three weighting policies applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionBranch {
    TrustLedger,
    ForcedRefresh,
    NoReputation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub branch: FusionBranch,
    pub weights: WeightVector,
    pub scores: ComponentScores,
    pub content_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskMetadata {
    pub sender: String,
    pub urls: Vec<String>,
    pub domains: Vec<String>,
    pub reputation_key: Option<String>,
    pub reputation_found: bool,
    pub force_refresh: bool,
    pub llm_invoked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResult {
    pub final_risk: f64,
    pub breakdown: RiskBreakdown,
    pub llm_verdict: LlmVerdict,
    pub reputation: ReputationRecord,
    pub metadata: RiskMetadata,
    pub error: Option<String>,
}

impl RiskResult {
    /// Fully neutral result returned when the pipeline itself fails.
    pub fn neutral(input: &EmailInput, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            final_risk: NEUTRAL_SCORE,
            breakdown: RiskBreakdown {
                branch: FusionBranch::NoReputation,
                weights: WeightVector::new(0.25, 0.25, 0.25, 0.25),
                scores: ComponentScores::neutral(),
                content_confidence: NEUTRAL_SCORE,
            },
            llm_verdict: LlmVerdict::new(
                NEUTRAL_SCORE,
                format!("Error: {}", error),
                vec!["Analysis failed".to_string()],
            ),
            reputation: ReputationRecord::absent(),
            metadata: RiskMetadata {
                sender: input.sender.clone(),
                force_refresh: input.force_refresh,
                ..Default::default()
            },
            error: Some(error),
        }
    }

    /// Outer wire payload: `{final_risk, details: {...}, error?}`.
    pub fn to_wire(&self) -> Value {
        let scores = &self.breakdown.scores;
        let mut payload = json!({
            "final_risk": self.final_risk,
            "details": {
                "content_prob": scores.content,
                "content_conf": self.breakdown.content_confidence,
                "url_prob": scores.url,
                "ml_score": (scores.content + scores.url) / 2.0,
                "llm_score": scores.llm,
                "llm_safe_score": self.llm_verdict.safe_score,
                "llm_conf": self.llm_verdict.confidence,
                "llm_reason": self.llm_verdict.reason,
                "llm_actions": self.llm_verdict.actions,
                "weights": self.breakdown.weights,
                "branch": self.breakdown.branch,
                "reputation_risk": scores.reputation,
                "reputation_signals": {
                    "reputation_available": self.metadata.reputation_found,
                    "key": self.metadata.reputation_key,
                    "record": self.reputation,
                    "from_previous_incident": self.reputation.from_prior_incident,
                },
                "urls": self.metadata.urls,
                "domains": self.metadata.domains,
                "sender": self.metadata.sender,
                "force_refresh_used": self.metadata.force_refresh,
                "llm_invoked": self.metadata.llm_invoked,
            }
        });
        if let Some(error) = &self.error {
            payload["error"] = Value::String(error.clone());
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_confidence_derived() {
        let verdict = LlmVerdict::new(0.95, "fine", vec![]);
        assert!((verdict.confidence - 0.9).abs() < 1e-9);
        assert_eq!(verdict.actions, vec![NO_ACTIONS.to_string()]);

        let neutral = LlmVerdict::neutral("LLM not available");
        assert_eq!(neutral.confidence, 0.0);
        assert_eq!(neutral.risk(), 0.5);
    }

    #[test]
    fn test_normalized_weights_sum_to_one() {
        for w in [
            WeightVector::new(0.1, 0.1, 0.1, 0.7),
            WeightVector::new(0.2, 0.2, 0.4, 0.2),
            WeightVector::new(0.3, 0.2, 0.5, 0.0),
            WeightVector::new(3.0, 1.0, 0.0, 0.0),
            WeightVector::new(0.0, 0.0, 0.0, 0.0),
            WeightVector::new(-1.0, 1.0, 1.0, 0.0),
        ] {
            let n = w.normalized();
            assert!((n.sum() - 1.0).abs() < 1e-9, "{:?}", w);
            assert!(n.content >= 0.0 && n.url >= 0.0 && n.llm >= 0.0 && n.reputation >= 0.0);
        }
    }

    #[test]
    fn test_reputation_record_from_token() {
        let spam = ReputationRecord::from_consensus(Consensus::from_token("SPAM\n"));
        assert!(spam.exists && spam.is_spam());
        assert_eq!(spam.reputation_score, 10);

        let ham = ReputationRecord::from_consensus(Consensus::from_token("HAM"));
        assert!(ham.exists && !ham.is_spam());
        assert_eq!(ham.reputation_score, 90);

        let unknown = ReputationRecord::from_consensus(Consensus::from_token("Not found"));
        assert!(!unknown.exists);
    }

    #[test]
    fn test_input_accepts_legacy_force_flag() {
        let input: EmailInput =
            serde_json::from_str(r#"{"sender":"a@b.com","force_llm":true}"#).unwrap();
        assert!(input.force_refresh);
        assert!(input.body.is_empty());
        assert!(input.urls.is_empty());
    }

    #[test]
    fn test_wire_payload_carries_error() {
        let input = EmailInput::new("", "", "");
        let wire = RiskResult::neutral(&input, "boom").to_wire();
        assert_eq!(wire["final_risk"], 0.5);
        assert_eq!(wire["error"], "boom");
        assert_eq!(wire["details"]["llm_actions"][0], "Analysis failed");
    }
}
