//! Risk fusion: pick a weighting policy from the ledger state and combine
//! the classifier, LLM and ledger signals into one score.

pub mod weights;

use crate::context::ServiceContext;
use crate::error::FusionError;
use crate::extract::{extract_domains, extract_urls, url_identity};
use crate::llm::PriorSignals;
use crate::reputation::find_known;
use crate::types::{
    ComponentScores, Consensus, EmailInput, FusionBranch, LlmVerdict, ReputationRecord,
    RiskBreakdown, RiskMetadata, RiskResult, NEUTRAL_SCORE, NO_ACTIONS,
};
use std::sync::Arc;

pub use weights::FusionWeights;

/// Confidence attached to a verdict taken from the ledger.
const LEDGER_VERDICT_CONFIDENCE: f64 = 0.9;

pub struct FusionEngine {
    ctx: Arc<ServiceContext>,
    weights: FusionWeights,
}

impl FusionEngine {
    pub fn new(ctx: Arc<ServiceContext>, weights: FusionWeights) -> Self {
        Self { ctx, weights }
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.ctx
    }

    /// Score one email. Never fails: if the pipeline itself breaks, the
    /// result is fully neutral with `error` set.
    pub async fn analyze(&self, input: &EmailInput) -> RiskResult {
        let ctx = Arc::clone(&self.ctx);
        let weights = self.weights;
        let owned = input.clone();

        // Run on its own task so a panicking adapter cannot take the caller down.
        let handle = tokio::spawn(async move { Self::evaluate(&ctx, &weights, &owned).await });

        match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                log::error!("Risk analysis failed: {}", e);
                RiskResult::neutral(input, e.to_string())
            }
            Err(e) => {
                log::error!("Risk analysis aborted: {}", e);
                RiskResult::neutral(input, format!("analysis aborted: {e}"))
            }
        }
    }

    async fn evaluate(
        ctx: &ServiceContext,
        weights: &FusionWeights,
        input: &EmailInput,
    ) -> Result<RiskResult, FusionError> {
        let urls = Self::collect_urls(input);
        let domains = extract_domains(&urls);
        let keys = ctx.key_mode.lookup_keys(&input.sender, &domains);
        if keys.is_empty() {
            log::debug!("No reputation key for this email, skipping ledger lookup");
        }

        let (content, url_probability, known) = tokio::join!(
            async { ctx.content.score_content(&input.body) },
            async { ctx.url.score_urls(&urls) },
            find_known(ctx.oracle.as_ref(), &keys),
        );

        let branch = match (&known, input.force_refresh) {
            (Some(_), false) => FusionBranch::TrustLedger,
            (Some(_), true) => FusionBranch::ForcedRefresh,
            (None, _) => FusionBranch::NoReputation,
        };

        let (verdict, llm_invoked) = match (&known, branch) {
            (Some((_, record)), FusionBranch::TrustLedger) => (Self::ledger_verdict(record), false),
            _ => {
                let prior = PriorSignals {
                    content,
                    url_probability,
                };
                let verdict = ctx
                    .llm
                    .judge(&input.sender, &input.subject, &input.body, &urls, &prior)
                    .await;
                (verdict, true)
            }
        };

        let (reputation_key, reputation) = match known {
            Some((key, record)) => (Some(key), record),
            None => (keys.first().cloned(), ReputationRecord::absent()),
        };

        let scores = ComponentScores {
            content: content.probability,
            url: url_probability,
            llm: verdict.risk(),
            reputation: if reputation.exists {
                reputation.consensus.risk()
            } else {
                NEUTRAL_SCORE
            },
        };
        let weights = weights.for_branch(branch).normalized();

        let raw = scores.weighted_sum(&weights);
        if !raw.is_finite() {
            return Err(FusionError::MalformedResponse(format!(
                "non-finite risk from scores {scores:?}"
            )));
        }
        let final_risk = raw.clamp(0.0, 1.0);

        log::info!(
            "Risk {:.3} via {:?} (content {:.2}, url {:.2}, llm {:.2}, ledger {:.2})",
            final_risk,
            branch,
            scores.content,
            scores.url,
            scores.llm,
            scores.reputation
        );

        Ok(RiskResult {
            final_risk,
            breakdown: RiskBreakdown {
                branch,
                weights,
                scores,
                content_confidence: content.confidence,
            },
            llm_verdict: verdict,
            metadata: RiskMetadata {
                sender: input.sender.clone(),
                urls,
                domains,
                reputation_key,
                reputation_found: reputation.exists,
                force_refresh: input.force_refresh,
                llm_invoked,
            },
            reputation,
            error: None,
        })
    }

    /// URLs from subject and body, then any the caller supplied.
    fn collect_urls(input: &EmailInput) -> Vec<String> {
        let mut urls = extract_urls(&format!("{} {}", input.subject, input.body));
        for url in &input.urls {
            let url = url.trim();
            let identity = url_identity(url);
            if !url.is_empty() && !urls.iter().any(|u| url_identity(u) == identity) {
                urls.push(url.to_string());
            }
        }
        urls
    }

    /// Verdict stood in for the LLM when the ledger is trusted.
    fn ledger_verdict(record: &ReputationRecord) -> LlmVerdict {
        let mut verdict = match record.consensus {
            Consensus::Spam => LlmVerdict::new(
                0.0,
                "Sender has prior incidents in the reputation ledger: previously reported as spam/phishing",
                vec![
                    "Do not click any links".to_string(),
                    "Delete this email".to_string(),
                    "Report as phishing".to_string(),
                ],
            ),
            _ => LlmVerdict::new(
                1.0,
                "Sender has prior history in the reputation ledger: previously confirmed legitimate",
                vec![NO_ACTIONS.to_string()],
            ),
        };
        verdict.confidence = LEDGER_VERDICT_CONFIDENCE;
        verdict
    }
}
