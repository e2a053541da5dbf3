//! Writing verdicts back to the reputation ledger.

use crate::config::ReportingConfig;
use crate::context::ServiceContext;
use crate::error::FusionError;
use crate::extract::sender_address;
use crate::reputation::{truncate_reason, KeyMode, ReputationOracle, StoreOutcome};
use crate::types::{EmailInput, RiskResult};
use std::sync::Arc;

pub struct Reporter {
    oracle: Arc<dyn ReputationOracle>,
    key_mode: KeyMode,
    settings: ReportingConfig,
}

impl Reporter {
    pub fn new(ctx: &ServiceContext) -> Self {
        Self {
            oracle: Arc::clone(&ctx.oracle),
            key_mode: ctx.key_mode,
            settings: ctx.reporting.clone(),
        }
    }

    /// Report a confident verdict for the sender. Returns `None` when
    /// nothing was sent: reporting disabled, forced refresh, no usable
    /// sender, or confidence under the threshold.
    pub async fn auto_report(
        &self,
        result: &RiskResult,
        input: &EmailInput,
    ) -> Option<StoreOutcome> {
        if !self.settings.auto_report {
            log::debug!("Auto-reporting to ledger is disabled");
            return None;
        }
        // A forced refresh is a second opinion on an already-reported sender.
        if input.force_refresh {
            return None;
        }
        if result.error.is_some() {
            return None;
        }
        let Some(key) = self.key_mode.report_key(&input.sender) else {
            log::info!("No usable sender for auto-reporting");
            return None;
        };

        let threshold = self.settings.min_confidence;
        let risk = result.final_risk;
        let is_spam = risk >= threshold;
        let confidence = if is_spam { risk } else { 1.0 - risk };
        if confidence < threshold {
            log::info!(
                "Confidence {:.2} below threshold {}, not reporting to ledger",
                confidence,
                threshold
            );
            return None;
        }

        let reason = Self::auto_reason(
            is_spam,
            confidence,
            &result.llm_verdict.reason,
            &input.sender,
        );
        log::info!(
            "Auto-reporting {} as {}",
            key,
            if is_spam { "spam/phishing" } else { "legitimate" }
        );

        let outcome = self.oracle.store(&key, is_spam, &reason, risk).await;
        if outcome.success {
            log::info!("Reported {} to ledger", key);
        } else {
            log::warn!("Failed to report {} to ledger: {}", key, outcome.message);
        }
        Some(outcome)
    }

    fn auto_reason(is_spam: bool, confidence: f64, llm_reason: &str, sender: &str) -> String {
        let kind = if is_spam { "spam/phishing" } else { "legitimate" };
        let mut reason = format!("System classification: {kind} (confidence: {confidence:.2})");
        if !llm_reason.is_empty() {
            reason.push_str(" - ");
            reason.push_str(&truncate_reason(llm_reason));
        }
        if !sender.is_empty() {
            reason.push_str(" - From: ");
            reason.push_str(sender);
        }
        reason
    }

    /// A user marking an email as spam or legitimate.
    pub async fn report_feedback(
        &self,
        sender: &str,
        is_spam: bool,
        reason: &str,
        final_risk: Option<f64>,
    ) -> Result<StoreOutcome, FusionError> {
        if !sender.contains('@') {
            return Err(FusionError::InputMalformed(format!(
                "sender {sender:?} is not an email address"
            )));
        }
        let key = match self.key_mode.report_key(sender) {
            Some(key) => key,
            None => sender_address(sender).ok_or_else(|| {
                FusionError::InputMalformed(format!("cannot derive a key from {sender:?}"))
            })?,
        };
        let risk = final_risk.unwrap_or(if is_spam { 0.9 } else { 0.1 });

        log::info!(
            "User feedback: {} -> {}",
            key,
            if is_spam { "spam" } else { "ham" }
        );
        Ok(self.oracle.store(&key, is_spam, reason, risk).await)
    }

    /// Admin classification of explicit keys, one outcome per key.
    pub async fn report_keys(
        &self,
        keys: &[String],
        is_spam: bool,
        reason: &str,
    ) -> Vec<(String, StoreOutcome)> {
        let risk = if is_spam { 0.9 } else { 0.1 };
        let mut outcomes = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            log::info!(
                "Manual admin classification: {} -> {}",
                key,
                if is_spam { "spam" } else { "ham" }
            );
            let outcome = self.oracle.store(&key, is_spam, reason, risk).await;
            outcomes.push((key, outcome));
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ContentClassifier, UrlClassifier};
    use crate::llm::LlmJudge;
    use crate::reputation::tests::MemoryOracle;
    use crate::types::LlmVerdict;

    fn reporter(oracle: Arc<MemoryOracle>, settings: ReportingConfig, mode: KeyMode) -> Reporter {
        let ctx = ServiceContext::new(
            ContentClassifier::unavailable(),
            UrlClassifier::unavailable(),
            LlmJudge::unavailable(),
            oracle,
        )
        .with_key_mode(mode)
        .with_reporting(settings);
        Reporter::new(&ctx)
    }

    fn result_with_risk(input: &EmailInput, risk: f64) -> RiskResult {
        let mut result = RiskResult::neutral(input, "");
        result.error = None;
        result.final_risk = risk;
        result.llm_verdict = LlmVerdict::new(1.0 - risk, "Spoofed bank login page", vec![]);
        result
    }

    #[tokio::test]
    async fn test_auto_report_confident_spam() {
        let oracle = Arc::new(MemoryOracle::default());
        let reporter = reporter(oracle.clone(), ReportingConfig::default(), KeyMode::SenderAddress);
        let input = EmailInput::new("Bank <Alerts@Evil.com>", "Locked", "Click here");

        let outcome = reporter
            .auto_report(&result_with_risk(&input, 0.93), &input)
            .await
            .unwrap();
        assert!(outcome.success);

        let stored = oracle.stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        let (key, is_spam, reason, risk) = &stored[0];
        assert_eq!(key, "alerts@evil.com");
        assert!(*is_spam);
        assert_eq!(*risk, 0.93);
        assert_eq!(
            reason,
            "System classification: spam/phishing (confidence: 0.93) - Spoofed bank login page - From: Bank <Alerts@Evil.com>"
        );
    }

    #[tokio::test]
    async fn test_auto_report_confident_ham() {
        let oracle = Arc::new(MemoryOracle::default());
        let reporter = reporter(oracle.clone(), ReportingConfig::default(), KeyMode::Domain);
        let input = EmailInput::new("news@shop.example", "Sale", "Weekly deals");

        assert!(reporter
            .auto_report(&result_with_risk(&input, 0.1), &input)
            .await
            .is_some());
        let stored = oracle.stored.lock().unwrap();
        assert_eq!(stored[0].0, "shop.example");
        assert!(!stored[0].1);
        assert!(stored[0].2.starts_with("System classification: legitimate (confidence: 0.90)"));
    }

    #[tokio::test]
    async fn test_auto_report_skips() {
        let oracle = Arc::new(MemoryOracle::default());
        let reporter = reporter(oracle.clone(), ReportingConfig::default(), KeyMode::SenderAddress);
        let input = EmailInput::new("a@b.com", "", "");

        // Uncertain.
        assert!(reporter
            .auto_report(&result_with_risk(&input, 0.5), &input)
            .await
            .is_none());
        // Just below the spam threshold is neither spam nor confidently ham.
        assert!(reporter
            .auto_report(&result_with_risk(&input, 0.79), &input)
            .await
            .is_none());
        // Forced refresh.
        let forced = input.clone().with_force_refresh(true);
        assert!(reporter
            .auto_report(&result_with_risk(&forced, 0.95), &forced)
            .await
            .is_none());
        // No sender.
        let anonymous = EmailInput::new("", "", "");
        assert!(reporter
            .auto_report(&result_with_risk(&anonymous, 0.95), &anonymous)
            .await
            .is_none());
        assert!(oracle.stored.lock().unwrap().is_empty());

        let disabled = reporter_with_auto_off(oracle.clone());
        assert!(disabled
            .auto_report(&result_with_risk(&input, 0.99), &input)
            .await
            .is_none());
    }

    fn reporter_with_auto_off(oracle: Arc<MemoryOracle>) -> Reporter {
        let settings = ReportingConfig {
            auto_report: false,
            ..Default::default()
        };
        reporter(oracle, settings, KeyMode::SenderAddress)
    }

    #[tokio::test]
    async fn test_report_feedback() {
        let oracle = Arc::new(MemoryOracle::default());
        let reporter = reporter(oracle.clone(), ReportingConfig::default(), KeyMode::SenderAddress);

        let outcome = reporter
            .report_feedback("Spammer <x@spam.test>", true, "User reported", None)
            .await
            .unwrap();
        assert!(outcome.success);
        reporter
            .report_feedback("friend@ok.test", false, "Not spam", Some(0.2))
            .await
            .unwrap();

        let stored = oracle.stored.lock().unwrap();
        assert_eq!(stored[0].0, "x@spam.test");
        assert_eq!(stored[0].3, 0.9);
        assert_eq!(stored[1].3, 0.2);

        drop(stored);
        let err = reporter
            .report_feedback("not-an-address", true, "x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, FusionError::InputMalformed(_)));
    }

    #[tokio::test]
    async fn test_report_keys_one_outcome_each() {
        let oracle = Arc::new(MemoryOracle::default());
        let reporter = reporter(oracle.clone(), ReportingConfig::default(), KeyMode::Domain);
        let keys = vec![
            "Evil.com".to_string(),
            " ".to_string(),
            "worse.net".to_string(),
        ];
        let outcomes = reporter.report_keys(&keys, true, "Manual admin classification").await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, "evil.com");
        assert!(outcomes.iter().all(|(_, o)| o.success));
        assert_eq!(oracle.stored.lock().unwrap().len(), 2);
    }
}
