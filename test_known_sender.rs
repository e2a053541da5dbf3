#![allow(clippy::uninlined_format_args)]

use async_trait::async_trait;
use phish_fusion::classifier::{ContentClassifier, UrlClassifier};
use phish_fusion::llm::{LanguageModel, LlmError, LlmJudge};
use phish_fusion::reputation::{OracleStatus, ReputationOracle, StoreOutcome};
use phish_fusion::types::{Consensus, ReputationRecord};
use phish_fusion::{EmailInput, FusionEngine, FusionWeights, Reporter, ServiceContext};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory ledger seeded with known verdicts.
struct StaticLedger {
    records: Mutex<HashMap<String, Consensus>>,
}

#[async_trait]
impl ReputationOracle for StaticLedger {
    async fn lookup(&self, key: &str) -> ReputationRecord {
        let records = self.records.lock().unwrap();
        records
            .get(key)
            .map(|c| ReputationRecord::from_consensus(*c))
            .unwrap_or_default()
    }

    async fn store(&self, key: &str, is_spam: bool, reason: &str, _risk: f64) -> StoreOutcome {
        println!("   ledger <- {} spam={} reason={:?}", key, is_spam, reason);
        let consensus = if is_spam { Consensus::Spam } else { Consensus::Ham };
        self.records.lock().unwrap().insert(key.to_string(), consensus);
        StoreOutcome::ok("Classification stored")
    }

    fn status(&self) -> OracleStatus {
        OracleStatus {
            enabled: true,
            backend: "static".to_string(),
            detail: "in-memory harness ledger".to_string(),
        }
    }
}

/// Always answers with the same phishing verdict.
struct CannedModel;

#[async_trait]
impl LanguageModel for CannedModel {
    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok(r#"```json
{"safe_score": 0.08, "reason": "Impersonates PayPal and links to a look-alike domain", "actions": ["Do not click the link", "Report as phishing"]}
```"#
            .to_string())
    }

    fn name(&self) -> &str {
        "canned"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("Testing ledger-aware scoring for known and unknown senders...");

    let ledger = Arc::new(StaticLedger {
        records: Mutex::new(HashMap::from([(
            "security@paypal-alerts.info".to_string(),
            Consensus::Spam,
        )])),
    });
    let ctx = Arc::new(ServiceContext::new(
        ContentClassifier::unavailable(),
        UrlClassifier::unavailable(),
        LlmJudge::new(Some(Box::new(CannedModel)), 3000),
        ledger,
    ));
    let engine = FusionEngine::new(ctx.clone(), FusionWeights::default());
    let reporter = Reporter::new(&ctx);

    let cases = [
        (
            "known spammer",
            EmailInput::new(
                "PayPal Security <security@paypal-alerts.info>",
                "Your account has been limited",
                "Restore access: http://paypa1-login.com/verify",
            ),
        ),
        (
            "known spammer, forced refresh",
            EmailInput::new(
                "PayPal Security <security@paypal-alerts.info>",
                "Your account has been limited",
                "Restore access: http://paypa1-login.com/verify",
            )
            .with_force_refresh(true),
        ),
        (
            "unknown sender",
            EmailInput::new(
                "Service <noreply@account-paypal.support>",
                "Action required",
                "Confirm your card at https://account-paypal.support/confirm",
            ),
        ),
    ];

    for (label, input) in cases {
        println!();
        println!("📧 {}", label);
        let result = engine.analyze(&input).await;
        println!("   branch: {:?}", result.breakdown.branch);
        println!("   final risk: {:.3}", result.final_risk);
        println!("   llm invoked: {}", result.metadata.llm_invoked);
        println!("   reason: {}", result.llm_verdict.reason);
        let w = result.breakdown.weights;
        println!(
            "   weights: content {:.2} url {:.2} llm {:.2} ledger {:.2}",
            w.content, w.url, w.llm, w.reputation
        );

        match reporter.auto_report(&result, &input).await {
            Some(outcome) => println!("   auto-report: {}", outcome.message),
            None => println!("   auto-report: skipped"),
        }
    }

    Ok(())
}
