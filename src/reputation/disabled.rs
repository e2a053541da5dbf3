use super::{OracleStatus, ReputationOracle, StoreOutcome};
use crate::types::ReputationRecord;
use async_trait::async_trait;

/// Stand-in used when the ledger is switched off.
pub struct DisabledOracle;

#[async_trait]
impl ReputationOracle for DisabledOracle {
    async fn lookup(&self, _key: &str) -> ReputationRecord {
        ReputationRecord::absent()
    }

    async fn store(&self, key: &str, _is_spam: bool, _reason: &str, _risk: f64) -> StoreOutcome {
        log::debug!("Ledger disabled, not storing {}", key);
        StoreOutcome::failed("ledger disabled")
    }

    fn status(&self) -> OracleStatus {
        OracleStatus {
            enabled: false,
            backend: "disabled".to_string(),
            detail: "reputation.enabled is false".to_string(),
        }
    }
}
