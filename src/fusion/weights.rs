use crate::error::FusionError;
use crate::types::{FusionBranch, WeightVector};
use serde::{Deserialize, Serialize};

/// Base weights for each fusion branch, before normalisation.
///
/// Valid weights keep the trust ordering: the ledger dominates when it has a
/// record, and within every branch `llm >= content >= url`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    /// Ledger has a record and no refresh was requested.
    pub trust_ledger: WeightVector,
    /// Ledger has a record but the caller forced a fresh LLM pass.
    pub forced_refresh: WeightVector,
    /// Ledger has nothing for this email.
    pub no_reputation: WeightVector,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            trust_ledger: WeightVector::new(0.1, 0.1, 0.1, 0.7),
            forced_refresh: WeightVector::new(0.2, 0.2, 0.4, 0.2),
            no_reputation: WeightVector::new(0.3, 0.2, 0.5, 0.0),
        }
    }
}

impl FusionWeights {
    pub fn for_branch(&self, branch: FusionBranch) -> WeightVector {
        match branch {
            FusionBranch::TrustLedger => self.trust_ledger,
            FusionBranch::ForcedRefresh => self.forced_refresh,
            FusionBranch::NoReputation => self.no_reputation,
        }
    }

    pub fn validate(&self) -> Result<(), FusionError> {
        for (name, w) in [
            ("trust_ledger", &self.trust_ledger),
            ("forced_refresh", &self.forced_refresh),
            ("no_reputation", &self.no_reputation),
        ] {
            let parts = [w.content, w.url, w.llm, w.reputation];
            if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
                return Err(FusionError::Config(format!(
                    "fusion.weights.{name}: weights must be finite and non-negative"
                )));
            }
            if w.sum() <= 0.0 {
                return Err(FusionError::Config(format!(
                    "fusion.weights.{name}: at least one weight must be positive"
                )));
            }
            if !(w.llm >= w.content && w.content >= w.url) {
                return Err(FusionError::Config(format!(
                    "fusion.weights.{name}: expected llm >= content >= url"
                )));
            }
        }

        let t = &self.trust_ledger;
        if !(t.reputation > t.llm && t.reputation > t.content && t.reputation > t.url) {
            return Err(FusionError::Config(
                "fusion.weights.trust_ledger: reputation must be the largest weight".to_string(),
            ));
        }
        if self.no_reputation.reputation != 0.0 {
            return Err(FusionError::Config(
                "fusion.weights.no_reputation: reputation must be 0 without a record".to_string(),
            ));
        }
        Ok(())
    }
}
