//! Shared sender-reputation ledger.
//!
//! The ledger stores a spam/ham consensus per key. Lookups are best-effort:
//! any backend failure reads as "no record" so scoring can continue.

pub mod command;
pub mod disabled;
pub mod http;

use crate::extract::{sender_address, sender_address_domain};
use crate::types::ReputationRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use command::CommandOracle;
pub use disabled::DisabledOracle;
pub use http::HttpOracle;

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONFIRMATION: &str = "Classification stored";
pub const MAX_REASON_CHARS: usize = 200;

/// Result of a ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOutcome {
    pub success: bool,
    pub message: String,
}

impl StoreOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleStatus {
    pub enabled: bool,
    pub backend: String,
    pub detail: String,
}

#[async_trait]
pub trait ReputationOracle: Send + Sync {
    /// Never fails; unreachable or confused backends yield an absent record.
    async fn lookup(&self, key: &str) -> ReputationRecord;

    async fn store(&self, key: &str, is_spam: bool, reason: &str, risk_score: f64)
        -> StoreOutcome;

    fn status(&self) -> OracleStatus;
}

/// What the ledger is keyed by. A deployment uses exactly one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    #[default]
    SenderAddress,
    Domain,
}

impl KeyMode {
    /// Keys to try, in order, when looking up an email.
    ///
    /// Domain mode checks the sender domain first and then every URL domain,
    /// each at most once.
    pub fn lookup_keys(&self, sender: &str, url_domains: &[String]) -> Vec<String> {
        match self {
            KeyMode::SenderAddress => sender_address(sender).into_iter().collect(),
            KeyMode::Domain => {
                let mut keys: Vec<String> = sender_address_domain(sender).into_iter().collect();
                for domain in url_domains {
                    let domain = domain.trim().to_lowercase();
                    if !domain.is_empty() && !keys.contains(&domain) {
                        keys.push(domain);
                    }
                }
                keys
            }
        }
    }

    /// Key an outbound report is filed under; only the sender qualifies.
    pub fn report_key(&self, sender: &str) -> Option<String> {
        match self {
            KeyMode::SenderAddress => sender_address(sender),
            KeyMode::Domain => sender_address_domain(sender),
        }
    }
}

/// Look up `keys` in order. A spam record on any key wins and ends the
/// search; otherwise the first known record is returned.
pub async fn find_known(
    oracle: &dyn ReputationOracle,
    keys: &[String],
) -> Option<(String, ReputationRecord)> {
    let mut first = None;
    for key in keys {
        let record = oracle.lookup(key).await;
        if !record.exists {
            log::debug!("Reputation: {} not found", key);
            continue;
        }
        log::info!("Reputation: {} is known {:?}", key, record.consensus);
        if record.is_spam() {
            return Some((key.clone(), record));
        }
        if first.is_none() {
            first = Some((key.clone(), record));
        }
    }
    first
}

/// Ledger reasons are capped so they fit a single on-chain field.
pub fn truncate_reason(reason: &str) -> String {
    reason.chars().take(MAX_REASON_CHARS).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::Consensus;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory ledger for pipeline tests.
    #[derive(Default)]
    pub(crate) struct MemoryOracle {
        pub records: HashMap<String, Consensus>,
        pub lookups: Mutex<Vec<String>>,
        pub stored: Mutex<Vec<(String, bool, String, f64)>>,
    }

    impl MemoryOracle {
        pub(crate) fn with(entries: &[(&str, Consensus)]) -> Self {
            Self {
                records: entries
                    .iter()
                    .map(|(k, c)| (k.to_string(), *c))
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ReputationOracle for MemoryOracle {
        async fn lookup(&self, key: &str) -> ReputationRecord {
            self.lookups.lock().unwrap().push(key.to_string());
            self.records
                .get(key)
                .map(|c| ReputationRecord::from_consensus(*c))
                .unwrap_or_default()
        }

        async fn store(
            &self,
            key: &str,
            is_spam: bool,
            reason: &str,
            risk_score: f64,
        ) -> StoreOutcome {
            self.stored
                .lock()
                .unwrap()
                .push((key.to_string(), is_spam, reason.to_string(), risk_score));
            StoreOutcome::ok(DEFAULT_CONFIRMATION)
        }

        fn status(&self) -> OracleStatus {
            OracleStatus {
                enabled: true,
                backend: "memory".to_string(),
                detail: format!("{} records", self.records.len()),
            }
        }
    }

    #[test]
    fn test_sender_address_keys() {
        let mode = KeyMode::SenderAddress;
        assert_eq!(
            mode.lookup_keys("Bank <Alerts@Bank.example>", &["evil.com".to_string()]),
            vec!["alerts@bank.example"]
        );
        assert!(mode.lookup_keys("", &["evil.com".to_string()]).is_empty());
        assert_eq!(mode.report_key("not-an-address"), None);
    }

    #[test]
    fn test_domain_keys_cover_sender_and_urls() {
        let mode = KeyMode::Domain;
        assert_eq!(
            mode.lookup_keys(
                "a@Mail.Example.com",
                &[
                    "evil.com".to_string(),
                    "mail.example.com".to_string(),
                    "Evil.com".to_string(),
                ]
            ),
            vec!["mail.example.com", "evil.com"]
        );
        let domains = vec!["evil.com".to_string(), "other.org".to_string()];
        assert_eq!(mode.lookup_keys("", &domains), domains);
        assert_eq!(mode.report_key(""), None);
    }

    #[tokio::test]
    async fn test_find_known_prefers_spam() {
        let oracle = MemoryOracle::with(&[
            ("evil.com", Consensus::Ham),
            ("other.org", Consensus::Spam),
        ]);
        let keys = vec![
            "evil.com".to_string(),
            "other.org".to_string(),
            "third.net".to_string(),
        ];
        let (key, record) = find_known(&oracle, &keys).await.unwrap();
        assert_eq!(key, "other.org");
        assert!(record.is_spam());
        assert_eq!(oracle.lookups.lock().unwrap().len(), 2);

        assert!(find_known(&oracle, &[]).await.is_none());
    }

    #[tokio::test]
    async fn test_find_known_returns_first_ham() {
        let oracle = MemoryOracle::with(&[("a.com", Consensus::Ham), ("b.com", Consensus::Ham)]);
        let keys = vec!["x.com".to_string(), "a.com".to_string(), "b.com".to_string()];
        let (key, record) = find_known(&oracle, &keys).await.unwrap();
        assert_eq!(key, "a.com");
        assert!(!record.is_spam());
        assert_eq!(oracle.lookups.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_truncate_reason() {
        assert_eq!(truncate_reason(&"x".repeat(500)).len(), MAX_REASON_CHARS);
        assert_eq!(truncate_reason("short"), "short");
    }
}
