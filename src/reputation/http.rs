use super::{
    truncate_reason, OracleStatus, ReputationOracle, StoreOutcome, DEFAULT_READ_TIMEOUT,
    DEFAULT_WRITE_TIMEOUT,
};
use crate::types::{Consensus, ReputationRecord};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    classification: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    key: &'a str,
    is_spam: bool,
    reason: &'a str,
    risk_score: f64,
}

#[derive(Debug, Default, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
}

/// Ledger behind a small REST gateway.
pub struct HttpOracle {
    client: Client,
    base: Url,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl HttpOracle {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let mut base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            anyhow::bail!("reputation endpoint {} cannot be used as a base URL", base_url);
        }
        // Normalise so path segments append rather than replace.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(concat!("phish-fusion/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        })
    }

    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    fn lookup_url(&self, key: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("reputation").push(key);
        }
        url
    }

    fn classify_url(&self) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("classify");
        }
        url
    }
}

#[async_trait]
impl ReputationOracle for HttpOracle {
    async fn lookup(&self, key: &str) -> ReputationRecord {
        let response = match self
            .client
            .get(self.lookup_url(key))
            .timeout(self.read_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Ledger query failed for {}: {}", key, e);
                return ReputationRecord::absent();
            }
        };

        if response.status() == StatusCode::NOT_FOUND {
            log::debug!("Ledger has no record for {}", key);
            return ReputationRecord::absent();
        }
        if !response.status().is_success() {
            log::warn!("Ledger query for {} returned {}", key, response.status());
            return ReputationRecord::absent();
        }

        match response.json::<LookupResponse>().await {
            Ok(body) => body
                .classification
                .map(|c| ReputationRecord::from_consensus(Consensus::from_token(&c.to_uppercase())))
                .unwrap_or_default(),
            Err(e) => {
                log::warn!("Ledger query for {} returned unreadable body: {}", key, e);
                ReputationRecord::absent()
            }
        }
    }

    async fn store(&self, key: &str, is_spam: bool, reason: &str, risk_score: f64) -> StoreOutcome {
        let reason = truncate_reason(reason);
        let request = ClassifyRequest {
            key,
            is_spam,
            reason: &reason,
            risk_score,
        };

        let response = match self
            .client
            .post(self.classify_url())
            .timeout(self.write_timeout)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                log::error!("Ledger write for {} timed out", key);
                return StoreOutcome::failed(
                    "request timed out; the transaction may still complete in background",
                );
            }
            Err(e) => {
                log::error!("Ledger write for {} failed: {}", key, e);
                return StoreOutcome::failed(e.to_string());
            }
        };

        let status = response.status();
        let body: ClassifyResponse = response.json().await.unwrap_or_default();
        if status.is_success() && body.success {
            log::info!("Ledger stored classification for {}", key);
            StoreOutcome::ok(body.message)
        } else {
            let message = if body.message.is_empty() {
                format!("ledger gateway returned {}", status)
            } else {
                body.message
            };
            log::error!("Ledger write for {} not confirmed: {}", key, message);
            StoreOutcome::failed(message)
        }
    }

    fn status(&self) -> OracleStatus {
        OracleStatus {
            enabled: true,
            backend: "http".to_string(),
            detail: self.base.to_string(),
        }
    }
}
