use super::{
    truncate_reason, OracleStatus, ReputationOracle, StoreOutcome, DEFAULT_CONFIRMATION,
    DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT,
};
use crate::types::{Consensus, ReputationRecord};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
enum RunError {
    #[error("failed to run ledger tool: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ledger tool timed out after {0:?}")]
    Timeout(Duration),
}

/// Ledger reached through an external command-line tool.
///
/// The tool is invoked as `program [args...] query <key>` and
/// `program [args...] classify <key> <true|false> <reason>`. Only the last
/// line of a query's stdout is significant; everything above it is
/// diagnostics.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    read_timeout: Duration,
    write_timeout: Duration,
    confirmation: String,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            confirmation: DEFAULT_CONFIRMATION.to_string(),
        }
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    pub fn with_confirmation(mut self, marker: impl Into<String>) -> Self {
        self.confirmation = marker.into();
        self
    }

    async fn run(&self, extra: &[&str], limit: Duration) -> Result<Output, RunError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        // Dropping the output future on timeout kills the child.
        match tokio::time::timeout(limit, cmd.output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(RunError::Timeout(limit)),
        }
    }

    fn last_line(stdout: &[u8]) -> String {
        String::from_utf8_lossy(stdout)
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl ReputationOracle for CommandOracle {
    async fn lookup(&self, key: &str) -> ReputationRecord {
        let output = match self.run(&["query", key], self.read_timeout).await {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Ledger query failed for {}: {}", key, e);
                return ReputationRecord::absent();
            }
        };

        if !output.status.success() {
            log::warn!(
                "Ledger query for {} exited with {}: {}",
                key,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return ReputationRecord::absent();
        }

        let token = Self::last_line(&output.stdout);
        let consensus = Consensus::from_token(&token);
        if consensus == Consensus::Unknown {
            log::debug!("Ledger has no verdict for {} ({:?})", key, token);
        }
        ReputationRecord::from_consensus(consensus)
    }

    async fn store(&self, key: &str, is_spam: bool, reason: &str, risk_score: f64) -> StoreOutcome {
        let reason = truncate_reason(reason);
        let flag = if is_spam { "true" } else { "false" };
        log::info!(
            "Reporting {} to ledger as {} (risk {:.2})",
            key,
            if is_spam { "SPAM" } else { "HAM" },
            risk_score
        );

        let output = match self
            .run(&["classify", key, flag, &reason], self.write_timeout)
            .await
        {
            Ok(output) => output,
            Err(RunError::Timeout(limit)) => {
                log::error!("Ledger write for {} timed out after {:?}", key, limit);
                return StoreOutcome::failed(format!(
                    "timed out after {}s; the transaction may still complete in background",
                    limit.as_secs()
                ));
            }
            Err(e) => {
                log::error!("Ledger write for {} failed: {}", key, e);
                return StoreOutcome::failed(e.to_string());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() && stdout.contains(&self.confirmation) {
            log::info!("Ledger stored classification for {}", key);
            return StoreOutcome::ok(Self::last_line(&output.stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        let message = if detail.is_empty() {
            format!("ledger tool exited with {} without confirmation", output.status)
        } else {
            truncate_reason(detail)
        };
        log::error!("Ledger write for {} not confirmed: {}", key, message);
        StoreOutcome::failed(message)
    }

    fn status(&self) -> OracleStatus {
        let mut detail = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(dir) = &self.working_dir {
            detail.push_str(&format!(" (in {})", dir.display()));
        }
        OracleStatus {
            enabled: true,
            backend: "command".to_string(),
            detail,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// Oracle backed by an inline shell script; `$1` is the verb.
    fn script(body: &str) -> CommandOracle {
        CommandOracle::new(
            "sh",
            vec!["-c".to_string(), body.to_string(), "ledger".to_string()],
        )
    }

    #[tokio::test]
    async fn test_query_reads_last_line_only() {
        let oracle = script("echo 'connecting to node...'; echo 'HAM is not this'; echo SPAM");
        let record = oracle.lookup("bad@evil.com").await;
        assert!(record.exists);
        assert!(record.is_spam());

        let oracle = script("echo SPAM; echo 'UNKNOWN'");
        assert!(!oracle.lookup("x@y.com").await.exists);
    }

    #[tokio::test]
    async fn test_query_receives_key() {
        let oracle = script(r#"if [ "$1" = query ] && [ "$2" = "ok@good.com" ]; then echo HAM; fi"#);
        let record = oracle.lookup("ok@good.com").await;
        assert!(record.exists);
        assert_eq!(record.consensus, Consensus::Ham);
        assert!(!oracle.lookup("other@good.com").await.exists);
    }

    #[tokio::test]
    async fn test_query_failure_is_absent() {
        let oracle = script("echo SPAM; exit 3");
        assert!(!oracle.lookup("a@b.com").await.exists);

        let oracle = CommandOracle::new("/nonexistent/ledger-tool", vec![]);
        assert!(!oracle.lookup("a@b.com").await.exists);
    }

    #[tokio::test]
    async fn test_query_timeout_is_absent() {
        let oracle = script("sleep 5; echo SPAM")
            .with_timeouts(Duration::from_millis(200), Duration::from_millis(200));
        let started = std::time::Instant::now();
        assert!(!oracle.lookup("slow@b.com").await.exists);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_classify_requires_confirmation() {
        let oracle = script(
            r#"[ "$1" = classify ] && [ "$3" = true ] && echo "Classification stored for $2""#,
        );
        let outcome = oracle.store("bad@evil.com", true, "phishing", 0.95).await;
        assert!(outcome.success, "{}", outcome.message);

        let outcome = oracle.store("bad@evil.com", false, "legit", 0.05).await;
        assert!(!outcome.success);

        let oracle = script("echo 'tx sent'").with_confirmation("Transaction confirmed");
        assert!(!oracle.store("a@b.com", true, "x", 0.9).await.success);
    }

    #[tokio::test]
    async fn test_classify_timeout_message() {
        let oracle = script("sleep 5").with_timeouts(Duration::from_secs(1), Duration::from_millis(200));
        let outcome = oracle.store("a@b.com", true, "x", 0.9).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("may still complete in background"));
    }

    #[tokio::test]
    async fn test_classify_reason_truncated() {
        let oracle = script(r#"echo "Classification stored"; echo "${#4}""#);
        let outcome = oracle.store("a@b.com", true, &"r".repeat(450), 0.9).await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "200");
    }
}
