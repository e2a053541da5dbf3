//! Parsing of the language model's verdict.
//!
//! The reply is expected to be a single JSON object, possibly wrapped in a
//! markdown code fence. Fences are stripped once and the remainder must
//! parse strictly; anything else is a [`ParseError`] and the caller falls
//! back to the neutral verdict.

use crate::types::LlmVerdict;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("empty response")]
    Empty,

    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("safe_score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    safe_score: f64,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    actions: Vec<String>,
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n?(.*?)\s*```\s*$").expect("fence pattern is valid")
    })
}

pub struct ResponseParser;

impl ResponseParser {
    /// Remove a surrounding code fence, if any.
    pub fn strip_fences(raw: &str) -> &str {
        match fence_regex().captures(raw).and_then(|c| c.get(1)) {
            Some(inner) => inner.as_str(),
            None => raw.trim(),
        }
    }

    pub fn parse(raw: &str) -> Result<LlmVerdict, ParseError> {
        let text = Self::strip_fences(raw);
        if text.is_empty() {
            return Err(ParseError::Empty);
        }

        let verdict: RawVerdict =
            serde_json::from_str(text).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

        if !(0.0..=1.0).contains(&verdict.safe_score) {
            return Err(ParseError::ScoreOutOfRange(verdict.safe_score));
        }

        let actions = verdict
            .actions
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        Ok(LlmVerdict::new(
            verdict.safe_score,
            verdict.reason.trim(),
            actions,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NO_ACTIONS;

    #[test]
    fn test_parse_plain_json() {
        let verdict = ResponseParser::parse(
            r#"{"safe_score": 0.1, "reason": "Spoofed PayPal login", "actions": ["Do not click", "Report"]}"#,
        )
        .unwrap();
        assert_eq!(verdict.safe_score, 0.1);
        assert_eq!(verdict.reason, "Spoofed PayPal login");
        assert_eq!(verdict.actions, vec!["Do not click", "Report"]);
        assert!((verdict.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"safe_score\": 0.95, \"reason\": \"Routine newsletter\", \"actions\": []}\n```";
        let verdict = ResponseParser::parse(raw).unwrap();
        assert_eq!(verdict.safe_score, 0.95);
        assert_eq!(verdict.actions, vec![NO_ACTIONS.to_string()]);

        let raw = "```\n{\"safe_score\": 0.5}\n```\n";
        assert_eq!(ResponseParser::parse(raw).unwrap().reason, "");
    }

    #[test]
    fn test_rejects_prose_and_bad_scores() {
        assert!(matches!(
            ResponseParser::parse("This email looks safe to me."),
            Err(ParseError::InvalidJson(_))
        ));
        assert_eq!(
            ResponseParser::parse(r#"{"safe_score": 1.5}"#),
            Err(ParseError::ScoreOutOfRange(1.5))
        );
        assert!(matches!(
            ResponseParser::parse(r#"{"reason": "no score"}"#),
            Err(ParseError::InvalidJson(_))
        ));
        assert_eq!(ResponseParser::parse("  ``` ```  "), Err(ParseError::Empty));
        assert_eq!(ResponseParser::parse(""), Err(ParseError::Empty));
    }
}
