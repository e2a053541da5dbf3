use super::heuristics::HeuristicFlags;
use super::PriorSignals;

const RUBRIC: &str = "\
Scoring rubric for safe_score (1.0 = safe, 0.0 = phishing):
- 0.9 to 1.0: clearly legitimate, known sender, no risky requests
- 0.7 to 0.9: probably legitimate, minor oddities only
- 0.4 to 0.7: suspicious or unclear, user should be careful
- 0.2 to 0.4: likely phishing, several strong indicators
- 0.0 to 0.2: clear phishing (credential harvesting, spoofed brand, malicious links)";

const RESPONSE_FORMAT: &str = r#"Respond with ONLY a JSON object, no other text:
{"safe_score": <number 0.0-1.0>, "reason": "<one or two sentences>", "actions": ["<recommended action>", ...]}"#;

/// Truncate to at most `limit` characters on a char boundary.
fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub struct PromptInput<'a> {
    pub sender: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    pub urls: &'a [String],
    pub flags: &'a HeuristicFlags,
    pub prior: &'a PriorSignals,
    pub body_char_limit: usize,
}

pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let body = truncate_chars(input.body, input.body_char_limit);
    let truncated = body.len() < input.body.len();

    let urls = if input.urls.is_empty() {
        "(none)".to_string()
    } else {
        input
            .urls
            .iter()
            .map(|u| format!("- {}", u))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let flags = input.flags.describe();
    let flags = if flags.is_empty() {
        "(none raised)".to_string()
    } else {
        flags
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are an email security analyst. Decide whether the following email is a phishing attempt.\n\n\
         From: {sender}\n\
         Subject: {subject}\n\n\
         Body{truncated}:\n{body}\n\n\
         Links found:\n{urls}\n\n\
         Heuristic flags:\n{flags}\n\n\
         Machine-learning signals (phishing probability, 0.5 = no information):\n\
         - content classifier: {content:.2} (confidence {content_conf:.2})\n\
         - URL classifier: {url:.2}\n\n\
         {rubric}\n\n\
         {format}",
        sender = if input.sender.is_empty() { "(unknown)" } else { input.sender },
        subject = input.subject,
        truncated = if truncated { " (truncated)" } else { "" },
        body = body,
        urls = urls,
        flags = flags,
        content = input.prior.content.probability,
        content_conf = input.prior.content.confidence,
        url = input.prior.url_probability,
        rubric = RUBRIC,
        format = RESPONSE_FORMAT,
    )
}
