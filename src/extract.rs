//! Signal extraction: URLs, URL domains and sender addresses.
//!
//! Nothing in here fails. Unparsable input yields an empty result and the
//! caller carries on with whatever else was found.

use crate::domain_utils::DomainUtils;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

fn url_regex() -> &'static Regex {
    static URL_REGEX: OnceLock<Regex> = OnceLock::new();
    URL_REGEX.get_or_init(|| {
        Regex::new(r#"(?i)(?:https?://|www\.)[^\s<>"{}|\\^`\[\]]+"#)
            .expect("URL pattern is valid")
    })
}

/// Find every `http(s)://` and bare `www.` URL in `text`.
///
/// Bare `www.` hits are prefixed with `http://`. Results are unique up to the
/// case of scheme and host, and keep the first-seen spelling and order.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for m in url_regex().find_iter(text) {
        let raw = m.as_str();
        let url = if raw.to_lowercase().starts_with("www.") {
            format!("http://{}", raw)
        } else {
            raw.to_string()
        };
        if seen.insert(url_identity(&url)) {
            urls.push(url);
        }
    }

    urls
}

/// Comparison form of a URL: scheme and host lowercased, path and query kept.
pub fn url_identity(url: &str) -> String {
    let url = url.trim();
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let host_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (host, tail) = rest.split_at(host_end);
    format!("{}://{}{}", scheme.to_lowercase(), host.to_lowercase(), tail)
}

/// Normalized host of `url`, or an empty string when there is none.
pub fn domain_of(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    match Url::parse(&candidate) {
        Ok(parsed) => parsed
            .host_str()
            .map(DomainUtils::canonicalize_domain)
            .unwrap_or_default(),
        Err(e) => {
            log::debug!("Could not parse URL {}: {}", url, e);
            String::new()
        }
    }
}

/// Unique, non-empty domains of `urls` in first-seen order.
pub fn extract_domains(urls: &[String]) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for url in urls {
        let domain = domain_of(url);
        if !domain.is_empty() && !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    domains
}

/// Bare lowercase address from a `From`-style header.
///
/// Accepts `user@domain` and `"Display Name" <user@domain>`.
pub fn sender_address(sender_header: &str) -> Option<String> {
    if !sender_header.contains('@') {
        return None;
    }

    let address = match (sender_header.rfind('<'), sender_header.rfind('>')) {
        (Some(start), Some(end)) if start < end => &sender_header[start + 1..end],
        _ => sender_header,
    };

    let address = address.trim().trim_matches(['<', '>', '"']).to_lowercase();
    if address.contains('@') {
        Some(address)
    } else {
        None
    }
}

/// Domain part of the sender address.
pub fn sender_address_domain(sender_header: &str) -> Option<String> {
    sender_address(sender_header).and_then(|address| DomainUtils::extract_domain(&address))
}
