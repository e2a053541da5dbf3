//! Raw RFC 822 message parsing.
//!
//! Only what scoring needs: the decoded `From` and `Subject`, the readable
//! body text and any link targets hidden in HTML parts.

use crate::types::EmailInput;
use base64::{engine::general_purpose, Engine as _};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const MAX_MULTIPART_DEPTH: usize = 8;

fn encoded_word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"=\?([^?\s]+)\?([BbQq])\?([^?\s]*)\?=").expect("encoded-word pattern is valid")
    })
}

fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)href\s*=\s*["']?(https?://[^"'\s>]+)"#).expect("href pattern is valid")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"))
}

#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    /// Lower-cased header names; repeated headers keep the first value.
    pub headers: HashMap<String, String>,
    pub sender: String,
    pub subject: String,
    pub body: String,
    /// Link targets from HTML parts.
    pub html_links: Vec<String>,
}

impl ParsedMessage {
    pub fn into_email_input(self) -> EmailInput {
        EmailInput::new(self.sender, self.subject, self.body).with_urls(self.html_links)
    }
}

#[derive(Default)]
struct Collected {
    plain: Vec<String>,
    html: Vec<String>,
}

pub struct MessageParser;

impl MessageParser {
    pub fn parse(raw: &str) -> ParsedMessage {
        let raw = raw.replace("\r\n", "\n");
        let (header_block, body) = split_headers(&raw);
        let headers = parse_headers(header_block);

        let sender = headers
            .get("from")
            .or_else(|| headers.get("return-path"))
            .map(|v| decode_encoded_words(v))
            .unwrap_or_default();
        let subject = headers
            .get("subject")
            .map(|v| decode_encoded_words(v))
            .unwrap_or_default();

        let mut collected = Collected::default();
        collect_parts(&headers, body, 0, &mut collected);

        let mut html_links = Vec::new();
        for html in &collected.html {
            for cap in href_regex().captures_iter(html) {
                let link = cap[1].to_string();
                if !html_links.contains(&link) {
                    html_links.push(link);
                }
            }
        }

        let body = if !collected.plain.is_empty() {
            collected.plain.join("\n")
        } else {
            collected
                .html
                .iter()
                .map(|h| html_to_text(h))
                .collect::<Vec<_>>()
                .join("\n")
        };

        ParsedMessage {
            headers,
            sender,
            subject,
            body: body.trim().to_string(),
            html_links,
        }
    }
}

fn split_headers(message: &str) -> (&str, &str) {
    match message.find("\n\n") {
        Some(end) => (&message[..end], &message[end + 2..]),
        None if message.lines().next().is_some_and(|l| l.contains(':')) => (message, ""),
        None => ("", message),
    }
}

fn parse_headers(block: &str) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::new();
    let mut last_key: Option<String> = None;

    for line in block.lines() {
        if line.starts_with([' ', '\t']) {
            // Folded continuation of the previous header.
            if let Some(value) = last_key.as_ref().and_then(|k| headers.get_mut(k)) {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_lowercase();
            if headers.contains_key(&key) {
                last_key = None;
                continue;
            }
            headers.insert(key.clone(), value.trim().to_string());
            last_key = Some(key);
        }
    }

    headers
}

/// `(mime type, parameters)` of a Content-Type value.
fn content_type(headers: &HashMap<String, String>) -> (String, HashMap<String, String>) {
    let value = headers
        .get("content-type")
        .map(String::as_str)
        .unwrap_or("text/plain");
    let mut pieces = value.split(';');
    let mime = pieces.next().unwrap_or("").trim().to_lowercase();

    let params = pieces
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| {
            (
                k.trim().to_lowercase(),
                v.trim().trim_matches('"').to_string(),
            )
        })
        .collect();

    (mime, params)
}

fn collect_parts(
    headers: &HashMap<String, String>,
    body: &str,
    depth: usize,
    out: &mut Collected,
) {
    let (mime, params) = content_type(headers);

    if mime.starts_with("multipart/") {
        let Some(boundary) = params.get("boundary") else {
            log::debug!("multipart body without boundary, treating as text");
            out.plain.push(body.to_string());
            return;
        };
        if depth >= MAX_MULTIPART_DEPTH {
            log::warn!("MIME nesting deeper than {}, ignoring inner parts", MAX_MULTIPART_DEPTH);
            return;
        }
        for part in split_multipart(body, boundary) {
            let (part_headers, part_body) = split_headers(part);
            let part_headers = parse_headers(part_headers);
            collect_parts(&part_headers, part_body, depth + 1, out);
        }
        return;
    }

    let is_attachment = headers
        .get("content-disposition")
        .is_some_and(|d| d.to_lowercase().starts_with("attachment"));
    if is_attachment {
        return;
    }

    let decoded = decode_transfer(headers, body);
    match mime.as_str() {
        "text/plain" | "" => out.plain.push(decoded),
        "text/html" => out.html.push(decoded),
        other => log::debug!("Skipping {} part", other),
    }
}

fn split_multipart<'a>(body: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();

    for (i, chunk) in body.split(delimiter.as_str()).enumerate() {
        // Text before the first delimiter is the preamble.
        if i == 0 {
            continue;
        }
        if chunk.starts_with("--") {
            break;
        }
        parts.push(chunk.strip_prefix('\n').unwrap_or(chunk));
    }

    parts
}

fn decode_transfer(headers: &HashMap<String, String>, body: &str) -> String {
    let encoding = headers
        .get("content-transfer-encoding")
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_default();

    match encoding.as_str() {
        "base64" => {
            let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
            match general_purpose::STANDARD.decode(compact.as_bytes()) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    log::warn!("Invalid base64 body part: {}", e);
                    body.to_string()
                }
            }
        }
        "quoted-printable" => {
            String::from_utf8_lossy(&decode_quoted_printable(body)).replace("\r\n", "\n")
        }
        _ => body.to_string(),
    }
}

fn decode_quoted_printable(input: &str) -> Vec<u8> {
    match quoted_printable::decode(input.as_bytes(), quoted_printable::ParseMode::Robust) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Invalid quoted-printable content: {}", e);
            input.as_bytes().to_vec()
        }
    }
}

/// RFC 2047 "Q" words are quoted-printable with `_` standing for a space.
fn decode_q_word(text: &str) -> Vec<u8> {
    decode_quoted_printable(&text.replace('_', "=20"))
}

fn decode_charset(bytes: &[u8], charset: &str) -> String {
    match charset.to_lowercase().as_str() {
        "iso-8859-1" | "latin1" | "latin-1" | "windows-1252" | "cp1252" => {
            bytes.iter().map(|&b| b as char).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Decode RFC 2047 encoded words in a header value. Whitespace between two
/// adjacent encoded words is dropped.
pub fn decode_encoded_words(value: &str) -> String {
    let re = encoded_word_regex();
    let mut out = String::with_capacity(value.len());
    let mut last_end = 0;
    let mut previous_was_word = false;

    for caps in re.captures_iter(value) {
        let Some(whole) = caps.get(0) else { continue };
        let between = &value[last_end..whole.start()];
        if !(previous_was_word && between.trim().is_empty()) {
            out.push_str(between);
        }

        let charset = &caps[1];
        let text = &caps[3];
        let decoded = match &caps[2] {
            "B" | "b" => general_purpose::STANDARD
                .decode(text.as_bytes())
                .map(|bytes| decode_charset(&bytes, charset))
                .ok(),
            _ => Some(decode_charset(&decode_q_word(text), charset)),
        };

        match decoded {
            Some(decoded) => out.push_str(&decoded),
            None => out.push_str(whole.as_str()),
        }
        last_end = whole.end();
        previous_was_word = true;
    }

    out.push_str(&value[last_end..]);
    out
}

fn html_to_text(html: &str) -> String {
    let without_tags = tag_regex().replace_all(html, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
