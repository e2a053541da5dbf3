use crate::domain_utils::DomainUtils;
use crate::extract::{extract_domains, sender_address_domain};
use serde::Serialize;

/// Cheap lexical red flags handed to the language model as hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeuristicFlags {
    pub digits_in_domain: Vec<String>,
    pub punycode_domains: Vec<String>,
    pub random_subdomains: Vec<String>,
    /// URL domains that do not belong to the sender's domain.
    pub sender_mismatch: Vec<String>,
}

impl HeuristicFlags {
    pub fn analyze(sender: &str, urls: &[String]) -> Self {
        let sender_base = sender_address_domain(sender).map(|d| DomainUtils::base_domain(&d));
        let mut flags = Self::default();

        for domain in extract_domains(urls) {
            if DomainUtils::has_digits(&domain) {
                flags.digits_in_domain.push(domain.clone());
            }
            if DomainUtils::is_punycode(&domain) {
                flags.punycode_domains.push(domain.clone());
            }
            if let Some(label) = DomainUtils::random_looking_subdomain(&domain) {
                flags.random_subdomains.push(format!("{} ({})", domain, label));
            }
            if let Some(sender_base) = &sender_base {
                if DomainUtils::base_domain(&domain) != *sender_base {
                    flags.sender_mismatch.push(domain);
                }
            }
        }

        flags
    }

    pub fn is_empty(&self) -> bool {
        self.digits_in_domain.is_empty()
            && self.punycode_domains.is_empty()
            && self.random_subdomains.is_empty()
            && self.sender_mismatch.is_empty()
    }

    /// One line per raised flag, for the prompt.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.digits_in_domain.is_empty() {
            lines.push(format!(
                "Digits in domain name: {}",
                self.digits_in_domain.join(", ")
            ));
        }
        if !self.punycode_domains.is_empty() {
            lines.push(format!(
                "Punycode (xn--) domain, possible homograph: {}",
                self.punycode_domains.join(", ")
            ));
        }
        if !self.random_subdomains.is_empty() {
            lines.push(format!(
                "Long random-looking subdomain: {}",
                self.random_subdomains.join(", ")
            ));
        }
        if !self.sender_mismatch.is_empty() {
            lines.push(format!(
                "Link domains differ from sender domain: {}",
                self.sender_mismatch.join(", ")
            ));
        }
        lines
    }
}
