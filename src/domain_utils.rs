/// Domain normalization and lexical checks shared by the extractors and the
/// LLM heuristics.
pub struct DomainUtils;

impl DomainUtils {
    /// Extract the lowercase domain part of an email address.
    pub fn extract_domain(email: &str) -> Option<String> {
        let (_, domain) = email.rsplit_once('@')?;
        let domain = domain.trim().trim_end_matches('>').trim().to_lowercase();
        if domain.is_empty() {
            None
        } else {
            Some(domain)
        }
    }

    /// Canonicalize a host: lowercase, drop `www.` and any `:port`.
    pub fn canonicalize_domain(domain: &str) -> String {
        let domain_lower = domain.trim().to_lowercase();
        let without_www = domain_lower
            .strip_prefix("www.")
            .unwrap_or(&domain_lower);
        match without_www.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host.to_string(),
            _ => without_www.to_string(),
        }
    }

    /// True if any label of the domain is IDNA-encoded.
    pub fn is_punycode(domain: &str) -> bool {
        domain
            .split('.')
            .any(|label| label.to_lowercase().starts_with("xn--"))
    }

    /// True if the registrable part of the domain contains digits.
    /// Punycode labels are skipped; their encoding carries digits anyway.
    pub fn has_digits(domain: &str) -> bool {
        Self::registrable_label(domain)
            .filter(|label| !label.to_lowercase().starts_with("xn--"))
            .map(|label| label.chars().any(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    }

    /// Last two labels, e.g. `example.com` for `mail.example.com`.
    pub fn base_domain(domain: &str) -> String {
        let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
        let start = labels.len().saturating_sub(2);
        labels[start..].join(".").to_lowercase()
    }

    /// Subdomain labels (everything left of the last two labels) that look
    /// machine generated: long, and either digit-bearing or vowel-starved.
    pub fn random_looking_subdomain(domain: &str) -> Option<String> {
        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 3 {
            return None;
        }

        labels[..labels.len() - 2]
            .iter()
            .find(|label| {
                if label.len() < 12 {
                    return false;
                }
                let digits = label.chars().filter(|c| c.is_ascii_digit()).count();
                let vowels = label
                    .chars()
                    .filter(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'))
                    .count();
                digits > 0 || (vowels as f64 / label.len() as f64) < 0.2
            })
            .map(|label| label.to_string())
    }

    /// Second-level label, e.g. `paypa1` for `login.paypa1.com`.
    fn registrable_label(domain: &str) -> Option<&str> {
        let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
        match labels.len() {
            0 => None,
            1 => Some(labels[0]),
            n => Some(labels[n - 2]),
        }
    }
}
