use super::{LogisticModel, ProbabilityModel};
use crate::types::NEUTRAL_SCORE;
use std::path::Path;
use url::Url;

const SPECIAL_CHARS: [char; 17] = [
    '.', '-', '_', '/', '?', '=', '@', '&', '!', ' ', '~', ',', '+', '*', '#', '$', '%',
];

/// Length of the vector produced by [`url_features`].
pub const URL_FEATURE_LEN: usize = 96;

fn push_char_counts(features: &mut Vec<f64>, s: &str) {
    for ch in SPECIAL_CHARS {
        features.push(s.matches(ch).count() as f64);
    }
}

fn is_ipv4_literal(host: &str) -> bool {
    let parts: Vec<&str> = host.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.len() <= 3 && p.chars().all(|c| c.is_ascii_digit()))
}

/// Lexical and structural counts for one URL, in training order:
/// URL block, domain block, directory block, file block, parameter block.
pub fn url_features(url: &str) -> Option<Vec<f64>> {
    let candidate = if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    };
    let parsed = Url::parse(&candidate).ok()?;

    let domain = parsed.host_str().unwrap_or("").to_string();
    let path = parsed.path().to_string();
    let query = parsed.query().unwrap_or("").to_string();
    let file_name = path.rsplit('/').next().unwrap_or("").to_string();

    let mut features = Vec::with_capacity(URL_FEATURE_LEN);

    // URL
    push_char_counts(&mut features, url);
    features.push(url.len() as f64);

    // Domain
    push_char_counts(&mut features, &domain);
    features.push(
        domain
            .chars()
            .filter(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
            .count() as f64,
    );
    features.push(domain.len() as f64);
    features.push(if is_ipv4_literal(&domain) { 1.0 } else { 0.0 });
    features.push(if domain.contains("client") || domain.contains("server") {
        1.0
    } else {
        0.0
    });

    // Directory
    push_char_counts(&mut features, &path);
    features.push(path.len() as f64);

    // File
    push_char_counts(&mut features, &file_name);
    features.push(file_name.len() as f64);

    // Parameters
    push_char_counts(&mut features, &query);
    features.push(query.len() as f64);
    features.push(
        if [".com", ".org", ".net"].iter().any(|tld| query.contains(tld)) {
            1.0
        } else {
            0.0
        },
    );
    features.push(if query.is_empty() {
        0.0
    } else {
        query.split('&').count() as f64
    });
    features.push(if url.contains("mailto:") || url.contains("email=") {
        1.0
    } else {
        0.0
    });

    debug_assert_eq!(features.len(), URL_FEATURE_LEN);
    Some(features)
}

/// Per-URL phishing classifier averaged across a message's links.
pub struct UrlClassifier {
    model: Option<Box<dyn ProbabilityModel>>,
}

impl UrlClassifier {
    pub fn new(model: Option<Box<dyn ProbabilityModel>>) -> Self {
        if let Some(model) = &model {
            if model.input_len() != URL_FEATURE_LEN {
                log::warn!(
                    "URL model expects {} features, extractor produces {}",
                    model.input_len(),
                    URL_FEATURE_LEN
                );
            }
        }
        Self { model }
    }

    pub fn unavailable() -> Self {
        Self::new(None)
    }

    pub fn load<P: AsRef<Path>>(model_path: Option<P>) -> Self {
        let model = model_path.and_then(|path| match LogisticModel::from_file(&path) {
            Ok(model) => {
                log::info!("Loaded URL model from {}", path.as_ref().display());
                Some(Box::new(model) as Box<dyn ProbabilityModel>)
            }
            Err(e) => {
                log::error!("Failed to load URL model: {}", e);
                None
            }
        });
        Self::new(model)
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    /// Mean phishing probability over `urls`; 0.5 when there is nothing to
    /// score. A URL that cannot be scored counts as 0.5.
    pub fn score_urls(&self, urls: &[String]) -> f64 {
        if urls.is_empty() {
            return NEUTRAL_SCORE;
        }
        let Some(model) = &self.model else {
            return NEUTRAL_SCORE;
        };

        let scores: Vec<f64> = urls
            .iter()
            .map(|url| {
                let Some(features) = url_features(url) else {
                    log::warn!("Could not extract features from URL {}", url);
                    return NEUTRAL_SCORE;
                };
                match model.predict_probability(&features) {
                    Ok(p) => p.clamp(0.0, 1.0),
                    Err(e) => {
                        log::error!("Error analyzing URL {}: {}", url, e);
                        NEUTRAL_SCORE
                    }
                }
            })
            .collect();

        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;

    /// Scores by domain length so different URLs get different probabilities.
    struct DomainLengthModel;

    impl ProbabilityModel for DomainLengthModel {
        fn predict_probability(&self, features: &[f64]) -> Result<f64, ModelError> {
            // Domain length sits right after the domain char counts and vowels.
            let domain_len = features[18 + 17 + 1];
            Ok(if domain_len > 10.0 { 0.9 } else { 0.1 })
        }

        fn input_len(&self) -> usize {
            URL_FEATURE_LEN
        }
    }

    #[test]
    fn test_feature_vector_shape() {
        let features = url_features("http://192.168.0.1/login/verify.php?user=a&email=b.com").unwrap();
        assert_eq!(features.len(), URL_FEATURE_LEN);
        // IPv4 flag
        assert_eq!(features[18 + 17 + 2], 1.0);
        // Last field: mailto/email flag
        assert_eq!(features[URL_FEATURE_LEN - 1], 1.0);
        // Parameter count
        assert_eq!(features[URL_FEATURE_LEN - 2], 2.0);
    }

    #[test]
    fn test_unparsable_url_has_no_features() {
        assert!(url_features("http://[broken").is_none());
    }

    #[test]
    fn test_mean_of_per_url_scores() {
        let classifier = UrlClassifier::new(Some(Box::new(DomainLengthModel)));
        let urls = vec![
            "http://a.com".to_string(),
            "http://very-long-phishing-domain.example".to_string(),
        ];
        assert!((classifier.score_urls(&urls) - 0.5).abs() < 1e-12);

        let urls = vec!["http://very-long-phishing-domain.example".to_string()];
        assert!((classifier.score_urls(&urls) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_bad_url_does_not_abort_batch() {
        let classifier = UrlClassifier::new(Some(Box::new(DomainLengthModel)));
        let urls = vec!["http://[broken".to_string(), "http://a.com".to_string()];
        assert!((classifier.score_urls(&urls) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_neutral_when_empty_or_unavailable() {
        let classifier = UrlClassifier::new(Some(Box::new(DomainLengthModel)));
        assert_eq!(classifier.score_urls(&[]), NEUTRAL_SCORE);

        let unavailable = UrlClassifier::unavailable();
        assert_eq!(
            unavailable.score_urls(&["http://a.com".to_string()]),
            NEUTRAL_SCORE
        );
    }
}
