//! Shared spam stage.
//!
//! The detector is an opaque pre-trained binary classifier. The bundled
//! implementation scores TF-IDF features against exported linear model
//! weights (`classes`, `vocabulary`, `idf`, `weights`, `bias`) loaded from
//! JSON; no training happens here.

use crate::MailsortError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const SPAM_LABEL: &str = "spam";
pub const HAM_LABEL: &str = "ham";

/// Default input limit, in word tokens.
pub const DEFAULT_MAX_LENGTH: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub struct SpamVerdict {
    pub label: String,
    pub confidence: f32,
}

impl SpamVerdict {
    pub fn is_spam(&self) -> bool {
        self.label.eq_ignore_ascii_case(SPAM_LABEL)
    }
}

/// Read-only spam classifier shared by every user.
pub trait SpamDetector: Send + Sync {
    fn classify_spam(&self, text: &str, max_length: usize) -> Result<SpamVerdict, MailsortError>;
}

/// Detector used when no spam model is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverSpam;

impl SpamDetector for NeverSpam {
    fn classify_spam(&self, _text: &str, _max_length: usize) -> Result<SpamVerdict, MailsortError> {
        Ok(SpamVerdict {
            label: HAM_LABEL.into(),
            confidence: 1.0,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ExportedSpamModel {
    classes: Vec<String>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
    #[serde(default = "default_ngram_range")]
    ngram_range: [usize; 2],
    #[serde(default = "default_true")]
    sublinear_tf: bool,
}

fn default_ngram_range() -> [usize; 2] {
    [1, 1]
}

fn default_true() -> bool {
    true
}

/// TF-IDF + logistic linear model. `classes[1]` is the positive class.
#[derive(Debug)]
pub struct LinearSpamModel {
    classes: [String; 2],
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
    ngram_range: [usize; 2],
    sublinear_tf: bool,
    fingerprint: String,
}

impl LinearSpamModel {
    pub fn load(path: &Path) -> Result<Self, MailsortError> {
        let raw = std::fs::read(path)?;
        let model = Self::from_slice(&raw)
            .map_err(|e| MailsortError::Model(format!("{}: {e}", path.display())))?;
        log::info!(
            "loaded spam model {} ({} features, fingerprint {})",
            path.display(),
            model.vocabulary.len(),
            model.fingerprint
        );
        Ok(model)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, MailsortError> {
        let exported: ExportedSpamModel = serde_json::from_slice(raw)?;

        let [negative, positive]: [String; 2] = exported.classes.try_into().map_err(|c: Vec<String>| {
            MailsortError::Model(format!("spam model needs exactly 2 classes, got {}", c.len()))
        })?;
        let n = exported.idf.len();
        if exported.weights.len() != n {
            return Err(MailsortError::Model(format!(
                "idf has {n} entries but weights has {}",
                exported.weights.len()
            )));
        }
        if let Some((term, idx)) = exported.vocabulary.iter().find(|(_, idx)| **idx >= n) {
            return Err(MailsortError::Model(format!(
                "vocabulary term '{term}' points at index {idx}, only {n} weights"
            )));
        }
        let [lo, hi] = exported.ngram_range;
        if lo == 0 || lo > hi {
            return Err(MailsortError::Model(format!("bad ngram_range [{lo}, {hi}]")));
        }

        Ok(Self {
            classes: [negative, positive],
            vocabulary: exported.vocabulary,
            idf: exported.idf,
            weights: exported.weights,
            bias: exported.bias,
            ngram_range: exported.ngram_range,
            sublinear_tf: exported.sublinear_tf,
            fingerprint: siphash_hex(raw),
        })
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Probability of the positive class for `text`, reading at most
    /// `max_length` word tokens.
    pub fn positive_probability(&self, text: &str, max_length: usize) -> f64 {
        let mut tokens = word_tokenize(text);
        tokens.truncate(max_length);
        let ngrams = word_ngrams(&tokens, self.ngram_range[0], self.ngram_range[1]);
        let raw = self.tfidf_score(&ngrams) + self.bias;
        1.0 / (1.0 + (-raw).exp())
    }

    /// L2-normalized TF-IDF dot product with the model weights.
    fn tfidf_score(&self, ngrams: &HashMap<String, u32>) -> f64 {
        let mut pairs: Vec<(usize, f64)> = Vec::new();
        for (gram, &count) in ngrams {
            if let Some(&idx) = self.vocabulary.get(gram) {
                let tf = if self.sublinear_tf {
                    (count as f64 + 1.0).ln()
                } else {
                    count as f64
                };
                pairs.push((idx, tf * self.idf[idx]));
            }
        }

        let norm_sq: f64 = pairs.iter().map(|(_, v)| v * v).sum();
        if norm_sq == 0.0 {
            return 0.0;
        }
        let norm = norm_sq.sqrt();
        pairs.iter().map(|(idx, v)| (v / norm) * self.weights[*idx]).sum()
    }
}

impl SpamDetector for LinearSpamModel {
    fn classify_spam(&self, text: &str, max_length: usize) -> Result<SpamVerdict, MailsortError> {
        let prob = self.positive_probability(text, max_length);
        let (label, confidence) = if prob >= 0.5 {
            (&self.classes[1], prob)
        } else {
            (&self.classes[0], 1.0 - prob)
        };
        Ok(SpamVerdict {
            label: label.clone(),
            confidence: confidence as f32,
        })
    }
}

/// SipHash fingerprint of raw bytes as a 16-char hex string.
fn siphash_hex(data: &[u8]) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::hash::DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn word_tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

fn word_ngrams(tokens: &[String], lo: usize, hi: usize) -> HashMap<String, u32> {
    let mut ngrams = HashMap::new();
    for n in lo..=hi {
        if n > tokens.len() {
            continue;
        }
        for window in tokens.windows(n) {
            *ngrams.entry(window.join(" ")).or_insert(0) += 1;
        }
    }
    ngrams
}
