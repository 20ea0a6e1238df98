//! Per-user trained model: vectorizer and classifier persisted as one blob.

use crate::MailsortError;
use crate::bayes::MultinomialNb;
use crate::vectorize::HashingVectorizer;
use serde::{Deserialize, Serialize};

/// Serialized layout version. Bump when the JSON shape changes.
pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserModel {
    version: u32,
    vectorizer: HashingVectorizer,
    classifier: MultinomialNb,
}

impl UserModel {
    /// Fresh, untrained model. The feature space is fixed from here on.
    pub fn new(n_features: usize, alpha: f64) -> Self {
        let vectorizer = HashingVectorizer::new(n_features);
        let classifier = MultinomialNb::new(vectorizer.n_features(), alpha);
        Self {
            version: MODEL_FORMAT_VERSION,
            vectorizer,
            classifier,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.classifier.is_fitted()
    }

    pub fn labels(&self) -> &[String] {
        self.classifier.classes()
    }

    pub fn vectorizer(&self) -> &HashingVectorizer {
        &self.vectorizer
    }

    pub fn classifier(&self) -> &MultinomialNb {
        &self.classifier
    }

    /// Predict from normalized text. `None` while untrained.
    pub fn predict(&self, cleaned: &str) -> Option<&str> {
        let x = self.vectorizer.transform(cleaned);
        self.classifier.predict(&x)
    }

    pub fn scores(&self, cleaned: &str) -> Vec<(String, f64)> {
        let x = self.vectorizer.transform(cleaned);
        self.classifier.predict_proba(&x)
    }

    /// Apply one correction. Returns true when `label` was new.
    pub fn learn(&mut self, cleaned: &str, label: &str) -> Result<bool, MailsortError> {
        let x = self.vectorizer.transform(cleaned);
        self.classifier.partial_fit(&x, label)
    }

    pub fn to_json(&self) -> Result<String, MailsortError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, MailsortError> {
        let model: UserModel = serde_json::from_str(raw)?;
        if model.version != MODEL_FORMAT_VERSION {
            return Err(MailsortError::Model(format!(
                "unsupported model format version {} (expected {MODEL_FORMAT_VERSION})",
                model.version
            )));
        }
        if model.classifier.n_features() != model.vectorizer.n_features() {
            return Err(MailsortError::Model(format!(
                "classifier expects {} features, vectorizer produces {}",
                model.classifier.n_features(),
                model.vectorizer.n_features()
            )));
        }
        model.classifier.validate()?;
        Ok(model)
    }
}
