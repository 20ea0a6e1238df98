//! Incremental multinomial naive Bayes with a growable label set.
//!
//! Statistics live in a dense table with one row per known label, rows kept
//! in sorted label order. Adding a label never mutates the table in place:
//! [`MultinomialNb::grow`] builds a new table one row larger, copies every
//! existing row, and zero-fills the new one.

use crate::MailsortError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultinomialNb {
    alpha: f64,
    n_features: usize,
    classes: Vec<String>,
    /// Training documents seen per class.
    class_count: Vec<f64>,
    /// `feature_count[c][f]`: accumulated weight of feature `f` in class `c`.
    feature_count: Vec<Vec<f64>>,
}

impl MultinomialNb {
    pub fn new(n_features: usize, alpha: f64) -> Self {
        Self {
            alpha,
            n_features,
            classes: Vec::new(),
            class_count: Vec::new(),
            feature_count: Vec::new(),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }

    pub fn class_count(&self, label: &str) -> Option<f64> {
        self.class_index(label).ok().map(|i| self.class_count[i])
    }

    fn class_index(&self, label: &str) -> Result<usize, usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(label))
    }

    /// Copy of the table with `label` inserted at its sorted position.
    ///
    /// Returns `None` if the label is already known.
    pub fn grow(&self, label: &str) -> Option<Self> {
        let pos = self.class_index(label).err()?;

        let mut classes = Vec::with_capacity(self.classes.len() + 1);
        let mut class_count = Vec::with_capacity(self.classes.len() + 1);
        let mut feature_count = Vec::with_capacity(self.classes.len() + 1);

        for (i, row) in self.feature_count.iter().enumerate() {
            if i == pos {
                classes.push(label.to_string());
                class_count.push(0.0);
                feature_count.push(vec![0.0; self.n_features]);
            }
            classes.push(self.classes[i].clone());
            class_count.push(self.class_count[i]);
            feature_count.push(row.clone());
        }
        if pos == self.classes.len() {
            classes.push(label.to_string());
            class_count.push(0.0);
            feature_count.push(vec![0.0; self.n_features]);
        }

        Some(Self {
            alpha: self.alpha,
            n_features: self.n_features,
            classes,
            class_count,
            feature_count,
        })
    }

    /// One incremental update with a single example. Returns true when the
    /// label was new and the table had to grow.
    pub fn partial_fit(&mut self, x: &[(usize, f64)], label: &str) -> Result<bool, MailsortError> {
        if let Some(&(idx, _)) = x.iter().find(|(idx, _)| *idx >= self.n_features) {
            return Err(MailsortError::Model(format!(
                "feature index {idx} outside feature space of {}",
                self.n_features
            )));
        }

        let grew = match self.grow(label) {
            Some(grown) => {
                *self = grown;
                true
            }
            None => false,
        };

        let c = self
            .class_index(label)
            .map_err(|_| MailsortError::Model(format!("label '{label}' missing after grow")))?;
        self.class_count[c] += 1.0;
        let row = &mut self.feature_count[c];
        for &(idx, val) in x {
            row[idx] += val;
        }
        Ok(grew)
    }

    /// Joint log-likelihood per class, in class order.
    fn joint_log_likelihood(&self, x: &[(usize, f64)]) -> Vec<f64> {
        let total_docs: f64 = self.class_count.iter().sum();
        let smoothing = self.alpha * self.n_features as f64;

        (0..self.classes.len())
            .map(|c| {
                let row = &self.feature_count[c];
                let row_total: f64 = row.iter().sum();
                let log_denom = (row_total + smoothing).ln();
                let prior = (self.class_count[c] / total_docs).ln();
                let likelihood: f64 = x
                    .iter()
                    .filter(|(idx, _)| *idx < self.n_features)
                    .map(|&(idx, val)| val * ((row[idx] + self.alpha).ln() - log_denom))
                    .sum();
                prior + likelihood
            })
            .collect()
    }

    /// Most likely label; the first label in sorted order wins ties.
    pub fn predict(&self, x: &[(usize, f64)]) -> Option<&str> {
        let jll = self.joint_log_likelihood(x);
        let mut best: Option<(usize, f64)> = None;
        for (i, &score) in jll.iter().enumerate() {
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((i, score));
            }
        }
        best.map(|(i, _)| self.classes[i].as_str())
    }

    /// Posterior probability per label, in label order.
    pub fn predict_proba(&self, x: &[(usize, f64)]) -> Vec<(String, f64)> {
        let jll = self.joint_log_likelihood(x);
        let max = jll.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Vec::new();
        }
        let exps: Vec<f64> = jll.iter().map(|v| (v - max).exp()).collect();
        let norm: f64 = exps.iter().sum();
        self.classes
            .iter()
            .cloned()
            .zip(exps.into_iter().map(|e| e / norm))
            .collect()
    }

    /// Structural consistency check for tables coming from storage.
    pub fn validate(&self) -> Result<(), MailsortError> {
        if self.alpha.is_nan() || self.alpha <= 0.0 {
            return Err(MailsortError::Model(format!("alpha must be positive, got {}", self.alpha)));
        }
        let n = self.classes.len();
        if self.class_count.len() != n || self.feature_count.len() != n {
            return Err(MailsortError::Model(format!(
                "table has {n} labels but {} class counts and {} rows",
                self.class_count.len(),
                self.feature_count.len()
            )));
        }
        if self.feature_count.iter().any(|row| row.len() != self.n_features) {
            return Err(MailsortError::Model(format!(
                "row width differs from feature space of {}",
                self.n_features
            )));
        }
        if self.classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(MailsortError::Model("labels not sorted and unique".into()));
        }
        Ok(())
    }
}
