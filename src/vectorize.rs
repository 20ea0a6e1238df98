//! Bag-of-words term counts over a fixed hashed feature space.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default feature-space size (maximum vocabulary).
pub const DEFAULT_N_FEATURES: usize = 5000;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Sparse feature vector: `(feature index, count)` sorted by index.
pub type SparseVec = Vec<(usize, f64)>;

/// Maps normalized text to term counts in `n_features` buckets.
///
/// The bucket function is a stable FNV-1a hash so a persisted model keeps
/// the same feature layout across processes and builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashingVectorizer {
    n_features: usize,
}

impl Default for HashingVectorizer {
    fn default() -> Self {
        Self::new(DEFAULT_N_FEATURES)
    }
}

impl HashingVectorizer {
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features: n_features.max(1),
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn bucket(&self, token: &str) -> usize {
        (fnv1a64(token.as_bytes()) % self.n_features as u64) as usize
    }

    /// Vectorize whitespace-separated tokens of already-normalized text.
    pub fn transform(&self, cleaned: &str) -> SparseVec {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for token in cleaned.split_whitespace() {
            *counts.entry(self.bucket(token)).or_insert(0.0) += 1.0;
        }
        counts.into_iter().collect()
    }
}

fn fnv1a64(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(FNV_PRIME)
    })
}
