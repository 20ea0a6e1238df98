use crate::MailsortError;
use crate::classifier::{DEFAULT_FALLBACK_LABEL, ERROR_LABEL};
use crate::normalize::DEFAULT_KEEP_WORDS;
use crate::spam::{DEFAULT_MAX_LENGTH, SPAM_LABEL};
use crate::vectorize::DEFAULT_N_FEATURES;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MailsortConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub spam: SpamConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Additive smoothing for new per-user models.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Feature-space size for new per-user models. Existing models keep theirs.
    #[serde(default = "default_n_features")]
    pub n_features: usize,
    /// Label reported while a user has no trained model.
    #[serde(default = "default_fallback_label")]
    pub fallback_label: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            n_features: default_n_features(),
            fallback_label: default_fallback_label(),
        }
    }
}

fn default_alpha() -> f64 {
    1.0
}

fn default_n_features() -> usize {
    DEFAULT_N_FEATURES
}

fn default_fallback_label() -> String {
    DEFAULT_FALLBACK_LABEL.to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct NormalizerConfig {
    /// Stop-words to keep as features. Replaces the default list when set.
    #[serde(default = "default_keep_words")]
    pub keep_words: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            keep_words: default_keep_words(),
        }
    }
}

fn default_keep_words() -> Vec<String> {
    DEFAULT_KEEP_WORDS.iter().map(|w| w.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SpamConfig {
    /// Exported spam model weights. Without one, nothing is flagged as spam.
    pub model_path: Option<PathBuf>,
    /// Word tokens passed to the spam model.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            max_length: default_max_length(),
        }
    }
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite model database (default `~/.mailsort/models.db`).
    pub db_path: Option<PathBuf>,
    /// Store models as `<model_dir>/user_<id>/model.json` instead of SQLite.
    pub model_dir: Option<PathBuf>,
    /// SQLCipher key file for the model database. `MAILSORT_KEY` overrides it.
    pub key_file: Option<PathBuf>,
}

/// Load config from MAILSORT_CONFIG env var, ~/.mailsort/config.toml, or defaults.
pub fn load_config() -> Result<MailsortConfig, MailsortError> {
    match config_path() {
        Some(p) if p.exists() => load_config_from(&p),
        _ => Ok(MailsortConfig::default()),
    }
}

pub fn load_config_from(path: &Path) -> Result<MailsortConfig, MailsortError> {
    let content = std::fs::read_to_string(path)?;
    let config: MailsortConfig = toml::from_str(&content)
        .map_err(|e| MailsortError::Config(format!("{}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("MAILSORT_CONFIG") {
        return Some(PathBuf::from(p));
    }
    let home = std::env::var("HOME").ok()?;
    Some(Path::new(&home).join(".mailsort").join("config.toml"))
}

fn validate_config(config: &MailsortConfig) -> Result<(), MailsortError> {
    let alpha = config.classifier.alpha;
    if alpha.is_nan() || alpha <= 0.0 {
        return Err(MailsortError::Config(format!(
            "classifier.alpha must be positive, got {alpha}"
        )));
    }
    if config.classifier.n_features == 0 {
        return Err(MailsortError::Config("classifier.n_features must be at least 1".into()));
    }
    let fallback = config.classifier.fallback_label.trim();
    if fallback.is_empty()
        || fallback.eq_ignore_ascii_case(SPAM_LABEL)
        || fallback.eq_ignore_ascii_case(ERROR_LABEL)
    {
        return Err(MailsortError::Config(format!(
            "classifier.fallback_label {fallback:?} is empty or reserved"
        )));
    }
    if config.spam.max_length == 0 {
        return Err(MailsortError::Config("spam.max_length must be at least 1".into()));
    }
    if config.storage.db_path.is_some() && config.storage.model_dir.is_some() {
        return Err(MailsortError::Config(
            "storage.db_path and storage.model_dir are mutually exclusive".into(),
        ));
    }
    if config.storage.key_file.is_some() && config.storage.model_dir.is_some() {
        return Err(MailsortError::Config(
            "storage.key_file only applies to the SQLite store, not storage.model_dir".into(),
        ));
    }
    Ok(())
}
