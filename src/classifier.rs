//! Two-stage hybrid classifier.
//!
//! Stage one is the shared, read-only spam detector run on the raw text.
//! Stage two is a per-user multinomial naive Bayes model trained online from
//! corrections. One `HybridClassifier` is built at startup and shared by all
//! request handlers (`Arc<HybridClassifier>`).
//!
//! Locking: the user map has its own mutex, held only while looking up or
//! inserting a model. Each user's model sits behind its own mutex, held for
//! the whole predict or learn-and-save sequence, so corrections for one user
//! never interleave their grow and fit steps.

use crate::MailsortError;
use crate::config::MailsortConfig;
use crate::model::UserModel;
use crate::normalize::Normalizer;
use crate::spam::{LinearSpamModel, NeverSpam, SPAM_LABEL, SpamDetector};
use crate::store::ModelStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Label returned while a user has no trained model, unless configured otherwise.
pub const DEFAULT_FALLBACK_LABEL: &str = "primary";
/// Label returned when the prediction pipeline fails.
pub const ERROR_LABEL: &str = "error";

pub type SpamLoader = Box<dyn Fn() -> Result<Arc<dyn SpamDetector>, MailsortError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prediction {
    Spam,
    Label(String),
    /// No trained model for this user yet; carries the fallback label.
    Fallback(String),
    Error,
}

impl Prediction {
    pub fn as_str(&self) -> &str {
        match self {
            Prediction::Spam => SPAM_LABEL,
            Prediction::Label(l) => l,
            Prediction::Fallback(l) => l,
            Prediction::Error => ERROR_LABEL,
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnOutcome {
    pub success: bool,
    pub message: String,
    /// Set when the in-memory update succeeded but saving it did not.
    pub persist_error: Option<String>,
}

impl LearnOutcome {
    fn ok(message: String) -> Self {
        Self {
            success: true,
            message,
            persist_error: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            persist_error: None,
        }
    }
}

/// Parameters for newly created per-user models and the spam stage.
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub alpha: f64,
    pub n_features: usize,
    pub max_length: usize,
    pub fallback_label: String,
    pub normalizer: Normalizer,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            n_features: crate::vectorize::DEFAULT_N_FEATURES,
            max_length: crate::spam::DEFAULT_MAX_LENGTH,
            fallback_label: DEFAULT_FALLBACK_LABEL.to_string(),
            normalizer: Normalizer::default(),
        }
    }
}

impl ClassifierSettings {
    pub fn from_config(config: &MailsortConfig) -> Self {
        Self {
            alpha: config.classifier.alpha,
            n_features: config.classifier.n_features,
            max_length: config.spam.max_length,
            fallback_label: config.classifier.fallback_label.trim().to_string(),
            normalizer: Normalizer::new(&config.normalizer.keep_words),
        }
    }
}

type ModelHandle = Arc<Mutex<UserModel>>;

pub struct HybridClassifier {
    spam_loader: SpamLoader,
    spam: OnceLock<Option<Arc<dyn SpamDetector>>>,
    store: Box<dyn ModelStore>,
    models: Mutex<HashMap<String, ModelHandle>>,
    settings: ClassifierSettings,
}

// A panic while holding a lock cannot leave a half-grown table behind (growth
// swaps in a complete copy), so poisoned locks are recovered.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HybridClassifier {
    /// Service with an already-loaded spam detector.
    pub fn new(spam: Arc<dyn SpamDetector>, store: impl ModelStore + 'static) -> Self {
        let spam_loader: SpamLoader = Box::new(move || Ok(Arc::clone(&spam)));
        Self::with_spam_loader(spam_loader, store)
    }

    /// Service whose spam detector is loaded on first use (or by
    /// [`initialize_spam_model`](Self::initialize_spam_model)).
    pub fn with_spam_loader(spam_loader: SpamLoader, store: impl ModelStore + 'static) -> Self {
        Self {
            spam_loader,
            spam: OnceLock::new(),
            store: Box::new(store),
            models: Mutex::new(HashMap::new()),
            settings: ClassifierSettings::default(),
        }
    }

    /// Build from config: the spam model path (if any) is loaded lazily.
    pub fn from_config(config: &MailsortConfig, store: impl ModelStore + 'static) -> Self {
        let model_path = config.spam.model_path.clone();
        let loader: SpamLoader = Box::new(move || match &model_path {
            Some(path) => Ok(Arc::new(LinearSpamModel::load(path)?) as Arc<dyn SpamDetector>),
            None => {
                log::info!("no spam model configured, spam stage disabled");
                Ok(Arc::new(NeverSpam) as Arc<dyn SpamDetector>)
            }
        });
        Self::with_spam_loader(loader, store).with_settings(ClassifierSettings::from_config(config))
    }

    pub fn with_settings(mut self, settings: ClassifierSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    /// Load the spam detector now. Concurrent callers wait for a single load;
    /// a failed load is remembered and not retried.
    pub fn initialize_spam_model(&self) -> bool {
        self.spam_detector().is_some()
    }

    fn spam_detector(&self) -> Option<&Arc<dyn SpamDetector>> {
        self.spam
            .get_or_init(|| match (self.spam_loader)() {
                Ok(detector) => Some(detector),
                Err(e) => {
                    log::error!("spam model failed to load: {e}");
                    None
                }
            })
            .as_ref()
    }

    fn fallback(&self) -> Prediction {
        Prediction::Fallback(self.settings.fallback_label.clone())
    }

    /// Fetch the user's model, loading it from the store or creating an
    /// empty one on first access.
    fn user_model(&self, user: &str) -> Result<ModelHandle, MailsortError> {
        let mut models = lock(&self.models);
        if let Some(handle) = models.get(user) {
            return Ok(Arc::clone(handle));
        }

        let model = match self.store.load(user)? {
            Some(model) => {
                log::info!("loaded model for user {user} ({} labels)", model.labels().len());
                model
            }
            None => {
                log::debug!("creating empty model for user {user}");
                UserModel::new(self.settings.n_features, self.settings.alpha)
            }
        };
        let handle = Arc::new(Mutex::new(model));
        models.insert(user.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Classify `text` for `user`. Always returns a label; failures map to
    /// [`Prediction::Error`].
    pub fn predict(&self, text: &str, user: &str) -> Prediction {
        match self.try_predict(text, user) {
            Ok(prediction) => prediction,
            Err(e) => {
                log::error!("prediction failed for user {user}: {e}");
                Prediction::Error
            }
        }
    }

    fn try_predict(&self, text: &str, user: &str) -> Result<Prediction, MailsortError> {
        let spam = self
            .spam_detector()
            .ok_or_else(|| MailsortError::Model("spam model not loaded".into()))?;
        let verdict = spam.classify_spam(text, self.settings.max_length)?;
        if verdict.is_spam() {
            log::debug!("spam verdict for user {user} ({:.2})", verdict.confidence);
            return Ok(Prediction::Spam);
        }

        let handle = match self.user_model(user) {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("model for user {user} not loaded, using fallback: {e}");
                return Ok(self.fallback());
            }
        };
        let model = lock(&handle);
        if !model.is_trained() {
            return Ok(self.fallback());
        }

        let cleaned = self.settings.normalizer.clean(text);
        Ok(match model.predict(&cleaned) {
            Some(label) => Prediction::Label(label.to_string()),
            None => self.fallback(),
        })
    }

    /// Apply a user's correction and persist the updated model.
    pub fn learn(&self, text: &str, correct_label: &str, user: &str) -> LearnOutcome {
        if correct_label.eq_ignore_ascii_case(SPAM_LABEL) {
            return LearnOutcome::ok(
                "correction noted; the spam model is pre-trained and shared, so it is not updated".into(),
            );
        }
        if correct_label.trim().is_empty() {
            return LearnOutcome::failed("label must not be empty");
        }

        let handle = match self.user_model(user) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("cannot learn for user {user}: {e}");
                return LearnOutcome::failed("model not loaded");
            }
        };

        let cleaned = self.settings.normalizer.clean(text);
        let mut model = lock(&handle);
        let is_new = match model.learn(&cleaned, correct_label) {
            Ok(is_new) => is_new,
            Err(e) => {
                log::error!("update failed for user {user}: {e}");
                return LearnOutcome::failed(format!("update failed: {e}"));
            }
        };
        if is_new {
            log::info!("user {user} gained label '{correct_label}'");
        }

        let mut outcome = LearnOutcome::ok(format!(
            "model updated; it now knows about '{correct_label}'"
        ));
        if let Err(e) = self.store.save(user, &model) {
            log::warn!("model for user {user} updated in memory but not saved: {e}");
            outcome.message.push_str(" (not saved, the change will be lost on restart)");
            outcome.persist_error = Some(e.to_string());
        }
        outcome
    }

    /// The user's labels in sorted order; empty while untrained.
    pub fn get_known_categories(&self, user: &str) -> Vec<String> {
        match self.user_model(user) {
            Ok(handle) => lock(&handle).labels().to_vec(),
            Err(e) => {
                log::warn!("model for user {user} not loaded: {e}");
                Vec::new()
            }
        }
    }

    /// Per-label posterior probabilities from the user's model, highest first.
    pub fn scores(&self, text: &str, user: &str) -> Result<Vec<(String, f64)>, MailsortError> {
        let handle = self.user_model(user)?;
        let cleaned = self.settings.normalizer.clean(text);
        let mut scores = lock(&handle).scores(&cleaned);
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scores)
    }
}
