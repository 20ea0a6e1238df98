pub mod bayes;
pub mod classifier;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod model;
pub mod normalize;
pub mod schema;
pub mod spam;
pub mod store;
pub mod vectorize;

pub use classifier::{HybridClassifier, LearnOutcome, Prediction};
pub use normalize::clean;

#[derive(Debug)]
pub enum MailsortError {
    Database(rusqlite::Error),
    Io(std::io::Error),
    Json(serde_json::Error),
    Config(String),
    Model(String),
}

impl std::fmt::Display for MailsortError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailsortError::Database(e) => write!(f, "database: {e}"),
            MailsortError::Io(e) => write!(f, "io: {e}"),
            MailsortError::Json(e) => write!(f, "json: {e}"),
            MailsortError::Config(msg) => write!(f, "config: {msg}"),
            MailsortError::Model(msg) => write!(f, "model: {msg}"),
        }
    }
}

impl std::error::Error for MailsortError {}

impl From<rusqlite::Error> for MailsortError {
    fn from(e: rusqlite::Error) -> Self {
        MailsortError::Database(e)
    }
}

impl From<std::io::Error> for MailsortError {
    fn from(e: std::io::Error) -> Self {
        MailsortError::Io(e)
    }
}

impl From<serde_json::Error> for MailsortError {
    fn from(e: serde_json::Error) -> Self {
        MailsortError::Json(e)
    }
}

impl From<rusqlite_migration::Error> for MailsortError {
    fn from(e: rusqlite_migration::Error) -> Self {
        match e {
            rusqlite_migration::Error::RusqliteError { query: _, err } => MailsortError::Database(err),
            other => MailsortError::Config(format!("migration: {other}")),
        }
    }
}
