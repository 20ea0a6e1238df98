//! Handlers for the `mailsort` subcommands. Input text comes from stdin.

use crate::MailsortError;
use crate::classifier::{ClassifierSettings, HybridClassifier};
use crate::cli::{LearnArgs, UserArgs};
use crate::config::MailsortConfig;
use crate::db::load_key;
use crate::store::{DirStore, ModelStore, SqliteStore};
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;

fn read_stdin() -> Result<String, MailsortError> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    Ok(input)
}

/// Pick the model store: `--db` wins, then `storage.model_dir`, then
/// `storage.db_path`, then the default database path. SQLite stores are
/// opened with the configured key, if any.
pub fn open_store(db: Option<&Path>, config: &MailsortConfig) -> Result<Box<dyn ModelStore>, MailsortError> {
    if db.is_none()
        && let Some(dir) = &config.storage.model_dir
    {
        if std::env::var_os("MAILSORT_KEY").is_some() {
            log::warn!("MAILSORT_KEY is ignored by the directory store");
        }
        return Ok(Box::new(DirStore::new(dir)));
    }

    let path = match db {
        Some(path) => path.to_path_buf(),
        None => config
            .storage
            .db_path
            .clone()
            .unwrap_or_else(crate::db::default_db_path),
    };
    let key = load_key(config.storage.key_file.as_deref())?;
    Ok(Box::new(SqliteStore::open_with_key(&path, key.as_deref())?))
}

fn service(db: Option<&Path>, config: &MailsortConfig) -> Result<HybridClassifier, MailsortError> {
    let store = open_store(db, config)?;
    Ok(HybridClassifier::from_config(config, store))
}

pub fn handle_clean(config: &MailsortConfig) -> Result<ExitCode, MailsortError> {
    let settings = ClassifierSettings::from_config(config);
    println!("{}", settings.normalizer.clean(&read_stdin()?));
    Ok(ExitCode::SUCCESS)
}

pub fn handle_predict(db: Option<&Path>, config: &MailsortConfig, args: &UserArgs) -> Result<ExitCode, MailsortError> {
    let svc = service(db, config)?;
    if !svc.initialize_spam_model() {
        log::warn!(
            "spam model {} unavailable, every prediction will be '{}'",
            config
                .spam
                .model_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            crate::classifier::ERROR_LABEL
        );
    }
    println!("{}", svc.predict(&read_stdin()?, &args.user));
    Ok(ExitCode::SUCCESS)
}

pub fn handle_learn(db: Option<&Path>, config: &MailsortConfig, args: &LearnArgs) -> Result<ExitCode, MailsortError> {
    let svc = service(db, config)?;
    let outcome = svc.learn(&read_stdin()?, &args.label, &args.user);
    if outcome.success {
        println!("{}", outcome.message);
    } else {
        eprintln!("mailsort: {}", outcome.message);
    }
    // A correction that was not saved is lost when this process exits.
    Ok(if outcome.success && outcome.persist_error.is_none() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

pub fn handle_categories(db: Option<&Path>, config: &MailsortConfig, args: &UserArgs) -> Result<ExitCode, MailsortError> {
    let svc = service(db, config)?;
    for label in svc.get_known_categories(&args.user) {
        println!("{label}");
    }
    Ok(ExitCode::SUCCESS)
}

pub fn handle_explain(db: Option<&Path>, config: &MailsortConfig, args: &UserArgs) -> Result<ExitCode, MailsortError> {
    let svc = service(db, config)?;
    let text = read_stdin()?;
    println!("prediction: {}", svc.predict(&text, &args.user));
    let scores = svc.scores(&text, &args.user)?;
    if scores.is_empty() {
        println!("no trained labels");
    }
    for (label, p) in scores {
        println!("{label:<24} {p:.4}");
    }
    Ok(ExitCode::SUCCESS)
}
