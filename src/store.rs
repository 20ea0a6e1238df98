//! Durable per-user model storage.
//!
//! A missing model is `Ok(None)`, not an error; the classifier then starts
//! a fresh one.

use crate::MailsortError;
use crate::model::UserModel;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub trait ModelStore: Send + Sync {
    fn load(&self, user: &str) -> Result<Option<UserModel>, MailsortError>;
    fn save(&self, user: &str, model: &UserModel) -> Result<(), MailsortError>;
}

impl<S: ModelStore + ?Sized> ModelStore for Box<S> {
    fn load(&self, user: &str) -> Result<Option<UserModel>, MailsortError> {
        (**self).load(user)
    }

    fn save(&self, user: &str, model: &UserModel) -> Result<(), MailsortError> {
        (**self).save(user, model)
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// One row per user in `user_models`, model stored as JSON text.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self, MailsortError> {
        Self::open_with_key(db_path, None)
    }

    /// Open with an optional SQLCipher key; see [`crate::db::open_db`].
    pub fn open_with_key(db_path: &Path, key: Option<&str>) -> Result<Self, MailsortError> {
        Ok(Self {
            conn: Mutex::new(crate::db::open_db(db_path, key)?),
        })
    }

    pub fn in_memory() -> Result<Self, MailsortError> {
        Ok(Self {
            conn: Mutex::new(crate::db::open_in_memory()?),
        })
    }
}

impl ModelStore for SqliteStore {
    fn load(&self, user: &str) -> Result<Option<UserModel>, MailsortError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let raw: Option<String> = conn
            .query_row(
                "SELECT model FROM user_models WHERE user_id = ?1",
                params![user],
                |r| r.get(0),
            )
            .optional()?;
        raw.map(|r| UserModel::from_json(&r)).transpose()
    }

    fn save(&self, user: &str, model: &UserModel) -> Result<(), MailsortError> {
        let json = model.to_json()?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO user_models (user_id, model, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET model = excluded.model, updated_at = excluded.updated_at",
            params![user, json, now_secs()],
        )?;
        Ok(())
    }
}

/// `<root>/user_<id>/model.json`, one directory per user.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn model_path(&self, user: &str) -> Result<PathBuf, MailsortError> {
        let valid = !user.is_empty()
            && user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && user != "."
            && user != "..";
        if !valid {
            return Err(MailsortError::Config(format!(
                "user id {user:?} cannot be used as a directory name"
            )));
        }
        Ok(self.root.join(format!("user_{user}")).join("model.json"))
    }
}

impl ModelStore for DirStore {
    fn load(&self, user: &str) -> Result<Option<UserModel>, MailsortError> {
        let path = self.model_path(user)?;
        match std::fs::read_to_string(&path) {
            Ok(raw) => UserModel::from_json(&raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, user: &str, model: &UserModel) -> Result<(), MailsortError> {
        let path = self.model_path(user)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        // Write-then-rename so a crash never leaves a half-written model.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, model.to_json()?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Process-local store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    models: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelStore for MemoryStore {
    fn load(&self, user: &str) -> Result<Option<UserModel>, MailsortError> {
        let models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
        models.get(user).map(|raw| UserModel::from_json(raw)).transpose()
    }

    fn save(&self, user: &str, model: &UserModel) -> Result<(), MailsortError> {
        let json = model.to_json()?;
        let mut models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
        models.insert(user.to_string(), json);
        Ok(())
    }
}
