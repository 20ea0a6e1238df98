use crate::MailsortError;
use crate::schema::MIGRATIONS;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".mailsort").join("models.db")
}

#[cfg(unix)]
fn ensure_secure_permissions(db_path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(dir) = db_path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
        // Only set permissions on dirs we created
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    if db_path.exists() {
        std::fs::set_permissions(db_path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_secure_permissions(db_path: &Path) -> std::io::Result<()> {
    if let Some(dir) = db_path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

// --- Key management ---

/// Load the database key: MAILSORT_KEY env var > `storage.key_file` > None.
///
/// A configured key file that cannot be read is an error rather than a
/// silent fall back to an unencrypted database.
pub fn load_key(key_file: Option<&Path>) -> Result<Option<String>, MailsortError> {
    if let Ok(k) = std::env::var("MAILSORT_KEY")
        && !k.trim().is_empty()
    {
        return Ok(Some(k.trim().to_string()));
    }

    let Some(path) = key_file else {
        return Ok(None);
    };
    let key = std::fs::read_to_string(path)
        .map_err(|e| MailsortError::Config(format!("key file {}: {e}", path.display())))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(MailsortError::Config(format!("key file {} is empty", path.display())));
    }
    Ok(Some(key.to_string()))
}

fn is_raw_key(key: &str) -> bool {
    key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit())
}

/// SQLCipher key value: 64 hex chars are used as a raw key (x'...', skips
/// PBKDF2), anything else as a passphrase.
fn key_pragma_value(key: &str) -> String {
    if is_raw_key(key) {
        format!("x'{key}'")
    } else {
        key.to_string()
    }
}

/// Apply the encryption key to a connection. MUST be the first statement.
fn apply_key(conn: &Connection, key: &str) -> Result<(), MailsortError> {
    conn.pragma_update(None, "key", key_pragma_value(key))?;
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |_| Ok(()))
        .map_err(|_| MailsortError::Config("wrong encryption key or corrupt database".into()))?;
    Ok(())
}

/// Re-encrypt a plaintext database in place, keeping the original as
/// `<name>.db-unencrypted-backup`.
fn migrate_to_encrypted(db_path: &Path, key: &str) -> Result<(), MailsortError> {
    let encrypted_path = db_path.with_extension("db-encrypting");
    let backup_path = db_path.with_extension("db-unencrypted-backup");
    let encrypted_name = encrypted_path.to_str().ok_or_else(|| {
        MailsortError::Config(format!("non-UTF-8 database path: {}", db_path.display()))
    })?;

    let conn = Connection::open(db_path)?;
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |_| Ok(()))
        .map_err(|_| {
            MailsortError::Config("database is neither unencrypted nor readable with the given key".into())
        })?;

    conn.execute("ATTACH DATABASE ?1 AS encrypted", [encrypted_name])?;
    conn.pragma_update(Some("encrypted"), "key", key_pragma_value(key))?;
    conn.query_row("SELECT sqlcipher_export('encrypted')", [], |_| Ok(()))?;
    conn.execute_batch("DETACH DATABASE encrypted")?;
    drop(conn);

    std::fs::rename(db_path, &backup_path)?;
    std::fs::rename(&encrypted_path, db_path)?;

    // WAL and SHM of the plaintext file no longer match the database.
    let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
    let _ = std::fs::remove_file(db_path.with_extension("db-shm"));

    log::warn!(
        "encrypted model database {}; plaintext backup left at {}",
        db_path.display(),
        backup_path.display()
    );
    Ok(())
}

/// Apply standard PRAGMAs (after key, before migrations).
fn apply_pragmas(conn: &Connection) -> Result<(), MailsortError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

/// Open (creating if needed) the model database and bring it to the latest
/// schema. With a key, a new database is created encrypted and an existing
/// plaintext one is migrated.
pub fn open_db(db_path: &Path, key: Option<&str>) -> Result<Connection, MailsortError> {
    ensure_secure_permissions(db_path)?;

    let is_new = !db_path.exists();
    let mut conn = Connection::open(db_path)?;

    if let Some(key) = key {
        if is_new {
            apply_key(&conn, key)?;
        } else if apply_key(&conn, key).is_err() {
            drop(conn);
            migrate_to_encrypted(db_path, key)?;
            conn = Connection::open(db_path)?;
            apply_key(&conn, key)?;
        }
    }

    apply_pragmas(&conn)?;
    MIGRATIONS.to_latest(&mut conn)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if db_path.exists() {
            std::fs::set_permissions(db_path, std::fs::Permissions::from_mode(0o600))?;
        }
    }

    Ok(conn)
}

/// In-memory database with the schema applied.
pub fn open_in_memory() -> Result<Connection, MailsortError> {
    let mut conn = Connection::open_in_memory()?;
    MIGRATIONS.to_latest(&mut conn)?;
    Ok(conn)
}
