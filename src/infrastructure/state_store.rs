//! Durable key/value state shared by every injector process.
//!
//! The store offers independent read and overwrite per key, plus a delete
//! conditioned on the current value. There is no conditional write and no
//! transaction spanning keys.

use std::path::Path;
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{AppError, Result};

/// Key holding the persisted status map.
pub const STATUS_KEY: &str = "extensionStatus";

/// Key holding the lock record.
pub const LOCK_KEY: &str = "myEnvInjector.lock";

/// Minimal key/value interface over the durable state.
pub trait StateStore {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    /// Returns error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite the value stored under `key`.
    ///
    /// # Errors
    /// Returns error if the backing store cannot be written.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    /// Returns error if the backing store cannot be written.
    fn delete(&self, key: &str) -> Result<()>;

    /// Remove `key` only while it still holds `expected`.
    ///
    /// Returns `true` if a row was removed.
    ///
    /// # Errors
    /// Returns error if the backing store cannot be written.
    fn delete_if(&self, key: &str, expected: &str) -> Result<bool>;
}

impl<T: StateStore + ?Sized> StateStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn delete_if(&self, key: &str, expected: &str) -> Result<bool> {
        (**self).delete_if(key, expected)
    }
}

/// `SQLite` state database laid out like an editor's `state.vscdb`.
pub struct SqliteStateStore {
    conn: Connection,
}

impl SqliteStateStore {
    /// Opens or creates the state database.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or schema creation fails.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create state directory", e))?;
        }

        let conn = Connection::open(path).map_err(AppError::database)?;

        // Several processes share this file
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(AppError::database)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS ItemTable (
                key TEXT UNIQUE ON CONFLICT REPLACE,
                value BLOB
             );",
        )
        .map_err(AppError::database)?;

        tracing::debug!(path = %path.display(), "Opened state database");

        Ok(Self { conn })
    }

    /// All keys currently stored.
    ///
    /// # Errors
    /// Returns error if query fails.
    #[cfg(test)]
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM ItemTable ORDER BY key")
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(AppError::database)?;

        let mut keys = Vec::new();
        for row in rows {
            match row {
                Ok(key) => keys.push(key),
                Err(e) => tracing::warn!("Failed to read row: {}", e),
            }
        }

        Ok(keys)
    }
}

impl StateStore for SqliteStateStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM ItemTable WHERE key = ?1",
                [key],
                |row| {
                    // Editors write both TEXT and BLOB values
                    Ok(match row.get_ref(0)? {
                        ValueRef::Text(t) | ValueRef::Blob(t) => {
                            Some(String::from_utf8_lossy(t).into_owned())
                        }
                        _ => None,
                    })
                },
            )
            .optional()
            .map(Option::flatten)
            .map_err(AppError::database)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO ItemTable (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(AppError::database)?;

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM ItemTable WHERE key = ?1", [key])
            .map_err(AppError::database)?;

        Ok(())
    }

    fn delete_if(&self, key: &str, expected: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM ItemTable WHERE key = ?1 AND CAST(value AS TEXT) = ?2",
                params![key, expected],
            )
            .map_err(AppError::database)?;

        Ok(removed > 0)
    }
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStateStore {
    entries: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn delete_if(&self, key: &str, expected: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        if entries.get(key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        entries.remove(key);
        Ok(true)
    }
}
