//! Durable per-client key/value storage for layout and filter state.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub const COLUMN_LAYOUT_KEY: &str = "table_column_layout";
pub const CURRENT_FILTERS_KEY: &str = "current_filters";
pub const SAVED_FILTERS_KEY: &str = "saved_filters";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

pub trait ClientStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        guard.remove(key);
        Ok(())
    }
}

/// SQLite-backed storage scoped to one client id.
///
/// Several clients may share one database file; each instance only sees the
/// rows for its own `client_id`.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    client_id: String,
}

impl SqliteStorage {
    pub fn open(path: &Path, client_id: impl Into<String>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::with_connection(conn, client_id)
    }

    pub fn open_in_memory(client_id: impl Into<String>) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?, client_id)
    }

    fn with_connection(conn: Connection, client_id: impl Into<String>) -> Result<Self, StorageError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS client_storage (
                client_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (client_id, key)
            );
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            client_id: client_id.into(),
        })
    }

    /// Another client's view over the same database connection.
    pub fn for_client(&self, client_id: impl Into<String>) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            client_id: client_id.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl ClientStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let value = conn
            .query_row(
                "SELECT value FROM client_storage WHERE client_id = ?1 AND key = ?2",
                params![self.client_id, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute(
            r#"
            INSERT INTO client_storage (client_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(client_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![self.client_id, key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute(
            "DELETE FROM client_storage WHERE client_id = ?1 AND key = ?2",
            params![self.client_id, key],
        )?;
        Ok(())
    }
}

/// Reads and decodes a JSON value. Missing keys, read failures and
/// malformed content all come back as `None`.
pub fn load_json<T: DeserializeOwned>(storage: &dyn ClientStorage, key: &str) -> Option<T> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!(
                component = "storage",
                event = "storage.read_failed",
                key,
                error = %err
            );
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                component = "storage",
                event = "storage.parse_failed",
                key,
                error = %err
            );
            None
        }
    }
}

/// Encodes and writes a JSON value. Failures are logged, never raised.
pub fn save_json<T: Serialize + ?Sized>(storage: &dyn ClientStorage, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(StorageError::from)
        .and_then(|raw| storage.set(key, &raw));

    match result {
        Ok(()) => debug!(component = "storage", event = "storage.write", key),
        Err(err) => warn!(
            component = "storage",
            event = "storage.write_failed",
            key,
            error = %err
        ),
    }
}

pub fn remove_key(storage: &dyn ClientStorage, key: &str) {
    if let Err(err) = storage.remove(key) {
        warn!(
            component = "storage",
            event = "storage.remove_failed",
            key,
            error = %err
        );
    }
}
