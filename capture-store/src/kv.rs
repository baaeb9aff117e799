//! Local key-value persistence port and adapters

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// The platform's local persistent key-value store, as the pipeline sees it.
/// Implementations must tolerate concurrent callers; they do not provide
/// cross-call transactions.
#[async_trait]
pub trait KeyValuePort: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), KvError>;
    async fn remove(&self, key: &str) -> Result<(), KvError>;
    /// Wipe the whole namespace. Last-resort path for bulk clears.
    async fn clear(&self) -> Result<(), KvError>;
}

/// SQLite-backed adapter. A single `kv` table keyed by entry name.
pub struct SqliteKeyValue {
    conn: Mutex<Connection>,
}

impl SqliteKeyValue {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KvError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, KvError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), KvError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }
}

#[async_trait]
impl KeyValuePort for SqliteKeyValue {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let conn = self.conn.lock().await;
        let result = conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), KvError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM kv", [])?;
        Ok(())
    }
}

/// In-memory adapter with failure injection, for tests and as the mirror of
/// last resort when no durable backend is available.
#[derive(Default)]
pub struct MemoryKeyValue {
    map: std::sync::Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail until switched back, simulating a
    /// broken persistence layer.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<(), KvError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValuePort for MemoryKeyValue {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.guard()?;
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.guard()?;
        self.map
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        self.guard()?;
        self.map.lock().unwrap().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), KvError> {
        self.guard()?;
        self.map.lock().unwrap().clear();
        Ok(())
    }
}
