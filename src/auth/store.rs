// Durable storage of the access/refresh token pair

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock};

use crate::error::{ApiError, Result};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Key-value storage of the token pair.
///
/// Tokens are opaque strings. `set` overwrites both values so that no
/// reader ever observes a new access token next to a stale refresh token.
pub trait TokenStore: Send + Sync {
    fn get_access(&self) -> Result<Option<String>>;
    fn get_refresh(&self) -> Result<Option<String>>;
    fn set(&self, access: &str, refresh: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Token store backed by an SQLite `auth_kv` table
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteTokenStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ApiError::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        tracing::debug!("Opening token store: {}", path.display());
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Non-durable store, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ApiError::Storage("token store lock poisoned".to_string()))
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM auth_kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }
}

impl TokenStore for SqliteTokenStore {
    fn get_access(&self) -> Result<Option<String>> {
        self.get(ACCESS_TOKEN_KEY)
    }

    fn get_refresh(&self) -> Result<Option<String>> {
        self.get(REFRESH_TOKEN_KEY)
    }

    fn set(&self, access: &str, refresh: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for (key, value) in [(ACCESS_TOKEN_KEY, access), (REFRESH_TOKEN_KEY, refresh)] {
            tx.execute(
                "INSERT INTO auth_kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM auth_kv WHERE key IN (?1, ?2)",
            params![ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
struct Slots {
    access: Option<String>,
    refresh: Option<String>,
}

/// Process-local token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slots: RwLock<Slots>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        Self {
            slots: RwLock::new(Slots {
                access: Some(access.to_string()),
                refresh: Some(refresh.to_string()),
            }),
        }
    }

    fn read(&self) -> Result<Slots> {
        self.slots
            .read()
            .map(|slots| slots.clone())
            .map_err(|_| ApiError::Storage("token store lock poisoned".to_string()))
    }

    fn write(&self, slots: Slots) -> Result<()> {
        let mut guard = self
            .slots
            .write()
            .map_err(|_| ApiError::Storage("token store lock poisoned".to_string()))?;
        *guard = slots;
        Ok(())
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_access(&self) -> Result<Option<String>> {
        Ok(self.read()?.access)
    }

    fn get_refresh(&self) -> Result<Option<String>> {
        Ok(self.read()?.refresh)
    }

    fn set(&self, access: &str, refresh: &str) -> Result<()> {
        self.write(Slots {
            access: Some(access.to_string()),
            refresh: Some(refresh.to_string()),
        })
    }

    fn clear(&self) -> Result<()> {
        self.write(Slots::default())
    }
}

/// Default location of the session database
pub fn default_store_path() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join("expense-client").join("session.sqlite3"),
        None => PathBuf::from(".expense-client").join("session.sqlite3"),
    }
}
