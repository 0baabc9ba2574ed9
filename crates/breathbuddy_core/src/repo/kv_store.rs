//! Key-value persistence for derived achievement state.
//!
//! # Responsibility
//! - Define the opaque get/set store the achievement service depends on.
//! - Provide the SQLite implementation and an in-memory double.
//!
//! # Invariants
//! - `get` on a missing key returns `Ok(None)`, never an error.
//! - `set_many` writes entries in the given order. Implementations that can
//!   commit them together (SQLite) do so in one transaction.

use crate::db::DbError;
use log::error;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store failure. Callers must treat the write as not committed.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// Store refused the operation (unavailable, quota, injected failure).
    Rejected(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Rejected(reason) => write!(f, "store rejected operation: {reason}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Rejected(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Opaque string key-value store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Writes several entries in order.
    ///
    /// The default stops at the first failure, leaving earlier entries
    /// written.
    fn set_many(&self, entries: &[(&str, String)]) -> StoreResult<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        (**self).remove(key)
    }

    fn set_many(&self, entries: &[(&str, String)]) -> StoreResult<()> {
        (**self).set_many(entries)
    }
}

const UPSERT_SQL: &str = "INSERT INTO kv_entries (key, value)
     VALUES (?1, ?2)
     ON CONFLICT(key) DO UPDATE SET
        value = excluded.value,
        updated_at = (strftime('%s', 'now') * 1000);";

/// SQLite-backed store over the `kv_entries` table.
pub struct SqliteKvStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteKvStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl KeyValueStore for SqliteKvStore<'_> {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn
            .execute(UPSERT_SQL, params![key, value])
            .map_err(|err| log_write_error("set", err))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM kv_entries WHERE key = ?1;", [key])
            .map_err(|err| log_write_error("remove", err))?;
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> StoreResult<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|err| log_write_error("set_many", err))?;
        for (key, value) in entries {
            tx.execute(UPSERT_SQL, params![key, value])
                .map_err(|err| log_write_error("set_many", err))?;
        }
        tx.commit().map_err(|err| log_write_error("set_many", err))?;
        Ok(())
    }
}

fn log_write_error(op: &'static str, err: rusqlite::Error) -> StoreError {
    let err = DbError::Sqlite(err);
    let code = if err.is_busy() {
        "db_busy"
    } else {
        "db_write_failed"
    };
    error!("event=kv_write module=repo status=error op={op} error_code={code} error={err}");
    StoreError::Db(err)
}

/// In-memory store for tests and previews.
///
/// `set_many` applies all entries under one lock, so it is all-or-nothing.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<String>>,
    fail_writes: AtomicBool,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with `StoreError::Rejected`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Keys written so far, in write order (one entry per written key).
    pub fn write_log(&self) -> Vec<String> {
        lock(&self.writes).clone()
    }

    /// Number of committed writes to `key`.
    pub fn write_count(&self, key: &str) -> usize {
        lock(&self.writes).iter().filter(|written| *written == key).count()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.set_many(&[(key, value.to_string())])
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.check_writable()?;
        lock(&self.entries).remove(key);
        lock(&self.writes).push(key.to_string());
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> StoreResult<()> {
        self.check_writable()?;
        let mut store = lock(&self.entries);
        let mut writes = lock(&self.writes);
        for (key, value) in entries {
            store.insert((*key).to_string(), value.clone());
            writes.push((*key).to_string());
        }
        Ok(())
    }
}

// A poisoned map is still structurally valid; keep serving it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
