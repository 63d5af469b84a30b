//! Durable key-value storage.
//!
//! Everything Veil persists lives in one flat key-value namespace: the
//! versioned [`UserState`](crate::state::UserState) aggregate plus a handful
//! of independently keyed collections. Two backends are provided:
//!
//! - [`SqliteStore`]: a single SQLite table, one row per key:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS kv (
//!     key        TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! - [`MemoryStore`]: a mutex-guarded map for tests and throwaway sessions.
//!
//! Writes are whole-value overwrites; there is no partial patching and no
//! locking beyond what SQLite does for a single statement.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{Result, VeilError};

/// Minimal durable key-value contract.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored at `key`, if any.
    ///
    /// # Errors
    ///
    /// Backend failures, or [`VeilError::StorageCorruption`] when the stored
    /// bytes fail integrity checks.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrite the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`. Returns `true` if something was removed.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn remove(&self, key: &str) -> Result<bool>;

    /// All keys currently stored.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn keys(&self) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// Lowercase hex CRC-32 (ISO 3309 polynomial) of `data`.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32(data))
}

fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    data.iter().fold(0xFFFF_FFFF_u32, |mut crc, &byte| {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLY & mask);
        }
        crc
    }) ^ 0xFFFF_FFFF
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key        TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

/// SQLite-backed [`KeyValueStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: StorageConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &StorageConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Veil store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open a throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &StorageConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path of the database file (`:memory:` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Copy the live database to `dest_path` with SQLite's online backup.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(256, Duration::from_millis(50), None)?;
        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Store backup completed"
        );
        Ok(())
    }

    /// Write `<db>.bak.1`, shifting older copies up and keeping at most
    /// `backup_count` of them. No-op for in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Database`] or [`VeilError::Io`] on failure.
    pub fn create_rotating_backup(&self) -> Result<()> {
        let max = self.config.backup_count;
        if max == 0 || self.db_path.as_os_str() == ":memory:" {
            return Ok(());
        }

        let oldest = self.backup_path(max);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        self.backup(self.backup_path(1))
    }

    /// Path of the `n`-th rotating backup.
    #[must_use]
    pub fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.db_path.as_os_str().to_os_string();
        name.push(format!(".bak.{n}"));
        PathBuf::from(name)
    }

    /// `PRAGMA integrity_check`; `true` when the database is healthy.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT data, checksum FROM kv WHERE key = ?1")?;
        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![key], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(key, %expected, %actual, "Checksum mismatch on stored blob");
                    return Err(VeilError::StorageCorruption(format!(
                        "checksum mismatch for key {key}"
                    )));
                }
            }
        }

        debug!(key, bytes = data.len(), "kv get");
        Ok(Some(data))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(value));
        let now = Utc::now().to_rfc3339();
        self.conn.lock().execute(
            "INSERT INTO kv (key, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![key, value, now, checksum],
        )?;
        debug!(key, bytes = value.len(), "kv set");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(deleted > 0)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT key FROM kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process [`KeyValueStore`]; contents vanish with the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        (**self).keys()
    }
}
