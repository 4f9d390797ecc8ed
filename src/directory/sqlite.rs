//! SQLite-backed directory store.
//!
//! Reads the corporate master table:
//!
//! ```sql
//! CREATE TABLE corporate_master (
//!     corporate_number TEXT,
//!     name             TEXT NOT NULL,
//!     prefecture_name  TEXT
//! );
//! ```
//!
//! Prefix and substring lookups use `GLOB`, which is case-sensitive and can
//! use the name index for prefix patterns. Query text is escaped so `*`, `?`
//! and `[` in a name match literally.
//!
//! All queries share one connection. When a caller stops waiting for a
//! statement, [`DirectoryStore::interrupt`] aborts it so the connection is
//! free for the next query.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use rusqlite::{
    params, params_from_iter, Connection, InterruptHandle, OpenFlags, OptionalExtension, Row,
};
use tracing::debug;

use super::traits::{DirectoryRecord, DirectoryStore, StorageError};

const SELECT_COLUMNS: &str =
    "SELECT name, IFNULL(corporate_number, ''), IFNULL(prefecture_name, '') FROM corporate_master";

const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::ConnectionError(e.to_string())
            }
            _ => Self::BackendError(e.to_string()),
        }
    }
}

/// Directory store over a SQLite database file.
pub struct SqliteDirectory {
    conn: Mutex<Connection>,
    interrupt: InterruptHandle,
    /// Thread currently executing a statement on `conn`.
    holder: Mutex<Option<ThreadId>>,
}

impl std::fmt::Debug for SqliteDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDirectory").finish_non_exhaustive()
    }
}

impl SqliteDirectory {
    /// Opens an existing database read-only.
    ///
    /// # Errors
    /// `ConnectionError` if the file cannot be opened.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StorageError::ConnectionError(format!("{}: {e}", path.display())))?;
        Self::from_connection(conn)
    }

    /// Opens an existing database for reading and writing. Fails if the
    /// file does not exist.
    ///
    /// # Errors
    /// `ConnectionError` if the file cannot be opened.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StorageError::ConnectionError(format!("{}: {e}", path.display())))?;
        Self::from_connection(conn)
    }

    /// Opens (or creates) a database for reading and writing.
    ///
    /// # Errors
    /// `ConnectionError` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| StorageError::ConnectionError(format!("{}: {e}", path.display())))?;
        Self::from_connection(conn)
    }

    /// Creates a private in-memory database with the schema in place.
    ///
    /// # Errors
    /// Returns an error if SQLite fails to initialize.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let store = Self::from_connection(Connection::open_in_memory()?)?;
        store.create_schema()?;
        Ok(store)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            interrupt: conn.get_interrupt_handle(),
            conn: Mutex::new(conn),
            holder: Mutex::new(None),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StorageError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StorageError::BackendError("sqlite connection lock poisoned".into()))?;
        self.set_holder(Some(thread::current().id()));
        let result = f(&conn);
        self.set_holder(None);
        Ok(result?)
    }

    fn set_holder(&self, holder: Option<ThreadId>) {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = holder;
    }

    /// Checks that the `corporate_master` table exists.
    ///
    /// # Errors
    /// `BackendError` naming the missing table, or the query failure.
    pub fn verify_schema(&self) -> Result<(), StorageError> {
        let present: bool = self.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'corporate_master')",
                [],
                |row| row.get(0),
            )
        })?;
        if present {
            Ok(())
        } else {
            Err(StorageError::BackendError(
                "table corporate_master does not exist".into(),
            ))
        }
    }

    /// Creates the table and its name index if absent.
    ///
    /// # Errors
    /// Returns an error if the DDL fails, e.g. on a read-only connection.
    pub fn create_schema(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS corporate_master (
                     corporate_number TEXT,
                     name             TEXT NOT NULL,
                     prefecture_name  TEXT
                 );",
            )
        })?;
        self.ensure_indexes()
    }

    /// Creates the name index if absent. Without it every lookup is a scan.
    ///
    /// # Errors
    /// Returns an error if the DDL fails.
    pub fn ensure_indexes(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_corporate_master_name ON corporate_master(name);",
            )
        })
    }

    /// Inserts records in one transaction. Returns the number inserted.
    ///
    /// # Errors
    /// Returns an error if any insert fails; nothing is committed then.
    pub fn insert_records(&self, records: &[DirectoryRecord]) -> Result<usize, StorageError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StorageError::BackendError("sqlite connection lock poisoned".into()))?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO corporate_master (corporate_number, name, prefecture_name) VALUES (?1, ?2, ?3)",
            )?;
            for r in records {
                stmt.execute(params![r.registry_number, r.canonical_name, r.region])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn candidates(&self, pattern: &str, limit: usize) -> Result<Vec<DirectoryRecord>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "{SELECT_COLUMNS} WHERE name GLOB ?1 ORDER BY LENGTH(name), name LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![pattern, limit], record_from_row)?;
            rows.collect()
        })
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DirectoryRecord> {
    Ok(DirectoryRecord {
        canonical_name: row.get(0)?,
        registry_number: row.get(1)?,
        region: row.get(2)?,
    })
}

/// Escapes GLOB metacharacters so `text` matches literally.
fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

impl DirectoryStore for SqliteDirectory {
    fn find_exact(&self, name: &str) -> Result<Option<DirectoryRecord>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached(&format!("{SELECT_COLUMNS} WHERE name = ?1 LIMIT 1"))?;
            stmt.query_row(params![name], record_from_row).optional()
        })
    }

    fn find_exact_any(&self, names: &[String]) -> Result<Vec<DirectoryRecord>, StorageError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=names.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} WHERE name IN ({placeholders})"))?;
            let rows = stmt.query_map(params_from_iter(names.iter()), record_from_row)?;
            rows.collect()
        })
    }

    fn find_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<DirectoryRecord>, StorageError> {
        self.candidates(&format!("{}*", escape_glob(prefix)), limit)
    }

    fn find_substring(
        &self,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<DirectoryRecord>, StorageError> {
        self.candidates(&format!("*{}*", escape_glob(fragment)), limit)
    }

    fn record_count(&self) -> Result<u64, StorageError> {
        let n: i64 = self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM corporate_master", [], |row| row.get(0))
        })?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    fn interrupt(&self, worker: ThreadId) {
        // Held across the interrupt so the statement cannot hand the
        // connection to another thread in between.
        let holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        if *holder == Some(worker) {
            debug!(?worker, "interrupting abandoned directory statement");
            self.interrupt.interrupt();
        }
    }
}
