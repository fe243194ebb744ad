// SPDX-License-Identifier: GPL-3.0-only

//! SQLite-backed code store (rusqlite, bundled SQLite)

use super::{CodeStore, DeleteOutcome};
use crate::code::{Code, CodeFormat, CodeId, NewCode};
use crate::errors::StorageError;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS codes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    content     TEXT    NOT NULL CHECK (length(content) > 0),
    format      TEXT    NOT NULL,
    created_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_codes_created_at ON codes (created_at DESC, id DESC);
";

const SELECT_COLUMNS: &str = "SELECT id, content, format, created_at FROM codes";

/// Code store backed by a single SQLite connection
///
/// The connection mutex serializes every statement, so two mutations on the
/// same row can never interleave.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`, creating parent directories
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Open(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| StorageError::Open(e.to_string()))?;

        // Readers do not block on an in-flight insert in WAL mode
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| StorageError::Open(e.to_string()))?;

        info!(path = %path.display(), "Opened code database");
        Self::init(conn)
    }

    /// In-memory database, gone when the store is dropped
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Open(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::Open(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        f(&conn)
    }
}

/// Raw column values, mapped to a [`Code`] outside the rusqlite closure so a
/// bad timestamp becomes [`StorageError::Corrupt`]
struct RawRow {
    id: i64,
    content: String,
    format: String,
    created_at: i64,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content: row.get(1)?,
            format: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn into_code(self) -> Result<Code, StorageError> {
        let created_at = DateTime::<Utc>::from_timestamp_millis(self.created_at).ok_or_else(
            || {
                StorageError::Corrupt(format!(
                    "code {} has invalid timestamp {}",
                    self.id, self.created_at
                ))
            },
        )?;
        Ok(Code {
            id: CodeId(self.id),
            content: self.content,
            format: CodeFormat::parse(&self.format),
            created_at,
        })
    }
}

impl CodeStore for SqliteStore {
    fn insert(&self, code: &NewCode) -> Result<Code, StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO codes (content, format, created_at) VALUES (?1, ?2, ?3)",
                params![
                    code.content(),
                    code.format().as_str(),
                    code.created_at().timestamp_millis()
                ],
            )?;
            let id = CodeId(conn.last_insert_rowid());
            debug!(%id, format = %code.format(), "Inserted code");
            Ok(code.clone().into_code(id))
        })
    }

    fn delete(&self, id: CodeId) -> Result<DeleteOutcome, StorageError> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM codes WHERE id = ?1", params![id.0])?;
            debug!(%id, affected, "Deleted code");
            Ok(if affected == 0 {
                DeleteOutcome::NotFound
            } else {
                DeleteOutcome::Deleted
            })
        })
    }

    fn list_all(&self) -> Result<Vec<Code>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC"))?;
            let rows = stmt
                .query_map([], RawRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(RawRow::into_code).collect()
        })
    }

    fn get(&self, id: CodeId) -> Result<Option<Code>, StorageError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                    params![id.0],
                    RawRow::from_row,
                )
                .optional()?;
            row.map(RawRow::into_code).transpose()
        })
    }
}
