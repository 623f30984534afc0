//! Extraction history: remember every processed batch and its export.
//!
//! Persistence is optional and best effort. The batch entry points log a
//! `warn!` when a save fails and simply return no extraction id; the export
//! itself is never lost because of the store.

use crate::error::HistoryError;
use crate::export::ExportFormat;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Default number of records returned by [`HistoryStore::list`] callers.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// One stored extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub input_file_names: Vec<String>,
    /// Location of the export, relative to the store.
    pub storage_path: String,
}

/// Persists extraction exports. Implementations are blocking; async callers
/// run them on the blocking pool.
pub trait HistoryStore: Send + Sync {
    /// Store the exported bytes and record the batch.
    fn save(
        &self,
        extraction_id: &str,
        input_file_names: &[String],
        exported: &[u8],
    ) -> Result<HistoryRecord, HistoryError>;

    /// Newest first, at most `limit` records.
    fn list(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// A URL the export can be fetched from, or `None` for an unknown id.
    fn download_url(&self, extraction_id: &str) -> Result<Option<String>, HistoryError>;

    /// The exported bytes, or `None` for an unknown id.
    fn load_export(&self, extraction_id: &str) -> Result<Option<Vec<u8>>, HistoryError>;
}

/// History kept in a SQLite database, with exports as files beside it.
///
/// Layout under `root`: `history.db` and `outputs/<id>.xlsx`.
#[derive(Debug)]
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
    root: PathBuf,
}

impl SqliteHistoryStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, HistoryError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("outputs"))?;
        let conn = Connection::open(root.join("history.db"))?;
        let store = Self {
            conn: Mutex::new(conn),
            root,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// In-memory database with exports under `root` (useful for testing).
    pub fn in_memory<P: AsRef<Path>>(root: P) -> Result<Self, HistoryError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("outputs"))?;
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            root,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), HistoryError> {
        let conn = self.lock()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS extraction_history (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                input_file_names TEXT NOT NULL,
                output_storage_path TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_history_created ON extraction_history(created_at)",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, HistoryError> {
        self.conn
            .lock()
            .map_err(|_| HistoryError::Malformed("history connection lock poisoned".into()))
    }

    fn storage_path(extraction_id: &str) -> String {
        format!("outputs/{extraction_id}.{}", ExportFormat::Xlsx.extension())
    }

    fn stored_path(&self, extraction_id: &str) -> Result<Option<PathBuf>, HistoryError> {
        let conn = self.lock()?;
        let rel: Option<String> = conn
            .query_row(
                "SELECT output_storage_path FROM extraction_history WHERE id = ?1",
                params![extraction_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(rel.map(|r| self.root.join(r)))
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn save(
        &self,
        extraction_id: &str,
        input_file_names: &[String],
        exported: &[u8],
    ) -> Result<HistoryRecord, HistoryError> {
        let storage_path = Self::storage_path(extraction_id);
        let path = self.root.join(&storage_path);
        let created_at = Utc::now();
        let names = serde_json::to_string(input_file_names)
            .map_err(|e| HistoryError::Malformed(e.to_string()))?;

        // The row goes in before the file is touched; an existing id keeps
        // its export and a failed write rolls the row back.
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let exists = tx
            .query_row(
                "SELECT 1 FROM extraction_history WHERE id = ?1",
                params![extraction_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Err(HistoryError::DuplicateId(extraction_id.to_string()));
        }
        tx.execute(
            "INSERT INTO extraction_history (id, created_at, input_file_names, output_storage_path)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                extraction_id,
                created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                names,
                storage_path
            ],
        )?;

        // Write then rename so a crash never leaves a half-written export.
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, exported)?;
        std::fs::rename(&tmp, &path)?;
        tx.commit()?;
        debug!("Saved extraction {} ({} bytes)", extraction_id, exported.len());

        Ok(HistoryRecord {
            id: extraction_id.to_string(),
            created_at,
            input_file_names: input_file_names.to_vec(),
            storage_path,
        })
    }

    fn list(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, input_file_names, output_storage_path
             FROM extraction_history
             ORDER BY created_at DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, created_at, names, storage_path) = row?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| HistoryError::Malformed(format!("{id}: created_at: {e}")))?
                .with_timezone(&Utc);
            let input_file_names: Vec<String> = serde_json::from_str(&names)
                .map_err(|e| HistoryError::Malformed(format!("{id}: input_file_names: {e}")))?;
            records.push(HistoryRecord {
                id,
                created_at,
                input_file_names,
                storage_path,
            });
        }
        Ok(records)
    }

    fn download_url(&self, extraction_id: &str) -> Result<Option<String>, HistoryError> {
        let Some(path) = self.stored_path(extraction_id)? else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let absolute = path.canonicalize()?;
        Ok(Some(format!("file://{}", absolute.display())))
    }

    fn load_export(&self, extraction_id: &str) -> Result<Option<Vec<u8>>, HistoryError> {
        let Some(path) = self.stored_path(extraction_id)? else {
            return Ok(None);
        };
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
