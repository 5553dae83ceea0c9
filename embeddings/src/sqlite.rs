//! SQLite-backed embedding store.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS commit_embeddings (
//!     commit_hash TEXT PRIMARY KEY,
//!     text TEXT,
//!     embedding TEXT
//! )
//! ```
//!
//! `embedding` holds the vector as a JSON array.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, params};
use tracing::{debug, info, warn};

use crate::Embedding;
use crate::error::{Result, StorageError};
use crate::store::{EmbeddingRecord, EmbeddingStore, check_dimension};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS commit_embeddings (
    commit_hash TEXT PRIMARY KEY,
    text TEXT,
    embedding TEXT
)";

/// Store persisted in a SQLite table keyed by id.
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::CreateDirectory(format!("{}: {e}", parent.display())))?;
        }

        let conn = Connection::open(&path)?;
        conn.execute(CREATE_TABLE, [])?;
        debug!("Opened embedding database at {}", path.display());

        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()).into())
    }

    fn upsert_blocking(&self, record: &EmbeddingRecord) -> Result<()> {
        let conn = self.conn()?;

        let existing = stored_dimension(&conn, &record.id)?;
        check_dimension(existing, record.vector.len())?;

        let embedding_json = serde_json::to_string(&record.vector)?;
        conn.execute(
            "INSERT OR REPLACE INTO commit_embeddings (commit_hash, text, embedding) VALUES (?1, ?2, ?3)",
            params![record.id, record.source_text, embedding_json],
        )?;

        debug!("Stored embedding for {}", record.id);
        Ok(())
    }

    fn load_all_blocking(&self) -> Result<Vec<EmbeddingRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT commit_hash, text, embedding FROM commit_embeddings")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, text, embedding) = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping unreadable cache row: {e}");
                    continue;
                }
            };

            let Some(embedding) = embedding else {
                warn!("Skipping cache record {id}: no embedding stored");
                continue;
            };

            match serde_json::from_str::<Embedding>(&embedding) {
                Ok(vector) => records.push(EmbeddingRecord::new(id, text.unwrap_or_default(), vector)),
                Err(e) => warn!("Skipping unreadable cache record {id}: {e}"),
            }
        }

        info!("Loaded {} cache entries from {}", records.len(), self.path.display());
        Ok(records)
    }
}

/// Length of the first decodable vector stored under an id other than
/// `exclude_id`. Undecodable rows are ignored, as `load_all` ignores them.
fn stored_dimension(conn: &Connection, exclude_id: &str) -> Result<Option<usize>> {
    let mut stmt = conn.prepare(
        "SELECT embedding FROM commit_embeddings WHERE commit_hash != ?1 AND embedding IS NOT NULL",
    )?;
    let mut rows = stmt.query(params![exclude_id])?;

    while let Some(row) = rows.next()? {
        let Ok(json) = row.get::<_, String>(0) else {
            continue;
        };
        if let Ok(vector) = serde_json::from_str::<Embedding>(&json) {
            return Ok(Some(vector.len()));
        }
    }
    Ok(None)
}

#[async_trait]
impl EmbeddingStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, record: EmbeddingRecord) -> Result<()> {
        self.upsert_blocking(&record)
    }

    async fn load_all(&self) -> Result<Vec<EmbeddingRecord>> {
        self.load_all_blocking()
    }
}
