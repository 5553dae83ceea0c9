//! Embedding stores.
//!
//! A store maps a record id to the text it was computed from and its
//! vector. All vectors in one store share one dimensionality; [`upsert`]
//! refuses anything else.
//!
//! On-disk layout of [`JsonFileStore`] is a single JSON object:
//!
//! ```text
//! { "<id>": { "text": "<source text>", "vector": [0.1, 0.2, ...] }, ... }
//! ```
//!
//! A bare array in place of the inner object is accepted when loading.
//!
//! Every upsert rewrites the whole file, so building a cache of N records
//! writes O(N²) bytes in total. For long histories use
//! [`crate::SqliteStore`], which writes one row per upsert.
//!
//! [`upsert`]: EmbeddingStore::upsert

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::Embedding;
use crate::error::{EmbeddingError, Result, StorageError};

/// One cached embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique key, e.g. a commit hash.
    pub id: String,

    /// The text the vector was computed from.
    pub source_text: String,

    /// The embedding vector.
    pub vector: Embedding,
}

impl EmbeddingRecord {
    /// Create a new record.
    pub fn new(id: impl Into<String>, source_text: impl Into<String>, vector: Embedding) -> Self {
        Self {
            id: id.into(),
            source_text: source_text.into(),
            vector,
        }
    }
}

/// Summary of what a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of records.
    pub records: usize,

    /// Shared vector length, `None` while the store is empty.
    pub dimension: Option<usize>,
}

/// Persistence for embedding records.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Short backend name for logs and stats.
    fn name(&self) -> &str;

    /// Insert or replace the record with `record.id`.
    async fn upsert(&self, record: EmbeddingRecord) -> Result<()>;

    /// Every record currently stored, in no particular order.
    async fn load_all(&self) -> Result<Vec<EmbeddingRecord>>;

    /// Record count and dimensionality.
    async fn stats(&self) -> Result<StoreStats> {
        let records = self.load_all().await?;
        Ok(StoreStats {
            records: records.len(),
            dimension: records.first().map(|r| r.vector.len()),
        })
    }
}

/// Fail unless `actual` matches the dimension already in the store.
pub(crate) fn check_dimension(existing: Option<usize>, actual: usize) -> Result<()> {
    match existing {
        Some(expected) if expected != actual => {
            Err(EmbeddingError::DimensionMismatch { expected, actual })
        }
        _ => Ok(()),
    }
}

/// Store that lives only as long as the process.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, EmbeddingRecord>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, record: EmbeddingRecord) -> Result<()> {
        let mut records = self.records.write().await;
        let existing = records
            .values()
            .find(|r| r.id != record.id)
            .map(|r| r.vector.len());
        check_dimension(existing, record.vector.len())?;

        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<EmbeddingRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

/// Value stored under each id in the JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    #[serde(default)]
    text: String,
    vector: Embedding,
}

/// Either the current layout or a bare vector.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Full(StoredEntry),
    Bare(Embedding),
}

impl From<RawEntry> for StoredEntry {
    fn from(raw: RawEntry) -> Self {
        match raw {
            RawEntry::Full(entry) => entry,
            RawEntry::Bare(vector) => StoredEntry {
                text: String::new(),
                vector,
            },
        }
    }
}

/// Store persisted as one JSON object.
///
/// The file is read once on [`open`](Self::open) and rewritten on every
/// upsert through a temporary sibling and a rename.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, StoredEntry>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::ReadFile(format!("{}: {e}", path.display())))?
        {
            Self::read_entries(&path).await?
        } else {
            debug!("No cache file at {}, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(path: &Path) -> Result<BTreeMap<String, StoredEntry>> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StorageError::ReadFile(format!("{}: {e}", path.display())))?;

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))?;

        let serde_json::Value::Object(map) = value else {
            return Err(StorageError::Corrupt(format!(
                "{}: top level is not a JSON object",
                path.display()
            ))
            .into());
        };

        let mut entries = BTreeMap::new();
        for (id, raw) in map {
            match serde_json::from_value::<RawEntry>(raw) {
                Ok(raw) => {
                    entries.insert(id, raw.into());
                }
                Err(e) => {
                    warn!("Skipping unreadable cache record {id}: {e}");
                }
            }
        }

        info!("Loaded {} cache entries from {}", entries.len(), path.display());
        Ok(entries)
    }

    async fn write_entries(&self, entries: &BTreeMap<String, StoredEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::CreateDirectory(format!("{}: {e}", parent.display())))?;
        }

        let content = serde_json::to_string(entries)?;

        let mut temp_path = OsString::from(self.path.as_os_str());
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        fs::write(&temp_path, content)
            .await
            .map_err(|e| StorageError::WriteFile(format!("{}: {e}", temp_path.display())))?;

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StorageError::WriteFile(format!("{}: {e}", self.path.display())))?;

        debug!("Saved {} cache entries to disk", entries.len());
        Ok(())
    }
}

#[async_trait]
impl EmbeddingStore for JsonFileStore {
    fn name(&self) -> &str {
        "json"
    }

    async fn upsert(&self, record: EmbeddingRecord) -> Result<()> {
        let mut entries = self.entries.write().await;
        let existing = entries
            .iter()
            .find(|(id, _)| **id != record.id)
            .map(|(_, e)| e.vector.len());
        check_dimension(existing, record.vector.len())?;

        let mut updated = entries.clone();
        updated.insert(
            record.id,
            StoredEntry {
                text: record.source_text,
                vector: record.vector,
            },
        );

        // Memory only changes once the file is in place.
        self.write_entries(&updated).await?;
        *entries = updated;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<EmbeddingRecord>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, e)| EmbeddingRecord::new(id.clone(), e.text.clone(), e.vector.clone()))
            .collect())
    }
}
