use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::io::lock::{DEFAULT_LOCK_TIMEOUT, StoreLock};
use crate::io::memory_store::MemoryStore;
use crate::io::recovery::{self, RescueKind};
use crate::io::store::{StoreError, TaskStore};
use crate::model::record::{Record, ShortId, StatusChange};

/// On-disk layout of a JSON store
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    contexts: BTreeMap<String, String>,
}

/// A [`MemoryStore`] persisted as one JSON file.
///
/// Every write takes the file lock, re-reads the file so changes made by
/// other writers are kept, applies the change and writes the file back
/// atomically.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(JsonFileStore {
            path: path.to_path_buf(),
            inner: read_store(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.inner.records()
    }

    fn write_locked<T>(
        &mut self,
        change: impl FnOnce(&mut MemoryStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _lock = StoreLock::acquire(&self.path, DEFAULT_LOCK_TIMEOUT)?;
        self.inner = read_store(&self.path)?;
        let result = change(&mut self.inner)?;
        self.persist()?;
        Ok(result)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let file = StoreFile {
            records: self.inner.records().cloned().collect(),
            contexts: self.inner.contexts().clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        if let Err(e) = recovery::write_or_rescue(&self.path, &content, RescueKind::Store) {
            return Err(StoreError::WriteError {
                path: self.path.clone(),
                source: e,
            });
        }
        Ok(())
    }
}

fn read_store(path: &Path) -> Result<MemoryStore, StoreError> {
    if !path.exists() {
        return Ok(MemoryStore::new());
    }
    let text = fs::read_to_string(path).map_err(|e| StoreError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    if text.trim().is_empty() {
        return Ok(MemoryStore::new());
    }
    let file: StoreFile = serde_json::from_str(&text)?;
    Ok(MemoryStore::from_parts(file.records, file.contexts))
}

impl TaskStore for JsonFileStore {
    fn get(&self, id: &ShortId) -> Result<Option<Record>, StoreError> {
        self.inner.get(id)
    }

    fn get_many(&self, prefixes: &[String]) -> Result<Vec<Record>, StoreError> {
        self.inner.get_many(prefixes)
    }

    fn filter(&self, tokens: &[String]) -> Result<Vec<Record>, StoreError> {
        self.inner.filter(tokens)
    }

    fn save(&mut self, record: Record) -> Result<Record, StoreError> {
        self.write_locked(|store| store.save(record))
    }

    fn set_status(&mut self, identifier: &str, change: StatusChange) -> Result<Record, StoreError> {
        self.write_locked(|store| store.set_status(identifier, change))
    }

    fn context(&self, name: &str) -> Option<String> {
        self.inner.context(name)
    }

    fn refresh(&mut self) -> Result<(), StoreError> {
        self.inner = read_store(&self.path)?;
        Ok(())
    }
}
