use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::io::lock::LockError;
use crate::model::record::{DEFAULT_SOURCE, Record, ShortId, StatusChange};

/// Error type for task store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(String),
    #[error("identifier {prefix} is ambiguous in source {store}: {}", .candidates.join(", "))]
    Ambiguous {
        prefix: String,
        store: String,
        candidates: Vec<String>,
    },
    #[error("source {0} is not configured")]
    UnknownSource(String),
    #[error("context {0} is not defined")]
    UnknownContext(String),
    #[error("invalid filter: {0}")]
    Query(String),
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid store data: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// An external store owning the authoritative task records.
pub trait TaskStore {
    /// Look up one record by short or full identifier
    fn get(&self, id: &ShortId) -> Result<Option<Record>, StoreError>;

    /// Batch lookup. Returns at most one record per prefix; a prefix shared
    /// by several records is an [`StoreError::Ambiguous`] error.
    fn get_many(&self, prefixes: &[String]) -> Result<Vec<Record>, StoreError>;

    /// Records matching a filter expression
    fn filter(&self, tokens: &[String]) -> Result<Vec<Record>, StoreError>;

    /// Create or update a record. Assigns the identifier and creation time
    /// of a record saved for the first time.
    fn save(&mut self, record: Record) -> Result<Record, StoreError>;

    fn set_status(&mut self, identifier: &str, change: StatusChange) -> Result<Record, StoreError>;

    /// Definition of a named filter
    fn context(&self, name: &str) -> Option<String>;

    /// Drop anything cached from the backing storage
    fn refresh(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// The named stores a document talks to, routed by source key.
///
/// Every returned record is stamped with the key it came from. Writes are
/// counted per source.
pub struct StoreRegistry {
    stores: BTreeMap<String, Box<dyn TaskStore>>,
    contexts: BTreeMap<String, String>,
    writes: BTreeMap<String, usize>,
}

impl StoreRegistry {
    pub fn new(default: impl TaskStore + 'static) -> Self {
        let mut registry = StoreRegistry {
            stores: BTreeMap::new(),
            contexts: BTreeMap::new(),
            writes: BTreeMap::new(),
        };
        registry.insert(DEFAULT_SOURCE, default);
        registry
    }

    pub fn with_source(mut self, key: &str, store: impl TaskStore + 'static) -> Self {
        self.insert(key, store);
        self
    }

    pub fn insert(&mut self, key: &str, store: impl TaskStore + 'static) {
        self.stores.insert(key.to_string(), Box::new(store));
    }

    /// Named filters that apply to every source, consulted after the store's own
    pub fn set_contexts(&mut self, contexts: BTreeMap<String, String>) {
        self.contexts = contexts;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.stores.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    fn store(&self, key: &str) -> Result<&dyn TaskStore, StoreError> {
        self.stores
            .get(key)
            .map(|s| s.as_ref())
            .ok_or_else(|| StoreError::UnknownSource(key.to_string()))
    }

    /// Direct access to one store, bypassing the write counter
    pub fn store_mut(&mut self, key: &str) -> Result<&mut dyn TaskStore, StoreError> {
        match self.stores.get_mut(key) {
            Some(store) => Ok(store.as_mut()),
            None => Err(StoreError::UnknownSource(key.to_string())),
        }
    }

    pub fn get(&self, id: &ShortId) -> Result<Option<Record>, StoreError> {
        let record = self.store(id.source())?.get(id)?;
        Ok(record.map(|r| stamp(r, id.source())))
    }

    pub fn get_many(&self, source: &str, prefixes: &[String]) -> Result<Vec<Record>, StoreError> {
        if prefixes.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.store(source)?.get_many(prefixes)?;
        tracing::debug!(source, requested = prefixes.len(), found = records.len(), "batch lookup");
        Ok(records.into_iter().map(|r| stamp(r, source)).collect())
    }

    pub fn filter(&self, source: &str, tokens: &[String]) -> Result<Vec<Record>, StoreError> {
        let records = self.store(source)?.filter(tokens)?;
        Ok(records.into_iter().map(|r| stamp(r, source)).collect())
    }

    pub fn save(&mut self, record: Record) -> Result<Record, StoreError> {
        let source = record.source.clone();
        let store = self.store_mut(&source)?;
        let saved = store.save(record)?;
        *self.writes.entry(source.clone()).or_default() += 1;
        tracing::debug!(source = %source, id = ?saved.identifier, "record saved");
        Ok(stamp(saved, &source))
    }

    pub fn set_status(
        &mut self,
        source: &str,
        identifier: &str,
        change: StatusChange,
    ) -> Result<Record, StoreError> {
        let record = self.store_mut(source)?.set_status(identifier, change)?;
        *self.writes.entry(source.to_string()).or_default() += 1;
        Ok(stamp(record, source))
    }

    pub fn context(&self, source: &str, name: &str) -> Option<String> {
        self.store(source)
            .ok()
            .and_then(|s| s.context(name))
            .or_else(|| self.contexts.get(name).cloned())
    }

    pub fn refresh_all(&mut self) -> Result<(), StoreError> {
        for store in self.stores.values_mut() {
            store.refresh()?;
        }
        Ok(())
    }

    /// Writes sent to `source` since the registry was created
    pub fn write_count(&self, source: &str) -> usize {
        self.writes.get(source).copied().unwrap_or(0)
    }

    pub fn total_writes(&self) -> usize {
        self.writes.values().sum()
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("sources", &self.stores.keys().collect::<Vec<_>>())
            .field("writes", &self.writes)
            .finish()
    }
}

fn stamp(mut record: Record, source: &str) -> Record {
    record.source = source.to_string();
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory_store::MemoryStore;

    fn draft(description: &str, source: &str) -> Record {
        let mut record = Record::draft(source);
        record.description = description.into();
        record
    }

    #[test]
    fn test_routes_by_source_and_counts_writes() {
        let mut registry = StoreRegistry::new(MemoryStore::new()).with_source("W", MemoryStore::new());
        let home = registry.save(draft("home", DEFAULT_SOURCE)).unwrap();
        let work = registry.save(draft("work", "W")).unwrap();

        assert_eq!(home.source, DEFAULT_SOURCE);
        assert_eq!(work.source, "W");
        assert_eq!(registry.write_count(DEFAULT_SOURCE), 1);
        assert_eq!(registry.write_count("W"), 1);
        assert_eq!(registry.total_writes(), 2);

        let found = registry.get(&work.short_id().unwrap()).unwrap().unwrap();
        assert_eq!(found.description, "work");
        assert!(registry.get(&ShortId::new(work.identifier.as_deref().unwrap(), DEFAULT_SOURCE))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unknown_source() {
        let mut registry = StoreRegistry::new(MemoryStore::new());
        let err = registry.save(draft("x", "Q")).unwrap_err();
        assert!(matches!(err, StoreError::UnknownSource(key) if key == "Q"));
        assert_eq!(registry.total_writes(), 0);
    }

    #[test]
    fn test_registry_contexts_are_a_fallback() {
        let mut store = MemoryStore::new();
        store.set_context("work", "+work");
        let mut registry = StoreRegistry::new(store);
        registry.set_contexts(BTreeMap::from([
            ("work".to_string(), "+office".to_string()),
            ("home".to_string(), "+home".to_string()),
        ]));
        assert_eq!(registry.context(DEFAULT_SOURCE, "work").as_deref(), Some("+work"));
        assert_eq!(registry.context(DEFAULT_SOURCE, "home").as_deref(), Some("+home"));
        assert_eq!(registry.context(DEFAULT_SOURCE, "gym"), None);
    }
}
