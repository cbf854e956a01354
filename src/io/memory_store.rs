use std::collections::BTreeMap;

use chrono::Utc;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::io::query::{Query, QueryContext};
use crate::io::store::{StoreError, TaskStore};
use crate::model::record::{Record, SHORT_ID_LEN, ShortId, StatusChange};

/// Task store held entirely in memory, keyed by full identifier
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: IndexMap<String, Record>,
    contexts: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(records: Vec<Record>, contexts: BTreeMap<String, String>) -> Self {
        MemoryStore {
            records: records
                .into_iter()
                .filter_map(|r| r.identifier.clone().map(|id| (id, r)))
                .collect(),
            contexts,
        }
    }

    pub fn set_context(&mut self, name: &str, definition: &str) {
        self.contexts
            .insert(name.to_string(), definition.to_string());
    }

    pub fn contexts(&self) -> &BTreeMap<String, String> {
        &self.contexts
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Find the single record whose identifier starts with `prefix`
    pub fn find(&self, prefix: &str) -> Result<Option<&Record>, StoreError> {
        let prefix = prefix.to_ascii_lowercase();
        if let Some(record) = self.records.get(&prefix) {
            return Ok(Some(record));
        }
        let short: String = prefix.chars().take(SHORT_ID_LEN).collect();
        let candidates: Vec<&Record> = self
            .records
            .iter()
            .filter(|(id, _)| id.to_ascii_lowercase().starts_with(&prefix))
            .map(|(_, r)| r)
            .collect();
        match candidates.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(*one)),
            many => Err(StoreError::Ambiguous {
                prefix: short,
                store: many[0].source.clone(),
                candidates: many
                    .iter()
                    .filter_map(|r| r.identifier.clone())
                    .collect(),
            }),
        }
    }
}

impl TaskStore for MemoryStore {
    fn get(&self, id: &ShortId) -> Result<Option<Record>, StoreError> {
        Ok(self.find(id.prefix())?.cloned())
    }

    fn get_many(&self, prefixes: &[String]) -> Result<Vec<Record>, StoreError> {
        let mut found = Vec::new();
        for prefix in prefixes {
            if let Some(record) = self.find(prefix)?
                && !found.iter().any(|r: &Record| r.identifier == record.identifier)
            {
                found.push(record.clone());
            }
        }
        Ok(found)
    }

    fn filter(&self, tokens: &[String]) -> Result<Vec<Record>, StoreError> {
        let query = Query::parse(tokens)?;
        let ctx = QueryContext {
            records: &self.records,
            now: Utc::now(),
        };
        Ok(self
            .records
            .values()
            .filter(|r| query.matches(r, &ctx))
            .cloned()
            .collect())
    }

    fn save(&mut self, mut record: Record) -> Result<Record, StoreError> {
        let identifier = match record.identifier.clone() {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                record.identifier = Some(id.clone());
                id
            }
        };
        if record.entry.is_none() {
            record.entry = self
                .records
                .get(&identifier)
                .and_then(|existing| existing.entry)
                .or_else(|| Some(Utc::now()));
        }
        self.records.insert(identifier, record.clone());
        Ok(record)
    }

    fn set_status(&mut self, identifier: &str, change: StatusChange) -> Result<Record, StoreError> {
        let key = self
            .find(identifier)?
            .and_then(|r| r.identifier.clone())
            .ok_or_else(|| StoreError::NotFound(identifier.to_string()))?;
        let record = self
            .records
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(identifier.to_string()))?;
        record.apply_status(change, Utc::now());
        Ok(record.clone())
    }

    fn context(&self, name: &str) -> Option<String> {
        self.contexts.get(name).cloned()
    }
}
