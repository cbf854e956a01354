use std::collections::BTreeSet;

use chrono::Utc;

use crate::cache::Cache;
use crate::error::{CycleMember, ReconcileError, Result};
use crate::io::document::Document;
use crate::model::entry::EntryId;
use crate::model::record::Record;

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Emits items only after all of their pending dependencies.
///
/// Each step scans the working set for an item none of whose dependencies
/// are still waiting; dependencies outside the set count as satisfied. When
/// no item can move, the stuck set is yielded once as `Err` and iteration
/// ends.
#[derive(Debug, Clone)]
pub struct Scheduler<K> {
    pending: Vec<(K, Vec<K>)>,
    stuck: bool,
}

impl<K: Copy + Eq> Scheduler<K> {
    pub fn new(items: impl IntoIterator<Item = (K, Vec<K>)>) -> Self {
        Scheduler {
            pending: items.into_iter().collect(),
            stuck: false,
        }
    }
}

impl<K: Copy + Eq> Iterator for Scheduler<K> {
    type Item = std::result::Result<K, Vec<K>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stuck || self.pending.is_empty() {
            return None;
        }
        let ready = self.pending.iter().position(|(_, deps)| {
            !deps
                .iter()
                .any(|dep| self.pending.iter().any(|(key, _)| key == dep))
        });
        match ready {
            Some(idx) => Some(Ok(self.pending.remove(idx).0)),
            None => {
                self.stuck = true;
                Some(Err(self.pending.iter().map(|(key, _)| *key).collect()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Saving
// ---------------------------------------------------------------------------

/// Save every entry that differs from its record, children before parents.
/// Returns the number of store writes.
///
/// The whole order is worked out before the first write, so a dependency
/// cycle anywhere leaves the stores untouched. A successful batch consumes
/// every entry's `add_dependencies`.
pub fn persist_all<D: Document>(cache: &mut Cache<D>) -> Result<usize> {
    let items: Vec<(EntryId, Vec<EntryId>)> = cache
        .entry_ids()
        .into_iter()
        .filter_map(|id| {
            cache
                .entry(id)
                .map(|entry| (id, entry.add_dependencies.clone()))
        })
        .collect();

    let order = match Scheduler::new(items).collect::<std::result::Result<Vec<_>, _>>() {
        Ok(order) => order,
        Err(stuck) => {
            let entries = stuck
                .into_iter()
                .filter_map(|id| cache.entry(id))
                .map(|entry| CycleMember {
                    position: entry.position,
                    description: entry.description.clone(),
                })
                .collect();
            return Err(ReconcileError::DependencyCycle { entries });
        }
    };

    let mut written = 0;
    for id in &order {
        if save_entry(cache, *id)? {
            written += 1;
        }
    }
    for id in order {
        if let Some(entry) = cache.entry_mut(id) {
            entry.add_dependencies.clear();
            entry.links_persisted = true;
        }
    }
    tracing::info!(written, "entries persisted");
    Ok(written)
}

/// Push one entry to its store when it differs from its record or was
/// never saved. Returns whether a write happened.
///
/// The first save after a load rebuilds dependencies on tasks of the
/// entry's own region from its current children. Later saves only add
/// links made since. Dependencies on anything else are kept.
pub fn save_entry<D: Document>(cache: &mut Cache<D>, id: EntryId) -> Result<bool> {
    let Some(entry) = cache.entry(id).cloned() else {
        return Ok(false);
    };
    let Some(base) = cache.backing_record(id) else {
        return Err(ReconcileError::Coherence(format!(
            "entry at line {} has no record",
            entry.position + 1
        )));
    };

    let region_ids = match cache.region_of(id) {
        Some(region) => full_identifiers(cache, &region.tasks),
        None => BTreeSet::new(),
    };
    let child_ids = full_identifiers(cache, &entry.add_dependencies);

    let mut record = base.clone();
    let fields_changed = entry.merge_into(&mut record, Utc::now());
    if !entry.links_persisted {
        record.depends.retain(|dep| !region_ids.contains(dep));
    }
    record.depends.extend(child_ids);

    if entry.is_saved() && !fields_changed && record.depends == base.depends {
        return Ok(false);
    }

    let saved = cache.stores_mut().save(record)?;
    tracing::debug!(
        line = entry.position + 1,
        id = ?saved.identifier,
        new = !entry.is_saved(),
        "entry saved"
    );
    if let Some(entry) = cache.entry_mut(id) {
        entry.update_from_record(&saved);
    }
    cache.store_record(saved);
    Ok(true)
}

fn full_identifiers<D: Document>(cache: &Cache<D>, ids: &[EntryId]) -> BTreeSet<String> {
    ids.iter()
        .filter_map(|id| cache.entry(*id))
        .filter_map(|entry| entry.identifier.as_ref())
        .filter_map(|short| cache.cached_record(short))
        .filter_map(|record: &Record| record.identifier.clone())
        .collect()
}
