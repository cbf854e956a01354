//! The index store: every cached view of the document, keyed by line.
//!
//! Entries, regions, presets and parsed lines are keyed by position and
//! move together whenever a line is inserted, removed or swapped. Records
//! are keyed by short identifier and never move. All mutation of line
//! positions goes through [`Cache::insert_line`], [`Cache::remove_line`]
//! and [`Cache::swap_lines`].

mod load;
pub mod positional;

use std::collections::HashMap;

use crate::error::{ReconcileError, Result};
use crate::io::document::Document;
use crate::io::store::StoreRegistry;
use crate::model::config::SyncConfig;
use crate::model::entry::{Entry, EntryId};
use crate::model::record::{Record, ShortId};
use crate::model::region::{PresetHeader, Region};
use crate::parse::header_parser::HeaderLine;
use crate::parse::line_parser::{TaskFields, parse_task};
use crate::parse::line_serializer::format_entry;
use crate::warnings::{Warning, Warnings};

pub use positional::{PositionMap, ShiftCollision, Slot};

/// Key selecting one slice of the cache to drop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    /// Everything cached for one document line
    Position(usize),
    /// One cached store record
    Identifier(ShortId),
}

/// Cache over one open document and the stores it references
pub struct Cache<D: Document> {
    document: D,
    stores: StoreRegistry,
    config: SyncConfig,
    arena: Vec<Option<Entry>>,
    entries: PositionMap<EntryId>,
    records: HashMap<ShortId, Slot<Record>>,
    regions: PositionMap<Region>,
    presets: PositionMap<PresetHeader>,
    presets_loaded: bool,
    parsed_tasks: PositionMap<TaskFields>,
    parsed_headers: PositionMap<HeaderLine>,
    /// Whether line fields override record fields while loading
    buffer_has_authority: bool,
    warnings: Warnings,
    stale: bool,
}

impl<D: Document> Cache<D> {
    pub fn new(document: D, stores: StoreRegistry, config: SyncConfig) -> Self {
        Cache {
            document,
            stores,
            config,
            arena: Vec::new(),
            entries: PositionMap::default(),
            records: HashMap::new(),
            regions: PositionMap::default(),
            presets: PositionMap::default(),
            presets_loaded: false,
            parsed_tasks: PositionMap::default(),
            parsed_headers: PositionMap::default(),
            buffer_has_authority: true,
            warnings: Warnings::default(),
            stale: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn document(&self) -> &D {
        &self.document
    }

    /// Mutable access to the document. Cached views are not updated; run a
    /// pass or call [`Cache::reset`] after editing through this.
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn into_document(self) -> D {
        self.document
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.stores
    }

    pub fn stores_mut(&mut self) -> &mut StoreRegistry {
        &mut self.stores
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn buffer_has_authority(&self) -> bool {
        self.buffer_has_authority
    }

    /// Choose whether document lines (true) or store records (false) win
    /// when both describe the same task
    pub fn set_buffer_authority(&mut self, buffer: bool) {
        self.buffer_has_authority = buffer;
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.arena.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.arena.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Entry already loaded at `pos`, without touching the document
    pub fn entry_at(&self, pos: usize) -> Option<&Entry> {
        self.entries.present(pos).and_then(|id| self.entry(*id))
    }

    /// Loaded entries in document order
    pub fn entry_ids(&self) -> Vec<EntryId> {
        self.entries.iter().map(|(_, id)| *id).collect()
    }

    /// Positions of the regions loaded so far, top to bottom
    pub fn region_positions(&self) -> Vec<usize> {
        self.regions.iter().map(|(pos, _)| pos).collect()
    }

    /// Record already cached under `id`, without asking the store
    pub fn cached_record(&self, id: &ShortId) -> Option<&Record> {
        self.records.get(id).and_then(Slot::present)
    }

    pub(crate) fn store_record(&mut self, record: Record) {
        if let Some(short) = record.short_id() {
            self.records.insert(short, Slot::Present(record));
        }
    }

    /// Record behind an entry: the cached store record for saved entries,
    /// the draft otherwise
    pub fn backing_record(&self, id: EntryId) -> Option<Record> {
        let entry = self.entry(id)?;
        match &entry.identifier {
            Some(short) => self.cached_record(short).cloned(),
            None => Some(
                entry
                    .draft
                    .clone()
                    .unwrap_or_else(|| Record::draft(&entry.source)),
            ),
        }
    }

    /// The backing record with the entry's fields merged in
    pub fn effective_record(&self, id: EntryId) -> Option<Record> {
        let entry = self.entry(id)?;
        let mut record = self.backing_record(id)?;
        entry.merge_into(&mut record, chrono::Utc::now());
        Some(record)
    }

    /// Region that lists `id` among its tasks
    pub fn region_of(&self, id: EntryId) -> Option<&Region> {
        self.regions
            .iter()
            .map(|(_, region)| region)
            .find(|region| region.tasks.contains(&id))
    }

    /// Record `child` as a dependency of `parent` for the next persist
    pub fn add_dependency(&mut self, parent: EntryId, child: EntryId) {
        if let Some(entry) = self.entry_mut(parent)
            && !entry.add_dependencies.contains(&child)
        {
            entry.add_dependencies.push(child);
        }
    }

    pub(crate) fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// Hand the collected warnings to the caller
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        self.warnings.take()
    }

    pub(crate) fn register_entry(&mut self, entry: Entry) -> EntryId {
        let id = EntryId(self.arena.len());
        let pos = entry.position;
        self.arena.push(Some(entry));
        self.entries.set(pos, Slot::Present(id));
        id
    }

    pub(crate) fn ensure_fresh(&self) -> Result<()> {
        if self.stale {
            return Err(ReconcileError::Stale);
        }
        Ok(())
    }

    /// Mark the cache stale when `err` leaves it untrustworthy, then pass
    /// the error on
    pub(crate) fn fail<T>(&mut self, err: ReconcileError) -> Result<T> {
        if err.is_structural() {
            tracing::error!(error = %err, "cache marked stale");
            self.stale = true;
        }
        Err(err)
    }

    // -----------------------------------------------------------------------
    // Line operations
    // -----------------------------------------------------------------------

    /// Insert `text` as a new line at `pos` and shift every cached view at
    /// or below `pos` down by one
    pub fn insert_line(&mut self, text: String, pos: usize) -> Result<()> {
        self.ensure_fresh()?;
        let len = self.document.len();
        let written = if pos == len {
            self.document.append(text);
            Ok(())
        } else {
            self.document.insert(pos, text)
        };
        if let Err(e) = written {
            return self.fail(e.into());
        }
        self.shift_from(pos, 1)?;
        self.settle_region_runs();
        Ok(())
    }

    /// Insert the line for a new `entry` at its position and register it.
    /// A region whose run reaches the line picks the entry up.
    pub(crate) fn insert_entry(&mut self, text: String, entry: Entry) -> Result<EntryId> {
        self.ensure_fresh()?;
        let pos = entry.position;
        let written = if pos == self.document.len() {
            self.document.append(text);
            Ok(())
        } else {
            self.document.insert(pos, text)
        };
        if let Err(e) = written {
            return self.fail(e.into());
        }
        self.shift_from(pos, 1)?;
        let id = self.register_entry(entry);
        self.settle_region_runs();
        Ok(id)
    }

    /// Delete the line at `pos`, drop everything cached for it and shift
    /// the lines below up by one
    pub fn remove_line(&mut self, pos: usize) -> Result<()> {
        self.ensure_fresh()?;
        if let Err(e) = self.document.remove(pos) {
            return self.fail(e.into());
        }
        self.drop_position(pos);
        self.shift_from(pos + 1, -1)?;
        self.settle_region_runs();
        Ok(())
    }

    /// Exchange two lines together with everything cached for them
    pub fn swap_lines(&mut self, first: usize, second: usize) -> Result<()> {
        self.ensure_fresh()?;
        if first == second {
            return Ok(());
        }
        let (Some(a), Some(b)) = (
            self.document.line(first).map(str::to_string),
            self.document.line(second).map(str::to_string),
        ) else {
            return self.fail(ReconcileError::Coherence(format!(
                "cannot swap lines {} and {} of a {} line document",
                first,
                second,
                self.document.len()
            )));
        };
        let swapped = self
            .document
            .set_line(first, b)
            .and_then(|_| self.document.set_line(second, a));
        if let Err(e) = swapped {
            return self.fail(e.into());
        }
        self.entries.swap(first, second);
        self.regions.swap(first, second);
        self.presets.swap(first, second);
        self.parsed_tasks.swap(first, second);
        self.parsed_headers.swap(first, second);
        self.restamp();
        self.settle_region_runs();
        Ok(())
    }

    /// Drop every cached view and re-read the stores
    pub fn reset(&mut self) -> Result<()> {
        self.arena.clear();
        self.entries.clear();
        self.records.clear();
        self.regions.clear();
        self.presets.clear();
        self.presets_loaded = false;
        self.parsed_tasks.clear();
        self.parsed_headers.clear();
        self.stale = false;
        self.stores.refresh_all()?;
        tracing::debug!(lines = self.document.len(), "cache reset");
        Ok(())
    }

    /// Forget one cached slice so it is rebuilt on the next access
    pub fn invalidate(&mut self, key: CacheKey) {
        match key {
            CacheKey::Position(pos) => {
                self.drop_position(pos);
                // Presets accumulate from the headers above, so any header
                // change invalidates the whole hierarchy
                self.presets.clear();
                self.presets_loaded = false;
            }
            CacheKey::Identifier(short) => {
                self.records.remove(&short);
            }
        }
    }

    /// Write an entry back to its line if the line no longer shows it
    pub fn update_in_buffer(&mut self, id: EntryId) -> Result<bool> {
        self.ensure_fresh()?;
        let Some(entry) = self.entry(id) else {
            return Ok(false);
        };
        if !entry.needs_render() {
            return Ok(false);
        }
        let pos = entry.position;
        let view = entry.line_view();
        let line = format_entry(entry);
        self.parsed_tasks.set(
            pos,
            match parse_task(&line) {
                Some(fields) => Slot::Present(fields),
                None => Slot::Absent,
            },
        );
        if let Err(e) = self.document.set_line(pos, line) {
            return self.fail(e.into());
        }
        if let Some(entry) = self.entry_mut(id) {
            entry.rendered = Some(view);
        }
        Ok(true)
    }

    /// Write every loaded entry back to the document
    pub fn write_back(&mut self) -> Result<usize> {
        let mut rewritten = 0;
        for id in self.entry_ids() {
            if self.update_in_buffer(id)? {
                rewritten += 1;
            }
        }
        tracing::debug!(rewritten, "entries written back");
        Ok(rewritten)
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Err(e) = self.document.flush() {
            return self.fail(e.into());
        }
        Ok(())
    }

    /// Verify that positional keys agree with the objects they hold and
    /// that every saved entry has a cached record
    pub fn check_coherence(&self) -> Result<()> {
        for (pos, id) in self.entries.iter() {
            let Some(entry) = self.entry(*id) else {
                return Err(ReconcileError::Coherence(format!(
                    "line {} maps to a dropped entry",
                    pos + 1
                )));
            };
            if entry.position != pos {
                return Err(ReconcileError::Coherence(format!(
                    "entry keyed at line {} claims line {}",
                    pos + 1,
                    entry.position + 1
                )));
            }
            if let Some(short) = &entry.identifier
                && self.cached_record(short).is_none()
            {
                return Err(ReconcileError::Coherence(format!(
                    "entry at line {} references uncached record {}",
                    pos + 1,
                    short
                )));
            }
        }
        for (pos, region) in self.regions.iter() {
            if region.position != pos {
                return Err(ReconcileError::Coherence(format!(
                    "region keyed at line {} claims line {}",
                    pos + 1,
                    region.position + 1
                )));
            }
            for (offset, task) in region.tasks.iter().enumerate() {
                let expected = pos + 1 + offset;
                if self.entries.present(expected) != Some(task) {
                    return Err(ReconcileError::Coherence(format!(
                        "region at line {} lost track of line {}",
                        pos + 1,
                        expected + 1
                    )));
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn drop_position(&mut self, pos: usize) {
        if let Some(Slot::Present(id)) = self.entries.remove(pos) {
            if let Some(slot) = self.arena.get_mut(id.0) {
                *slot = None;
            }
            for (_, region) in self.regions.iter_mut() {
                region.tasks.retain(|task| *task != id);
            }
            for entry in self.arena.iter_mut().flatten() {
                entry.add_dependencies.retain(|child| *child != id);
                if entry.parent == Some(id) {
                    entry.parent = None;
                }
            }
        }
        self.regions.remove(pos);
        self.presets.remove(pos);
        self.parsed_tasks.remove(pos);
        self.parsed_headers.remove(pos);
    }

    /// Shift all positional maps together. Every map is checked before any
    /// of them moves.
    fn shift_from(&mut self, from: usize, delta: isize) -> Result<()> {
        let checks = [
            self.entries.check_shift(from, delta),
            self.regions.check_shift(from, delta),
            self.presets.check_shift(from, delta),
            self.parsed_tasks.check_shift(from, delta),
            self.parsed_headers.check_shift(from, delta),
        ];
        if let Some(Err(collision)) = checks.into_iter().find(|c| c.is_err()) {
            return self.fail(ReconcileError::Coherence(format!(
                "shifting from line {} by {} collides at line {}",
                from + 1,
                delta,
                collision.position + 1
            )));
        }
        self.entries.shift(from, delta);
        self.regions.shift(from, delta);
        self.presets.shift(from, delta);
        self.parsed_tasks.shift(from, delta);
        self.parsed_headers.shift(from, delta);
        self.restamp();
        Ok(())
    }

    /// Rebuild each region's task list from the entries now directly below
    /// its header. A region whose run continues into a line that was never
    /// loaded is dropped and rebuilt on its next access.
    fn settle_region_runs(&mut self) {
        let positions: Vec<usize> = self.regions.iter().map(|(pos, _)| pos).collect();
        for pos in positions {
            let mut run = Vec::new();
            let mut next = pos + 1;
            while let Some(id) = self.entries.present(next) {
                run.push(*id);
                next += 1;
            }
            let unloaded_task =
                self.entries.get(next).is_none() && self.task_fields(next).is_some();
            if unloaded_task {
                tracing::debug!(line = pos + 1, "region run changed, dropping region");
                self.regions.remove(pos);
                continue;
            }
            if let Some(region) = self.regions.get_mut(pos)
                && region.tasks != run
            {
                region.tasks = run;
            }
        }
    }

    /// Copy map keys back into the objects' own position fields
    fn restamp(&mut self) {
        for (pos, id) in self.entries.iter() {
            if let Some(Some(entry)) = self.arena.get_mut(id.0) {
                entry.position = pos;
            }
        }
        for (pos, region) in self.regions.iter_mut() {
            region.position = pos;
        }
        for (pos, preset) in self.presets.iter_mut() {
            preset.position = pos;
        }
    }
}

impl<D: Document + std::fmt::Debug> std::fmt::Debug for Cache<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("document", &self.document)
            .field("stores", &self.stores)
            .field("entries", &self.entries.len())
            .field("records", &self.records.len())
            .field("regions", &self.regions.len())
            .field("stale", &self.stale)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::document::LineBuffer;
    use crate::io::memory_store::MemoryStore;
    use crate::io::store::TaskStore;
    use crate::model::record::DEFAULT_SOURCE;
    use pretty_assertions::assert_eq;

    fn cache_for(text: &str) -> Cache<LineBuffer> {
        Cache::new(
            LineBuffer::from_text(text),
            StoreRegistry::new(MemoryStore::new()),
            SyncConfig::default(),
        )
    }

    fn positions(cache: &Cache<LineBuffer>) -> Vec<(usize, String)> {
        cache
            .entry_ids()
            .into_iter()
            .filter_map(|id| cache.entry(id))
            .map(|e| (e.position, e.description.clone()))
            .collect()
    }

    #[test]
    fn test_lazy_entry_and_tombstone() {
        let mut cache = cache_for("Intro\n* [ ] first\n");
        assert_eq!(cache.get_entry(0).unwrap(), None);
        assert_eq!(cache.entries.get(0), Some(&Slot::Absent));
        let id = cache.get_entry(1).unwrap().unwrap();
        assert_eq!(cache.entry(id).unwrap().description, "first");
        assert_eq!(cache.get_entry(1).unwrap(), Some(id));
    }

    #[test]
    fn test_insert_shifts_entries() {
        let mut cache = cache_for("* [ ] a\n* [ ] b\n");
        cache.load_entries().unwrap();
        cache.insert_line("Note".into(), 1).unwrap();
        assert_eq!(
            positions(&cache),
            vec![(0, "a".to_string()), (2, "b".to_string())]
        );
        assert_eq!(cache.document().lines()[1], "Note");
        cache.check_coherence().unwrap();
    }

    #[test]
    fn test_insert_at_end_appends() {
        let mut cache = cache_for("* [ ] a\n");
        cache.insert_line("* [ ] b".into(), 1).unwrap();
        assert_eq!(cache.document().lines(), &["* [ ] a", "* [ ] b"]);
    }

    #[test]
    fn test_remove_drops_and_shifts() {
        let mut cache = cache_for("* [ ] a\n    * [ ] child\n* [ ] b\n");
        cache.load_entries().unwrap();
        let parent = cache.get_entry(0).unwrap().unwrap();
        assert_eq!(cache.entry(parent).unwrap().add_dependencies.len(), 1);

        cache.remove_line(1).unwrap();
        assert_eq!(
            positions(&cache),
            vec![(0, "a".to_string()), (1, "b".to_string())]
        );
        assert!(cache.entry(parent).unwrap().add_dependencies.is_empty());
        cache.check_coherence().unwrap();
    }

    #[test]
    fn test_swap_moves_entries_with_lines() {
        let mut cache = cache_for("* [ ] a\nplain\n* [ ] b\n");
        cache.load_entries().unwrap();
        cache.swap_lines(0, 2).unwrap();
        assert_eq!(cache.document().lines(), &["* [ ] b", "plain", "* [ ] a"]);
        assert_eq!(
            positions(&cache),
            vec![(0, "b".to_string()), (2, "a".to_string())]
        );
        assert_eq!(cache.get_entry(1).unwrap(), None);
    }

    fn region_tasks(cache: &mut Cache<LineBuffer>, pos: usize) -> Vec<String> {
        let tasks = cache.get_region(pos).unwrap().unwrap().tasks.clone();
        tasks
            .into_iter()
            .map(|id| cache.entry(id).unwrap().description.clone())
            .collect()
    }

    #[test]
    fn test_note_under_header_ends_region_run() {
        let mut cache = cache_for("== W | +work ==\n* [ ] a\n");
        cache.load_entries().unwrap();
        cache.load_regions().unwrap();
        cache.insert_line("note".into(), 1).unwrap();
        cache.check_coherence().unwrap();
        assert!(region_tasks(&mut cache, 0).is_empty());
    }

    #[test]
    fn test_swap_out_of_region_run() {
        let mut cache = cache_for("== W | +work ==\n* [ ] a\n\n* [ ] x\n");
        cache.load_entries().unwrap();
        cache.load_regions().unwrap();
        cache.swap_lines(1, 3).unwrap();
        cache.check_coherence().unwrap();
        assert_eq!(region_tasks(&mut cache, 0), vec!["x"]);
    }

    #[test]
    fn test_unloaded_task_in_run_rebuilds_region() {
        let mut cache = cache_for("== W | +work ==\n* [ ] a\n");
        cache.load_regions().unwrap();
        cache.insert_line("* [ ] b".into(), 1).unwrap();
        cache.check_coherence().unwrap();
        assert_eq!(region_tasks(&mut cache, 0), vec!["b", "a"]);
    }

    #[test]
    fn test_stale_cache_refuses_until_reset() {
        let mut cache = cache_for("* [ ] a\n");
        let err = cache.swap_lines(0, 5).unwrap_err();
        assert!(matches!(err, ReconcileError::Coherence(_)));
        assert!(cache.is_stale());
        assert!(matches!(cache.get_entry(0), Err(ReconcileError::Stale)));
        cache.reset().unwrap();
        assert!(cache.get_entry(0).unwrap().is_some());
    }

    #[test]
    fn test_invalidate_identifier_refetches() {
        let mut store = MemoryStore::new();
        let mut draft = Record::draft(DEFAULT_SOURCE);
        draft.description = "stored".into();
        let saved = store.save(draft).unwrap();
        let short = saved.short_id().unwrap();
        let mut cache = Cache::new(
            LineBuffer::from_text(""),
            StoreRegistry::new(store),
            SyncConfig::default(),
        );
        assert!(cache.get_record(&short).unwrap().is_some());
        cache.invalidate(CacheKey::Identifier(short.clone()));
        assert!(cache.cached_record(&short).is_none());
        assert_eq!(
            cache.get_record(&short).unwrap().unwrap().description,
            "stored"
        );
    }

    #[test]
    fn test_update_in_buffer_only_rewrites_changed_lines() {
        let mut cache = cache_for("* [ ] odd  !!\n* [ ] b\n");
        cache.load_entries().unwrap();
        assert_eq!(cache.write_back().unwrap(), 0);
        let id = cache.get_entry(1).unwrap().unwrap();
        cache.entry_mut(id).unwrap().description = "b, edited".into();
        assert_eq!(cache.write_back().unwrap(), 1);
        assert_eq!(cache.document().lines()[1], "* [ ] b, edited");
    }
}
