//! Commands acting on the tasks shown on a set of selected lines.
//!
//! Each distinct record is changed once, however many selected lines show
//! it. Lines that hold no task or an unsaved task are skipped.

use std::collections::BTreeSet;

use crate::cache::Cache;
use crate::error::Result;
use crate::io::document::Document;
use crate::model::entry::EntryId;
use crate::model::record::{Record, ShortId, Status, StatusChange};
use crate::ops::sync::PassReport;

/// Mark the selected tasks done
pub fn complete<D: Document>(cache: &mut Cache<D>, positions: &[usize]) -> Result<PassReport> {
    apply(cache, positions, |_| Some(StatusChange::Complete))
}

/// Start the selected tasks
pub fn start<D: Document>(cache: &mut Cache<D>, positions: &[usize]) -> Result<PassReport> {
    apply(cache, positions, |_| Some(StatusChange::Start))
}

/// Stop the selected tasks
pub fn stop<D: Document>(cache: &mut Cache<D>, positions: &[usize]) -> Result<PassReport> {
    apply(cache, positions, |_| Some(StatusChange::Stop))
}

/// Start tasks that are not running, stop those that are
pub fn toggle<D: Document>(cache: &mut Cache<D>, positions: &[usize]) -> Result<PassReport> {
    apply(cache, positions, |record| {
        Some(if record.start.is_some() {
            StatusChange::Stop
        } else {
            StatusChange::Start
        })
    })
}

/// Delete the selected tasks and remove their lines
pub fn delete<D: Document>(cache: &mut Cache<D>, positions: &[usize]) -> Result<PassReport> {
    let mut report = apply(cache, positions, |_| Some(StatusChange::Delete))?;
    let mut lines: Vec<usize> = selected(cache, positions)?
        .into_iter()
        .filter_map(|id| cache.entry(id))
        .filter(|entry| entry.is_saved())
        .map(|entry| entry.position)
        .collect();
    lines.sort_unstable_by(|a, b| b.cmp(a));
    for line in lines {
        cache.remove_line(line)?;
        report.removed += 1;
    }
    cache.flush()?;
    Ok(report)
}

/// Entries on the selected lines, each line once, top to bottom
fn selected<D: Document>(cache: &mut Cache<D>, positions: &[usize]) -> Result<Vec<EntryId>> {
    let lines: BTreeSet<usize> = positions.iter().copied().collect();
    let mut ids = Vec::new();
    for line in lines {
        if let Some(id) = cache.get_entry(line)? {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn apply<D: Document>(
    cache: &mut Cache<D>,
    positions: &[usize],
    change_for: impl Fn(&Record) -> Option<StatusChange>,
) -> Result<PassReport> {
    let writes_before = cache.stores().total_writes();
    cache.reset()?;
    cache.set_buffer_authority(true);
    cache.load_records()?;

    let ids = selected(cache, positions)?;
    let mut done: BTreeSet<ShortId> = BTreeSet::new();
    for id in &ids {
        let Some(short) = cache.entry(*id).and_then(|e| e.identifier.clone()) else {
            tracing::debug!("skipping unsaved task in selection");
            continue;
        };
        if !done.insert(short.clone()) {
            continue;
        }
        let Some(record) = cache.cached_record(&short).cloned() else {
            continue;
        };
        let Some(change) = change_for(&record) else {
            continue;
        };
        if already_applied(&record, change) {
            continue;
        }
        let identifier = record.identifier.clone().unwrap_or_else(|| short.prefix().to_string());
        let updated = cache
            .stores_mut()
            .set_status(short.source(), &identifier, change)?;
        tracing::debug!(id = %short, ?change, "status changed");
        cache.store_record(updated);
    }

    for id in ids {
        let Some(short) = cache.entry(id).and_then(|e| e.identifier.clone()) else {
            continue;
        };
        let Some(record) = cache.cached_record(&short).cloned() else {
            continue;
        };
        if let Some(entry) = cache.entry_mut(id) {
            entry.update_from_record(&record);
        }
        cache.update_in_buffer(id)?;
    }
    cache.flush()?;

    Ok(PassReport {
        warnings: cache.take_warnings(),
        written: cache.stores().total_writes() - writes_before,
        added: 0,
        removed: 0,
    })
}

/// Completing a completed record or deleting a deleted one changes nothing
fn already_applied(record: &Record, change: StatusChange) -> bool {
    match change {
        StatusChange::Complete => record.status == Status::Completed,
        StatusChange::Delete => record.status == Status::Deleted,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::document::LineBuffer;
    use crate::io::memory_store::MemoryStore;
    use crate::io::store::{StoreRegistry, TaskStore};
    use crate::model::config::SyncConfig;
    use crate::model::record::DEFAULT_SOURCE;
    use pretty_assertions::assert_eq;

    fn setup(descriptions: &[&str]) -> (Cache<LineBuffer>, Vec<Record>) {
        let mut store = MemoryStore::new();
        let mut records = Vec::new();
        let mut lines = Vec::new();
        for description in descriptions {
            let mut draft = Record::draft(DEFAULT_SOURCE);
            draft.description = description.to_string();
            let saved = store.save(draft).unwrap();
            lines.push(format!("* [ ] {}  #{}", description, saved.short_id().unwrap()));
            records.push(saved);
        }
        let cache = Cache::new(
            LineBuffer::from_lines(lines),
            StoreRegistry::new(store),
            SyncConfig::default(),
        );
        (cache, records)
    }

    #[test]
    fn test_complete_marks_lines_done() {
        let (mut cache, records) = setup(&["a", "b"]);
        let report = complete(&mut cache, &[1]).unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(
            cache.document().lines()[1],
            format!("* [X] b  #{}", records[1].short_id().unwrap())
        );
        assert!(cache.document().lines()[0].starts_with("* [ ] a"));
    }

    #[test]
    fn test_duplicate_lines_change_record_once() {
        let (mut cache, records) = setup(&["a"]);
        let line = cache.document().lines()[0].clone();
        cache.document_mut().append(line);
        let report = start(&mut cache, &[0, 1, 1]).unwrap();
        assert_eq!(report.written, 1);
        let expected = format!("* [S] a  #{}", records[0].short_id().unwrap());
        assert_eq!(cache.document().lines(), &[expected.clone(), expected]);
    }

    #[test]
    fn test_completing_twice_writes_once() {
        let (mut cache, _) = setup(&["a"]);
        complete(&mut cache, &[0]).unwrap();
        let again = complete(&mut cache, &[0]).unwrap();
        assert_eq!(again.written, 0);
        assert_eq!(cache.stores().total_writes(), 1);
    }

    #[test]
    fn test_toggle_starts_then_stops() {
        let (mut cache, _) = setup(&["a"]);
        toggle(&mut cache, &[0]).unwrap();
        assert!(cache.document().lines()[0].starts_with("* [S] a"));
        toggle(&mut cache, &[0]).unwrap();
        assert!(cache.document().lines()[0].starts_with("* [ ] a"));
    }

    #[test]
    fn test_delete_removes_lines() {
        let (mut cache, records) = setup(&["a", "b", "c"]);
        let report = delete(&mut cache, &[0, 2]).unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(cache.document().len(), 1);
        let deleted = cache
            .stores()
            .get(&records[2].short_id().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(deleted.status, Status::Deleted);
    }

    #[test]
    fn test_unsaved_and_plain_lines_are_skipped() {
        let (mut cache, _) = setup(&["a"]);
        cache.document_mut().append("plain text".into());
        cache.document_mut().append("* [ ] not saved yet".into());
        let report = complete(&mut cache, &[1, 2]).unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(cache.document().lines()[2], "* [ ] not saved yet");
    }
}
