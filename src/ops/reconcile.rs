use std::collections::BTreeSet;
use std::fmt;

use crate::cache::Cache;
use crate::error::{ReconcileError, Result};
use crate::io::document::Document;
use crate::model::defaults::Defaults;
use crate::model::entry::{Entry, EntryId};
use crate::model::record::{Record, ShortId};
use crate::model::region::Region;
use crate::ops::sort::sort_region;
use crate::parse::line_serializer::format_entry;
use crate::warnings::Warning;

/// Difference between a region's filter results and what it displays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionDiff {
    /// Matching records not displayed yet, oldest first
    pub to_add: Vec<Record>,
    /// Displayed records that no longer match
    pub to_del: Vec<ShortId>,
    /// Records the filter matches, after the visibility rule
    pub matching: usize,
    /// Saved records displayed under the region
    pub displayed: usize,
}

impl RegionDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_del.is_empty()
    }
}

/// Lines added and removed while reconciling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub added: usize,
    pub removed: usize,
}

/// Compute the diff for the region at `pos` without changing anything
pub fn diff_region<D: Document>(cache: &mut Cache<D>, pos: usize) -> Result<Option<RegionDiff>> {
    let Some(region) = cache.get_region(pos)?.cloned() else {
        return Ok(None);
    };
    Ok(Some(compute_diff(cache, &region)?))
}

fn compute_diff<D: Document>(cache: &Cache<D>, region: &Region) -> Result<RegionDiff> {
    let mut matching = cache.stores().filter(&region.source, &region.filter)?;

    if !region.visible {
        let shown_elsewhere: BTreeSet<ShortId> = cache
            .entry_ids()
            .into_iter()
            .filter(|id| !region.tasks.contains(id))
            .filter_map(|id| cache.entry(id).and_then(|e| e.identifier.clone()))
            .collect();
        matching.retain(|record| {
            record
                .short_id()
                .is_none_or(|short| !shown_elsewhere.contains(&short))
        });
    }

    let displayed: BTreeSet<ShortId> = region
        .tasks
        .iter()
        .filter_map(|id| cache.entry(*id))
        .filter_map(|entry| entry.identifier.clone())
        .collect();
    let matched: BTreeSet<ShortId> = matching.iter().filter_map(Record::short_id).collect();

    let mut to_add: Vec<Record> = matching
        .into_iter()
        .filter(|record| record.short_id().is_some_and(|s| !displayed.contains(&s)))
        .collect();
    to_add.sort_by(|a, b| (a.entry, &a.identifier).cmp(&(b.entry, &b.identifier)));
    let to_del: Vec<ShortId> = displayed.difference(&matched).cloned().collect();

    Ok(RegionDiff {
        to_add,
        to_del,
        matching: matched.len(),
        displayed: displayed.len(),
    })
}

/// Bring the region at `pos` in line with its filter, then sort it
pub fn reconcile_region<D: Document>(
    cache: &mut Cache<D>,
    pos: usize,
) -> Result<ReconcileCounts> {
    let Some(region) = cache.get_region(pos)?.cloned() else {
        return Ok(ReconcileCounts::default());
    };
    let diff = compute_diff(cache, &region)?;
    let mut counts = ReconcileCounts::default();

    // Deletions, bottom up so earlier positions stay valid
    let mut doomed: Vec<(usize, EntryId)> = Vec::new();
    for id in &region.tasks {
        let Some(entry) = cache.entry(*id) else {
            continue;
        };
        if let Some(short) = &entry.identifier
            && diff.to_del.contains(short)
        {
            doomed.push((entry.position, *id));
        }
    }
    doomed.sort_by(|a, b| b.0.cmp(&a.0));
    for (line, id) in doomed {
        let Some(entry) = cache.entry(id) else {
            continue;
        };
        let tainted = cache
            .backing_record(id)
            .is_some_and(|record| entry.is_tainted(&record));
        if tainted {
            let description = entry.description.clone();
            cache.warn(Warning::UnsavedEditsKept {
                position: line,
                description,
            });
            continue;
        }
        cache.remove_line(line)?;
        counts.removed += 1;
    }

    // Additions, appended after the region's last task
    for record in diff.to_add {
        let task_count = cache.get_region(pos)?.map_or(0, |r| r.tasks.len());
        let line = pos + 1 + task_count;
        // Defaults only reach records that this pass will save
        let defaults = cache.buffer_has_authority().then_some(&region.defaults);
        let mut entry = Entry::from_record(&record, line, defaults);
        let text = format_entry(&entry);
        entry.rendered = Some(entry.line_view());
        cache.store_record(record);
        cache.insert_entry(text, entry)?;
        counts.added += 1;
    }

    tracing::debug!(
        region = %region.name,
        line = pos + 1,
        added = counts.added,
        removed = counts.removed,
        "region reconciled"
    );
    sort_region(cache, pos)?;
    Ok(counts)
}

/// Reconcile every loaded region, top to bottom. Problems confined to one
/// region become warnings and the remaining regions still run.
pub fn reconcile_all<D: Document>(cache: &mut Cache<D>) -> Result<ReconcileCounts> {
    let mut total = ReconcileCounts::default();
    let mut shift: isize = 0;
    for original in cache.region_positions() {
        let pos = original.saturating_add_signed(shift);
        let before = cache.document().len();
        match reconcile_region(cache, pos) {
            Ok(counts) => {
                total.added += counts.added;
                total.removed += counts.removed;
            }
            Err(err) if is_region_local(&err) => {
                cache.warn(Warning::RegionSkipped {
                    position: pos,
                    reason: err.to_string(),
                });
            }
            Err(err) => return cache.fail(err),
        }
        shift += cache.document().len() as isize - before as isize;
    }
    Ok(total)
}

fn is_region_local(err: &ReconcileError) -> bool {
    matches!(
        err,
        ReconcileError::Store(_) | ReconcileError::UndefinedContext(_) | ReconcileError::UnknownSource(_)
    )
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// Everything known about one region, for display
#[derive(Debug, Clone, PartialEq)]
pub struct RegionReport {
    pub name: String,
    pub position: usize,
    pub filter: Vec<String>,
    pub defaults: Defaults,
    pub sort: String,
    pub source: String,
    pub visible: bool,
    pub matching: usize,
    pub displayed: usize,
    pub to_add: Vec<ShortId>,
    pub to_del: Vec<ShortId>,
}

/// Describe the region at `pos` and its pending diff without mutating
/// the document or the stores
pub fn inspect_region<D: Document>(
    cache: &mut Cache<D>,
    pos: usize,
) -> Result<Option<RegionReport>> {
    let Some(region) = cache.get_region(pos)?.cloned() else {
        return Ok(None);
    };
    let diff = compute_diff(cache, &region)?;
    Ok(Some(RegionReport {
        name: region.name,
        position: region.position,
        filter: region.filter,
        defaults: region.defaults,
        sort: region.sort,
        source: region.source,
        visible: region.visible,
        matching: diff.matching,
        displayed: diff.displayed,
        to_add: diff.to_add.iter().filter_map(Record::short_id).collect(),
        to_del: diff.to_del,
    }))
}

impl fmt::Display for RegionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |ids: &[ShortId]| {
            ids.iter()
                .map(ShortId::render)
                .collect::<Vec<_>>()
                .join(" ")
        };
        writeln!(f, "Region:     {} (line {})", self.name, self.position + 1)?;
        writeln!(f, "Filter:     {}", self.filter.join(" "))?;
        writeln!(f, "Defaults:   {}", self.defaults)?;
        writeln!(f, "Sort:       {}", self.sort)?;
        writeln!(f, "Source:     {}", self.source)?;
        if !self.visible {
            writeln!(f, "Visible:    no")?;
        }
        writeln!(f, "Matching:   {}", self.matching)?;
        writeln!(f, "Displayed:  {}", self.displayed)?;
        writeln!(f, "To add:     {}", join(&self.to_add))?;
        write!(f, "To delete:  {}", join(&self.to_del))
    }
}
