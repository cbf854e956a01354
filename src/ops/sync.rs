use crate::cache::Cache;
use crate::error::Result;
use crate::io::document::Document;
use crate::ops::persist::persist_all;
use crate::ops::reconcile::reconcile_all;
use crate::warnings::Warning;

/// What a pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub warnings: Vec<Warning>,
    /// Store writes
    pub written: usize,
    /// Lines inserted for records new to a region
    pub added: usize,
    /// Lines removed because their record left a region
    pub removed: usize,
}

/// Push the document to the stores. Run when the document is saved: line
/// fields win over record fields, new lines become records, regions are
/// refreshed and identifiers are written back.
pub fn sync_to_store<D: Document>(cache: &mut Cache<D>) -> Result<PassReport> {
    let result = run_to_store(cache);
    finish(cache, result)
}

/// Pull the stores into the document. Run when the document is opened or
/// refreshed: record fields win and nothing is written to the stores.
pub fn sync_from_store<D: Document>(cache: &mut Cache<D>) -> Result<PassReport> {
    let result = run_from_store(cache);
    finish(cache, result)
}

fn run_to_store<D: Document>(cache: &mut Cache<D>) -> Result<PassReport> {
    tracing::info!(lines = cache.document().len(), "sync to store");
    let writes_before = cache.stores().total_writes();
    cache.reset()?;
    cache.set_buffer_authority(true);
    cache.load_records()?;
    cache.load_presets()?;
    cache.load_entries()?;
    cache.load_regions()?;
    let counts = reconcile_all(cache)?;
    cache.check_coherence()?;
    persist_all(cache)?;
    cache.write_back()?;
    cache.flush()?;
    Ok(PassReport {
        warnings: Vec::new(),
        written: cache.stores().total_writes() - writes_before,
        added: counts.added,
        removed: counts.removed,
    })
}

fn run_from_store<D: Document>(cache: &mut Cache<D>) -> Result<PassReport> {
    tracing::info!(lines = cache.document().len(), "sync from store");
    cache.reset()?;
    cache.set_buffer_authority(false);
    cache.load_records()?;
    cache.load_presets()?;
    cache.load_entries()?;
    cache.load_regions()?;
    cache.refresh_from_records()?;
    let counts = reconcile_all(cache)?;
    cache.check_coherence()?;
    cache.write_back()?;
    cache.flush()?;
    Ok(PassReport {
        warnings: Vec::new(),
        written: 0,
        added: counts.added,
        removed: counts.removed,
    })
}

/// Attach the pass warnings, and mark the cache stale after a structural
/// failure
fn finish<D: Document>(cache: &mut Cache<D>, result: Result<PassReport>) -> Result<PassReport> {
    match result {
        Ok(mut report) => {
            report.warnings = cache.take_warnings();
            tracing::info!(
                written = report.written,
                added = report.added,
                removed = report.removed,
                warnings = report.warnings.len(),
                "pass complete"
            );
            Ok(report)
        }
        Err(err) => {
            let dropped = cache.take_warnings();
            tracing::warn!(error = %err, warnings = dropped.len(), "pass aborted");
            cache.fail(err)
        }
    }
}
