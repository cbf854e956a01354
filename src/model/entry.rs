use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::model::defaults::Defaults;
use crate::model::record::{Priority, Record, ShortId, Status, StatusChange};

/// Stable handle of an entry inside the cache arena. Positions move; ids don't.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub(crate) usize);

/// Checkbox character shown in front of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CompletionMark {
    #[default]
    Pending,
    Started,
    Done,
    Deleted,
    Recurring,
    Waiting,
}

impl CompletionMark {
    pub fn as_char(self) -> char {
        match self {
            CompletionMark::Pending => ' ',
            CompletionMark::Started => 'S',
            CompletionMark::Done => 'X',
            CompletionMark::Deleted => 'D',
            CompletionMark::Recurring => 'R',
            CompletionMark::Waiting => 'W',
        }
    }

    pub fn from_char(c: char) -> Option<CompletionMark> {
        match c {
            ' ' => Some(CompletionMark::Pending),
            'S' => Some(CompletionMark::Started),
            'X' => Some(CompletionMark::Done),
            'D' => Some(CompletionMark::Deleted),
            'R' => Some(CompletionMark::Recurring),
            'W' => Some(CompletionMark::Waiting),
            _ => None,
        }
    }

    /// Status transition a user expresses by typing this mark.
    /// Recurring and waiting marks are display-only.
    pub fn status_change(self) -> Option<StatusChange> {
        match self {
            CompletionMark::Pending => Some(StatusChange::Reopen),
            CompletionMark::Started => Some(StatusChange::Start),
            CompletionMark::Done => Some(StatusChange::Complete),
            CompletionMark::Deleted => Some(StatusChange::Delete),
            CompletionMark::Recurring | CompletionMark::Waiting => None,
        }
    }

    /// Mark to display for `record`, starting from the one currently shown.
    ///
    /// Later checks win: done, started, deleted, recurring, waiting. A mark
    /// the record no longer backs falls back to pending.
    pub fn for_record(self, record: &Record) -> CompletionMark {
        let mut mark = self;
        let checks = [
            (record.status == Status::Completed, CompletionMark::Done),
            (record.is_active(), CompletionMark::Started),
            (record.status == Status::Deleted, CompletionMark::Deleted),
            (record.status == Status::Recurring, CompletionMark::Recurring),
            (record.status == Status::Waiting, CompletionMark::Waiting),
        ];
        for (holds, candidate) in checks {
            if holds {
                mark = candidate;
            } else if mark == candidate {
                mark = CompletionMark::Pending;
            }
        }
        mark
    }
}

/// Fields rendered on a task line. Compared against the last rendering to
/// decide whether a line must be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineView {
    pub indent: String,
    pub bullet: char,
    pub mark: CompletionMark,
    pub description: String,
    pub priority: Option<Priority>,
    pub due: Option<NaiveDateTime>,
    pub identifier: Option<ShortId>,
}

/// One document line describing a task
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub position: usize,
    pub indent: String,
    pub bullet: char,
    pub mark: CompletionMark,
    pub description: String,
    pub priority: Option<Priority>,
    pub due: Option<NaiveDateTime>,
    pub project: Option<String>,
    pub tags: BTreeSet<String>,
    pub source: String,
    pub identifier: Option<ShortId>,
    /// Children found under this entry during the current load, not yet
    /// written to its record
    pub add_dependencies: Vec<EntryId>,
    pub parent: Option<EntryId>,
    /// A persist batch already wrote this entry's in-region children
    pub(crate) links_persisted: bool,
    /// Record for an entry that has never been saved
    pub(crate) draft: Option<Record>,
    /// Created from a store record during this pass rather than parsed
    pub(crate) materialized: bool,
    /// What the document line currently shows
    pub(crate) rendered: Option<LineView>,
}

impl Entry {
    pub fn new(position: usize, source: &str) -> Self {
        Entry {
            position,
            indent: String::new(),
            bullet: '*',
            mark: CompletionMark::Pending,
            description: String::new(),
            priority: None,
            due: None,
            project: None,
            tags: BTreeSet::new(),
            source: source.to_string(),
            identifier: None,
            add_dependencies: Vec::new(),
            parent: None,
            links_persisted: false,
            draft: None,
            materialized: false,
            rendered: None,
        }
    }

    /// Materialize an entry for a record that is not shown yet. Defaults
    /// only fill fields the record leaves empty.
    pub fn from_record(record: &Record, position: usize, defaults: Option<&Defaults>) -> Self {
        let mut entry = Entry::new(position, &record.source);
        entry.adopt_record_fields(record);
        entry.update_from_record(record);
        if let Some(defaults) = defaults {
            defaults.fill_absent(&mut entry);
        }
        entry.materialized = true;
        entry
    }

    pub fn is_saved(&self) -> bool {
        self.identifier.is_some()
    }

    pub fn line_view(&self) -> LineView {
        LineView {
            indent: self.indent.clone(),
            bullet: self.bullet,
            mark: self.mark,
            description: self.description.clone(),
            priority: self.priority,
            due: self.due,
            identifier: self.identifier.clone(),
        }
    }

    /// Whether the document line no longer matches this entry
    pub fn needs_render(&self) -> bool {
        self.rendered.as_ref() != Some(&self.line_view())
    }

    /// Copy the user-editable fields from the store record
    pub fn adopt_record_fields(&mut self, record: &Record) {
        self.description = record.description.clone();
        self.priority = record.priority;
        self.due = record.due;
        self.project = record.project.clone();
        self.tags = record.tags.clone();
    }

    /// Pick up the identifier and status of a freshly saved or fetched record
    pub fn update_from_record(&mut self, record: &Record) {
        if let Some(short) = record.short_id() {
            self.identifier = Some(short);
            self.draft = None;
        }
        self.mark = self.mark.for_record(record);
    }

    /// Merge this entry's fields into `record`. Tags are added, never removed.
    /// Returns whether the record changed.
    pub fn merge_into(&self, record: &mut Record, now: DateTime<Utc>) -> bool {
        let before = record.clone();
        record.description = self.description.clone();
        record.priority = self.priority;
        record.due = self.due;
        if self.project.is_some() {
            record.project = self.project.clone();
        }
        record.tags.extend(self.tags.iter().cloned());
        if let Some(change) = self.mark.status_change() {
            record.apply_status(change, now);
        }
        *record != before
    }

    /// An entry is tainted when saving it would change its record
    pub fn is_tainted(&self, record: &Record) -> bool {
        let mut merged = record.clone();
        self.merge_into(&mut merged, Utc::now())
    }
}

/// Width of an indent string with tabs expanded to `width` columns
pub fn indent_columns(indent: &str, width: usize) -> usize {
    indent
        .chars()
        .map(|c| if c == '\t' { width } else { 1 })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::DEFAULT_SOURCE;

    fn saved_record(description: &str) -> Record {
        let mut record = Record::draft(DEFAULT_SOURCE);
        record.identifier = Some("0123abcd-0000-4000-8000-000000000000".into());
        record.description = description.into();
        record
    }

    #[test]
    fn mark_follows_record_status() {
        let mut record = saved_record("a");
        assert_eq!(
            CompletionMark::Done.for_record(&record),
            CompletionMark::Pending
        );
        record.status = Status::Completed;
        assert_eq!(
            CompletionMark::Pending.for_record(&record),
            CompletionMark::Done
        );
        record.status = Status::Pending;
        record.start = Some(Utc::now());
        assert_eq!(
            CompletionMark::Pending.for_record(&record),
            CompletionMark::Started
        );
    }

    #[test]
    fn untouched_entry_is_not_tainted() {
        let record = saved_record("write report");
        let entry = Entry::from_record(&record, 3, None);
        assert!(!entry.is_tainted(&record));
        assert_eq!(entry.identifier.as_ref().map(|s| s.prefix()), Some("0123abcd"));
    }

    #[test]
    fn edited_description_taints() {
        let record = saved_record("write report");
        let mut entry = Entry::from_record(&record, 0, None);
        entry.description = "write the report".into();
        assert!(entry.is_tainted(&record));
    }

    #[test]
    fn done_mark_on_completed_record_is_clean() {
        let mut record = saved_record("x");
        record.status = Status::Completed;
        record.end = Some(Utc::now());
        let entry = Entry::from_record(&record, 0, None);
        assert_eq!(entry.mark, CompletionMark::Done);
        assert!(!entry.is_tainted(&record));
    }

    #[test]
    fn store_tags_survive_merge() {
        let mut record = saved_record("x");
        record.tags.insert("from_hook".into());
        let mut entry = Entry::from_record(&record, 0, None);
        entry.tags.clear();
        entry.tags.insert("work".into());
        let mut merged = record.clone();
        assert!(entry.merge_into(&mut merged, Utc::now()));
        assert!(merged.tags.contains("from_hook"));
        assert!(merged.tags.contains("work"));
    }

    #[test]
    fn indent_columns_expand_tabs() {
        assert_eq!(indent_columns("\t    ", 4), 8);
        assert_eq!(indent_columns("  ", 4), 2);
    }
}
