use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key of the store every unqualified line and region belongs to
pub const DEFAULT_SOURCE: &str = "default";

/// Number of identifier characters shown in the document
pub const SHORT_ID_LEN: usize = 8;

/// Store-side task status. Variant order is the sort order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Completed,
    Deleted,
    #[default]
    Pending,
    Recurring,
    Waiting,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Completed => "completed",
            Status::Deleted => "deleted",
            Status::Pending => "pending",
            Status::Recurring => "recurring",
            Status::Waiting => "waiting",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s.to_ascii_lowercase().as_str() {
            "completed" => Some(Status::Completed),
            "deleted" => Some(Status::Deleted),
            "pending" => Some(Status::Pending),
            "recurring" => Some(Status::Recurring),
            "waiting" => Some(Status::Waiting),
            _ => None,
        }
    }
}

/// Task priority. Rendered in the document as one to three `!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "L")]
    Low,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "H")]
    High,
}

impl Priority {
    /// Number of `!` glyphs for this priority
    pub fn level(self) -> usize {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }

    /// 0 means "no priority"
    pub fn from_level(level: usize) -> Option<Priority> {
        match level {
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            3 => Some(Priority::High),
            _ => None,
        }
    }

    /// Store-native single letter code
    pub fn code(self) -> &'static str {
        match self {
            Priority::Low => "L",
            Priority::Medium => "M",
            Priority::High => "H",
        }
    }

    pub fn from_code(code: &str) -> Option<Priority> {
        match code {
            "L" | "l" => Some(Priority::Low),
            "M" | "m" => Some(Priority::Medium),
            "H" | "h" => Some(Priority::High),
            _ => None,
        }
    }
}

/// Abbreviated identifier: the first eight characters plus the owning source.
///
/// Two short ids are equal when both prefix and source match. A full
/// identifier matches a short id when it starts with the prefix and comes
/// from the same source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortId {
    prefix: String,
    source: String,
}

impl ShortId {
    pub fn new(identifier: &str, source: &str) -> Self {
        ShortId {
            prefix: identifier
                .chars()
                .take(SHORT_ID_LEN)
                .collect::<String>()
                .to_ascii_lowercase(),
            source: source.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Document form: `abcd1234` for the default source, `W:abcd1234` otherwise
    pub fn render(&self) -> String {
        if self.source == DEFAULT_SOURCE {
            self.prefix.clone()
        } else {
            format!("{}:{}", self.source, self.prefix)
        }
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// A status transition requested from the document or a selection command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Complete,
    Start,
    Stop,
    Delete,
    Reopen,
}

/// One task as known to the task store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Full identifier, absent until the store has saved the record
    #[serde(default, rename = "uuid", skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub description: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Full identifiers of the records this one depends on
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends: BTreeSet<String>,
    /// Creation timestamp, assigned by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<DateTime<Utc>>,
    /// Key of the store that owns this record
    #[serde(skip)]
    pub source: String,
}

impl Record {
    /// A record that has never been persisted
    pub fn draft(source: &str) -> Self {
        Record {
            identifier: None,
            description: String::new(),
            status: Status::Pending,
            priority: None,
            due: None,
            project: None,
            tags: BTreeSet::new(),
            depends: BTreeSet::new(),
            entry: None,
            start: None,
            end: None,
            wait: None,
            source: source.to_string(),
        }
    }

    pub fn is_saved(&self) -> bool {
        self.identifier.is_some()
    }

    pub fn short_id(&self) -> Option<ShortId> {
        self.identifier
            .as_deref()
            .map(|id| ShortId::new(id, &self.source))
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Pending && self.start.is_some()
    }

    /// Apply a status transition. Returns whether anything changed; completing
    /// a completed record (or deleting a deleted one) changes nothing.
    pub fn apply_status(&mut self, change: StatusChange, now: DateTime<Utc>) -> bool {
        let before = (self.status, self.start, self.end, self.wait);
        match change {
            StatusChange::Complete => {
                if self.status != Status::Completed {
                    self.status = Status::Completed;
                    self.start = None;
                    self.end = self.end.or(Some(now));
                }
            }
            StatusChange::Delete => {
                if self.status != Status::Deleted {
                    self.status = Status::Deleted;
                    self.start = None;
                    self.end = self.end.or(Some(now));
                }
            }
            StatusChange::Start => {
                self.status = Status::Pending;
                self.start = self.start.or(Some(now));
                self.end = None;
            }
            StatusChange::Stop => {
                self.start = None;
            }
            StatusChange::Reopen => {
                self.status = Status::Pending;
                self.start = None;
                self.end = None;
                self.wait = None;
            }
        }
        before != (self.status, self.start, self.end, self.wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_equality_needs_prefix_and_source() {
        let a = ShortId::new("ABCD1234-0000-0000-0000-000000000000", DEFAULT_SOURCE);
        let b = ShortId::new("abcd1234", DEFAULT_SOURCE);
        let c = ShortId::new("abcd1234", "W");
        assert_eq!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn short_id_render_qualifies_extra_sources() {
        assert_eq!(ShortId::new("abcd1234ffff", DEFAULT_SOURCE).render(), "abcd1234");
        assert_eq!(ShortId::new("abcd1234ffff", "W").render(), "W:abcd1234");
    }

    #[test]
    fn completing_twice_is_a_noop() {
        let now = Utc::now();
        let mut record = Record::draft(DEFAULT_SOURCE);
        assert!(record.apply_status(StatusChange::Complete, now));
        let end = record.end;
        assert!(!record.apply_status(StatusChange::Complete, Utc::now()));
        assert_eq!(record.end, end);
    }

    #[test]
    fn start_then_reopen() {
        let now = Utc::now();
        let mut record = Record::draft(DEFAULT_SOURCE);
        assert!(record.apply_status(StatusChange::Start, now));
        assert!(record.is_active());
        assert!(!record.apply_status(StatusChange::Start, now));
        assert!(record.apply_status(StatusChange::Reopen, now));
        assert!(!record.is_active());
        assert!(!record.apply_status(StatusChange::Reopen, now));
    }

    #[test]
    fn status_order_is_alphabetical() {
        assert!(Status::Completed < Status::Pending);
        assert!(Status::Pending < Status::Waiting);
    }

    #[test]
    fn priority_levels() {
        assert_eq!(Priority::from_level(3), Some(Priority::High));
        assert_eq!(Priority::from_level(0), None);
        assert_eq!(Priority::High.level(), 3);
        assert_eq!(Priority::from_code("M"), Some(Priority::Medium));
    }
}
