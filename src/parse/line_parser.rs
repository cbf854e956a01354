use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::model::entry::CompletionMark;
use crate::model::record::Priority;

/// Bullet, checkbox and the rest of the line
static TASK_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>\s*)(?P<bullet>[*-]) \[(?P<mark>.)\] (?P<rest>.*)$")
        .expect("task prefix pattern")
});

/// `#abcd1234`, `#W:abcd1234` or a full identifier, at the end of the line
static IDENTIFIER_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\s#(?:(?P<source>[A-Za-z]\w*):)?(?P<id>[0-9a-fA-F]{8}(?:-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})?)$",
    )
    .expect("identifier pattern")
});

static DUE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s\((?P<due>\d{4}-\d\d-\d\d(?: \d\d:\d\d)?)\)$").expect("due pattern")
});

static PRIORITY_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s(?P<priority>!{1,3})$").expect("priority pattern"));

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw fields of a task line, before any store lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFields {
    pub indent: String,
    pub bullet: char,
    pub mark: CompletionMark,
    pub description: String,
    pub priority: Option<Priority>,
    /// Due stamp text without the parentheses; may still be an invalid date
    pub due: Option<String>,
    pub identifier: Option<String>,
    /// Source qualifier in front of the identifier
    pub source: Option<String>,
}

/// Parse one line as a task. Returns `None` for anything that is not a task.
///
/// Suffixes are peeled from the end in order: identifier, due stamp,
/// priority. A suffix is only taken when some description remains.
pub fn parse_task(line: &str) -> Option<TaskFields> {
    let caps = TASK_PREFIX.captures(line)?;
    let mark = caps["mark"].chars().next().and_then(CompletionMark::from_char)?;
    let bullet = caps["bullet"].chars().next()?;
    let mut rest = caps["rest"].trim_end();

    let mut identifier = None;
    let mut source = None;
    if let Some(found) = IDENTIFIER_SUFFIX.captures(rest) {
        let start = found.get(0).map_or(rest.len(), |m| m.start());
        if !rest[..start].trim().is_empty() {
            identifier = Some(found["id"].to_string());
            source = found.name("source").map(|m| m.as_str().to_string());
            rest = rest[..start].trim_end();
        }
    }

    let mut due = None;
    if let Some(found) = DUE_SUFFIX.captures(rest) {
        let start = found.get(0).map_or(rest.len(), |m| m.start());
        if !rest[..start].trim().is_empty() {
            due = Some(found["due"].to_string());
            rest = rest[..start].trim_end();
        }
    }

    let mut priority = None;
    if let Some(found) = PRIORITY_SUFFIX.captures(rest) {
        let start = found.get(0).map_or(rest.len(), |m| m.start());
        if !rest[..start].trim().is_empty() {
            priority = Priority::from_level(found["priority"].len());
            rest = rest[..start].trim_end();
        }
    }

    if rest.is_empty() {
        return None;
    }

    Some(TaskFields {
        indent: caps["indent"].to_string(),
        bullet,
        mark,
        description: rest.to_string(),
        priority,
        due,
        identifier,
        source,
    })
}

/// Parse a due stamp, with or without a time. `None` when the date is invalid.
pub fn parse_due(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_line() {
        let fields = parse_task("    * [S] Write report !! (2015-08-08 10:00)  #abc123ef").unwrap();
        assert_eq!(fields.indent, "    ");
        assert_eq!(fields.bullet, '*');
        assert_eq!(fields.mark, CompletionMark::Started);
        assert_eq!(fields.description, "Write report");
        assert_eq!(fields.priority, Some(Priority::Medium));
        assert_eq!(fields.due.as_deref(), Some("2015-08-08 10:00"));
        assert_eq!(fields.identifier.as_deref(), Some("abc123ef"));
        assert_eq!(fields.source, None);
    }

    #[test]
    fn test_parse_new_task() {
        let fields = parse_task("- [ ] buy milk").unwrap();
        assert_eq!(fields.bullet, '-');
        assert_eq!(fields.description, "buy milk");
        assert_eq!(fields.identifier, None);
        assert_eq!(fields.priority, None);
    }

    #[test]
    fn test_parse_source_qualified_identifier() {
        let fields = parse_task("* [X] done thing  #W:0123abcd").unwrap();
        assert_eq!(fields.source.as_deref(), Some("W"));
        assert_eq!(fields.identifier.as_deref(), Some("0123abcd"));
        assert_eq!(fields.mark, CompletionMark::Done);
    }

    #[test]
    fn test_parse_full_uuid() {
        let fields =
            parse_task("* [ ] a  #0123abcd-1111-4222-8333-444455556666").unwrap();
        assert_eq!(
            fields.identifier.as_deref(),
            Some("0123abcd-1111-4222-8333-444455556666")
        );
    }

    #[test]
    fn test_bang_only_description_is_text() {
        let fields = parse_task("* [ ] !!!").unwrap();
        assert_eq!(fields.description, "!!!");
        assert_eq!(fields.priority, None);
    }

    #[test]
    fn test_not_a_task() {
        assert_eq!(parse_task("plain text"), None);
        assert_eq!(parse_task("* [?] unknown mark"), None);
        assert_eq!(parse_task("* [ ] "), None);
        assert_eq!(parse_task("== Header =="), None);
    }

    #[test]
    fn test_parse_due_formats() {
        assert_eq!(
            parse_due("2015-08-08"),
            NaiveDate::from_ymd_opt(2015, 8, 8).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        assert!(parse_due("2015-08-08 23:59").is_some());
        assert_eq!(parse_due("2015-13-45"), None);
    }
}
