use chrono::{NaiveDateTime, Timelike};

use crate::model::entry::Entry;
use crate::parse::line_parser::{DATE_FORMAT, DATETIME_FORMAT};

/// Shown in place of an empty description so the line still parses
pub const MISSING_TEXT: &str = "TEXT MISSING?";

/// Render an entry as a canonical task line
pub fn format_entry(entry: &Entry) -> String {
    let mut out = String::new();
    out.push_str(&entry.indent);
    out.push(entry.bullet);
    out.push_str(" [");
    out.push(entry.mark.as_char());
    out.push_str("] ");
    if entry.description.is_empty() {
        out.push_str(MISSING_TEXT);
    } else {
        out.push_str(&entry.description);
    }
    if let Some(priority) = entry.priority {
        out.push(' ');
        out.push_str(&"!".repeat(priority.level()));
    }
    if let Some(due) = entry.due {
        out.push_str(" (");
        out.push_str(&format_due(due));
        out.push(')');
    }
    if let Some(identifier) = &entry.identifier {
        out.push_str("  #");
        out.push_str(&identifier.render());
    }
    out
}

/// Midnight renders as a bare date
pub fn format_due(due: NaiveDateTime) -> String {
    if due.hour() == 0 && due.minute() == 0 {
        due.format(DATE_FORMAT).to_string()
    } else {
        due.format(DATETIME_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry::CompletionMark;
    use crate::model::record::{DEFAULT_SOURCE, Priority, ShortId};
    use crate::parse::line_parser::{parse_due, parse_task};
    use pretty_assertions::assert_eq;

    fn entry_from_line(line: &str) -> Entry {
        let fields = parse_task(line).unwrap();
        let mut entry = Entry::new(0, DEFAULT_SOURCE);
        entry.indent = fields.indent;
        entry.bullet = fields.bullet;
        entry.mark = fields.mark;
        entry.description = fields.description;
        entry.priority = fields.priority;
        entry.due = fields.due.as_deref().and_then(parse_due);
        let source = fields.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        entry.identifier = fields.identifier.map(|id| ShortId::new(&id, &source));
        entry
    }

    #[test]
    fn test_canonical_lines_round_trip() {
        for line in [
            "* [ ] buy milk",
            "    - [X] file taxes !!! (2016-04-15)  #0123abcd",
            "* [S] call bob ! (2015-08-08 09:30)  #W:89abcdef",
            "\t* [D] old idea  #deadbeef",
        ] {
            assert_eq!(format_entry(&entry_from_line(line)), line);
        }
    }

    #[test]
    fn test_empty_description_placeholder() {
        let mut entry = Entry::new(0, DEFAULT_SOURCE);
        entry.mark = CompletionMark::Done;
        entry.priority = Some(Priority::Low);
        assert_eq!(format_entry(&entry), "* [X] TEXT MISSING? !");
    }
}
