use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;

use wikisync::Cache;
use wikisync::io::{LineBuffer, MemoryStore, StoreRegistry};
use wikisync::model::{DEFAULT_SOURCE, Entry, Markup, ShortId, SyncConfig};
use wikisync::parse::{HeaderLine, TaskFields, format_entry, parse_due, parse_header, parse_task};

fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Could not read fixture {}: {}", name, e))
}

fn entry_from(fields: &TaskFields) -> Entry {
    let source = fields.source.as_deref().unwrap_or(DEFAULT_SOURCE);
    let mut entry = Entry::new(0, source);
    entry.indent = fields.indent.clone();
    entry.bullet = fields.bullet;
    entry.mark = fields.mark;
    entry.description = fields.description.clone();
    entry.priority = fields.priority;
    entry.due = fields.due.as_deref().and_then(parse_due);
    entry.identifier = fields
        .identifier
        .as_deref()
        .map(|id| ShortId::new(id, source));
    entry
}

/// Load a document into a cache and write back whatever the cache thinks
/// changed; nothing should
fn assert_load_round_trip(name: &str, config: SyncConfig) {
    let source = fixture(name);
    let stores = StoreRegistry::new(MemoryStore::new()).with_source("W", MemoryStore::new());
    let mut cache = Cache::new(LineBuffer::from_text(&source), stores, config);
    cache.load_presets().unwrap();
    cache.load_entries().unwrap();
    cache.load_regions().unwrap();
    assert_eq!(cache.write_back().unwrap(), 0, "lines rewritten in {}", name);
    assert_eq!(
        cache.document().to_text(),
        source,
        "Round-trip failed for fixture: {}",
        name
    );
    cache.check_coherence().unwrap();
}

#[test]
fn test_canonical_task_lines_format_back_unchanged() {
    let source = fixture("canonical.wiki");
    let mut tasks = 0;
    for line in source.lines() {
        if let Some(fields) = parse_task(line) {
            assert_eq!(format_entry(&entry_from(&fields)), line);
            tasks += 1;
        }
    }
    assert_eq!(tasks, 7);
}

#[test]
fn test_canonical_fixture_headers() {
    let source = fixture("canonical.wiki");
    let kinds: Vec<&str> = source
        .lines()
        .filter_map(|line| parse_header(line, Markup::Default))
        .map(|header| match header {
            HeaderLine::Region(_) => "region",
            HeaderLine::Preset(_) => "preset",
            HeaderLine::Plain { .. } => "plain",
        })
        .collect();
    assert_eq!(kinds, vec!["plain", "preset", "region", "region"]);
}

#[test]
fn test_non_task_lines_are_left_alone() {
    for line in ["Plain paragraph text.", "* not a task", "* [?] unknown mark", ""] {
        assert!(parse_task(line).is_none(), "parsed {:?}", line);
    }
}

#[test]
fn test_round_trip_tasks_wiki() {
    assert_load_round_trip("tasks.wiki", SyncConfig::default());
}

#[test]
fn test_round_trip_tasks_markdown() {
    let config = SyncConfig {
        markup: Markup::Markdown,
        ..SyncConfig::default()
    };
    assert_load_round_trip("tasks.md", config);
}

#[test]
fn test_round_trip_noncanonical_spacing() {
    // Lines are only rewritten when their fields change, so odd spacing
    // survives a load
    assert_load_round_trip("noncanonical.wiki", SyncConfig::default());
}

#[test]
fn test_noncanonical_lines_format_canonically() {
    let source = fixture("noncanonical.wiki");
    let formatted: Vec<String> = source
        .lines()
        .filter_map(parse_task)
        .map(|fields| format_entry(&entry_from(&fields)))
        .collect();
    assert_eq!(
        formatted,
        vec![
            "* [ ] buy milk !!",
            "* [ ] call bob (2024-05-01)",
            "  * [ ] two space indent",
            "\t* [ ] tab indent",
            "* [ ] trailing spaces",
        ]
    );
}
