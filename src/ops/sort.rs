use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::cache::Cache;
use crate::error::Result;
use crate::io::document::Document;
use crate::model::entry::EntryId;
use crate::model::record::{Record, Status};

/// Attribute a region can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortAttr {
    Status,
    End,
    Due,
    Priority,
    Project,
    Description,
    Entry,
    Start,
    Position,
}

impl SortAttr {
    fn parse(name: &str) -> Option<SortAttr> {
        Some(match name {
            "status" => SortAttr::Status,
            "end" => SortAttr::End,
            "due" => SortAttr::Due,
            "priority" => SortAttr::Priority,
            "project" => SortAttr::Project,
            "description" => SortAttr::Description,
            "entry" => SortAttr::Entry,
            "start" => SortAttr::Start,
            "position" => SortAttr::Position,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub attr: SortAttr,
    pub descending: bool,
}

/// Parse `attr[+|-],...`. Unknown attributes are skipped; `position+` is
/// always appended so the order is total.
pub fn parse_sort(spec: &str) -> Vec<SortKey> {
    let mut keys: Vec<SortKey> = spec
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let (name, descending) = match part.strip_suffix('-') {
                Some(name) => (name, true),
                None => (part.strip_suffix('+').unwrap_or(part), false),
            };
            let attr = SortAttr::parse(name);
            if attr.is_none() {
                tracing::debug!(attribute = name, "ignoring unknown sort attribute");
            }
            attr.map(|attr| SortKey { attr, descending })
        })
        .collect();
    keys.push(SortKey {
        attr: SortAttr::Position,
        descending: false,
    });
    keys
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Status(Status),
    Time(DateTime<Utc>),
    Date(NaiveDateTime),
    Level(usize),
    Text(String),
    Position(usize),
}

fn value_of(attr: SortAttr, record: &Record, position: usize) -> Option<SortValue> {
    match attr {
        SortAttr::Status => Some(SortValue::Status(record.status)),
        SortAttr::End => record.end.map(SortValue::Time),
        SortAttr::Due => record.due.map(SortValue::Date),
        SortAttr::Priority => record.priority.map(|p| SortValue::Level(p.level())),
        SortAttr::Project => record.project.clone().map(SortValue::Text),
        SortAttr::Description => Some(SortValue::Text(record.description.clone())),
        SortAttr::Entry => record.entry.map(SortValue::Time),
        SortAttr::Start => record.start.map(SortValue::Time),
        SortAttr::Position => Some(SortValue::Position(position)),
    }
}

/// Compare two records key by key. A present value always sorts before an
/// absent one, whatever the key's direction.
fn compare(keys: &[SortKey], a: (&Record, usize), b: (&Record, usize)) -> Ordering {
    for key in keys {
        let ordering = match (value_of(key.attr, a.0, a.1), value_of(key.attr, b.0, b.1)) {
            (None, None) => continue,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(x), Some(y)) if key.descending => y.cmp(&x),
            (Some(x), Some(y)) => x.cmp(&y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

struct Node {
    id: EntryId,
    record: Record,
    position: usize,
    children: Vec<usize>,
    parent: Option<usize>,
}

/// Sort the tasks of the region at `region_pos` as a forest, rebuild their
/// indentation and permute the lines into the new order
pub fn sort_region<D: Document>(cache: &mut Cache<D>, region_pos: usize) -> Result<()> {
    let Some(region) = cache.get_region(region_pos)?.cloned() else {
        return Ok(());
    };
    if region.tasks.is_empty() {
        return Ok(());
    }
    let keys = parse_sort(&region.sort);
    let width = cache.config().indent_width;
    let buffer_authority = cache.buffer_has_authority();

    let mut nodes: Vec<Node> = Vec::with_capacity(region.tasks.len());
    for id in &region.tasks {
        let (Some(entry), Some(record)) = (cache.entry(*id), cache.effective_record(*id)) else {
            continue;
        };
        nodes.push(Node {
            id: *id,
            record,
            position: entry.position,
            children: Vec::new(),
            parent: None,
        });
    }
    let index: HashMap<EntryId, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

    // Link the forest. In-document children come first, then records listed
    // in `depends` where the store's view is authoritative for the pair.
    let mut links: Vec<(usize, usize, bool)> = Vec::new();
    for (p, node) in nodes.iter().enumerate() {
        let Some(parent) = cache.entry(node.id) else {
            continue;
        };
        for child in &parent.add_dependencies {
            if let Some(&c) = index.get(child) {
                links.push((p, c, false));
            }
        }
    }
    for (p, node) in nodes.iter().enumerate() {
        let parent_materialized = cache.entry(node.id).is_some_and(|e| e.materialized);
        for (c, child) in nodes.iter().enumerate() {
            let Some(child_id) = child.record.identifier.as_ref() else {
                continue;
            };
            let child_materialized = cache.entry(child.id).is_some_and(|e| e.materialized);
            if p != c
                && node.record.depends.contains(child_id)
                && (!buffer_authority || parent_materialized || child_materialized)
            {
                links.push((p, c, true));
            }
        }
    }
    for (p, c, from_depends) in links {
        if nodes[c].parent.is_some() || is_ancestor(&nodes, c, p) {
            continue;
        }
        nodes[c].parent = Some(p);
        nodes[p].children.push(c);
        if from_depends {
            let (parent_id, child_id) = (nodes[p].id, nodes[c].id);
            cache.add_dependency(parent_id, child_id);
            if let Some(entry) = cache.entry_mut(child_id) {
                entry.parent = Some(parent_id);
            }
        }
    }

    let roots: Vec<usize> = (0..nodes.len()).filter(|i| nodes[*i].parent.is_none()).collect();
    let mut order: Vec<(usize, usize)> = Vec::with_capacity(nodes.len());
    flatten(&nodes, &keys, roots, 0, &mut order);

    // Indentation
    for (node, depth) in &order {
        if let Some(entry) = cache.entry_mut(nodes[*node].id) {
            entry.indent = " ".repeat(width * depth);
        }
    }

    // Permutation
    let base = nodes.iter().map(|n| n.position).min().unwrap_or(region_pos + 1);
    for (offset, (node, _)) in order.iter().enumerate() {
        let target = base + offset;
        let current = cache.entry(nodes[*node].id).map_or(target, |e| e.position);
        if current != target {
            cache.swap_lines(target, current)?;
        }
    }
    // Line swaps keep the region's task list in line order
    Ok(())
}

fn is_ancestor(nodes: &[Node], candidate: usize, of: usize) -> bool {
    let mut cursor = Some(of);
    while let Some(idx) = cursor {
        if idx == candidate {
            return true;
        }
        cursor = nodes[idx].parent;
    }
    false
}

fn flatten(
    nodes: &[Node],
    keys: &[SortKey],
    mut level: Vec<usize>,
    depth: usize,
    out: &mut Vec<(usize, usize)>,
) {
    level.sort_by(|a, b| {
        compare(
            keys,
            (&nodes[*a].record, nodes[*a].position),
            (&nodes[*b].record, nodes[*b].position),
        )
    });
    for idx in level {
        out.push((idx, depth));
        flatten(nodes, keys, nodes[idx].children.clone(), depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::document::LineBuffer;
    use crate::io::memory_store::MemoryStore;
    use crate::io::store::StoreRegistry;
    use crate::model::config::SyncConfig;
    use crate::model::record::{DEFAULT_SOURCE, Priority};
    use pretty_assertions::assert_eq;

    fn record(description: &str) -> Record {
        let mut record = Record::draft(DEFAULT_SOURCE);
        record.description = description.into();
        record
    }

    #[test]
    fn test_parse_sort_appends_position() {
        let keys = parse_sort("due+, priority-,bogus,project");
        let attrs: Vec<_> = keys.iter().map(|k| (k.attr, k.descending)).collect();
        assert_eq!(
            attrs,
            vec![
                (SortAttr::Due, false),
                (SortAttr::Priority, true),
                (SortAttr::Project, false),
                (SortAttr::Position, false),
            ]
        );
    }

    #[test]
    fn test_present_values_sort_first_in_both_directions() {
        let mut high = record("high");
        high.priority = Some(Priority::High);
        let none = record("none");
        for spec in ["priority+", "priority-"] {
            let keys = parse_sort(spec);
            assert_eq!(compare(&keys, (&high, 5), (&none, 1)), Ordering::Less);
            assert_eq!(compare(&keys, (&none, 1), (&high, 5)), Ordering::Greater);
        }
    }

    #[test]
    fn test_ties_fall_back_to_position() {
        let keys = parse_sort("description+");
        let a = record("same");
        assert_eq!(compare(&keys, (&a, 2), (&a.clone(), 7)), Ordering::Less);
    }

    #[test]
    fn test_sort_region_orders_and_keeps_children() {
        let text = "\
== Todo | +todo $P ==
* [ ] low !
* [ ] high !!!
  * [ ] high child
* [ ] medium !!
footer
";
        let mut config = SyncConfig::default();
        config.sort_orders.insert("P".into(), "priority-".into());
        let mut cache = Cache::new(
            LineBuffer::from_text(text),
            StoreRegistry::new(MemoryStore::new()),
            config,
        );
        cache.load_entries().unwrap();
        cache.load_regions().unwrap();
        sort_region(&mut cache, 0).unwrap();
        cache.write_back().unwrap();
        assert_eq!(
            cache.document().lines(),
            &[
                "== Todo | +todo $P ==",
                "* [ ] high !!!",
                "    * [ ] high child",
                "* [ ] medium !!",
                "* [ ] low !",
                "footer",
            ]
        );
        cache.check_coherence().unwrap();
    }
}
