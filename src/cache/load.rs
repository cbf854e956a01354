use std::collections::BTreeMap;

use super::{Cache, Slot};
use crate::error::{ReconcileError, Result};
use crate::io::document::Document;
use crate::model::entry::{Entry, EntryId, LineView, indent_columns};
use crate::model::record::{DEFAULT_SOURCE, Record, ShortId};
use crate::model::region::{PresetHeader, Region};
use crate::parse::filter::process_filter;
use crate::parse::header_parser::{HeaderLine, RegionFields, parse_header};
use crate::parse::line_parser::{TaskFields, parse_due, parse_task};
use crate::parse::modstring::{split_modstring, to_defaults, tokenize};
use crate::warnings::Warning;

impl<D: Document> Cache<D> {
    // -----------------------------------------------------------------------
    // Parsed line memo
    // -----------------------------------------------------------------------

    pub(crate) fn task_fields(&mut self, pos: usize) -> Option<TaskFields> {
        if pos >= self.document.len() {
            return None;
        }
        if let Some(slot) = self.parsed_tasks.get(pos) {
            return slot.present().cloned();
        }
        let parsed = self.document.line(pos).and_then(parse_task);
        self.parsed_tasks.set(
            pos,
            parsed.clone().map_or(Slot::Absent, Slot::Present),
        );
        parsed
    }

    pub(crate) fn header_fields(&mut self, pos: usize) -> Option<HeaderLine> {
        if pos >= self.document.len() {
            return None;
        }
        if let Some(slot) = self.parsed_headers.get(pos) {
            return slot.present().cloned();
        }
        let markup = self.config.markup;
        let parsed = self
            .document
            .line(pos)
            .and_then(|line| parse_header(line, markup));
        self.parsed_headers.set(
            pos,
            parsed.clone().map_or(Slot::Absent, Slot::Present),
        );
        parsed
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    /// Cached record for `id`, fetched from its store on first access
    pub fn get_record(&mut self, id: &ShortId) -> Result<Option<&Record>> {
        self.ensure_fresh()?;
        if !self.records.contains_key(id) {
            let fetched = self.stores.get(id)?;
            self.records
                .insert(id.clone(), fetched.map_or(Slot::Absent, Slot::Present));
        }
        Ok(self.records.get(id).and_then(Slot::present))
    }

    /// Fetch the records behind every identifier in the document, one
    /// query per source
    pub fn load_records(&mut self) -> Result<()> {
        self.ensure_fresh()?;
        let mut wanted: BTreeMap<String, Vec<ShortId>> = BTreeMap::new();
        for pos in 0..self.document.len() {
            let Some(fields) = self.task_fields(pos) else {
                continue;
            };
            let Some(identifier) = fields.identifier else {
                continue;
            };
            let source = fields
                .source
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
            if !self.stores.contains(&source) {
                continue;
            }
            let short = ShortId::new(&identifier, &source);
            if self.records.contains_key(&short) {
                continue;
            }
            let shorts = wanted.entry(source).or_default();
            if !shorts.contains(&short) {
                shorts.push(short);
            }
        }

        for (source, shorts) in wanted {
            let prefixes: Vec<String> = shorts.iter().map(|s| s.prefix().to_string()).collect();
            for record in self.stores.get_many(&source, &prefixes)? {
                self.store_record(record);
            }
            for short in shorts {
                self.records.entry(short).or_insert(Slot::Absent);
            }
        }
        Ok(())
    }

    /// Re-copy store fields into every saved entry
    pub fn refresh_from_records(&mut self) -> Result<()> {
        self.ensure_fresh()?;
        for id in self.entry_ids() {
            let Some(short) = self.entry(id).and_then(|e| e.identifier.clone()) else {
                continue;
            };
            let Some(record) = self.cached_record(&short).cloned() else {
                continue;
            };
            if let Some(entry) = self.entry_mut(id) {
                entry.adopt_record_fields(&record);
                entry.update_from_record(&record);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Presets
    // -----------------------------------------------------------------------

    /// Resolve the preset in effect at every header line
    pub fn load_presets(&mut self) -> Result<()> {
        self.ensure_fresh()?;
        self.presets.clear();
        let mut stack: Vec<PresetHeader> = Vec::new();
        for pos in 0..self.document.len() {
            let Some(header) = self.header_fields(pos) else {
                continue;
            };
            let level = header.level();
            while stack.last().is_some_and(|p| p.level >= level) {
                stack.pop();
            }
            let parent = stack.last().cloned().unwrap_or_else(PresetHeader::root);

            let effective = match header {
                HeaderLine::Preset(fields) => {
                    let own = tokenize(&fields.filter);
                    let mut filter = parent.filter.clone();
                    if !own.is_empty() {
                        filter.push("(".to_string());
                        filter.extend(own);
                        filter.push(")".to_string());
                    }
                    let (own_defaults, malformed) = match &fields.defaults {
                        Some(text) => to_defaults(&tokenize(text)),
                        None => to_defaults(&filter),
                    };
                    for text in malformed {
                        self.warn(Warning::MalformedDue {
                            position: pos,
                            text,
                        });
                    }
                    let mut defaults = parent.defaults.clone();
                    defaults.merge(&own_defaults);
                    PresetHeader {
                        position: pos,
                        level,
                        filter,
                        defaults,
                    }
                }
                // Other headers pass the enclosing preset down unchanged
                _ => PresetHeader {
                    position: pos,
                    level,
                    ..parent
                },
            };
            stack.push(effective.clone());
            self.presets.set(pos, Slot::Present(effective));
        }
        self.presets_loaded = true;
        Ok(())
    }

    fn ensure_presets(&mut self) -> Result<()> {
        if !self.presets_loaded {
            self.load_presets()?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    /// Entry for the task line at `pos`, parsed and cached on first access.
    /// `None` when the line is not a task.
    pub fn get_entry(&mut self, pos: usize) -> Result<Option<EntryId>> {
        self.ensure_fresh()?;
        if pos >= self.document.len() {
            return Ok(None);
        }
        if let Some(slot) = self.entries.get(pos) {
            return Ok(slot.present().copied());
        }
        let Some(fields) = self.task_fields(pos) else {
            self.entries.set(pos, Slot::Absent);
            return Ok(None);
        };

        let explicit_source = fields.source.is_some();
        let source = fields
            .source
            .clone()
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        if !self.stores.contains(&source) {
            self.warn(Warning::UnknownSource {
                position: pos,
                source_key: source,
            });
            self.entries.set(pos, Slot::Absent);
            return Ok(None);
        }

        let parsed_due = fields.due.as_deref().map(parse_due);
        let malformed_due = matches!(parsed_due, Some(None));
        let line_due = parsed_due.flatten();
        let line_id = fields
            .identifier
            .as_deref()
            .map(|id| ShortId::new(id, &source));

        let mut entry = Entry::new(pos, &source);
        entry.indent = fields.indent.clone();
        entry.bullet = fields.bullet;
        entry.mark = fields.mark;
        // A malformed stamp forces a rewrite so it disappears from the line
        entry.rendered = (!malformed_due).then(|| LineView {
            indent: fields.indent.clone(),
            bullet: fields.bullet,
            mark: fields.mark,
            description: fields.description.clone(),
            priority: fields.priority,
            due: line_due,
            identifier: line_id.clone(),
        });

        let record = match &line_id {
            Some(short) => {
                let found = self.get_record(short)?.cloned();
                if found.is_none() {
                    self.warn(Warning::StaleIdentifier {
                        position: pos,
                        identifier: short.render(),
                    });
                }
                found
            }
            None => None,
        };

        let line_wins = self.buffer_has_authority || record.is_none();
        if let Some(record) = &record {
            entry.identifier = record.short_id();
            entry.adopt_record_fields(record);
            if !self.buffer_has_authority {
                entry.mark = fields.mark.for_record(record);
            }
        }
        if line_wins {
            entry.description = fields.description.clone();
            entry.priority = fields.priority;
            entry.due = line_due;
            if malformed_due && let Some(text) = fields.due.clone() {
                self.warn(Warning::MalformedDue {
                    position: pos,
                    text,
                });
            }
        }

        let parent = self.find_parent(pos, &fields.indent)?;
        entry.parent = parent;

        if entry.identifier.is_none() {
            if self.buffer_has_authority {
                self.prepare_new_entry(&mut entry, parent, !explicit_source)?;
            }
            entry.draft = Some(Record::draft(&entry.source));
        }

        let id = self.register_entry(entry);
        if let Some(parent) = parent {
            self.add_dependency(parent, id);
        }
        Ok(Some(id))
    }

    /// Load every task line of the document
    pub fn load_entries(&mut self) -> Result<()> {
        for pos in 0..self.document.len() {
            self.get_entry(pos)?;
        }
        Ok(())
    }

    /// Nearest task line above `pos` with a shallower indent, within the
    /// same run of task lines
    fn find_parent(&mut self, pos: usize, indent: &str) -> Result<Option<EntryId>> {
        let width = self.config.indent_width;
        let own = indent_columns(indent, width);
        let mut p = pos;
        while p > 0 {
            p -= 1;
            let Some(candidate) = self.get_entry(p)? else {
                return Ok(None);
            };
            if let Some(entry) = self.entry(candidate)
                && indent_columns(&entry.indent, width) < own
            {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Fill a never-saved entry: inherit from its parent, apply the
    /// enclosing preset and region defaults, then its own modstring
    fn prepare_new_entry(
        &mut self,
        entry: &mut Entry,
        parent: Option<EntryId>,
        adopt_region_source: bool,
    ) -> Result<()> {
        if let Some(parent) = parent.and_then(|id| self.entry(id)) {
            entry.tags.extend(parent.tags.iter().cloned());
            entry.project = parent.project.clone();
        }

        let mut p = entry.position;
        while p > 0 {
            p -= 1;
            let Some(header) = self.header_fields(p) else {
                continue;
            };
            self.ensure_presets()?;
            if let Some(preset) = self.presets.present(p) {
                preset.defaults.apply(entry);
            }
            if let HeaderLine::Region(fields) = header
                && let Some(region) = self.region_settings(p, &fields)?
            {
                if adopt_region_source {
                    entry.source = region.source.clone();
                }
                region.defaults.apply(entry);
            }
            break;
        }

        if let Some((text, mods)) = split_modstring(&entry.description) {
            let text = text.to_string();
            let (defaults, malformed) = to_defaults(&tokenize(mods));
            entry.description = text;
            defaults.apply(entry);
            for text in malformed {
                self.warn(Warning::MalformedDue {
                    position: entry.position,
                    text,
                });
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Regions
    // -----------------------------------------------------------------------

    /// Region whose header is at `pos`, built and cached on first access.
    /// `None` when the line is no region header or the region was skipped.
    pub fn get_region(&mut self, pos: usize) -> Result<Option<&Region>> {
        self.ensure_fresh()?;
        if pos >= self.document.len() {
            return Ok(None);
        }
        if self.regions.get(pos).is_some() {
            return Ok(self.regions.present(pos));
        }
        let Some(HeaderLine::Region(fields)) = self.header_fields(pos) else {
            self.regions.set(pos, Slot::Absent);
            return Ok(None);
        };
        let (region, warnings) = self.build_region(pos, &fields)?;
        for warning in warnings {
            self.warn(warning);
        }
        let Some(region) = region else {
            self.regions.set(pos, Slot::Absent);
            return Ok(None);
        };
        // Cached before the tasks load so entries below can see its defaults
        self.regions.set(pos, Slot::Present(region));

        let mut tasks = Vec::new();
        let mut p = pos + 1;
        while let Some(id) = self.get_entry(p)? {
            tasks.push(id);
            p += 1;
        }
        if let Some(region) = self.regions.get_mut(pos) {
            tracing::debug!(name = %region.name, line = pos + 1, tasks = tasks.len(), "region loaded");
            region.tasks = tasks;
        }
        Ok(self.regions.present(pos))
    }

    /// Load every region of the document
    pub fn load_regions(&mut self) -> Result<()> {
        for pos in 0..self.document.len() {
            self.get_region(pos)?;
        }
        Ok(())
    }

    /// Region at `pos` for defaults lookup; builds it quietly when it is not
    /// cached yet
    fn region_settings(&mut self, pos: usize, fields: &RegionFields) -> Result<Option<Region>> {
        if let Some(region) = self.regions.present(pos) {
            return Ok(Some(region.clone()));
        }
        Ok(self.build_region(pos, fields)?.0)
    }

    fn build_region(
        &mut self,
        pos: usize,
        fields: &RegionFields,
    ) -> Result<(Option<Region>, Vec<Warning>)> {
        let mut warnings = Vec::new();
        let source = fields
            .source
            .clone()
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        if !self.stores.contains(&source) {
            warnings.push(Warning::UnknownSource {
                position: pos,
                source_key: source,
            });
            return Ok((None, warnings));
        }

        let stores = &self.stores;
        let processed = match process_filter(&fields.filter, |name| stores.context(&source, name)) {
            Ok(processed) => processed,
            Err(ReconcileError::UndefinedContext(context)) => {
                warnings.push(Warning::UndefinedContext {
                    position: pos,
                    context,
                });
                return Ok((None, warnings));
            }
            Err(e) => return Err(e),
        };

        self.ensure_presets()?;
        let mut filter = self
            .presets
            .present(pos)
            .map(|preset| preset.filter.clone())
            .unwrap_or_default();
        filter.extend(processed.tokens.iter().cloned());

        let (defaults, malformed) = match &fields.defaults {
            Some(text) => to_defaults(&tokenize(text)),
            None => to_defaults(&processed.tokens),
        };
        for text in malformed {
            warnings.push(Warning::MalformedDue {
                position: pos,
                text,
            });
        }

        let sort = match &fields.sort {
            None => self.config.default_sort.clone(),
            Some(indicator) => match self.config.sort_orders.get(indicator) {
                Some(sort) => sort.clone(),
                None => {
                    warnings.push(Warning::UnknownSortIndicator {
                        position: pos,
                        indicator: indicator.clone(),
                    });
                    self.config.default_sort.clone()
                }
            },
        };

        let region = Region {
            position: pos,
            level: fields.level,
            name: fields.name.clone(),
            filter,
            defaults,
            sort,
            source,
            visible: processed.visible,
            tasks: Vec::new(),
        };
        Ok((Some(region), warnings))
    }
}
