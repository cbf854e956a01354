use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;

use crate::model::entry::Entry;
use crate::model::record::Priority;

/// Field values applied to entries created under a region or preset.
///
/// For the scalar fields the outer `Option` says whether the key was given
/// at all; `Some(None)` clears the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defaults {
    pub project: Option<Option<String>>,
    pub priority: Option<Option<Priority>>,
    pub due: Option<Option<NaiveDateTime>>,
    pub tags: BTreeSet<String>,
}

impl Defaults {
    pub fn is_empty(&self) -> bool {
        self.project.is_none() && self.priority.is_none() && self.due.is_none() && self.tags.is_empty()
    }

    /// Overwrite every field this set names. Tags are added.
    pub fn apply(&self, entry: &mut Entry) {
        if let Some(project) = &self.project {
            entry.project = project.clone();
        }
        if let Some(priority) = self.priority {
            entry.priority = priority;
        }
        if let Some(due) = self.due {
            entry.due = due;
        }
        entry.tags.extend(self.tags.iter().cloned());
    }

    /// Fill only the fields `entry` leaves empty
    pub fn fill_absent(&self, entry: &mut Entry) {
        if entry.project.is_none()
            && let Some(project) = &self.project
        {
            entry.project = project.clone();
        }
        if entry.priority.is_none()
            && let Some(priority) = self.priority
        {
            entry.priority = priority;
        }
        if entry.due.is_none()
            && let Some(due) = self.due
        {
            entry.due = due;
        }
        if entry.tags.is_empty() {
            entry.tags = self.tags.clone();
        }
    }

    /// Layer `other` on top of these defaults (nested presets)
    pub fn merge(&mut self, other: &Defaults) {
        if other.project.is_some() {
            self.project = other.project.clone();
        }
        if other.priority.is_some() {
            self.priority = other.priority;
        }
        if other.due.is_some() {
            self.due = other.due;
        }
        self.tags.extend(other.tags.iter().cloned());
    }
}

impl fmt::Display for Defaults {
    /// Modstring form, e.g. `project:home priority:H +work`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(project) = &self.project {
            parts.push(format!("project:{}", project.as_deref().unwrap_or("")));
        }
        if let Some(priority) = self.priority {
            parts.push(format!("priority:{}", priority.map(Priority::code).unwrap_or("")));
        }
        if let Some(due) = self.due {
            let rendered = due.map(|d| d.format("%Y-%m-%dT%H:%M").to_string());
            parts.push(format!("due:{}", rendered.unwrap_or_default()));
        }
        for tag in &self.tags {
            parts.push(format!("+{}", tag));
        }
        f.write_str(&parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::DEFAULT_SOURCE;

    fn work_defaults() -> Defaults {
        Defaults {
            project: Some(Some("office".into())),
            priority: Some(Some(Priority::High)),
            due: None,
            tags: ["work".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn apply_overwrites_and_adds_tags() {
        let mut entry = Entry::new(0, DEFAULT_SOURCE);
        entry.project = Some("home".into());
        entry.tags.insert("errand".into());
        work_defaults().apply(&mut entry);
        assert_eq!(entry.project.as_deref(), Some("office"));
        assert_eq!(entry.priority, Some(Priority::High));
        assert_eq!(entry.tags.len(), 2);
    }

    #[test]
    fn fill_absent_keeps_existing_fields() {
        let mut entry = Entry::new(0, DEFAULT_SOURCE);
        entry.project = Some("home".into());
        work_defaults().fill_absent(&mut entry);
        assert_eq!(entry.project.as_deref(), Some("home"));
        assert_eq!(entry.priority, Some(Priority::High));
        assert!(entry.tags.contains("work"));
    }

    #[test]
    fn merge_layers_nested_presets() {
        let mut outer = work_defaults();
        let inner = Defaults {
            project: Some(Some("office.reports".into())),
            tags: ["weekly".to_string()].into_iter().collect(),
            ..Defaults::default()
        };
        outer.merge(&inner);
        assert_eq!(outer.to_string(), "project:office.reports priority:H +weekly +work");
    }
}
