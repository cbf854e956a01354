//! User-visible warnings raised during a pass.
//!
//! Warnings never abort a pass. They are logged through `tracing` as they
//! are raised and handed back to the caller in the pass report.

/// A recoverable problem found while synchronizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A line names an identifier the store does not know
    StaleIdentifier { position: usize, identifier: String },
    /// A due stamp that is not a valid date; the field was ignored
    MalformedDue { position: usize, text: String },
    /// A region names a sort indicator missing from the config
    UnknownSortIndicator { position: usize, indicator: String },
    /// A region filter references a context that is not defined
    UndefinedContext { position: usize, context: String },
    /// A line or region names a source that is not configured
    UnknownSource { position: usize, source_key: String },
    /// A line dropped out of its region's filter but has edits not yet saved
    UnsavedEditsKept { position: usize, description: String },
    /// A region could not be reconciled and was left untouched
    RegionSkipped { position: usize, reason: String },
}

impl Warning {
    /// Document line the warning refers to
    pub fn position(&self) -> usize {
        match self {
            Warning::StaleIdentifier { position, .. }
            | Warning::MalformedDue { position, .. }
            | Warning::UnknownSortIndicator { position, .. }
            | Warning::UndefinedContext { position, .. }
            | Warning::UnknownSource { position, .. }
            | Warning::UnsavedEditsKept { position, .. }
            | Warning::RegionSkipped { position, .. } => *position,
        }
    }
}

/// Format a warning for display. Line numbers are 1-based.
pub fn format_warning(warning: &Warning) -> String {
    let line = warning.position() + 1;
    match warning {
        Warning::StaleIdentifier { identifier, .. } => format!(
            "line {}: task {} not found in the store, it will be recreated",
            line, identifier
        ),
        Warning::MalformedDue { text, .. } => {
            format!("line {}: invalid timestamp ({}), ignored", line, text)
        }
        Warning::UnknownSortIndicator { indicator, .. } => format!(
            "line {}: sort indicator ${} is not defined, using the default sort",
            line, indicator
        ),
        Warning::UndefinedContext { context, .. } => {
            format!("line {}: context @{} is not defined", line, context)
        }
        Warning::UnknownSource { source_key, .. } => {
            format!("line {}: source {} is not configured", line, source_key)
        }
        Warning::UnsavedEditsKept { description, .. } => format!(
            "line {}: \"{}\" no longer matches its region but has unsaved edits, kept",
            line, description
        ),
        Warning::RegionSkipped { reason, .. } => {
            format!("line {}: region skipped: {}", line, reason)
        }
    }
}

/// Warnings collected during one pass
#[derive(Debug, Clone, Default)]
pub struct Warnings {
    items: Vec<Warning>,
}

impl Warnings {
    pub fn push(&mut self, warning: Warning) {
        tracing::warn!("{}", format_warning(&warning));
        self.items.push(warning);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.items.iter()
    }

    /// Hand the collected warnings to the caller, leaving the collector empty
    pub fn take(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uses_one_based_lines() {
        let w = Warning::MalformedDue {
            position: 2,
            text: "2015-13-45".into(),
        };
        assert_eq!(format_warning(&w), "line 3: invalid timestamp (2015-13-45), ignored");
    }

    #[test]
    fn test_take_empties_collector() {
        let mut warnings = Warnings::default();
        warnings.push(Warning::UnknownSource {
            position: 0,
            source_key: "Q".into(),
        });
        assert_eq!(warnings.len(), 1);
        let taken = warnings.take();
        assert_eq!(taken.len(), 1);
        assert!(warnings.is_empty());
    }
}
