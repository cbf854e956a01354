use crate::model::defaults::Defaults;
use crate::model::entry::EntryId;

/// A filtered, auto-populated section of the document.
///
/// A region owns the contiguous run of task lines directly below its header.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub position: usize,
    pub level: usize,
    pub name: String,
    /// Processed filter tokens sent to the store
    pub filter: Vec<String>,
    pub defaults: Defaults,
    /// Sort string, already resolved from the indicator
    pub sort: String,
    pub source: String,
    /// When false, records shown elsewhere in the document are left out
    pub visible: bool,
    /// Entries shown under the header, in document order
    pub tasks: Vec<EntryId>,
}

impl Region {
    /// Line right after the last task the region owns
    pub fn end(&self) -> usize {
        self.position + 1 + self.tasks.len()
    }
}

/// A header carrying a filter and defaults that apply to everything below
/// it, nested by header level.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetHeader {
    pub position: usize,
    pub level: usize,
    /// Accumulated filter of this preset and all enclosing ones
    pub filter: Vec<String>,
    /// Accumulated defaults
    pub defaults: Defaults,
}

impl PresetHeader {
    /// The empty preset every top-level section starts from
    pub fn root() -> Self {
        PresetHeader {
            position: 0,
            level: 0,
            filter: Vec::new(),
            defaults: Defaults::default(),
        }
    }
}
