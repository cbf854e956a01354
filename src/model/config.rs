use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Sort applied to a region that names no sort indicator
pub const DEFAULT_SORT_ORDER: &str = "status+,end+,due+,priority-,project+";

/// Header syntax of the outline document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Markup {
    /// `== Header ==`
    #[default]
    Default,
    /// `## Header`
    Markdown,
}

/// Configuration from wikisync.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub markup: Markup,
    #[serde(default = "default_sort")]
    pub default_sort: String,
    /// Sort indicator (`$X` in a region header) to sort string
    #[serde(default)]
    pub sort_orders: BTreeMap<String, String>,
    /// Spaces per nesting level when rebuilding indentation
    #[serde(default = "default_indent_width")]
    pub indent_width: usize,
    /// Location of the default store's data file
    #[serde(default)]
    pub data_location: Option<PathBuf>,
    /// Extra stores, keyed by the source indicator used in the document
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    /// Named filters referenced as `@name`
    #[serde(default)]
    pub contexts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub data_location: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            markup: Markup::Default,
            default_sort: default_sort(),
            sort_orders: BTreeMap::new(),
            indent_width: default_indent_width(),
            data_location: None,
            sources: BTreeMap::new(),
            contexts: BTreeMap::new(),
        }
    }
}

fn default_sort() -> String {
    DEFAULT_SORT_ORDER.to_string()
}

fn default_indent_width() -> usize {
    4
}
