use std::fs;
use std::path::{Path, PathBuf};

use crate::io::json_store::JsonFileStore;
use crate::io::store::{StoreError, StoreRegistry};
use crate::model::config::SyncConfig;

/// Data file of the default store when the config names none
pub const DEFAULT_DATA_FILE: &str = "tasks.json";

/// Error type for loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("could not open store: {0}")]
    Store(#[from] StoreError),
}

/// Parse config text; absent keys take their defaults
pub fn parse_config(text: &str) -> Result<SyncConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Read and parse the config file at `path`
pub fn load_config(path: &Path) -> Result<SyncConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config = parse_config(&text)?;
    tracing::debug!(
        path = %path.display(),
        sources = config.sources.len(),
        contexts = config.contexts.len(),
        "config loaded"
    );
    Ok(config)
}

/// Open a JSON store for the default source and every configured extra
/// source. Relative data locations resolve against `base_dir`.
pub fn open_stores(config: &SyncConfig, base_dir: &Path) -> Result<StoreRegistry, ConfigError> {
    let default_path = config
        .data_location
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE));
    let mut registry = StoreRegistry::new(JsonFileStore::open(&base_dir.join(default_path))?);
    for (key, source) in &config.sources {
        let store = JsonFileStore::open(&base_dir.join(&source.data_location))?;
        registry.insert(key, store);
    }
    registry.set_contexts(config.contexts.clone());
    Ok(registry)
}
