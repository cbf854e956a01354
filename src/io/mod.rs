pub mod config_io;
pub mod document;
pub mod json_store;
pub mod lock;
pub mod memory_store;
pub mod query;
pub mod recovery;
pub mod store;

pub use document::{Document, DocumentError, FileDocument, LineBuffer};
pub use json_store::JsonFileStore;
pub use memory_store::MemoryStore;
pub use store::{StoreError, StoreRegistry, TaskStore};
