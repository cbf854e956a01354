//! Keeps a plain-text task outline in sync with external task stores.
//!
//! A document holds task lines (`* [ ] description  #abcd1234`) and region
//! headers (`== Work | +work ==`) whose contents are filled from a store
//! query. A [`Cache`] indexes one open document; the passes in [`ops::sync`]
//! push document edits to the stores or pull store changes into the
//! document.

pub mod cache;
pub mod error;
pub mod io;
pub mod model;
pub mod ops;
pub mod parse;
pub mod warnings;

pub use cache::{Cache, CacheKey};
pub use error::{ReconcileError, Result};
pub use ops::sync::{PassReport, sync_from_store, sync_to_store};
pub use warnings::{Warning, format_warning};
