pub mod config;
pub mod defaults;
pub mod entry;
pub mod record;
pub mod region;

pub use config::*;
pub use defaults::*;
pub use entry::*;
pub use record::*;
pub use region::*;
