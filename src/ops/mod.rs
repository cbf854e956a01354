pub mod persist;
pub mod reconcile;
pub mod selection;
pub mod sort;
pub mod sync;

pub use persist::{Scheduler, persist_all, save_entry};
pub use reconcile::{
    ReconcileCounts, RegionDiff, RegionReport, diff_region, inspect_region, reconcile_all,
    reconcile_region,
};
pub use sort::{SortAttr, SortKey, parse_sort, sort_region};
pub use sync::{PassReport, sync_from_store, sync_to_store};
