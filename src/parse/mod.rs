pub mod filter;
pub mod header_parser;
pub mod line_parser;
pub mod line_serializer;
pub mod modstring;

pub use filter::{ProcessedFilter, process_filter};
pub use header_parser::{HeaderLine, PresetFields, RegionFields, parse_header};
pub use line_parser::{TaskFields, parse_due, parse_task};
pub use line_serializer::{format_due, format_entry};
pub use modstring::{split_modstring, to_defaults, tokenize};
