//! NEM12 meter data: parsing, merging and daily aggregation.
//!
//! The pipeline is synchronous and self-contained per [`parser::ParseSession`]:
//! sources are parsed into a register / day / event tree, which is either
//! re-serialised per NMI ([`writer`]) or flattened and summed into daily usage
//! ([`flatten`], [`aggregate`]).

pub mod aggregate;
pub mod error;
pub mod flatten;
pub mod parser;
pub mod record;
pub mod writer;

pub use aggregate::{aggregate_daily, aggregate_intervals, daily_usage};
pub use error::{Location, Nem12Error};
pub use flatten::flatten;
pub use parser::{parse_files, parse_sources, Nem12Parser, ParseSession, ParseStats};
pub use writer::{merge_by_nmi, write_merged_files, MergedNmi};
