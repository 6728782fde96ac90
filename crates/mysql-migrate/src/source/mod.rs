//! Source side of the pipeline: table discovery, key-range paging and
//! range reads.

mod generator;
mod pager;
mod reader;

pub use generator::CommandGenerator;
pub use pager::{batch_sizes, KeyRangePager, Probe};
pub use reader::{build_query, BatchReader};
