//! Directory scanning: candidate discovery, the single-flight scan queue and
//! the service that drives candidates through resolution and the adder.

mod queue;
mod registry;
mod service;
mod types;
mod walker;

pub use queue::ScanQueue;
pub use registry::ScannerRegistry;
pub use service::{ScanAllReport, ScanContext, ScannerService};
pub use types::*;
pub use walker::{scan_entries, test_extraction_rules, ScanEntries};
