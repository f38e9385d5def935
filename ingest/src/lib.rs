//! Turning captured benchmark output into flat result records.
//!
//! Shared by the run phase (which extracts records from the text of a finished
//! run) and the report phase (which reads the persisted records back).

pub mod extract;
pub mod identity;
pub mod layout;
pub mod record;

pub use extract::{Extraction, ExtractError, Extractor, Rejected};
pub use identity::{Catalog, CatalogEntry, Features, IndexMode, UNKNOWN};
pub use record::{Latency, RecordError, ResultRecord, RECORD_HEADER};

/// sequential id of a single run inside a batch
pub type RunId = u64;
