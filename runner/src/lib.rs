//! Run phase of the experiment matrix: expand option groups into
//! configurations, run each one as a benchmark process under a timeout and
//! persist the scraped records next to the captured output.

pub mod batch;
pub mod config;
pub mod executors;
pub mod matrix;
pub mod storage;
