//! Report phase of the experiment matrix: read back the artifacts of finished
//! batches and fold their records into pivot tables.

pub mod aggregate;
pub mod config;
pub mod pivot;
pub mod report;
