//! County-level reshaping and metrics pipeline.
//!
//! Raw race records are aggregated into one row per county and race,
//! flattened into one row per county, extended with the vote-ratio and
//! split-ticket metrics, and summarized by swing-state status.

pub mod aggregate;
pub mod analyzer;
pub mod flatten;
pub mod metrics;
pub mod summary;
pub mod types;
pub mod utility;
