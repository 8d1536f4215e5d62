//! Aggregation of annotated papers into the curation tables.

pub mod aggregator;

pub use aggregator::{normalize_theory_key, CurationTables};
