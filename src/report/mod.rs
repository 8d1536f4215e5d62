//! Output writers: the three CSV tables and the Markdown run summary.

pub mod csv_export;
pub mod generator;

pub use csv_export::export_tables;
pub use generator::{write_run_summary, RunReport};
