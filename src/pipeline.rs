//! One complete curation run: validate, curate, check, export.
//!
//! Nothing is written to the output directory unless the configuration
//! validates and the finished tables pass their integrity check.

use crate::agent::annotator::PaperAnnotator;
use crate::agent::curation_loop::{CurationLoop, CurationOutcome, LoopSettings};
use crate::agent::planner::QueryPlanner;
use crate::analysis::CurationTables;
use crate::config::Config;
use crate::models::RunMetadata;
use crate::report::{self, csv_export::ExportPaths, RunReport};
use crate::sources::LiteratureSource;
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::error;

/// A finished, exported run.
pub struct CompletedRun {
    pub outcome: CurationOutcome,
    pub tables: CurationTables,
    pub metadata: RunMetadata,
    pub exports: ExportPaths,
    pub summary: PathBuf,
}

/// Run the curation loop to completion and export the results.
pub async fn run_pipeline<S, A>(
    config: &Config,
    source: &S,
    annotator: &A,
    show_progress: bool,
) -> Result<CompletedRun>
where
    S: LiteratureSource + ?Sized,
    A: PaperAnnotator + ?Sized,
{
    config.validate().context("Invalid configuration")?;

    let start_time = Instant::now();
    let started_at = Utc::now();

    let mut planner = QueryPlanner::new(&config.planner, &config.taxonomy.theories);
    let settings = LoopSettings {
        max_results_per_query: config.search.max_results_per_query,
        full_text: config.search.full_text,
        request_delay: Duration::from_millis(config.general.request_delay_ms),
        show_progress,
    };

    let mut tables = CurationTables::new();
    let outcome = CurationLoop::new(source, annotator, &config.questions, settings)
        .run(&mut planner, &mut tables)
        .await;

    let metadata = RunMetadata {
        source: source.name().to_string(),
        model_used: annotator.model_name().to_string(),
        started_at,
        duration_seconds: start_time.elapsed().as_secs_f64(),
        stop_reason: outcome.stop_reason.to_string(),
    };

    let output_dir = PathBuf::from(&config.general.output_dir);
    let (exports, summary) = export_checked(
        &RunReport {
            metadata: &metadata,
            stats: &outcome.stats,
            tables: &tables,
            iterations: planner.history(),
        },
        &output_dir,
    )?;

    Ok(CompletedRun {
        outcome,
        tables,
        metadata,
        exports,
        summary,
    })
}

/// Check table integrity, then write the CSV tables and the run summary.
pub fn export_checked(report: &RunReport<'_>, output_dir: &Path) -> Result<(ExportPaths, PathBuf)> {
    let violations = report.tables.check_integrity();
    if !violations.is_empty() {
        for violation in &violations {
            error!("Integrity violation: {}", violation);
        }
        anyhow::bail!(
            "{} table integrity violation(s), refusing to export",
            violations.len()
        );
    }

    let exports = report::export_tables(report.tables, output_dir)?;
    let summary = report::write_run_summary(report, output_dir)?;
    Ok((exports, summary))
}
