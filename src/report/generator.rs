//! Markdown run summary.
//!
//! Written next to the CSV tables as `run_summary.md`: what was searched,
//! how each iteration went, and how papers spread across theories.

use crate::analysis::CurationTables;
use crate::models::{IterationSummary, RunMetadata, RunStats};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const SUMMARY_FILE: &str = "run_summary.md";

/// Everything the summary renders.
pub struct RunReport<'a> {
    pub metadata: &'a RunMetadata,
    pub stats: &'a RunStats,
    pub tables: &'a CurationTables,
    pub iterations: &'a [IterationSummary],
}

/// Generate the complete Markdown summary.
pub fn generate_run_summary(report: &RunReport<'_>) -> String {
    let mut output = String::new();

    output.push_str("# Aging Literature Curation Run\n\n");
    output.push_str(&generate_metadata_section(report.metadata));
    output.push_str(&generate_totals_section(report.stats, report.tables));
    output.push_str(&generate_theory_section(report.tables));
    output.push_str(&generate_iteration_section(report.iterations));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &RunMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!(
        "- **Started:** {}\n",
        metadata.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push_str(&format!("- **Stopped Because:** {}\n\n", metadata.stop_reason));

    section
}

fn generate_totals_section(stats: &RunStats, tables: &CurationTables) -> String {
    let mut section = String::new();

    section.push_str("## Totals\n\n");
    section.push_str("| Metric | Count |\n");
    section.push_str("|:---|:---:|\n");
    let rows = [
        ("Iterations", stats.iterations),
        ("Queries issued", stats.queries_issued),
        ("Candidates returned", stats.candidates_seen),
        ("Papers collected", stats.papers_accepted),
        ("Papers rejected", stats.papers_rejected),
        ("Papers skipped (fetch failed)", stats.papers_failed),
        ("Annotated from full text", stats.full_texts),
        ("Extractions degraded to Unknown", stats.degraded_extractions),
        ("Theories", tables.theory_count()),
        ("Theory-paper annotations", tables.annotation_count()),
    ];
    for (label, count) in rows {
        section.push_str(&format!("| {} | {} |\n", label, count));
    }
    section.push('\n');

    section
}

fn generate_theory_section(tables: &CurationTables) -> String {
    let mut section = String::new();

    section.push_str("## Papers per Theory\n\n");

    let dist = tables.theory_distribution();
    if dist.is_empty() {
        section.push_str("No papers were collected.\n\n");
        return section;
    }

    section.push_str("| Theory | Papers |\n");
    section.push_str("|:---|:---:|\n");
    for (name, count) in dist {
        section.push_str(&format!("| {} | {} |\n", name, count));
    }
    section.push('\n');

    section
}

fn generate_iteration_section(iterations: &[IterationSummary]) -> String {
    if iterations.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Iterations\n\n");
    section.push_str("| # | Query | Candidates | Duplicates | New | Rejected | Failed |\n");
    section.push_str("|:---:|:---|:---:|:---:|:---:|:---:|:---:|\n");

    for summary in iterations {
        for q in &summary.queries {
            let query = if q.search_failed {
                format!("`{}` (search failed)", q.query)
            } else {
                format!("`{}`", q.query)
            };
            section.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                summary.iteration,
                query.replace('|', "\\|"),
                q.candidates,
                q.duplicates,
                q.new_papers,
                q.rejected,
                q.failed
            ));
        }
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    format!(
        "---\n\n*Generated by agingcurator v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Write the summary into `output_dir`.
pub fn write_run_summary(report: &RunReport<'_>, output_dir: &Path) -> Result<PathBuf> {
    let path = output_dir.join(SUMMARY_FILE);
    std::fs::write(&path, generate_run_summary(report))
        .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaperMetadata, QueryYield};
    use chrono::Utc;

    fn metadata() -> RunMetadata {
        RunMetadata {
            source: "pubmed".to_string(),
            model_used: "llama3.2:latest".to_string(),
            started_at: Utc::now(),
            duration_seconds: 12.5,
            stop_reason: "no new papers for 3 consecutive iterations".to_string(),
        }
    }

    fn tables() -> CurationTables {
        let mut tables = CurationTables::new();
        let paper = PaperMetadata {
            source_id: "1".to_string(),
            url: "u1".to_string(),
            title: "T".to_string(),
            abstract_text: String::new(),
            year: Some(2022),
            authors: vec![],
            journal: String::new(),
        };
        tables.merge(
            &paper,
            &["Cellular Senescence".to_string()].into_iter().collect(),
            &[],
        );
        tables
    }

    #[test]
    fn test_generate_run_summary() {
        let metadata = metadata();
        let stats = RunStats {
            iterations: 2,
            papers_accepted: 1,
            ..Default::default()
        };
        let tables = tables();
        let iterations = vec![IterationSummary {
            iteration: 1,
            queries: vec![QueryYield {
                query: "senescence OR senolytics".to_string(),
                candidates: 4,
                new_papers: 1,
                ..Default::default()
            }],
        }];

        let markdown = generate_run_summary(&RunReport {
            metadata: &metadata,
            stats: &stats,
            tables: &tables,
            iterations: &iterations,
        });

        assert!(markdown.contains("# Aging Literature Curation Run"));
        assert!(markdown.contains("- **Source:** pubmed"));
        assert!(markdown.contains("no new papers for 3 consecutive iterations"));
        assert!(markdown.contains("| Papers collected | 1 |"));
        assert!(markdown.contains("| Cellular Senescence | 1 |"));
        assert!(markdown.contains("| 1 | `senescence OR senolytics` | 4 | 0 | 1 | 0 | 0 |"));
    }

    #[test]
    fn test_empty_run_summary() {
        let metadata = metadata();
        let stats = RunStats::default();
        let tables = CurationTables::new();

        let markdown = generate_run_summary(&RunReport {
            metadata: &metadata,
            stats: &stats,
            tables: &tables,
            iterations: &[],
        });

        assert!(markdown.contains("No papers were collected."));
        assert!(!markdown.contains("## Iterations"));
    }

    #[test]
    fn test_write_run_summary() {
        let dir = tempfile::TempDir::new().unwrap();
        let metadata = metadata();
        let stats = RunStats::default();
        let tables = tables();

        let path = write_run_summary(
            &RunReport {
                metadata: &metadata,
                stats: &stats,
                tables: &tables,
                iterations: &[],
            },
            dir.path(),
        )
        .unwrap();

        assert!(path.ends_with(SUMMARY_FILE));
        assert!(std::fs::read_to_string(path).unwrap().contains("Cellular Senescence"));
    }
}
