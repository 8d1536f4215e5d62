//! CSV export of the three curation tables and the supplementary
//! per-paper detail under `supplementary/`.

use crate::analysis::CurationTables;
use crate::models::QUESTION_COUNT;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

pub const THEORIES_FILE: &str = "table1_theories.csv";
pub const PAPERS_FILE: &str = "table2_papers.csv";
pub const ANNOTATIONS_FILE: &str = "table3_annotations.csv";
pub const SUPPLEMENTARY_DIR: &str = "supplementary";
pub const PAPER_METADATA_FILE: &str = "paper_metadata.csv";
pub const THEORY_TAGS_FILE: &str = "theory_tags_detailed.csv";

const THEORY_HEADER: [&str; 3] = ["theory_id", "theory_name", "number_of_collected_papers"];
const PAPER_HEADER: [&str; 4] = ["theory_id", "paper_url", "paper_name", "paper_year"];
const PAPER_METADATA_HEADER: [&str; 9] = [
    "paper_url",
    "source_id",
    "title",
    "abstract",
    "authors",
    "journal",
    "has_full_text",
    "full_text_source",
    "processing_seconds",
];
const THEORY_TAG_HEADER: [&str; 6] = [
    "paper_url",
    "theory_id",
    "theory_name",
    "confidence",
    "evidence_snippets",
    "text_basis",
];

/// Where the tables were written.
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub theories: PathBuf,
    pub papers: PathBuf,
    pub annotations: PathBuf,
    pub paper_metadata: PathBuf,
    pub theory_tags: PathBuf,
}

impl ExportPaths {
    pub fn all(&self) -> [&PathBuf; 5] {
        [
            &self.theories,
            &self.papers,
            &self.annotations,
            &self.paper_metadata,
            &self.theory_tags,
        ]
    }
}

/// Write the three tables into `output_dir` and the supplementary tables
/// into `output_dir/supplementary`, creating both if needed.
pub fn export_tables(tables: &CurationTables, output_dir: &Path) -> Result<ExportPaths> {
    let supplementary = output_dir.join(SUPPLEMENTARY_DIR);
    std::fs::create_dir_all(&supplementary).with_context(|| {
        format!("Failed to create output directory: {}", supplementary.display())
    })?;

    let paths = ExportPaths {
        theories: output_dir.join(THEORIES_FILE),
        papers: output_dir.join(PAPERS_FILE),
        annotations: output_dir.join(ANNOTATIONS_FILE),
        paper_metadata: supplementary.join(PAPER_METADATA_FILE),
        theory_tags: supplementary.join(THEORY_TAGS_FILE),
    };

    write_rows(&paths.theories, &THEORY_HEADER, &tables.theory_rows())?;
    write_rows(&paths.papers, &PAPER_HEADER, &tables.paper_rows())?;
    write_annotations(&paths.annotations, tables)?;
    write_rows(
        &paths.paper_metadata,
        &PAPER_METADATA_HEADER,
        tables.paper_detail_rows(),
    )?;
    write_rows(&paths.theory_tags, &THEORY_TAG_HEADER, tables.theory_tag_rows())?;

    info!(
        "Exported {} theories, {} papers ({} theory-paper rows) to {}",
        tables.theory_count(),
        tables.paper_count(),
        tables.annotation_count(),
        output_dir.display()
    );

    Ok(paths)
}

/// Header row of the annotation table.
pub fn annotation_header() -> Vec<String> {
    let mut header: Vec<String> = PAPER_HEADER.iter().map(|h| h.to_string()).collect();
    header.extend((1..=QUESTION_COUNT).map(|i| format!("Q{}", i)));
    header
}

fn writer(path: &Path) -> Result<csv::Writer<File>> {
    // Headers are written explicitly so empty tables still get one.
    csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))
}

fn write_rows<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    let mut wtr = writer(path)?;
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

fn write_annotations(path: &Path, tables: &CurationTables) -> Result<()> {
    let mut wtr = writer(path)?;
    wtr.write_record(annotation_header())?;
    for row in tables.annotation_rows() {
        wtr.write_record(row.record())
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Classification, PaperMetadata, TextProvenance, TheoryEvidence};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn read_records(path: &Path) -> Vec<Vec<String>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        rdr.records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect()
    }

    fn sample_tables() -> CurationTables {
        let mut tables = CurationTables::new();
        let paper = PaperMetadata {
            source_id: "1".to_string(),
            url: "https://pubmed.ncbi.nlm.nih.gov/1/".to_string(),
            title: "Telomeres, ROS, and \"aging\"".to_string(),
            abstract_text: String::new(),
            year: None,
            authors: vec![],
            journal: String::new(),
        };
        let theories: BTreeSet<String> = ["Free Radical Theory", "Telomere Shortening"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let answers: Vec<String> = (1..=9).map(|i| format!("a{}", i)).collect();
        tables.merge(&paper, &theories, &answers);

        let mut classification = Classification::related(theories);
        classification.evidence.insert(
            "Telomere Shortening".to_string(),
            TheoryEvidence {
                confidence: Some(0.8),
                snippets: vec!["telomeres, shortened".to_string()],
            },
        );
        tables.record_details(
            &paper,
            &classification,
            &TextProvenance {
                full_text_source: None,
                processing_seconds: 2.5,
            },
        );
        tables
    }

    #[test]
    fn test_export_writes_three_tables() {
        let dir = TempDir::new().unwrap();
        let paths = export_tables(&sample_tables(), dir.path()).unwrap();

        let theories = read_records(&paths.theories);
        assert_eq!(
            theories,
            vec![
                vec!["theory_id", "theory_name", "number_of_collected_papers"],
                vec!["T001", "Free Radical Theory", "1"],
                vec!["T002", "Telomere Shortening", "1"],
            ]
        );

        let papers = read_records(&paths.papers);
        assert_eq!(papers.len(), 3);
        assert_eq!(papers[0], vec!["theory_id", "paper_url", "paper_name", "paper_year"]);
        assert_eq!(papers[1][2], "Telomeres, ROS, and \"aging\"");
        assert_eq!(papers[1][3], "");

        let annotations = read_records(&paths.annotations);
        assert_eq!(annotations[0].len(), 13);
        assert_eq!(annotations[0][4], "Q1");
        assert_eq!(annotations[0][12], "Q9");
        assert_eq!(annotations[2][0], "T002");
        assert_eq!(annotations[2][12], "a9");
    }

    #[test]
    fn test_export_writes_supplementary_tables() {
        let dir = TempDir::new().unwrap();
        let paths = export_tables(&sample_tables(), dir.path()).unwrap();

        assert_eq!(
            paths.paper_metadata,
            dir.path().join("supplementary").join("paper_metadata.csv")
        );
        let metadata = read_records(&paths.paper_metadata);
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[0], PAPER_METADATA_HEADER.to_vec());
        assert_eq!(
            metadata[1],
            vec![
                "https://pubmed.ncbi.nlm.nih.gov/1/",
                "1",
                "Telomeres, ROS, and \"aging\"",
                "",
                "",
                "",
                "false",
                "N/A",
                "2.50",
            ]
        );

        let tags = read_records(&paths.theory_tags);
        assert_eq!(tags[0], THEORY_TAG_HEADER.to_vec());
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[1][1..4].to_vec(), vec!["T001", "Free Radical Theory", ""]);
        assert_eq!(
            tags[2][1..].to_vec(),
            vec!["T002", "Telomere Shortening", "0.800", "telomeres, shortened", "abstract"]
        );
    }

    #[test]
    fn test_quoting_and_no_trailing_blank_rows() {
        let dir = TempDir::new().unwrap();
        let paths = export_tables(&sample_tables(), dir.path()).unwrap();

        let content = std::fs::read_to_string(&paths.papers).unwrap();
        assert!(content.contains("\"Telomeres, ROS, and \"\"aging\"\"\""));
        assert_eq!(content.lines().count(), 3);
        assert!(content.lines().all(|l| !l.trim().is_empty()));
    }

    #[test]
    fn test_empty_tables_still_have_headers() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("out");
        let paths = export_tables(&CurationTables::new(), &out).unwrap();

        assert_eq!(read_records(&paths.theories).len(), 1);
        assert_eq!(read_records(&paths.papers).len(), 1);
        assert_eq!(read_records(&paths.annotations), vec![annotation_header()]);
        assert_eq!(read_records(&paths.paper_metadata).len(), 1);
        assert_eq!(read_records(&paths.theory_tags).len(), 1);
    }
}
