//! Data models for the literature curator.
//!
//! This module contains the core data structures shared by the sources,
//! the annotator, the aggregator and the exporters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Marker recorded for a question the extractor did not answer.
pub const UNKNOWN_ANSWER: &str = "Unknown";

/// Number of questions every annotation row carries (Q1..Q9).
pub const QUESTION_COUNT: usize = 9;

/// Stable sequential theory identifier (`T001`, `T002`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TheoryId(pub u32);

impl fmt::Display for TheoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{:03}", self.0)
    }
}

/// Metadata for one paper as returned by a literature source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
    /// Identifier in the source database (PMID, arXiv id, DOI, ...).
    pub source_id: String,
    /// Canonical URL, used as the paper's unique key.
    pub url: String,
    /// Paper title.
    pub title: String,
    /// Abstract text (may be empty).
    pub abstract_text: String,
    /// Publication year, if known.
    pub year: Option<i32>,
    /// Author names in source order.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Journal or server name.
    #[serde(default)]
    pub journal: String,
}

impl PaperMetadata {
    /// Title, journal, authors and abstract in the labelled form handed to
    /// the annotator. Empty when the paper has neither title nor abstract.
    pub fn abstract_document(&self) -> String {
        let title = self.title.trim();
        let abstract_text = self.abstract_text.trim();
        if title.is_empty() && abstract_text.is_empty() {
            return String::new();
        }

        let mut doc = format!("Title: {}\n", title);
        if !self.journal.is_empty() {
            doc.push_str(&format!("Journal: {}\n", self.journal));
        }
        if !self.authors.is_empty() {
            let shown: Vec<&str> = self.authors.iter().take(5).map(String::as_str).collect();
            let etal = if self.authors.len() > shown.len() { ", et al." } else { "" };
            doc.push_str(&format!("Authors: {}{}\n", shown.join(", "), etal));
        }
        if !abstract_text.is_empty() {
            doc.push_str(&format!("\nAbstract: {}", abstract_text));
        }
        doc.trim_end().to_string()
    }

    /// Year formatted for a CSV cell (empty when unknown).
    pub fn year_cell(&self) -> String {
        self.year.map(|y| y.to_string()).unwrap_or_default()
    }
}

/// Support the model gave for one theory assignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TheoryEvidence {
    /// Self-reported confidence in `0.0..=1.0`.
    pub confidence: Option<f64>,
    /// Short quotes from the paper.
    pub snippets: Vec<String>,
}

/// Result of classifying one paper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Whether the paper is about aging at all.
    pub aging_related: bool,
    /// Theory names from the taxonomy the paper belongs to.
    pub theories: BTreeSet<String>,
    /// Evidence keyed by theory name, for the theories that came with any.
    pub evidence: BTreeMap<String, TheoryEvidence>,
}

impl Classification {
    /// A classification that drops the paper.
    pub fn unrelated() -> Self {
        Self::default()
    }

    /// An aging-related classification with the given theories.
    pub fn related<I, S>(theories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            aging_related: true,
            theories: theories.into_iter().map(Into::into).collect(),
            evidence: BTreeMap::new(),
        }
    }

    /// True when the paper should continue to extraction.
    pub fn passes(&self) -> bool {
        self.aging_related && !self.theories.is_empty()
    }
}

/// One of the fixed curation questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Column label (`Q1`..`Q9`).
    pub id: String,
    /// Question text shown to the model.
    pub text: String,
    /// Allowed answers; empty means free text.
    #[serde(default)]
    pub choices: Vec<String>,
}

impl Question {
    pub fn new(id: &str, text: &str, choices: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            choices: choices.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Map a raw answer onto this question's choices.
    ///
    /// Free-text questions keep the trimmed answer. Constrained questions
    /// return the canonical spelling of a case-insensitive match, or the
    /// unknown marker.
    pub fn canonical_answer(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return UNKNOWN_ANSWER.to_string();
        }
        if self.choices.is_empty() {
            return trimmed.to_string();
        }
        self.choices
            .iter()
            .find(|c| c.eq_ignore_ascii_case(trimmed))
            .cloned()
            .unwrap_or_else(|| UNKNOWN_ANSWER.to_string())
    }
}

/// One row of `table1_theories.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TheoryRow {
    pub theory_id: String,
    pub theory_name: String,
    pub number_of_collected_papers: usize,
}

/// One row of `table2_papers.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaperRow {
    pub theory_id: String,
    pub paper_url: String,
    pub paper_name: String,
    pub paper_year: String,
}

/// One row of `table3_annotations.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRow {
    pub theory_id: String,
    pub paper_url: String,
    pub paper_name: String,
    pub paper_year: String,
    pub answers: [String; QUESTION_COUNT],
}

impl AnnotationRow {
    /// Cells in column order, for the CSV writer.
    pub fn record(&self) -> Vec<&str> {
        let mut cells = vec![
            self.theory_id.as_str(),
            self.paper_url.as_str(),
            self.paper_name.as_str(),
            self.paper_year.as_str(),
        ];
        cells.extend(self.answers.iter().map(String::as_str));
        cells
    }
}

/// How the text handed to the annotator was obtained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextProvenance {
    /// Source that supplied full text; `None` means title and abstract.
    pub full_text_source: Option<String>,
    /// Wall-clock time spent on the paper.
    pub processing_seconds: f64,
}

impl TextProvenance {
    pub fn text_basis(&self) -> &'static str {
        if self.full_text_source.is_some() {
            "full_text"
        } else {
            "abstract"
        }
    }
}

/// One row of `supplementary/paper_metadata.csv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperDetailRow {
    pub paper_url: String,
    pub source_id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// First five authors, `; `-separated.
    pub authors: String,
    pub journal: String,
    pub has_full_text: bool,
    /// Source name, or `N/A`.
    pub full_text_source: String,
    pub processing_seconds: String,
}

/// One row of `supplementary/theory_tags_detailed.csv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TheoryTagRow {
    pub paper_url: String,
    pub theory_id: String,
    pub theory_name: String,
    /// Three decimals, empty when the model gave none.
    pub confidence: String,
    /// Up to two quotes, ` | `-separated.
    pub evidence_snippets: String,
    pub text_basis: String,
}

/// Yield of a single query within an iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryYield {
    pub query: String,
    /// Identifiers returned by the source.
    pub candidates: usize,
    /// Identifiers already processed earlier in the run.
    pub duplicates: usize,
    /// Papers newly added to the paper table.
    pub new_papers: usize,
    /// Papers dropped as unrelated (or failed classification).
    pub rejected: usize,
    /// Papers skipped because a source call failed.
    pub failed: usize,
    /// Whether the search call itself failed.
    pub search_failed: bool,
}

/// Summary of one loop iteration, fed back to the planner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IterationSummary {
    /// 1-based iteration number.
    pub iteration: usize,
    pub queries: Vec<QueryYield>,
}

impl IterationSummary {
    pub fn new_papers(&self) -> usize {
        self.queries.iter().map(|q| q.new_papers).sum()
    }

    pub fn candidates(&self) -> usize {
        self.queries.iter().map(|q| q.candidates).sum()
    }

    pub fn duplicates(&self) -> usize {
        self.queries.iter().map(|q| q.duplicates).sum()
    }
}

/// Counters accumulated over a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub iterations: usize,
    pub queries_issued: usize,
    pub candidates_seen: usize,
    pub papers_accepted: usize,
    pub papers_rejected: usize,
    pub papers_failed: usize,
    pub full_texts: usize,
    pub degraded_extractions: usize,
}

/// Metadata about a finished curation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub source: String,
    pub model_used: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub stop_reason: String,
}
