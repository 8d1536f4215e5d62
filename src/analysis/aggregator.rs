//! Merging of per-paper results into the three curation tables.
//!
//! `CurationTables` owns the theory, paper and annotation tables for one
//! run. Merges are idempotent: a (theory, paper) pair is inserted at most
//! once and the first answers seen for it win.

use crate::models::{
    AnnotationRow, Classification, PaperDetailRow, PaperMetadata, PaperRow, TextProvenance,
    TheoryId, TheoryRow, TheoryTagRow, QUESTION_COUNT, UNKNOWN_ANSWER,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Display form of a theory name: trimmed, internal whitespace collapsed.
pub fn normalize_theory_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Dedup key for a theory name. Two names are the same theory iff their
/// keys are equal.
pub fn normalize_theory_key(name: &str) -> String {
    normalize_theory_name(name).to_lowercase()
}

#[derive(Debug, Clone)]
struct Theory {
    id: TheoryId,
    name: String,
    paper_count: usize,
}

#[derive(Debug, Clone)]
struct Paper {
    url: String,
    name: String,
    year: String,
}

#[derive(Debug, Clone)]
struct Annotation {
    theory: TheoryId,
    paper_url: String,
    answers: [String; QUESTION_COUNT],
}

/// What a single merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// (theory, paper) pairs inserted.
    pub new_pairs: usize,
    /// Pairs that already existed and were ignored.
    pub duplicate_pairs: usize,
    /// Theories created by this merge, in creation order.
    pub new_theories: Vec<TheoryId>,
    /// Whether the paper was added to the paper table.
    pub paper_is_new: bool,
}

/// Violation found by [`CurationTables::check_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    #[error("{table} row references unknown theory {theory_id}")]
    UnknownTheory {
        theory_id: String,
        table: &'static str,
    },

    #[error("annotation references unknown paper {paper_url}")]
    UnknownPaper { paper_url: String },

    #[error("{theory_id} records {recorded} papers but has {actual}")]
    CountMismatch {
        theory_id: String,
        recorded: usize,
        actual: usize,
    },

    #[error("{theory_id} has no papers")]
    EmptyTheory { theory_id: String },
}

/// The aggregation state for one run.
#[derive(Debug, Clone, Default)]
pub struct CurationTables {
    theories: Vec<Theory>,
    theory_index: HashMap<String, usize>,
    papers: Vec<Paper>,
    paper_index: HashMap<String, usize>,
    annotations: Vec<Annotation>,
    pairs: HashSet<(TheoryId, String)>,
    details: Vec<PaperDetailRow>,
    detailed: HashSet<String>,
    tags: Vec<TheoryTagRow>,
}

impl CurationTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one classified and annotated paper.
    ///
    /// Empty theory names are ignored. A paper whose theory set is empty
    /// after normalization leaves the tables untouched.
    pub fn merge(
        &mut self,
        paper: &PaperMetadata,
        theories: &BTreeSet<String>,
        answers: &[String],
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        let names: Vec<String> = theories
            .iter()
            .map(|t| normalize_theory_name(t))
            .filter(|t| !t.is_empty())
            .collect();
        if names.is_empty() {
            debug!("No usable theory names for {}", paper.url);
            return outcome;
        }

        if !self.paper_index.contains_key(&paper.url) {
            self.paper_index.insert(paper.url.clone(), self.papers.len());
            self.papers.push(Paper {
                url: paper.url.clone(),
                name: paper.title.clone(),
                year: paper.year_cell(),
            });
            outcome.paper_is_new = true;
        }

        let answers = answer_array(answers);

        for name in names {
            let idx = self.resolve_or_create(&name, &mut outcome);
            let theory_id = self.theories[idx].id;

            if !self.pairs.insert((theory_id, paper.url.clone())) {
                outcome.duplicate_pairs += 1;
                continue;
            }

            self.theories[idx].paper_count += 1;
            self.annotations.push(Annotation {
                theory: theory_id,
                paper_url: paper.url.clone(),
                answers: answers.clone(),
            });
            outcome.new_pairs += 1;
        }

        outcome
    }

    fn resolve_or_create(&mut self, name: &str, outcome: &mut MergeOutcome) -> usize {
        let key = normalize_theory_key(name);
        if let Some(&idx) = self.theory_index.get(&key) {
            return idx;
        }

        let id = TheoryId(self.theories.len() as u32 + 1);
        self.theories.push(Theory {
            id,
            name: name.to_string(),
            paper_count: 0,
        });
        let idx = self.theories.len() - 1;
        self.theory_index.insert(key, idx);
        outcome.new_theories.push(id);
        debug!("New theory {} = {:?}", id, name);
        idx
    }

    /// Record the supplementary detail of a merged paper: one metadata row
    /// and one tag row per theory it was merged under. Only the first call
    /// per paper counts; papers not in the tables are ignored.
    pub fn record_details(
        &mut self,
        paper: &PaperMetadata,
        classification: &Classification,
        provenance: &TextProvenance,
    ) {
        if !self.contains_paper(&paper.url) || !self.detailed.insert(paper.url.clone()) {
            return;
        }

        self.details.push(PaperDetailRow {
            paper_url: paper.url.clone(),
            source_id: paper.source_id.clone(),
            title: paper.title.clone(),
            abstract_text: paper.abstract_text.clone(),
            authors: paper
                .authors
                .iter()
                .take(5)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("; "),
            journal: paper.journal.clone(),
            has_full_text: provenance.full_text_source.is_some(),
            full_text_source: provenance
                .full_text_source
                .clone()
                .unwrap_or_else(|| "N/A".to_string()),
            processing_seconds: format!("{:.2}", provenance.processing_seconds),
        });

        for name in &classification.theories {
            let Some(&idx) = self.theory_index.get(&normalize_theory_key(name)) else {
                continue;
            };
            let theory = &self.theories[idx];
            if !self.pairs.contains(&(theory.id, paper.url.clone())) {
                continue;
            }

            let evidence = classification.evidence.get(name);
            self.tags.push(TheoryTagRow {
                paper_url: paper.url.clone(),
                theory_id: theory.id.to_string(),
                theory_name: theory.name.clone(),
                confidence: evidence
                    .and_then(|e| e.confidence)
                    .map(|c| format!("{:.3}", c))
                    .unwrap_or_default(),
                evidence_snippets: evidence
                    .map(|e| {
                        e.snippets
                            .iter()
                            .take(2)
                            .map(String::as_str)
                            .collect::<Vec<_>>()
                            .join(" | ")
                    })
                    .unwrap_or_default(),
                text_basis: provenance.text_basis().to_string(),
            });
        }
    }

    pub fn theory_count(&self) -> usize {
        self.theories.len()
    }

    pub fn paper_count(&self) -> usize {
        self.papers.len()
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    pub fn contains_paper(&self, url: &str) -> bool {
        self.paper_index.contains_key(url)
    }

    /// Rows of `table1_theories.csv`, in id order.
    pub fn theory_rows(&self) -> Vec<TheoryRow> {
        self.theories
            .iter()
            .map(|t| TheoryRow {
                theory_id: t.id.to_string(),
                theory_name: t.name.clone(),
                number_of_collected_papers: t.paper_count,
            })
            .collect()
    }

    /// Rows of `table2_papers.csv`, one per (theory, paper) pair in
    /// insertion order.
    pub fn paper_rows(&self) -> Vec<PaperRow> {
        self.annotations
            .iter()
            .filter_map(|a| {
                let paper = self.paper(&a.paper_url)?;
                Some(PaperRow {
                    theory_id: a.theory.to_string(),
                    paper_url: paper.url.clone(),
                    paper_name: paper.name.clone(),
                    paper_year: paper.year.clone(),
                })
            })
            .collect()
    }

    /// Rows of `table3_annotations.csv`.
    pub fn annotation_rows(&self) -> Vec<AnnotationRow> {
        self.annotations
            .iter()
            .filter_map(|a| {
                let paper = self.paper(&a.paper_url)?;
                Some(AnnotationRow {
                    theory_id: a.theory.to_string(),
                    paper_url: paper.url.clone(),
                    paper_name: paper.name.clone(),
                    paper_year: paper.year.clone(),
                    answers: a.answers.clone(),
                })
            })
            .collect()
    }

    /// Rows of `supplementary/paper_metadata.csv`, one per detailed paper.
    pub fn paper_detail_rows(&self) -> &[PaperDetailRow] {
        &self.details
    }

    /// Rows of `supplementary/theory_tags_detailed.csv`.
    pub fn theory_tag_rows(&self) -> &[TheoryTagRow] {
        &self.tags
    }

    #[cfg(test)]
    pub(crate) fn overwrite_paper_count(&mut self, theory: TheoryId, count: usize) {
        if let Some(t) = self.theories.iter_mut().find(|t| t.id == theory) {
            t.paper_count = count;
        }
    }

    fn paper(&self, url: &str) -> Option<&Paper> {
        self.paper_index.get(url).map(|&i| &self.papers[i])
    }

    /// Theories sorted by paper count (highest first), ties by id.
    pub fn theory_distribution(&self) -> Vec<(String, usize)> {
        let mut dist: Vec<(TheoryId, String, usize)> = self
            .theories
            .iter()
            .map(|t| (t.id, t.name.clone(), t.paper_count))
            .collect();
        dist.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        dist.into_iter().map(|(_, name, count)| (name, count)).collect()
    }

    /// Verify the cross-table invariants on the exported row views.
    pub fn check_integrity(&self) -> Vec<IntegrityViolation> {
        let theory_rows = self.theory_rows();
        let paper_rows = self.paper_rows();
        let annotation_rows = self.annotation_rows();

        let known_theories: HashSet<&str> =
            theory_rows.iter().map(|t| t.theory_id.as_str()).collect();
        let known_papers: HashSet<&str> =
            paper_rows.iter().map(|p| p.paper_url.as_str()).collect();

        let mut violations = Vec::new();

        for row in &paper_rows {
            if !known_theories.contains(row.theory_id.as_str()) {
                violations.push(IntegrityViolation::UnknownTheory {
                    theory_id: row.theory_id.clone(),
                    table: "papers",
                });
            }
        }

        for row in &annotation_rows {
            if !known_theories.contains(row.theory_id.as_str()) {
                violations.push(IntegrityViolation::UnknownTheory {
                    theory_id: row.theory_id.clone(),
                    table: "annotations",
                });
            }
            if !known_papers.contains(row.paper_url.as_str()) {
                violations.push(IntegrityViolation::UnknownPaper {
                    paper_url: row.paper_url.clone(),
                });
            }
        }

        for theory in &theory_rows {
            let actual = paper_rows
                .iter()
                .filter(|p| p.theory_id == theory.theory_id)
                .map(|p| p.paper_url.as_str())
                .collect::<HashSet<_>>()
                .len();
            if actual != theory.number_of_collected_papers {
                violations.push(IntegrityViolation::CountMismatch {
                    theory_id: theory.theory_id.clone(),
                    recorded: theory.number_of_collected_papers,
                    actual,
                });
            }
            if theory.number_of_collected_papers == 0 {
                violations.push(IntegrityViolation::EmptyTheory {
                    theory_id: theory.theory_id.clone(),
                });
            }
        }

        violations
    }
}

/// Pad or truncate answers to exactly one per question.
fn answer_array(answers: &[String]) -> [String; QUESTION_COUNT] {
    std::array::from_fn(|i| {
        answers
            .get(i)
            .filter(|a| !a.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| UNKNOWN_ANSWER.to_string())
    })
}
