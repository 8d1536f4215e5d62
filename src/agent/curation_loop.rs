//! The retrieval and annotation loop.
//!
//! One query at a time, one paper at a time: search, fetch metadata,
//! classify, extract, merge. Per-paper failures are logged and skipped;
//! only the planner ends the run.

use crate::agent::annotator::PaperAnnotator;
use crate::agent::planner::{PlannerDecision, QueryPlanner, StopReason};
use crate::analysis::CurationTables;
use crate::models::{
    Classification, IterationSummary, PaperMetadata, Question, QueryYield, RunStats,
    TextProvenance, QUESTION_COUNT, UNKNOWN_ANSWER,
};
use crate::sources::LiteratureSource;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Knobs for a run, taken from the `[search]` and `[general]` sections.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_results_per_query: usize,
    pub full_text: bool,
    pub request_delay: Duration,
    pub show_progress: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_results_per_query: 50,
            full_text: true,
            request_delay: Duration::ZERO,
            show_progress: false,
        }
    }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct CurationOutcome {
    pub stats: RunStats,
    pub stop_reason: StopReason,
}

/// What happened to a single candidate identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaperOutcome {
    NewPaper,
    Duplicate,
    Rejected,
    Failed,
}

pub struct CurationLoop<'a, S: ?Sized, A: ?Sized> {
    source: &'a S,
    annotator: &'a A,
    questions: &'a [Question],
    settings: LoopSettings,
    seen: HashSet<String>,
    stats: RunStats,
}

impl<'a, S, A> CurationLoop<'a, S, A>
where
    S: LiteratureSource + ?Sized,
    A: PaperAnnotator + ?Sized,
{
    pub fn new(
        source: &'a S,
        annotator: &'a A,
        questions: &'a [Question],
        settings: LoopSettings,
    ) -> Self {
        Self {
            source,
            annotator,
            questions,
            settings,
            seen: HashSet::new(),
            stats: RunStats::default(),
        }
    }

    /// Run until the planner signals exhaustion.
    pub async fn run(
        &mut self,
        planner: &mut QueryPlanner,
        tables: &mut CurationTables,
    ) -> CurationOutcome {
        let stop_reason = loop {
            let queries = match planner.next_batch() {
                PlannerDecision::Queries(queries) => queries,
                PlannerDecision::Exhausted(reason) => break reason,
            };

            let iteration = planner.iterations() + 1;
            info!("Iteration {}: {} quer(y/ies)", iteration, queries.len());

            let mut summary = IterationSummary {
                iteration,
                queries: Vec::with_capacity(queries.len()),
            };
            for query in queries {
                let query_yield = self.run_query(&query, tables).await;
                summary.queries.push(query_yield);
            }

            self.stats.iterations += 1;
            info!(
                "Iteration {} done: {} candidates, {} duplicates, {} new papers (total {})",
                iteration,
                summary.candidates(),
                summary.duplicates(),
                summary.new_papers(),
                tables.paper_count()
            );
            planner.record(summary);
        };

        info!(
            "Stopping after {} queries: {}",
            planner.issued_queries().len(),
            stop_reason
        );
        CurationOutcome {
            stats: self.stats.clone(),
            stop_reason,
        }
    }

    /// Search one query and push every candidate through the pipeline.
    async fn run_query(&mut self, query: &str, tables: &mut CurationTables) -> QueryYield {
        let mut query_yield = QueryYield {
            query: query.to_string(),
            ..Default::default()
        };
        self.stats.queries_issued += 1;

        let ids = match self
            .source
            .search(query, self.settings.max_results_per_query)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Search failed for {:?}: {}", query, e);
                query_yield.search_failed = true;
                return query_yield;
            }
        };

        query_yield.candidates = ids.len();
        self.stats.candidates_seen += ids.len();
        info!("Query {:?} returned {} candidates", query, ids.len());

        let progress = self.progress_bar(ids.len() as u64, query);

        for id in &ids {
            let outcome = self.process_paper(id, tables).await;
            match outcome {
                PaperOutcome::NewPaper => query_yield.new_papers += 1,
                PaperOutcome::Duplicate => query_yield.duplicates += 1,
                PaperOutcome::Rejected => query_yield.rejected += 1,
                PaperOutcome::Failed => query_yield.failed += 1,
            }
            progress.inc(1);

            if outcome != PaperOutcome::Duplicate && !self.settings.request_delay.is_zero() {
                tokio::time::sleep(self.settings.request_delay).await;
            }
        }

        progress.finish_and_clear();
        query_yield
    }

    async fn process_paper(&mut self, id: &str, tables: &mut CurationTables) -> PaperOutcome {
        if self.seen.contains(id) {
            return PaperOutcome::Duplicate;
        }
        let started = Instant::now();

        let paper = match self.source.fetch_metadata(id).await {
            Ok(Some(paper)) => paper,
            Ok(None) => {
                debug!("No record for {}", id);
                self.seen.insert(id.to_string());
                self.stats.papers_failed += 1;
                return PaperOutcome::Failed;
            }
            Err(e) => {
                // Not marked seen: a later query may surface it again.
                warn!("Metadata fetch failed for {}: {}", id, e);
                self.stats.papers_failed += 1;
                return PaperOutcome::Failed;
            }
        };
        self.seen.insert(id.to_string());

        if tables.contains_paper(&paper.url) {
            debug!("{} already collected as {}", id, paper.url);
            return PaperOutcome::Duplicate;
        }

        let (text, full_text_source) = self.paper_text(&paper).await;
        if text.trim().is_empty() {
            debug!("{} has no title or abstract", id);
            self.stats.papers_rejected += 1;
            return PaperOutcome::Rejected;
        }

        let classification = match self.annotator.classify(&text).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Classification failed for {}: {}", paper.url, e);
                Classification::unrelated()
            }
        };
        if !classification.passes() {
            if classification.aging_related {
                info!(
                    "{} is aging-related but matches no taxonomy theory, skipping",
                    paper.url
                );
            } else {
                debug!("{} is not aging-related", paper.url);
            }
            self.stats.papers_rejected += 1;
            return PaperOutcome::Rejected;
        }

        let answers = match self.annotator.extract(&text, self.questions).await {
            Ok(answers) => answers,
            Err(e) => {
                warn!("Extraction failed for {}, recording unknowns: {}", paper.url, e);
                self.stats.degraded_extractions += 1;
                vec![UNKNOWN_ANSWER.to_string(); QUESTION_COUNT]
            }
        };

        let merged = tables.merge(&paper, &classification.theories, &answers);
        debug!(
            "Merged {}: {} new pair(s), {} duplicate(s), {} new theor(y/ies)",
            paper.url,
            merged.new_pairs,
            merged.duplicate_pairs,
            merged.new_theories.len()
        );

        if merged.paper_is_new {
            tables.record_details(
                &paper,
                &classification,
                &TextProvenance {
                    full_text_source,
                    processing_seconds: started.elapsed().as_secs_f64(),
                },
            );
            self.stats.papers_accepted += 1;
            PaperOutcome::NewPaper
        } else {
            PaperOutcome::Duplicate
        }
    }

    /// Full text when enabled and available, else title plus abstract.
    /// The second value names the source that supplied full text.
    async fn paper_text(&mut self, paper: &PaperMetadata) -> (String, Option<String>) {
        if self.settings.full_text {
            match self.source.fetch_full_text(paper).await {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    self.stats.full_texts += 1;
                    return (text, Some(self.source.name().to_string()));
                }
                Ok(_) => debug!("No full text for {}", paper.url),
                Err(e) => debug!("Full text fetch failed for {}: {}", paper.url, e),
            }
        }
        (paper.abstract_document(), None)
    }

    fn progress_bar(&self, len: u64, query: &str) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(query.to_string());
        pb
    }
}
