//! Query planning and loop termination.
//!
//! The planner hands out batches of queries (configured seeds first, then
//! one expansion per taxonomy theory) and watches the yield of each
//! iteration. It stops the loop on the iteration limit, after
//! `stall_threshold` consecutive iterations without a new paper, or when
//! it has nothing left to ask.

use crate::config::PlannerConfig;
use crate::models::IterationSummary;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use tracing::{debug, info};

/// Why the planner ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    IterationLimit(usize),
    Stalled(usize),
    QueriesExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::IterationLimit(n) => write!(f, "iteration limit reached ({})", n),
            StopReason::Stalled(n) => {
                write!(f, "no new papers for {} consecutive iterations", n)
            }
            StopReason::QueriesExhausted => write!(f, "no unissued queries left"),
        }
    }
}

/// What the loop should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerDecision {
    Queries(Vec<String>),
    Exhausted(StopReason),
}

#[derive(Debug)]
pub struct QueryPlanner {
    pending: VecDeque<String>,
    issued: Vec<String>,
    issued_keys: HashSet<String>,
    history: Vec<IterationSummary>,
    consecutive_stalls: usize,
    max_iterations: usize,
    stall_threshold: usize,
    batch_size: usize,
}

impl QueryPlanner {
    pub fn new(config: &PlannerConfig, theories: &[String]) -> Self {
        let mut pending: VecDeque<String> = config
            .seed_queries
            .iter()
            .map(|q| q.trim().to_string())
            .collect();

        for theory in theories {
            let theory = theory.trim();
            if theory.is_empty() {
                continue;
            }
            for template in &config.expansion_templates {
                pending.push_back(template.replace("{theory}", theory));
            }
        }

        Self {
            pending,
            issued: Vec::new(),
            issued_keys: HashSet::new(),
            history: Vec::new(),
            consecutive_stalls: 0,
            max_iterations: config.max_iterations,
            stall_threshold: config.stall_threshold,
            batch_size: config.batch_size.max(1),
        }
    }

    /// Propose the next batch, or signal termination.
    pub fn next_batch(&mut self) -> PlannerDecision {
        if self.consecutive_stalls >= self.stall_threshold {
            return PlannerDecision::Exhausted(StopReason::Stalled(self.consecutive_stalls));
        }
        if self.history.len() >= self.max_iterations {
            return PlannerDecision::Exhausted(StopReason::IterationLimit(self.max_iterations));
        }

        let mut batch = Vec::new();
        while batch.len() < self.batch_size {
            let Some(query) = self.pending.pop_front() else {
                break;
            };
            if query.is_empty() || !self.issued_keys.insert(query.to_lowercase()) {
                debug!("Skipping already issued query {:?}", query);
                continue;
            }
            self.issued.push(query.clone());
            batch.push(query);
        }

        if batch.is_empty() {
            PlannerDecision::Exhausted(StopReason::QueriesExhausted)
        } else {
            PlannerDecision::Queries(batch)
        }
    }

    /// Feed back the yield of the iteration just run.
    pub fn record(&mut self, summary: IterationSummary) {
        if summary.new_papers() == 0 {
            self.consecutive_stalls += 1;
            info!(
                "Iteration {} found no new papers ({}/{} before stopping)",
                summary.iteration, self.consecutive_stalls, self.stall_threshold
            );
        } else {
            self.consecutive_stalls = 0;
        }
        self.history.push(summary);
    }

    pub fn issued_queries(&self) -> &[String] {
        &self.issued
    }

    pub fn history(&self) -> &[IterationSummary] {
        &self.history
    }

    /// Number of iterations recorded so far.
    pub fn iterations(&self) -> usize {
        self.history.len()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}
