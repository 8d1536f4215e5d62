//! Deterministic in-memory source and annotator for loop and pipeline tests.

use crate::agent::annotator::PaperAnnotator;
use crate::error::{LlmError, SourceError};
use crate::models::{Classification, PaperMetadata, Question};
use crate::sources::LiteratureSource;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// In-memory source: query -> ids, id -> metadata.
#[derive(Default)]
pub(crate) struct FakeSource {
    pub(crate) results: HashMap<String, Vec<String>>,
    pub(crate) papers: HashMap<String, PaperMetadata>,
    pub(crate) full_texts: HashMap<String, String>,
    pub(crate) broken_ids: HashSet<String>,
    pub(crate) fetches: Mutex<Vec<String>>,
}

impl FakeSource {
    pub(crate) fn with_query(mut self, query: &str, ids: &[&str]) -> Self {
        self.results
            .insert(query.to_string(), ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub(crate) fn with_paper(mut self, id: &str, title: &str, abstract_text: &str) -> Self {
        self.papers.insert(
            id.to_string(),
            PaperMetadata {
                source_id: id.to_string(),
                url: format!("https://example.org/{}", id),
                title: title.to_string(),
                abstract_text: abstract_text.to_string(),
                year: Some(2020),
                authors: vec![],
                journal: String::new(),
            },
        );
        self
    }

    pub(crate) fn fetch_count(&self, id: &str) -> usize {
        self.fetches.lock().unwrap().iter().filter(|f| *f == id).count()
    }
}

#[async_trait]
impl LiteratureSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SourceError> {
        if query == "broken" {
            return Err(SourceError::Status {
                source_name: "fake",
                status: 503,
            });
        }
        let mut ids = self.results.get(query).cloned().unwrap_or_default();
        ids.truncate(max_results);
        Ok(ids)
    }

    async fn fetch_metadata(&self, id: &str) -> Result<Option<PaperMetadata>, SourceError> {
        self.fetches.lock().unwrap().push(id.to_string());
        if self.broken_ids.contains(id) {
            return Err(SourceError::parse("fake", "bad xml"));
        }
        Ok(self.papers.get(id).cloned())
    }

    async fn fetch_full_text(&self, paper: &PaperMetadata) -> Result<Option<String>, SourceError> {
        Ok(self.full_texts.get(&paper.source_id).cloned())
    }
}

/// Classifies by keyword in the text; answers "Yes" to everything.
pub(crate) struct FakeAnnotator {
    pub(crate) fail_extraction: bool,
    pub(crate) classified: Mutex<Vec<String>>,
}

impl FakeAnnotator {
    pub(crate) fn new() -> Self {
        Self {
            fail_extraction: false,
            classified: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PaperAnnotator for FakeAnnotator {
    fn model_name(&self) -> &str {
        "fake-model"
    }

    async fn classify(&self, text: &str) -> Result<Classification, LlmError> {
        self.classified.lock().unwrap().push(text.to_string());
        if text.contains("garbage") {
            return Err(LlmError::Malformed("not json".to_string()));
        }
        let mut theories = Vec::new();
        if text.contains("telomere") {
            theories.push("Telomere Shortening");
        }
        if text.contains("oxidative") {
            theories.push("Free Radical Theory");
        }
        if text.contains("aging") {
            Ok(Classification::related(theories))
        } else {
            Ok(Classification::unrelated())
        }
    }

    async fn extract(&self, _text: &str, questions: &[Question]) -> Result<Vec<String>, LlmError> {
        if self.fail_extraction {
            return Err(LlmError::Timeout(1));
        }
        Ok(questions.iter().map(|_| "Yes".to_string()).collect())
    }
}
