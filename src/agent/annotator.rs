//! Paper classification and question answering.
//!
//! [`PaperAnnotator`] is the seam between the curation loop and the
//! language model. [`LlmAnnotator`] is the production implementation;
//! tests substitute scripted fakes.

use crate::agent::chat::ChatClient;
use crate::agent::response::{parse_answers, parse_classification};
use crate::analysis::aggregator::{normalize_theory_key, normalize_theory_name};
use crate::error::LlmError;
use crate::models::{Classification, Question};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Classifier and extractor for one paper's text.
#[async_trait]
pub trait PaperAnnotator: Send + Sync {
    /// Name of the model behind the annotations, for the run summary.
    fn model_name(&self) -> &str;

    /// Decide whether the text is about aging and which theories it
    /// belongs to.
    async fn classify(&self, text: &str) -> Result<Classification, LlmError>;

    /// Answer each question, positionally aligned with `questions`.
    async fn extract(&self, text: &str, questions: &[Question]) -> Result<Vec<String>, LlmError>;
}

/// The fixed theory taxonomy, resolvable by normalized name.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    names: Vec<String>,
    by_key: HashMap<String, usize>,
}

impl Taxonomy {
    pub fn new(theories: &[String]) -> Self {
        let mut taxonomy = Self::default();
        for theory in theories {
            let name = normalize_theory_name(theory);
            let key = normalize_theory_key(&name);
            if key.is_empty() || taxonomy.by_key.contains_key(&key) {
                continue;
            }
            taxonomy.by_key.insert(key, taxonomy.names.len());
            taxonomy.names.push(name);
        }
        taxonomy
    }

    /// Canonical spelling of `name`, if it is in the taxonomy.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.by_key
            .get(&normalize_theory_key(name))
            .map(|&i| self.names[i].as_str())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Annotator backed by a chat model.
pub struct LlmAnnotator {
    client: ChatClient,
    taxonomy: Taxonomy,
    max_text_chars: usize,
}

impl LlmAnnotator {
    pub fn new(client: ChatClient, taxonomy: Taxonomy, max_text_chars: usize) -> Self {
        Self {
            client,
            taxonomy,
            max_text_chars,
        }
    }

    fn classification_prompt(&self, text: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str("Classify the following paper.\n\n");
        prompt.push_str("Known theories of aging:\n");
        for name in self.taxonomy.names() {
            prompt.push_str(&format!("- {}\n", name));
        }
        prompt.push_str("\nReply with a single JSON object of the form:\n");
        prompt.push_str(
            r#"{"aging_related": true, "theories": [{"theory_name": "Theory name", "confidence": 0.9, "evidence_snippets": ["short quote", "short quote"]}]}"#,
        );
        prompt.push_str("\n\nUse theory names exactly as listed. ");
        prompt.push_str("Confidence is between 0.0 and 1.0; give 2-3 quotes from the paper as evidence. ");
        prompt.push_str("If the paper is not about aging, reply {\"aging_related\": false, \"theories\": []}.\n\n");
        prompt.push_str("=== PAPER ===\n");
        prompt.push_str(truncate_chars(text, self.max_text_chars));
        prompt.push_str("\n=== END OF PAPER ===\n");
        prompt
    }

    fn extraction_prompt(&self, text: &str, questions: &[Question]) -> String {
        let mut prompt = String::new();
        prompt.push_str("Answer the following questions about the paper below.\n\n");
        for q in questions {
            prompt.push_str(&format!("{}: {}\n", q.id, q.text));
            if !q.choices.is_empty() {
                prompt.push_str(&format!("   Allowed answers: {}\n", q.choices.join(" | ")));
            }
        }
        prompt.push_str("\nReply with a single JSON object keyed by question id, e.g. ");
        prompt.push_str(r#"{"Q1": "No", "Q2": "Yes", ...}"#);
        prompt.push_str(".\nUse only the allowed answers. ");
        prompt.push_str("If the paper does not address a question, answer \"No\".\n\n");
        prompt.push_str("=== PAPER ===\n");
        prompt.push_str(truncate_chars(text, self.max_text_chars));
        prompt.push_str("\n=== END OF PAPER ===\n");
        prompt
    }
}

#[async_trait]
impl PaperAnnotator for LlmAnnotator {
    fn model_name(&self) -> &str {
        self.client.model_name()
    }

    async fn classify(&self, text: &str) -> Result<Classification, LlmError> {
        let reply = self
            .client
            .complete(CLASSIFIER_SYSTEM_PROMPT, &self.classification_prompt(text))
            .await?;
        debug!("Classifier reply: {}", reply);
        parse_classification(&reply, &self.taxonomy)
    }

    async fn extract(&self, text: &str, questions: &[Question]) -> Result<Vec<String>, LlmError> {
        let reply = self
            .client
            .complete(EXTRACTOR_SYSTEM_PROMPT, &self.extraction_prompt(text, questions))
            .await?;
        debug!("Extractor reply: {}", reply);
        parse_answers(&reply, questions)
    }
}

/// Longest prefix of `text` with at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are an expert in the biology of aging.
You decide whether a scientific paper is about aging and which theories of aging it supports or discusses.
Only output valid JSON, no explanations or markdown."#;

const EXTRACTOR_SYSTEM_PROMPT: &str = r#"You are an expert in the biology of aging curating a literature database.
You answer fixed questions about a scientific paper using only what the paper states.
Only output valid JSON, no explanations or markdown."#;
