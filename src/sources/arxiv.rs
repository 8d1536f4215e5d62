//! arXiv client (export API, Atom feeds).
//!
//! arXiv exposes no full text through the API, so papers are always
//! annotated from their abstract.

use super::{get_text, parse_xml, parse_year, xml_text, LiteratureSource};
use crate::error::SourceError;
use crate::models::PaperMetadata;
use async_trait::async_trait;

const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";
const NAME: &str = "arxiv";

pub struct ArxivSource {
    client: reqwest::Client,
    base_url: String,
}

impl ArxivSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: ARXIV_API_URL.to_string(),
        }
    }
}

#[async_trait]
impl LiteratureSource for ArxivSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SourceError> {
        let search_query = build_search_query(query);
        let max_results = max_results.to_string();
        let request = self.client.get(&self.base_url).query(&[
            ("search_query", search_query.as_str()),
            ("start", "0"),
            ("max_results", max_results.as_str()),
            ("sortBy", "relevance"),
            ("sortOrder", "descending"),
        ]);

        let body = get_text(NAME, request).await?;
        let entries = parse_feed(&body)?;
        Ok(entries.into_iter().map(|paper| paper.source_id).collect())
    }

    async fn fetch_metadata(&self, id: &str) -> Result<Option<PaperMetadata>, SourceError> {
        let request = self
            .client
            .get(&self.base_url)
            .query(&[("id_list", id), ("max_results", "1")]);

        let body = get_text(NAME, request).await?;
        Ok(parse_feed(&body)?.into_iter().next())
    }
}

/// Restrict a free-text query to quantitative biology.
fn build_search_query(query: &str) -> String {
    format!("all:({}) AND cat:q-bio*", query.trim())
}

/// Strip the abs URL prefix and version suffix from an Atom entry id.
fn arxiv_id(entry_id: &str) -> String {
    let id = entry_id.rsplit("/abs/").next().unwrap_or(entry_id).trim();
    if let Some((base, version)) = id.rsplit_once('v') {
        if !base.is_empty() && !version.is_empty() && version.chars().all(|c| c.is_ascii_digit()) {
            return base.to_string();
        }
    }
    id.to_string()
}

/// Parse every entry of an Atom feed.
fn parse_feed(body: &str) -> Result<Vec<PaperMetadata>, SourceError> {
    let doc = parse_xml(NAME, body)?;

    let papers = doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("entry"))
        .filter_map(|entry| {
            let child = |tag: &str| entry.children().find(|n| n.has_tag_name(tag));

            let id = arxiv_id(&xml_text(child("id")?));
            // Error feeds carry an entry whose id points at the api itself.
            if id.is_empty() || id.starts_with("http") {
                return None;
            }

            let authors = entry
                .children()
                .filter(|n| n.has_tag_name("author"))
                .filter_map(|a| a.children().find(|n| n.has_tag_name("name")))
                .map(xml_text)
                .collect();

            Some(PaperMetadata {
                url: format!("https://arxiv.org/abs/{}", id),
                source_id: id,
                title: child("title").map(xml_text).unwrap_or_default(),
                abstract_text: child("summary").map(xml_text).unwrap_or_default(),
                year: child("published")
                    .and_then(|n| n.text())
                    .and_then(parse_year),
                authors,
                journal: "arXiv".to_string(),
            })
        })
        .collect();

    Ok(papers)
}
