//! Europe PMC client (REST search API).
//!
//! Identifiers handed to the loop are `SOURCE:ID` pairs (`MED:31234567`,
//! `PMC:PMC6543210`, `PPR:PPR123`) because Europe PMC ids are only unique
//! within their source.

use super::{collapse_whitespace, get_text, parse_year, xml_text, LiteratureSource};
use crate::error::SourceError;
use crate::models::PaperMetadata;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const EPMC_BASE_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";
const NAME: &str = "europepmc";
const PAGE_SIZE: usize = 100;

pub struct EuropePmcSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "nextCursorMark")]
    next_cursor_mark: Option<String>,
    #[serde(rename = "resultList", default)]
    result_list: ResultList,
}

#[derive(Debug, Default, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<EpmcRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpmcRecord {
    id: Option<String>,
    source: Option<String>,
    pmid: Option<String>,
    pmcid: Option<String>,
    doi: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    abstract_text: String,
    pub_year: Option<String>,
    journal_title: Option<String>,
    author_string: Option<String>,
}

impl EpmcRecord {
    fn key(&self) -> Option<String> {
        let id = self.id.as_deref()?;
        Some(format!("{}:{}", self.source.as_deref().unwrap_or("MED"), id))
    }

    fn canonical_url(&self) -> String {
        if let Some(ref pmcid) = self.pmcid {
            format!("https://europepmc.org/article/PMC/{}", pmcid)
        } else if let Some(ref pmid) = self.pmid {
            format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid)
        } else if let Some(ref doi) = self.doi {
            format!("https://doi.org/{}", doi)
        } else {
            format!(
                "https://europepmc.org/article/{}/{}",
                self.source.as_deref().unwrap_or("MED"),
                self.id.as_deref().unwrap_or_default()
            )
        }
    }

    fn into_metadata(self, key: &str) -> PaperMetadata {
        let url = self.canonical_url();
        let authors = self
            .author_string
            .as_deref()
            .map(|s| {
                s.trim_end_matches('.')
                    .split(", ")
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        PaperMetadata {
            source_id: key.to_string(),
            url,
            title: collapse_whitespace(&self.title),
            abstract_text: strip_markup(&self.abstract_text),
            year: self.pub_year.as_deref().and_then(parse_year),
            authors,
            journal: self.journal_title.unwrap_or_default(),
        }
    }
}

impl EuropePmcSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: EPMC_BASE_URL.to_string(),
        }
    }

    async fn search_page(
        &self,
        query: &str,
        page_size: usize,
        cursor: &str,
    ) -> Result<SearchResponse, SourceError> {
        let page_size = page_size.to_string();
        let request = self.client.get(format!("{}/search", self.base_url)).query(&[
            ("query", query),
            ("format", "json"),
            ("resultType", "core"),
            ("pageSize", page_size.as_str()),
            ("cursorMark", cursor),
        ]);

        let body = get_text(NAME, request).await?;
        serde_json::from_str(&body).map_err(|e| SourceError::parse(NAME, e))
    }
}

#[async_trait]
impl LiteratureSource for EuropePmcSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SourceError> {
        let mut ids = Vec::new();
        let mut cursor = "*".to_string();

        while ids.len() < max_results {
            let page_size = (max_results - ids.len()).min(PAGE_SIZE);
            let page = self.search_page(query, page_size, &cursor).await?;

            if page.result_list.result.is_empty() {
                break;
            }
            ids.extend(page.result_list.result.iter().filter_map(EpmcRecord::key));

            match page.next_cursor_mark {
                Some(next) if next != cursor => cursor = next,
                _ => break,
            }
        }

        ids.truncate(max_results);
        Ok(ids)
    }

    async fn fetch_metadata(&self, id: &str) -> Result<Option<PaperMetadata>, SourceError> {
        let (source, ext_id) = split_key(id);
        let query = format!("EXT_ID:{} AND SRC:{}", ext_id, source);
        let page = self.search_page(&query, 1, "*").await?;

        Ok(page
            .result_list
            .result
            .into_iter()
            .next()
            .map(|record| record.into_metadata(id)))
    }

    async fn fetch_full_text(&self, paper: &PaperMetadata) -> Result<Option<String>, SourceError> {
        let Some(pmcid) = pmcid_from_url(&paper.url) else {
            debug!("{} has no PMC id, no full text", paper.source_id);
            return Ok(None);
        };

        let request = self
            .client
            .get(format!("{}/{}/fullTextXML", self.base_url, pmcid));
        let body = get_text(NAME, request).await?;

        super::pubmed::parse_pmc_full_text(&body)
    }
}

/// Split a `SOURCE:ID` key; bare ids are assumed to be MEDLINE.
fn split_key(key: &str) -> (&str, &str) {
    match key.split_once(':') {
        Some((source, id)) => (source, id),
        None => ("MED", key),
    }
}

fn pmcid_from_url(url: &str) -> Option<&str> {
    url.strip_prefix("https://europepmc.org/article/PMC/")
        .filter(|id| id.starts_with("PMC"))
}

/// Plain text of an abstract that may carry inline HTML (`<i>`, `<sup>`)
/// and XML entities.
fn strip_markup(s: &str) -> String {
    let wrapped = format!("<abstract>{}</abstract>", s);
    match roxmltree::Document::parse(&wrapped) {
        Ok(doc) => xml_text(doc.root_element()),
        Err(_) => strip_tags(s),
    }
}

/// Fallback for abstracts that are not well-formed XML. Only `<` followed
/// by a letter or `/` and closed before the next `<` opens a tag; any other
/// `<` is text (`p < 0.05`).
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let starts_tag = after
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '/');
        let close = after.find('>').filter(|&end| !after[..end].contains('<'));

        match close {
            Some(end) if starts_tag => {
                out.push(' ');
                rest = &after[end + 1..];
            }
            _ => {
                out.push('<');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    collapse_whitespace(&out)
}
