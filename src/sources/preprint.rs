//! bioRxiv / medRxiv client (details API).
//!
//! The preprint servers have no search endpoint. Search walks the listing
//! in week-long windows from today backwards, reads a few pages of each
//! window and matches the query locally against title and abstract.

use super::{collapse_whitespace, get_text, parse_year, LiteratureSource};
use crate::error::SourceError;
use crate::models::PaperMetadata;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

const API_BASE_URL: &str = "https://api.biorxiv.org";
const LOOKBACK_DAYS: i64 = 730;
const WINDOW_DAYS: i64 = 7;
const PAGES_PER_WINDOW: usize = 3;
const MAX_PAGES: usize = 30;

/// Which preprint server to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprintServer {
    Biorxiv,
    Medrxiv,
}

impl PreprintServer {
    fn slug(&self) -> &'static str {
        match self {
            PreprintServer::Biorxiv => "biorxiv",
            PreprintServer::Medrxiv => "medrxiv",
        }
    }

    fn content_url(&self, doi: &str) -> String {
        match self {
            PreprintServer::Biorxiv => format!("https://www.biorxiv.org/content/{}", doi),
            PreprintServer::Medrxiv => format!("https://www.medrxiv.org/content/{}", doi),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    collection: Vec<PreprintRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct PreprintRecord {
    doi: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default, rename = "abstract")]
    abstract_text: String,
    #[serde(default)]
    authors: String,
    #[serde(default)]
    date: String,
}

impl PreprintRecord {
    fn into_metadata(self, server: PreprintServer) -> Option<PaperMetadata> {
        let doi = self.doi?;

        Some(PaperMetadata {
            url: server.content_url(&doi),
            source_id: doi,
            title: collapse_whitespace(&self.title),
            abstract_text: collapse_whitespace(&self.abstract_text),
            year: parse_year(&self.date),
            authors: self
                .authors
                .split(';')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from)
                .collect(),
            journal: server.slug().to_string(),
        })
    }
}

pub struct PreprintSource {
    client: reqwest::Client,
    server: PreprintServer,
    base_url: String,
}

impl PreprintSource {
    pub fn new(client: reqwest::Client, server: PreprintServer) -> Self {
        Self {
            client,
            server,
            base_url: API_BASE_URL.to_string(),
        }
    }

    async fn details(&self, path: &str) -> Result<DetailsResponse, SourceError> {
        let url = format!("{}/details/{}/{}", self.base_url, self.server.slug(), path);
        let source_name = self.server.slug();
        let body = get_text(source_name, self.client.get(url)).await?;
        serde_json::from_str(&body).map_err(|e| SourceError::parse(source_name, e))
    }
}

#[async_trait]
impl LiteratureSource for PreprintSource {
    fn name(&self) -> &'static str {
        self.server.slug()
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SourceError> {
        let matcher = QueryMatcher::parse(query);
        if matcher.is_empty() {
            debug!("Query {:?} has no searchable terms", query);
            return Ok(Vec::new());
        }

        let end = Utc::now().date_naive();
        let mut dois = Vec::new();
        let mut pages = 0usize;

        'windows: for (from, to) in date_windows(end, LOOKBACK_DAYS, WINDOW_DAYS) {
            let mut cursor = 0usize;
            for _ in 0..PAGES_PER_WINDOW {
                if pages >= MAX_PAGES {
                    break 'windows;
                }
                pages += 1;

                let page = self
                    .details(&format!("{}/{}/{}/json", from, to, cursor))
                    .await?;
                if page.collection.is_empty() {
                    break;
                }
                cursor += page.collection.len();

                for record in page.collection {
                    let haystack =
                        format!("{} {}", record.title, record.abstract_text).to_lowercase();
                    if !matcher.matches(&haystack) {
                        continue;
                    }
                    if let Some(doi) = record.doi {
                        if !dois.contains(&doi) {
                            dois.push(doi);
                        }
                    }
                    if dois.len() >= max_results {
                        return Ok(dois);
                    }
                }
            }
        }

        debug!("{} pages read for {:?}, {} matches", pages, query, dois.len());
        Ok(dois)
    }

    async fn fetch_metadata(&self, id: &str) -> Result<Option<PaperMetadata>, SourceError> {
        let page = self.details(id).await?;
        // Versions are listed oldest first.
        Ok(page
            .collection
            .into_iter()
            .last()
            .and_then(|record| record.into_metadata(self.server)))
    }
}

/// Inclusive date windows of `window_days` covering the `lookback_days`
/// up to `end`, newest first.
fn date_windows(end: NaiveDate, lookback_days: i64, window_days: i64) -> Vec<(NaiveDate, NaiveDate)> {
    let start = end - Duration::days(lookback_days);
    let mut windows = Vec::new();
    let mut to = end;
    while to >= start {
        let from = (to - Duration::days(window_days - 1)).max(start);
        windows.push((from, to));
        to = from - Duration::days(1);
    }
    windows
}

/// Local boolean matcher: `OR` separates alternatives, every other term
/// of an alternative must appear (case-insensitive substring).
#[derive(Debug, PartialEq, Eq)]
struct QueryMatcher {
    alternatives: Vec<Vec<String>>,
}

impl QueryMatcher {
    fn parse(query: &str) -> Self {
        let cleaned: String = query
            .chars()
            .map(|c| if matches!(c, '"' | '(' | ')') { ' ' } else { c })
            .collect();

        let mut alternatives = Vec::new();
        let mut current = Vec::new();
        for token in cleaned.split_whitespace() {
            match token {
                "OR" => {
                    if !current.is_empty() {
                        alternatives.push(std::mem::take(&mut current));
                    }
                }
                "AND" | "NOT" => {}
                t if t.chars().count() > 2 => current.push(t.to_lowercase()),
                _ => {}
            }
        }
        if !current.is_empty() {
            alternatives.push(current);
        }

        Self { alternatives }
    }

    fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    fn matches(&self, haystack_lower: &str) -> bool {
        self.alternatives
            .iter()
            .any(|terms| terms.iter().all(|t| haystack_lower.contains(t.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_matcher_parse() {
        let m = QueryMatcher::parse("\"Cellular Senescence\" AND aging OR senolytics");
        assert_eq!(
            m.alternatives,
            vec![
                vec!["cellular".to_string(), "senescence".to_string(), "aging".to_string()],
                vec!["senolytics".to_string()],
            ]
        );
        assert!(QueryMatcher::parse("a OR of").is_empty());
    }

    #[test]
    fn test_query_matcher_matches() {
        let m = QueryMatcher::parse("telomere AND aging OR senolytics");
        assert!(m.matches("telomere length predicts aging"));
        assert!(!m.matches("telomere length in yeast"));
        assert!(m.matches("a trial of senolytics"));
    }

    #[test]
    fn test_date_windows_walk_backwards() {
        let day = |m, d| NaiveDate::from_ymd_opt(2024, m, d).unwrap();

        assert_eq!(
            date_windows(day(3, 31), 22, 7),
            vec![
                (day(3, 25), day(3, 31)),
                (day(3, 18), day(3, 24)),
                (day(3, 11), day(3, 17)),
                (day(3, 9), day(3, 10)),
            ]
        );

        let all = date_windows(day(3, 31), LOOKBACK_DAYS, WINDOW_DAYS);
        assert_eq!(all[0].1, day(3, 31));
        assert_eq!(all.last().unwrap().0, day(3, 31) - Duration::days(LOOKBACK_DAYS));
        assert!(all.windows(2).all(|w| w[1].1 + Duration::days(1) == w[0].0));
    }

    #[test]
    fn test_record_into_metadata() {
        let body = r#"{"messages":[{"status":"ok"}],"collection":[
            {"doi":"10.1101/2023.01.01.522222","title":"Epigenetic  clocks","abstract":"Methylation drifts.",
             "authors":"Horvath, S.; Raj, K.;","date":"2023-01-03","version":"1"},
            {"doi":"10.1101/2023.01.01.522222","title":"Epigenetic clocks v2","abstract":"Methylation drifts more.",
             "authors":"Horvath, S.","date":"2023-02-10","version":"2"}
        ]}"#;
        let page: DetailsResponse = serde_json::from_str(body).unwrap();
        let latest = page
            .collection
            .into_iter()
            .last()
            .and_then(|r| r.into_metadata(PreprintServer::Medrxiv))
            .unwrap();

        assert_eq!(latest.url, "https://www.medrxiv.org/content/10.1101/2023.01.01.522222");
        assert_eq!(latest.title, "Epigenetic clocks v2");
        assert_eq!(latest.year, Some(2023));
        assert_eq!(latest.authors, vec!["Horvath, S."]);
        assert_eq!(latest.journal, "medrxiv");
    }

    #[test]
    fn test_record_without_doi_is_skipped() {
        let record = PreprintRecord {
            doi: None,
            title: "x".into(),
            abstract_text: String::new(),
            authors: String::new(),
            date: String::new(),
        };
        assert!(record.into_metadata(PreprintServer::Biorxiv).is_none());
    }
}
