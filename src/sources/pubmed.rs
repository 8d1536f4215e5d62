//! PubMed client (NCBI E-utilities).
//!
//! Search uses `esearch` (JSON), metadata uses `efetch` (PubMed XML), and
//! full text is looked up through `elink` into PubMed Central.

use super::{get_text, parse_xml, parse_year, xml_text, LiteratureSource};
use crate::error::SourceError;
use crate::models::PaperMetadata;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const NAME: &str = "pubmed";

pub struct PubMedSource {
    client: reqwest::Client,
    email: String,
    base_url: String,
}

impl PubMedSource {
    pub fn new(client: reqwest::Client, email: String) -> Self {
        Self {
            client,
            email,
            base_url: EUTILS_BASE_URL.to_string(),
        }
    }

    fn endpoint(&self, tool: &str) -> String {
        format!("{}/{}.fcgi", self.base_url, tool)
    }

    fn identity(&self) -> [(&'static str, &str); 2] {
        [("tool", "agingcurator"), ("email", self.email.as_str())]
    }
}

#[async_trait]
impl LiteratureSource for PubMedSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SourceError> {
        let retmax = max_results.to_string();
        let request = self
            .client
            .get(self.endpoint("esearch"))
            .query(&[
                ("db", "pubmed"),
                ("term", query),
                ("retmax", retmax.as_str()),
                ("retmode", "json"),
                ("sort", "relevance"),
            ])
            .query(&self.identity());

        let body = get_text(NAME, request).await?;
        parse_search_response(&body)
    }

    async fn fetch_metadata(&self, id: &str) -> Result<Option<PaperMetadata>, SourceError> {
        let request = self
            .client
            .get(self.endpoint("efetch"))
            .query(&[("db", "pubmed"), ("id", id), ("retmode", "xml")])
            .query(&self.identity());

        let body = get_text(NAME, request).await?;
        parse_article_xml(id, &body)
    }

    async fn fetch_full_text(&self, paper: &PaperMetadata) -> Result<Option<String>, SourceError> {
        let request = self
            .client
            .get(self.endpoint("elink"))
            .query(&[
                ("dbfrom", "pubmed"),
                ("id", paper.source_id.as_str()),
                ("linkname", "pubmed_pmc"),
                ("retmode", "json"),
            ])
            .query(&self.identity());

        let body = get_text(NAME, request).await?;
        let Some(pmc_id) = parse_pmc_link(&body)? else {
            debug!("PMID {} has no PMC record", paper.source_id);
            return Ok(None);
        };

        let request = self
            .client
            .get(self.endpoint("efetch"))
            .query(&[("db", "pmc"), ("id", pmc_id.as_str()), ("retmode", "xml")])
            .query(&self.identity());

        let body = get_text(NAME, request).await?;
        parse_pmc_full_text(&body)
    }
}

/// Extract the PMID list from an `esearch` JSON response.
fn parse_search_response(body: &str) -> Result<Vec<String>, SourceError> {
    let json: Value = serde_json::from_str(body).map_err(|e| SourceError::parse(NAME, e))?;

    let ids = json["esearchresult"]["idlist"]
        .as_array()
        .ok_or_else(|| SourceError::parse(NAME, "missing esearchresult.idlist"))?;

    Ok(ids
        .iter()
        .filter_map(|v| v.as_str())
        .map(String::from)
        .collect())
}

/// Parse a PubMed `efetch` XML document into metadata.
fn parse_article_xml(pmid: &str, body: &str) -> Result<Option<PaperMetadata>, SourceError> {
    let doc = parse_xml(NAME, body)?;

    let Some(citation) = doc
        .descendants()
        .find(|n| n.has_tag_name("MedlineCitation"))
    else {
        return Ok(None);
    };

    let find = |tag: &str| citation.descendants().find(|n| n.has_tag_name(tag));

    let title = find("ArticleTitle").map(xml_text).unwrap_or_default();

    let abstract_text = citation
        .descendants()
        .filter(|n| n.has_tag_name("AbstractText"))
        .map(|n| match n.attribute("Label") {
            Some(label) => format!("{}: {}", label, xml_text(n)),
            None => xml_text(n),
        })
        .collect::<Vec<_>>()
        .join("\n");

    let year = find("PubDate").and_then(|date| {
        date.children()
            .find(|n| n.has_tag_name("Year") || n.has_tag_name("MedlineDate"))
            .and_then(|n| n.text())
            .and_then(parse_year)
    });

    let journal = citation
        .descendants()
        .find(|n| n.has_tag_name("Journal"))
        .and_then(|j| j.children().find(|n| n.has_tag_name("Title")))
        .map(xml_text)
        .unwrap_or_default();

    let authors = citation
        .descendants()
        .filter(|n| n.has_tag_name("Author"))
        .filter_map(|author| {
            let part = |tag: &str| {
                author
                    .children()
                    .find(|n| n.has_tag_name(tag))
                    .and_then(|n| n.text())
            };
            let last = part("LastName")?;
            Some(match part("ForeName") {
                Some(first) => format!("{} {}", first, last),
                None => last.to_string(),
            })
        })
        .collect();

    Ok(Some(PaperMetadata {
        source_id: pmid.to_string(),
        url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid),
        title,
        abstract_text,
        year,
        authors,
        journal,
    }))
}

/// Find the linked PMC id in an `elink` JSON response.
fn parse_pmc_link(body: &str) -> Result<Option<String>, SourceError> {
    let json: Value = serde_json::from_str(body).map_err(|e| SourceError::parse(NAME, e))?;

    let link = json["linksets"][0]["linksetdbs"][0]["links"][0].clone();
    let id = match link {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    Ok(id.map(|id| format!("PMC{}", id)))
}

/// Flatten a PMC article into labelled plain-text sections.
pub(crate) fn parse_pmc_full_text(body: &str) -> Result<Option<String>, SourceError> {
    let doc = parse_xml(NAME, body)?;
    let mut sections = Vec::new();

    for article in doc.descendants().filter(|n| n.has_tag_name("article")) {
        if let Some(abstract_node) = article.descendants().find(|n| n.has_tag_name("abstract")) {
            let text = xml_text(abstract_node);
            if !text.is_empty() {
                sections.push(format!("ABSTRACT:\n{}", text));
            }
        }

        let Some(body_node) = article.descendants().find(|n| n.has_tag_name("body")) else {
            continue;
        };

        // Top-level sections only; nested <sec> text is already included.
        for sec in body_node.children().filter(|n| n.has_tag_name("sec")) {
            let content = xml_text(sec);
            if content.is_empty() {
                continue;
            }
            match sec.children().find(|n| n.has_tag_name("title")) {
                Some(title) => sections.push(format!(
                    "{}:\n{}",
                    xml_text(title).to_uppercase(),
                    content
                )),
                None => sections.push(content),
            }
        }
    }

    if sections.is_empty() {
        Ok(None)
    } else {
        Ok(Some(sections.join("\n\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_XML: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2025//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_250101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE">
      <PMID Version="1">12345</PMID>
      <Article>
        <Journal>
          <JournalIssue><PubDate><Year>2019</Year><Month>Mar</Month></PubDate></JournalIssue>
          <Title>Aging Cell</Title>
        </Journal>
        <ArticleTitle>Mitochondrial ROS and lifespan</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Free radicals accumulate.</AbstractText>
          <AbstractText Label="RESULTS">Lifespan <i>decreased</i>.</AbstractText>
        </Abstract>
        <AuthorList>
          <Author><LastName>Harman</LastName><ForeName>Denham</ForeName></Author>
          <Author><CollectiveName>Aging Consortium</CollectiveName></Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_search_response() {
        let body = r#"{"esearchresult": {"count": "2", "idlist": ["111", "222"]}}"#;
        assert_eq!(parse_search_response(body).unwrap(), vec!["111", "222"]);

        assert!(parse_search_response(r#"{"error": "bad"}"#).is_err());
        assert!(parse_search_response("not json").is_err());
    }

    #[test]
    fn test_parse_article_xml() {
        let paper = parse_article_xml("12345", ARTICLE_XML).unwrap().unwrap();

        assert_eq!(paper.url, "https://pubmed.ncbi.nlm.nih.gov/12345/");
        assert_eq!(paper.title, "Mitochondrial ROS and lifespan");
        assert_eq!(paper.year, Some(2019));
        assert_eq!(paper.journal, "Aging Cell");
        assert_eq!(paper.authors, vec!["Denham Harman"]);
        assert!(paper.abstract_text.contains("BACKGROUND: Free radicals accumulate."));
        assert!(paper.abstract_text.contains("RESULTS: Lifespan decreased ."));
    }

    #[test]
    fn test_parse_article_xml_empty_set() {
        let body = "<PubmedArticleSet></PubmedArticleSet>";
        assert_eq!(parse_article_xml("1", body).unwrap(), None);
    }

    #[test]
    fn test_parse_pmc_link() {
        let body = r#"{"linksets":[{"dbfrom":"pubmed","linksetdbs":[{"linkname":"pubmed_pmc","links":["6543210"]}]}]}"#;
        assert_eq!(parse_pmc_link(body).unwrap().as_deref(), Some("PMC6543210"));

        let no_links = r#"{"linksets":[{"dbfrom":"pubmed"}]}"#;
        assert_eq!(parse_pmc_link(no_links).unwrap(), None);
    }

    #[test]
    fn test_parse_pmc_full_text() {
        let body = r#"<?xml version="1.0"  ?><!DOCTYPE pmc-articleset PUBLIC "-//NLM//DTD ARTICLE SET 2.0//EN" "https://dtd.nlm.nih.gov/ncbi/pmc/articleset/nlm-articleset-2.0.dtd">
<pmc-articleset><article>
            <front><article-meta><abstract><p>Short abstract.</p></abstract></article-meta></front>
            <body>
              <sec><title>Introduction</title><p>Telomeres shorten.</p></sec>
              <sec><p>Untitled section.</p></sec>
            </body>
        </article></pmc-articleset>"#;

        let text = parse_pmc_full_text(body).unwrap().unwrap();
        assert!(text.starts_with("ABSTRACT:\nShort abstract."));
        assert!(text.contains("INTRODUCTION:\nIntroduction Telomeres shorten."));
        assert!(text.contains("Untitled section."));

        assert_eq!(parse_pmc_full_text("<pmc-articleset/>").unwrap(), None);
    }
}
