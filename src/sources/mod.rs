//! Literature database clients.
//!
//! Every backend implements [`LiteratureSource`]: search a free-text query
//! for candidate identifiers, then fetch metadata (and, where the database
//! offers it, full text) per identifier. The curation loop only sees the
//! trait, so tests drive it with in-memory fakes.

pub mod arxiv;
pub mod europepmc;
pub mod preprint;
pub mod pubmed;

use crate::config::SearchConfig;
use crate::error::SourceError;
use crate::models::PaperMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which literature database to query.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// NCBI PubMed via E-utilities (default)
    #[default]
    Pubmed,
    /// Europe PMC REST API
    Europepmc,
    /// arXiv export API
    Arxiv,
    /// bioRxiv details API
    Biorxiv,
    /// medRxiv details API
    Medrxiv,
}

impl SourceKind {
    /// Whether the API's usage policy asks for a contact address.
    pub fn requires_contact_email(&self) -> bool {
        matches!(self, SourceKind::Pubmed)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Pubmed => write!(f, "pubmed"),
            SourceKind::Europepmc => write!(f, "europepmc"),
            SourceKind::Arxiv => write!(f, "arxiv"),
            SourceKind::Biorxiv => write!(f, "biorxiv"),
            SourceKind::Medrxiv => write!(f, "medrxiv"),
        }
    }
}

/// A literature database the curation loop can search.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Short name used in logs and the run summary.
    fn name(&self) -> &'static str;

    /// Run a query and return up to `max_results` candidate identifiers.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SourceError>;

    /// Fetch metadata for one identifier. `Ok(None)` means the database
    /// has no record for it.
    async fn fetch_metadata(&self, id: &str) -> Result<Option<PaperMetadata>, SourceError>;

    /// Fetch full text, if the database provides it.
    async fn fetch_full_text(&self, _paper: &PaperMetadata) -> Result<Option<String>, SourceError> {
        Ok(None)
    }
}

/// Build the configured source client.
pub fn build_source(config: &SearchConfig) -> Result<Box<dyn LiteratureSource>, SourceError> {
    let client = http_client(config)?;
    let email = config.contact_email.clone();

    let source: Box<dyn LiteratureSource> = match config.source {
        SourceKind::Pubmed => Box::new(pubmed::PubMedSource::new(client, email)),
        SourceKind::Europepmc => Box::new(europepmc::EuropePmcSource::new(client)),
        SourceKind::Arxiv => Box::new(arxiv::ArxivSource::new(client)),
        SourceKind::Biorxiv => Box::new(preprint::PreprintSource::new(
            client,
            preprint::PreprintServer::Biorxiv,
        )),
        SourceKind::Medrxiv => Box::new(preprint::PreprintSource::new(
            client,
            preprint::PreprintServer::Medrxiv,
        )),
    };

    Ok(source)
}

fn http_client(config: &SearchConfig) -> Result<reqwest::Client, SourceError> {
    let agent = if config.contact_email.is_empty() {
        format!("agingcurator/{}", env!("CARGO_PKG_VERSION"))
    } else {
        format!(
            "agingcurator/{} ({})",
            env!("CARGO_PKG_VERSION"),
            config.contact_email
        )
    };

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(agent)
        .build()
        .map_err(|e| SourceError::request("http", e))
}

/// Send a GET request and return the body, mapping transport and status
/// failures onto [`SourceError`].
pub(crate) async fn get_text(
    source_name: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<String, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceError::request(source_name, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            source_name,
            status: status.as_u16(),
        });
    }

    response
        .text()
        .await
        .map_err(|e| SourceError::request(source_name, e))
}

/// Parse an XML response body. NCBI and Europe PMC documents open with a
/// `<!DOCTYPE>` declaration, so DTDs must be accepted.
pub(crate) fn parse_xml<'input>(
    source_name: &'static str,
    body: &'input str,
) -> Result<roxmltree::Document<'input>, SourceError> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    roxmltree::Document::parse_with_options(body, options)
        .map_err(|e| SourceError::parse(source_name, e))
}

/// Concatenate all descendant text of an XML node, collapsing whitespace.
pub(crate) fn xml_text(node: roxmltree::Node<'_, '_>) -> String {
    let raw: Vec<&str> = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    collapse_whitespace(&raw.join(" "))
}

/// Collapse runs of whitespace into single spaces and trim.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse the leading four-digit year of a date-like string.
pub(crate) fn parse_year(s: &str) -> Option<i32> {
    let digits: String = s.trim().chars().take(4).collect();
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}
