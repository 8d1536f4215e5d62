//! Error types for the curator's module seams.
//!
//! Configuration errors are fatal at startup. Source and LLM errors are
//! per-item: the loop logs them and moves on.

use thiserror::Error;

/// Fatal configuration problems detected before a run starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("contact email is required by the {0} API (set --email or CURATOR_EMAIL)")]
    MissingContactEmail(String),

    #[error("ANTHROPIC_API_KEY must be set when using the anthropic provider")]
    MissingApiKey,

    #[error("theory taxonomy is empty")]
    EmptyTaxonomy,

    #[error("duplicate theory in taxonomy: {0}")]
    DuplicateTheory(String),

    #[error("expected exactly {expected} questions, found {found}")]
    QuestionCount { expected: usize, found: usize },

    #[error("{0} must be at least 1")]
    ZeroBudget(&'static str),

    #[error("LLM URL must start with 'http://' or 'https://': {0}")]
    InvalidUrl(String),
}

/// Failure talking to a literature database.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {source_name} failed: {message}")]
    Request {
        source_name: &'static str,
        message: String,
    },

    #[error("{source_name} returned HTTP {status}")]
    Status {
        source_name: &'static str,
        status: u16,
    },

    #[error("failed to parse {source_name} response: {message}")]
    Parse {
        source_name: &'static str,
        message: String,
    },
}

impl SourceError {
    pub fn request(source_name: &'static str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "connection failed".to_string()
        } else {
            err.to_string()
        };
        SourceError::Request {
            source_name,
            message,
        }
    }

    pub fn parse(source_name: &'static str, message: impl ToString) -> Self {
        SourceError::Parse {
            source_name,
            message: message.to_string(),
        }
    }
}

/// Failure calling the language model.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to LLM endpoint at {0}")]
    Connect(String),

    #[error("failed to send request: {0}")]
    Request(String),

    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed LLM response: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let e = ConfigError::QuestionCount {
            expected: 9,
            found: 3,
        };
        assert!(e.to_string().contains("exactly 9"));
        assert!(e.to_string().contains("found 3"));
        assert!(ConfigError::MissingContactEmail("pubmed".into())
            .to_string()
            .contains("pubmed"));
    }

    #[test]
    fn source_error_display() {
        let e = SourceError::Status {
            source_name: "arxiv",
            status: 503,
        };
        assert_eq!(e.to_string(), "arxiv returned HTTP 503");

        let e = SourceError::parse("pubmed", "missing idlist");
        assert!(e.to_string().contains("missing idlist"));
    }

    #[test]
    fn llm_error_display() {
        let e = LlmError::Api {
            status: 429,
            body: "rate limited".into(),
        };
        assert!(e.to_string().contains("429"));
        assert!(LlmError::Timeout(30).to_string().contains("30s"));
    }
}
