//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and environment fallbacks.

use crate::agent::LlmProvider;
use crate::sources::SourceKind;
use clap::Parser;
use std::path::PathBuf;

/// agingcurator - LLM-assisted curation of aging-theory literature
///
/// Searches a literature database, classifies papers against a taxonomy of
/// aging theories with a language model, answers nine curation questions
/// per paper and writes three CSV tables.
///
/// Examples:
///   agingcurator --email me@lab.org
///   agingcurator --source europepmc --model qwen2.5:14b
///   agingcurator --source arxiv --query "epigenetic clock" --max-iterations 5
///   agingcurator --provider anthropic --model claude-3-5-haiku-latest --llm-url https://api.anthropic.com
///   agingcurator --dry-run --email me@lab.org
///   agingcurator --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Literature database to search
    #[arg(short, long, value_name = "SOURCE")]
    pub source: Option<SourceKind>,

    /// Contact email sent to NCBI E-utilities (required for pubmed)
    #[arg(short, long, env = "CURATOR_EMAIL", value_name = "EMAIL")]
    pub email: Option<String>,

    /// Directory for the CSV tables and run summary
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .agingcurator.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Model used for classification and extraction
    #[arg(short, long, env = "CURATOR_MODEL")]
    pub model: Option<String>,

    /// Chat API to use
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<LlmProvider>,

    /// Base URL of the chat API
    #[arg(long, value_name = "URL")]
    pub llm_url: Option<String>,

    /// API key for the anthropic provider
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, hide = true)]
    pub api_key: Option<String>,

    /// Stop after this many iterations
    #[arg(long, value_name = "COUNT")]
    pub max_iterations: Option<usize>,

    /// Stop after this many consecutive iterations without a new paper
    #[arg(long, value_name = "COUNT")]
    pub stall_threshold: Option<usize>,

    /// Maximum candidates requested per query
    #[arg(long, value_name = "COUNT")]
    pub max_results: Option<usize>,

    /// Seed query (repeatable; replaces the configured seeds)
    #[arg(short = 'Q', long = "query", value_name = "QUERY")]
    pub queries: Vec<String>,

    /// Annotate from title and abstract only, skipping full-text retrieval
    #[arg(long)]
    pub abstracts_only: bool,

    /// LLM request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: plan and search the first batch without calling the LLM
    ///
    /// Writes no output files.
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .agingcurator.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.llm_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("LLM URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref email) = self.email {
            if !email.trim().is_empty() && !email.contains('@') {
                return Err(format!("Not an email address: {}", email));
            }
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.queries.iter().any(|q| q.trim().is_empty()) {
            return Err("--query must not be empty".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
