//! Configuration file handling.
//!
//! This module handles loading, merging and validating configuration from
//! `.agingcurator.toml` files. The theory taxonomy and the nine curation
//! questions are static configuration; they are never discovered at runtime.

use crate::agent::chat::LlmProvider;
use crate::error::ConfigError;
use crate::models::{Question, QUESTION_COUNT};
use crate::sources::SourceKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".agingcurator.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Language model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Literature source settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Query planner budgets and query templates.
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Controlled vocabulary of aging theories.
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,

    /// The fixed, ordered curation questions.
    #[serde(default = "default_questions")]
    pub questions: Vec<Question>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            model: ModelConfig::default(),
            search: SearchConfig::default(),
            planner: PlannerConfig::default(),
            taxonomy: TaxonomyConfig::default(),
            questions: default_questions(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory the CSV tables and run summary are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Pause between papers, in milliseconds.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verbose: false,
            request_delay_ms: default_request_delay(),
        }
    }
}

fn default_output_dir() -> String {
    "curation_output".to_string()
}

fn default_request_delay() -> u64 {
    500
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Chat API flavour.
    #[serde(default)]
    pub provider: LlmProvider,

    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// API base URL.
    #[serde(default = "default_llm_url")]
    pub url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in a response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,

    /// Paper text is truncated to this many characters before prompting.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// API key; read from the environment, never from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            name: default_model(),
            url: default_llm_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_model_timeout(),
            max_text_chars: default_max_text_chars(),
            api_key: None,
        }
    }
}

fn default_model() -> String {
    LlmProvider::default().default_model().to_string()
}

fn default_llm_url() -> String {
    LlmProvider::default().default_url().to_string()
}

impl ModelConfig {
    /// Replace another provider's default URL or model with this
    /// provider's own. Values that differ from every provider default
    /// were set explicitly and are kept.
    pub fn apply_provider_defaults(&mut self) {
        for other in LlmProvider::ALL {
            if other == self.provider {
                continue;
            }
            if self.url == other.default_url() {
                self.url = self.provider.default_url().to_string();
            }
            if self.name == other.default_model() {
                self.name = self.provider.default_model().to_string();
            }
        }
    }
}

fn default_temperature() -> f32 {
    0.0
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_model_timeout() -> u64 {
    300
}

fn default_max_text_chars() -> usize {
    100_000
}

/// Literature source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Which database to query.
    #[serde(default)]
    pub source: SourceKind,

    /// Contact email sent to the literature APIs.
    #[serde(default)]
    pub contact_email: String,

    /// Candidate identifiers requested per query.
    #[serde(default = "default_max_results")]
    pub max_results_per_query: usize,

    /// Try to fetch full text before falling back to the abstract.
    #[serde(default = "default_true")]
    pub full_text: bool,

    /// HTTP timeout for source requests, in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            contact_email: String::new(),
            max_results_per_query: default_max_results(),
            full_text: true,
            timeout_seconds: default_search_timeout(),
        }
    }
}

fn default_max_results() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_search_timeout() -> u64 {
    30
}

/// Query planner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Hard cap on loop iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Consecutive iterations without new papers before stopping.
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: usize,

    /// Queries issued per iteration.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Queries issued first, in order.
    #[serde(default = "default_seed_queries")]
    pub seed_queries: Vec<String>,

    /// Per-theory follow-up queries; `{theory}` is replaced by the name.
    #[serde(default = "default_expansion_templates")]
    pub expansion_templates: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            stall_threshold: default_stall_threshold(),
            batch_size: default_batch_size(),
            seed_queries: default_seed_queries(),
            expansion_templates: default_expansion_templates(),
        }
    }
}

fn default_max_iterations() -> usize {
    50
}

fn default_stall_threshold() -> usize {
    3
}

fn default_batch_size() -> usize {
    1
}

fn default_seed_queries() -> Vec<String> {
    vec![
        "hallmarks of aging",
        "aging theories",
        "biological aging mechanisms",
        "oxidative stress AND aging",
        "telomere shortening",
        "mitochondrial dysfunction AND aging",
        "cellular senescence",
        "stem cell exhaustion",
        "inflammaging",
        "proteostasis AND aging",
        "mTOR AND aging",
        "caloric restriction AND longevity",
        "genomic instability AND aging",
        "epigenetic clock",
        "longevity interventions",
        "naked mole rat AND longevity",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_expansion_templates() -> Vec<String> {
    vec!["\"{theory}\" AND aging".to_string()]
}

/// Theory taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    /// Canonical theory names.
    #[serde(default = "default_theories")]
    pub theories: Vec<String>,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            theories: default_theories(),
        }
    }
}

fn default_theories() -> Vec<String> {
    vec![
        "Free Radical Theory",
        "Telomere Shortening",
        "Mitochondrial Dysfunction",
        "Cellular Senescence",
        "Stem Cell Exhaustion",
        "Altered Intercellular Communication",
        "Loss of Proteostasis",
        "Deregulated Nutrient Sensing",
        "Genomic Instability",
        "Epigenetic Alterations",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_questions() -> Vec<Question> {
    const YES_NO: &[&str] = &["Yes", "No"];
    vec![
        Question::new(
            "Q1",
            "Does the paper suggest an aging biomarker (a measurable entity reflecting the pace of aging or health state, associated with mortality or age-related conditions)?",
            &["Yes, quantitatively shown", "Yes, but not shown", "No"],
        ),
        Question::new("Q2", "Does the paper suggest a molecular mechanism of aging?", YES_NO),
        Question::new("Q3", "Does the paper suggest a longevity intervention to test?", YES_NO),
        Question::new("Q4", "Does the paper claim that aging cannot be reversed?", YES_NO),
        Question::new(
            "Q5",
            "Does the paper suggest a biomarker that predicts maximal lifespan differences between species?",
            YES_NO,
        ),
        Question::new(
            "Q6",
            "Does the paper explain why the naked mole rat can live 40+ years despite its small size?",
            YES_NO,
        ),
        Question::new(
            "Q7",
            "Does the paper explain why birds live much longer than mammals of similar size?",
            YES_NO,
        ),
        Question::new(
            "Q8",
            "Does the paper explain why large animals live longer than small ones?",
            YES_NO,
        ),
        Question::new("Q9", "Does the paper explain why calorie restriction increases lifespan?", YES_NO),
    ]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings and only
    /// override values they explicitly provide.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(source) = args.source {
            self.search.source = source;
        }
        if let Some(ref email) = args.email {
            self.search.contact_email = email.clone();
        }
        if let Some(max_results) = args.max_results {
            self.search.max_results_per_query = max_results;
        }
        if args.abstracts_only {
            self.search.full_text = false;
        }

        if let Some(provider) = args.provider {
            self.model.provider = provider;
        }
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.llm_url {
            self.model.url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if args.api_key.is_some() {
            self.model.api_key = args.api_key.clone();
        }
        self.model.apply_provider_defaults();

        if let Some(max_iterations) = args.max_iterations {
            self.planner.max_iterations = max_iterations;
        }
        if let Some(stall) = args.stall_threshold {
            self.planner.stall_threshold = stall;
        }
        if !args.queries.is_empty() {
            self.planner.seed_queries = args.queries.clone();
        }

        if let Some(ref output_dir) = args.output_dir {
            self.general.output_dir = output_dir.display().to_string();
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check everything that must hold before a run may start.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.taxonomy.theories.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::EmptyTaxonomy);
        }

        let mut seen = HashSet::new();
        for theory in &self.taxonomy.theories {
            let key = crate::analysis::normalize_theory_key(theory);
            if !key.is_empty() && !seen.insert(key) {
                return Err(ConfigError::DuplicateTheory(theory.clone()));
            }
        }

        if self.questions.len() != QUESTION_COUNT {
            return Err(ConfigError::QuestionCount {
                expected: QUESTION_COUNT,
                found: self.questions.len(),
            });
        }

        if self.search.source.requires_contact_email() && self.search.contact_email.trim().is_empty()
        {
            return Err(ConfigError::MissingContactEmail(
                self.search.source.to_string(),
            ));
        }

        if self.model.provider.requires_api_key()
            && self.model.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingApiKey);
        }

        if !self.model.url.starts_with("http://") && !self.model.url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.model.url.clone()));
        }

        if self.planner.max_iterations == 0 {
            return Err(ConfigError::ZeroBudget("max_iterations"));
        }
        if self.planner.stall_threshold == 0 {
            return Err(ConfigError::ZeroBudget("stall_threshold"));
        }
        if self.planner.batch_size == 0 {
            return Err(ConfigError::ZeroBudget("batch_size"));
        }
        if self.search.max_results_per_query == 0 {
            return Err(ConfigError::ZeroBudget("max_results_per_query"));
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.search.contact_email = "curator@example.org".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "llama3.2:latest");
        assert_eq!(config.taxonomy.theories.len(), 10);
        assert_eq!(config.questions.len(), QUESTION_COUNT);
        assert_eq!(config.questions[0].id, "Q1");
        assert_eq!(config.questions[8].id, "Q9");
        assert_eq!(config.planner.stall_threshold, 3);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output_dir = "out"
verbose = true

[model]
provider = "anthropic"
name = "claude-sonnet-4-20250514"
temperature = 0.2

[search]
source = "arxiv"
max_results_per_query = 10

[planner]
max_iterations = 5
seed_queries = ["telomere", "senolytics"]

[taxonomy]
theories = ["Free Radical Theory", "Telomere Shortening"]
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output_dir, "out");
        assert!(config.general.verbose);
        assert_eq!(config.model.provider, LlmProvider::Anthropic);
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.search.source, SourceKind::Arxiv);
        assert_eq!(config.search.max_results_per_query, 10);
        assert_eq!(config.planner.max_iterations, 5);
        assert_eq!(config.planner.seed_queries, vec!["telomere", "senolytics"]);
        assert_eq!(config.taxonomy.theories.len(), 2);
        // Unspecified sections fall back to defaults.
        assert_eq!(config.questions.len(), QUESTION_COUNT);
        assert_eq!(config.planner.stall_threshold, 3);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[planner]"));
        assert!(toml_str.contains("[[questions]]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.questions.len(), QUESTION_COUNT);
        assert_eq!(reparsed.taxonomy.theories, Config::default().taxonomy.theories);
    }

    #[test]
    fn test_validate_accepts_defaults_with_email() {
        assert_eq!(valid_config().validate(), Ok(()));
    }

    #[test]
    fn test_validate_missing_email() {
        let config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingContactEmail(_))
        ));
    }

    #[test]
    fn test_validate_empty_taxonomy() {
        let mut config = valid_config();
        config.taxonomy.theories = vec!["  ".to_string()];
        assert_eq!(config.validate(), Err(ConfigError::EmptyTaxonomy));
    }

    #[test]
    fn test_validate_duplicate_theory() {
        let mut config = valid_config();
        config.taxonomy.theories = vec![
            "Cellular Senescence".to_string(),
            "cellular  senescence".to_string(),
        ];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateTheory(_))
        ));
    }

    #[test]
    fn test_validate_question_count() {
        let mut config = valid_config();
        config.questions.truncate(8);
        assert_eq!(
            config.validate(),
            Err(ConfigError::QuestionCount {
                expected: 9,
                found: 8
            })
        );
    }

    #[test]
    fn test_validate_api_key_for_anthropic() {
        let mut config = valid_config();
        config.model.provider = LlmProvider::Anthropic;
        config.model.url = "https://api.anthropic.com".to_string();
        assert_eq!(config.validate(), Err(ConfigError::MissingApiKey));

        config.model.api_key = Some("sk-test".to_string());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_zero_budget() {
        let mut config = valid_config();
        config.planner.stall_threshold = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroBudget("stall_threshold"))
        );
    }

    #[test]
    fn test_merge_with_args_overrides_only_given_values() {
        use clap::Parser;

        let mut config = valid_config();
        let args = crate::cli::Args::parse_from([
            "agingcurator",
            "--source",
            "medrxiv",
            "--max-results",
            "20",
            "--query",
            "inflammaging",
            "--output-dir",
            "runs/today",
            "--abstracts-only",
        ]);
        config.merge_with_args(&args);

        assert_eq!(config.search.source, SourceKind::Medrxiv);
        assert_eq!(config.search.max_results_per_query, 20);
        assert!(!config.search.full_text);
        assert_eq!(config.planner.seed_queries, vec!["inflammaging"]);
        assert_eq!(config.general.output_dir, "runs/today");
        assert_eq!(config.planner.max_iterations, 50);
    }

    #[test]
    fn test_anthropic_provider_gets_its_own_endpoint() {
        use clap::Parser;

        let mut config = valid_config();
        let args = crate::cli::Args::parse_from([
            "agingcurator",
            "--provider",
            "anthropic",
            "--api-key",
            "sk-test",
        ]);
        config.merge_with_args(&args);

        assert_eq!(config.model.url, "https://api.anthropic.com");
        if args.model.is_none() {
            assert_eq!(config.model.name, "claude-3-5-haiku-latest");
        }
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_provider_from_file_keeps_explicit_url() {
        let toml_content = r#"
[model]
provider = "anthropic"
"#;
        let mut config: Config = toml::from_str(toml_content).unwrap();
        config.model.apply_provider_defaults();
        assert_eq!(config.model.url, "https://api.anthropic.com");
        assert_eq!(config.model.name, "claude-3-5-haiku-latest");

        let toml_content = r#"
[model]
provider = "anthropic"
url = "https://proxy.internal.example"
name = "claude-sonnet-4-20250514"
"#;
        let mut config: Config = toml::from_str(toml_content).unwrap();
        config.model.apply_provider_defaults();
        assert_eq!(config.model.url, "https://proxy.internal.example");
        assert_eq!(config.model.name, "claude-sonnet-4-20250514");

        let mut ollama = ModelConfig::default();
        ollama.apply_provider_defaults();
        assert_eq!(ollama.url, "http://localhost:11434");
    }
}
