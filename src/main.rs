//! agingcurator - LLM-assisted curation of aging-theory literature
//!
//! A CLI tool that searches a literature database, classifies papers
//! against a fixed taxonomy of aging theories with a language model,
//! extracts answers to nine curation questions and exports three
//! relational CSV tables plus supplementary per-paper detail.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Configuration or runtime error (no output written on config errors)

mod agent;
mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod report;
mod sources;

use agent::{ChatClient, LlmAnnotator, PlannerDecision, QueryPlanner, Taxonomy};
use anyhow::{Context, Result};
use cli::Args;
use config::{Config, CONFIG_FILE_NAME};
use sources::LiteratureSource;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // .env may carry CURATOR_EMAIL / ANTHROPIC_API_KEY for the env fallbacks.
    let dotenv = dotenvy::dotenv();

    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let (mut config, config_path) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("agingcurator v{}", env!("CARGO_PKG_VERSION"));
    match config_path {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }
    debug!("Arguments: {:?}", args);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        eprintln!("\n❌ Configuration error: {}", e);
        std::process::exit(1);
    }

    match run_curation(&args, config).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Curation failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .agingcurator.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the source, model, taxonomy, questions and budgets.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from the explicit path, the default file, or defaults.
///
/// A config file that exists but does not parse is an error.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, Some(config_path.clone())));
    }

    match Config::load_default()? {
        Some(config) => Ok((config, Some(PathBuf::from(CONFIG_FILE_NAME)))),
        None => Ok((Config::default(), None)),
    }
}

/// Run the complete curation workflow. Returns the exit code.
async fn run_curation(args: &Args, config: Config) -> Result<i32> {
    let source = sources::build_source(&config.search).context("Failed to set up source client")?;

    if args.dry_run {
        let mut planner = QueryPlanner::new(&config.planner, &config.taxonomy.theories);
        return handle_dry_run(source.as_ref(), &mut planner, &config).await;
    }

    println!("🤖 Initializing curator...");
    println!("   Source: {}", source.name());
    println!("   Model: {} ({})", config.model.name, config.model.provider);
    println!("   Endpoint: {}", config.model.url);
    println!(
        "   Budget: {} iterations, stop after {} without new papers",
        config.planner.max_iterations, config.planner.stall_threshold
    );
    println!("   Taxonomy: {} theories", config.taxonomy.theories.len());

    let client = ChatClient::new(config.model.clone()).context("Failed to set up LLM client")?;
    let annotator = LlmAnnotator::new(
        client,
        Taxonomy::new(&config.taxonomy.theories),
        config.model.max_text_chars,
    );

    println!("\n🔬 Searching and annotating...\n");
    let run = pipeline::run_pipeline(&config, &*source, &annotator, !args.quiet).await?;
    let stats = &run.outcome.stats;

    println!("\n📊 Curation Summary:");
    println!("   Stopped: {}", run.outcome.stop_reason);
    println!(
        "   Iterations: {} | Queries: {} | Candidates: {}",
        stats.iterations, stats.queries_issued, stats.candidates_seen
    );
    println!(
        "   Papers: {} collected | {} rejected | {} skipped",
        stats.papers_accepted, stats.papers_rejected, stats.papers_failed
    );
    println!(
        "   Theories: {} | Annotations: {}",
        run.tables.theory_count(),
        run.tables.annotation_count()
    );
    println!("   Duration: {:.1}s", run.metadata.duration_seconds);
    println!("\n✅ Curation complete! Output:");
    for path in run.exports.all().into_iter().chain([&run.summary]) {
        println!("   📄 {}", path.display());
    }

    Ok(0)
}

/// Handle --dry-run: search the first batch, print candidates, exit.
async fn handle_dry_run(
    source: &dyn LiteratureSource,
    planner: &mut QueryPlanner,
    config: &Config,
) -> Result<i32> {
    println!("\n🔍 Dry run: searching the first batch (no LLM calls)...\n");

    let queries = match planner.next_batch() {
        PlannerDecision::Queries(queries) => queries,
        PlannerDecision::Exhausted(reason) => {
            println!("   Nothing to search: {}", reason);
            return Ok(0);
        }
    };

    for query in &queries {
        match source
            .search(query, config.search.max_results_per_query)
            .await
        {
            Ok(ids) => {
                println!("   Query {:?}: {} candidates", query, ids.len());
                for id in ids.iter().take(10) {
                    println!("     📄 {}", id);
                }
                if ids.len() > 10 {
                    println!("     ... and {} more", ids.len() - 10);
                }
            }
            Err(e) => println!("   Query {:?} failed: {}", query, e),
        }
    }

    println!(
        "\n   {} more queries planned after this batch.",
        planner.remaining()
    );
    println!("\n✅ Dry run complete. No LLM calls were made and no files were written.");
    Ok(0)
}
