//! Command definitions, routing and tracing setup.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use database::KeywordStore;
use embedding_engine::EmbeddingEngine;
use keyharvest_core::{
    CoreError, Credentials, ErrorExt, ErrorReporter, FetchMode, PipelineConfig, SeedKeyword,
    SelectionStrategy, UNCATEGORIZED,
};
use keyword_client::{KeywordApiClient, SeedFetcher};
use keyword_pipeline::{Pipeline, PipelineContext, RunOutcome};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Keyword research pipeline: fetch, score, deduplicate and select keywords.
#[derive(Parser)]
#[command(name = "keyharvest", version, about, long_about = None)]
pub struct Cli {
    /// Dotenv file with RAPIDAPI_KEY, RAPIDAPI_HOST and DB_CONNECTION_STRING.
    #[arg(long, default_value = "secrets.env", global = true)]
    pub env_file: PathBuf,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the selection pipeline once.
    Run {
        /// Pipeline configuration (TOML). Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write the selected keywords as JSON.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the configured selection strategy.
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Override the configured fetch mode.
        #[arg(long, value_enum)]
        fetch_mode: Option<FetchModeArg>,
    },

    /// Print the most recent selections, newest first.
    Top {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },

    /// Manage seed keywords stored in the database.
    Seed {
        #[command(subcommand)]
        action: SeedAction,
    },
}

#[derive(Subcommand)]
pub enum SeedAction {
    /// Add a seed keyword.
    Add {
        keyword: String,

        #[arg(short, long, default_value = UNCATEGORIZED)]
        category: String,
    },
    /// List stored seed keywords.
    List,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StrategyArg {
    Cluster,
    CategoryBalanced,
}

impl From<StrategyArg> for SelectionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Cluster => SelectionStrategy::Cluster,
            StrategyArg::CategoryBalanced => SelectionStrategy::CategoryBalanced,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FetchModeArg {
    Concurrent,
    Sequential,
}

impl From<FetchModeArg> for FetchMode {
    fn from(arg: FetchModeArg) -> Self {
        match arg {
            FetchModeArg::Concurrent => FetchMode::Concurrent,
            FetchModeArg::Sequential => FetchMode::Sequential,
        }
    }
}

/// A missing file is fine; a malformed one is reported and skipped.
pub fn load_env_file(path: &Path) {
    match dotenvy::from_path(path) {
        Ok(()) => {}
        Err(dotenvy::Error::Io(_)) => {}
        Err(e) => warn!("Failed to load {}: {}", path.display(), e),
    }
}

pub fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "info,keyharvest=debug,keyword_pipeline=debug,keyword_client=debug,database=debug,embedding_engine=debug",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            config,
            output,
            strategy,
            fetch_mode,
        } => run_pipeline(config, output, strategy, fetch_mode).await,
        Command::Top { limit } => print_top(limit).await,
        Command::Seed { action } => manage_seeds(action).await,
    }
}

async fn run_pipeline(
    config_path: Option<PathBuf>,
    output: Option<PathBuf>,
    strategy: Option<StrategyArg>,
    fetch_mode: Option<FetchModeArg>,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(path) = output {
        config.output.path = path;
    }
    if let Some(strategy) = strategy {
        config.selection.strategy = strategy.into();
    }
    if let Some(mode) = fetch_mode {
        config.fetch.mode = mode.into();
    }
    config.validate()?;

    let credentials = Credentials::from_env()?;
    info!("Starting keyword run ({:?} selection)", config.selection.strategy);

    let engine = EmbeddingEngine::load(&config.embedding)
        .await
        .map_err(report)?;
    let client = KeywordApiClient::new(&credentials, &config.source).map_err(report)?;
    let fetcher = SeedFetcher::new(client, &config.source, &config.fetch);
    let context = PipelineContext::new(config, engine, credentials.database_url.clone());
    let pipeline = Pipeline::new(context, fetcher);

    let outcome = pipeline.run().await.map_err(report)?;
    log_fetch_metrics(pipeline.fetcher()).await;

    match outcome {
        RunOutcome::Completed(report) => {
            for record in &report.selected {
                println!(
                    "{:<40} score {:.3}  similarity {:.3}  [{}]",
                    record.text, record.score, record.similarity, record.category
                );
            }
            if !report.failed_seeds.is_empty() {
                warn!("Seeds without data: {}", report.failed_seeds.join(", "));
            }
            if let Some(path) = report.output_path {
                println!("Wrote {} keywords to {}", report.selected.len(), path.display());
            }
        }
        RunOutcome::Empty { stage, .. } => println!("Nothing selected: {}", stage),
    }
    Ok(())
}

async fn log_fetch_metrics(fetcher: &SeedFetcher<KeywordApiClient>) {
    let api_metrics = fetcher.source().get_metrics().await;
    info!(
        "Keyword API: {} requests, {} rate limited, {} failed",
        api_metrics.total_requests, api_metrics.rate_limited_requests, api_metrics.failed_requests
    );
    for (endpoint, metrics) in &api_metrics.requests_by_endpoint {
        debug!(
            "  {}: {} requests, {:.0}% ok, avg {:?}, max {:?}",
            endpoint,
            metrics.request_count,
            metrics.success_rate() * 100.0,
            metrics.average_response_time(),
            metrics.max_response_time
        );
    }

    let retries = fetcher.retry_metrics();
    if retries.total_retries > 0 || retries.failed_operations > 0 {
        info!(
            "Retries: {} attempted, {} recovered, {} gave up",
            retries.total_retries, retries.successful_retries, retries.failed_operations
        );
    }
}

async fn open_store() -> Result<KeywordStore> {
    let database_url = Credentials::database_url_from_env()?;
    KeywordStore::open(&database_url)
        .await
        .map_err(report)
        .context("could not open the keyword store")
}

async fn print_top(limit: u32) -> Result<()> {
    let store = open_store().await?;
    let result = store.recent_selections(limit).await;
    store.close().await;

    for keyword in result.map_err(report)? {
        println!("{}", keyword.text);
    }
    Ok(())
}

async fn manage_seeds(action: SeedAction) -> Result<()> {
    let store = open_store().await?;
    let result = match action {
        SeedAction::Add { keyword, category } => store
            .add_seed_keyword(&SeedKeyword::new(keyword.clone(), category))
            .await
            .map(|added| {
                if added {
                    println!("Added seed '{}'", keyword.trim().to_lowercase());
                } else {
                    println!("Seed '{}' already exists", keyword.trim().to_lowercase());
                }
            }),
        SeedAction::List => store.fetch_seed_keywords().await.map(|seeds| {
            for seed in seeds {
                println!("{:<40} {}", seed.text, seed.category);
            }
        }),
    };
    store.close().await;
    result.map_err(report)?;
    Ok(())
}

/// Log a failure the way every command does before handing it to anyhow.
fn report(error: CoreError) -> anyhow::Error {
    ErrorReporter::new().report_error(&error);
    anyhow::anyhow!("{} ({})", error.user_friendly_message(), error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_env_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("keyharvest-{}.env", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_env_file_sets_variables() {
        let path = temp_env_file("KEYHARVEST_CLI_TEST_HOST=example.p.rapidapi.com\n");
        load_env_file(&path);
        assert_eq!(
            std::env::var("KEYHARVEST_CLI_TEST_HOST").unwrap(),
            "example.p.rapidapi.com"
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_or_malformed_env_file_is_not_fatal() {
        load_env_file(Path::new("/nonexistent/keyharvest/secrets.env"));

        let path = temp_env_file("this line has no equals sign\n");
        load_env_file(&path);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_run_overrides_parse() {
        let cli = Cli::try_parse_from([
            "keyharvest",
            "-v",
            "run",
            "--strategy",
            "category-balanced",
            "--fetch-mode",
            "sequential",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        assert_eq!(cli.env_file, PathBuf::from("secrets.env"));
        match cli.command {
            Command::Run {
                strategy,
                fetch_mode,
                config,
                ..
            } => {
                assert!(config.is_none());
                assert_eq!(
                    SelectionStrategy::from(strategy.unwrap()),
                    SelectionStrategy::CategoryBalanced
                );
                assert_eq!(FetchMode::from(fetch_mode.unwrap()), FetchMode::Sequential);
            }
            _ => panic!("expected the run command"),
        }
    }

    #[test]
    fn test_seed_add_defaults_category() {
        let cli = Cli::try_parse_from(["keyharvest", "seed", "add", "cloud gaming"]).unwrap();
        match cli.command {
            Command::Seed {
                action: SeedAction::Add { keyword, category },
            } => {
                assert_eq!(keyword, "cloud gaming");
                assert_eq!(category, UNCATEGORIZED);
            }
            _ => panic!("expected seed add"),
        }
    }
}
