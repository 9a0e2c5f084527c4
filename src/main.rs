use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use impact_ingest::config::Config;
use impact_ingest::ingest::IngestionOrchestrator;
use impact_ingest::jobs::{JobManager, JobState};
use impact_ingest::paths::PlatformPaths;
use impact_ingest::types::IngestRequest;
use std::path::PathBuf;
use std::sync::Arc;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ", embedders: ",
    env!("EMBEDDING_BACKENDS"),
    ")"
);

#[derive(Parser)]
#[command(name = "impact-ingest", version, long_version = LONG_VERSION)]
#[command(about = "Ingest a git repository into a vector index and a code graph")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one repository and print the result as JSON
    Ingest {
        /// Public repository URL, `owner/repo`, or a local path
        #[arg(value_name = "REPO_URL")]
        repo_url: String,

        /// Access token (private repositories are not supported)
        #[arg(long)]
        token: Option<String>,

        /// Configuration file (defaults to the platform config path)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Keep both stores in memory instead of connecting to Qdrant and Neo4j
        #[arg(long)]
        in_memory: bool,

        /// Log at debug level
        #[arg(short, long)]
        verbose: bool,
    },
    /// Write the default configuration file
    Config {
        /// Where to write it (defaults to the platform config path)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Ingest { verbose: true, .. });
    tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ingest {
            repo_url,
            token,
            config,
            in_memory,
            ..
        } => ingest(IngestRequest { repo_url, token }, config, in_memory).await,
        Commands::Config { path } => {
            let path = path.unwrap_or_else(PlatformPaths::default_config_path);
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            Config::default().save(&path)?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

async fn ingest(request: IngestRequest, config_path: Option<PathBuf>, in_memory: bool) -> Result<()> {
    let mut config = match config_path {
        Some(path) => Config::from_file(&path)?,
        None => Config::load_or_default()?,
    };
    config.apply_env_overrides();
    config.validate()?;

    let orchestrator = if in_memory {
        IngestionOrchestrator::in_memory(&config)?
    } else {
        IngestionOrchestrator::from_config(&config)?
    };
    let manager = JobManager::new(Arc::new(orchestrator), config.jobs.max_concurrent);

    let id = manager.submit(request).await?;
    let status = tokio::select! {
        status = manager.wait(id) => status.context("job disappeared")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling job {}", id);
            manager.cancel(id).await;
            manager.wait(id).await.context("job disappeared")?
        }
    };

    println!("{}", serde_json::to_string_pretty(&status)?);
    if status.state != JobState::Done {
        std::process::exit(1);
    }
    Ok(())
}
