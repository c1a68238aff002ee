//! matchday-ai - Match analysis batch runner
//!
//! Runs the pre-match prediction batch and the post-match analysis batch
//! against the Gemini API, and offers small maintenance commands for the
//! settings table, the competition filter and stored results.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use matchday_ai::config::{resolve_gemini_api_key, AnalysisConfig};
use matchday_ai::db::{self, competitions, settings, PredictionStore, SqlitePredictionStore};
use matchday_ai::models::{FindOptions, RecordFilter, RecordStatus, SortField, TaskKind};
use matchday_ai::services::{
    gemini_client, BatchOrchestrator, ChunkedConversation, GeminiClient, HttpMatchSource, RateGate,
};
use matchday_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use matchday_common::time::{parse_match_date, Clock, SystemClock};

/// Command-line arguments for matchday-ai
#[derive(Parser, Debug)]
#[command(name = "matchday-ai")]
#[command(about = "Rate-limited Gemini analysis of football fixtures")]
#[command(version)]
struct Cli {
    /// Root folder holding matchday.db (overrides MATCHDAY_ROOT_FOLDER and TOML)
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// Path to the TOML config file
    #[arg(long, global = true, env = "MATCHDAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pre-match prediction batch
    Predict,

    /// Run the post-match analysis batch for one match date
    PostMatch {
        /// Match date, DD-MM-YYYY
        #[arg(long)]
        date: String,
    },

    /// Print stored records as JSON
    Results {
        /// Match date, DD-MM-YYYY
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        id: Option<i64>,
        /// Record status, e.g. analysis_complete
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "50")]
        limit: i64,
    },

    /// Inspect or edit analysis parameters
    Param {
        #[command(subcommand)]
        action: ParamAction,
    },

    /// Maintain the active competition filter
    Competition {
        #[command(subcommand)]
        action: CompetitionAction,
    },
}

#[derive(Subcommand, Debug)]
enum ParamAction {
    Get { key: String },
    Set { key: String, value: String },
    List,
}

#[derive(Subcommand, Debug)]
enum CompetitionAction {
    Add { name: String },
    Remove { name: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let toml_config =
        TomlConfig::load(cli.config.as_deref()).context("Failed to load config file")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &toml_config.logging.level;
                format!("matchday_ai={},matchday_common={}", level, level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting matchday-ai"
    );

    // Resolve root folder and open the database
    let root_folder = RootFolderResolver::new(cli.root_folder.clone(), &toml_config).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    match cli.command {
        Command::Predict => run_analysis(&pool, &toml_config, TaskKind::PreMatch, None).await,
        Command::PostMatch { date } => {
            if parse_match_date(&date).is_none() {
                bail!("Invalid date '{}': expected DD-MM-YYYY", date);
            }
            run_analysis(&pool, &toml_config, TaskKind::PostMatch, Some(date)).await
        }
        Command::Results {
            date,
            id,
            status,
            limit,
        } => print_results(&pool, date, id, status, limit).await,
        Command::Param { action } => param_command(&pool, action).await,
        Command::Competition { action } => competition_command(&pool, action).await,
    }
}

async fn run_analysis(
    pool: &SqlitePool,
    toml_config: &TomlConfig,
    kind: TaskKind,
    date: Option<String>,
) -> Result<()> {
    // Configuration problems abort before any work item is touched
    let config = AnalysisConfig::load(pool, kind)
        .await
        .context("Analysis configuration is incomplete")?;
    let api_key = resolve_gemini_api_key(pool, toml_config).await?;

    let timeout = toml_config
        .request_timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(gemini_client::DEFAULT_TIMEOUT);

    let gemini = GeminiClient::new(api_key, toml_config.gemini_base_url.clone(), timeout)?;
    let source = HttpMatchSource::new(timeout)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gate = Arc::new(RateGate::new(clock.clone()));
    let conversation = ChunkedConversation::new(Arc::new(gemini), gate, timeout);
    let store = SqlitePredictionStore::from_settings(pool.clone()).await?;
    let orchestrator =
        BatchOrchestrator::new(Arc::new(store), Arc::new(source), conversation, clock);

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, finishing current step and stopping");
            watcher.cancel();
        }
    });

    let summary = match (kind, date) {
        (TaskKind::PreMatch, _) => {
            let active = competitions::active_competitions(pool).await?;
            orchestrator
                .run_prediction_batch(&config, &active, &cancel)
                .await?
        }
        (TaskKind::PostMatch, Some(date)) => {
            orchestrator
                .run_post_match_batch(&date, &config, &cancel)
                .await?
        }
        (TaskKind::PostMatch, None) => bail!("Post-match run requires a date"),
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn print_results(
    pool: &SqlitePool,
    date: Option<String>,
    id: Option<i64>,
    status: Option<String>,
    limit: i64,
) -> Result<()> {
    let status = status
        .map(|s| s.parse::<RecordStatus>().map_err(anyhow::Error::msg))
        .transpose()?;

    let filter = RecordFilter {
        id,
        date,
        status,
        ..Default::default()
    };
    let options = FindOptions {
        limit: Some(limit),
        sort: SortField::KickoffTime,
        ..Default::default()
    };

    let store = SqlitePredictionStore::from_settings(pool.clone()).await?;
    let records = store.find_many(&filter, &options).await?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn param_command(pool: &SqlitePool, action: ParamAction) -> Result<()> {
    match action {
        ParamAction::Get { key } => match settings::get_setting::<String>(pool, &key).await? {
            Some(value) => println!("{}", display_value(&key, &value)),
            None => println!("{} is not set", key),
        },
        ParamAction::Set { key, value } => {
            settings::set_setting(pool, &key, &value).await?;
            info!(key = %key, "Parameter updated");
        }
        ParamAction::List => {
            for (key, value) in settings::list_settings(pool).await? {
                println!("{} = {}", key, display_value(&key, &value));
            }
        }
    }
    Ok(())
}

/// Hide secrets when echoing settings
fn display_value(key: &str, value: &str) -> String {
    if key == settings::KEY_GEMINI_API_KEY {
        "********".to_string()
    } else {
        value.to_string()
    }
}

async fn competition_command(pool: &SqlitePool, action: CompetitionAction) -> Result<()> {
    match action {
        CompetitionAction::Add { name } => competitions::add_competition(pool, &name).await?,
        CompetitionAction::Remove { name } => {
            if !competitions::remove_competition(pool, &name).await? {
                bail!("Competition '{}' is not listed", name);
            }
        }
        CompetitionAction::List => {
            for competition in competitions::list_competitions(pool).await? {
                let marker = if competition.active { "active" } else { "inactive" };
                println!("{} ({})", competition.name, marker);
            }
        }
    }
    Ok(())
}
