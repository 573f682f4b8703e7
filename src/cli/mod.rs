//! Command-line interface: resume or start an experiment, drain it, report.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::adapters::sqlite::{initialize_database, PoolConfig, SqliteDuelQueue, SqliteResultStore};
use crate::adapters::substrates::ModelRegistry;
use crate::domain::models::{CompetitionTemplate, Config};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::LoggerImpl;
use crate::services::{ExperimentBuilder, ScoreReport};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "duel-arena")]
#[command(about = "Round-robin LLM duels: every model answers, every model grades", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Experiment name; state lives in <data_dir>/<experiment_id>.db
    #[arg(short, long)]
    pub experiment_id: String,

    /// Competition: problem_solving, creative_writing or debate_persuasion
    #[arg(short, long)]
    pub template_id: String,

    /// Comma separated provider:model list (required for a new experiment)
    #[arg(short, long, value_delimiter = ',')]
    pub models: Vec<String>,

    /// Concurrent duels (defaults to scheduler.workers or the number of models)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Config file (defaults to arena.yaml / arena.local.yaml in the working directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the score snapshot as JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

fn validate_experiment_id(experiment_id: &str) -> Result<()> {
    let valid = !experiment_id.is_empty()
        && experiment_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !experiment_id.starts_with('.');
    if !valid {
        anyhow::bail!("experiment id '{experiment_id}' may only contain letters, digits, '-', '_' and '.'");
    }
    Ok(())
}

/// Resume or start the experiment, drain its queue and print the report.
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let _logger = LoggerImpl::init(&config.logging)?;

    validate_experiment_id(&cli.experiment_id)?;
    CompetitionTemplate::from_id(&cli.template_id)?;

    let registry = ModelRegistry::with_defaults(&config.providers);
    if !cli.models.is_empty() {
        registry.validate(&cli.models)?;
    }

    let database_url = config.database.experiment_url(&cli.experiment_id);
    let pool_config = PoolConfig {
        max_connections: config.database.max_connections,
        ..PoolConfig::default()
    };
    let pool = initialize_database(&database_url, Some(pool_config))
        .await
        .with_context(|| format!("Failed to open {database_url}"))?;
    info!(experiment = %cli.experiment_id, database = %database_url, "Experiment database ready");

    let scheduler = ExperimentBuilder::new(
        cli.models.clone(),
        &cli.template_id,
        Arc::new(registry),
        Arc::new(SqliteDuelQueue::new(pool.clone())),
        Arc::new(SqliteResultStore::new(pool.clone())),
    )
    .with_plan(config.plan.clone())
    .with_retry(config.retry.clone())
    .with_scheduler_config(config.scheduler.clone())
    .create()
    .await?;

    let jobs = cli.jobs.unwrap_or_else(|| scheduler.default_workers());
    let scores = scheduler.run(jobs).await?;

    let report = ScoreReport::new(
        scheduler.template().clone(),
        scheduler.experiment().worker_ids.clone(),
        scores,
    );
    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.render());
    }

    if config.report.write_json {
        let path = report.write_json(Path::new(&config.report.output_dir))?;
        info!(path = %path.display(), "Score snapshot written");
    }

    pool.close().await;
    Ok(())
}

/// Print the error chain and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        eprintln!("{}", serde_json::json!({ "error": err.to_string(), "causes": chain }));
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1)
}
