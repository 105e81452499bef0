use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use maestro_core::{
    Orchestrator, OrchestratorConfig, OrchestratorError, ResultEntry, TaskId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "maestro", about = "Maestro - async task orchestrator")]
struct Cli {
    /// Path to config file (optional; defaults apply when missing)
    #[arg(short, long, default_value = "maestro.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit tasks, run them and print the result table
    Run {
        /// Task to submit, as TYPE=JSON (repeatable)
        #[arg(short, long = "task", value_parser = parse_task)]
        tasks: Vec<TaskArg>,
        /// Submit the ticker task every SECS seconds (overrides config)
        #[arg(long, value_name = "SECS")]
        every: Option<u64>,
        /// Stop after SECS seconds
        #[arg(long = "for", value_name = "SECS")]
        run_for: Option<u64>,
        /// Attempts per task (overrides config)
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// List registered agent types
    Agents,
}

#[derive(Debug, Clone, PartialEq)]
struct TaskArg {
    agent_type: String,
    payload: Value,
}

fn parse_task(raw: &str) -> Result<TaskArg, String> {
    let (agent_type, json) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TYPE=JSON, got '{raw}'"))?;
    let payload = if json.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(json).map_err(|e| format!("invalid payload JSON: {e}"))?
    };
    Ok(TaskArg {
        agent_type: agent_type.trim().to_string(),
        payload,
    })
}

#[derive(Debug, Default, Deserialize)]
struct MaestroConfig {
    #[serde(default)]
    orchestrator: OrchestratorConfig,
    #[serde(default)]
    ticker: Option<TickerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct TickerConfig {
    #[serde(default = "default_ticker_agent")]
    agent_type: String,
    #[serde(default = "default_ticker_payload")]
    payload: Value,
    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            agent_type: default_ticker_agent(),
            payload: default_ticker_payload(),
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_ticker_agent() -> String {
    "data".to_string()
}
fn default_ticker_payload() -> Value {
    serde_json::json!({ "symbol": "BTC" })
}
fn default_interval_secs() -> u64 {
    60
}

async fn load_config(path: &Path) -> anyhow::Result<MaestroConfig> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        info!(path = %path.display(), "config file not found; using defaults");
        return Ok(MaestroConfig::default());
    }
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Invalid config file '{}'", path.display()))
}

/// One row of the printed result table.
#[derive(Serialize)]
struct ResultRow {
    task_id: TaskId,
    #[serde(flatten)]
    entry: ResultEntry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let mut config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Agents => {
            let orchestrator = Orchestrator::new(config.orchestrator)?;
            for agent_type in orchestrator.registry().agent_types() {
                println!("{agent_type}");
            }
        }
        Commands::Run {
            tasks,
            every,
            run_for,
            max_attempts,
        } => {
            if let Some(n) = max_attempts {
                config.orchestrator.retry.max_attempts = n;
            }
            let ticker = match (every, config.ticker) {
                (Some(secs), ticker) => Some(TickerConfig {
                    interval_secs: secs,
                    ..ticker.unwrap_or_default()
                }),
                (None, ticker) => ticker,
            };
            if let Some(t) = &ticker
                && t.interval_secs == 0
            {
                bail!("ticker interval must be at least 1 second");
            }

            let orchestrator = Arc::new(Orchestrator::new(config.orchestrator)?);
            run(orchestrator, tasks, ticker, run_for.map(Duration::from_secs)).await?;
        }
    }

    Ok(())
}

async fn run(
    orchestrator: Arc<Orchestrator>,
    tasks: Vec<TaskArg>,
    ticker: Option<TickerConfig>,
    run_for: Option<Duration>,
) -> anyhow::Result<()> {
    let deadline = run_for.map(|d| Instant::now() + d);

    // 先に run loop を起動する。bounded queue は loop が回らないと空かない
    let run_loop = orchestrator.spawn();

    let mut stopped = false;
    let submitted = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            stopped = true;
            res.context("Failed to listen for Ctrl-C").map(|()| info!("interrupted"))
        }
        _ = sleep_until_or_forever(deadline) => {
            stopped = true;
            info!("time limit reached");
            Ok(())
        }
        res = submit_all(&orchestrator, tasks) => res,
    };

    if submitted.is_ok() && !stopped {
        let ticker_handle = ticker.map(|t| spawn_ticker(orchestrator.clone(), t));
        let keep_running = ticker_handle.is_some();

        let waited = tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for Ctrl-C").map(|()| info!("interrupted"))
            }
            _ = sleep_until_or_forever(deadline) => {
                info!("time limit reached");
                Ok(())
            }
            _ = all_settled(&orchestrator), if !keep_running => Ok(()),
        };

        if let Some(handle) = ticker_handle {
            handle.abort();
        }
        if let Err(err) = waited {
            warn!(error = %err, "stopping early");
        }
    }

    orchestrator.shutdown().await;
    run_loop.await.context("run loop task failed")??;
    submitted?;

    let counts = orchestrator.counts();
    info!(
        total = counts.total(),
        completed = counts.completed,
        failed = counts.failed,
        pending = counts.pending,
        "orchestrator finished"
    );

    let rows: Vec<ResultRow> = orchestrator
        .snapshot()
        .into_iter()
        .map(|(task_id, entry)| ResultRow { task_id, entry })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn submit_all(orchestrator: &Orchestrator, tasks: Vec<TaskArg>) -> anyhow::Result<()> {
    for task in tasks {
        let id = orchestrator
            .add_task(&task.agent_type, task.payload)
            .await
            .with_context(|| format!("Failed to submit '{}' task", task.agent_type))?;
        info!(task_id = %id, agent_type = %task.agent_type, "task submitted");
    }
    Ok(())
}

/// Submits the configured task on every tick until the orchestrator stops
/// accepting work.
fn spawn_ticker(orchestrator: Arc<Orchestrator>, ticker: TickerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            agent_type = %ticker.agent_type,
            interval_secs = ticker.interval_secs,
            "ticker started"
        );
        let mut interval = tokio::time::interval(Duration::from_secs(ticker.interval_secs));
        loop {
            interval.tick().await;
            match orchestrator
                .add_task(&ticker.agent_type, ticker.payload.clone())
                .await
            {
                Ok(id) => info!(task_id = %id, "ticker submitted task"),
                Err(OrchestratorError::ShuttingDown) => break,
                Err(e) => warn!(error = %e, "ticker failed to submit task"),
            }
        }
    })
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn all_settled(orchestrator: &Orchestrator) {
    while orchestrator.counts().pending > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
