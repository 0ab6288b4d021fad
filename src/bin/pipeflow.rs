//! pipeflow - validate and run workflow graphs from the command line.
//!
//! Usage:
//!   pipeflow validate graph.json
//!   pipeflow run graph.json --secrets secrets.json --concurrency 2
//!   pipeflow status <run-id>
//!   pipeflow cancel <run-id>
//!
//! `run` keeps the latest snapshot of its run in `<state-dir>/<run-id>.json`
//! and cancels the run when `<state-dir>/<run-id>.cancel` appears, which is
//! what `status` and `cancel` read and write from another process.

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pipeflow::{Config, Engine, EngineBuilder, EnvSecretStore, Event, GraphModel, MemSecretStore, PipeflowError, RunSnapshot, RunStatus, SecretStore, validate};

const EXIT_FAILED: u8 = 1;
const EXIT_INVALID: u8 = 2;
const EXIT_CANCELLED: u8 = 3;

/// How often `run` looks for a cancel marker.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "pipeflow", version, about = "Run visually authored workflow graphs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a graph and print its execution order
    Validate {
        /// Path to the graph JSON file
        graph: PathBuf,
    },
    /// Execute a graph and stream its events
    Run(RunArgs),
    /// Print the last known snapshot of a run
    Status {
        run_id: String,
        #[arg(long, default_value = ".pipeflow")]
        state_dir: PathBuf,
    },
    /// Ask a running `pipeflow run` to cancel its run
    Cancel {
        run_id: String,
        #[arg(long, default_value = ".pipeflow")]
        state_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the graph JSON file
    graph: PathBuf,

    /// Engine config (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON object of secret id -> value; environment variables are used otherwise
    #[arg(short, long)]
    secrets: Option<PathBuf>,

    /// Maximum nodes in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Seed for retry backoff jitter
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = ".pipeflow")]
    state_dir: PathBuf,

    /// Print events as JSON lines
    #[arg(long, default_value = "false")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate {
            graph,
        } => validate_graph(&graph),
        Command::Run(args) => run(args).await,
        Command::Status {
            run_id,
            state_dir,
        } => status(&run_id, &state_dir),
        Command::Cancel {
            run_id,
            state_dir,
        } => cancel(&run_id, &state_dir),
    }
}

fn load_graph(path: &Path) -> Result<GraphModel> {
    let data = fs::read_to_string(path).with_context(|| format!("failed to read graph {}", path.display()))?;
    Ok(GraphModel::from_json(&data)?)
}

fn validate_graph(path: &Path) -> Result<ExitCode> {
    let graph = load_graph(path)?;
    match validate(&graph) {
        Ok(workflow) => {
            for warning in workflow.warnings() {
                println!("warning: {}", warning);
            }
            println!("{}", workflow.schema());
            Ok(ExitCode::SUCCESS)
        }
        Err(errors) => {
            for error in &errors {
                println!("error: {}", error);
            }
            Ok(ExitCode::from(EXIT_INVALID))
        }
    }
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let graph = load_graph(&args.graph)?;

    let mut config = match &args.config {
        Some(path) => Config::create(path)?,
        None => Config::default(),
    };
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(seed) = args.seed {
        config.jitter_seed = Some(seed);
    }

    let secrets: Arc<dyn SecretStore> = match &args.secrets {
        Some(path) => {
            let data = fs::read_to_string(path).with_context(|| format!("failed to read secrets {}", path.display()))?;
            Arc::new(MemSecretStore::from_json(&data)?)
        }
        None => Arc::new(EnvSecretStore::default()),
    };

    let engine = Arc::new(EngineBuilder::new().config(config).secret_store(secrets).build()?);
    engine.launch();

    let run_id = match engine.submit(&graph) {
        Ok(run_id) => run_id,
        Err(PipeflowError::Validation(errors)) => {
            for error in &errors {
                eprintln!("error: {}", error);
            }
            return Ok(ExitCode::from(EXIT_INVALID));
        }
        Err(err) => return Err(err.into()),
    };

    fs::create_dir_all(&args.state_dir).with_context(|| format!("failed to create state dir {}", args.state_dir.display()))?;
    info!("run {} submitted", run_id);
    if !args.json {
        println!("run {}", run_id);
    }

    spawn_cancel_watchers(engine.clone(), run_id.clone(), cancel_marker(&args.state_dir, &run_id));

    let mut events = engine.subscribe(&run_id)?;
    while let Some(event) = events.next().await {
        print_event(&event, args.json)?;
        write_snapshot(&args.state_dir, &engine.status(&run_id)?)?;
    }

    let snapshot = engine.wait(&run_id).await?;
    write_snapshot(&args.state_dir, &snapshot)?;
    let _ = fs::remove_file(cancel_marker(&args.state_dir, &run_id));
    engine.shutdown();

    Ok(match snapshot.status {
        RunStatus::Succeeded => ExitCode::SUCCESS,
        RunStatus::Cancelled => ExitCode::from(EXIT_CANCELLED),
        _ => ExitCode::from(EXIT_FAILED),
    })
}

/// Cancel the run on Ctrl-C or once the cancel marker shows up.
fn spawn_cancel_watchers(
    engine: Arc<Engine>,
    run_id: String,
    marker: PathBuf,
) {
    let ctrl_c_engine = engine.clone();
    let ctrl_c_run = run_id.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run {}", ctrl_c_run);
            let _ = ctrl_c_engine.cancel(&ctrl_c_run);
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CANCEL_POLL_INTERVAL);
        loop {
            interval.tick().await;
            if marker.exists() {
                info!("cancel marker found for run {}", run_id);
                let _ = engine.cancel(&run_id);
                break;
            }
            if engine.status(&run_id).map(|s| s.is_terminal()).unwrap_or(true) {
                break;
            }
        }
    });
}

fn print_event(
    event: &Event,
    json: bool,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        match &event.nid {
            Some(nid) => println!("[{:>4}] {:<14} {}", event.seq, event.name(), nid),
            None => println!("[{:>4}] {}", event.seq, event.name()),
        }
    }
    Ok(())
}

fn snapshot_path(
    state_dir: &Path,
    run_id: &str,
) -> PathBuf {
    state_dir.join(format!("{}.json", run_id))
}

fn cancel_marker(
    state_dir: &Path,
    run_id: &str,
) -> PathBuf {
    state_dir.join(format!("{}.cancel", run_id))
}

fn write_snapshot(
    state_dir: &Path,
    snapshot: &RunSnapshot,
) -> Result<()> {
    let path = snapshot_path(state_dir, &snapshot.id);
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
    fs::rename(&tmp, &path).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn read_snapshot(
    state_dir: &Path,
    run_id: &str,
) -> Result<RunSnapshot> {
    let path = snapshot_path(state_dir, run_id);
    let data = fs::read_to_string(&path).map_err(|_| anyhow!("run '{}' not found in {}", run_id, state_dir.display()))?;
    Ok(serde_json::from_str(&data)?)
}

fn status(
    run_id: &str,
    state_dir: &Path,
) -> Result<ExitCode> {
    let snapshot = read_snapshot(state_dir, run_id)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(ExitCode::SUCCESS)
}

fn cancel(
    run_id: &str,
    state_dir: &Path,
) -> Result<ExitCode> {
    let snapshot = read_snapshot(state_dir, run_id)?;
    if snapshot.is_terminal() {
        println!("run {} already {}", run_id, snapshot.status);
        return Ok(ExitCode::SUCCESS);
    }
    fs::write(cancel_marker(state_dir, run_id), b"")?;
    println!("cancel requested for run {}", run_id);
    Ok(ExitCode::SUCCESS)
}
