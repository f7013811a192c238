use analytics::{AnalyticsEngine, PerformanceSummary};
use anyhow::{Context, anyhow};
use api_client::{ContentHash, HttpSessionClient, SessionApi};
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::{Config, SessionOverrides, init_tracing, load_config};
use core_types::SessionState;
use engine::{LaunchedRun, RunSupervisor, SessionEvent};
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// The main entry point for the backtest client.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // TBOT__* overrides may live in a .env file; it is optional.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Commands::Run(args) = &cli.command {
        config.apply_overrides(&args.overrides);
        config.validate()?;
    }
    let _log_guard = init_tracing(&config.logging);

    let client = HttpSessionClient::from_config(&config.server)?;

    match cli.command {
        Commands::Algos => handle_algos(&client).await,
        Commands::Code { name } => {
            print!("{}", client.fetch_algorithm_code(&name).await?);
            Ok(())
        }
        Commands::Submit(args) => handle_submit(&client, &args.file, args.run).await,
        Commands::Verify { file } => handle_verify(&client, &file).await,
        Commands::Run(args) => handle_run(args, config, Arc::new(client)).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A command-line client for a remote backtest server.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file (default: ./config.toml if present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the algorithms stored on the server.
    Algos,
    /// Print the source of a stored algorithm.
    Code {
        /// The algorithm name, as listed by `algos`.
        name: String,
    },
    /// Submit an algorithm file and check the server's hash of it.
    Submit(SubmitArgs),
    /// Ask the server to hash an algorithm file without storing it.
    Verify {
        file: PathBuf,
    },
    /// Run a backtest and stream its performance series.
    Run(RunArgs),
}

#[derive(Parser)]
struct SubmitArgs {
    file: PathBuf,

    /// Also start the algorithm on the server.
    #[arg(long)]
    run: bool,
}

#[derive(Parser)]
struct RunArgs {
    /// The algorithm source file to run.
    file: PathBuf,

    #[command(flatten)]
    overrides: SessionOverrides,
}

// ==============================================================================
// Algorithm Commands
// ==============================================================================

async fn handle_algos(client: &HttpSessionClient) -> anyhow::Result<()> {
    let names = client.list_algorithms().await?;
    if names.is_empty() {
        println!("No algorithms stored on {}.", client.base_url());
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

async fn read_source(file: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}

async fn handle_submit(client: &HttpSessionClient, file: &Path, run: bool) -> anyhow::Result<()> {
    let source = read_source(file).await?;
    let hash = client.submit_algorithm_code(&source, run).await?;
    report_hash(&source, &hash)
}

async fn handle_verify(client: &HttpSessionClient, file: &Path) -> anyhow::Result<()> {
    let source = read_source(file).await?;
    let hash = client.verify_submission(&source).await?;
    report_hash(&source, &hash)
}

fn report_hash(source: &str, server_hash: &ContentHash) -> anyhow::Result<()> {
    let local = ContentHash::of(source);
    println!("Server hash: {}", server_hash);
    println!("Local hash:  {}", local);
    if server_hash.matches(&local) {
        println!("The server received the file intact.");
        Ok(())
    } else {
        Err(anyhow!("hash mismatch: the server received different content"))
    }
}

// ==============================================================================
// Run Command
// ==============================================================================

/// Streams one run to the terminal and prints its summary.
async fn handle_run(args: RunArgs, config: Config, api: Arc<dyn SessionApi>) -> anyhow::Result<()> {
    let source = read_source(&args.file).await?;
    let mode = config.session.mode;
    tracing::info!(file = %args.file.display(), %mode, base_url = %config.server.base_url, "Starting run.");

    let mut supervisor = RunSupervisor::new(api, config);
    let LaunchedRun { handle, mut events } = supervisor.launch(source, mode).await;

    let interrupt = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted. Closing the session.");
            interrupt.close();
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(120));

    let mut received = 0usize;
    loop {
        match events.recv().await {
            Ok(SessionEvent::StateChanged(state)) => spinner.set_message(format!("{}", state)),
            Ok(SessionEvent::SeriesStarted { title, origin, .. }) => {
                tracing::info!(?title, %origin, "Series started.");
            }
            Ok(SessionEvent::PointAppended(point)) => {
                received += 1;
                tracing::info!(date = %point.date, fields = ?point.fields, "Point received.");
                spinner.set_message(format!("{} points, last {}", received, point.date));
            }
            Ok(SessionEvent::Finished { points }) => {
                spinner.finish_with_message(format!("Finished with {} points.", points));
            }
            Ok(SessionEvent::Failed(report)) => {
                spinner.abandon_with_message(format!("Failed: {}", report));
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Display fell behind the stream.");
            }
            Err(RecvError::Closed) => break,
        }
    }
    if !spinner.is_finished() {
        spinner.finish_and_clear();
    }

    let outcome = supervisor
        .join()
        .await
        .ok_or_else(|| anyhow!("the run task did not complete"))?;

    match outcome.state {
        SessionState::Finished => {
            match AnalyticsEngine::new().summarize(&outcome.points, None) {
                Some(summary) => println!("{}", summary_table(&summary)),
                None => println!("The run finished without any data points."),
            }
            Ok(())
        }
        SessionState::Failed => match outcome.failure {
            Some(report) => Err(anyhow!("run failed: {}", report)),
            None => Err(anyhow!("run failed")),
        },
        state => Err(anyhow!("run ended in state {} after {} points", state, outcome.points.len())),
    }
}

fn summary_table(summary: &PerformanceSummary) -> Table {
    let pct = |value: Option<Decimal>| match value {
        Some(value) => format!("{:.2}%", value),
        None => "n/a".to_string(),
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Field".to_string(), summary.field.clone()]);
    table.add_row(vec!["Points".to_string(), summary.points.to_string()]);
    table.add_row(vec![
        "Period".to_string(),
        format!("{} to {}", summary.first_date, summary.last_date),
    ]);
    table.add_row(vec!["First value".to_string(), summary.first_value.to_string()]);
    table.add_row(vec!["Last value".to_string(), summary.last_value.to_string()]);
    table.add_row(vec!["Change".to_string(), summary.change.to_string()]);
    table.add_row(vec!["Total return".to_string(), pct(summary.total_return_pct)]);
    table.add_row(vec!["Peak".to_string(), summary.peak_value.to_string()]);
    table.add_row(vec!["Max drawdown".to_string(), summary.max_drawdown.to_string()]);
    table.add_row(vec!["Max drawdown %".to_string(), pct(summary.max_drawdown_pct)]);
    table
}
