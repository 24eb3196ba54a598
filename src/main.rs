use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use stacksync_lib::analysis::AnalysisReport;
use stacksync_lib::config::{self, EnvironmentConfig};
use stacksync_lib::extract::{DomAccess, DomSnapshot};
use stacksync_lib::monitor::PageMonitor;
use stacksync_lib::state::AppState;

#[derive(Parser)]
#[command(name = "stacksync")]
#[command(about = "Correlate a deployment across log search, source control and CI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings directory (defaults to the platform config dir)
    #[arg(long, global = true, env = config::CONFIG_DIR_ENV)]
    config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one page URL and print its correlations
    Analyze {
        url: String,
        /// DOM snapshot (selector -> nodes JSON) captured from the page
        #[arg(long)]
        dom: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or edit settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Re-analyze whenever the URL stored in a file changes
    Watch { url_file: PathBuf },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print the current settings as JSON
    Show,
    /// Set a scalar setting by its camelCase key
    Set { key: String, value: String },
    /// Manage environments
    Env {
        #[command(subcommand)]
        command: EnvCommand,
    },
}

#[derive(Subcommand)]
enum EnvCommand {
    /// Add an environment, or update it if it exists
    Add(EnvArgs),
    /// Remove an environment
    Remove { name: String },
}

#[derive(Args)]
struct EnvArgs {
    name: String,
    #[arg(long)]
    log_search_url: Option<String>,
    #[arg(long)]
    ci_url: Option<String>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_dir = cli.config_dir.unwrap_or_else(config::config_dir);
    let state = AppState::with_config_dir(config_dir.clone()).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Analyze { url, dom, json } => analyze(&state, &url, dom.as_deref(), json).await,
        Commands::Settings { command } => settings(&state, command),
        Commands::Watch { url_file } => watch_file(Arc::new(state), &url_file).await,
    }
}

async fn analyze(state: &AppState, url: &str, dom_path: Option<&Path>, json: bool) -> Result<()> {
    let dom = match dom_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read DOM snapshot {}", path.display()))?;
            let snapshot: DomSnapshot = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid DOM snapshot {}", path.display()))?;
            Some(snapshot)
        }
        None => None,
    };

    let report = state.analyze(url, dom.as_ref().map(|d| d as &dyn DomAccess)).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    println!("{}", report.url);
    println!("  platform: {}", report.platform);
    println!("  project:  {}", report.project.as_deref().unwrap_or("-"));
    println!("  status:   [{}] {}", report.status.level.as_str(), report.status.message);
    for entry in &report.correlations {
        let marker = if entry.is_current_environment { "*" } else { " " };
        println!("  {marker} {:<36} {}", entry.title, entry.url);
    }
}

fn settings(state: &AppState, command: SettingsCommand) -> Result<()> {
    let mut next = (*state.settings()).clone();
    match command {
        SettingsCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&next)?);
            return Ok(());
        }
        SettingsCommand::Set { key, value } => {
            next.set_key(&key, &value).map_err(anyhow::Error::msg)?;
        }
        SettingsCommand::Env { command } => match command {
            EnvCommand::Add(args) => {
                if args.name.trim().is_empty() {
                    bail!("Environment name must not be empty");
                }
                next.upsert_environment(EnvironmentConfig {
                    name: args.name,
                    log_search_base_url: args.log_search_url,
                    ci_base_url: args.ci_url,
                });
            }
            EnvCommand::Remove { name } => {
                next.remove_environment(&name).map_err(anyhow::Error::msg)?;
            }
        },
    }

    let saved = state.save_settings(&next).map_err(anyhow::Error::msg)?;
    println!("{}", serde_json::to_string_pretty(&*saved)?);
    Ok(())
}

/// Feed the URL stored in `url_file` to the page monitor and print each report.
async fn watch_file(state: Arc<AppState>, url_file: &Path) -> Result<()> {
    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = tokio::spawn(PageMonitor::new(state.clone()).run(report_tx, stop_rx));

    tracing::info!("Watching {} (Ctrl+C to stop)", url_file.display());
    let mut last_url = String::new();
    loop {
        match tokio::fs::read_to_string(url_file).await {
            Ok(contents) => {
                let url = contents.trim();
                if !url.is_empty() && url != last_url {
                    last_url = url.to_string();
                    state.set_active_tab(None, url, None);
                }
            }
            Err(e) => tracing::warn!("Could not read {}: {e}", url_file.display()),
        }

        let interval = Duration::from_millis(state.settings().poll_interval_ms);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            Some(report) = report_rx.recv() => print_report(&report),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let _ = stop_tx.send(true);
    monitor.await.context("Page monitor task failed")?;

    let activity = state.activity(0);
    if !activity.is_empty() {
        println!("\nActivity:");
        for entry in activity {
            let time = chrono::DateTime::from_timestamp_millis(entry.timestamp_ms)
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_default();
            println!("  {time} [{}] {} {}", entry.level.as_str(), entry.message, entry.url);
        }
    }
    Ok(())
}
