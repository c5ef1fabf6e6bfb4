//! ams-replicate CLI - replicate a media account into another account.

use ams_replicate::{Config, Orchestrator, ReplicateError, RunStatus};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "ams-replicate")]
#[command(about = "Replicate a media account's resources and blobs into another account")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Directory for per-run log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the replication pipeline
    Run {
        /// List, diff and report without creating or copying anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Test credentials and account visibility on both sides
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), ReplicateError> {
    let cli = Cli::parse();

    let log_file = setup_logging(&cli.verbosity, &cli.log_format, &cli.log_dir)?;
    info!("Logging to {:?}", log_file);

    let config = Config::load(&cli.config)?.with_auto_tuning();
    info!("Loaded configuration from {:?}", cli.config);

    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Run { dry_run } => {
            let orchestrator = Orchestrator::new(config)?;
            let report = orchestrator.run(cancel_token, dry_run).await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                let heading = if dry_run {
                    "Dry run completed!"
                } else {
                    "Replication done!"
                };
                println!("\n{}", heading);
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds);
                for kind in &report.kinds {
                    println!(
                        "  {}: {} created, {} already present, {} failed",
                        kind.kind,
                        kind.created,
                        kind.already_present,
                        kind.failed.len()
                    );
                }
                println!(
                    "  Assets: {}/{}",
                    report.assets.assets_replicated, report.assets.assets_total
                );
                println!(
                    "  Blobs: {} copied, {} already present, {} failed",
                    report.assets.blobs_copied,
                    report.assets.blobs_already_present,
                    report.assets.blobs_failed
                );
                if !report.failures.is_empty() {
                    println!("  Failures:");
                    for failure in &report.failures {
                        println!("    {} '{}': {}", failure.kind, failure.name, failure.message);
                    }
                }
            }

            match report.status {
                RunStatus::Completed => Ok(()),
                RunStatus::Cancelled => Err(ReplicateError::Cancelled),
                RunStatus::Failed => Err(ReplicateError::Partial(report.failure_count())),
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config)?;
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health check:");
                print_account_health("source", result.source_connected, &result.source_error);
                print_account_health(
                    "destination",
                    result.destination_connected,
                    &result.destination_error,
                );
            }

            if !result.healthy() {
                return Err(ReplicateError::Config("Health check failed".to_string()));
            }
            Ok(())
        }
    }
}

fn print_account_health(label: &str, connected: bool, error: &Option<String>) {
    println!("  {}: {}", label, if connected { "OK" } else { "FAILED" });
    if let Some(err) = error {
        println!("    {}", err);
    }
}

/// Initialize tracing with a console layer plus a per-run timestamped log
/// file. Returns the log file path.
fn setup_logging(verbosity: &str, format: &str, log_dir: &Path) -> Result<PathBuf, ReplicateError> {
    let level: Level = verbosity.parse().unwrap_or(Level::INFO);

    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(format!("{}.log", Utc::now().format("%Y%m%d%H%M%S")));
    let log_file = Arc::new(std::fs::File::create(&log_path)?);

    let filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    if format == "json" {
        let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).json();
        let file_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(log_file);
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(log_file);
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .init();
    }

    Ok(log_path)
}

/// Cancel the returned token on SIGINT or SIGTERM so the run can stop at
/// the next safe point.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
        let which = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\n{} received, stopping at the next safe point...", which);
        token.cancel();
    });

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.expect("Ctrl-C handler");
        eprintln!("\nCtrl-C received, stopping at the next safe point...");
        token.cancel();
    });

    cancel_token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_run_with_dry_run() {
        let cli = Cli::parse_from(["ams-replicate", "--output-json", "run", "--dry-run"]);
        assert!(cli.output_json);
        assert!(matches!(cli.command, Commands::Run { dry_run: true }));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["ams-replicate", "run"]);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert_eq!(cli.verbosity, "info");
        assert_eq!(cli.log_format, "text");
        assert!(matches!(cli.command, Commands::Run { dry_run: false }));
    }
}
