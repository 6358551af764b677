//! Certwarden operator tool
//!
//! Inspects and maintains the state a running orchestrator keeps: the
//! configuration, the job store and the shared issuance budget.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use certwarden::jobs::{FileJobStore, JobStore};
use certwarden::ratelimit::{build_store, RateBudget};
use certwarden_config::validate::{validate_all, ValidationOpts};
use certwarden_config::Config;

/// Certwarden - rate-limited certificate issuance orchestrator
#[derive(Parser, Debug)]
#[command(name = "certwarden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "CERTWARDEN_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration file and exit
    Test {
        /// Also check that the shared budget store is reachable
        #[arg(long = "check-network")]
        check_network: bool,
    },
    /// Show job counts by status and the remaining budget
    Status,
    /// Clear the shared issuance budget
    ResetBudget,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Test { check_network } => test_config(&config, cli.config.as_deref(), check_network).await,
        Commands::Status => show_status(&config).await,
        Commands::ResetBudget => reset_budget(&config).await,
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(path).context("Failed to load configuration file")
        }
        None => {
            info!("No configuration specified, using defaults");
            Ok(Config::default())
        }
    }
}

/// Test configuration file and exit
async fn test_config(config: &Config, path: Option<&Path>, check_network: bool) -> Result<()> {
    let opts = ValidationOpts {
        check_certificates: true,
        check_network,
    };
    let result = validate_all(config, opts).await;

    for warning in &result.warnings {
        warn!("{}", warning);
    }
    if !result.is_ok() {
        for error in &result.errors {
            tracing::error!("{}", error);
        }
        bail!(
            "Configuration validation failed with {} error(s)",
            result.errors.len()
        );
    }

    info!("Configuration test successful:");
    info!("  - budget '{}': {} per {}s", config.budget.key, config.budget.points, config.budget.window_secs);
    info!("  - jobs at {}", config.storage.jobs_path.display());
    info!("  - deployment timeout {}s", config.deployment.timeout_secs);

    println!(
        "certwarden: configuration file {} test is successful",
        path.map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults)".to_string())
    );
    Ok(())
}

async fn open_budget(config: &Config) -> Result<RateBudget> {
    let store = build_store(&config.budget)
        .await
        .context("Failed to open budget store")?;
    Ok(RateBudget::new(
        config.budget.key.clone(),
        config.budget.policy(),
        store,
    ))
}

/// Print job counts and budget state
async fn show_status(config: &Config) -> Result<()> {
    let jobs = FileJobStore::open(&config.storage.jobs_path)
        .await
        .context("Failed to open job store")?;
    let counts = jobs
        .count_by_status()
        .await
        .context("Failed to count jobs")?;

    println!("jobs ({}):", config.storage.jobs_path.display());
    for (status, count) in &counts {
        println!("  {:<10} {}", status, count);
    }

    let budget = open_budget(config).await?;
    let snapshot = budget.get().await.context("Failed to read budget")?;
    println!("budget '{}':", budget.key());
    println!("  remaining  {:.2} of {}", snapshot.remaining(), snapshot.capacity);
    match snapshot.blocked_until_ms {
        Some(until) => {
            let until = chrono::DateTime::from_timestamp_millis(until as i64)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| until.to_string());
            println!("  blocked    until {}", until);
        }
        None => println!("  blocked    no"),
    }

    Ok(())
}

/// Clear the budget
async fn reset_budget(config: &Config) -> Result<()> {
    let budget = open_budget(config).await?;
    budget.reset().await.context("Failed to reset budget")?;
    println!("certwarden: budget '{}' reset", budget.key());
    Ok(())
}
