//! annexd - Annex poller daemon
//!
//! Periodically compares the annexes the pool's directory advertises with
//! the stacks the cloud provider holds, and reports every discrepancy.

use annex_daemon::{Daemon, DaemonConfig, DaemonError, DaemonResult};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// annexd CLI
#[derive(Parser)]
#[command(name = "annexd")]
#[command(about = "Annex poller - reconciles directory annex ads with cloud stacks", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ANNEX_CONFIG")]
    config: Option<String>,

    /// Run a single pass and exit; non-zero exit if it aborts
    #[arg(long)]
    once: bool,

    /// Seconds between passes
    #[arg(long, env = "ANNEX_POLL_INTERVAL")]
    poll_interval: Option<u64>,

    /// Log level
    #[arg(long, env = "ANNEX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "ANNEX_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(secs) = cli.poll_interval {
        if secs == 0 {
            return Err(DaemonError::Config("poll interval must be positive".to_string()));
        }
        config.poll.interval_secs = secs;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting annexd");

    let daemon = match Daemon::new(config).await {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start");
            return Err(e);
        }
    };

    if cli.once {
        let report = daemon.run_once().await?;
        for record in report.publishable_records(daemon.poller().reporter()) {
            println!("{}", serde_json::Value::from(serde_json::Map::from_iter(record)));
        }
        return Ok(());
    }

    daemon.run().await
}
