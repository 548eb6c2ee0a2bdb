//! Planning poker server - real-time estimation sessions over WebSocket.

use anyhow::{Context, Result};
use clap::Parser;
use poker_core::IssueTracker;
use poker_server::linear::LinearClient;
use poker_server::{config, load_cycle, logging, router, shutdown_signal, state};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use config::Config;
use logging::{LogFormat, LogSettings, Verbosity};
use state::AppState;

/// Planning poker server - shared estimation rounds backed by Linear.
#[derive(Parser, Debug)]
#[command(name = "poker-server")]
#[command(about = "HTTP/WebSocket server for planning poker sessions")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Linear cycle URL to load issues from, e.g.
    /// https://linear.app/acme/team/CDP/cycle/upcoming
    #[arg(long = "linear-cycle", value_name = "URL")]
    linear_cycle: Option<String>,

    /// Enable verbose logging (INFO level for most targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging (DEBUG level, excludes per-frame traces)
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set the level of one target, e.g. "join=debug" or "broadcast=trace".
    /// Repeatable. Area names are shorthand for their "poker::" target.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose, cli.debug, cli.trace);
    let log_settings = LogSettings::new(verbosity, cli.log_format).with_overrides(&cli.log_overrides);
    logging::init(&log_settings);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // CLI overrides
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(cycle) = cli.linear_cycle {
        config.linear.cycle = Some(cycle);
    }

    tracing::info!(target: "poker::startup", "Loaded configuration (port: {})", config.port);

    let tracker: Option<Arc<dyn IssueTracker>> = match &config.linear.api_key {
        Some(key) => {
            let client = LinearClient::new(key.clone(), config.linear.api_url.clone())
                .context("Failed to build Linear client")?;
            Some(Arc::new(client))
        }
        None => None,
    };

    let cycle = config.linear.cycle.clone();
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid listen address")?;
    let state = Arc::new(AppState::new(config, tracker));

    if let Some(cycle) = cycle {
        load_cycle(&state, &cycle).await;
    }

    let app = router(Arc::clone(&state));

    tracing::info!(target: "poker::startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(target: "poker::startup", "Server stopped");
    Ok(())
}
