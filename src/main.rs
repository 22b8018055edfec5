use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seekarr::app::App;
use seekarr::config::Config;

#[derive(Parser)]
#[command(
    name = "seekarr",
    version,
    about = "Fair-share search automation for Radarr and Sonarr",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one manual cycle and print its result
    Run {
        /// Plan searches without triggering them
        #[arg(long, default_value = "false")]
        dry_run: bool,
    },

    /// Run the scheduler and stream activity until Ctrl-C
    Serve,

    /// Print recent activity log entries
    Logs {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// List configured servers
    Servers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env().context("Failed to load configuration from environment")?,
    };

    // Initialize tracing/logging
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&format, &config.logging.level, cli.verbose)?;

    tracing::info!("seekarr starting");

    match cli.command {
        Commands::Run { dry_run } => {
            tracing::info!(dry_run = %dry_run, "Starting run command");
            run(config, dry_run).await?;
        }
        Commands::Serve => {
            tracing::info!("Starting serve command");
            serve(config).await?;
        }
        Commands::Logs { limit } => {
            tracing::info!(limit = %limit, "Starting logs command");
            logs(config, limit).await?;
        }
        Commands::Servers => servers(&config),
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("seekarr=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("seekarr={level},warn"))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn run(config: Config, dry_run: bool) -> Result<()> {
    let app = App::build(config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling cycle");
            on_interrupt.cancel();
        }
    });

    let result = app
        .automation
        .run_cycle(&cancel, true, dry_run)
        .await
        .context("Cycle failed")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let grace = config.automation.shutdown_grace();
    let app = App::build(config)?;

    let mut subscription = app.logger.subscribe().await;
    app.scheduler.start().context("Failed to start scheduler")?;

    let status = app.scheduler.status();
    println!(
        "Scheduler running every {}h, next run at {}",
        status.interval_hours,
        status
            .next_run
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| String::from("-"))
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            entry = subscription.recv() => match entry {
                Some(entry) => println!("{entry}"),
                None => break,
            },
        }
    }

    println!("Shutting down (grace period {}s)...", grace.as_secs());
    app.scheduler.shutdown(grace).await;
    app.logger.unsubscribe(subscription.id).await;

    // entries written while the active cycle wound down
    while let Some(entry) = subscription.recv().await {
        println!("{entry}");
    }

    match app.metrics.encode() {
        Ok(text) => tracing::debug!(metrics = %text, "Final metrics"),
        Err(e) => tracing::warn!(error = %e, "Failed to encode metrics"),
    }

    Ok(())
}

async fn logs(config: Config, limit: usize) -> Result<()> {
    let app = App::build(config)?;
    let entries = app.logger.recent(limit).await?;

    if entries.is_empty() {
        println!("No activity recorded");
    }
    for entry in entries.iter().rev() {
        println!("{entry}");
    }
    Ok(())
}

fn servers(config: &Config) {
    if config.servers.is_empty() {
        println!("No servers configured");
        return;
    }
    for server in &config.servers {
        println!(
            "{:>4}  {:<20} {:<7} {:<8} {}",
            server.id,
            server.name,
            server.server_type.as_str(),
            if server.enabled { "enabled" } else { "disabled" },
            server.url
        );
    }
}
