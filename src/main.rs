use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use syndication::config::Config;
use syndication::feed::Fetcher;
use syndication::storage::Database;
use syndication::sync::{Scheduler, SyncEngine, SyncSettings};

const SYSTEM_CONFIG: &str = "/etc/syndication/config.toml";

#[derive(Parser, Debug)]
#[command(name = "syndication", version, about = "Feed synchronization daemon")]
struct Args {
    /// Config file (default: /etc/syndication/config.toml, then
    /// ~/.config/syndication/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file, overriding `database_path`
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Sync every user once and exit
    #[arg(long)]
    once: bool,
}

/// First config file that exists, in lookup order.
fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    let system = PathBuf::from(SYSTEM_CONFIG);
    if system.exists() {
        return Some(system);
    }

    let home = std::env::var_os("HOME")?;
    let user = PathBuf::from(home)
        .join(".config")
        .join("syndication")
        .join("config.toml");
    user.exists().then_some(user)
}

async fn open_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory '{}'", parent.display())
        })?;
    }

    let path_str = path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", path.display()))?;
    let db = Database::open(path_str)
        .await
        .with_context(|| format!("Failed to open database '{}'", path.display()))?;
    Ok(db)
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl-C, shutting down gracefully");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match config_path(args.config) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => Config::default(),
    };
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let db = open_database(&config.database_path).await?;
    let fetcher = Fetcher::new(&config.sync).context("Failed to build HTTP client")?;
    let engine = Arc::new(SyncEngine::new(
        db,
        fetcher,
        SyncSettings::from(&config.sync),
    ));

    if args.once {
        let report = engine.sync_all_users().await?;
        println!(
            "Synced {} feed(s): {} failed, {} new entries",
            report.outcomes.len(),
            report.failed(),
            report.new_entries()
        );
        return Ok(());
    }

    let scheduler = Scheduler::start(Arc::clone(&engine), config.sync.interval());
    shutdown_signal().await?;
    scheduler.stop();

    Ok(())
}
