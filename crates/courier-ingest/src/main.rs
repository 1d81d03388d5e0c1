//! Courier - move preserved packages into repository ingest and track bags

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use courier_common::logging::{init_logging, LogConfig, LogLevel};
use courier_ingest::config::{
    load_dotenv, AptrustConfig, ArchivematicaConfig, DatabaseConfig, RetryConfig,
};
use courier_ingest::{AptrustApi, ArchivematicaApi, ArchivematicaService};
use courier_ledger::{bag_repository, repository_package_repository, status_event_repository};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(author, version, about = "Select preserved packages for ingest and track bag status")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print packages ready for ingest as JSON lines
    Packages,

    /// Show the APTrust ingest status of a bag
    IngestStatus {
        /// Bag identifier, without the object id prefix
        bag: String,
    },

    /// Register a bag and the repository package it belongs to
    Register {
        bag: String,

        /// Repository package identifier
        #[arg(short, long)]
        package: String,

        /// Repository the package lives in
        #[arg(short, long)]
        repository: String,

        #[arg(long, default_value_t = 1)]
        group_part: i64,
    },

    /// Append a status event for a bag
    Record {
        bag: String,

        /// One of the ledger statuses, e.g. bagging or copied
        status: String,

        #[arg(short, long)]
        note: Option<String>,
    },

    /// List status events for a bag
    Events {
        bag: String,

        /// Only the most recent event
        #[arg(long)]
        latest: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("courier")
        .build()
        .merge_env()?;

    // Held until exit so buffered file logs are flushed
    let _log_guard = init_logging(&log_config)?;

    match cli.command {
        Command::Packages => packages().await,
        Command::IngestStatus { bag } => ingest_status(&bag).await,
        Command::Register {
            bag,
            package,
            repository,
            group_part,
        } => register(&bag, &package, &repository, group_part).await,
        Command::Record { bag, status, note } => record(&bag, &status, note.as_deref()).await,
        Command::Events { bag, latest } => events(&bag, latest).await,
    }
}

fn print_json_line(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

async fn packages() -> Result<()> {
    let config = ArchivematicaConfig::from_env()?;
    let retry = RetryConfig::from_env()?;

    let api = ArchivematicaApi::from_config(&config, &retry)?;
    let service = ArchivematicaService::from_config(&config, Arc::new(api));

    let packages = service
        .get_repository_packages()
        .await
        .context("Failed to list packages for ingest")?;
    for package in &packages {
        print_json_line(package)?;
    }

    info!(count = packages.len(), source = %service.name(), "Listed packages");
    Ok(())
}

async fn ingest_status(bag: &str) -> Result<()> {
    let api = AptrustApi::from_config(&AptrustConfig::from_env()?, &RetryConfig::from_env()?)?;
    let status = api
        .get_ingest_status(bag)
        .await
        .with_context(|| format!("Failed to look up ingest status of '{bag}'"))?;
    println!("{status}");
    Ok(())
}

async fn ledger_pool() -> Result<Option<SqlitePool>> {
    let pool = DatabaseConfig::from_env()?
        .connect()
        .await
        .context("Failed to open ledger database")?;
    if pool.is_none() {
        warn!("DATABASE_URL is not set; records are kept in memory and lost on exit");
    }
    Ok(pool)
}

async fn register(bag: &str, package: &str, repository: &str, group_part: i64) -> Result<()> {
    let pool = ledger_pool().await?;
    let packages = repository_package_repository(pool.as_ref());
    let bags = bag_repository(pool.as_ref());

    if packages.get_by_identifier(package).await?.is_none() {
        packages.create(package, repository, Utc::now()).await?;
    }
    bags.create(bag, group_part, package)
        .await
        .with_context(|| format!("Failed to register bag '{bag}'"))?;

    info!(bag, package, group_part, "Registered bag");
    Ok(())
}

async fn record(bag: &str, status: &str, note: Option<&str>) -> Result<()> {
    let pool = ledger_pool().await?;
    let ledger = status_event_repository(pool.as_ref());

    ledger
        .create(bag, status, Utc::now(), note)
        .await
        .with_context(|| format!("Failed to record '{status}' for bag '{bag}'"))?;

    info!(bag, status, "Recorded status event");
    Ok(())
}

async fn events(bag: &str, latest: bool) -> Result<()> {
    let pool = ledger_pool().await?;
    let ledger = status_event_repository(pool.as_ref());

    if latest {
        match ledger.get_latest_event_for_bag(bag).await? {
            Some(event) => print_json_line(&event)?,
            None => info!(bag, "No events recorded"),
        }
        return Ok(());
    }

    let events = ledger.get_all_for_bag_identifier(bag).await?;
    if events.is_empty() {
        info!(bag, "No events recorded");
    }
    for event in &events {
        print_json_line(event)?;
    }
    Ok(())
}
