//! Ledger Administration CLI
//!
//! Command-line tool for inspecting and verifying the audit ledger.
//! Verification failures exit non-zero so the tool can gate compliance
//! checks in automation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audit_ledger::config::LedgerConfig;
use audit_ledger::store::{EntryFilter, LedgerStore, SqliteLedgerStore};
use audit_ledger::AuditLedgerService;

#[derive(Parser)]
#[command(name = "ledger-admin")]
#[command(about = "Audit ledger inspection and verification tool")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL (defaults to LEDGER_DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the hash chain (full, or structural when filtered)
    Verify {
        /// Restrict to one project (structural check only)
        #[arg(long)]
        project_id: Option<String>,

        /// RFC 3339 lower bound on created_at (structural check only)
        #[arg(long)]
        since: Option<String>,
    },

    /// List entries matching the given filters, newest first
    List {
        #[arg(long)]
        project_id: Option<String>,

        #[arg(long)]
        entity_type: Option<String>,

        #[arg(long)]
        entity_id: Option<String>,

        #[arg(long)]
        actor_id: Option<String>,

        #[arg(long)]
        action: Option<String>,

        /// RFC 3339 lower bound on created_at
        #[arg(long)]
        since: Option<String>,

        /// RFC 3339 upper bound on created_at
        #[arg(long)]
        until: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Show one entry by its entry id
    Show {
        entry_id: String,
    },

    /// Show the current chain head
    Head,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| anyhow!("invalid timestamp {:?}: {}", value, e))?
        .with_timezone(&Utc))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audit_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = LedgerConfig::load().map_err(|e| anyhow!("failed to load config: {}", e))?;
    let database_url = cli.database_url.unwrap_or(config.database_url);

    let store = Arc::new(
        SqliteLedgerStore::connect(
            &database_url,
            Duration::from_secs(config.store_timeout_secs),
        )
        .await?,
    );
    info!("connected to {}", database_url);

    let service =
        AuditLedgerService::new(store.clone()).with_max_append_retries(config.max_append_retries);

    match cli.command {
        Commands::Verify { project_id, since } => {
            let since = since.as_deref().map(parse_timestamp).transpose()?;
            let report = service.verify_chain(project_id.as_deref(), since).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                std::process::exit(1);
            }
        }
        Commands::List {
            project_id,
            entity_type,
            entity_id,
            actor_id,
            action,
            since,
            until,
            limit,
            offset,
        } => {
            let filter = EntryFilter {
                project_id,
                entity_type,
                entity_id,
                actor_id,
                action,
                since: since.as_deref().map(parse_timestamp).transpose()?,
                until: until.as_deref().map(parse_timestamp).transpose()?,
                limit: Some(limit),
                offset: Some(offset),
            };
            let page = service.get_entries(filter).await?;
            for entry in &page.entries {
                println!("{}", serde_json::to_string(entry)?);
            }
            eprintln!("total: {}", page.total);
        }
        Commands::Show { entry_id } => match service.find_entry(&entry_id).await? {
            Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
            None => {
                eprintln!("no entry with id {}", entry_id);
                std::process::exit(1);
            }
        },
        Commands::Head => match store.head().await? {
            Some((sequence_id, entry_hash)) => {
                println!("sequence_id: {}", sequence_id);
                println!("entry_hash:  {}", entry_hash);
            }
            None => println!("ledger is empty"),
        },
    }

    Ok(())
}
