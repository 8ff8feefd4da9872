//! stakeindex: Mina staking indexer service.
//!
//! Usage:
//! ```bash
//! stakeindex --config config.json run
//! stakeindex migrate
//! stakeindex sync --once
//! stakeindex status
//! stakeindex account B62q...
//! ```

mod config;
mod logging;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use stakeindex_core::{
    Amount, BlockStore, CheckpointStore, CleanupDriver, SyncDriver, SyncOutcome, SyncPipeline,
};
use stakeindex_mina::{HttpClient, HttpClientConfig, MinaClient, MinaSource};
use stakeindex_storage::PostgresStorage;

use crate::config::{AppConfig, Settings};

#[derive(Debug, Parser)]
#[command(name = "stakeindex", version, about = "Reorg-consistent Mina staking indexer")]
struct Cli {
    /// JSON config file; flags and environment variables override it
    #[arg(long, short, env = "CONFIG_FILE", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync, cleanup and the API server in one process
    Run,
    /// Ingest blocks from the daemon
    Sync {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Serve the rewards API only
    Server,
    /// Create tables and indexes
    Migrate,
    /// Show daemon and indexer position
    Status,
    /// Forget the saved checkpoint; the next sync starts at the first height
    Reset,
    /// Look up an account on the daemon
    Account { public_key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.settings, cli.config.as_ref())?;
    logging::init_tracing(config.debug, config.is_production())?;

    match cli.command {
        Command::Run => cmd_run(&config).await,
        Command::Sync { once } => cmd_sync(&config, once).await,
        Command::Server => cmd_server(&config).await,
        Command::Migrate => cmd_migrate(&config).await,
        Command::Status => cmd_status(&config).await,
        Command::Reset => cmd_reset(&config).await,
        Command::Account { public_key } => cmd_account(&config, &public_key).await,
    }
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

async fn connect_store(config: &AppConfig) -> anyhow::Result<Arc<PostgresStorage>> {
    let store = PostgresStorage::connect(&config.database_url)
        .await
        .context("connecting to database")?;
    Ok(Arc::new(store))
}

fn mina_client(config: &AppConfig) -> anyhow::Result<HttpClient> {
    HttpClient::new(&config.mina_endpoint, HttpClientConfig::default())
        .context("building Mina client")
}

fn source(config: &AppConfig) -> anyhow::Result<Arc<MinaSource<HttpClient>>> {
    Ok(Arc::new(MinaSource::new(
        mina_client(config)?,
        config.default_validator_fee,
    )))
}

/// Cancelled on Ctrl+C or SIGTERM.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
        tracing::info!("shutdown signal received");
        trigger.cancel();
    });
    token
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn cmd_run(config: &AppConfig) -> anyhow::Result<()> {
    let store = connect_store(config).await?;
    store.init_schema().await.context("initializing schema")?;
    let cancel = shutdown_token();

    let indexer = config.indexer_config();
    let pipeline = SyncPipeline::new(store.clone(), source(config)?, indexer.clone());
    let sync = SyncDriver::new(pipeline, indexer.sync_interval);
    let cleanup = CleanupDriver::new(store.clone(), indexer.cleanup_interval, indexer.cleanup_threshold);

    tracing::info!(
        endpoint = %config.mina_endpoint,
        first_height = indexer.first_height,
        addr = %config.listen_addr(),
        "starting stakeindex"
    );

    let sync_task = tokio::spawn(sync.run(cancel.clone()));
    let cleanup_task = tokio::spawn(cleanup.run(cancel.clone()));
    let served = server::serve(store.clone(), &config.listen_addr(), cancel.clone()).await;

    // a failed server takes the drivers down with it
    cancel.cancel();
    sync_task.await.context("sync driver panicked")?;
    cleanup_task.await.context("cleanup driver panicked")?;
    store.pool().close().await;
    served
}

async fn cmd_sync(config: &AppConfig, once: bool) -> anyhow::Result<()> {
    let store = connect_store(config).await?;
    let cancel = shutdown_token();
    let indexer = config.indexer_config();
    let pipeline = SyncPipeline::new(store.clone(), source(config)?, indexer.clone());
    let sync = SyncDriver::new(pipeline, indexer.sync_interval);

    if once {
        match sync.trigger(&cancel).await? {
            SyncOutcome::Completed(report) => println!(
                "synced {} heights (reorgs {}, rewinds {}), tip {}",
                report.synced, report.reorgs, report.rewinds, report.tip
            ),
            SyncOutcome::Busy => println!("a sync cycle is already running"),
        }
    } else {
        sync.run(cancel).await;
    }
    store.pool().close().await;
    Ok(())
}

async fn cmd_server(config: &AppConfig) -> anyhow::Result<()> {
    let store = connect_store(config).await?;
    let served = server::serve(store.clone(), &config.listen_addr(), shutdown_token()).await;
    store.pool().close().await;
    served
}

async fn cmd_migrate(config: &AppConfig) -> anyhow::Result<()> {
    let store = connect_store(config).await?;
    store.init_schema().await.context("initializing schema")?;
    println!("schema is up to date");
    Ok(())
}

async fn cmd_status(config: &AppConfig) -> anyhow::Result<()> {
    let client = mina_client(config)?;
    let status = client.daemon_status().await.context("querying daemon status")?;
    println!("daemon {}", client.url());
    println!("  sync status:       {}", status.sync_status);
    println!(
        "  blockchain length: {}",
        status.blockchain_length.as_ref().map_or("unknown", |l| l.as_str())
    );
    println!("  peers:             {}", status.peers.len());

    let store = connect_store(config).await?;
    let indexer = config.indexer_config();
    println!("indexer {}", indexer.id);
    match store.load_checkpoint(&indexer.id).await? {
        Some(cp) => println!("  checkpoint:        {} ({})", cp.height, cp.block_hash),
        None => println!("  checkpoint:        none, starts at {}", indexer.first_height),
    }
    match store.last_canonical_height().await? {
        Some(height) => println!("  canonical tip:     {height}"),
        None => println!("  canonical tip:     none"),
    }
    Ok(())
}

async fn cmd_reset(config: &AppConfig) -> anyhow::Result<()> {
    let store = connect_store(config).await?;
    let id = config.indexer_config().id;
    store.delete_checkpoint(&id).await?;
    println!("checkpoint for {id} removed");
    Ok(())
}

async fn cmd_account(config: &AppConfig, public_key: &str) -> anyhow::Result<()> {
    let client = mina_client(config)?;
    let Some(account) = client.account(public_key).await? else {
        println!("account {public_key} not found");
        return Ok(());
    };
    println!("account {}", account.public_key);
    let balance = account.balance.total.as_str();
    match balance.parse::<u64>() {
        Ok(nanos) => println!("  balance:  {}", Amount::from_nanos(nanos)),
        Err(_) => println!("  balance:  {balance}"),
    }
    println!("  delegate: {}", account.delegate.as_deref().unwrap_or("none"));
    println!(
        "  nonce:    {}",
        account.nonce.as_ref().map_or("unknown", |n| n.as_str())
    );
    Ok(())
}
