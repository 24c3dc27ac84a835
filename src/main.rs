//! Fjord Ledger - transaction processing core
//!
//! ```text
//! fjord_ledger [--env dev] [--migrate] [--worker] [--recovery]
//! ```
//!
//! - `--migrate`: apply the schema before anything else
//! - `--worker`: drain the dispatch queue into the engine
//! - `--recovery`: sweep stale pending transactions (also on if `recovery.enabled`)
//!
//! With no worker flag the process provisions system accounts, reports the
//! queue depth and exits.

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;

use fjord_ledger::bootstrap::ensure_equity_account;
use fjord_ledger::config::AppConfig;
use fjord_ledger::db::Database;
use fjord_ledger::dispatch::{DispatchQueue, DispatchWorker, PgDispatchQueue};
use fjord_ledger::store::{LedgerStore, PgLedgerStore};
use fjord_ledger::transfer::{RecoveryWorker, TransferEngine};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|a| a == flag)
}

fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = fjord_ledger::logging::init_logging(&app_config);

    tracing::info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        "Starting fjord_ledger"
    );

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(run(app_config))
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let postgres_url = config
        .postgres_url
        .as_deref()
        .context("postgres_url is not configured and DATABASE_URL is unset")?;

    let db = Database::connect(
        postgres_url,
        config.database.max_connections,
        config.database.acquire_timeout(),
    )
    .await
    .context("Failed to connect to PostgreSQL")?;
    db.health_check().await?;

    if has_flag("--migrate") {
        db.migrate().await.context("Schema migration failed")?;
    }

    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(db.pool().clone()));
    ensure_equity_account(
        store.as_ref(),
        &config.bootstrap.equity_account_number,
        &config.bootstrap.equity_currency,
    )
    .await
    .context("Failed to provision equity account")?;

    let engine = Arc::new(TransferEngine::with_config(
        store.clone(),
        config.engine.to_engine_config(),
    ));

    let dispatcher: Option<Arc<dyn DispatchQueue>> = if config.dispatch.enabled {
        Some(Arc::new(PgDispatchQueue::new(
            db.pool().clone(),
            config.dispatch.visibility_timeout(),
            config.dispatch.poll_interval(),
        )))
    } else {
        None
    };

    if let Some(queue) = &dispatcher {
        tracing::info!(depth = queue.depth().await?, "Dispatch queue");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if has_flag("--worker") {
        match &dispatcher {
            Some(queue) => {
                let worker = DispatchWorker::new(
                    queue.clone(),
                    engine.clone(),
                    config.dispatch.to_worker_config(),
                );
                let rx = shutdown_rx.clone();
                tasks.push(tokio::spawn(async move {
                    worker.run(rx).await;
                }));
            }
            None => tracing::warn!("--worker given but dispatch is disabled in config"),
        }
    }

    if has_flag("--recovery") || config.recovery.enabled {
        let recovery = RecoveryWorker::new(
            store.clone(),
            engine.clone(),
            dispatcher.clone(),
            config.recovery.to_recovery_config(),
        );
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            recovery.run(rx).await;
        }));
    }

    if tasks.is_empty() {
        tracing::info!("No workers requested, exiting");
        return Ok(());
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutdown requested, waiting for workers");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
