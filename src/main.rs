//! rwa-backoffice daemon
//!
//! Wires the core together and runs the two background workers:
//!
//! ```text
//! ┌──────────┐    ┌───────────────┐    ┌──────────────┐
//! │  Config  │───▶│   Postgres    │───▶│   Workers    │
//! │  (YAML)  │    │ (schema init) │    │ recon + chain│
//! └──────────┘    └───────────────┘    └──────────────┘
//! ```
//!
//! Shutdown on ctrl-c drains in-flight chain ops before exiting; anything
//! still submitted at the deadline resumes on the next start.

use std::sync::Arc;

use rwa_backoffice::chain_ops::{ChainOpWorker, MockChainAdapter, PgChainOpStore};
use rwa_backoffice::config::AppConfig;
use rwa_backoffice::db::Database;
use rwa_backoffice::db::schema::ensure_schema;
use rwa_backoffice::events::NoopPublisher;
use rwa_backoffice::reconciliation::{PgReconciliationStore, ReconcileSource, ReconciliationWorker};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _log_guard = rwa_backoffice::logging::init_logging(&config);

    tracing::info!(
        env = %env,
        git_hash = env!("GIT_HASH"),
        "Starting rwa-backoffice"
    );

    let postgres_url = config
        .postgres_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("postgres_url missing from config/{}.yaml", env))?;

    let db = Database::connect(&postgres_url).await?;
    db.health_check().await?;
    ensure_schema(db.pool()).await?;
    tracing::info!("Database ready");

    let source = ReconcileSource::from_name(&config.reconciliation.source)
        .ok_or_else(|| anyhow::anyhow!("unknown reconciliation source '{}'", config.reconciliation.source))?;
    let recon_store = Arc::new(PgReconciliationStore::new(db.pool().clone()));
    let recon_worker = ReconciliationWorker::new(
        recon_store,
        source,
        config.reconciliation.tolerance,
        std::time::Duration::from_secs(config.reconciliation.interval_secs),
    );
    let recon_handle = recon_worker.start();

    let chain_store = Arc::new(PgChainOpStore::new(db.pool().clone()));
    // Adapter selection is deployment wiring; the mock stands in until a
    // node-backed adapter is configured
    let adapter = Arc::new(MockChainAdapter::new());
    let publisher = Arc::new(NoopPublisher);
    let chain_worker = ChainOpWorker::new(chain_store, adapter, publisher, config.chain_worker.clone());
    let chain_handle = chain_worker.start();

    tracing::info!("Workers running; send ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    recon_worker.stop();
    chain_worker.stop_and_drain().await;

    recon_handle.abort();
    chain_handle.await?;

    tracing::info!("rwa-backoffice stopped");
    Ok(())
}
