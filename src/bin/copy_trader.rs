//! Copy-trading engine daemon
//!
//! Wires configuration, stores and clients together, recovers state from
//! a previous run, then serves ticks until a shutdown signal arrives.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use copytrader::application::{CommandService, CopyEngine, Scheduler};
use copytrader::infrastructure::{
    init_tracing_with_level, ClobClient, CopyDatabase, DataApiClient, EngineConfig, Heartbeat,
    NotificationPublisher, RedisStore, SettlementClient, ShutdownManager,
};

/// Bound on waiting for in-flight ticks at shutdown.
const DRAIN_BOUND: Duration = Duration::from_secs(30);

/// Cadence of the periodic status line and venue probe.
const HEARTBEAT_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("failed to load config '{}'", path))?,
        None => EngineConfig::from_env().context("failed to load config from environment")?,
    };

    init_tracing_with_level(&config.log_level);
    config.log();

    // Stores and clients. Unreachable backends are fatal at startup.
    let store = RedisStore::connect(&config.redis_url)
        .await
        .context("shared store unreachable")?;
    store.ping().await.context("shared store did not answer")?;

    let db = Arc::new(
        CopyDatabase::new(&config.database_url)
            .await
            .context("database unreachable")?,
    );

    let data = Arc::new(DataApiClient::new(&config.data_api_url));
    let clob = Arc::new(
        ClobClient::new(&config.clob_api_url).with_auth_headers(venue_auth_headers()),
    );
    let settlement = Arc::new(
        SettlementClient::new(
            &config.rpc_url,
            config.chain_id,
            &config.settlement_contract_address,
            &config.collateral_address,
        )
        .context("bad settlement configuration")?,
    );

    match clob.server_time().await {
        Ok(ts) => info!("Order-book API reachable (server time {})", ts),
        Err(e) => warn!("Order-book API probe failed: {}", e),
    }

    let engine = Arc::new(CopyEngine::new(
        config.clone(),
        &store,
        db,
        data,
        Arc::clone(&clob),
        settlement,
    ));
    let scheduler = Arc::new(Scheduler::start(Arc::clone(&engine)));

    // Startup recovery: purge zombie schedule entries, hand stranded
    // claims back, reconcile, then resume every running task.
    scheduler.clear_all();
    let running = engine.recover().await.context("startup recovery failed")?;
    info!("Recovered {} running task(s)", running.len());

    for task in &running {
        if let Err(e) = engine.reconcile_task(&task.id).await {
            warn!(task_id = %task.id, "Startup reconciliation failed: {}", e);
        }
    }
    for task in &running {
        scheduler.schedule(&task.id);
    }

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let notifier = NotificationPublisher::new(&store);
    let commands = Arc::new(CommandService::new(
        Arc::clone(&engine),
        Arc::clone(&scheduler),
        notifier,
    ));
    let listener = commands
        .run_listener(&store, shutdown.flag())
        .await
        .context("command listener failed to start")?;

    info!("Engine running ({} scheduled task(s))", scheduler.scheduled_count());

    let mut heartbeat = Heartbeat::new(HEARTBEAT_SECS);
    while shutdown.is_running() {
        shutdown.interruptible_sleep(Duration::from_millis(500)).await;

        if heartbeat.should_beat() {
            heartbeat.beat();
            match clob.server_time().await {
                Ok(_) => info!(
                    "Heartbeat: {} scheduled, {} in flight",
                    scheduler.scheduled_count(),
                    scheduler.in_flight()
                ),
                Err(e) => warn!("Heartbeat: order-book API unreachable: {}", e),
            }
        }
    }

    // Graceful drain: stop new ticks, let in-flight ones finish.
    info!("Draining in-flight ticks...");
    scheduler.clear_all();
    let drained = shutdown.drain(|| scheduler.in_flight(), DRAIN_BOUND).await;
    scheduler.stop_workers();
    listener.abort();

    if !drained {
        error!("Ticks still in flight after {:?}; exiting dirty", DRAIN_BOUND);
        std::process::exit(1);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Opaque venue auth headers from the environment, passed through to
/// order entry untouched.
fn venue_auth_headers() -> Vec<(String, String)> {
    [
        ("CLOB_API_KEY", "POLY-APIKEY"),
        ("CLOB_API_SECRET", "POLY-SECRET"),
        ("CLOB_API_PASSPHRASE", "POLY-PASSPHRASE"),
    ]
    .iter()
    .filter_map(|(var, header)| {
        std::env::var(var)
            .ok()
            .map(|value| (header.to_string(), value))
    })
    .collect()
}
