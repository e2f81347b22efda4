//! PayLock - Wallet & Escrow Transaction Engine
//!
//! Service entry point. Wiring:
//!
//! ```text
//! ┌──────────┐    ┌───────────────┐    ┌──────────┐
//! │  Config  │───▶│ Ledger Store  │───▶│ Gateway  │
//! │  (YAML)  │    │ (PG / Memory) │    │  (axum)  │
//! └──────────┘    └───────┬───────┘    └──────────┘
//!                         │
//!                   ┌─────┴─────┐
//!                   │  Sweeper  │
//!                   └───────────┘
//! ```
//!
//! The sweeper shares the escrow manager with the gateway, so manual
//! and automatic releases go through the same settlement path.

use std::sync::Arc;

use tracing::{debug, info, warn};

use paylock::config::AppConfig;
use paylock::db::Database;
use paylock::escrow::{EscrowManager, Sweeper};
use paylock::fraud::FraudScreen;
use paylock::gateway::state::AppState;
use paylock::ledger::{EscrowStore, LedgerStore, MemoryStore, PgStore};
use paylock::transfer::{EventSink, TransferService};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _log_guard = paylock::logging::init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        env = %env,
        "starting paylock"
    );

    let (ledger, escrow_store): (Arc<dyn LedgerStore>, Arc<dyn EscrowStore>) =
        match &config.database_url {
            Some(url) => {
                let db = Database::connect(url).await?;
                let store = Arc::new(PgStore::new(db.pool().clone()));
                store.ensure_schema().await?;
                (store.clone(), store)
            }
            None => {
                warn!("no database_url configured, running on the in-memory store");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    let events = Arc::new(EventSink::new(config.gateway.queue_size));
    let rates = Arc::new(config.rate_table());

    let transfers = Arc::new(
        TransferService::new(
            ledger.clone(),
            config.fees.build(),
            rates,
            FraudScreen::new(config.fraud.clone()),
            config.limits.clone(),
            events.clone(),
        )
        .with_retry(config.retry),
    );

    let manager = Arc::new(
        EscrowManager::new(
            ledger.clone(),
            escrow_store,
            config.escrow.clone(),
            events.clone(),
        )
        .with_retry(config.retry),
    );

    let sweeper = Arc::new(Sweeper::new(manager.clone(), config.sweeper.clone()));
    if config.sweeper.enabled {
        let background = sweeper.clone();
        tokio::spawn(async move {
            background.run().await;
        });
    } else {
        info!("background sweeper disabled; /internal/v1/sweep only");
    }

    // Delivery layers are out of scope here; drain the post-commit
    // queue so it never sits full.
    let sink = events.clone();
    tokio::spawn(async move {
        loop {
            while let Some(event) = sink.pop() {
                debug!(
                    entry_id = %event.entry_id,
                    entry_type = event.entry_type.as_str(),
                    amount = event.amount,
                    "ledger event"
                );
            }
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
    });

    let state = Arc::new(AppState::new(
        transfers,
        manager,
        sweeper,
        ledger,
        config.gateway.service_token.clone(),
    ));

    let port = get_port_override().unwrap_or(config.gateway.port);
    paylock::gateway::run_server(&config.gateway.host, port, state).await
}
