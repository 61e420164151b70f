//! Wiring for `parkd run`.

use std::path::PathBuf;
use std::sync::Arc;

use parkgrid_control::{outbox, Coordinator, Dispatcher, Fleet, SystemClock};
use parkgrid_core::{ControlCommand, ParkConfig};
use parkgrid_sim::SimRng;
use parkgrid_state::KnowledgeStore;
use parkgrid_transport::{topics, Broker, Subscription};
use tokio::sync::watch;
use tracing::{info, warn};

pub async fn run(config: ParkConfig, data_dir: PathBuf, ticks: Option<u64>) -> anyhow::Result<()> {
    info!("ParkGrid daemon starting");

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("parkgrid.redb");
    let store = KnowledgeStore::open(&db_path)?;
    info!(path = ?db_path, "knowledge store opened");

    let broker = Broker::new();
    let rng = match config.simulation.seed {
        Some(seed) => SimRng::new(seed),
        None => SimRng::from_entropy(),
    };
    for lot in &config.lots {
        info!(
            lot = %lot.id,
            name = lot.display_name(),
            capacity = lot.total_capacity,
            price = lot.base_price,
            "lot configured"
        );
    }
    info!(seed = rng.seed(), lots = config.lots.len(), "simulation seeded");

    // ── Background tasks ───────────────────────────────────────

    let (outbox, outbox_rx) = outbox();
    let dispatcher = Dispatcher::new(Arc::new(store.clone()), Arc::new(broker.clone()));
    let dispatch_handle = tokio::spawn(dispatcher.run(outbox_rx));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let adaptations = broker.subscribe(topics::ADAPTATIONS)?;
    let log_handle = tokio::spawn(log_adaptations(adaptations, shutdown_rx.clone()));

    // ── Control loop ───────────────────────────────────────────

    let interval = config.simulation.tick_interval();
    let fleet = Fleet::from_config(&config, &rng);
    let mut coordinator = Coordinator::new(config, fleet, outbox, Arc::new(SystemClock));
    let mut coordinator_task = tokio::spawn(async move {
        let result = coordinator.run(interval, shutdown_rx, ticks).await;
        // Dropping the coordinator closes the outbox so the dispatcher can drain.
        drop(coordinator);
        result
    });

    let result = tokio::select! {
        result = &mut coordinator_task => result,
        () = interrupted(tokio::signal::ctrl_c()) => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            coordinator_task.await
        }
    };
    result??;

    let stats = dispatch_handle.await?;
    let _ = shutdown_tx.send(true);
    let _ = log_handle.await;

    info!(
        delivered = stats.delivered(),
        retries = stats.retries(),
        dropped = stats.dropped(),
        "ParkGrid daemon stopped"
    );
    Ok(())
}

/// Resolves once `signal` fires. If the listener cannot be installed it
/// never resolves, leaving the coordinator to finish on its own.
async fn interrupted(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        warn!(error = %e, "failed to listen for Ctrl-C, running until the tick limit");
        std::future::pending::<()>().await;
    }
}

async fn log_adaptations(mut sub: Subscription, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            message = sub.recv() => {
                let Some(message) = message else { break };
                match message.decode::<ControlCommand>() {
                    Ok(cmd) => info!(
                        lot = %cmd.lot_id,
                        action = %cmd.action,
                        reason = %cmd.reason,
                        "adaptation"
                    ),
                    Err(e) => warn!(topic = %message.topic, error = %e, "undecodable adaptation"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
