//! Tokio runtime driving the tick loop.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

use super::controller::MonitorController;
use super::snapshot::TickSnapshot;
use crate::core::config::AppConfig;
use crate::error::Result;

/// Wrapper around the Tokio runtime for the monitoring pipeline.
///
/// Snapshots are published through `snapshot_rx`; configuration updates are
/// delivered through `config_tx` and applied between ticks.
pub struct MonitorRuntime {
    pub snapshot_rx: watch::Receiver<Arc<TickSnapshot>>,
    pub config_tx: watch::Sender<AppConfig>,
    shutdown_tx: broadcast::Sender<()>,
    worker: JoinHandle<Result<()>>,
    runtime: tokio::runtime::Runtime,
}

impl MonitorRuntime {
    /// Start the tick loop on a dedicated runtime.
    pub fn new(controller: MonitorController) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .thread_name("netwatch-worker")
            .build()?;

        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(TickSnapshot::default()));
        let (config_tx, config_rx) = watch::channel(controller.config().clone());
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

        let worker = runtime.spawn(tick_loop(controller, snapshot_tx, config_rx, shutdown_rx));

        Ok(Self {
            snapshot_rx,
            config_tx,
            shutdown_tx,
            worker,
            runtime,
        })
    }

    /// True once the tick loop has exited on its own (fatal storage error).
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Stop the loop and wait for the final flush.
    pub fn shutdown(self) -> anyhow::Result<()> {
        log::info!("Shutting down monitor");
        let _ = self.shutdown_tx.send(());

        let outcome = self.runtime.block_on(self.worker)?;
        outcome?;
        Ok(())
    }
}

fn ticker(period: std::time::Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// One tick at a time: the next tick cannot start before the previous one
/// finished its read-compute-persist sequence.
pub async fn tick_loop(
    mut controller: MonitorController,
    snapshot_tx: watch::Sender<Arc<TickSnapshot>>,
    mut config_rx: watch::Receiver<AppConfig>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    controller.start();

    let mut ticks = ticker(controller.config().sampling_interval());
    let mut prunes = ticker(controller.settings().prune_interval());

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                match controller.tick() {
                    Ok(snapshot) => {
                        snapshot_tx.send_replace(Arc::new(snapshot));
                    }
                    Err(e) => {
                        log::error!("Monitoring stopped: {}", e);
                        let _ = controller.shutdown();
                        return Err(e);
                    }
                }
            }
            _ = prunes.tick() => {
                if let Err(e) = controller.prune(Utc::now()) {
                    log::error!("Monitoring stopped: {}", e);
                    let _ = controller.shutdown();
                    return Err(e);
                }
                // Picks up rules edited from another process
                if let Err(e) = controller.reload_rules() {
                    log::warn!("Could not reload alert rules: {}", e);
                }
            }
            Ok(()) = config_rx.changed() => {
                let next = config_rx.borrow_and_update().clone();
                let interval_changed =
                    next.sampling_interval_ms != controller.config().sampling_interval_ms;

                match controller.apply_config(next) {
                    Ok(()) => {
                        log::info!("Configuration updated");
                        if interval_changed {
                            ticks = ticker(controller.config().sampling_interval());
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        log::error!("Monitoring stopped: {}", e);
                        return Err(e);
                    }
                    Err(e) => log::warn!("Rejected configuration update: {}", e),
                }
            }
            _ = shutdown.recv() => {
                log::debug!("Tick loop shutting down");
                break;
            }
        }
    }

    controller.shutdown()
}
