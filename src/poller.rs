//! Periodic price refresh for the store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::store::AppStore;

/// Calls [`AppStore::update_prices`] on a fixed interval.
///
/// The first tick fires immediately. Ticks that land while an update is still
/// pending are skipped by the store, so slow feeds never stack requests.
pub struct PricePoller {
    store: Arc<AppStore>,
    interval: Duration,
}

impl PricePoller {
    pub fn new(store: Arc<AppStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Start polling on the current runtime.
    pub fn spawn(self) -> PollerHandle {
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(self.run(shutdown.clone()));
        PollerHandle {
            shutdown,
            task: Some(task),
        }
    }

    async fn run(self, shutdown: Arc<Notify>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut updates = JoinSet::new();
        info!(interval_ms = self.interval.as_millis() as u64, "price poller started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    while let Some(result) = updates.try_join_next() {
                        if let Err(err) = result {
                            if err.is_panic() {
                                warn!(error = %err, "price update task panicked");
                            }
                        }
                    }
                    if self.store.is_updating_prices() {
                        debug!("previous price update still pending; skipping tick");
                        continue;
                    }
                    let store = self.store.clone();
                    updates.spawn(async move { store.update_prices().await });
                }
                _ = shutdown.notified() => break,
            }
        }

        // Dropping the set aborts any update still in flight.
        updates.shutdown().await;
        info!("price poller stopped");
    }
}

/// Owner of a running [`PricePoller`]. Dropping it stops the poller.
pub struct PollerHandle {
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop polling and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "price poller task failed");
                }
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
