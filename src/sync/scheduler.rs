use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::engine::SyncEngine;
use super::store::Store;

/// Shortest period the loop accepts; `tokio::time::interval` panics on zero.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Handle to the periodic `sync_all_users` loop.
///
/// Dropping the handle leaves the loop running; call [`Scheduler::stop`].
pub struct Scheduler {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn the loop. The first run starts immediately, then one every
    /// `period`. A tick that arrives while the previous run is still going is
    /// skipped. Periods below one second are raised to one second.
    pub fn start<S: Store>(engine: Arc<SyncEngine<S>>, period: Duration) -> Self {
        if period < MIN_PERIOD {
            tracing::warn!(
                requested_ms = period.as_millis() as u64,
                "Scheduler period too short, using 1s"
            );
        }
        let period = period.max(MIN_PERIOD);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            tracing::info!(period_secs = period.as_secs(), "Scheduler started");

            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut in_flight: Option<JoinHandle<()>> = None;

            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    changed = stop_rx.changed() => {
                        // a dropped sender also means stop
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                if in_flight.as_ref().is_some_and(|run| !run.is_finished()) {
                    tracing::warn!("Previous sync run still in progress, skipping tick");
                    continue;
                }

                let engine = Arc::clone(&engine);
                in_flight = Some(tokio::spawn(async move {
                    if let Err(e) = engine.sync_all_users().await {
                        tracing::error!(error = %e, "Scheduled sync failed");
                    }
                }));
            }

            tracing::info!("Scheduler stopped");
        });

        Self { stop_tx, task }
    }

    /// Ask the loop to exit and return without waiting. A run already in
    /// progress is left to finish on its own.
    pub fn stop(&self) {
        // send_replace works even when the loop already exited
        self.stop_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::feed::Fetcher;
    use crate::storage::Database;
    use crate::sync::SyncSettings;

    async fn engine() -> Arc<SyncEngine<Database>> {
        let db = Database::open(":memory:").await.unwrap();
        let fetcher = Fetcher::new(&SyncConfig::default()).unwrap();
        Arc::new(SyncEngine::new(db, fetcher, SyncSettings::default()))
    }

    async fn wait_finished(scheduler: &Scheduler) -> bool {
        for _ in 0..100 {
            if scheduler.is_finished() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_stop_ends_loop() {
        let scheduler = Scheduler::start(engine().await, Duration::from_secs(3600));
        assert!(!scheduler.is_finished());

        scheduler.stop();
        assert!(wait_finished(&scheduler).await);
    }

    #[tokio::test]
    async fn test_zero_period_keeps_loop_alive() {
        let scheduler = Scheduler::start(engine().await, Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!scheduler.is_finished());

        scheduler.stop();
        assert!(wait_finished(&scheduler).await);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let scheduler = Scheduler::start(engine().await, Duration::from_secs(3600));
        scheduler.stop();
        scheduler.stop();
        assert!(wait_finished(&scheduler).await);
        scheduler.stop();
    }
}
