//! Periodic resync scheduler.
//!
//! Redelivers every cached object as `Add` on a fixed interval. This is the
//! only mechanism that repairs drift in the output tree (manual edits,
//! restores, writes that failed earlier).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use super::informer::Informer;

pub struct ResyncScheduler {
    informer: Arc<Informer>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ResyncScheduler {
    pub fn new(informer: Arc<Informer>, interval: Duration) -> Self {
        Self {
            informer,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the resync loop on the current runtime.
    /// Accepts a trigger receiver for out-of-band resync requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let informer = Arc::clone(&self.informer);
        let shutdown = Arc::clone(&self.shutdown);
        let wake = Arc::clone(&self.wake);
        let interval = self.interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.tick().await; // skip immediate first tick

            loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                tokio::select! {
                    _ = interval_timer.tick() => {},
                    Ok(()) = trigger_rx.recv() => {
                        log::info!("Manual resync triggered");
                    },
                    _ = wake.notified() => {},
                }

                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                let count = informer.resync();
                log::debug!("Resync delivered {} objects", count);
            }

            log::info!("Resync scheduler stopped");
        })
    }

    /// Signals the scheduler to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}
