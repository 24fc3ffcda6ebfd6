//! The sequential event consumer.

use super::handler::{ReconcileOutcome, ReconciliationHandler};
use super::store::{FileStore, RuleStore};
use crate::resource::RuleObject;
use crate::watch::event::WatchEvent;
use crate::watch::informer::EventReceiver;

/// Counters over the events a controller has processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub processed: u64,
    pub applied: u64,
    pub unchanged: u64,
    pub failed: u64,
}

impl ControllerStats {
    fn record(&mut self, outcome: ReconcileOutcome) {
        self.processed += 1;
        match outcome {
            ReconcileOutcome::Applied => self.applied += 1,
            ReconcileOutcome::Unchanged => self.unchanged += 1,
            ReconcileOutcome::Failed => self.failed += 1,
        }
    }
}

/// Feeds events to a [`ReconciliationHandler`] one at a time, in delivery order.
///
/// A failed event is counted and logged by the handler; it never stops the loop.
pub struct Controller<S = FileStore> {
    handler: ReconciliationHandler<S>,
    stats: ControllerStats,
}

impl<S: RuleStore> Controller<S> {
    pub fn new(handler: ReconciliationHandler<S>) -> Self {
        Self {
            handler,
            stats: ControllerStats::default(),
        }
    }

    pub fn handler(&self) -> &ReconciliationHandler<S> {
        &self.handler
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    /// Processes a single event.
    pub fn process(&mut self, event: &WatchEvent<RuleObject>) -> ReconcileOutcome {
        let outcome = self.handler.handle(event);
        self.stats.record(outcome);
        outcome
    }

    /// Consumes events until every sender is gone, then returns the totals.
    pub async fn run(&mut self, mut events: EventReceiver) -> ControllerStats {
        log::info!(
            "Reconciling rules into {}",
            self.handler.base_dir().display()
        );

        while let Some(event) = events.recv().await {
            self.process(&event);
        }

        log::info!(
            "Event stream closed after {} events ({} applied, {} unchanged, {} failed)",
            self.stats.processed,
            self.stats.applied,
            self.stats.unchanged,
            self.stats.failed
        );
        self.stats
    }
}
