//! Broadcaster processor.
//!
//! The Broadcaster is responsible for:
//! - Receiving decoded `MilestoneEvent`s from the ledger watcher
//! - Folding each event into the `StateStore`
//! - Pushing an `update` frame to every subscriber registered at that moment
//!
//! Delivery is at-most-once per subscriber per event. A subscriber whose
//! queue is closed or full is pruned from the registry. The frame is not
//! retried and nothing is redelivered.

use crate::events::MilestoneEvent;
use crate::registry::{ConnectionRegistry, DeliveryFailure, encode_frame};
use crate::state::Applied;
use kanau::processor::Processor;
use std::convert::Infallible;
use tracing::{debug, error, info, warn};

/// Outcome of broadcasting a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    pub applied: Applied,
    /// Subscribers the update was queued for.
    pub delivered: usize,
    /// Subscribers dropped because the update could not be queued.
    pub pruned: usize,
}

/// Applies events to the state and fans them out to subscribers.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Apply `event`, then queue its update frame for every subscriber.
    ///
    /// Targets are captured inside the state's critical section; the
    /// frames are queued after it is released and never block.
    pub fn on_event(&self, event: &MilestoneEvent) -> DeliveryReport {
        let (applied, targets) = self
            .registry
            .store()
            .apply_then(event, |_| self.registry.active_subscribers());

        info!(
            percentage = event.payment_percentage.get(),
            window = %event.window_name,
            milestone_raised = applied.milestone_raised,
            window_added = applied.window_added,
            "Milestone event applied"
        );

        let mut report = DeliveryReport {
            applied,
            ..DeliveryReport::default()
        };

        let frame = match encode_frame(&event.to_update_message()) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to serialize update frame");
                return report;
            }
        };

        for target in targets {
            match target.try_deliver(&frame) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryFailure::Closed) => {
                    debug!(subscriber = %target.id(), "Subscriber already closed, pruning");
                    self.registry.prune(target.id());
                    report.pruned += 1;
                }
                Err(DeliveryFailure::Stalled) => {
                    warn!(subscriber = %target.id(), "Subscriber queue full, pruning");
                    self.registry.prune(target.id());
                    report.pruned += 1;
                }
            }
        }

        debug!(
            delivered = report.delivered,
            pruned = report.pruned,
            "Update fanned out"
        );
        report
    }
}

impl Processor<MilestoneEvent> for Broadcaster {
    type Output = DeliveryReport;
    type Error = Infallible;

    async fn process(&self, event: MilestoneEvent) -> Result<DeliveryReport, Infallible> {
        Ok(self.on_event(&event))
    }
}
