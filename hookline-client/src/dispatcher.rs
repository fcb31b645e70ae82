//! Synchronous command dispatch.

use crate::queue::{CommandQueue, ReplyQueue};
use crate::registry::{CapabilityRegistry, Outcome};
use hookline_protocol::Reply;
use std::sync::Arc;

/// Counts from one or more dispatch passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Commands taken from the inbound queue.
    pub processed: usize,
    /// Commands that produced a reply.
    pub replied: usize,
    /// Commands whose capability returned no result.
    pub silent: usize,
    /// Commands that were unresolved or whose capability failed.
    pub failed: usize,
}

impl DispatchSummary {
    fn add(&mut self, other: &DispatchSummary) {
        self.processed += other.processed;
        self.replied += other.replied;
        self.silent += other.silent;
        self.failed += other.failed;
    }
}

/// Drains the inbound queue into the registry and queues the replies.
///
/// `run` takes `&mut self`, so two passes can never overlap.
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    inbound: Arc<CommandQueue>,
    outbound: Arc<ReplyQueue>,
    totals: DispatchSummary,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        inbound: Arc<CommandQueue>,
        outbound: Arc<ReplyQueue>,
    ) -> Self {
        Self {
            registry,
            inbound,
            outbound,
            totals: DispatchSummary::default(),
        }
    }

    /// Dispatches every command currently queued, in arrival order.
    ///
    /// Unresolved commands and failing capabilities are logged and produce no
    /// reply.
    pub fn run(&mut self) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for command in self.inbound.drain() {
            summary.processed += 1;

            match self.registry.dispatch(&command.target_id, &command.args) {
                Ok(Outcome::Return(value)) => {
                    self.outbound.push(Reply::new(command.correlation_id, value));
                    summary.replied += 1;
                }
                Ok(Outcome::NoResult) => {
                    summary.silent += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Dropping command {} for '{}': {}",
                        command.correlation_id,
                        command.target_id,
                        e
                    );
                    summary.failed += 1;
                }
            }
        }

        if summary.processed > 0 {
            tracing::debug!(
                "Dispatched {} command(s): {} replied, {} silent, {} failed",
                summary.processed,
                summary.replied,
                summary.silent,
                summary.failed
            );
        }
        self.totals.add(&summary);
        summary
    }

    /// Returns the counts accumulated over every pass.
    pub fn totals(&self) -> DispatchSummary {
        self.totals
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }
}
