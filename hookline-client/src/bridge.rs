//! Bridge facade: wires the registry, queues, dispatcher and connection.

use crate::connection::{ConnectionConfig, ConnectionManager};
use crate::dispatcher::{DispatchSummary, Dispatcher};
use crate::error::ClientError;
use crate::queue::{CommandQueue, ReplyQueue};
use crate::registry::CapabilityRegistry;
use crate::transport::{Transport, WsTransport};
use std::sync::Arc;

/// A component exposing its capabilities to a remote broker.
///
/// The host calls [`Bridge::tick`] at its own cadence. Each tick wakes the
/// connection worker and dispatches queued commands on the calling thread.
pub struct Bridge<T: Transport = WsTransport> {
    connection: ConnectionManager<T>,
    dispatcher: Dispatcher,
}

impl Bridge<WsTransport> {
    /// Creates a bridge talking WebSocket to `config.url`.
    pub fn websocket(config: ConnectionConfig, registry: Arc<CapabilityRegistry>) -> Self {
        let transport = WsTransport::new(config.url.clone());
        Self::new(config, registry, transport)
    }
}

impl<T: Transport> Bridge<T> {
    pub fn new(config: ConnectionConfig, registry: Arc<CapabilityRegistry>, transport: T) -> Self {
        let inbound = Arc::new(CommandQueue::new());
        let outbound = Arc::new(ReplyQueue::new());
        Self {
            connection: ConnectionManager::new(config, transport, inbound.clone(), outbound.clone()),
            dispatcher: Dispatcher::new(registry, inbound, outbound),
        }
    }

    /// Starts the connection worker.
    pub fn start(&self) -> Result<(), ClientError> {
        tracing::info!(
            "Starting bridge '{}' with {} capabilit(ies)",
            self.connection.config().component_name,
            self.dispatcher.registry().len()
        );
        self.connection.start()
    }

    /// Wakes the connection worker, then dispatches queued commands.
    pub fn tick(&mut self) -> DispatchSummary {
        self.connection.tick();
        self.dispatcher.run()
    }

    /// Stops the connection worker and discards queued work.
    pub fn stop(&self) {
        self.connection.stop();
    }

    pub fn is_running(&self) -> bool {
        self.connection.is_running()
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
