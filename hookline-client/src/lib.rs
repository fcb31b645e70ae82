//! # hookline-client
//!
//! Client bridge for hookline.
//!
//! This crate provides:
//! - A connection worker with reconnect, rate-limited heartbeats and handshake
//! - Thread-safe inbound/outbound queues
//! - A capability registry and synchronous dispatcher
//! - A WebSocket transport and layered configuration

pub mod bridge;
pub mod cache;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::Bridge;
pub use cache::{CacheStore, MemoryCache};
pub use config::{Config, ConfigError};
pub use connection::{ConnectionConfig, ConnectionManager};
pub use dispatcher::{DispatchSummary, Dispatcher};
pub use error::ClientError;
pub use queue::{CommandQueue, ReplyQueue, SyncQueue};
pub use registry::{
    Capability, CapabilityContext, CapabilityRegistry, DispatchError, HandlerError, Outcome,
    RegistryError, MAX_DISPATCH_DEPTH,
};
pub use transport::{InboundSink, Transport, WsTransport};
