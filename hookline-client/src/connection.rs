//! Connection management.
//!
//! [`ConnectionManager`] owns the socket. Its worker runs on a dedicated
//! thread and executes one cycle per [`ConnectionManager::tick`]:
//!
//! 1. reconnect if the socket is down (and handshake on success),
//! 2. send a heartbeat if the polling interval has elapsed,
//! 3. send every queued reply.
//!
//! Failures are logged and never reach the caller; a failed connect is simply
//! retried on the next tick.

use crate::error::ClientError;
use crate::queue::{CommandQueue, ReplyQueue};
use crate::transport::{InboundSink, Transport};
use hookline_protocol::{Encoder, Handshake, DEFAULT_CHANNEL_SIZE, DEFAULT_POLL_INTERVAL_MS};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Default component name announced in the handshake.
pub const DEFAULT_COMPONENT_NAME: &str = "hookline";

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL of the broker.
    pub url: String,
    /// Component name for the handshake.
    pub component_name: String,
    /// Channel capacity requested in the handshake.
    pub channel_size: u32,
    /// Minimum time between heartbeats.
    pub poll_interval: Duration,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            component_name: DEFAULT_COMPONENT_NAME.to_string(),
            channel_size: DEFAULT_CHANNEL_SIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn with_component_name(mut self, name: impl Into<String>) -> Self {
        self.component_name = name.into();
        self
    }

    pub fn with_channel_size(mut self, size: u32) -> Self {
        self.channel_size = size;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Wake-up signals shared with one worker run.
#[derive(Default)]
struct Signals {
    tick: Notify,
    shutdown: Notify,
    stopping: AtomicBool,
}

struct ManagerState<T> {
    /// Transport parked while no worker runs.
    transport: Option<T>,
    /// Running worker; hands the transport back when joined.
    worker: Option<JoinHandle<T>>,
    signals: Option<Arc<Signals>>,
}

/// Owns the socket and moves data between it and the queues.
pub struct ConnectionManager<T: Transport> {
    config: Arc<ConnectionConfig>,
    inbound: Arc<CommandQueue>,
    outbound: Arc<ReplyQueue>,
    state: Mutex<ManagerState<T>>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Creates a manager (not yet started).
    pub fn new(
        config: ConnectionConfig,
        transport: T,
        inbound: Arc<CommandQueue>,
        outbound: Arc<ReplyQueue>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            inbound,
            outbound,
            state: Mutex::new(ManagerState {
                transport: Some(transport),
                worker: None,
                signals: None,
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Launches the worker thread. Does nothing if it is already running.
    pub fn start(&self) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        if state.worker.is_some() {
            return Ok(());
        }

        let transport = state.transport.take().ok_or_else(|| {
            ClientError::WorkerSpawn("transport was lost by a previous worker".to_string())
        })?;

        let signals = Arc::new(Signals::default());
        let worker = Worker::new(
            transport,
            self.config.clone(),
            InboundSink::new(self.inbound.clone()),
            self.outbound.clone(),
        );

        let thread_signals = signals.clone();
        let handle = std::thread::Builder::new()
            .name(format!("hookline-{}", self.config.component_name))
            .spawn(move || run_worker(worker, thread_signals))
            .map_err(|e| ClientError::WorkerSpawn(e.to_string()))?;

        tracing::info!("Connection worker started for {}", self.config.url);
        state.worker = Some(handle);
        state.signals = Some(signals);
        Ok(())
    }

    /// Wakes the worker for one cycle. Never blocks and performs no I/O.
    pub fn tick(&self) {
        if let Some(signals) = &self.state.lock().signals {
            signals.tick.notify_one();
        }
    }

    /// Stops the worker, closes the socket and discards both queues.
    ///
    /// Queued commands and unsent replies are abandoned, not delivered.
    pub fn stop(&self) {
        let (worker, signals) = {
            let mut state = self.state.lock();
            (state.worker.take(), state.signals.take())
        };

        if let Some(signals) = signals {
            signals.stopping.store(true, Ordering::SeqCst);
            signals.shutdown.notify_one();
        }

        if let Some(worker) = worker {
            match worker.join() {
                Ok(transport) => self.state.lock().transport = Some(transport),
                Err(_) => tracing::error!("Connection worker panicked"),
            }
            tracing::info!("Connection worker stopped");
        }

        let dropped_inbound = self.inbound.clear();
        let dropped_outbound = self.outbound.clear();
        if dropped_inbound + dropped_outbound > 0 {
            tracing::info!(
                "Discarded {} queued command(s) and {} unsent reply(ies)",
                dropped_inbound,
                dropped_outbound
            );
        }
    }

    /// Returns whether the worker thread is running.
    pub fn is_running(&self) -> bool {
        self.state.lock().worker.is_some()
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Entry point of the worker thread.
fn run_worker<T: Transport>(worker: Worker<T>, signals: Arc<Signals>) -> T {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to build worker runtime: {}", e);
            return worker.transport;
        }
    };
    runtime.block_on(worker.run(&signals))
}

/// State owned by the worker thread.
struct Worker<T> {
    transport: T,
    config: Arc<ConnectionConfig>,
    inbound: InboundSink,
    outbound: Arc<ReplyQueue>,
    last_poll: Instant,
}

impl<T: Transport> Worker<T> {
    fn new(
        transport: T,
        config: Arc<ConnectionConfig>,
        inbound: InboundSink,
        outbound: Arc<ReplyQueue>,
    ) -> Self {
        Self {
            transport,
            config,
            inbound,
            outbound,
            last_poll: Instant::now(),
        }
    }

    /// Parks between ticks until shut down, then closes the socket and hands
    /// the transport back.
    async fn run(mut self, signals: &Signals) -> T {
        self.last_poll = Instant::now();

        loop {
            if signals.stopping.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                biased;
                _ = signals.shutdown.notified() => break,
                _ = signals.tick.notified() => {}
            }

            if signals.stopping.load(Ordering::SeqCst) {
                break;
            }

            // Shutdown abandons a cycle in progress.
            tokio::select! {
                biased;
                _ = signals.shutdown.notified() => break,
                result = self.run_cycle() => {
                    if let Err(e) = result {
                        tracing::warn!("Connection cycle failed: {}", e);
                    }
                }
            }
        }

        self.transport.close().await;
        self.transport
    }

    /// Runs one cycle. Step failures are logged here; anything returned is
    /// logged by the caller.
    async fn run_cycle(&mut self) -> Result<(), ClientError> {
        if !self.transport.is_connected() {
            self.reconnect().await?;
        }

        // If still down, both steps fail item by item and replies are dropped.
        self.poll_if_due().await;
        self.flush_outbound().await;
        Ok(())
    }

    /// Makes one connection attempt and sends the handshake on success.
    async fn reconnect(&mut self) -> Result<(), ClientError> {
        if let Err(e) = self.transport.connect(self.inbound.clone()).await {
            tracing::warn!("Failed to connect to {}: {}", self.config.url, e);
            return Ok(());
        }
        tracing::info!("Connected to {}", self.config.url);

        let handshake = Handshake::new(&self.config.component_name, self.config.channel_size);
        let payload = Encoder::encode_handshake(&handshake)?;
        if let Err(e) = self.transport.send_text(payload).await {
            // No traffic on a connection that was never announced.
            self.transport.close().await;
            return Err(e);
        }
        tracing::debug!(
            "Sent handshake name={} channel_size={}",
            handshake.name,
            handshake.channel_size
        );
        Ok(())
    }

    /// Sends a heartbeat if more than the polling interval has passed since
    /// the last one.
    async fn poll_if_due(&mut self) {
        if self.last_poll.elapsed() <= self.config.poll_interval {
            return;
        }
        self.last_poll = Instant::now();

        if let Err(e) = self.transport.send_heartbeat().await {
            tracing::warn!("Failed to send heartbeat: {}", e);
        }
    }

    /// Sends every queued reply. A failed send does not stop the rest, and a
    /// reply whose send failed is not retried.
    async fn flush_outbound(&mut self) {
        for reply in self.outbound.drain() {
            let payload = match Encoder::encode_reply(&reply) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!("Failed to encode reply {}: {}", reply.correlation_id, e);
                    continue;
                }
            };

            match self.transport.send_text(payload).await {
                Ok(()) => tracing::trace!("Sent reply {}", reply.correlation_id),
                Err(e) => {
                    tracing::warn!("Failed to send reply {}: {}", reply.correlation_id, e);
                    if e.is_disconnect() {
                        tracing::debug!("Connection lost, will reconnect on next tick");
                    }
                }
            }
        }
    }
}
