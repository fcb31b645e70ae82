//! Socket transport.
//!
//! [`Transport`] is the seam between the connection worker and the socket.
//! [`WsTransport`] is the WebSocket implementation used in production; the
//! worker only ever talks to the trait.

use crate::error::ClientError;
use crate::queue::CommandQueue;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hookline_protocol::{Decoder, HEARTBEAT_PAYLOAD};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// A persistent bidirectional socket.
///
/// All methods are called from the connection worker only. Inbound frames are
/// delivered out of band through the [`InboundSink`] handed to `connect`.
pub trait Transport: Send + 'static {
    /// Returns whether the socket is currently open.
    fn is_connected(&self) -> bool;

    /// Opens the socket. Text frames received afterwards go to `inbound`.
    fn connect(
        &mut self,
        inbound: InboundSink,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Sends a text frame.
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Sends the zero-length heartbeat frame.
    fn send_heartbeat(&mut self) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Closes the socket, if open.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Receiving end of the inbound path: decodes text frames into commands.
#[derive(Debug, Clone)]
pub struct InboundSink {
    queue: Arc<CommandQueue>,
}

impl InboundSink {
    pub fn new(queue: Arc<CommandQueue>) -> Self {
        Self { queue }
    }

    /// Decodes a text frame and queues the command.
    ///
    /// Empty or malformed frames are dropped; returns whether a command was
    /// queued.
    pub fn accept_text(&self, payload: &str) -> bool {
        match Decoder::decode_command(payload) {
            Ok(command) => {
                tracing::trace!(
                    "Queued command {} for '{}'",
                    command.correlation_id,
                    command.target_id
                );
                self.queue.push(command);
                true
            }
            Err(e) => {
                tracing::trace!("Dropping inbound frame: {}", e);
                false
            }
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `close` waits for the close frame to flush before dropping the
/// socket.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// WebSocket transport built on `tokio-tungstenite`.
///
/// The read half runs as its own task and feeds the inbound sink directly, so
/// commands arrive independently of the worker's tick cadence.
pub struct WsTransport {
    url: String,
    writer: Option<SplitSink<WsStream, Message>>,
    reader: Option<JoinHandle<()>>,
    /// Cleared by the read task when the server goes away.
    open: Arc<AtomicBool>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            writer: None,
            reader: None,
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the URL this transport connects to.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&mut self, message: Message) -> Result<(), ClientError> {
        let writer = self.writer.as_mut().ok_or(ClientError::NotConnected)?;
        if !self.open.load(Ordering::SeqCst) {
            return Err(ClientError::ConnectionClosed);
        }
        if let Err(e) = writer.send(message).await {
            self.open.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }
}

impl Transport for WsTransport {
    fn is_connected(&self) -> bool {
        self.writer.is_some() && self.open.load(Ordering::SeqCst)
    }

    async fn connect(&mut self, inbound: InboundSink) -> Result<(), ClientError> {
        // Drop whatever is left of a previous connection first.
        self.close().await;

        tracing::debug!("Connecting to {}...", self.url);
        let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (writer, reader) = stream.split();

        // Fresh flag per connection so a stale read task cannot mark the new
        // connection closed.
        let open = Arc::new(AtomicBool::new(true));
        self.open = open.clone();
        self.reader = Some(tokio::spawn(read_loop(reader, inbound, open)));
        self.writer = Some(writer);

        tracing::debug!("WebSocket connected to {}", self.url);
        Ok(())
    }

    async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.send(Message::Text(text)).await
    }

    async fn send_heartbeat(&mut self) -> Result<(), ClientError> {
        self.send(Message::Binary(HEARTBEAT_PAYLOAD.to_vec())).await
    }

    async fn close(&mut self) {
        self.open.store(false, Ordering::SeqCst);

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        if let Some(mut writer) = self.writer.take() {
            tracing::debug!("Closing WebSocket to {}", self.url);
            // A peer that stopped reading would keep the flush pending forever.
            if tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await.is_err() {
                tracing::debug!("Close frame to {} not flushed, dropping socket", self.url);
            }
        }
    }
}

/// Reads frames until the socket closes, handing text frames to `inbound`.
async fn read_loop(
    mut reader: SplitStream<WsStream>,
    inbound: InboundSink,
    open: Arc<AtomicBool>,
) {
    while let Some(message) = reader.next().await {
        match message {
            Ok(Message::Text(text)) => {
                inbound.accept_text(&text);
            }
            Ok(Message::Close(frame)) => {
                tracing::debug!("Server closed the connection: {:?}", frame);
                break;
            }
            // Binary, ping and pong frames carry nothing for us.
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("WebSocket read failed: {}", e);
                break;
            }
        }
    }
    open.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    #[test]
    fn test_inbound_sink_queues_commands() {
        let queue = Arc::new(CommandQueue::new());
        let sink = InboundSink::new(queue.clone());

        assert!(sink.accept_text(r#"{"correlationId":"1","targetId":"echo","args":[5]}"#));
        let command = queue.pop().unwrap();
        assert_eq!(command.correlation_id, "1");
        assert_eq!(command.args, vec![json!(5)]);
    }

    #[test]
    fn test_inbound_sink_drops_bad_frames() {
        let queue = Arc::new(CommandQueue::new());
        let sink = InboundSink::new(queue.clone());

        assert!(!sink.accept_text(""));
        assert!(!sink.accept_text("garbage"));
        assert!(!sink.accept_text(r#"{"targetId":"echo"}"#));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_ws_transport_starts_disconnected() {
        let transport = WsTransport::new("ws://127.0.0.1:1/");
        assert!(!transport.is_connected());
        assert_eq!(transport.url(), "ws://127.0.0.1:1/");
    }

    #[tokio::test]
    async fn test_ws_send_without_connection() {
        let mut transport = WsTransport::new("ws://127.0.0.1:1/");
        let err = transport.send_text("x".to_string()).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    fn sink() -> InboundSink {
        InboundSink::new(Arc::new(CommandQueue::new()))
    }

    #[tokio::test]
    async fn test_send_after_server_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.close(None).await.unwrap();
            // Keep the TCP stream around until the test is done.
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(ws);
        });

        let mut transport = WsTransport::new(format!("ws://{}/", addr));
        transport.connect(sink()).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while transport.is_connected() {
            assert!(tokio::time::Instant::now() < deadline, "close not observed");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = transport.send_text("late".to_string()).await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed));
        assert!(err.is_disconnect());

        transport.close().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_close_does_not_wait_for_stalled_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Hold the socket open without ever reading from it.
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let mut transport = WsTransport::new(format!("ws://{}/", addr));
        transport.connect(sink()).await.unwrap();

        // Fill the socket buffers until a send can no longer complete.
        let chunk = "x".repeat(1 << 20);
        let mut stalled = false;
        for _ in 0..256 {
            let send = transport.send_text(chunk.clone());
            match tokio::time::timeout(Duration::from_millis(200), send).await {
                Ok(result) => result.unwrap(),
                Err(_) => {
                    stalled = true;
                    break;
                }
            }
        }
        assert!(stalled, "peer never applied back-pressure");

        let closed = tokio::time::timeout(CLOSE_TIMEOUT * 5, transport.close()).await;
        assert!(closed.is_ok(), "close blocked on a stalled peer");
        assert!(!transport.is_connected());

        server.abort();
    }
}
