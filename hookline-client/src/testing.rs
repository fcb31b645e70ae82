//! In-memory transport for exercising the worker without a socket.

use crate::error::ClientError;
use crate::transport::{InboundSink, Transport};
use hookline_protocol::{Decoder, Handshake, Reply};
use parking_lot::Mutex;
use std::sync::Arc;

/// A frame written to the mock socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    Heartbeat,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub connected: bool,
    pub fail_connect: bool,
    /// Text sends containing this substring fail.
    pub fail_sends_containing: Option<String>,
    pub connect_attempts: usize,
    pub closes: usize,
    pub sent: Vec<Sent>,
    pub inbound: Option<InboundSink>,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the server dropping the connection.
    pub fn drop_connection(&self) {
        self.state.lock().connected = false;
    }

    /// Simulates a text frame arriving from the server.
    pub fn deliver(&self, payload: &str) -> bool {
        let sink = self.state.lock().inbound.clone();
        sink.is_some_and(|sink| sink.accept_text(payload))
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().sent.clone()
    }

    pub fn heartbeats(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Heartbeat))
            .count()
    }

    pub fn handshakes(&self) -> Vec<Handshake> {
        self.texts()
            .iter()
            .filter_map(|t| Decoder::decode_handshake(t).ok())
            .collect()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.texts()
            .iter()
            .filter(|t| t.contains("correlationId"))
            .filter_map(|t| Decoder::decode_reply(t).ok())
            .collect()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t),
                Sent::Heartbeat => None,
            })
            .collect()
    }
}

impl Transport for MockTransport {
    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn connect(&mut self, inbound: InboundSink) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if state.fail_connect {
            return Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        state.connected = true;
        state.inbound = Some(inbound);
        Ok(())
    }

    async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(ClientError::NotConnected);
        }
        if let Some(marker) = &state.fail_sends_containing {
            if text.contains(marker.as_str()) {
                return Err(ClientError::ConnectionClosed);
            }
        }
        state.sent.push(Sent::Text(text));
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(ClientError::NotConnected);
        }
        state.sent.push(Sent::Heartbeat);
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.inbound = None;
        state.closes += 1;
    }
}
