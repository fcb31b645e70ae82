//! Encoder and decoder for text frames.
//!
//! A WebSocket text frame carries exactly one JSON message, so there is no
//! framing or buffering here: one frame in, one message out.

use crate::error::ProtocolError;
use crate::message::{Command, Handshake, Reply};

/// Encodes outbound messages into text frame payloads.
pub struct Encoder;

impl Encoder {
    /// Encodes a reply.
    pub fn encode_reply(reply: &Reply) -> Result<String, ProtocolError> {
        Self::encode_json(reply)
    }

    /// Encodes a handshake.
    pub fn encode_handshake(handshake: &Handshake) -> Result<String, ProtocolError> {
        Self::encode_json(handshake)
    }

    /// Encodes any JSON-serializable value.
    pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(value)?)
    }
}

/// Decodes inbound text frame payloads.
pub struct Decoder;

impl Decoder {
    /// Decodes a command. Empty or whitespace-only payloads are rejected.
    pub fn decode_command(payload: &str) -> Result<Command, ProtocolError> {
        Self::decode_json(payload)
    }

    /// Decodes a reply (the broker side of the exchange).
    pub fn decode_reply(payload: &str) -> Result<Reply, ProtocolError> {
        Self::decode_json(payload)
    }

    /// Decodes a handshake (the broker side of the exchange).
    pub fn decode_handshake(payload: &str) -> Result<Handshake, ProtocolError> {
        Self::decode_json(payload)
    }

    fn decode_json<T: serde::de::DeserializeOwned>(payload: &str) -> Result<T, ProtocolError> {
        if payload.trim().is_empty() {
            return Err(ProtocolError::EmptyPayload);
        }
        Ok(serde_json::from_str(payload)?)
    }
}
