//! # hookline-protocol
//!
//! Wire protocol implementation for hookline.
//!
//! This crate provides:
//! - Command, reply and handshake message types with an explicit field schema
//! - JSON text encoding/decoding of those messages
//! - Protocol error types and constants

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use message::{Command, Handshake, Reply};

/// Payload of the heartbeat frame (zero-length binary).
pub const HEARTBEAT_PAYLOAD: &[u8] = &[];

/// Default channel capacity requested in the handshake.
pub const DEFAULT_CHANNEL_SIZE: u32 = 32;

/// Default polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
