//! JSON message types exchanged with the broker.
//!
//! Each message declares its wire fields explicitly. Outbound messages carry
//! only the fields listed here, and null-valued fields are left out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote invocation request sent by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Correlation ID echoed back in the reply.
    pub correlation_id: String,

    /// Identifier of the capability to invoke.
    pub target_id: String,

    /// Positional arguments, passed through untouched.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Command {
    pub fn new(correlation_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            target_id: target_id.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }
}

/// Correlated result of a dispatched command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    /// Correlation ID of the originating command.
    pub correlation_id: String,

    /// Value returned by the capability.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

impl Reply {
    pub fn new(correlation_id: impl Into<String>, value: Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            value,
        }
    }
}

/// Announcement sent once each time a connection opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Component name.
    pub name: String,

    /// Requested channel capacity on the broker side.
    pub channel_size: u32,
}

impl Handshake {
    pub fn new(name: impl Into<String>, channel_size: u32) -> Self {
        Self {
            name: name.into(),
            channel_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_deserialize() {
        let json = r#"{"correlationId":"c-1","targetId":"echo","args":[1,"two",null]}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.correlation_id, "c-1");
        assert_eq!(cmd.target_id, "echo");
        assert_eq!(cmd.args, vec![json!(1), json!("two"), Value::Null]);
    }

    #[test]
    fn test_command_args_default() {
        let cmd: Command = serde_json::from_str(r#"{"correlationId":"c","targetId":"t"}"#).unwrap();
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_command_ignores_unknown_fields() {
        let json = r#"{"correlationId":"c","targetId":"t","args":[],"extra":true}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert_eq!(cmd, Command::new("c", "t"));
    }

    #[test]
    fn test_command_missing_target() {
        let result = serde_json::from_str::<Command>(r#"{"correlationId":"c"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_reply_omits_null_value() {
        let reply = Reply::new("abc", Value::Null);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json, json!({"correlationId": "abc"}));
    }

    #[test]
    fn test_reply_fields() {
        let reply = Reply::new("abc", json!({"x": 1}));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json, json!({"correlationId": "abc", "value": {"x": 1}}));
    }

    #[test]
    fn test_handshake_fields() {
        let hs = Handshake::new("garage", 64);
        let json = serde_json::to_value(&hs).unwrap();
        assert_eq!(json, json!({"name": "garage", "channelSize": 64}));
    }
}
