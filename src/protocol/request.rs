//! Request types for the daemon protocol.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::DaemonError;

/// RPC operation name.
///
/// The diagnostic operations are reserved names and are served without
/// authentication. Every other operation is carried as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operation {
    Ping,
    Health,
    Metrics,
    Other(String),
}

impl Operation {
    pub const PING: &'static str = "ping";
    pub const HEALTH: &'static str = "health";
    pub const METRICS: &'static str = "metrics";

    /// Wire name of the operation.
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Ping => Self::PING,
            Operation::Health => Self::HEALTH,
            Operation::Metrics => Self::METRICS,
            Operation::Other(name) => name,
        }
    }

    /// Diagnostic operations bypass authentication.
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Operation::Ping | Operation::Health | Operation::Metrics)
    }
}

impl From<String> for Operation {
    fn from(name: String) -> Self {
        match name.as_str() {
            Self::PING => Operation::Ping,
            Self::HEALTH => Operation::Health,
            Self::METRICS => Operation::Metrics,
            _ => Operation::Other(name),
        }
    }
}

impl From<&str> for Operation {
    fn from(name: &str) -> Self {
        Operation::from(name.to_string())
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request from a client.
///
/// `auth_token` is required for every non-diagnostic operation. When
/// `timestamp` is nonzero and `signature` is present the request is also
/// HMAC-verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// The operation to execute (e.g., "ping", "federation_push").
    pub operation: Operation,

    /// Operation arguments, kept as the raw JSON text the client sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Box<RawValue>>,

    #[serde(default)]
    pub actor: String,

    #[serde(default)]
    pub cwd: String,

    /// Database the client expects to be talking to.
    #[serde(default)]
    pub expected_db: String,

    #[serde(default)]
    pub request_id: String,

    #[serde(default)]
    pub auth_token: String,

    /// HMAC-SHA256 signature (hex-encoded).
    #[serde(default)]
    pub signature: String,

    /// Unix timestamp (seconds) covered by the signature; 0 when unsigned.
    #[serde(default)]
    pub timestamp: i64,
}

impl Request {
    /// Create an unsigned request with no arguments.
    pub fn new(operation: impl Into<Operation>) -> Self {
        Self {
            operation: operation.into(),
            args: None,
            actor: String::new(),
            cwd: String::new(),
            expected_db: String::new(),
            request_id: String::new(),
            auth_token: String::new(),
            signature: String::new(),
            timestamp: 0,
        }
    }

    /// Attach serialized arguments.
    pub fn with_args<T: Serialize>(mut self, args: &T) -> Result<Self, DaemonError> {
        self.args = Some(serde_json::value::to_raw_value(args)?);
        Ok(self)
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = token.into();
        self
    }

    /// Raw argument bytes exactly as received.
    pub fn args_bytes(&self) -> &[u8] {
        self.args
            .as_ref()
            .map(|raw| raw.get().as_bytes())
            .unwrap_or_default()
    }

    /// Decode the arguments into a typed value.
    pub fn args_as<T: DeserializeOwned>(&self) -> Result<T, DaemonError> {
        let raw = self.args.as_ref().map(|raw| raw.get()).unwrap_or("null");
        Ok(serde_json::from_str(raw)?)
    }

    /// Whether the request carries a signature to verify.
    pub fn is_signed(&self) -> bool {
        self.timestamp != 0 && !self.signature.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_from_wire_name() {
        assert_eq!(Operation::from("ping"), Operation::Ping);
        assert_eq!(Operation::from("health"), Operation::Health);
        assert_eq!(Operation::from("metrics"), Operation::Metrics);
        assert_eq!(
            Operation::from("list"),
            Operation::Other("list".to_string())
        );
        assert!(Operation::Ping.is_diagnostic());
        assert!(!Operation::from("list").is_diagnostic());
    }

    #[test]
    fn test_request_args_kept_verbatim() {
        let json = r#"{"operation":"list","args":{"status": "open"},"actor":"alice"}"#;
        let request: Request = serde_json::from_str(json).unwrap();

        assert_eq!(request.operation, Operation::Other("list".to_string()));
        assert_eq!(request.args_bytes(), br#"{"status": "open"}"#);
        assert_eq!(request.actor, "alice");
        assert!(request.auth_token.is_empty());
        assert!(!request.is_signed());
    }

    #[test]
    fn test_request_serialization() {
        let request = Request::new("federation_push")
            .with_args(&serde_json::json!({"peer": "web-1"}))
            .unwrap()
            .with_auth_token("abc");

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"operation\":\"federation_push\""));

        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.operation, request.operation);
        assert_eq!(parsed.auth_token, "abc");
        let args: serde_json::Value = parsed.args_as().unwrap();
        assert_eq!(args["peer"], "web-1");
    }

    #[test]
    fn test_missing_args_decode_as_null() {
        let request = Request::new("ping");
        assert!(request.args_bytes().is_empty());
        let args: Option<serde_json::Value> = request.args_as().unwrap();
        assert!(args.is_none());
    }
}
