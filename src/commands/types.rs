//! Command types: parameters, results, and execution context.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::PeerInfo;
use crate::error::{DaemonError, ValidationErrorKind};
use crate::protocol::Request;

/// Wrapper around operation arguments with helper methods.
#[derive(Debug, Clone)]
pub struct CommandParams {
    inner: serde_json::Value,
}

impl CommandParams {
    /// Create new command parameters from a JSON value.
    pub fn new(value: serde_json::Value) -> Self {
        Self { inner: value }
    }

    /// Decode a request's arguments. Missing arguments become an empty object.
    pub fn from_request(request: &Request) -> Result<Self, DaemonError> {
        let value: Option<serde_json::Value> =
            request.args_as().map_err(|e| DaemonError::Validation {
                kind: ValidationErrorKind::InvalidParameter {
                    param: "args".to_string(),
                    message: e.to_string(),
                },
            })?;
        Ok(Self::new(
            value.unwrap_or_else(|| serde_json::Value::Object(Default::default())),
        ))
    }

    /// Get the underlying JSON value.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.inner
    }

    /// Get a required string parameter.
    pub fn get_string(&self, key: &str) -> Result<String, DaemonError> {
        self.inner
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| missing(key))
    }

    /// Get an optional string parameter.
    pub fn get_optional_string(&self, key: &str) -> Option<String> {
        self.inner.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
    }

    /// Require that a string parameter exists (for validation).
    pub fn require_string(&self, key: &str) -> Result<(), DaemonError> {
        if self.inner.get(key).and_then(|v| v.as_str()).is_some() {
            Ok(())
        } else {
            Err(missing(key))
        }
    }

    /// Decode the whole argument object into a typed value.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, DaemonError> {
        T::deserialize(&self.inner).map_err(|e| DaemonError::Validation {
            kind: ValidationErrorKind::InvalidParameter {
                param: "args".to_string(),
                message: e.to_string(),
            },
        })
    }
}

fn missing(key: &str) -> DaemonError {
    DaemonError::Validation {
        kind: ValidationErrorKind::MissingParameter {
            param: key.to_string(),
        },
    }
}

impl From<serde_json::Value> for CommandParams {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

/// Result of command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,
    /// Result data on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error code on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CommandResult {
    /// Create a success result with data.
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error_code: None,
            error_message: None,
        }
    }

    /// Create a success result with no data.
    pub fn success_empty() -> Self {
        Self {
            success: true,
            data: None,
            error_code: None,
            error_message: None,
        }
    }

    /// Create a failure result.
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }
}

/// Execution context for a command.
///
/// Carries the request metadata and the verified identity of the peer.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Identifier for this request, echoed in the response.
    pub request_id: String,
    /// Credentials of the connected peer.
    pub peer: PeerInfo,
    /// Actor the client claims to act for.
    pub actor: String,
    /// Client working directory.
    pub cwd: String,
    /// The operation being executed.
    pub operation: String,
    /// When the request was received.
    pub received_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Create a new execution context.
    pub fn new(request_id: impl Into<String>, peer: PeerInfo, operation: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            peer,
            actor: String::new(),
            cwd: String::new(),
            operation: operation.into(),
            received_at: Utc::now(),
        }
    }

    /// Context for `request` as received from `peer`.
    pub fn for_request(request_id: impl Into<String>, peer: PeerInfo, request: &Request) -> Self {
        Self {
            actor: request.actor.clone(),
            cwd: request.cwd.clone(),
            ..Self::new(request_id, peer, request.operation.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_params_get_string() {
        let params = CommandParams::new(serde_json::json!({
            "name": "test",
            "count": 42
        }));

        assert_eq!(params.get_string("name").unwrap(), "test");
        assert!(params.get_string("missing").is_err());
        assert!(params.get_string("count").is_err());
    }

    #[test]
    fn test_command_params_optional() {
        let params = CommandParams::new(serde_json::json!({
            "name": "test"
        }));

        assert_eq!(params.get_optional_string("name"), Some("test".to_string()));
        assert_eq!(params.get_optional_string("missing"), None);
    }

    #[test]
    fn test_params_from_request() {
        let request = Request::new("federation_push")
            .with_args(&serde_json::json!({"peer": "web-1"}))
            .unwrap();
        let params = CommandParams::from_request(&request).unwrap();
        assert_eq!(params.get_string("peer").unwrap(), "web-1");

        let bare = CommandParams::from_request(&Request::new("ping")).unwrap();
        assert!(bare.as_value().is_object());
    }

    #[test]
    fn test_parse_typed_args() {
        #[derive(Deserialize)]
        struct Args {
            peer: String,
        }

        let params = CommandParams::new(serde_json::json!({"peer": "web-1"}));
        let args: Args = params.parse().unwrap();
        assert_eq!(args.peer, "web-1");

        let wrong = CommandParams::new(serde_json::json!({"peer": 7}));
        assert!(matches!(
            wrong.parse::<Args>(),
            Err(DaemonError::Validation {
                kind: ValidationErrorKind::InvalidParameter { .. }
            })
        ));
    }

    #[test]
    fn test_context_for_request() {
        let request = Request::new("list").with_actor("alice").with_cwd("/repo");
        let peer = PeerInfo {
            uid: 1000,
            gid: 1000,
            pid: 42,
        };
        let ctx = ExecutionContext::for_request("req-1", peer, &request);
        assert_eq!(ctx.request_id, "req-1");
        assert_eq!(ctx.operation, "list");
        assert_eq!(ctx.actor, "alice");
        assert_eq!(ctx.cwd, "/repo");
    }

    #[test]
    fn test_command_result_failure() {
        let result = CommandResult::failure("ERR_CODE", "Something failed");
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.error_code, Some("ERR_CODE".to_string()));
    }
}
