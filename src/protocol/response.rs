//! Response types for the daemon protocol.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::debug;

use crate::error::DaemonError;

/// Sanitize error messages before sending to clients.
///
/// Replaces detailed error messages with generic ones keyed by error code.
/// Key material and file paths never leave the daemon.
fn sanitize_error_message(code: &str) -> &'static str {
    match code {
        "AUTH_MISSING" => "authentication required: missing auth_token",
        "AUTH_INVALID" => "authentication failed: invalid auth_token",
        "SIGNATURE_INVALID" => "invalid request signature",
        "UNAUTHORIZED_PEER" => "Authentication failed",
        "RATE_LIMITED" => "Too many requests",
        "PAYLOAD_TOO_LARGE" => "Payload too large",
        "VALIDATION_ERROR" => "Invalid request parameters",
        "NOT_FOUND" => "Not found",
        "UNKNOWN_COMMAND" => "Unknown operation",
        "COMMAND_ERROR" => "Command execution failed",
        "FEDERATION_ERROR" => "Federation operation failed",
        "CREDENTIAL_ERROR" => "Credential operation failed",
        "PROTOCOL_ERROR" => "Malformed request",
        "INTERNAL_ERROR" => "Internal server error",
        _ => "An error occurred",
    }
}

/// A response from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Whether the request succeeded.
    pub success: bool,

    /// Human-readable error text on failure.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,

    /// Machine-readable error code on failure (e.g., "AUTH_MISSING").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Response payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,

    /// Identifier correlating this response with the daemon's logs.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,

    /// Unix timestamp covered by `signature`; 0 when unsigned.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub timestamp: i64,

    /// HMAC-SHA256 signature over the response (hex-encoded).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Response {
    /// Create a success response carrying `data`.
    pub fn success<T: Serialize>(data: &T) -> Result<Self, DaemonError> {
        Ok(Self::success_raw(serde_json::value::to_raw_value(data)?))
    }

    /// Create a success response from an already-encoded payload.
    pub fn success_raw(data: Box<RawValue>) -> Self {
        Self {
            data: Some(data),
            ..Self::success_empty()
        }
    }

    /// Create a success response with no data.
    pub fn success_empty() -> Self {
        Self {
            success: true,
            error: String::new(),
            code: None,
            data: None,
            request_id: String::new(),
            timestamp: 0,
            signature: String::new(),
        }
    }

    /// Create an error response.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            code: Some(code.into()),
            ..Self::success_empty()
        }
    }

    /// Create an error response for `err` with a specific request ID.
    ///
    /// The error message is sanitized before being sent to the client to prevent
    /// information disclosure. The original error is logged server-side for debugging.
    pub fn error_with_id(request_id: &str, err: &DaemonError) -> Self {
        let code = err.code();

        debug!(
            request_id = %request_id,
            code = %code,
            message = %err,
            "Error response (sanitized for client)"
        );

        Self::error(code, sanitize_error_message(code)).with_request_id(request_id)
    }

    /// Set the request ID (for correlating with the original request).
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = id.into();
        self
    }

    /// Raw payload bytes (empty when there is no data).
    pub fn data_bytes(&self) -> &[u8] {
        self.data
            .as_ref()
            .map(|raw| raw.get().as_bytes())
            .unwrap_or_default()
    }

    /// Decode the payload into a typed value.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, DaemonError> {
        let raw = self.data.as_ref().map(|raw| raw.get()).unwrap_or("null");
        Ok(serde_json::from_str(raw)?)
    }
}
