//! Payload size ceilings.
//!
//! Requests and responses are bounded before they reach authentication or
//! the dispatcher. Responses get a larger ceiling because bulk listings are
//! legitimately bigger than anything a client sends.

use serde::Serialize;

use crate::error::{DaemonError, PayloadKind};

use super::{Request, Response};

/// Maximum size of a request payload (10 MiB).
pub const MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

/// Maximum size of a response payload (50 MiB).
pub const MAX_RESPONSE_SIZE: usize = 50 * 1024 * 1024;

/// Room for the JSON envelope around the request payload on the wire.
const ENVELOPE_ALLOWANCE: usize = 64 * 1024;

/// Largest frame the socket reader accepts before parsing a request.
pub const MAX_REQUEST_FRAME_SIZE: usize = MAX_REQUEST_SIZE + ENVELOPE_ALLOWANCE;

/// Check a request's payload size.
///
/// Fails if the arguments alone, or the arguments together with the
/// operation, actor, cwd and expected database, exceed [`MAX_REQUEST_SIZE`].
pub fn validate_request_size(req: &Request) -> Result<(), DaemonError> {
    let args_size = req.args_bytes().len();
    if args_size > MAX_REQUEST_SIZE {
        return Err(DaemonError::PayloadTooLarge {
            kind: PayloadKind::RequestArgs,
            size: args_size,
            max: MAX_REQUEST_SIZE,
        });
    }

    let total = args_size
        + req.operation.as_str().len()
        + req.actor.len()
        + req.cwd.len()
        + req.expected_db.len();
    if total > MAX_REQUEST_SIZE {
        return Err(DaemonError::PayloadTooLarge {
            kind: PayloadKind::Request,
            size: total,
            max: MAX_REQUEST_SIZE,
        });
    }

    Ok(())
}

/// Check a response's payload size against [`MAX_RESPONSE_SIZE`].
pub fn validate_response_size(resp: &Response) -> Result<(), DaemonError> {
    let data_size = resp.data_bytes().len();
    if data_size > MAX_RESPONSE_SIZE {
        return Err(DaemonError::PayloadTooLarge {
            kind: PayloadKind::Response,
            size: data_size,
            max: MAX_RESPONSE_SIZE,
        });
    }
    Ok(())
}

/// Rough upper estimate of a request's encoded size, used for logging.
pub fn estimate_request_size(req: &Request) -> usize {
    // JSON keys and punctuation
    let overhead = 100;
    overhead
        + req.operation.as_str().len()
        + req.args_bytes().len()
        + req.actor.len()
        + req.request_id.len()
        + req.cwd.len()
        + req.expected_db.len()
        + req.auth_token.len()
        + req.signature.len()
}

/// Serialize `value` to JSON, refusing results larger than [`MAX_REQUEST_SIZE`].
pub fn safe_marshal<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, DaemonError> {
    let data = serde_json::to_vec(value)?;
    if data.len() > MAX_REQUEST_SIZE {
        return Err(DaemonError::PayloadTooLarge {
            kind: PayloadKind::Marshal,
            size: data.len(),
            max: MAX_REQUEST_SIZE,
        });
    }
    Ok(data)
}
