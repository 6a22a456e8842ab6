//! Wire protocol module.
//!
//! Defines request/response types, payload size limits and message framing
//! for socket communication.
//!
//! ## Wire Format
//!
//! Messages are length-prefixed JSON:
//! ```text
//! [4 bytes: length (big-endian u32)][JSON payload]
//! ```

pub mod limits;
mod request;
mod response;
mod wire;

pub use limits::{
    safe_marshal, validate_request_size, validate_response_size, MAX_REQUEST_SIZE,
    MAX_RESPONSE_SIZE,
};
pub use request::{Operation, Request};
pub use response::Response;
pub use wire::{read_message, read_message_with_timeout, write_message, write_message_with_timeout};
