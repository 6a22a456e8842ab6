//! HMAC-SHA256 request and response signing.
//!
//! The signed payload is a length-prefixed encoding of the authenticated
//! fields: a domain tag followed by each field as a big-endian `u64` length
//! and its bytes. Field values can contain any byte, including delimiters,
//! without two different messages encoding to the same payload.

use ring::hmac;

use crate::error::{AuthErrorKind, DaemonError};
use crate::protocol::{Request, Response};

const REQUEST_DOMAIN: &[u8] = b"bd-rpc-request-v1";
const RESPONSE_DOMAIN: &[u8] = b"bd-rpc-response-v1";

/// Signs and verifies RPC messages with the daemon secret.
pub struct Signer {
    key: hmac::Key,
}

impl Signer {
    /// Create a signer keyed by `secret`.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Sign a request.
    ///
    /// Covers operation, raw args, timestamp, actor and cwd, in that order.
    pub fn sign_request(&self, req: &Request, timestamp: i64) -> String {
        self.sign(&request_payload(req, timestamp))
    }

    /// Verify a request signature in constant time.
    pub fn verify_request(
        &self,
        req: &Request,
        timestamp: i64,
        signature: &str,
    ) -> Result<(), DaemonError> {
        self.verify(&request_payload(req, timestamp), signature)
    }

    /// Sign a response.
    ///
    /// Covers the success flag, error text and timestamp.
    pub fn sign_response(&self, resp: &Response, timestamp: i64) -> String {
        self.sign(&response_payload(resp, timestamp))
    }

    /// Verify a response signature in constant time.
    pub fn verify_response(
        &self,
        resp: &Response,
        timestamp: i64,
        signature: &str,
    ) -> Result<(), DaemonError> {
        self.verify(&response_payload(resp, timestamp), signature)
    }

    fn sign(&self, payload: &[u8]) -> String {
        hex::encode(hmac::sign(&self.key, payload).as_ref())
    }

    fn verify(&self, payload: &[u8], signature: &str) -> Result<(), DaemonError> {
        let invalid = || DaemonError::Auth {
            kind: AuthErrorKind::InvalidSignature,
        };
        let signature_bytes = hex::decode(signature).map_err(|_| invalid())?;
        hmac::verify(&self.key, payload, &signature_bytes).map_err(|_| invalid())
    }
}

fn request_payload(req: &Request, timestamp: i64) -> Vec<u8> {
    let timestamp = timestamp.to_string();
    encode_fields(
        REQUEST_DOMAIN,
        &[
            req.operation.as_str().as_bytes(),
            req.args_bytes(),
            timestamp.as_bytes(),
            req.actor.as_bytes(),
            req.cwd.as_bytes(),
        ],
    )
}

fn response_payload(resp: &Response, timestamp: i64) -> Vec<u8> {
    let success: &[u8] = if resp.success { b"true" } else { b"false" };
    let timestamp = timestamp.to_string();
    encode_fields(
        RESPONSE_DOMAIN,
        &[success, resp.error.as_bytes(), timestamp.as_bytes()],
    )
}

fn encode_fields(domain: &[u8], fields: &[&[u8]]) -> Vec<u8> {
    let capacity = fields.iter().map(|f| f.len() + 8).sum::<usize>() + domain.len() + 8;
    let mut buf = Vec::with_capacity(capacity);
    for field in std::iter::once(&domain).chain(fields.iter()) {
        buf.extend_from_slice(&(field.len() as u64).to_be_bytes());
        buf.extend_from_slice(field);
    }
    buf
}
