//! bd daemon library.
//!
//! The trust boundary of the bd RPC daemon: peer credential checks, token
//! authentication with optional HMAC request signing, per-client rate
//! limiting, payload size ceilings, and the encrypted store of federation
//! peer credentials used for outbound sync.

pub mod auth;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod error;
pub mod executor;
pub mod federation;
pub mod protocol;
pub mod socket;
pub mod validation;
