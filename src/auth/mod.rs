//! Authentication module.
//!
//! Handles peer credential verification, the daemon auth token, HMAC
//! request/response signing and per-client rate limiting.

mod manager;
mod peer_creds;
mod rate_limit;
mod signer;

pub use manager::{AuthManager, SECRET_FILE_NAME, TOKEN_FILE_NAME};
pub use peer_creds::{verify_peer, PeerInfo};
pub use rate_limit::{RateLimiter, RateLimiterStats, DEFAULT_CLEANUP_INTERVAL};
pub use signer::Signer;
