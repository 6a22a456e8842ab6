//! Input validation module.
//!
//! Provides validators for federation peer names and remote URLs.

mod peer_name;
mod remote_url;

pub use peer_name::{validate_peer_name, MAX_PEER_NAME_LENGTH};
pub use remote_url::validate_remote_url;
