//! Federation peers and their sync credentials.
//!
//! Peers are stored with AES-256-GCM sealed passwords. Credentials reach the
//! sync tool either on the child process environment or, for in-process
//! tools, through a process-wide lock on the daemon's own environment.

mod cipher;
mod credentials;
mod peer;
mod remote;
mod store;

pub use cipher::{decrypt_password, encrypt_password, NONCE_SIZE, TAG_SIZE};
pub use credentials::{
    EnvCredentialGuard, RemoteCredentials, DOLT_REMOTE_PASSWORD_ENV, DOLT_REMOTE_USER_ENV,
};
pub use peer::{FederationPeer, PeerSummary};
pub use remote::{DoltRemote, SyncDirection, SyncOutcome, SyncRemote};
pub use store::{FederationStore, PeerFailure, PeerListing, PEERS_FILE_NAME};
