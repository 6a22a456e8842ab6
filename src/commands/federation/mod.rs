//! Federation commands: peer management and sync.

mod peers;
mod sync;

pub use peers::{AddPeerCommand, ListPeersCommand, RemovePeerCommand};
pub use sync::SyncCommand;
