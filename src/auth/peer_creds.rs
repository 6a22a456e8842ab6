//! Peer credential verification.
//!
//! Identifies the process on the other end of the socket by UID and admits
//! it only when that UID is configured as an allowed peer.

use crate::error::{AuthErrorKind, DaemonError};

/// Information about the connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// User ID of the peer process.
    pub uid: u32,
    /// Group ID of the peer process.
    pub gid: u32,
    /// Process ID of the peer process (0 where the platform does not report it).
    pub pid: i32,
}

impl PeerInfo {
    /// Rate limiting key for this peer.
    pub fn client_id(&self) -> String {
        format!("uid:{}", self.uid)
    }

    /// Fail unless the peer's UID is in `allowed_uids`.
    ///
    /// An empty list admits nobody.
    pub fn authorize(&self, allowed_uids: &[u32]) -> Result<(), DaemonError> {
        if allowed_uids.contains(&self.uid) {
            Ok(())
        } else {
            Err(DaemonError::Auth {
                kind: AuthErrorKind::UnauthorizedPeer { uid: self.uid },
            })
        }
    }
}

/// Read the peer's credentials and check them against `allowed_uids`.
pub fn verify_peer<S>(stream: &S, allowed_uids: &[u32]) -> Result<PeerInfo, DaemonError>
where
    S: std::os::fd::AsFd + std::os::fd::AsRawFd,
{
    let peer = peer_credentials(stream)?;
    peer.authorize(allowed_uids)?;
    Ok(peer)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn peer_credentials<S>(stream: &S) -> Result<PeerInfo, DaemonError>
where
    S: std::os::fd::AsFd + std::os::fd::AsRawFd,
{
    use nix::sys::socket::{getsockopt, sockopt::PeerCredentials};

    let creds = getsockopt(stream, PeerCredentials).map_err(|e| DaemonError::Socket {
        message: format!("Failed to get peer credentials: {}", e),
    })?;

    Ok(PeerInfo {
        uid: creds.uid(),
        gid: creds.gid(),
        pid: creds.pid(),
    })
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn peer_credentials<S>(stream: &S) -> Result<PeerInfo, DaemonError>
where
    S: std::os::fd::AsFd + std::os::fd::AsRawFd,
{
    let (uid, gid) =
        nix::unistd::getpeereid(stream.as_raw_fd()).map_err(|e| DaemonError::Socket {
            message: format!("Failed to get peer credentials: {}", e),
        })?;

    Ok(PeerInfo {
        uid: uid.as_raw(),
        gid: gid.as_raw(),
        pid: 0,
    })
}
