//! Federation peer model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::credentials::RemoteCredentials;

/// A remote peer this database synchronizes with.
///
/// The password only ever exists here in plaintext. It is wiped when the
/// peer is dropped.
#[derive(Clone)]
pub struct FederationPeer {
    pub name: String,
    pub remote_url: String,
    pub username: String,
    pub password: Zeroizing<String>,
    /// Sovereignty tier label, opaque to the daemon.
    pub sovereignty: String,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FederationPeer {
    /// A new peer without credentials.
    pub fn new(name: impl Into<String>, remote_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            remote_url: remote_url.into(),
            username: String::new(),
            password: Zeroizing::new(String::new()),
            sovereignty: String::new(),
            last_sync: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: &str) -> Self {
        self.username = username.into();
        self.password = Zeroizing::new(password.to_string());
        self
    }

    pub fn with_sovereignty(mut self, sovereignty: impl Into<String>) -> Self {
        self.sovereignty = sovereignty.into();
        self
    }

    /// Whether the peer carries a username or a password.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() || !self.password.is_empty()
    }

    /// Credentials to hand to a sync call, if the peer has any.
    pub fn credentials(&self) -> Option<RemoteCredentials> {
        self.has_credentials()
            .then(|| RemoteCredentials::new(&self.username, &self.password))
    }

    /// Client-facing view without the password.
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            name: self.name.clone(),
            remote_url: self.remote_url.clone(),
            username: self.username.clone(),
            has_password: !self.password.is_empty(),
            sovereignty: self.sovereignty.clone(),
            last_sync: self.last_sync,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl fmt::Debug for FederationPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederationPeer")
            .field("name", &self.name)
            .field("remote_url", &self.remote_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("sovereignty", &self.sovereignty)
            .field("last_sync", &self.last_sync)
            .finish()
    }
}

/// Peer as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSummary {
    pub name: String,
    pub remote_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    pub has_password: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sovereignty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Peer as persisted: the password only in encrypted form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PeerRecord {
    pub name: String,
    pub remote_url: String,
    #[serde(default)]
    pub username: String,
    /// Hex of nonce followed by the sealed password; empty when there is none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password_encrypted: String,
    #[serde(default)]
    pub sovereignty: String,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let peer = FederationPeer::new("web-1", "https://example.com/db")
            .with_credentials("alice", "hunter2");
        let debug = format!("{:?}", peer);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_credentials() {
        let bare = FederationPeer::new("web-1", "https://example.com/db");
        assert!(!bare.has_credentials());
        assert!(bare.credentials().is_none());

        let user_only = bare.clone().with_credentials("alice", "");
        let creds = user_only.credentials().unwrap();
        assert_eq!(creds.username(), "alice");
        assert_eq!(creds.password(), "");
    }

    #[test]
    fn test_summary_omits_password() {
        let peer = FederationPeer::new("web-1", "https://example.com/db")
            .with_credentials("alice", "hunter2")
            .with_sovereignty("T2");
        let summary = peer.summary();
        assert!(summary.has_password);

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"sovereignty\":\"T2\""));
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("last_sync"));
    }
}
