//! Federation peer store.
//!
//! Peers live in a JSON document next to the database. Passwords are sealed
//! with the key the keyring hands out for sync credentials. When the keyring
//! is missing or fails, the path-derived key is used instead, which is the
//! same key the keyring derives, so records stay readable either way.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{
    derive_key_from_db_path, ensure_private_dir, write_private_file, Keyring,
    DOLT_CREDENTIALS_SERVICE,
};
use crate::error::{CryptoErrorKind, DaemonError, FederationErrorKind};
use crate::validation::{validate_peer_name, validate_remote_url};

use super::cipher::{decrypt_password, encrypt_password};
use super::credentials::{EnvCredentialGuard, RemoteCredentials};
use super::peer::{FederationPeer, PeerRecord};
use super::remote::{SyncOutcome, SyncRemote};

/// Default name of the peer document.
pub const PEERS_FILE_NAME: &str = "federation_peers.json";

const DOCUMENT_VERSION: u32 = 1;

#[derive(Deserialize)]
struct PeerDocument {
    #[serde(default)]
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    peers: BTreeMap<String, PeerRecord>,
}

#[derive(Serialize)]
struct PeerDocumentRef<'a> {
    version: u32,
    peers: &'a BTreeMap<String, PeerRecord>,
}

/// A peer that could not be read.
#[derive(Debug)]
pub struct PeerFailure {
    pub name: String,
    pub error: DaemonError,
}

/// Every peer, ordered by name, plus the ones that failed to decrypt.
#[derive(Debug, Default)]
pub struct PeerListing {
    pub peers: Vec<FederationPeer>,
    pub failures: Vec<PeerFailure>,
}

/// Persistent store of federation peers and their sealed credentials.
pub struct FederationStore {
    peers_path: PathBuf,
    db_path: PathBuf,
    keyring: Option<Arc<dyn Keyring>>,
    remote: Arc<dyn SyncRemote>,
    records: RwLock<BTreeMap<String, PeerRecord>>,
}

impl FederationStore {
    /// Open the store backed by `peers_path` for the database at `db_path`.
    pub fn open(
        peers_path: impl Into<PathBuf>,
        db_path: impl Into<PathBuf>,
        keyring: Option<Arc<dyn Keyring>>,
        remote: Arc<dyn SyncRemote>,
    ) -> Result<Self, DaemonError> {
        let peers_path = peers_path.into();
        let records = load_records(&peers_path)?;
        info!(
            path = %peers_path.display(),
            peers = records.len(),
            keyring = keyring.is_some(),
            "Federation store opened"
        );

        Ok(Self {
            peers_path,
            db_path: db_path.into(),
            keyring,
            remote,
            records: RwLock::new(records),
        })
    }

    /// Add a peer or replace the one with the same name, then register its
    /// remote.
    ///
    /// Creation time and last sync survive a replacement. An already
    /// registered remote is not an error.
    pub fn add_peer(&self, peer: &FederationPeer) -> Result<(), DaemonError> {
        validate_peer_name(&peer.name)?;
        validate_remote_url(&peer.remote_url)?;

        let password_encrypted = encrypt_password(&self.encryption_key(), &peer.password)?
            .map(hex::encode)
            .unwrap_or_default();

        {
            let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
            let now = Utc::now();
            let existing = records.get(&peer.name);
            let record = PeerRecord {
                name: peer.name.clone(),
                remote_url: peer.remote_url.clone(),
                username: peer.username.clone(),
                password_encrypted,
                sovereignty: peer.sovereignty.clone(),
                last_sync: existing.and_then(|r| r.last_sync),
                created_at: existing.map(|r| r.created_at).unwrap_or(now),
                updated_at: now,
            };

            let previous = records.insert(peer.name.clone(), record);
            if let Err(e) = self.persist(&records) {
                match previous {
                    Some(previous) => records.insert(peer.name.clone(), previous),
                    None => records.remove(&peer.name),
                };
                return Err(e);
            }
        }

        info!(
            peer = %peer.name,
            has_credentials = peer.has_credentials(),
            "Federation peer saved"
        );

        match self.remote.add_remote(&peer.name, &peer.remote_url) {
            Err(DaemonError::Federation {
                kind: FederationErrorKind::RemoteExists { .. },
            }) => {
                debug!(peer = %peer.name, "Remote already registered");
                Ok(())
            }
            other => other,
        }
    }

    /// Look up a peer and decrypt its password.
    pub fn get_peer(&self, name: &str) -> Result<Option<FederationPeer>, DaemonError> {
        let record = self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned();
        record.map(|r| self.decrypt_record(&r)).transpose()
    }

    /// List every peer. A peer whose password cannot be decrypted is
    /// reported in `failures` and does not stop the listing.
    pub fn list_peers(&self) -> PeerListing {
        let records: Vec<PeerRecord> = self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        let mut listing = PeerListing::default();
        for record in &records {
            match self.decrypt_record(record) {
                Ok(peer) => listing.peers.push(peer),
                Err(error) => {
                    warn!(peer = %record.name, error = %error, "Failed to decrypt federation peer");
                    listing.failures.push(PeerFailure {
                        name: record.name.clone(),
                        error,
                    });
                }
            }
        }
        listing
    }

    /// Remove a peer and, best-effort, its remote.
    ///
    /// Returns whether a peer record existed.
    pub fn remove_peer(&self, name: &str) -> Result<bool, DaemonError> {
        let existed = {
            let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
            match records.remove(name) {
                Some(record) => {
                    if let Err(e) = self.persist(&records) {
                        records.insert(name.to_string(), record);
                        return Err(e);
                    }
                    true
                }
                None => false,
            }
        };

        if let Err(e) = self.remote.remove_remote(name) {
            debug!(peer = %name, error = %e, "Remote removal failed, ignoring");
        }

        info!(peer = %name, existed, "Federation peer removed");
        Ok(existed)
    }

    /// Stamp the peer's last sync time with now. Unknown peers are ignored.
    pub fn update_last_sync(&self, name: &str) -> Result<(), DaemonError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let Some(record) = records.get_mut(name) else {
            return Ok(());
        };
        let previous = record.last_sync.replace(Utc::now());

        if let Err(e) = self.persist(&records) {
            if let Some(record) = records.get_mut(name) {
                record.last_sync = previous;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Run `op` with the peer's credentials, if it has any.
    ///
    /// The credentials are handed to `op` directly and wiped when it
    /// returns. On success the peer's last sync time is updated.
    pub fn with_peer_credentials<T, F>(&self, name: &str, op: F) -> Result<T, DaemonError>
    where
        F: FnOnce(Option<&RemoteCredentials>) -> Result<T, DaemonError>,
    {
        let peer = self.get_peer(name)?;
        let known = peer.is_some();
        let credentials = peer.as_ref().and_then(FederationPeer::credentials);
        drop(peer);

        let result = op(credentials.as_ref());
        drop(credentials);

        if result.is_ok() && known {
            self.record_sync(name);
        }
        result
    }

    /// Run `op` with the peer's credentials installed in the process
    /// environment.
    ///
    /// Every call that installs credentials is serialized process-wide for
    /// its whole duration. The variables are removed and the password wiped
    /// on every exit path, including a panic in `op`.
    pub fn with_peer_credentials_in_env<T, F>(&self, name: &str, op: F) -> Result<T, DaemonError>
    where
        F: FnOnce() -> Result<T, DaemonError>,
    {
        let peer = self.get_peer(name)?;
        let known = peer.is_some();
        let guard = peer
            .as_ref()
            .and_then(FederationPeer::credentials)
            .map(EnvCredentialGuard::install);
        drop(peer);

        let result = op();
        drop(guard);

        if result.is_ok() && known {
            self.record_sync(name);
        }
        result
    }

    /// Push to the peer's remote with its stored credentials.
    pub fn push_with_credentials(&self, name: &str) -> Result<SyncOutcome, DaemonError> {
        self.with_peer_credentials(name, |credentials| self.remote.push(name, credentials))
    }

    /// Pull from the peer's remote with its stored credentials.
    pub fn pull_with_credentials(&self, name: &str) -> Result<SyncOutcome, DaemonError> {
        self.with_peer_credentials(name, |credentials| self.remote.pull(name, credentials))
    }

    pub fn peers_path(&self) -> &Path {
        &self.peers_path
    }

    fn record_sync(&self, name: &str) {
        if let Err(e) = self.update_last_sync(name) {
            warn!(peer = %name, error = %e, "Failed to update last sync time");
        }
    }

    fn encryption_key(&self) -> Zeroizing<Vec<u8>> {
        if let Some(keyring) = &self.keyring {
            match keyring.get_key(DOLT_CREDENTIALS_SERVICE, &self.db_path_str()) {
                Ok(key) if !key.is_empty() => return key,
                Ok(_) => warn!("Keyring returned an empty key, using path-derived key"),
                Err(e) => warn!(error = %e, "Keyring unavailable, using path-derived key"),
            }
        }
        Zeroizing::new(derive_key_from_db_path(&self.db_path).to_vec())
    }

    fn db_path_str(&self) -> Cow<'_, str> {
        self.db_path.to_string_lossy()
    }

    fn decrypt_record(&self, record: &PeerRecord) -> Result<FederationPeer, DaemonError> {
        let password = if record.password_encrypted.is_empty() {
            Zeroizing::new(String::new())
        } else {
            let sealed = hex::decode(&record.password_encrypted)
                .map_err(|_| DaemonError::crypto(CryptoErrorKind::DecryptFailed))?;
            decrypt_password(&self.encryption_key(), &sealed)?
        };

        Ok(FederationPeer {
            name: record.name.clone(),
            remote_url: record.remote_url.clone(),
            username: record.username.clone(),
            password,
            sovereignty: record.sovereignty.clone(),
            last_sync: record.last_sync,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    fn persist(&self, records: &BTreeMap<String, PeerRecord>) -> Result<(), DaemonError> {
        let document = PeerDocumentRef {
            version: DOCUMENT_VERSION,
            peers: records,
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        if let Some(parent) = self.peers_path.parent() {
            ensure_private_dir(parent).map_err(|e| storage_error(e.to_string()))?;
        }
        write_private_file(&self.peers_path, &bytes).map_err(|e| storage_error(e.to_string()))
    }
}

fn load_records(path: &Path) -> Result<BTreeMap<String, PeerRecord>, DaemonError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => {
            return Err(storage_error(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    let document: PeerDocument = serde_json::from_slice(&bytes).map_err(|e| {
        storage_error(format!("failed to parse {}: {}", path.display(), e))
    })?;
    Ok(document.peers)
}

fn storage_error(message: impl Into<String>) -> DaemonError {
    DaemonError::Federation {
        kind: FederationErrorKind::Storage {
            message: message.into(),
        },
    }
}
