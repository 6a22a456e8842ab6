//! Credential keyring.
//!
//! The master key is derived from the database path with a fixed salt, so
//! every process that opens the same database arrives at the same key and
//! credentials encrypted before the keyring existed stay readable. The
//! keyring file is only a marker recording that the keyring was created.

use std::fmt;
use std::fs;
use std::num::NonZeroU32;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use ring::{digest, pbkdf2};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::DaemonError;

use super::files::{ensure_private_dir, remove_if_exists, write_private_file};
use super::fill_random;

/// Contents of the keyring marker file.
pub const KEYRING_MARKER: &[u8] = b"BEADS_KEYRING_V1";

/// Service name whose key is the master key itself.
pub const DOLT_CREDENTIALS_SERVICE: &str = "dolt-credentials";

/// Size of every derived key, in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of PBKDF2 salts, in bytes.
pub const SALT_SIZE: usize = 32;

/// PBKDF2 iteration count for password-derived keys.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const PBKDF2_ROUNDS: NonZeroU32 = match NonZeroU32::new(PBKDF2_ITERATIONS) {
    Some(rounds) => rounds,
    None => panic!("PBKDF2 iteration count must be nonzero"),
};

/// Fixed salt of the path-derived master key. Changing it orphans every
/// stored credential.
const LEGACY_SALT: &[u8] = b"beads-federation-key-v1";

/// Purpose-scoped key lookup.
pub trait Keyring: Send + Sync {
    /// Store a key for `(service, user)`.
    fn store_key(&self, service: &str, user: &str, key: &[u8]) -> Result<(), DaemonError>;

    /// Fetch the key for `(service, user)`.
    fn get_key(&self, service: &str, user: &str) -> Result<Zeroizing<Vec<u8>>, DaemonError>;

    /// Forget the key for `(service, user)`.
    fn delete_key(&self, service: &str, user: &str) -> Result<(), DaemonError>;
}

/// File-backed keyring whose keys are derived rather than stored.
pub struct FileKeyring {
    key_file: PathBuf,
    master_key: Zeroizing<[u8; KEY_SIZE]>,
}

impl FileKeyring {
    /// Open the keyring at `key_file` for the database at `db_path`,
    /// creating the marker file if it does not exist yet.
    pub fn open(key_file: impl Into<PathBuf>, db_path: &Path) -> Result<Self, DaemonError> {
        let key_file = key_file.into();

        match fs::read(&key_file) {
            Ok(contents) => {
                if contents != KEYRING_MARKER {
                    warn!(
                        path = %key_file.display(),
                        "Keyring marker has unexpected contents, continuing with derived key"
                    );
                }
                debug!(path = %key_file.display(), "Opened existing keyring");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = key_file.parent() {
                    ensure_private_dir(parent).map_err(|e| {
                        DaemonError::keyring(format!(
                            "failed to create keyring directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
                write_private_file(&key_file, KEYRING_MARKER).map_err(|e| {
                    DaemonError::keyring(format!(
                        "failed to write keyring file {}: {}",
                        key_file.display(),
                        e
                    ))
                })?;
                info!(path = %key_file.display(), "Created keyring");
            }
            Err(e) => {
                return Err(DaemonError::keyring(format!(
                    "failed to read keyring file {}: {}",
                    key_file.display(),
                    e
                )));
            }
        }

        Ok(Self {
            key_file,
            master_key: derive_key_from_db_path(db_path),
        })
    }

    /// Path of the keyring marker file.
    pub fn key_file(&self) -> &Path {
        &self.key_file
    }

    /// Remove the keyring marker file.
    pub fn cleanup(&self) -> Result<(), DaemonError> {
        remove_if_exists(&self.key_file).map_err(|e| {
            DaemonError::keyring(format!(
                "failed to remove keyring file {}: {}",
                self.key_file.display(),
                e
            ))
        })
    }
}

impl Keyring for FileKeyring {
    /// Keys are derived, so there is nothing to store.
    fn store_key(&self, _service: &str, _user: &str, _key: &[u8]) -> Result<(), DaemonError> {
        Ok(())
    }

    fn get_key(&self, service: &str, user: &str) -> Result<Zeroizing<Vec<u8>>, DaemonError> {
        if service == DOLT_CREDENTIALS_SERVICE {
            return Ok(Zeroizing::new(self.master_key.to_vec()));
        }

        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(self.master_key.as_slice());
        ctx.update(service.as_bytes());
        ctx.update(b":");
        ctx.update(user.as_bytes());
        Ok(Zeroizing::new(ctx.finish().as_ref().to_vec()))
    }

    /// Keys are derived, so there is nothing to delete.
    fn delete_key(&self, _service: &str, _user: &str) -> Result<(), DaemonError> {
        Ok(())
    }
}

impl fmt::Debug for FileKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileKeyring")
            .field("key_file", &self.key_file)
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

/// Derive the legacy master key: SHA-256 over the database path and a fixed salt.
pub fn derive_key_from_db_path(db_path: &Path) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(db_path.as_os_str().as_bytes());
    ctx.update(LEGACY_SALT);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(ctx.finish().as_ref());
    key
}

/// Derive a key from a password with PBKDF2-HMAC-SHA256.
pub fn derive_key_with_salt(password: &[u8], salt: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        PBKDF2_ROUNDS,
        salt,
        password,
        key.as_mut_slice(),
    );
    key
}

/// Generate a random salt for [`derive_key_with_salt`].
pub fn generate_salt() -> Result<[u8; SALT_SIZE], DaemonError> {
    let mut salt = [0u8; SALT_SIZE];
    fill_random(&mut salt)?;
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const DB_PATH: &str = "/test/db/path";

    fn open(dir: &TempDir, db_path: &str) -> FileKeyring {
        FileKeyring::open(dir.path().join("keys").join("keyring"), Path::new(db_path)).unwrap()
    }

    #[test]
    fn test_open_creates_marker() {
        let dir = TempDir::new().unwrap();
        let keyring = open(&dir, DB_PATH);

        assert_eq!(fs::read(keyring.key_file()).unwrap(), KEYRING_MARKER);
        let mode = fs::metadata(keyring.key_file()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_master_key_stable_across_instances() {
        let dir = TempDir::new().unwrap();
        let first = open(&dir, DB_PATH);
        let second = open(&dir, DB_PATH);

        let a = first.get_key(DOLT_CREDENTIALS_SERVICE, DB_PATH).unwrap();
        let b = second.get_key(DOLT_CREDENTIALS_SERVICE, DB_PATH).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
        assert_eq!(a.len(), KEY_SIZE);
    }

    #[test]
    fn test_master_key_stable_across_keyring_files() {
        let first_dir = TempDir::new().unwrap();
        let second_dir = TempDir::new().unwrap();

        let a = open(&first_dir, DB_PATH)
            .get_key(DOLT_CREDENTIALS_SERVICE, DB_PATH)
            .unwrap();
        let b = open(&second_dir, DB_PATH)
            .get_key(DOLT_CREDENTIALS_SERVICE, DB_PATH)
            .unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_master_key_is_path_derived() {
        let dir = TempDir::new().unwrap();
        let keyring = open(&dir, DB_PATH);

        let key = keyring.get_key(DOLT_CREDENTIALS_SERVICE, "ignored").unwrap();
        assert_eq!(
            key.as_slice(),
            derive_key_from_db_path(Path::new(DB_PATH)).as_slice()
        );

        let other = open(&dir, "/another/db");
        let other_key = other.get_key(DOLT_CREDENTIALS_SERVICE, "ignored").unwrap();
        assert_ne!(key.as_slice(), other_key.as_slice());
    }

    #[test]
    fn test_service_specific_keys() {
        let dir = TempDir::new().unwrap();
        let keyring = open(&dir, DB_PATH);

        let master = keyring.get_key(DOLT_CREDENTIALS_SERVICE, DB_PATH).unwrap();
        let a = keyring.get_key("service-a", "user-a").unwrap();
        let b = keyring.get_key("service-b", "user-b").unwrap();
        let a_other_user = keyring.get_key("service-a", "user-b").unwrap();

        assert_eq!(a.len(), KEY_SIZE);
        assert_ne!(a.as_slice(), b.as_slice());
        assert_ne!(a.as_slice(), a_other_user.as_slice());
        assert_ne!(a.as_slice(), master.as_slice());
        assert_eq!(
            a.as_slice(),
            keyring.get_key("service-a", "user-a").unwrap().as_slice()
        );
    }

    #[test]
    fn test_store_and_delete_are_noops() {
        let dir = TempDir::new().unwrap();
        let keyring = open(&dir, DB_PATH);
        let before = keyring.get_key("test-service", "test-user").unwrap();

        keyring
            .store_key("test-service", "test-user", b"test-key")
            .unwrap();
        keyring.delete_key("test-service", "test-user").unwrap();

        let after = keyring.get_key("test-service", "test-user").unwrap();
        assert_eq!(before.as_slice(), after.as_slice());
    }

    #[test]
    fn test_cleanup_removes_marker() {
        let dir = TempDir::new().unwrap();
        let keyring = open(&dir, DB_PATH);
        keyring.cleanup().unwrap();
        assert!(!keyring.key_file().exists());
        keyring.cleanup().unwrap();
    }

    #[test]
    fn test_debug_redacts_master_key() {
        let dir = TempDir::new().unwrap();
        let keyring = open(&dir, DB_PATH);
        let debug = format!("{:?}", keyring);
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_password_derivation() {
        let salt = generate_salt().unwrap();
        let other_salt = generate_salt().unwrap();
        assert_ne!(salt, other_salt);

        let a = derive_key_with_salt(b"correct horse", &salt);
        let b = derive_key_with_salt(b"correct horse", &salt);
        let c = derive_key_with_salt(b"correct horse", &other_salt);
        let d = derive_key_with_salt(b"battery staple", &salt);

        assert_eq!(a.as_slice(), b.as_slice());
        assert_ne!(a.as_slice(), c.as_slice());
        assert_ne!(a.as_slice(), d.as_slice());
    }
}
