//! Key material handling.
//!
//! Provides the credential keyring, owner-only secret files, random
//! generation and in-place wiping of sensitive buffers.

mod files;
mod keyring;

pub use files::{
    check_private_permissions, ensure_private_dir, remove_if_exists, write_private_file,
};
pub use keyring::{
    derive_key_from_db_path, derive_key_with_salt, generate_salt, FileKeyring, Keyring,
    DOLT_CREDENTIALS_SERVICE, KEYRING_MARKER, KEY_SIZE, PBKDF2_ITERATIONS, SALT_SIZE,
};

use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoErrorKind, DaemonError};

/// Overwrite a buffer with zeros in place.
///
/// Used to scrub decrypted secrets as soon as they are no longer needed.
pub fn secure_wipe(data: &mut [u8]) {
    data.zeroize();
}

/// Fill `buf` from the system CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<(), DaemonError> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| DaemonError::crypto(CryptoErrorKind::RandomFailure))
}

/// Generate `n` cryptographically secure random bytes.
pub fn random_bytes(n: usize) -> Result<Zeroizing<Vec<u8>>, DaemonError> {
    let mut buf = Zeroizing::new(vec![0u8; n]);
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Generate a random hex token from `bytes` random bytes.
pub fn random_token(bytes: usize) -> Result<String, DaemonError> {
    Ok(hex::encode(random_bytes(bytes)?.as_slice()))
}
