//! AES-256-GCM sealing of peer passwords.
//!
//! Ciphertext layout is the 12-byte random nonce followed by the sealed
//! plaintext and its 16-byte tag. No associated data is used.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, MAX_TAG_LEN, NONCE_LEN};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::fill_random;
use crate::error::{CryptoErrorKind, DaemonError};

/// Size of the nonce prefix.
pub const NONCE_SIZE: usize = NONCE_LEN;

/// Size of the authentication tag suffix.
pub const TAG_SIZE: usize = MAX_TAG_LEN;

fn cipher(key: &[u8]) -> Result<LessSafeKey, DaemonError> {
    let key = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| DaemonError::crypto(CryptoErrorKind::CipherInit))?;
    Ok(LessSafeKey::new(key))
}

/// Seal `plaintext` under `key` with a fresh random nonce.
pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DaemonError> {
    let cipher = cipher(key)?;

    let mut nonce = [0u8; NONCE_SIZE];
    fill_random(&mut nonce)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + plaintext.len() + TAG_SIZE);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(plaintext);

    let sealed = cipher.seal_in_place_separate_tag(
        Nonce::assume_unique_for_key(nonce),
        Aad::empty(),
        &mut out[NONCE_SIZE..],
    );
    let tag = match sealed {
        Ok(tag) => tag,
        Err(_) => {
            out.zeroize();
            return Err(DaemonError::crypto(CryptoErrorKind::EncryptFailed));
        }
    };
    out.extend_from_slice(tag.as_ref());
    Ok(out)
}

/// Open a value produced by [`seal`].
pub fn open(key: &[u8], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, DaemonError> {
    if sealed.len() < NONCE_SIZE {
        return Err(DaemonError::crypto(CryptoErrorKind::CiphertextTooShort {
            len: sealed.len(),
            min: NONCE_SIZE,
        }));
    }

    let cipher = cipher(key)?;
    let (nonce, body) = sealed.split_at(NONCE_SIZE);
    let nonce = Nonce::try_assume_unique_for_key(nonce)
        .map_err(|_| DaemonError::crypto(CryptoErrorKind::DecryptFailed))?;

    let mut buf = Zeroizing::new(body.to_vec());
    let plain_len = cipher
        .open_in_place(nonce, Aad::empty(), buf.as_mut_slice())
        .map_err(|_| DaemonError::crypto(CryptoErrorKind::DecryptFailed))?
        .len();
    buf.truncate(plain_len);
    Ok(buf)
}

/// Encrypt a password. An empty password has no ciphertext.
pub fn encrypt_password(key: &[u8], password: &str) -> Result<Option<Vec<u8>>, DaemonError> {
    if password.is_empty() {
        return Ok(None);
    }
    seal(key, password.as_bytes()).map(Some)
}

/// Decrypt a password. Empty input decrypts to the empty password.
pub fn decrypt_password(key: &[u8], encrypted: &[u8]) -> Result<Zeroizing<String>, DaemonError> {
    if encrypted.is_empty() {
        return Ok(Zeroizing::new(String::new()));
    }
    let plaintext = open(key, encrypted)?;
    let password = std::str::from_utf8(&plaintext)
        .map_err(|_| DaemonError::crypto(CryptoErrorKind::InvalidPlaintext))?;
    Ok(Zeroizing::new(password.to_string()))
}
