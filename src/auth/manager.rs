//! Daemon authentication.
//!
//! A 32-byte secret is kept in an owner-only file beside the socket and
//! reused across restarts. The per-run auth token is derived from it and
//! written next to it so that local clients can read it and present it with
//! every non-diagnostic request.

use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, SecondsFormat, Utc};
use ring::hmac;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{check_private_permissions, random_bytes, remove_if_exists, write_private_file};
use crate::error::{AuthErrorKind, DaemonError};
use crate::protocol::{Request, Response};

use super::Signer;

/// File holding the daemon secret.
pub const SECRET_FILE_NAME: &str = "daemon-auth-secret";

/// File holding the current auth token.
pub const TOKEN_FILE_NAME: &str = "daemon-auth-token";

const SECRET_SIZE: usize = 32;
const TOKEN_HEX_LEN: usize = 32;

struct AuthState {
    token: String,
    /// MAC of the token, compared against the MAC of a presented token.
    token_tag: hmac::Tag,
    compare_key: hmac::Key,
    signer: Signer,
}

/// Issues and validates the daemon auth token and verifies signed requests.
pub struct AuthManager {
    state: RwLock<Option<AuthState>>,
    socket_path: PathBuf,
    secret_path: PathBuf,
    token_path: PathBuf,
    start_time: DateTime<Utc>,
}

impl AuthManager {
    /// Load or create the secret beside `socket_path` and issue the token
    /// for a daemon started at `start_time`.
    pub fn new(socket_path: &Path, start_time: DateTime<Utc>) -> Result<Self, DaemonError> {
        let dir = socket_path.parent().unwrap_or_else(|| Path::new("."));
        let secret_path = dir.join(SECRET_FILE_NAME);
        let token_path = dir.join(TOKEN_FILE_NAME);

        let secret = load_or_create_secret(&secret_path)?;
        let token = derive_token(&secret, socket_path, &start_time);

        write_private_file(&token_path, token.as_bytes())
            .map_err(|e| secret_error(format!("failed to write auth token: {}", e)))?;

        let compare_key = hmac::Key::new(hmac::HMAC_SHA256, &secret);
        let token_tag = hmac::sign(&compare_key, token.as_bytes());
        let signer = Signer::new(&secret);

        info!(
            token_path = %token_path.display(),
            "Auth token issued"
        );

        Ok(Self {
            state: RwLock::new(Some(AuthState {
                token,
                token_tag,
                compare_key,
                signer,
            })),
            socket_path: socket_path.to_path_buf(),
            secret_path,
            token_path,
            start_time,
        })
    }

    /// The current auth token, or `None` after [`cleanup`](Self::cleanup).
    pub fn token(&self) -> Option<String> {
        self.read_state(|state| state.token.clone())
    }

    /// Path of the token file clients read.
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Compare `presented` against the token in constant time.
    pub fn validate_token(&self, presented: &str) -> bool {
        self.read_state(|state| {
            hmac::verify(&state.compare_key, presented.as_bytes(), state.token_tag.as_ref())
                .is_ok()
        })
        .unwrap_or(false)
    }

    /// Authenticate a request.
    ///
    /// Diagnostic operations are admitted without a token. Everything else
    /// needs the current token, and a signed request must also carry a valid
    /// signature.
    pub fn validate_request_auth(&self, req: &Request) -> Result<(), DaemonError> {
        if req.operation.is_diagnostic() {
            return Ok(());
        }

        if req.auth_token.is_empty() {
            return Err(DaemonError::Auth {
                kind: AuthErrorKind::MissingToken,
            });
        }

        if !self.validate_token(&req.auth_token) {
            return Err(DaemonError::Auth {
                kind: AuthErrorKind::InvalidToken,
            });
        }

        if req.is_signed() {
            self.read_state(|state| {
                state
                    .signer
                    .verify_request(req, req.timestamp, &req.signature)
            })
            .unwrap_or(Err(DaemonError::Auth {
                kind: AuthErrorKind::InvalidSignature,
            }))?;
            debug!(operation = %req.operation, "Request signature verified");
        }

        Ok(())
    }

    /// Sign `resp` in place with `timestamp`.
    pub fn sign_response(&self, resp: &mut Response, timestamp: i64) {
        if let Some(signature) = self.read_state(|state| state.signer.sign_response(resp, timestamp))
        {
            resp.timestamp = timestamp;
            resp.signature = signature;
        }
    }

    /// Remove the secret and token files and stop admitting requests.
    pub fn cleanup(&self) -> Result<(), DaemonError> {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Err(e) = remove_if_exists(&self.token_path) {
            warn!(path = %self.token_path.display(), error = %e, "Failed to remove auth token");
        }
        remove_if_exists(&self.secret_path)
            .map_err(|e| secret_error(format!("failed to remove secret: {}", e)))?;

        info!("Auth state cleaned up");
        Ok(())
    }

    fn read_state<T>(&self, f: impl FnOnce(&AuthState) -> T) -> Option<T> {
        let guard = self.state.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(f)
    }
}

fn load_or_create_secret(path: &Path) -> Result<Zeroizing<Vec<u8>>, DaemonError> {
    match fs::read(path) {
        Ok(bytes) => {
            let secret = Zeroizing::new(bytes);
            check_private_permissions(path).map_err(|e| secret_error(e.to_string()))?;
            if secret.is_empty() {
                return Err(secret_error(format!("{} is empty", path.display())));
            }
            debug!(path = %path.display(), "Loaded existing daemon secret");
            Ok(secret)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let secret = random_bytes(SECRET_SIZE)?;
            write_private_file(path, &secret)
                .map_err(|e| secret_error(format!("failed to write secret: {}", e)))?;
            info!(path = %path.display(), "Generated new daemon secret");
            Ok(secret)
        }
        Err(e) => Err(secret_error(format!(
            "failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

fn derive_token(secret: &[u8], socket_path: &Path, start_time: &DateTime<Utc>) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let mut ctx = hmac::Context::with_key(&key);
    ctx.update(socket_path.as_os_str().as_bytes());
    ctx.update(
        start_time
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    let mut token = hex::encode(ctx.sign().as_ref());
    token.truncate(TOKEN_HEX_LEN);
    token
}

fn secret_error(message: impl Into<String>) -> DaemonError {
    DaemonError::Auth {
        kind: AuthErrorKind::SecretError {
            message: message.into(),
        },
    }
}
