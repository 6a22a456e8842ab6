//! Sync credentials and their injection into the sync tool's environment.
//!
//! The sync tool reads credentials from `DOLT_REMOTE_USER` and
//! `DOLT_REMOTE_PASSWORD`. They are normally set on the child process only.
//! [`EnvCredentialGuard`] sets them on the daemon process instead, for tools
//! that run in-process, and serializes every such use behind one lock.

use std::env;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::executor::SubprocessBuilder;

/// Username variable read by the sync tool.
pub const DOLT_REMOTE_USER_ENV: &str = "DOLT_REMOTE_USER";

/// Password variable read by the sync tool.
pub const DOLT_REMOTE_PASSWORD_ENV: &str = "DOLT_REMOTE_PASSWORD";

/// Serializes every credential-bearing phase that touches the process
/// environment.
static FEDERATION_ENV_LOCK: Mutex<()> = Mutex::new(());

/// Username and password for one sync call. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RemoteCredentials {
    username: String,
    password: String,
}

impl RemoteCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Set the credentials on a child process, replacing anything it would
    /// otherwise inherit.
    pub fn apply_to(&self, builder: SubprocessBuilder) -> SubprocessBuilder {
        let mut builder = builder
            .env_remove(DOLT_REMOTE_USER_ENV)
            .env_remove(DOLT_REMOTE_PASSWORD_ENV);
        if !self.username.is_empty() {
            builder = builder.env(DOLT_REMOTE_USER_ENV, &self.username);
        }
        if !self.password.is_empty() {
            builder = builder.secret_env(DOLT_REMOTE_PASSWORD_ENV, &self.password);
        }
        builder.sensitive()
    }
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Credentials installed in the process environment.
///
/// Holds the process-wide federation lock from installation until drop.
/// Dropping it, including during unwinding, unsets both variables and wipes
/// the password before the lock is released.
pub struct EnvCredentialGuard {
    credentials: RemoteCredentials,
    _lock: MutexGuard<'static, ()>,
}

impl EnvCredentialGuard {
    /// Wait for the federation lock and install `credentials`.
    pub fn install(credentials: RemoteCredentials) -> Self {
        let lock = FEDERATION_ENV_LOCK
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        env::remove_var(DOLT_REMOTE_USER_ENV);
        env::remove_var(DOLT_REMOTE_PASSWORD_ENV);
        if !credentials.username.is_empty() {
            env::set_var(DOLT_REMOTE_USER_ENV, &credentials.username);
        }
        if !credentials.password.is_empty() {
            env::set_var(DOLT_REMOTE_PASSWORD_ENV, &credentials.password);
        }
        debug!("Federation credentials installed in process environment");

        Self {
            credentials,
            _lock: lock,
        }
    }
}

impl Drop for EnvCredentialGuard {
    fn drop(&mut self) {
        env::remove_var(DOLT_REMOTE_USER_ENV);
        env::remove_var(DOLT_REMOTE_PASSWORD_ENV);
        self.credentials.zeroize();
        debug!("Federation credentials cleared from process environment");
    }
}
