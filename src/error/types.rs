//! Error types for the bd daemon.

use thiserror::Error;

/// Main error type for the daemon.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Socket-related errors.
    #[error("Socket error: {message}")]
    Socket { message: String },

    /// Authentication errors.
    #[error("Authentication error: {kind}")]
    Auth { kind: AuthErrorKind },

    /// The client exhausted its request window.
    #[error("Rate limit exceeded for client {client_id}")]
    RateLimited { client_id: String },

    /// A payload exceeded one of the fixed size ceilings.
    #[error("{kind} too large: {size} bytes (max {max} bytes)")]
    PayloadTooLarge {
        kind: PayloadKind,
        size: usize,
        max: usize,
    },

    /// Encryption and key derivation errors.
    #[error("Crypto error: {kind}")]
    Crypto { kind: CryptoErrorKind },

    /// Keyring file errors.
    #[error("Keyring error: {message}")]
    Keyring { message: String },

    /// Validation errors.
    #[error("Validation error: {kind}")]
    Validation { kind: ValidationErrorKind },

    /// Federation peer and remote errors.
    #[error("Federation error: {kind}")]
    Federation { kind: FederationErrorKind },

    /// Command execution errors.
    #[error("Command error: {kind}")]
    Command { kind: CommandErrorKind },

    /// Protocol errors.
    #[error("Protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Authentication error kinds.
#[derive(Error, Debug)]
pub enum AuthErrorKind {
    #[error("authentication required: missing auth_token")]
    MissingToken,

    #[error("authentication failed: invalid auth_token")]
    InvalidToken,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Unauthorized peer: UID {uid} not in allowed list")]
    UnauthorizedPeer { uid: u32 },

    #[error("Failed to load daemon secret: {message}")]
    SecretError { message: String },
}

/// Which payload a size check applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    RequestArgs,
    Request,
    Response,
    Marshal,
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PayloadKind::RequestArgs => "request payload",
            PayloadKind::Request => "request",
            PayloadKind::Response => "response payload",
            PayloadKind::Marshal => "marshaled data",
        };
        f.write_str(label)
    }
}

/// Crypto error kinds.
#[derive(Error, Debug)]
pub enum CryptoErrorKind {
    #[error("failed to create cipher")]
    CipherInit,

    #[error("ciphertext too short: {len} bytes, need at least {min}")]
    CiphertextTooShort { len: usize, min: usize },

    #[error("failed to decrypt: authentication failed")]
    DecryptFailed,

    #[error("failed to encrypt")]
    EncryptFailed,

    #[error("system random source failed")]
    RandomFailure,

    #[error("decrypted value is not valid UTF-8")]
    InvalidPlaintext,
}

/// Validation error kinds.
#[derive(Error, Debug)]
pub enum ValidationErrorKind {
    #[error("Invalid peer name '{name}': {reason}")]
    InvalidPeerName { name: String, reason: String },

    #[error("Missing required parameter: {param}")]
    MissingParameter { param: String },

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },
}

/// Federation error kinds.
#[derive(Error, Debug)]
pub enum FederationErrorKind {
    #[error("Federation peer not found: {name}")]
    PeerNotFound { name: String },

    #[error("Remote '{name}' already exists")]
    RemoteExists { name: String },

    #[error("Failed to store federation peers: {message}")]
    Storage { message: String },

    #[error("Sync with '{remote}' failed: {message}")]
    SyncFailed { remote: String, message: String },
}

/// Command error kinds.
#[derive(Error, Debug)]
pub enum CommandErrorKind {
    #[error("Unknown command: {name}")]
    UnknownCommand { name: String },

    #[error("Command execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("Command timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

/// Protocol error kinds.
#[derive(Error, Debug)]
pub enum ProtocolErrorKind {
    #[error("Message too large: {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Invalid message format: {message}")]
    InvalidMessageFormat { message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timed out")]
    ConnectionTimeout,
}

impl DaemonError {
    /// Wire error code reported to clients for this error.
    pub fn code(&self) -> &'static str {
        match self {
            DaemonError::Auth { kind } => match kind {
                AuthErrorKind::MissingToken => "AUTH_MISSING",
                AuthErrorKind::InvalidToken => "AUTH_INVALID",
                AuthErrorKind::InvalidSignature => "SIGNATURE_INVALID",
                AuthErrorKind::UnauthorizedPeer { .. } => "UNAUTHORIZED_PEER",
                AuthErrorKind::SecretError { .. } => "INTERNAL_ERROR",
            },
            DaemonError::RateLimited { .. } => "RATE_LIMITED",
            DaemonError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            DaemonError::Protocol {
                kind: ProtocolErrorKind::MessageTooLarge { .. },
            } => "PAYLOAD_TOO_LARGE",
            DaemonError::Protocol { .. } => "PROTOCOL_ERROR",
            DaemonError::Validation { .. } => "VALIDATION_ERROR",
            DaemonError::Federation {
                kind: FederationErrorKind::PeerNotFound { .. },
            } => "NOT_FOUND",
            DaemonError::Federation { .. } => "FEDERATION_ERROR",
            DaemonError::Command {
                kind: CommandErrorKind::UnknownCommand { .. },
            } => "UNKNOWN_COMMAND",
            DaemonError::Command { .. } => "COMMAND_ERROR",
            DaemonError::Crypto { .. } | DaemonError::Keyring { .. } => "CREDENTIAL_ERROR",
            DaemonError::Config { .. }
            | DaemonError::Socket { .. }
            | DaemonError::Io(_)
            | DaemonError::Serialization(_) => "INTERNAL_ERROR",
        }
    }

    /// Shorthand for a crypto error.
    pub(crate) fn crypto(kind: CryptoErrorKind) -> Self {
        DaemonError::Crypto { kind }
    }

    /// Shorthand for a keyring I/O error.
    pub(crate) fn keyring(message: impl Into<String>) -> Self {
        DaemonError::Keyring {
            message: message.into(),
        }
    }
}

/// Result type alias for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
