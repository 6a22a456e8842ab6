//! Remote URL validation.

use crate::error::{DaemonError, ValidationErrorKind};

const MAX_REMOTE_URL_LENGTH: usize = 2048;

/// Validate a sync remote URL before it reaches the sync tool's command line.
///
/// The URL itself is interpreted by the sync tool. This only rejects values
/// that could be mistaken for options or that carry control characters.
pub fn validate_remote_url(url: &str) -> Result<&str, DaemonError> {
    let invalid = |message: &str| DaemonError::Validation {
        kind: ValidationErrorKind::InvalidParameter {
            param: "remote_url".to_string(),
            message: message.to_string(),
        },
    };

    if url.is_empty() {
        return Err(invalid("Remote URL cannot be empty"));
    }

    if url.len() > MAX_REMOTE_URL_LENGTH {
        return Err(invalid("Remote URL is too long"));
    }

    if url.starts_with('-') {
        return Err(invalid("Remote URL cannot start with '-'"));
    }

    if url.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(invalid(
            "Remote URL cannot contain whitespace or control characters",
        ));
    }

    Ok(url)
}
