//! Federation peer name validation.
//!
//! Peer names double as remote names on the command line of the sync tool,
//! so they are restricted to a conservative identifier alphabet.

use crate::error::{DaemonError, ValidationErrorKind};

/// Maximum length for peer names.
pub const MAX_PEER_NAME_LENGTH: usize = 64;

/// Validate a federation peer name.
///
/// Rules:
/// - Must not be empty
/// - Must not exceed 64 characters
/// - Must start with an ASCII letter
/// - May only contain ASCII letters, digits, underscores, and hyphens
///
/// # Errors
///
/// Returns `InvalidPeerName` naming the first rule the name breaks.
pub fn validate_peer_name(name: &str) -> Result<&str, DaemonError> {
    let invalid = |reason: String| DaemonError::Validation {
        kind: ValidationErrorKind::InvalidPeerName {
            name: name.to_string(),
            reason,
        },
    };

    let Some(first) = name.chars().next() else {
        return Err(invalid("peer name cannot be empty".to_string()));
    };

    if name.len() > MAX_PEER_NAME_LENGTH {
        return Err(invalid(format!(
            "peer name too long (max {} characters)",
            MAX_PEER_NAME_LENGTH
        )));
    }

    if !first.is_ascii_alphabetic() {
        return Err(invalid("peer name must start with a letter".to_string()));
    }

    if let Some(c) = name
        .chars()
        .find(|&c| !c.is_ascii_alphanumeric() && c != '_' && c != '-')
    {
        return Err(invalid(format!(
            "peer name contains invalid character '{}'. Only letters, digits, underscores, and hyphens are allowed",
            c.escape_default()
        )));
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_peer_names() {
        assert!(validate_peer_name("web-1").is_ok());
        assert!(validate_peer_name("a").is_ok());
        assert!(validate_peer_name("Town_Hall").is_ok());
        assert!(validate_peer_name("peer-2_backup").is_ok());
    }

    #[test]
    fn test_empty_peer_name() {
        assert!(validate_peer_name("").is_err());
    }

    #[test]
    fn test_too_long_peer_name() {
        let long_name = "a".repeat(65);
        assert!(validate_peer_name(&long_name).is_err());

        // Exactly 64 should be ok
        let exact_name = "a".repeat(64);
        assert!(validate_peer_name(&exact_name).is_ok());
    }

    #[test]
    fn test_must_start_with_letter() {
        assert!(validate_peer_name("1web").is_err());
        assert!(validate_peer_name("_web").is_err());
        assert!(validate_peer_name("-web").is_err());
    }

    #[test]
    fn test_invalid_characters() {
        assert!(validate_peer_name("a@b").is_err());
        assert!(validate_peer_name("web 1").is_err());
        assert!(validate_peer_name("web.1").is_err());
        assert!(validate_peer_name("web;rm").is_err());
        assert!(validate_peer_name("wéb").is_err());
    }

    #[test]
    fn test_error_kind() {
        let err = validate_peer_name("1web").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(matches!(
            err,
            DaemonError::Validation {
                kind: ValidationErrorKind::InvalidPeerName { ref name, .. }
            } if name == "1web"
        ));
    }
}
