//! Error types for the bd daemon.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
