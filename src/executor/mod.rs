//! Command executor module.
//!
//! Handles safe subprocess spawning with kill-on-timeout.

mod subprocess;

pub use subprocess::{run_command, SubprocessBuilder, SubprocessResult};
