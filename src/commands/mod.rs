//! Command handlers module.
//!
//! Contains the command registry and the built-in operations.
//!
//! ## Adding a New Operation
//!
//! 1. Implement the `Command` trait
//! 2. Register it with `CommandRegistry::register` before the listener starts

mod registry;
mod traits;
mod types;

pub mod federation;
pub mod system;

pub use registry::CommandRegistry;
pub use traits::Command;
pub use types::{CommandParams, CommandResult, ExecutionContext};
