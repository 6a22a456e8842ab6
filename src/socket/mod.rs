//! Unix socket server module.
//!
//! Handles Unix socket listening and the per-connection request pipeline.

mod connection;
mod listener;

pub use connection::{handle_connection, ConnectionContext};
pub use listener::{ConnectionMetrics, SocketListener};
