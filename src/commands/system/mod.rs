//! Diagnostic commands.
//!
//! `ping`, `health` and `metrics` are answered without authentication.

mod health;
mod metrics;
mod ping;

pub use health::HealthCommand;
pub use metrics::MetricsCommand;
pub use ping::PingCommand;
