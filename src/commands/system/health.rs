//! Health command.

use std::sync::Arc;
use std::time::Instant;

use crate::error::DaemonError;
use crate::protocol::Operation;
use crate::socket::ConnectionMetrics;

use super::super::traits::Command;
use super::super::types::{CommandParams, CommandResult, ExecutionContext};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reports that the daemon is up, with its version and uptime.
pub struct HealthCommand {
    start_time: Instant,
    metrics: Arc<ConnectionMetrics>,
}

impl HealthCommand {
    pub fn new(metrics: Arc<ConnectionMetrics>) -> Self {
        Self {
            start_time: Instant::now(),
            metrics,
        }
    }
}

impl Command for HealthCommand {
    fn name(&self) -> &'static str {
        Operation::HEALTH
    }

    fn validate(&self, _params: &CommandParams) -> Result<(), DaemonError> {
        Ok(())
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        _params: CommandParams,
    ) -> Result<CommandResult, DaemonError> {
        Ok(CommandResult::success(serde_json::json!({
            "status": "healthy",
            "version": VERSION,
            "uptime_seconds": self.start_time.elapsed().as_secs(),
            "active_connections": self.metrics.active(),
        })))
    }
}
