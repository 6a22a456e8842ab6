//! Metrics command for monitoring daemon load.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::RateLimiter;
use crate::error::DaemonError;
use crate::protocol::Operation;
use crate::socket::ConnectionMetrics;

use super::super::traits::Command;
use super::super::types::{CommandParams, CommandResult, ExecutionContext};

/// Metrics command that returns connection and rate limiter statistics.
///
/// Returns:
/// - uptime_seconds: How long the daemon has been running
/// - requests_total: Total number of requests processed
/// - requests_failed: Number of requests answered with an error
/// - active_connections: Currently active connections
/// - rate_limiter: Tracked clients, requests in window, limit and window
pub struct MetricsCommand {
    start_time: Instant,
    metrics: Arc<ConnectionMetrics>,
    rate_limiter: Arc<RateLimiter>,
}

impl MetricsCommand {
    /// Create a new metrics command.
    pub fn new(metrics: Arc<ConnectionMetrics>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            start_time: Instant::now(),
            metrics,
            rate_limiter,
        }
    }

    /// Get the daemon uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Command for MetricsCommand {
    fn name(&self) -> &'static str {
        Operation::METRICS
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
            "uptime_seconds": self.uptime().as_secs(),
            "requests_total": self.metrics.total_requests(),
            "requests_failed": self.metrics.failed_requests(),
            "active_connections": self.metrics.active(),
            "rate_limiter": self.rate_limiter.stats(),
        })))
    }
}
