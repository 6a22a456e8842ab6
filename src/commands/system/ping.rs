//! Ping command for liveness checks.

use crate::error::DaemonError;
use crate::protocol::Operation;

use super::super::traits::Command;
use super::super::types::{CommandParams, CommandResult, ExecutionContext};

/// Answers with a pong. Served without authentication.
pub struct PingCommand;

impl Command for PingCommand {
    fn name(&self) -> &'static str {
        Operation::PING
    }

    fn validate(&self, _params: &CommandParams) -> Result<(), DaemonError> {
        Ok(())
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        _params: CommandParams,
    ) -> Result<CommandResult, DaemonError> {
        Ok(CommandResult::success(serde_json::json!({
            "pong": true,
            "timestamp": ctx.received_at.timestamp(),
            "request_id": ctx.request_id,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PeerInfo;

    fn create_test_context() -> ExecutionContext {
        ExecutionContext::new(
            "req-ping",
            PeerInfo {
                uid: 1000,
                gid: 1000,
                pid: 12345,
            },
            "ping",
        )
    }

    #[test]
    fn test_ping_name() {
        assert_eq!(PingCommand.name(), "ping");
    }

    #[test]
    fn test_ping_execute() {
        let ctx = create_test_context();
        let params = CommandParams::new(serde_json::json!({}));

        let result = PingCommand.execute(&ctx, params).unwrap();
        assert!(result.success);

        let data = result.data.unwrap();
        assert_eq!(data["pong"], true);
        assert!(data["timestamp"].is_i64());
        assert_eq!(data["request_id"], "req-ping");
    }
}
