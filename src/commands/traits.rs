//! Command trait definition.

use std::time::Duration;

use crate::error::DaemonError;

use super::types::{CommandParams, CommandResult, ExecutionContext};

/// Core trait for all operations the daemon can serve.
///
/// Requests reach a command only after they passed the size, rate and
/// authentication checks of the connection handler.
///
/// # Example
///
/// ```ignore
/// pub struct ListCommand;
///
/// impl Command for ListCommand {
///     fn name(&self) -> &'static str {
///         "list"
///     }
///
///     fn validate(&self, _params: &CommandParams) -> Result<(), DaemonError> {
///         Ok(())
///     }
///
///     fn execute(
///         &self,
///         ctx: &ExecutionContext,
///         _params: CommandParams,
///     ) -> Result<CommandResult, DaemonError> {
///         Ok(CommandResult::success(serde_json::json!({"actor": ctx.actor})))
///     }
/// }
/// ```
pub trait Command: Send + Sync {
    /// Operation name as sent on the wire (e.g., "ping", "federation_push").
    fn name(&self) -> &'static str;

    /// Validate the parameters before execution.
    fn validate(&self, params: &CommandParams) -> Result<(), DaemonError>;

    /// Execute the command.
    ///
    /// Called from a blocking context via `spawn_blocking`.
    fn execute(
        &self,
        ctx: &ExecutionContext,
        params: CommandParams,
    ) -> Result<CommandResult, DaemonError>;

    /// How long the connection handler waits for `execute`.
    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }
}
