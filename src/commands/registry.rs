//! Command registry for dispatching requests to handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::auth::RateLimiter;
use crate::error::{CommandErrorKind, DaemonError};
use crate::federation::FederationStore;
use crate::socket::ConnectionMetrics;

use super::federation::{AddPeerCommand, ListPeersCommand, RemovePeerCommand, SyncCommand};
use super::system::{HealthCommand, MetricsCommand, PingCommand};
use super::traits::Command;
use super::types::{CommandParams, CommandResult, ExecutionContext};

/// Registry of the operations the daemon serves.
#[derive(Clone)]
pub struct CommandRegistry {
    commands: HashMap<&'static str, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Create a registry holding the diagnostic commands.
    pub fn new(metrics: Arc<ConnectionMetrics>, rate_limiter: Arc<RateLimiter>) -> Self {
        let mut registry = Self {
            commands: HashMap::new(),
        };

        registry.register(Arc::new(PingCommand));
        registry.register(Arc::new(HealthCommand::new(Arc::clone(&metrics))));
        registry.register(Arc::new(MetricsCommand::new(metrics, rate_limiter)));

        info!(
            count = registry.commands.len(),
            "Command registry initialized"
        );

        registry
    }

    /// Add the federation commands backed by `store`.
    pub fn with_federation(mut self, store: Arc<FederationStore>, sync_timeout: Duration) -> Self {
        self.register(Arc::new(AddPeerCommand::new(Arc::clone(&store))));
        self.register(Arc::new(ListPeersCommand::new(Arc::clone(&store))));
        self.register(Arc::new(RemovePeerCommand::new(Arc::clone(&store))));
        self.register(Arc::new(SyncCommand::push(Arc::clone(&store), sync_timeout)));
        self.register(Arc::new(SyncCommand::pull(store, sync_timeout)));

        info!(
            count = self.commands.len(),
            "Federation commands registered"
        );
        self
    }

    /// Register a command, replacing any command with the same name.
    pub fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name();
        debug!(command = name, "Registering command");
        self.commands.insert(name, command);
    }

    /// Get a command by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    /// Dispatch a request to the appropriate command handler.
    pub fn dispatch(
        &self,
        ctx: &ExecutionContext,
        command_name: &str,
        params: CommandParams,
    ) -> Result<CommandResult, DaemonError> {
        let command = self
            .commands
            .get(command_name)
            .ok_or_else(|| DaemonError::Command {
                kind: CommandErrorKind::UnknownCommand {
                    name: command_name.to_string(),
                },
            })?;

        command.validate(&params)?;
        command.execute(ctx, params)
    }

    /// List all registered command names, sorted.
    pub fn list_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PeerInfo;
    use crate::federation::{RemoteCredentials, SyncOutcome, SyncRemote};
    use tempfile::TempDir;

    fn create_test_context(operation: &str) -> ExecutionContext {
        ExecutionContext::new(
            "req-test",
            PeerInfo {
                uid: 1000,
                gid: 1000,
                pid: 12345,
            },
            operation,
        )
    }

    fn registry() -> CommandRegistry {
        CommandRegistry::new(
            Arc::new(ConnectionMetrics::new()),
            Arc::new(RateLimiter::new(100, Duration::from_secs(60))),
        )
    }

    struct EchoCommand;

    impl Command for EchoCommand {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn validate(&self, params: &CommandParams) -> Result<(), DaemonError> {
            params.require_string("text")
        }

        fn execute(
            &self,
            ctx: &ExecutionContext,
            params: CommandParams,
        ) -> Result<CommandResult, DaemonError> {
            Ok(CommandResult::success(serde_json::json!({
                "text": params.get_string("text")?,
                "actor": ctx.actor,
            })))
        }
    }

    struct UnusedRemote;

    impl SyncRemote for UnusedRemote {
        fn add_remote(&self, _: &str, _: &str) -> Result<(), DaemonError> {
            Ok(())
        }
        fn remove_remote(&self, _: &str) -> Result<(), DaemonError> {
            Ok(())
        }
        fn push(&self, r: &str, _: Option<&RemoteCredentials>) -> Result<SyncOutcome, DaemonError> {
            unreachable!("{}", r)
        }
        fn pull(&self, r: &str, _: Option<&RemoteCredentials>) -> Result<SyncOutcome, DaemonError> {
            unreachable!("{}", r)
        }
    }

    #[test]
    fn test_registry_has_diagnostics() {
        let registry = registry();
        assert_eq!(registry.list_commands(), vec!["health", "metrics", "ping"]);
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_registry_with_federation() {
        let dir = TempDir::new().unwrap();
        let store = FederationStore::open(
            dir.path().join("peers.json"),
            dir.path().join("db"),
            None,
            Arc::new(UnusedRemote),
        )
        .unwrap();

        let registry = registry().with_federation(Arc::new(store), Duration::from_secs(30));
        for name in [
            "federation_add_peer",
            "federation_list_peers",
            "federation_remove_peer",
            "federation_push",
            "federation_pull",
        ] {
            assert!(registry.get(name).is_some(), "{} missing", name);
        }
    }

    #[test]
    fn test_dispatch_unknown_command() {
        let registry = registry();
        let ctx = create_test_context("unknown");
        let params = CommandParams::new(serde_json::json!({}));

        let result = registry.dispatch(&ctx, "unknown", params);
        assert!(matches!(
            result,
            Err(DaemonError::Command {
                kind: CommandErrorKind::UnknownCommand { .. }
            })
        ));
    }

    #[test]
    fn test_dispatch_ping() {
        let registry = registry();
        let ctx = create_test_context("ping");
        let params = CommandParams::new(serde_json::json!({}));

        let result = registry.dispatch(&ctx, "ping", params).unwrap();
        assert!(result.success);
    }

    #[test]
    fn test_register_custom_command() {
        let mut registry = registry();
        registry.register(Arc::new(EchoCommand));

        let mut ctx = create_test_context("echo");
        ctx.actor = "alice".to_string();
        let result = registry
            .dispatch(&ctx, "echo", CommandParams::new(serde_json::json!({"text": "hi"})))
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["text"], "hi");
        assert_eq!(data["actor"], "alice");

        // Validation runs before execution
        let err = registry
            .dispatch(&ctx, "echo", CommandParams::new(serde_json::json!({})))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
