//! Push and pull commands.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::DaemonError;
use crate::federation::{FederationStore, SyncDirection};
use crate::validation::validate_peer_name;

use super::super::traits::Command;
use super::super::types::{CommandParams, CommandResult, ExecutionContext};

/// Extra time granted to the handler beyond the sync tool's own timeout.
const HANDLER_GRACE: Duration = Duration::from_secs(5);

/// Pushes to or pulls from a peer with its stored credentials.
pub struct SyncCommand {
    store: Arc<FederationStore>,
    direction: SyncDirection,
    timeout: Duration,
}

impl SyncCommand {
    /// `sync_timeout` is the sync tool's own timeout.
    pub fn push(store: Arc<FederationStore>, sync_timeout: Duration) -> Self {
        Self {
            store,
            direction: SyncDirection::Push,
            timeout: sync_timeout + HANDLER_GRACE,
        }
    }

    pub fn pull(store: Arc<FederationStore>, sync_timeout: Duration) -> Self {
        Self {
            store,
            direction: SyncDirection::Pull,
            timeout: sync_timeout + HANDLER_GRACE,
        }
    }
}

impl Command for SyncCommand {
    fn name(&self) -> &'static str {
        match self.direction {
            SyncDirection::Push => "federation_push",
            SyncDirection::Pull => "federation_pull",
        }
    }

    fn validate(&self, params: &CommandParams) -> Result<(), DaemonError> {
        validate_peer_name(&params.get_string("peer")?)?;
        Ok(())
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        params: CommandParams,
    ) -> Result<CommandResult, DaemonError> {
        let peer = params.get_string("peer")?;
        let outcome = match self.direction {
            SyncDirection::Push => self.store.push_with_credentials(&peer)?,
            SyncDirection::Pull => self.store.pull_with_credentials(&peer)?,
        };

        info!(
            request_id = %ctx.request_id,
            actor = %ctx.actor,
            peer = %peer,
            direction = ?self.direction,
            conflicts = outcome.conflicts.len(),
            "Federation sync finished"
        );
        Ok(CommandResult::success(serde_json::to_value(outcome)?))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PeerInfo;
    use crate::federation::{FederationPeer, RemoteCredentials, SyncOutcome, SyncRemote};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct LoggingRemote {
        calls: Mutex<Vec<String>>,
    }

    impl LoggingRemote {
        fn outcome(
            &self,
            direction: SyncDirection,
            remote: &str,
            credentials: Option<&RemoteCredentials>,
        ) -> Result<SyncOutcome, DaemonError> {
            self.calls.lock().unwrap().push(format!(
                "{:?} {} {}",
                direction,
                remote,
                credentials.map(|c| c.username()).unwrap_or("-")
            ));
            Ok(SyncOutcome {
                remote: remote.to_string(),
                direction,
                conflicts: Vec::new(),
            })
        }
    }

    impl SyncRemote for LoggingRemote {
        fn add_remote(&self, _name: &str, _url: &str) -> Result<(), DaemonError> {
            Ok(())
        }

        fn remove_remote(&self, _name: &str) -> Result<(), DaemonError> {
            Ok(())
        }

        fn push(
            &self,
            remote: &str,
            credentials: Option<&RemoteCredentials>,
        ) -> Result<SyncOutcome, DaemonError> {
            self.outcome(SyncDirection::Push, remote, credentials)
        }

        fn pull(
            &self,
            remote: &str,
            credentials: Option<&RemoteCredentials>,
        ) -> Result<SyncOutcome, DaemonError> {
            self.outcome(SyncDirection::Pull, remote, credentials)
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            "req-sync",
            PeerInfo {
                uid: 1000,
                gid: 1000,
                pid: 1,
            },
            "federation_push",
        )
    }

    #[test]
    fn test_push_and_pull() {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(LoggingRemote::default());
        let store = Arc::new(
            FederationStore::open(
                dir.path().join("peers.json"),
                dir.path().join("db"),
                None,
                Arc::clone(&remote) as Arc<dyn SyncRemote>,
            )
            .unwrap(),
        );
        store
            .add_peer(
                &FederationPeer::new("web-1", "https://example.com/town")
                    .with_credentials("alice", "hunter2"),
            )
            .unwrap();

        let push = SyncCommand::push(Arc::clone(&store), Duration::from_secs(30));
        assert_eq!(push.name(), "federation_push");
        assert_eq!(push.timeout(), Duration::from_secs(35));

        let params = CommandParams::new(serde_json::json!({"peer": "web-1"}));
        push.validate(&params).unwrap();
        let data = push.execute(&ctx(), params).unwrap().data.unwrap();
        assert_eq!(data["direction"], "push");
        assert_eq!(data["remote"], "web-1");

        let pull = SyncCommand::pull(Arc::clone(&store), Duration::from_secs(30));
        assert_eq!(pull.name(), "federation_pull");
        pull.execute(&ctx(), CommandParams::new(serde_json::json!({"peer": "web-1"})))
            .unwrap();

        assert_eq!(
            *remote.calls.lock().unwrap(),
            vec!["Push web-1 alice", "Pull web-1 alice"]
        );
        assert!(store.get_peer("web-1").unwrap().unwrap().last_sync.is_some());
    }

    #[test]
    fn test_rejects_bad_peer_name() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            FederationStore::open(
                dir.path().join("peers.json"),
                dir.path().join("db"),
                None,
                Arc::new(LoggingRemote::default()),
            )
            .unwrap(),
        );
        let push = SyncCommand::push(store, Duration::from_secs(30));
        let params = CommandParams::new(serde_json::json!({"peer": "-f"}));
        assert!(push.validate(&params).is_err());
    }
}
