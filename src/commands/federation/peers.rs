//! Peer management commands.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::DaemonError;
use crate::federation::{FederationPeer, FederationStore};
use crate::validation::{validate_peer_name, validate_remote_url};

use super::super::traits::Command;
use super::super::types::{CommandParams, CommandResult, ExecutionContext};

/// Arguments of `federation_add_peer`. Wiped on drop.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
struct AddPeerArgs {
    name: String,
    url: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    sovereignty: String,
}

/// Adds a peer, or replaces the one with the same name.
pub struct AddPeerCommand {
    store: Arc<FederationStore>,
}

impl AddPeerCommand {
    pub fn new(store: Arc<FederationStore>) -> Self {
        Self { store }
    }
}

impl Command for AddPeerCommand {
    fn name(&self) -> &'static str {
        "federation_add_peer"
    }

    fn validate(&self, params: &CommandParams) -> Result<(), DaemonError> {
        let args: AddPeerArgs = params.parse()?;
        validate_peer_name(&args.name)?;
        validate_remote_url(&args.url)?;
        Ok(())
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        params: CommandParams,
    ) -> Result<CommandResult, DaemonError> {
        let args: AddPeerArgs = params.parse()?;
        let peer = FederationPeer::new(args.name.as_str(), args.url.as_str())
            .with_credentials(args.username.as_str(), &args.password)
            .with_sovereignty(args.sovereignty.as_str());
        drop(args);

        self.store.add_peer(&peer)?;
        info!(
            request_id = %ctx.request_id,
            actor = %ctx.actor,
            peer = %peer.name,
            "Federation peer added"
        );

        let summary = self
            .store
            .get_peer(&peer.name)?
            .map(|stored| stored.summary())
            .unwrap_or_else(|| peer.summary());
        Ok(CommandResult::success(serde_json::to_value(summary)?))
    }
}

/// Lists every peer without passwords.
pub struct ListPeersCommand {
    store: Arc<FederationStore>,
}

impl ListPeersCommand {
    pub fn new(store: Arc<FederationStore>) -> Self {
        Self { store }
    }
}

impl Command for ListPeersCommand {
    fn name(&self) -> &'static str {
        "federation_list_peers"
    }

    fn validate(&self, _params: &CommandParams) -> Result<(), DaemonError> {
        Ok(())
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        _params: CommandParams,
    ) -> Result<CommandResult, DaemonError> {
        let listing = self.store.list_peers();
        let peers: Vec<_> = listing.peers.iter().map(FederationPeer::summary).collect();
        let failures: Vec<_> = listing
            .failures
            .iter()
            .map(|f| serde_json::json!({ "name": f.name, "code": f.error.code() }))
            .collect();

        Ok(CommandResult::success(serde_json::json!({
            "peers": peers,
            "failures": failures,
        })))
    }
}

/// Removes a peer and its remote.
pub struct RemovePeerCommand {
    store: Arc<FederationStore>,
}

impl RemovePeerCommand {
    pub fn new(store: Arc<FederationStore>) -> Self {
        Self { store }
    }
}

impl Command for RemovePeerCommand {
    fn name(&self) -> &'static str {
        "federation_remove_peer"
    }

    fn validate(&self, params: &CommandParams) -> Result<(), DaemonError> {
        validate_peer_name(&params.get_string("name")?)?;
        Ok(())
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        params: CommandParams,
    ) -> Result<CommandResult, DaemonError> {
        let name = params.get_string("name")?;
        let removed = self.store.remove_peer(&name)?;
        info!(
            request_id = %ctx.request_id,
            actor = %ctx.actor,
            peer = %name,
            removed,
            "Federation peer removal handled"
        );
        Ok(CommandResult::success(serde_json::json!({
            "name": name,
            "removed": removed,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PeerInfo;
    use crate::error::ValidationErrorKind;
    use crate::federation::{RemoteCredentials, SyncOutcome, SyncRemote};
    use tempfile::TempDir;

    struct NullRemote;

    impl SyncRemote for NullRemote {
        fn add_remote(&self, _name: &str, _url: &str) -> Result<(), DaemonError> {
            Ok(())
        }

        fn remove_remote(&self, _name: &str) -> Result<(), DaemonError> {
            Ok(())
        }

        fn push(
            &self,
            _remote: &str,
            _credentials: Option<&RemoteCredentials>,
        ) -> Result<SyncOutcome, DaemonError> {
            unreachable!("peer commands never sync")
        }

        fn pull(
            &self,
            _remote: &str,
            _credentials: Option<&RemoteCredentials>,
        ) -> Result<SyncOutcome, DaemonError> {
            unreachable!("peer commands never sync")
        }
    }

    fn store(dir: &TempDir) -> Arc<FederationStore> {
        Arc::new(
            FederationStore::open(
                dir.path().join("peers.json"),
                dir.path().join("db"),
                None,
                Arc::new(NullRemote),
            )
            .unwrap(),
        )
    }

    fn ctx(operation: &str) -> ExecutionContext {
        ExecutionContext::new(
            "req-1",
            PeerInfo {
                uid: 1000,
                gid: 1000,
                pid: 1,
            },
            operation,
        )
    }

    #[test]
    fn test_add_list_remove() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let add = AddPeerCommand::new(Arc::clone(&store));
        let params = CommandParams::new(serde_json::json!({
            "name": "web-1",
            "url": "https://example.com/town",
            "username": "alice",
            "password": "hunter2",
            "sovereignty": "T1",
        }));
        add.validate(&params).unwrap();
        let result = add.execute(&ctx("federation_add_peer"), params).unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["name"], "web-1");
        assert_eq!(data["has_password"], true);
        assert!(!data.to_string().contains("hunter2"));

        let list = ListPeersCommand::new(Arc::clone(&store));
        let data = list
            .execute(&ctx("federation_list_peers"), CommandParams::new(serde_json::json!({})))
            .unwrap()
            .data
            .unwrap();
        assert_eq!(data["peers"].as_array().unwrap().len(), 1);
        assert_eq!(data["peers"][0]["username"], "alice");
        assert!(data["failures"].as_array().unwrap().is_empty());

        let remove = RemovePeerCommand::new(Arc::clone(&store));
        let params = CommandParams::new(serde_json::json!({"name": "web-1"}));
        let data = remove
            .execute(&ctx("federation_remove_peer"), params)
            .unwrap()
            .data
            .unwrap();
        assert_eq!(data["removed"], true);
        assert!(store.get_peer("web-1").unwrap().is_none());
    }

    #[test]
    fn test_add_peer_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let add = AddPeerCommand::new(store(&dir));

        let bad_name = CommandParams::new(serde_json::json!({
            "name": "a@b",
            "url": "https://example.com/town",
        }));
        assert!(matches!(
            add.validate(&bad_name),
            Err(DaemonError::Validation {
                kind: ValidationErrorKind::InvalidPeerName { .. }
            })
        ));

        let missing_url = CommandParams::new(serde_json::json!({"name": "web-1"}));
        assert!(add.validate(&missing_url).is_err());

        let flag_url = CommandParams::new(serde_json::json!({
            "name": "web-1",
            "url": "--upload-pack=evil",
        }));
        assert!(add.validate(&flag_url).is_err());
    }

    #[test]
    fn test_remove_requires_name() {
        let dir = TempDir::new().unwrap();
        let remove = RemovePeerCommand::new(store(&dir));
        let params = CommandParams::new(serde_json::json!({}));
        assert!(matches!(
            remove.validate(&params),
            Err(DaemonError::Validation {
                kind: ValidationErrorKind::MissingParameter { .. }
            })
        ));
    }
}
