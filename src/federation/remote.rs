//! Sync remotes.
//!
//! [`SyncRemote`] is the seam between the credential store and the tool
//! that actually moves data. [`DoltRemote`] drives the `dolt` CLI.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{DaemonError, FederationErrorKind};
use crate::executor::{SubprocessBuilder, SubprocessResult};

use super::credentials::RemoteCredentials;

/// Stderr is cut to this many bytes in error messages.
const MAX_ERROR_OUTPUT: usize = 512;

/// Direction of a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Push,
    Pull,
}

/// What a push or pull did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub remote: String,
    pub direction: SyncDirection,
    /// Conflicts reported by a pull, one line each.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

/// A tool that can register remotes and push to or pull from them.
///
/// `credentials` is `None` when the peer has none, in which case the call
/// runs with whatever the environment provides.
pub trait SyncRemote: Send + Sync {
    /// Register `name` at `url`. Fails with `RemoteExists` when `name` is
    /// already registered.
    fn add_remote(&self, name: &str, url: &str) -> Result<(), DaemonError>;

    fn remove_remote(&self, name: &str) -> Result<(), DaemonError>;

    fn push(
        &self,
        remote: &str,
        credentials: Option<&RemoteCredentials>,
    ) -> Result<SyncOutcome, DaemonError>;

    fn pull(
        &self,
        remote: &str,
        credentials: Option<&RemoteCredentials>,
    ) -> Result<SyncOutcome, DaemonError>;
}

/// Runs the `dolt` CLI inside a database directory.
#[derive(Debug, Clone)]
pub struct DoltRemote {
    binary: String,
    repo_dir: PathBuf,
    branch: String,
    timeout: Duration,
}

impl DoltRemote {
    pub fn new(
        binary: impl Into<String>,
        repo_dir: impl Into<PathBuf>,
        branch: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            repo_dir: repo_dir.into(),
            branch: branch.into(),
            timeout,
        }
    }

    fn command<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> SubprocessBuilder {
        SubprocessBuilder::new(&self.binary)
            .args(args)
            .current_dir(&self.repo_dir)
            .timeout(self.timeout)
    }

    fn sync(
        &self,
        direction: SyncDirection,
        remote: &str,
        credentials: Option<&RemoteCredentials>,
    ) -> Result<SyncOutcome, DaemonError> {
        let verb = match direction {
            SyncDirection::Push => "push",
            SyncDirection::Pull => "pull",
        };
        let mut builder = self.command([verb, remote, self.branch.as_str()]);
        if let Some(credentials) = credentials {
            builder = credentials.apply_to(builder);
        }

        let result = builder.run()?;
        let conflicts = conflict_lines(&result);
        if !result.success && conflicts.is_empty() {
            return Err(sync_failed(remote, &result));
        }

        info!(
            remote = %remote,
            direction = verb,
            conflicts = conflicts.len(),
            "Sync completed"
        );
        Ok(SyncOutcome {
            remote: remote.to_string(),
            direction,
            conflicts,
        })
    }
}

impl SyncRemote for DoltRemote {
    fn add_remote(&self, name: &str, url: &str) -> Result<(), DaemonError> {
        let result = self.command(["remote", "add", name, url]).run()?;
        if result.success {
            debug!(remote = %name, "Remote added");
            return Ok(());
        }
        if result.stderr.contains("already exists") {
            return Err(DaemonError::Federation {
                kind: FederationErrorKind::RemoteExists {
                    name: name.to_string(),
                },
            });
        }
        Err(sync_failed(name, &result))
    }

    fn remove_remote(&self, name: &str) -> Result<(), DaemonError> {
        let result = self.command(["remote", "remove", name]).run()?;
        if result.success {
            debug!(remote = %name, "Remote removed");
            Ok(())
        } else {
            Err(sync_failed(name, &result))
        }
    }

    fn push(
        &self,
        remote: &str,
        credentials: Option<&RemoteCredentials>,
    ) -> Result<SyncOutcome, DaemonError> {
        self.sync(SyncDirection::Push, remote, credentials)
    }

    fn pull(
        &self,
        remote: &str,
        credentials: Option<&RemoteCredentials>,
    ) -> Result<SyncOutcome, DaemonError> {
        self.sync(SyncDirection::Pull, remote, credentials)
    }
}

fn conflict_lines(result: &SubprocessResult) -> Vec<String> {
    result
        .stdout
        .lines()
        .chain(result.stderr.lines())
        .filter(|line| line.contains("CONFLICT"))
        .map(|line| line.trim().to_string())
        .collect()
}

fn sync_failed(remote: &str, result: &SubprocessResult) -> DaemonError {
    let stderr = result.stderr.trim();
    let mut end = stderr.len().min(MAX_ERROR_OUTPUT);
    while !stderr.is_char_boundary(end) {
        end -= 1;
    }
    DaemonError::Federation {
        kind: FederationErrorKind::SyncFailed {
            remote: remote.to_string(),
            message: format!(
                "exit code {:?}: {}",
                result.exit_code,
                &stderr[..end]
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// A stand-in for the CLI that logs its arguments and credentials.
    const FAKE_DOLT: &str = r#"#!/bin/sh
echo "$*|${DOLT_REMOTE_USER:-}|${DOLT_REMOTE_PASSWORD:-}" >> calls.log
case "$1 $2 $3" in
  "remote add dup") echo "error: a remote named dup already exists" >&2; exit 1 ;;
  "pull conflicted"*) echo "CONFLICT (content): issues table"; exit 1 ;;
  "push broken"*) echo "permission denied" >&2; exit 1 ;;
esac
exit 0
"#;

    fn fake_remote() -> (TempDir, DoltRemote) {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("dolt");
        fs::write(&script, FAKE_DOLT).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let remote = DoltRemote::new(
            script.to_string_lossy(),
            dir.path(),
            "main",
            Duration::from_secs(10),
        );
        (dir, remote)
    }

    fn calls(dir: &TempDir) -> Vec<String> {
        fs::read_to_string(dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_push_with_credentials_in_child_env() {
        let (dir, remote) = fake_remote();
        let creds = RemoteCredentials::new("alice", "hunter2");

        let outcome = remote.push("web-1", Some(&creds)).unwrap();
        assert_eq!(outcome.direction, SyncDirection::Push);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(calls(&dir), vec!["push web-1 main|alice|hunter2"]);
    }

    #[test]
    fn test_pull_without_credentials() {
        let (dir, remote) = fake_remote();
        remote.pull("web-1", None).unwrap();
        assert_eq!(calls(&dir).len(), 1);
        assert!(calls(&dir)[0].starts_with("pull web-1 main|"));
    }

    #[test]
    fn test_pull_reports_conflicts() {
        let (_dir, remote) = fake_remote();
        let outcome = remote.pull("conflicted", None).unwrap();
        assert_eq!(outcome.conflicts, vec!["CONFLICT (content): issues table"]);
    }

    #[test]
    fn test_push_failure() {
        let (_dir, remote) = fake_remote();
        let err = remote.push("broken", None).unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Federation {
                kind: FederationErrorKind::SyncFailed { ref message, .. }
            } if message.contains("permission denied")
        ));
    }

    #[test]
    fn test_add_remote() {
        let (dir, remote) = fake_remote();
        remote.add_remote("web-1", "https://example.com/db").unwrap();
        assert!(calls(&dir)[0].starts_with("remote add web-1 https://example.com/db|"));

        let err = remote.add_remote("dup", "https://example.com/db").unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Federation {
                kind: FederationErrorKind::RemoteExists { .. }
            }
        ));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = SyncOutcome {
            remote: "web-1".to_string(),
            direction: SyncDirection::Pull,
            conflicts: Vec::new(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["direction"], "pull");
        assert!(json.get("conflicts").is_none());
    }
}
