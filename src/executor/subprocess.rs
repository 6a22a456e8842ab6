//! Safe subprocess execution.
//!
//! Provides utilities for running external commands safely with:
//! - No shell interpretation (direct exec)
//! - Kill-on-timeout
//! - Captured stdout/stderr
//! - Per-child environment, including secret values that never touch the
//!   daemon's own environment

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{CommandErrorKind, DaemonError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of a subprocess execution.
#[derive(Debug, Clone)]
pub struct SubprocessResult {
    /// Whether the command exited successfully (exit code 0).
    pub success: bool,
    /// The exit code, if available.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

enum EnvValue {
    Plain(String),
    Secret(Zeroizing<String>),
}

impl EnvValue {
    fn as_str(&self) -> &str {
        match self {
            EnvValue::Plain(value) => value,
            EnvValue::Secret(value) => value,
        }
    }
}

/// Builder for subprocess execution.
pub struct SubprocessBuilder {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, EnvValue>,
    env_remove: Vec<String>,
    current_dir: Option<PathBuf>,
    timeout: Duration,
    /// If true, arguments will not be logged
    sensitive: bool,
}

impl SubprocessBuilder {
    /// Create a new subprocess builder.
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            env_remove: Vec::new(),
            current_dir: None,
            timeout: Duration::from_secs(60),
            sensitive: false,
        }
    }

    /// Mark this command's arguments as sensitive so they are not logged.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Add arguments to the command.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Set an environment variable on the child.
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env
            .insert(key.to_string(), EnvValue::Plain(value.to_string()));
        self
    }

    /// Set an environment variable on the child whose value is wiped from
    /// the builder's memory once the builder is dropped.
    pub fn secret_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(
            key.to_string(),
            EnvValue::Secret(Zeroizing::new(value.to_string())),
        );
        self
    }

    /// Make sure the child does not inherit `key` from the daemon.
    pub fn env_remove(mut self, key: &str) -> Self {
        self.env.remove(key);
        self.env_remove.push(key.to_string());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute the command and wait for completion with timeout enforcement.
    ///
    /// If the process exceeds the configured timeout, it is killed and a
    /// timeout error is returned.
    pub fn run(self) -> Result<SubprocessResult, DaemonError> {
        let env_keys: Vec<&str> = self.env.keys().map(String::as_str).collect();
        if self.sensitive {
            debug!(
                program = %self.program,
                args = "[REDACTED]",
                env = ?env_keys,
                timeout_secs = self.timeout.as_secs(),
                "Executing subprocess (sensitive)"
            );
        } else {
            debug!(
                program = %self.program,
                args = ?self.args,
                env = ?env_keys,
                timeout_secs = self.timeout.as_secs(),
                "Executing subprocess"
            );
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        for (key, value) in &self.env {
            cmd.env(key, value.as_str());
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            execution_failed(format!("Failed to spawn {}: {}", self.program, e))
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let start = Instant::now();
        let status = wait_with_timeout(&mut child, self.timeout, &self.program)?;

        let result = SubprocessResult {
            success: status.success(),
            exit_code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        debug!(
            success = result.success,
            exit_code = ?result.exit_code,
            duration_ms = start.elapsed().as_millis(),
            "Subprocess completed"
        );
        Ok(result)
    }
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
    program: &str,
) -> Result<std::process::ExitStatus, DaemonError> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if start.elapsed() > timeout => {
                warn!(
                    program = %program,
                    timeout_secs = timeout.as_secs(),
                    "Process timed out, killing"
                );
                if let Err(e) = child.kill() {
                    warn!(error = %e, "Failed to kill timed-out process");
                }
                // Reap the zombie process
                let _ = child.wait();
                return Err(DaemonError::Command {
                    kind: CommandErrorKind::Timeout {
                        timeout_secs: timeout.as_secs(),
                    },
                });
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                return Err(execution_failed(format!(
                    "Failed to check process status: {}",
                    e
                )))
            }
        }
    }
}

/// Read a child pipe to the end on its own thread so a chatty child cannot
/// block on a full pipe while we wait for it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn execution_failed(message: String) -> DaemonError {
    DaemonError::Command {
        kind: CommandErrorKind::ExecutionFailed { message },
    }
}

/// Run a command with the given arguments and timeout.
pub fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<SubprocessResult, DaemonError> {
    SubprocessBuilder::new(program)
        .args(args.iter().copied())
        .timeout(timeout)
        .run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_echo() {
        let result = run_command("echo", &["hello", "world"], Duration::from_secs(5)).unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello world");
    }

    #[test]
    fn test_run_false_command() {
        let result = run_command("false", &[], Duration::from_secs(5)).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(1));
    }

    #[test]
    fn test_secret_env_reaches_child_only() {
        let result = SubprocessBuilder::new("sh")
            .args(["-c", "echo \"$BD_TEST_USER:$BD_TEST_PASSWORD\""])
            .env("BD_TEST_USER", "alice")
            .secret_env("BD_TEST_PASSWORD", "s3cret")
            .sensitive()
            .timeout(Duration::from_secs(5))
            .run()
            .unwrap();

        assert!(result.success);
        assert_eq!(result.stdout.trim(), "alice:s3cret");
        assert!(std::env::var("BD_TEST_PASSWORD").is_err());
    }

    #[test]
    fn test_env_remove() {
        let result = SubprocessBuilder::new("sh")
            .args(["-c", "echo \"[${HOME:-unset}]\""])
            .env_remove("HOME")
            .timeout(Duration::from_secs(5))
            .run()
            .unwrap();

        assert_eq!(result.stdout.trim(), "[unset]");
    }

    #[test]
    fn test_current_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = SubprocessBuilder::new("pwd")
            .current_dir(dir.path())
            .timeout(Duration::from_secs(5))
            .run()
            .unwrap();

        let reported = std::fs::canonicalize(result.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_large_output_does_not_block() {
        let result = SubprocessBuilder::new("sh")
            .args(["-c", "head -c 1000000 /dev/zero | tr '\\0' 'x'"])
            .timeout(Duration::from_secs(10))
            .run()
            .unwrap();

        assert!(result.success);
        assert_eq!(result.stdout.len(), 1_000_000);
    }

    #[test]
    fn test_timeout_kills_process() {
        let result = SubprocessBuilder::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(200))
            .run();

        assert!(matches!(
            result,
            Err(DaemonError::Command {
                kind: CommandErrorKind::Timeout { .. }
            })
        ));
    }

    #[test]
    fn test_nonexistent_command() {
        let result = run_command("nonexistent_command_12345", &[], Duration::from_secs(5));
        assert!(result.is_err());
    }

    #[test]
    fn test_stderr_capture() {
        let result = run_command("sh", &["-c", "echo error >&2"], Duration::from_secs(5)).unwrap();

        assert!(result.success);
        assert_eq!(result.stderr.trim(), "error");
    }
}
