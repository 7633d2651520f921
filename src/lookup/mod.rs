//! One external lookup per identifier.
//!
//! [`LookupCommand`] is the seam between the scheduler and the outside world:
//! [`ProcessCommand`] runs the real metadata tool, tests plug in fakes.
//! [`Lookup`] turns a command's raw output into a [`LookupResult`] and never
//! fails the caller: every problem is folded into `LookupResult::Failure`.

use async_trait::async_trait;
use std::{process::Stdio, sync::Arc, time::Duration};
use tokio::{process::Command, time::Instant};
use tracing::{debug, instrument};

use crate::error::LookupError;
use crate::parse::{parse_payload, RowPolicy, RowSet};

/// Opaque token naming one unit of lookup work.
pub type Identifier = String;

/// Placeholder substituted with the identifier in command arguments.
pub const ID_PLACEHOLDER: &str = "{id}";

/// `pysradb metadata <id> --detailed`
pub const DEFAULT_TOOL: &str = "pysradb";
pub const DEFAULT_ARGS: [&str; 3] = ["metadata", ID_PLACEHOLDER, "--detailed"];

/// Raw result of one external call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Human readable exit status, e.g. `exit status: 1`.
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            status: "exit status: 0".into(),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            status: format!("exit status: {}", code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Something that can fetch the metadata payload for an identifier.
#[async_trait]
pub trait LookupCommand: Send + Sync {
    /// Perform one call. `Err` is reserved for calls that never produced an
    /// exit status (spawn failure, timeout).
    async fn invoke(&self, id: &str) -> Result<CommandOutput, LookupError>;
}

/// Runs `<tool> <args...>` with [`ID_PLACEHOLDER`] replaced by the identifier.
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    tool: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ProcessCommand {
    pub fn new(tool: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            tool: tool.into(),
            args,
            timeout: None,
        }
    }

    /// Kill the call and report a failure once `timeout` elapses.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Arguments for one identifier.
    pub fn args_for(&self, id: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace(ID_PLACEHOLDER, id))
            .collect()
    }
}

#[async_trait]
impl LookupCommand for ProcessCommand {
    async fn invoke(&self, id: &str) -> Result<CommandOutput, LookupError> {
        let mut cmd = Command::new(&self.tool);
        cmd.args(self.args_for(id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| LookupError::Spawn {
            tool: self.tool.clone(),
            source,
        })?;

        // dropping the future on timeout kills the child
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| LookupError::Timeout(limit))?,
            None => child.wait_with_output().await,
        }
        .map_err(|source| LookupError::Wait {
            tool: self.tool.clone(),
            source,
        })?;

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Outcome of one lookup. Both arms carry the identifier so failures can be
/// requeued.
#[derive(Debug)]
pub enum LookupResult {
    Success { id: Identifier, rows: RowSet },
    Failure { id: Identifier, reason: LookupError },
}

impl LookupResult {
    pub fn id(&self) -> &str {
        match self {
            LookupResult::Success { id, .. } | LookupResult::Failure { id, .. } => id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LookupResult::Success { .. })
    }
}

/// Lookup invoker: one command call, parsed.
#[derive(Clone)]
pub struct Lookup {
    command: Arc<dyn LookupCommand>,
    policy: RowPolicy,
}

impl Lookup {
    pub fn new(command: Arc<dyn LookupCommand>, policy: RowPolicy) -> Self {
        Self { command, policy }
    }

    #[instrument(level = "debug", skip(self, id), fields(id = %id))]
    pub async fn run(&self, id: Identifier) -> LookupResult {
        let start = Instant::now();
        let output = match self.command.invoke(&id).await {
            Ok(o) => o,
            Err(reason) => return LookupResult::Failure { id, reason },
        };

        if !output.success {
            return LookupResult::Failure {
                id,
                reason: LookupError::NonZeroExit {
                    status: output.status,
                    stderr: output.stderr.trim().to_string(),
                },
            };
        }

        match parse_payload(&output.stdout, self.policy) {
            Ok(rows) => {
                debug!(rows = rows.len(), elapsed = ?start.elapsed(), "lookup ok");
                LookupResult::Success { id, rows }
            }
            Err(e) => LookupResult::Failure {
                id,
                reason: e.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    struct Canned(CommandOutput);

    #[async_trait]
    impl LookupCommand for Canned {
        async fn invoke(&self, _id: &str) -> Result<CommandOutput, LookupError> {
            Ok(self.0.clone())
        }
    }

    fn lookup(out: CommandOutput, policy: RowPolicy) -> Lookup {
        Lookup::new(Arc::new(Canned(out)), policy)
    }

    #[test]
    fn placeholder_is_substituted() {
        let cmd = ProcessCommand::new(
            DEFAULT_TOOL,
            DEFAULT_ARGS.iter().map(|a| a.to_string()).collect(),
        );
        assert_eq!(cmd.tool(), "pysradb");
        assert_eq!(cmd.args_for("SRP000001"), ["metadata", "SRP000001", "--detailed"]);
    }

    #[tokio::test]
    async fn success_is_parsed() {
        let res = lookup(CommandOutput::ok("run\tsize\nSRR1\t10\n"), RowPolicy::Pad)
            .run("SRP1".into())
            .await;
        match res {
            LookupResult::Success { id, rows } => {
                assert_eq!(id, "SRP1");
                assert_eq!(rows.get(0, "size"), Some("10"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure_with_stderr() {
        let res = lookup(CommandOutput::failed(2, "not found\n"), RowPolicy::Pad)
            .run("SRP2".into())
            .await;
        assert_eq!(res.id(), "SRP2");
        match res {
            LookupResult::Failure {
                reason: LookupError::NonZeroExit { stderr, .. },
                ..
            } => assert_eq!(stderr, "not found"),
            other => panic!("expected non-zero exit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_success_is_still_success() {
        let res = lookup(CommandOutput::ok(""), RowPolicy::Fail).run("X".into()).await;
        assert!(res.is_success());
    }

    #[tokio::test]
    async fn malformed_payload_under_fail_policy() {
        let res = lookup(CommandOutput::ok("a\tb\n1\n"), RowPolicy::Fail)
            .run("X".into())
            .await;
        assert!(matches!(
            res,
            LookupResult::Failure {
                reason: LookupError::Malformed(ParseError::FieldCountMismatch { .. }),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn missing_tool_is_failure_not_panic() {
        let cmd = ProcessCommand::new("sragather-no-such-tool", vec![ID_PLACEHOLDER.into()]);
        let res = Lookup::new(Arc::new(cmd), RowPolicy::Pad)
            .run("X".into())
            .await;
        assert!(matches!(
            res,
            LookupResult::Failure {
                reason: LookupError::Spawn { .. },
                ..
            }
        ));
    }

    #[test]
    fn wait_error_is_not_reported_as_spawn() {
        let err = LookupError::Wait {
            tool: "pysradb".into(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("waiting on `pysradb`"), "{}", msg);
        assert!(!msg.contains("spawn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_slow_call() {
        let cmd = ProcessCommand::new("sleep", vec!["5".into()])
            .with_timeout(Some(Duration::from_millis(50)));
        let res = Lookup::new(Arc::new(cmd), RowPolicy::Pad)
            .run("X".into())
            .await;
        assert!(matches!(
            res,
            LookupResult::Failure {
                reason: LookupError::Timeout(_),
                ..
            }
        ));
    }
}
