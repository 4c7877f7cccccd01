//! External command execution with timeouts and captured output.
//!
//! Every gcloud/terraform/kubectl invocation goes through `run` or
//! `run_streaming`. Neither function returns an error: spawn failures and
//! timeouts are encoded in the `ExecutionResult` so callers deal with a
//! single shape. Actual success is decided by exit code alone.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Timeout for short queries (auth checks, describes, outputs).
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for kubectl operations (apply, delete, get).
pub const KUBECTL_TIMEOUT: Duration = Duration::from_secs(300);
/// Timeout for terraform destroy.
pub const DESTROY_TIMEOUT: Duration = Duration::from_secs(1800);
/// Timeout for terraform apply (cluster provisioning can take an hour).
pub const APPLY_TIMEOUT: Duration = Duration::from_secs(3600);

// ---------------------------------------------------------------------------
// CommandSpec
// ---------------------------------------------------------------------------

/// One external command invocation: program, arguments, working directory,
/// and the timeout class for this kind of operation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: QUERY_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The command as an operator would type it, for "re-run this manually"
    /// diagnostics.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Captured outcome of one external command. Immutable once produced.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The diagnostic to show an operator: stderr if present, stdout otherwise.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }

    fn invocation_failure(message: String, duration: Duration) -> Self {
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: message,
            duration,
        }
    }
}

// ---------------------------------------------------------------------------
// Runners
// ---------------------------------------------------------------------------

/// Run a command to completion, capturing stdout and stderr.
pub async fn run(spec: &CommandSpec) -> ExecutionResult {
    run_streaming(spec, |_| {}).await
}

/// Run a command, feeding each stdout line to `observe` as it arrives.
/// Used by phases that infer progress from provisioning-tool output.
pub async fn run_streaming(
    spec: &CommandSpec,
    mut observe: impl FnMut(&str),
) -> ExecutionResult {
    let started = Instant::now();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ExecutionResult::invocation_failure(
                format!("failed to spawn {}: {e}", spec.program),
                started.elapsed(),
            )
        }
    };

    // Stderr is drained by a background task so a chatty tool can't block
    // the stdout reader.
    let stderr_pipe = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(pipe) = stderr_pipe {
            let mut lines = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !buf.is_empty() {
                    buf.push('\n');
                }
                buf.push_str(&line);
            }
        }
        buf
    });

    let stdout_pipe = child.stdout.take();
    let read_and_wait = async {
        let mut out = String::new();
        if let Some(pipe) = stdout_pipe {
            let mut lines = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                observe(&line);
                out.push_str(&line);
                out.push('\n');
            }
        }
        let status = child.wait().await;
        (out, status)
    };

    match tokio::time::timeout(spec.timeout, read_and_wait).await {
        Ok((stdout, Ok(status))) => {
            let stderr = stderr_task.await.unwrap_or_default();
            ExecutionResult {
                exit_code: status.code().unwrap_or(-1),
                stdout: stdout.trim_end().to_string(),
                stderr: stderr.trim_end().to_string(),
                duration: started.elapsed(),
            }
        }
        Ok((_, Err(e))) => {
            stderr_task.abort();
            ExecutionResult::invocation_failure(e.to_string(), started.elapsed())
        }
        Err(_) => {
            // Dropping the future drops the child, which kills the process
            // (kill_on_drop above).
            stderr_task.abort();
            ExecutionResult::invocation_failure(
                format!("timed out after {}s", spec.timeout.as_secs()),
                started.elapsed(),
            )
        }
    }
}
