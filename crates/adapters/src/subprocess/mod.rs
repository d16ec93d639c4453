// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-platform process execution.
//!
//! [`ProcessRunner`] offers two strategies: [`ProcessRunner::run_blocking`]
//! starts a command and waits for it, returning captured output, while
//! [`ProcessRunner::spawn`] returns a [`ProcessHandle`] that can be waited
//! on with a timeout or force-killed. Everything platform specific lives in
//! the `unix` / `windows` backends; this module never branches on the OS.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as platform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as platform;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::quote;

/// Errors starting or talking to a child process
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open {}: {source}", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to terminate process {pid}: {message}")]
    Terminate { pid: u32, message: String },
}

/// Where a child's output stream goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Redirect {
    /// Inherit the parent's stream (captured by `run_blocking`)
    #[default]
    Inherit,
    Capture,
    Null,
    /// Create or truncate a file
    File(PathBuf),
}

/// Where a child's stdin comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Input {
    #[default]
    Inherit,
    Null,
    File(PathBuf),
    /// Piped from memory, then closed
    Bytes(Vec<u8>),
}

/// A command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdin: Input,
    pub stdout: Redirect,
    pub stderr: Redirect,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            stdin: Input::default(),
            stdout: Redirect::default(),
            stderr: Redirect::default(),
        }
    }

    /// Run `line` through the platform shell.
    pub fn shell(line: impl Into<String>) -> Self {
        let (program, args) = platform::shell_invocation(line.into());
        Self::new(program).args(args)
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: Input) -> Self {
        self.stdin = input;
        self
    }

    pub fn stdout(mut self, redirect: Redirect) -> Self {
        self.stdout = redirect;
        self
    }

    pub fn stderr(mut self, redirect: Redirect) -> Self {
        self.stderr = redirect;
        self
    }

    /// Quoted single-line rendering (logs, remote shells).
    pub fn command_line(&self) -> String {
        quote::command_line(&self.program, &self.args)
    }
}

/// Whether stderr output alone makes a blocking command fail.
///
/// `FailOnOutput` is the long-standing behaviour of the blocking pipe
/// runner: any text on stderr is reported as a failure even when the exit
/// code is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StderrPolicy {
    #[default]
    FailOnOutput,
    ExitCodeOnly,
}

impl StderrPolicy {
    pub fn from_fatal_flag(stderr_fatal: bool) -> Self {
        if stderr_fatal {
            StderrPolicy::FailOnOutput
        } else {
            StderrPolicy::ExitCodeOnly
        }
    }
}

/// Exit code reported when stderr output fails an otherwise successful command.
pub const STDERR_EXIT_CODE: i32 = 1;

/// Result of a blocking command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// Captured stdout (empty when redirected to a file)
    pub stdout: String,
    /// Captured stderr (empty when redirected to a file)
    pub stderr: String,
    /// Failure text when the stderr policy turned output into an error
    pub message: Option<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Best description of why the command failed.
    pub fn error_text(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit code {}", self.exit_code)
        } else {
            stderr.to_string()
        }
    }
}

/// Result of waiting on a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Exited(i32),
    /// The timeout elapsed; the process is still running
    TimedOut,
}

/// Starts processes according to a [`StderrPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {
    stderr_policy: StderrPolicy,
}

impl ProcessRunner {
    pub fn new(stderr_policy: StderrPolicy) -> Self {
        Self { stderr_policy }
    }

    pub fn stderr_policy(&self) -> StderrPolicy {
        self.stderr_policy
    }

    /// Start `spec`, wait for it, and return its exit code and output.
    ///
    /// Streams left as [`Redirect::Inherit`] are captured.
    pub async fn run_blocking(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        let mut handle = start(spec, true)?;
        self.wait_output(&mut handle).await
    }

    /// Wait for a spawned process and judge its output under the stderr policy.
    pub async fn wait_output(&self, handle: &mut ProcessHandle) -> Result<CommandOutput, ProcessError> {
        let exit_code = handle.wait_exit().await?;
        let (stdout, stderr) = handle.collect_output().await;
        let output = self.judge_output(exit_code, stdout, stderr);
        if output.message.is_some() {
            tracing::debug!(program = %handle.program, exit_code, "stderr output treated as failure");
        }
        Ok(output)
    }

    /// Build the [`CommandOutput`] for a finished process under the stderr policy.
    pub fn judge_output(&self, exit_code: i32, stdout: String, stderr: String) -> CommandOutput {
        let mut output = CommandOutput { exit_code, stdout, stderr, message: None };
        if self.stderr_policy == StderrPolicy::FailOnOutput && !output.stderr.trim().is_empty() {
            if output.exit_code == 0 {
                output.exit_code = STDERR_EXIT_CODE;
            }
            output.message = Some(output.stderr.trim().to_string());
        }
        output
    }

    /// Start `spec` without waiting.
    pub fn spawn(&self, spec: &CommandSpec) -> Result<ProcessHandle, ProcessError> {
        start(spec, false)
    }
}

type CaptureTask = JoinHandle<std::io::Result<Vec<u8>>>;

/// A running child process.
///
/// Dropping the handle does not kill the process.
pub struct ProcessHandle {
    program: String,
    pid: u32,
    child: Child,
    stdout: Option<CaptureTask>,
    stderr: Option<CaptureTask>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("program", &self.program)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// A token that can force-terminate this process from another task.
    pub fn killer(&self) -> ProcessKiller {
        ProcessKiller { pid: self.pid }
    }

    /// Wait for exit, or until `timeout` elapses.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitStatus, ProcessError> {
        match timeout {
            None => self.wait_exit().await.map(WaitStatus::Exited),
            Some(limit) => match tokio::time::timeout(limit, self.wait_exit()).await {
                Ok(code) => code.map(WaitStatus::Exited),
                Err(_) => Ok(WaitStatus::TimedOut),
            },
        }
    }

    /// Force-terminate the process (and its group/tree) and reap it.
    pub async fn kill(mut self) -> Result<i32, ProcessError> {
        self.killer().kill()?;
        self.wait_exit().await
    }

    async fn wait_exit(&mut self) -> Result<i32, ProcessError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|source| ProcessError::Wait { program: self.program.clone(), source })?;
        Ok(platform::exit_code(status))
    }

    /// Drain captured stdout/stderr. Call after the process has exited.
    pub async fn collect_output(&mut self) -> (String, String) {
        let stdout = drain(self.stdout.take()).await;
        let stderr = drain(self.stderr.take()).await;
        (stdout, stderr)
    }
}

async fn drain(task: Option<CaptureTask>) -> String {
    match task {
        Some(task) => match task.await {
            Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed reading child output");
                String::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "output capture task failed");
                String::new()
            }
        },
        None => String::new(),
    }
}

/// Pid-based terminator for a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessKiller {
    pid: u32,
}

impl ProcessKiller {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Force-terminate the process and everything it started.
    ///
    /// A process that has already exited is not an error.
    pub fn kill(&self) -> Result<(), ProcessError> {
        tracing::info!(pid = self.pid, "killing process tree");
        platform::terminate(self.pid)
    }
}

fn open_input(path: &Path) -> Result<Stdio, ProcessError> {
    std::fs::File::open(path)
        .map(Stdio::from)
        .map_err(|source| ProcessError::Redirect { path: path.to_path_buf(), source })
}

fn open_output(path: &Path) -> Result<Stdio, ProcessError> {
    std::fs::File::create(path)
        .map(Stdio::from)
        .map_err(|source| ProcessError::Redirect { path: path.to_path_buf(), source })
}

fn output_stdio(redirect: &Redirect, capture_inherited: bool) -> Result<(Stdio, bool), ProcessError> {
    Ok(match redirect {
        Redirect::Inherit if capture_inherited => (Stdio::piped(), true),
        Redirect::Inherit => (Stdio::inherit(), false),
        Redirect::Capture => (Stdio::piped(), true),
        Redirect::Null => (Stdio::null(), false),
        Redirect::File(path) => (open_output(path)?, false),
    })
}

fn start(spec: &CommandSpec, capture_inherited: bool) -> Result<ProcessHandle, ProcessError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    let stdin_bytes = match &spec.stdin {
        Input::Inherit => {
            cmd.stdin(Stdio::inherit());
            None
        }
        Input::Null => {
            cmd.stdin(Stdio::null());
            None
        }
        Input::File(path) => {
            cmd.stdin(open_input(path)?);
            None
        }
        Input::Bytes(bytes) => {
            cmd.stdin(Stdio::piped());
            Some(bytes.clone())
        }
    };
    let (stdout, capture_stdout) = output_stdio(&spec.stdout, capture_inherited)?;
    let (stderr, capture_stderr) = output_stdio(&spec.stderr, capture_inherited)?;
    cmd.stdout(stdout).stderr(stderr);
    platform::configure(&mut cmd);

    let mut child = cmd
        .spawn()
        .map_err(|source| ProcessError::Spawn { program: spec.program.clone(), source })?;
    let pid = child.id().unwrap_or_default();
    tracing::debug!(pid, command = %spec.command_line(), "spawned process");

    if let (Some(bytes), Some(mut pipe)) = (stdin_bytes, child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(&bytes).await {
                tracing::warn!(error = %e, "failed writing child stdin");
            }
            // pipe dropped here, closing the child's stdin
        });
    }

    let stdout = if capture_stdout { child.stdout.take().map(capture) } else { None };
    let stderr = if capture_stderr { child.stderr.take().map(capture) } else { None };

    Ok(ProcessHandle { program: spec.program.clone(), pid, child, stdout, stderr })
}

fn capture<R>(mut reader: R) -> CaptureTask
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
