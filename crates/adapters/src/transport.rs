// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command execution and file transfer on a remote host.

use crate::quote::quote_arg;
use crate::subprocess::{
    CommandOutput, CommandSpec, Input, ProcessError, ProcessHandle, ProcessRunner, Redirect,
};
use async_trait::async_trait;
use qj_core::SshDefaults;
use std::path::Path;
use thiserror::Error;

/// Errors reaching or using a remote host
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("authentication to {host} failed: {message}")]
    Auth { host: String, message: String },
    #[error("cannot reach {host}: {message}")]
    Connection { host: String, message: String },
    #[error("remote file not found: {0}")]
    NotFound(String),
    #[error("remote command failed (exit {code}): {message}")]
    Remote { code: i32, message: String },
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Adapter for a host reachable through a remote shell
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Host name used in logs and errors
    fn host(&self) -> &str;

    /// Run `command` in the remote shell, optionally feeding `input` on stdin.
    ///
    /// A non-zero remote exit is returned as output, not as an error.
    async fn run(&self, command: &str, input: Option<Vec<u8>>)
        -> Result<CommandOutput, TransportError>;

    /// Start `script` in a remote `sh` without waiting for it.
    ///
    /// Output is captured on the returned handle.
    fn spawn_script(&self, script: &str) -> Result<ProcessHandle, TransportError>;

    async fn upload(&self, local: &Path, remote: &str) -> Result<(), TransportError>;

    async fn download(&self, remote: &str, local: &Path) -> Result<(), TransportError>;

    async fn exec(&self, command: &str) -> Result<CommandOutput, TransportError> {
        self.run(command, None).await
    }

    /// Like [`Transport::exec`] but a failed command is an error.
    async fn exec_checked(&self, command: &str) -> Result<CommandOutput, TransportError> {
        let output = self.exec(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(TransportError::Remote { code: output.exit_code, message: output.error_text() })
        }
    }

    /// Create or replace `remote` with `contents`.
    async fn write_file(&self, remote: &str, contents: &str) -> Result<(), TransportError> {
        let command = format!("cat > {}", quote_arg(remote));
        let output = self.run(&command, Some(contents.as_bytes().to_vec())).await?;
        if output.success() {
            Ok(())
        } else {
            Err(TransportError::Remote { code: output.exit_code, message: output.error_text() })
        }
    }
}

/// Exit code `ssh` and `scp` use for their own failures.
const SSH_FAILURE: i32 = 255;

/// Transport over the OpenSSH client programs.
#[derive(Debug, Clone)]
pub struct SshTransport {
    host: String,
    user: Option<String>,
    port: Option<u16>,
    programs: SshDefaults,
    runner: ProcessRunner,
}

impl SshTransport {
    pub fn new(host: impl Into<String>, programs: SshDefaults, runner: ProcessRunner) -> Self {
        Self { host: host.into(), user: None, port: None, programs, runner }
    }

    pub fn user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    fn target(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    fn ssh(&self, command: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.programs.ssh_program).args(&self.programs.options);
        if let Some(port) = self.port {
            spec = spec.arg("-p").arg(port.to_string());
        }
        spec.arg(self.target()).arg(command)
    }

    fn scp(&self, from: String, to: String) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.programs.scp_program).args(&self.programs.options);
        if let Some(port) = self.port {
            spec = spec.arg("-P").arg(port.to_string());
        }
        spec.arg("-q").arg(from).arg(to)
    }

    fn remote_path(&self, path: &str) -> String {
        format!("{}:{}", self.target(), path)
    }

    async fn copy(&self, spec: CommandSpec, missing: &str) -> Result<(), TransportError> {
        let output = self.runner.run_blocking(&spec.stdin(Input::Null)).await?;
        if output.success() {
            return Ok(());
        }
        if output.stderr.contains("No such file or directory") {
            return Err(TransportError::NotFound(missing.to_string()));
        }
        Err(classify(&self.host, &output).unwrap_or(TransportError::Remote {
            code: output.exit_code,
            message: output.error_text(),
        }))
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(
        &self,
        command: &str,
        input: Option<Vec<u8>>,
    ) -> Result<CommandOutput, TransportError> {
        let stdin = input.map(Input::Bytes).unwrap_or(Input::Null);
        let output = self.runner.run_blocking(&self.ssh(command).stdin(stdin)).await?;
        match classify(&self.host, &output) {
            Some(err) => Err(err),
            None => Ok(output),
        }
    }

    fn spawn_script(&self, script: &str) -> Result<ProcessHandle, TransportError> {
        let spec = self
            .ssh("sh -s")
            .stdin(Input::Bytes(script.as_bytes().to_vec()))
            .stdout(Redirect::Capture)
            .stderr(Redirect::Capture);
        Ok(self.runner.spawn(&spec)?)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        tracing::debug!(host = %self.host, local = %local.display(), remote, "uploading");
        let spec = self.scp(local.display().to_string(), self.remote_path(remote));
        self.copy(spec, &local.display().to_string()).await
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), TransportError> {
        tracing::debug!(host = %self.host, remote, local = %local.display(), "downloading");
        let spec = self.scp(self.remote_path(remote), local.display().to_string());
        self.copy(spec, remote).await
    }
}

/// Recognise failures of the ssh client itself, as opposed to the remote command.
pub(crate) fn classify(host: &str, output: &CommandOutput) -> Option<TransportError> {
    let stderr = output.stderr.trim();
    if stderr.contains("Permission denied (") || stderr.contains("Host key verification failed") {
        return Some(TransportError::Auth { host: host.to_string(), message: stderr.to_string() });
    }
    let unreachable = [
        "Could not resolve hostname",
        "Connection refused",
        "Connection timed out",
        "No route to host",
        "Connection closed by",
    ];
    if unreachable.iter().any(|p| stderr.contains(p)) || output.exit_code == SSH_FAILURE {
        let message = if stderr.is_empty() { output.error_text() } else { stderr.to_string() };
        return Some(TransportError::Connection { host: host.to_string(), message });
    }
    None
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{Transport, TransportError};
    use crate::subprocess::{
        CommandOutput, CommandSpec, Input, ProcessHandle, ProcessRunner, Redirect,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::Path;
    use std::sync::Arc;

    /// Recorded transport operation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TransportCall {
        Run(String),
        Spawn(String),
        Upload { local: String, remote: String },
        Download { remote: String, local: String },
    }

    struct FakeTransportState {
        calls: Vec<TransportCall>,
        unreachable: bool,
    }

    /// Transport whose "remote" host is the local machine.
    ///
    /// Commands run under the local `sh`, transfers are plain file copies.
    #[derive(Clone)]
    pub struct FakeTransport {
        runner: ProcessRunner,
        inner: Arc<Mutex<FakeTransportState>>,
    }

    impl Default for FakeTransport {
        fn default() -> Self {
            Self::new(ProcessRunner::default())
        }
    }

    impl FakeTransport {
        pub fn new(runner: ProcessRunner) -> Self {
            Self {
                runner,
                inner: Arc::new(Mutex::new(FakeTransportState {
                    calls: Vec::new(),
                    unreachable: false,
                })),
            }
        }

        /// Make every later operation fail with a connection error
        pub fn set_unreachable(&self, unreachable: bool) {
            self.inner.lock().unreachable = unreachable;
        }

        pub fn calls(&self) -> Vec<TransportCall> {
            self.inner.lock().calls.clone()
        }

        /// Commands passed to `run`/`exec`, in order
        pub fn commands(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    TransportCall::Run(command) => Some(command),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: TransportCall) -> Result<(), TransportError> {
            let mut inner = self.inner.lock();
            inner.calls.push(call);
            if inner.unreachable {
                return Err(TransportError::Connection {
                    host: "fake".to_string(),
                    message: "unreachable".to_string(),
                });
            }
            Ok(())
        }

        fn copy(from: &Path, to: &Path) -> Result<(), TransportError> {
            if !from.exists() {
                return Err(TransportError::NotFound(from.display().to_string()));
            }
            std::fs::copy(from, to).map(|_| ()).map_err(|e| TransportError::Remote {
                code: 1,
                message: e.to_string(),
            })
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn host(&self) -> &str {
            "fake"
        }

        async fn run(
            &self,
            command: &str,
            input: Option<Vec<u8>>,
        ) -> Result<CommandOutput, TransportError> {
            self.record(TransportCall::Run(command.to_string()))?;
            let stdin = input.map(Input::Bytes).unwrap_or(Input::Null);
            Ok(self.runner.run_blocking(&CommandSpec::shell(command).stdin(stdin)).await?)
        }

        fn spawn_script(&self, script: &str) -> Result<ProcessHandle, TransportError> {
            self.record(TransportCall::Spawn(script.to_string()))?;
            let spec = CommandSpec::new("sh")
                .arg("-s")
                .stdin(Input::Bytes(script.as_bytes().to_vec()))
                .stdout(Redirect::Capture)
                .stderr(Redirect::Capture);
            Ok(self.runner.spawn(&spec)?)
        }

        async fn upload(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
            self.record(TransportCall::Upload {
                local: local.display().to_string(),
                remote: remote.to_string(),
            })?;
            Self::copy(local, Path::new(remote))
        }

        async fn download(&self, remote: &str, local: &Path) -> Result<(), TransportError> {
            self.record(TransportCall::Download {
                remote: remote.to_string(),
                local: local.display().to_string(),
            })?;
            Self::copy(Path::new(remote), local)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeTransport, TransportCall};

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
