// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queuing-system submission over a [`Transport`].

use super::{last_token, BatchError, JobDescription, RemoteStatus, SubmissionService};
use crate::quote::{command_line, quote_arg};
use crate::transport::Transport;
use async_trait::async_trait;
use qj_core::BatchDefaults;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

/// Scheduler replies meaning the id is no longer known (the job left the queue).
const UNKNOWN_ID_REPLIES: &[&str] = &["invalid job id", "unknown job id", "job has finished"];

/// Submits generated job scripts to a queuing system on the remote host.
#[derive(Clone)]
pub struct QueueService {
    transport: Arc<dyn Transport>,
    commands: BatchDefaults,
}

impl QueueService {
    pub fn new(transport: Arc<dyn Transport>, commands: BatchDefaults) -> Self {
        Self { transport, commands }
    }

    /// Job script for `job`, with resource directives for the configured scheduler.
    pub fn render_script(&self, job: &JobDescription) -> String {
        let style = DirectiveStyle::from_prefix(&self.commands.directive);
        let prefix = &self.commands.directive;
        let mut script = String::from("#!/bin/sh\n");
        let mut directive = |flag: String| {
            let _ = writeln!(script, "{} {}", prefix, flag);
        };

        directive(style.name(&job.name));
        if let Some(n) = job.processors {
            directive(style.processors(n));
        }
        if let Some(memory) = &job.memory {
            directive(style.memory(memory));
        }
        if let Some(queue) = &job.queue {
            directive(style.queue(queue));
        }
        if let Some(wall_time) = &job.wall_time {
            directive(style.wall_time(wall_time));
        }
        if let Some(account) = &job.account {
            directive(style.account(account));
        }

        let _ = writeln!(script, "cd {} || exit 1", quote_arg(&job.directory));
        let mut line = command_line(&job.command, &job.args);
        if let Some(stdin) = &job.stdin {
            let _ = write!(line, " < {}", quote_arg(stdin));
        }
        if let Some(stdout) = &job.stdout {
            let _ = write!(line, " > {}", quote_arg(stdout));
        }
        if let Some(stderr) = &job.stderr {
            let _ = write!(line, " 2> {}", quote_arg(stderr));
        }
        script.push_str(&line);
        script.push('\n');
        script
    }

    fn script_path(job: &JobDescription) -> String {
        format!("{}/{}.qj.sh", job.directory.trim_end_matches('/'), job.name)
    }

    async fn run_checked(&self, command: String) -> Result<String, BatchError> {
        let output = self.transport.exec(&command).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(BatchError::Command { program: command, message: output.error_text() })
        }
    }
}

#[async_trait]
impl SubmissionService for QueueService {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn prepare(&self, directory: &str) -> Result<(), BatchError> {
        self.run_checked(format!("mkdir -p {}", quote_arg(directory))).await.map(|_| ())
    }

    async fn stage_in(&self, local: &Path, remote: &str) -> Result<(), BatchError> {
        Ok(self.transport.upload(local, remote).await?)
    }

    async fn stage_out(&self, remote: &str, local: &Path) -> Result<(), BatchError> {
        Ok(self.transport.download(remote, local).await?)
    }

    async fn remove(&self, remote: &str, recursive: bool) -> Result<(), BatchError> {
        let flags = if recursive { "-rf" } else { "-f" };
        self.run_checked(format!("rm {} {}", flags, quote_arg(remote))).await.map(|_| ())
    }

    async fn submit(&self, job: &JobDescription) -> Result<String, BatchError> {
        let path = Self::script_path(job);
        self.transport.write_file(&path, &self.render_script(job)).await?;

        let command = format!(
            "cd {} && {} {}",
            quote_arg(&job.directory),
            self.commands.submit_command,
            quote_arg(&path)
        );
        let output = self.transport.exec(&command).await?;
        if !output.success() {
            return Err(BatchError::Rejected(output.error_text()));
        }
        let id = last_token(&output.stdout).ok_or_else(|| BatchError::BadReply {
            program: self.commands.submit_command.clone(),
            reply: output.stdout.clone(),
        })?;
        tracing::info!(host = self.transport.host(), remote_id = id, "submitted batch job");
        Ok(id.to_string())
    }

    async fn poll(&self, remote_id: &str) -> Result<RemoteStatus, BatchError> {
        let command = format!("{} {}", self.commands.status_command, quote_arg(remote_id));
        let output = self.transport.exec(&command).await?;
        let combined = format!("{}\n{}", output.stdout, output.stderr).to_lowercase();
        if UNKNOWN_ID_REPLIES.iter().any(|reply| combined.contains(reply)) {
            return Ok(RemoteStatus::Done);
        }
        if !output.success() {
            return Err(BatchError::Command { program: command, message: output.error_text() });
        }
        match output.stdout.split_whitespace().next() {
            None => Ok(RemoteStatus::Done),
            Some(state) => Ok(parse_state(state)),
        }
    }

    async fn cancel(&self, remote_id: &str) -> Result<(), BatchError> {
        tracing::info!(host = self.transport.host(), remote_id, "cancelling batch job");
        self.run_checked(format!("{} {}", self.commands.cancel_command, quote_arg(remote_id)))
            .await
            .map(|_| ())
    }
}

/// Map a scheduler state word (long or short form) to a [`RemoteStatus`].
///
/// Unrecognised states count as running so polling continues.
pub(crate) fn parse_state(state: &str) -> RemoteStatus {
    match state.to_ascii_uppercase().as_str() {
        "PENDING" | "PD" | "CONFIGURING" | "CF" | "QUEUED" | "Q" | "HELD" | "H" | "W" => {
            RemoteStatus::Pending
        }
        "RUNNING" | "R" | "COMPLETING" | "CG" | "E" | "SUSPENDED" | "S" => RemoteStatus::Running,
        "COMPLETED" | "CD" | "C" => RemoteStatus::Done,
        failed @ ("FAILED" | "F" | "CANCELLED" | "CA" | "TIMEOUT" | "TO" | "NODE_FAIL" | "NF"
        | "OUT_OF_MEMORY" | "OOM" | "BOOT_FAIL" | "BF" | "PREEMPTED" | "PR") => {
            RemoteStatus::Failed(failed.to_ascii_lowercase())
        }
        other => {
            tracing::debug!(state = other, "unrecognised scheduler state");
            RemoteStatus::Running
        }
    }
}

/// Resource directive syntax, chosen from the directive prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectiveStyle {
    Slurm,
    Pbs,
}

impl DirectiveStyle {
    fn from_prefix(prefix: &str) -> Self {
        if prefix.contains("PBS") {
            DirectiveStyle::Pbs
        } else {
            DirectiveStyle::Slurm
        }
    }

    fn name(self, name: &str) -> String {
        match self {
            DirectiveStyle::Slurm => format!("--job-name={}", name),
            DirectiveStyle::Pbs => format!("-N {}", name),
        }
    }

    fn processors(self, n: u32) -> String {
        match self {
            DirectiveStyle::Slurm => format!("--ntasks={}", n),
            DirectiveStyle::Pbs => format!("-l nodes=1:ppn={}", n),
        }
    }

    fn memory(self, memory: &str) -> String {
        match self {
            DirectiveStyle::Slurm => format!("--mem={}", memory),
            DirectiveStyle::Pbs => format!("-l mem={}", memory),
        }
    }

    fn queue(self, queue: &str) -> String {
        match self {
            DirectiveStyle::Slurm => format!("--partition={}", queue),
            DirectiveStyle::Pbs => format!("-q {}", queue),
        }
    }

    fn wall_time(self, wall_time: &str) -> String {
        match self {
            DirectiveStyle::Slurm => format!("--time={}", wall_time),
            DirectiveStyle::Pbs => format!("-l walltime={}", wall_time),
        }
    }

    fn account(self, account: &str) -> String {
        match self {
            DirectiveStyle::Slurm => format!("--account={}", account),
            DirectiveStyle::Pbs => format!("-A {}", account),
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
