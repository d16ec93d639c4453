// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Grid submission through locally installed client tools.

use super::{last_token, BatchError, JobDescription, RemoteStatus, SubmissionService};
use crate::subprocess::{CommandSpec, Input, ProcessRunner};
use async_trait::async_trait;
use qj_core::GridDefaults;
use std::path::Path;

/// Submits RSL job descriptions to a grid resource manager.
#[derive(Debug, Clone)]
pub struct GridService {
    /// Resource manager contact string, e.g. `gk.example.org:2119/jobmanager-pbs`
    contact: String,
    tools: GridDefaults,
    runner: ProcessRunner,
}

impl GridService {
    pub fn new(contact: impl Into<String>, tools: GridDefaults, runner: ProcessRunner) -> Self {
        Self { contact: contact.into(), tools, runner }
    }

    /// Host part of the contact string.
    pub fn host(&self) -> &str {
        let end = self.contact.find([':', '/']).unwrap_or(self.contact.len());
        &self.contact[..end]
    }

    fn gsiftp_url(&self, remote: &str) -> String {
        format!("gsiftp://{}/{}", self.host(), remote.trim_start_matches('/'))
    }

    /// Resource specification for `job`.
    pub fn render_rsl(&self, job: &JobDescription) -> String {
        let mut rsl = format!("&(executable={})", rsl_value(&job.command));
        if !job.args.is_empty() {
            let args: Vec<String> = job.args.iter().map(|a| rsl_value(a)).collect();
            rsl.push_str(&format!("(arguments={})", args.join(" ")));
        }
        rsl.push_str(&format!("(directory={})", rsl_value(&job.directory)));
        let optional = [
            ("stdin", job.stdin.clone()),
            ("stdout", job.stdout.clone()),
            ("stderr", job.stderr.clone()),
            ("count", job.processors.map(|n| n.to_string())),
            ("maxMemory", job.memory.clone()),
            ("queue", job.queue.clone()),
            ("maxWallTime", job.wall_time.clone()),
            ("project", job.account.clone()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                rsl.push_str(&format!("({}={})", key, rsl_value(&value)));
            }
        }
        rsl
    }

    async fn run_tool(&self, spec: CommandSpec) -> Result<String, BatchError> {
        let program = spec.command_line();
        let output = self.runner.run_blocking(&spec.stdin(Input::Null)).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(BatchError::Command { program, message: output.error_text() })
        }
    }

    fn exec_remote(&self, program: &str) -> CommandSpec {
        CommandSpec::new(&self.tools.exec_program).arg(&self.contact).arg(program)
    }
}

/// Quote an RSL value when it holds anything beyond plain word characters.
fn rsl_value(value: &str) -> String {
    let plain = !value.is_empty()
        && value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':'));
    if plain {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('"', "\"\""))
    }
}

#[async_trait]
impl SubmissionService for GridService {
    fn name(&self) -> &'static str {
        "grid"
    }

    async fn prepare(&self, directory: &str) -> Result<(), BatchError> {
        self.run_tool(self.exec_remote("/bin/mkdir").arg("-p").arg(directory)).await.map(|_| ())
    }

    async fn stage_in(&self, local: &Path, remote: &str) -> Result<(), BatchError> {
        let spec = CommandSpec::new(&self.tools.copy_program)
            .arg(format!("file://{}", local.display()))
            .arg(self.gsiftp_url(remote));
        self.run_tool(spec).await.map(|_| ())
    }

    async fn stage_out(&self, remote: &str, local: &Path) -> Result<(), BatchError> {
        let spec = CommandSpec::new(&self.tools.copy_program)
            .arg(self.gsiftp_url(remote))
            .arg(format!("file://{}", local.display()));
        self.run_tool(spec).await.map(|_| ())
    }

    async fn remove(&self, remote: &str, recursive: bool) -> Result<(), BatchError> {
        let flags = if recursive { "-rf" } else { "-f" };
        self.run_tool(self.exec_remote("/bin/rm").arg(flags).arg(remote)).await.map(|_| ())
    }

    async fn submit(&self, job: &JobDescription) -> Result<String, BatchError> {
        let spec = CommandSpec::new(&self.tools.submit_program)
            .arg("-b")
            .arg("-r")
            .arg(&self.contact)
            .arg(self.render_rsl(job));
        let reply = self.run_tool(spec).await.map_err(|e| match e {
            BatchError::Command { message, .. } => BatchError::Rejected(message),
            other => other,
        })?;
        let id = reply
            .lines()
            .filter_map(last_token)
            .find(|token| token.starts_with("https://"))
            .ok_or_else(|| BatchError::BadReply {
                program: self.tools.submit_program.clone(),
                reply: reply.clone(),
            })?;
        tracing::info!(contact = %self.contact, remote_id = id, "submitted grid job");
        Ok(id.to_string())
    }

    async fn poll(&self, remote_id: &str) -> Result<RemoteStatus, BatchError> {
        let reply = self
            .run_tool(CommandSpec::new(&self.tools.status_program).arg(remote_id))
            .await?;
        let Some(state) = reply.split_whitespace().next() else {
            return Ok(RemoteStatus::Done);
        };
        Ok(match state.to_ascii_uppercase().as_str() {
            "UNSUBMITTED" | "PENDING" | "STAGE_IN" => RemoteStatus::Pending,
            "ACTIVE" | "SUSPENDED" | "STAGE_OUT" => RemoteStatus::Running,
            "DONE" => RemoteStatus::Done,
            "FAILED" => RemoteStatus::Failed("grid job failed".to_string()),
            other => {
                tracing::debug!(state = other, "unrecognised grid state");
                RemoteStatus::Running
            }
        })
    }

    async fn cancel(&self, remote_id: &str) -> Result<(), BatchError> {
        tracing::info!(remote_id, "cancelling grid job");
        let spec = CommandSpec::new(&self.tools.cancel_program).arg("-f").arg(remote_id);
        self.run_tool(spec).await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "grid_tests.rs"]
mod tests;
