// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Steps for queued and grid jobs: the application is submitted to a
//! [`SubmissionService`] and polled until it finishes.

use super::remote::ssh_transport;
use super::{app_command, remote_path, remote_scratch, remote_workdir, StepExecutor};
use crate::context::StepContext;
use crate::error::StepError;
use async_trait::async_trait;
use qj_adapters::{
    BatchError, GridService, JobDescription, ProcessRunner, QueueService, RemoteStatus,
    SubmissionService, TransportError,
};
use qj_core::{params, resolve_path, AppSpec, BatchDefaults, GridDefaults, SshDefaults, StepOutcome};
use std::path::Path;
use std::sync::Arc;

/// Consecutive failed polls tolerated before the step fails.
pub const DEFAULT_MAX_POLL_ERRORS: u32 = 3;

#[derive(Clone)]
enum ServiceSource {
    Queue { ssh: SshDefaults, commands: BatchDefaults },
    Grid { tools: GridDefaults },
    Fixed(Arc<dyn SubmissionService>),
}

#[derive(Clone)]
pub struct BatchExecutor {
    source: ServiceSource,
    runner: ProcessRunner,
    max_poll_errors: u32,
}

impl BatchExecutor {
    /// Queuing system on the job's `host`, reached over SSH.
    pub fn queue(ssh: SshDefaults, commands: BatchDefaults, runner: ProcessRunner) -> Self {
        Self::from_source(ServiceSource::Queue { ssh, commands }, runner)
    }

    /// Grid resource manager named by the job's `contact`.
    pub fn grid(tools: GridDefaults, runner: ProcessRunner) -> Self {
        Self::from_source(ServiceSource::Grid { tools }, runner)
    }

    /// Executor bound to an existing service.
    pub fn with_service(service: Arc<dyn SubmissionService>) -> Self {
        Self::from_source(ServiceSource::Fixed(service), ProcessRunner::default())
    }

    fn from_source(source: ServiceSource, runner: ProcessRunner) -> Self {
        Self { source, runner, max_poll_errors: DEFAULT_MAX_POLL_ERRORS }
    }

    pub fn max_poll_errors(mut self, n: u32) -> Self {
        self.max_poll_errors = n.max(1);
        self
    }

    fn service(&self, ctx: &StepContext) -> Result<Arc<dyn SubmissionService>, StepError> {
        match &self.source {
            ServiceSource::Queue { ssh, commands } => {
                let transport = ssh_transport(ctx, ssh, self.runner)?;
                Ok(Arc::new(QueueService::new(Arc::new(transport), commands.clone())))
            }
            ServiceSource::Grid { tools } => {
                let contact = ctx.require(params::CONTACT)?;
                Ok(Arc::new(GridService::new(contact, tools.clone(), self.runner)))
            }
            ServiceSource::Fixed(service) => Ok(Arc::clone(service)),
        }
    }

    fn describe(ctx: &StepContext, app: &AppSpec, via_shell: bool) -> Result<JobDescription, StepError> {
        let command = app_command(ctx, app)?;
        let path = |p: &Option<std::path::PathBuf>| p.as_ref().map(|p| p.display().to_string());
        let (command, args, stdin, stdout, stderr) = if via_shell {
            let line = super::shell_line(&command, app, true);
            ("sh".to_string(), vec!["-c".to_string(), line], None, None, None)
        } else {
            (command, app.args.clone(), path(&app.stdin), path(&app.stdout), path(&app.stderr))
        };
        Ok(JobDescription {
            name: batch_name(&ctx.job_name(), ctx.job_id().suffix()),
            directory: remote_workdir(ctx),
            command,
            args,
            stdin,
            stdout,
            stderr,
            processors: ctx.parsed(params::PROCESSORS)?,
            memory: ctx.parameter(params::MEMORY),
            queue: ctx.parameter(params::QUEUE),
            wall_time: ctx.parameter(params::WALL_TIME),
            account: ctx.parameter(params::ACCOUNT),
        })
    }

    /// Poll `remote_id` until it finishes, the job is stopped, or it is killed.
    async fn wait_for(
        &self,
        ctx: &StepContext,
        service: &dyn SubmissionService,
        remote_id: &str,
    ) -> Result<StepOutcome, StepError> {
        let mut errors = 0;
        loop {
            if ctx.kill_pending() {
                // A kill that landed during submit had no id to cancel
                if ctx.remote_id().as_deref() == Some(remote_id) {
                    match service.cancel(remote_id).await {
                        Ok(()) => {
                            tracing::info!(job_id = %ctx.job_id(), remote_id, "cancelled submitted job");
                            ctx.set_remote_id(None);
                        }
                        Err(e) => {
                            tracing::warn!(job_id = %ctx.job_id(), remote_id, error = %e, "cancel failed");
                        }
                    }
                }
                return Ok(StepOutcome::Failed("killed".to_string()));
            }
            if ctx.stop_requested() {
                tracing::info!(job_id = %ctx.job_id(), remote_id, "leaving submitted job to resume later");
                return Ok(StepOutcome::Stopped);
            }
            match service.poll(remote_id).await {
                Ok(RemoteStatus::Done) => {
                    tracing::info!(job_id = %ctx.job_id(), remote_id, "submitted job finished");
                    ctx.set_remote_id(None);
                    return Ok(StepOutcome::ok());
                }
                Ok(RemoteStatus::Failed(reason)) => {
                    tracing::warn!(job_id = %ctx.job_id(), remote_id, reason = %reason, "submitted job failed");
                    ctx.set_remote_id(None);
                    return Ok(StepOutcome::Failed(format!("{} job {} failed: {}", service.name(), remote_id, reason)));
                }
                Ok(status) => {
                    errors = 0;
                    tracing::debug!(job_id = %ctx.job_id(), remote_id, %status, "polled");
                }
                Err(e) => {
                    errors += 1;
                    tracing::warn!(job_id = %ctx.job_id(), remote_id, errors, error = %e, "poll failed");
                    if errors >= self.max_poll_errors {
                        return Ok(StepOutcome::Failed(format!("lost track of job {}: {}", remote_id, e)));
                    }
                }
            }
            ctx.pause().await;
        }
    }
}

/// Scheduler-safe job name: word characters only, never starting with a digit.
fn batch_name(name: &str, suffix: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .take(24)
        .collect();
    match cleaned.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => cleaned,
        Some(_) => format!("qj_{}", cleaned),
        None => format!("qj_{}", suffix),
    }
}

/// Service failures that concern only this step become outcomes.
fn service_outcome(result: Result<(), BatchError>) -> Result<StepOutcome, StepError> {
    match result {
        Ok(()) => Ok(StepOutcome::ok()),
        Err(BatchError::Transport(e @ (TransportError::Auth { .. } | TransportError::Connection { .. }))) => {
            Err(e.into())
        }
        Err(BatchError::Process(e)) => Err(e.into()),
        Err(e) => Ok(StepOutcome::Failed(e.to_string())),
    }
}

#[async_trait]
impl StepExecutor for BatchExecutor {
    fn name(&self) -> &'static str {
        "batch"
    }

    async fn allocate_scratch(
        &self,
        ctx: &StepContext,
        path: Option<&Path>,
    ) -> Result<StepOutcome, StepError> {
        if ctx.is_resuming() && ctx.scratch().is_some() {
            return Ok(StepOutcome::ok());
        }
        let dir = remote_scratch(ctx, path);
        let outcome = service_outcome(self.service(ctx)?.prepare(&dir).await)?;
        if outcome.is_completed() {
            ctx.set_scratch(dir, true);
        }
        Ok(outcome)
    }

    async fn delete_file(&self, ctx: &StepContext, path: &Path) -> Result<StepOutcome, StepError> {
        let target = remote_path(&remote_workdir(ctx), path);
        service_outcome(self.service(ctx)?.remove(&target, false).await)
    }

    async fn copy_out(
        &self,
        ctx: &StepContext,
        local: &Path,
        remote: &Path,
    ) -> Result<StepOutcome, StepError> {
        let from = resolve_path(&ctx.local_dir(), local);
        let to = remote_path(&remote_workdir(ctx), remote);
        service_outcome(self.service(ctx)?.stage_in(&from, &to).await)
    }

    async fn run_app(
        &self,
        ctx: &StepContext,
        app: &AppSpec,
        via_shell: bool,
    ) -> Result<StepOutcome, StepError> {
        let service = self.service(ctx)?;
        let remote_id = match ctx.remote_id().filter(|_| ctx.is_resuming()) {
            Some(remote_id) => {
                tracing::info!(job_id = %ctx.job_id(), remote_id = %remote_id, "resuming submitted job");
                remote_id
            }
            None => {
                let description = Self::describe(ctx, app, via_shell)?;
                match service.submit(&description).await {
                    Ok(remote_id) => {
                        tracing::info!(job_id = %ctx.job_id(), remote_id = %remote_id, service = service.name(), "job submitted");
                        ctx.set_remote_id(Some(remote_id.clone()));
                        remote_id
                    }
                    Err(e) => return service_outcome(Err(e)),
                }
            }
        };
        self.wait_for(ctx, service.as_ref(), &remote_id).await
    }

    async fn copy_back(
        &self,
        ctx: &StepContext,
        remote: &Path,
        local: &Path,
    ) -> Result<StepOutcome, StepError> {
        let from = remote_path(&remote_workdir(ctx), remote);
        let to = resolve_path(&ctx.local_dir(), local);
        service_outcome(self.service(ctx)?.stage_out(&from, &to).await)
    }

    async fn clean_scratch(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let Some(dir) = ctx.scratch() else {
            return Ok(StepOutcome::ok());
        };
        let outcome = service_outcome(self.service(ctx)?.remove(&dir, true).await)?;
        if outcome.is_completed() {
            ctx.clear_scratch();
        }
        Ok(outcome)
    }

    /// Cancel the submitted job, if the active step has one.
    async fn cancel(&self, ctx: &StepContext) -> Result<bool, StepError> {
        let Some(remote_id) = ctx.remote_id() else {
            return Ok(false);
        };
        self.service(ctx)?.cancel(&remote_id).await?;
        ctx.set_remote_id(None);
        Ok(true)
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
