// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Steps on a remote host reached through a [`Transport`].

use super::{
    app_command, remote_path, remote_scratch, remote_workdir, shell_line, transfer_outcome,
    StepExecutor,
};
use crate::context::StepContext;
use crate::error::StepError;
use async_trait::async_trait;
use qj_adapters::quote::quote_arg;
use qj_adapters::{ProcessRunner, SshTransport, Transport};
use qj_core::{params, resolve_path, AppSpec, SshDefaults, StepOutcome};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
enum TransportSource {
    /// Connect with the job's host/user/port parameters
    Ssh(SshDefaults),
    Fixed(Arc<dyn Transport>),
}

/// Build an SSH transport from the job's connection parameters.
pub(crate) fn ssh_transport(
    ctx: &StepContext,
    programs: &SshDefaults,
    runner: ProcessRunner,
) -> Result<SshTransport, StepError> {
    let host = ctx.require(params::HOST)?;
    Ok(SshTransport::new(host, programs.clone(), runner)
        .user(ctx.parameter(params::USER))
        .port(ctx.parsed(params::PORT)?))
}

/// Runs steps over a remote shell.
///
/// The application step pipes its command line to `sh -s` on the host and
/// waits for it; a stop request takes effect once it returns.
#[derive(Clone)]
pub struct RemoteExecutor {
    source: TransportSource,
    runner: ProcessRunner,
}

impl RemoteExecutor {
    pub fn ssh(programs: SshDefaults, runner: ProcessRunner) -> Self {
        Self { source: TransportSource::Ssh(programs), runner }
    }

    /// Executor bound to an existing transport.
    pub fn with_transport(transport: Arc<dyn Transport>, runner: ProcessRunner) -> Self {
        Self { source: TransportSource::Fixed(transport), runner }
    }

    fn transport(&self, ctx: &StepContext) -> Result<Arc<dyn Transport>, StepError> {
        match &self.source {
            TransportSource::Ssh(programs) => {
                Ok(Arc::new(ssh_transport(ctx, programs, self.runner)?))
            }
            TransportSource::Fixed(transport) => Ok(Arc::clone(transport)),
        }
    }

    /// Run a command whose failure is a step failure rather than a job error.
    async fn exec_step(&self, ctx: &StepContext, command: &str) -> Result<StepOutcome, StepError> {
        let transport = self.transport(ctx)?;
        let result = transport.exec_checked(command).await.map(|_| ());
        transfer_outcome(result)
    }
}

#[async_trait]
impl StepExecutor for RemoteExecutor {
    fn name(&self) -> &'static str {
        "remote"
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
        let outcome = self.exec_step(ctx, &format!("mkdir -p {}", quote_arg(&dir))).await?;
        if outcome.is_completed() {
            ctx.set_scratch(dir, true);
        }
        Ok(outcome)
    }

    async fn delete_file(&self, ctx: &StepContext, path: &Path) -> Result<StepOutcome, StepError> {
        let target = remote_path(&remote_workdir(ctx), path);
        self.exec_step(ctx, &format!("rm {}", quote_arg(&target))).await
    }

    async fn copy_out(
        &self,
        ctx: &StepContext,
        local: &Path,
        remote: &Path,
    ) -> Result<StepOutcome, StepError> {
        let from = resolve_path(&ctx.local_dir(), local);
        let to = remote_path(&remote_workdir(ctx), remote);
        let transport = self.transport(ctx)?;
        transfer_outcome(transport.upload(&from, &to).await)
    }

    async fn run_app(
        &self,
        ctx: &StepContext,
        app: &AppSpec,
        via_shell: bool,
    ) -> Result<StepOutcome, StepError> {
        let command = app_command(ctx, app)?;
        let line = if via_shell {
            format!("sh -c {}", quote_arg(&shell_line(&command, app, true)))
        } else {
            shell_line(&command, app, false)
        };
        let script = format!("cd {} || exit 1\n{}\n", quote_arg(&remote_workdir(ctx)), line);

        let transport = self.transport(ctx)?;
        let mut handle = transport.spawn_script(&script)?;
        ctx.attach_killer(handle.killer());
        if ctx.kill_pending() {
            ctx.fire_killer();
        }
        tracing::info!(job_id = %ctx.job_id(), host = transport.host(), command = %line, "remote application started");

        let output = self.runner.wait_output(&mut handle).await?;
        ctx.detach_killer();
        tracing::info!(job_id = %ctx.job_id(), exit_code = output.exit_code, "remote application exited");

        if ctx.kill_pending() {
            return Ok(StepOutcome::Failed("killed".to_string()));
        }
        if output.success() {
            let stdout = app.stdout.is_none().then_some(output.stdout).filter(|s| !s.is_empty());
            let stderr = app.stderr.is_none().then_some(output.stderr).filter(|s| !s.is_empty());
            Ok(StepOutcome::with_output(stdout, stderr))
        } else {
            Ok(StepOutcome::Failed(output.error_text()))
        }
    }

    async fn copy_back(
        &self,
        ctx: &StepContext,
        remote: &Path,
        local: &Path,
    ) -> Result<StepOutcome, StepError> {
        let from = remote_path(&remote_workdir(ctx), remote);
        let to = resolve_path(&ctx.local_dir(), local);
        let transport = self.transport(ctx)?;
        transfer_outcome(transport.download(&from, &to).await)
    }

    async fn clean_scratch(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let Some(dir) = ctx.scratch() else {
            return Ok(StepOutcome::ok());
        };
        let outcome = self.exec_step(ctx, &format!("rm -rf {}", quote_arg(&dir))).await?;
        if outcome.is_completed() {
            ctx.clear_scratch();
        }
        Ok(outcome)
    }

    /// Run the `kill_command` parameter on the host, then drop the connection.
    async fn cancel(&self, ctx: &StepContext) -> Result<bool, StepError> {
        let Some(kill_command) = ctx.parameter(params::KILL_COMMAND) else {
            return Ok(false);
        };
        let transport = self.transport(ctx)?;
        match transport.exec(&kill_command).await {
            Ok(output) if !output.success() => {
                tracing::warn!(job_id = %ctx.job_id(), error = %output.error_text(), "remote kill command failed");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(job_id = %ctx.job_id(), error = %e, "remote kill command failed");
            }
        }
        ctx.fire_killer();
        Ok(true)
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
