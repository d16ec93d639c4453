// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Steps on the local machine.

use super::{app_command, shell_line, StepExecutor};
use crate::context::StepContext;
use crate::error::StepError;
use async_trait::async_trait;
use qj_adapters::{CommandSpec, Input, ProcessRunner, Redirect, StderrPolicy, WaitStatus};
use qj_core::{params, resolve_path, AppSpec, StepOutcome};
use std::path::{Path, PathBuf};

/// Runs steps with the local filesystem and process table.
///
/// Local paths resolve against the job's local directory and remote paths
/// against its scratch directory, which is the local directory unless an
/// allocate-scratch step chose another.
#[derive(Debug, Clone, Copy)]
pub struct LocalExecutor {
    runner: ProcessRunner,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalExecutor {
    pub fn new() -> Self {
        // Applications report failure through their exit code; many write
        // progress to stderr.
        Self { runner: ProcessRunner::new(StderrPolicy::ExitCodeOnly) }
    }

    fn scratch_dir(ctx: &StepContext) -> PathBuf {
        ctx.scratch().map(PathBuf::from).unwrap_or_else(|| ctx.local_dir())
    }

    fn command_spec(ctx: &StepContext, app: &AppSpec, via_shell: bool) -> Result<CommandSpec, StepError> {
        let command = app_command(ctx, app)?;
        let cwd = Self::scratch_dir(ctx);
        if via_shell {
            // Redirections are part of the shell line
            return Ok(CommandSpec::shell(shell_line(&command, app, true))
                .cwd(&cwd)
                .stdin(Input::Null)
                .stdout(Redirect::Capture)
                .stderr(Redirect::Capture));
        }
        let stdin = match &app.stdin {
            Some(path) => Input::File(resolve_path(&cwd, path)),
            None => Input::Null,
        };
        let output = |path: &Option<PathBuf>| match path {
            Some(path) => Redirect::File(resolve_path(&cwd, path)),
            None => Redirect::Capture,
        };
        Ok(CommandSpec::new(command)
            .args(app.args.iter().cloned())
            .cwd(&cwd)
            .stdin(stdin)
            .stdout(output(&app.stdout))
            .stderr(output(&app.stderr)))
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn failed(action: &str, path: &Path, e: std::io::Error) -> StepOutcome {
    StepOutcome::Failed(format!("{} {}: {}", action, path.display(), e))
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl StepExecutor for LocalExecutor {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn allocate_scratch(
        &self,
        ctx: &StepContext,
        path: Option<&Path>,
    ) -> Result<StepOutcome, StepError> {
        if ctx.is_resuming() && ctx.scratch().is_some() {
            return Ok(StepOutcome::ok());
        }
        let local = ctx.local_dir();
        let dir = match (path, ctx.parameter(params::SCRATCH_DIR)) {
            (Some(path), _) => resolve_path(&local, path),
            (None, Some(base)) => PathBuf::from(base).join(ctx.job_id().as_str()),
            (None, None) => local.clone(),
        };
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            return Ok(failed("create", &dir, e));
        }
        let allocated = !same_file(&dir, &local);
        tracing::debug!(job_id = %ctx.job_id(), dir = %dir.display(), allocated, "scratch ready");
        ctx.set_scratch(dir.display().to_string(), allocated);
        Ok(StepOutcome::ok())
    }

    async fn delete_file(&self, ctx: &StepContext, path: &Path) -> Result<StepOutcome, StepError> {
        let target = resolve_path(&Self::scratch_dir(ctx), path);
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(StepOutcome::ok()),
            Err(e) => Ok(failed("delete", &target, e)),
        }
    }

    async fn copy_out(
        &self,
        ctx: &StepContext,
        local: &Path,
        remote: &Path,
    ) -> Result<StepOutcome, StepError> {
        let from = resolve_path(&ctx.local_dir(), local);
        let to = resolve_path(&Self::scratch_dir(ctx), remote);
        if same_file(&from, &to) {
            return Ok(StepOutcome::ok());
        }
        match tokio::fs::copy(&from, &to).await {
            Ok(_) => Ok(StepOutcome::ok()),
            Err(e) => Ok(failed("copy", &from, e)),
        }
    }

    async fn run_app(
        &self,
        ctx: &StepContext,
        app: &AppSpec,
        via_shell: bool,
    ) -> Result<StepOutcome, StepError> {
        let spec = Self::command_spec(ctx, app, via_shell)?;
        let mut handle = self.runner.spawn(&spec)?;
        let killer = handle.killer();
        ctx.attach_killer(killer);
        tracing::info!(job_id = %ctx.job_id(), pid = handle.pid(), command = %spec.command_line(), "application started");

        let mut terminated = false;
        let mut stopping = false;
        let exit_code = loop {
            match handle.wait(Some(ctx.check_interval())).await? {
                WaitStatus::Exited(code) => break code,
                WaitStatus::TimedOut if terminated => {}
                WaitStatus::TimedOut => {
                    if ctx.kill_pending() || ctx.stop_requested() {
                        stopping = !ctx.kill_pending();
                        tracing::info!(job_id = %ctx.job_id(), pid = handle.pid(), stopping, "terminating application");
                        killer.kill()?;
                        terminated = true;
                    }
                }
            }
        };
        ctx.detach_killer();

        let (stdout, stderr) = handle.collect_output().await;
        let output = self.runner.judge_output(exit_code, stdout, stderr);
        tracing::info!(job_id = %ctx.job_id(), exit_code, "application exited");

        if stopping && !ctx.kill_pending() {
            return Ok(StepOutcome::Stopped);
        }
        if output.success() {
            let stdout = if via_shell || app.stdout.is_none() { non_empty(output.stdout) } else { None };
            let stderr = if via_shell || app.stderr.is_none() { non_empty(output.stderr) } else { None };
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
        let from = resolve_path(&Self::scratch_dir(ctx), remote);
        let to = resolve_path(&ctx.local_dir(), local);
        if same_file(&from, &to) {
            return Ok(StepOutcome::ok());
        }
        if tokio::fs::rename(&from, &to).await.is_ok() {
            return Ok(StepOutcome::ok());
        }
        // Across filesystems
        if let Err(e) = tokio::fs::copy(&from, &to).await {
            return Ok(failed("copy", &from, e));
        }
        if let Err(e) = tokio::fs::remove_file(&from).await {
            tracing::warn!(job_id = %ctx.job_id(), path = %from.display(), error = %e, "failed to remove retrieved file");
        }
        Ok(StepOutcome::ok())
    }

    async fn clean_scratch(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let Some(dir) = ctx.scratch() else {
            return Ok(StepOutcome::ok());
        };
        if !ctx.scratch_allocated() {
            ctx.clear_scratch();
            return Ok(StepOutcome::ok());
        }
        let dir = PathBuf::from(dir);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                ctx.clear_scratch();
                Ok(StepOutcome::ok())
            }
            Err(e) => Ok(failed("remove", &dir, e)),
        }
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
