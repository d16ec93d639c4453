// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step handlers, one implementation per job kind.
//!
//! The run loop matches on the step action and calls the matching
//! [`StepExecutor`] method; callback steps never reach an executor.
//!
//! Handlers return `Ok(StepOutcome::Failed(..))` for failures of the step
//! itself (a missing file, a non-zero exit) so the step's error flags
//! apply, and `Err` only when the job cannot continue at all (missing
//! parameters, an unreachable host, a program that cannot be started).

mod batch;
mod local;
mod remote;

pub use batch::BatchExecutor;
pub use local::LocalExecutor;
pub use remote::RemoteExecutor;

use crate::context::StepContext;
use crate::error::StepError;
use async_trait::async_trait;
use qj_adapters::quote::{command_line, quote_arg};
use qj_adapters::{ProcessRunner, StderrPolicy, TransportError};
use qj_core::{params, AppSpec, Defaults, JobKind, StepOutcome};
use std::path::Path;
use std::sync::Arc;

/// Back end that carries out the side-effecting step actions.
#[async_trait]
pub trait StepExecutor: Send + Sync + 'static {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Choose (and create) the working directory. `path` overrides the default.
    async fn allocate_scratch(
        &self,
        ctx: &StepContext,
        path: Option<&Path>,
    ) -> Result<StepOutcome, StepError>;

    async fn delete_file(&self, ctx: &StepContext, path: &Path) -> Result<StepOutcome, StepError>;

    /// Stage `local` (under the local directory) to `remote` (under scratch).
    async fn copy_out(
        &self,
        ctx: &StepContext,
        local: &Path,
        remote: &Path,
    ) -> Result<StepOutcome, StepError>;

    async fn run_app(
        &self,
        ctx: &StepContext,
        app: &AppSpec,
        via_shell: bool,
    ) -> Result<StepOutcome, StepError>;

    /// Retrieve `remote` (under scratch) to `local` (under the local directory).
    async fn copy_back(
        &self,
        ctx: &StepContext,
        remote: &Path,
        local: &Path,
    ) -> Result<StepOutcome, StepError>;

    async fn clean_scratch(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;

    /// Cancel the active step by a back-end specific route.
    ///
    /// Returns `false` when the back end has none, in which case the job
    /// terminates the step's registered process instead.
    async fn cancel(&self, _ctx: &StepContext) -> Result<bool, StepError> {
        Ok(false)
    }
}

/// The built-in executor for `kind`, configured from `defaults`.
pub fn for_kind(kind: JobKind, defaults: &Defaults) -> Arc<dyn StepExecutor> {
    let runner = ProcessRunner::new(StderrPolicy::from_fatal_flag(defaults.stderr_fatal));
    match kind {
        JobKind::Local => Arc::new(LocalExecutor::new()),
        JobKind::Remote => Arc::new(RemoteExecutor::ssh(defaults.ssh.clone(), runner)),
        JobKind::RemoteBatch => Arc::new(BatchExecutor::queue(
            defaults.ssh.clone(),
            defaults.batch.clone(),
            runner,
        )),
        JobKind::Grid => Arc::new(BatchExecutor::grid(defaults.grid.clone(), runner)),
    }
}

/// Program to run: the app's command, or the `executable` parameter when empty.
pub(crate) fn app_command(ctx: &StepContext, app: &AppSpec) -> Result<String, StepError> {
    if app.command.is_empty() {
        ctx.require(params::EXECUTABLE)
    } else {
        Ok(app.command.clone())
    }
}

/// `sh` line for `app`, including its redirections.
///
/// With `verbatim` the command is shell text and is not quoted.
pub(crate) fn shell_line(command: &str, app: &AppSpec, verbatim: bool) -> String {
    let mut line = if verbatim {
        let mut line = command.to_string();
        for arg in &app.args {
            line.push(' ');
            line.push_str(&quote_arg(arg));
        }
        line
    } else {
        command_line(command, &app.args)
    };
    let redirects = [("<", &app.stdin), (">", &app.stdout), ("2>", &app.stderr)];
    for (op, path) in redirects {
        if let Some(path) = path {
            line.push_str(&format!(" {} {}", op, quote_arg(&path.display().to_string())));
        }
    }
    line
}

/// `path` on the remote side, relative paths taken under `base`.
pub(crate) fn remote_path(base: &str, path: &Path) -> String {
    let path = path.display().to_string();
    if path.starts_with('/') {
        path
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    }
}

/// Remote working directory: scratch if allocated, else `remote_dir`, else the login directory.
pub(crate) fn remote_workdir(ctx: &StepContext) -> String {
    ctx.scratch()
        .or_else(|| ctx.parameter(params::REMOTE_DIR))
        .unwrap_or_else(|| ".".to_string())
}

/// Default remote scratch directory for the job: `<remote_dir>/<job id>`.
pub(crate) fn remote_scratch(ctx: &StepContext, path: Option<&Path>) -> String {
    let base = ctx.parameter(params::REMOTE_DIR).unwrap_or_else(|| ".".to_string());
    match path {
        Some(path) => remote_path(&base, path),
        None => format!("{}/{}", base.trim_end_matches('/'), ctx.job_id()),
    }
}

/// Step-level failures of a transfer become outcomes; losing the host is an error.
pub(crate) fn transfer_outcome(result: Result<(), TransportError>) -> Result<StepOutcome, StepError> {
    match result {
        Ok(()) => Ok(StepOutcome::ok()),
        Err(TransportError::Remote { message, .. }) => Ok(StepOutcome::Failed(message)),
        Err(e @ TransportError::NotFound(_)) => Ok(StepOutcome::Failed(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
