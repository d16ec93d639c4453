// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job steps: the atomic units of work a job executes in order.
//!
//! A [`JobStep`] pairs a diagnostic name with a [`StepAction`]. Each action
//! variant carries exactly the fields it needs, so a handler never has to
//! guess which of a dozen optional paths are meaningful. [`StepSpec`] is the
//! serializable projection used by job files and saved snapshots; it has no
//! callback variant, so callbacks can never be persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Tag-only variant of [`StepAction`] (strips associated data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    AllocateScratch,
    DeleteFile,
    CopyOutFile,
    RunApp,
    RunAppViaShell,
    CopyBackFile,
    CleanScratch,
    Callback,
}

crate::simple_display! {
    StepKind {
        AllocateScratch => "allocate_scratch",
        DeleteFile => "delete_file",
        CopyOutFile => "copy_out_file",
        RunApp => "run_app",
        RunAppViaShell => "run_app_via_shell",
        CopyBackFile => "copy_back_file",
        CleanScratch => "clean_scratch",
        Callback => "callback",
    }
}

/// A program invocation with optional stream redirections.
///
/// Redirection paths are relative to the directory the step runs in
/// (the scratch directory for local jobs, the remote directory otherwise).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<PathBuf>,
}

impl AppSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), args: Vec::new(), stdin: None, stdout: None, stderr: None }
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

    crate::setters! {
        option {
            stdin: PathBuf,
            stdout: PathBuf,
            stderr: PathBuf,
        }
    }
}

type CallbackFn = dyn Fn() -> (i32, String) + Send + Sync;

/// Collaborator-supplied function run by a callback step.
///
/// Returns `(exit_code, message)`: zero is success, anything else is a
/// step failure carrying `message`.
#[derive(Clone)]
pub struct StepCallback(Arc<CallbackFn>);

impl StepCallback {
    pub fn new(f: impl Fn() -> (i32, String) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self) -> (i32, String) {
        (self.0)()
    }
}

impl fmt::Debug for StepCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StepCallback(..)")
    }
}

/// What a step does, with the parameters relevant to that kind only.
#[derive(Debug, Clone)]
pub enum StepAction {
    /// Create the scratch directory (an explicit path overrides the job's)
    AllocateScratch { path: Option<PathBuf> },
    DeleteFile { path: PathBuf },
    /// Stage a local file into the execution directory
    CopyOutFile { local: PathBuf, remote: PathBuf },
    RunApp(AppSpec),
    /// Run through the platform shell so the command line may use shell syntax
    RunAppViaShell(AppSpec),
    /// Retrieve a result file from the execution directory
    CopyBackFile { remote: PathBuf, local: PathBuf },
    CleanScratch,
    Callback(StepCallback),
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            StepAction::AllocateScratch { .. } => StepKind::AllocateScratch,
            StepAction::DeleteFile { .. } => StepKind::DeleteFile,
            StepAction::CopyOutFile { .. } => StepKind::CopyOutFile,
            StepAction::RunApp(_) => StepKind::RunApp,
            StepAction::RunAppViaShell(_) => StepKind::RunAppViaShell,
            StepAction::CopyBackFile { .. } => StepKind::CopyBackFile,
            StepAction::CleanScratch => StepKind::CleanScratch,
            StepAction::Callback(_) => StepKind::Callback,
        }
    }

    /// Default diagnostic label for a step performing this action.
    fn default_name(&self) -> String {
        match self {
            StepAction::AllocateScratch { .. } => "allocate scratch".to_string(),
            StepAction::DeleteFile { path } => format!("delete {}", path.display()),
            StepAction::CopyOutFile { local, .. } => format!("copy out {}", local.display()),
            StepAction::RunApp(app) | StepAction::RunAppViaShell(app) => {
                format!("run {}", app.command)
            }
            StepAction::CopyBackFile { remote, .. } => format!("copy back {}", remote.display()),
            StepAction::CleanScratch => "clean scratch".to_string(),
            StepAction::Callback(_) => "callback".to_string(),
        }
    }
}

/// One unit of work within a job.
///
/// Immutable once built: the chaining methods consume the step, and the
/// job that receives it only ever reads it.
#[derive(Debug, Clone)]
pub struct JobStep {
    name: String,
    action: StepAction,
    kill_on_error: bool,
    warn_on_error: bool,
}

impl JobStep {
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self { name: name.into(), action, kill_on_error: true, warn_on_error: false }
    }

    /// Build a step labelled after its action.
    pub fn from_action(action: StepAction) -> Self {
        let name = action.default_name();
        Self::new(name, action)
    }

    pub fn allocate_scratch() -> Self {
        Self::from_action(StepAction::AllocateScratch { path: None })
    }

    pub fn delete_file(path: impl Into<PathBuf>) -> Self {
        Self::from_action(StepAction::DeleteFile { path: path.into() })
    }

    pub fn copy_out(local: impl Into<PathBuf>, remote: impl Into<PathBuf>) -> Self {
        Self::from_action(StepAction::CopyOutFile { local: local.into(), remote: remote.into() })
    }

    pub fn run_app(app: AppSpec) -> Self {
        Self::from_action(StepAction::RunApp(app))
    }

    pub fn run_app_via_shell(app: AppSpec) -> Self {
        Self::from_action(StepAction::RunAppViaShell(app))
    }

    pub fn copy_back(remote: impl Into<PathBuf>, local: impl Into<PathBuf>) -> Self {
        Self::from_action(StepAction::CopyBackFile { remote: remote.into(), local: local.into() })
    }

    pub fn clean_scratch() -> Self {
        Self::from_action(StepAction::CleanScratch)
    }

    pub fn callback(
        name: impl Into<String>,
        f: impl Fn() -> (i32, String) + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, StepAction::Callback(StepCallback::new(f)))
    }

    /// Whether a failure of this step fails the whole job (default: true).
    pub fn kill_on_error(mut self, v: bool) -> Self {
        self.kill_on_error = v;
        self
    }

    /// Whether a non-fatal failure raises a job warning (default: false).
    pub fn warn_on_error(mut self, v: bool) -> Self {
        self.warn_on_error = v;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> &StepAction {
        &self.action
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }

    pub fn is_kill_on_error(&self) -> bool {
        self.kill_on_error
    }

    pub fn is_warn_on_error(&self) -> bool {
        self.warn_on_error
    }

    /// Callback steps hold collaborator code and cannot be persisted.
    pub fn is_persistable(&self) -> bool {
        !matches!(self.action, StepAction::Callback(_))
    }
}

/// Output captured by a step handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Result a step handler reports back to the run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed(StepOutput),
    /// The step did not succeed; the job decides whether that is fatal
    Failed(String),
    /// The handler observed a stop request mid-step; the step re-runs on resume
    Stopped,
}

impl StepOutcome {
    pub fn ok() -> Self {
        StepOutcome::Completed(StepOutput::default())
    }

    pub fn with_output(stdout: Option<String>, stderr: Option<String>) -> Self {
        StepOutcome::Completed(StepOutput { stdout, stderr })
    }

    /// Interpret an `(exit_code, message)` pair from a callback or command.
    pub fn from_code(code: i32, message: impl Into<String>) -> Self {
        if code == 0 {
            StepOutcome::ok()
        } else {
            let message = message.into();
            if message.is_empty() {
                StepOutcome::Failed(format!("exit code {code}"))
            } else {
                StepOutcome::Failed(message)
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed(_))
    }
}

fn default_true() -> bool {
    true
}

/// Persistable action (everything but callbacks).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSpec {
    AllocateScratch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    DeleteFile {
        path: PathBuf,
    },
    CopyOutFile {
        local: PathBuf,
        remote: PathBuf,
    },
    RunApp(AppSpec),
    RunAppViaShell(AppSpec),
    CopyBackFile {
        remote: PathBuf,
        local: PathBuf,
    },
    CleanScratch,
}

/// Serializable view of a [`JobStep`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub action: ActionSpec,
    #[serde(default = "default_true")]
    pub kill_on_error: bool,
    #[serde(default)]
    pub warn_on_error: bool,
}

impl From<StepSpec> for JobStep {
    fn from(spec: StepSpec) -> Self {
        let action = match spec.action {
            ActionSpec::AllocateScratch { path } => StepAction::AllocateScratch { path },
            ActionSpec::DeleteFile { path } => StepAction::DeleteFile { path },
            ActionSpec::CopyOutFile { local, remote } => StepAction::CopyOutFile { local, remote },
            ActionSpec::RunApp(app) => StepAction::RunApp(app),
            ActionSpec::RunAppViaShell(app) => StepAction::RunAppViaShell(app),
            ActionSpec::CopyBackFile { remote, local } => StepAction::CopyBackFile { remote, local },
            ActionSpec::CleanScratch => StepAction::CleanScratch,
        };
        let step = match spec.name {
            Some(name) => JobStep::new(name, action),
            None => JobStep::from_action(action),
        };
        step.kill_on_error(spec.kill_on_error).warn_on_error(spec.warn_on_error)
    }
}

/// Callback steps have no serializable form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("step '{0}' is a callback and cannot be persisted")]
pub struct NotPersistable(pub String);

impl TryFrom<&JobStep> for StepSpec {
    type Error = NotPersistable;

    fn try_from(step: &JobStep) -> Result<Self, Self::Error> {
        let action = match &step.action {
            StepAction::AllocateScratch { path } => ActionSpec::AllocateScratch { path: path.clone() },
            StepAction::DeleteFile { path } => ActionSpec::DeleteFile { path: path.clone() },
            StepAction::CopyOutFile { local, remote } => {
                ActionSpec::CopyOutFile { local: local.clone(), remote: remote.clone() }
            }
            StepAction::RunApp(app) => ActionSpec::RunApp(app.clone()),
            StepAction::RunAppViaShell(app) => ActionSpec::RunAppViaShell(app.clone()),
            StepAction::CopyBackFile { remote, local } => {
                ActionSpec::CopyBackFile { remote: remote.clone(), local: local.clone() }
            }
            StepAction::CleanScratch => ActionSpec::CleanScratch,
            StepAction::Callback(_) => return Err(NotPersistable(step.name.clone())),
        };
        Ok(StepSpec {
            name: Some(step.name.clone()),
            action,
            kill_on_error: step.kill_on_error,
            warn_on_error: step.warn_on_error,
        })
    }
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
