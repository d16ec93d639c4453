// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job handle and run loop.
//!
//! A [`Job`] is a cheap-clone handle: the worker task drives [`Job::run`]
//! while any other task may read its status or call [`Job::stop`] and
//! [`Job::kill`]. State lives behind a mutex that is only held for short,
//! non-blocking sections; status changes are also published on a watch
//! channel so `stop` can wait for the worker to acknowledge.

use crate::context::StepContext;
use crate::error::{ProtocolError, StepError};
use crate::executor::{self, StepExecutor};
use futures_util::FutureExt;
use parking_lot::Mutex;
use qj_adapters::ProcessKiller;
use qj_core::{
    epoch_ms, Defaults, JobId, JobKind, JobProgress, JobStatus, JobStep, Parameters, StepAction,
    StepOutcome, StepRecord, StepRecordOutcome,
};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

type CompleteFn = Box<dyn FnOnce(bool) + Send>;
type ProgressFn = Arc<dyn Fn(&JobProgress) + Send + Sync>;

/// Mutable job state. Only touched under [`JobInner::state`].
pub(crate) struct JobState {
    pub(crate) name: String,
    pub(crate) steps: Vec<JobStep>,
    pub(crate) status: JobStatus,
    pub(crate) active_step: Option<usize>,
    pub(crate) parameters: Parameters,
    pub(crate) can_resume: bool,
    pub(crate) resuming: bool,
    pub(crate) message: Option<String>,
    pub(crate) warnings: Vec<String>,
    pub(crate) step_history: Vec<StepRecord>,
    pub(crate) remote_id: Option<String>,
    pub(crate) scratch: Option<String>,
    pub(crate) scratch_allocated: bool,
    pub(crate) killer: Option<ProcessKiller>,
    /// Indexes of placeholder steps standing in for unsaved callbacks
    pub(crate) detached: Vec<usize>,
    started_at: Option<Instant>,
    on_complete: Option<CompleteFn>,
    on_progress: Option<ProgressFn>,
}

impl JobState {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            steps: Vec::new(),
            status: JobStatus::Idle,
            active_step: None,
            parameters: Parameters::new(),
            can_resume: false,
            resuming: false,
            message: None,
            warnings: Vec::new(),
            step_history: Vec::new(),
            remote_id: None,
            scratch: None,
            scratch_allocated: false,
            killer: None,
            detached: Vec::new(),
            started_at: None,
            on_complete: None,
            on_progress: None,
        }
    }
}

pub(crate) struct JobInner {
    pub(crate) id: JobId,
    pub(crate) kind: JobKind,
    executor: Arc<dyn StepExecutor>,
    pub(crate) state: Mutex<JobState>,
    pub(crate) stop_requested: AtomicBool,
    status_tx: watch::Sender<JobStatus>,
}

/// A calculation expressed as an ordered list of steps.
#[derive(Clone)]
pub struct Job {
    pub(crate) inner: Arc<JobInner>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("name", &state.name)
            .field("status", &state.status)
            .field("active_step", &state.active_step)
            .finish_non_exhaustive()
    }
}

impl Job {
    /// New idle job using the built-in back end for `kind`.
    pub fn new(name: impl Into<String>, kind: JobKind) -> Self {
        Self::with_executor(name, kind, executor::for_kind(kind, &Defaults::default()))
    }

    /// New idle job configured from `defaults`: back-end programs come from
    /// the defaults, and so do any parameters the kind accepts.
    pub fn from_defaults(name: impl Into<String>, kind: JobKind, defaults: &Defaults) -> Self {
        let job = Self::with_executor(name, kind, executor::for_kind(kind, defaults));
        job.update_parameters_from_defaults(defaults);
        job
    }

    pub fn with_executor(
        name: impl Into<String>,
        kind: JobKind,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        Self::restore(JobId::generate(), kind, executor, JobState::new(name.into()))
    }

    pub(crate) fn restore(
        id: JobId,
        kind: JobKind,
        executor: Arc<dyn StepExecutor>,
        state: JobState,
    ) -> Self {
        let (status_tx, _) = watch::channel(state.status);
        Self {
            inner: Arc::new(JobInner {
                id,
                kind,
                executor,
                state: Mutex::new(state),
                stop_requested: AtomicBool::new(false),
                status_tx,
            }),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn id(&self) -> &JobId {
        &self.inner.id
    }

    pub fn kind(&self) -> JobKind {
        self.inner.kind
    }

    pub fn name(&self) -> String {
        self.inner.state.lock().name.clone()
    }

    pub fn status(&self) -> JobStatus {
        self.inner.state.lock().status
    }

    pub fn active_step(&self) -> Option<usize> {
        self.inner.state.lock().active_step
    }

    pub fn message(&self) -> Option<String> {
        self.inner.state.lock().message.clone()
    }

    /// Failure messages of steps that only warned
    pub fn warnings(&self) -> Vec<String> {
        self.inner.state.lock().warnings.clone()
    }

    pub fn steps(&self) -> Vec<JobStep> {
        self.inner.state.lock().steps.clone()
    }

    pub fn step_count(&self) -> usize {
        self.inner.state.lock().steps.len()
    }

    pub fn step_history(&self) -> Vec<StepRecord> {
        self.inner.state.lock().step_history.clone()
    }

    pub fn parameters(&self) -> Parameters {
        self.inner.state.lock().parameters.clone()
    }

    pub fn parameter(&self, key: &str) -> Option<String> {
        self.inner.state.lock().parameters.get(key).map(str::to_string)
    }

    pub fn remote_id(&self) -> Option<String> {
        self.inner.state.lock().remote_id.clone()
    }

    pub fn can_resume(&self) -> bool {
        self.inner.state.lock().can_resume
    }

    pub fn is_resuming(&self) -> bool {
        self.inner.state.lock().resuming
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::SeqCst)
    }

    /// Interval between status polls; stop waits for twice this long.
    pub fn poll_interval(&self) -> Duration {
        self.inner
            .state
            .lock()
            .parameters
            .get_duration_ms(qj_core::params::POLL_INTERVAL_MS)
            .unwrap_or_else(|| self.inner.kind.default_poll_interval())
    }

    /// Watch channel carrying every status change.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn progress(&self) -> JobProgress {
        let state = self.inner.state.lock();
        JobProgress {
            id: self.inner.id.clone(),
            name: state.name.clone(),
            kind: self.inner.kind,
            status: state.status,
            active_step: state.active_step,
            active_step_name: state
                .active_step
                .and_then(|i| state.steps.get(i))
                .map(|s| s.name().to_string()),
            step_count: state.steps.len(),
            message: state.message.clone(),
            elapsed: state.started_at.map(|t| t.elapsed()).unwrap_or_default(),
        }
    }

    // ── Setup ───────────────────────────────────────────────────────────

    /// Append a step. Steps run in insertion order.
    pub fn add_step(&self, step: JobStep) -> Result<(), ProtocolError> {
        let mut state = self.inner.state.lock();
        if state.status.is_active() {
            return Err(ProtocolError::InvalidState { op: "add a step to", status: state.status });
        }
        state.steps.push(step);
        Ok(())
    }

    /// Set a parameter, rejecting keys the job kind does not use.
    pub fn set_parameter(
        &self,
        key: &str,
        value: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        if !self.inner.kind.accepts(key) {
            return Err(ProtocolError::InvalidParameter {
                key: key.to_string(),
                kind: self.inner.kind,
            });
        }
        let mut state = self.inner.state.lock();
        if state.status.is_active() {
            return Err(ProtocolError::InvalidState { op: "reconfigure", status: state.status });
        }
        state.parameters.insert(key, value);
        Ok(())
    }

    /// Fill in every parameter the job does not set explicitly from `defaults`.
    pub fn update_parameters_from_defaults(&self, defaults: &Defaults) {
        let mut state = self.inner.state.lock();
        let program = state.parameters.get(qj_core::params::PROGRAM).map(str::to_string);
        let supplied = defaults.parameters_for(self.inner.kind, program.as_deref());
        for (key, value) in supplied.iter() {
            state.parameters.insert_missing(key, value);
        }
    }

    /// Value of a parameter that must be set.
    pub fn require(&self, key: &str) -> Result<String, ProtocolError> {
        self.parameter(key).ok_or_else(|| ProtocolError::MissingParameter(key.to_string()))
    }

    /// Called once, from the monitor, when the job ends Done, Failed or Killed.
    pub fn set_on_complete(&self, f: impl FnOnce(bool) + Send + 'static) {
        self.inner.state.lock().on_complete = Some(Box::new(f));
    }

    pub fn set_on_progress(&self, f: impl Fn(&JobProgress) + Send + Sync + 'static) {
        self.inner.state.lock().on_progress = Some(Arc::new(f));
    }

    pub(crate) fn take_on_complete(&self) -> Option<CompleteFn> {
        self.inner.state.lock().on_complete.take()
    }

    pub(crate) fn report_progress(&self) {
        let callback = self.inner.state.lock().on_progress.clone();
        if let Some(callback) = callback {
            callback(&self.progress());
        }
    }

    pub(crate) fn set_status(&self, state: &mut JobState, status: JobStatus) {
        if state.status != status {
            tracing::debug!(job_id = %self.inner.id, from = %state.status, to = %status, "status");
        }
        state.status = status;
        self.inner.status_tx.send_replace(status);
    }

    // ── Run loop ────────────────────────────────────────────────────────

    /// Execute the steps in order on the calling task.
    ///
    /// A Stopped job that can resume continues from its first unexecuted
    /// step. Returns the final status; handler failures are reported
    /// through the status and message, never as an `Err`.
    pub async fn run(&self) -> Result<JobStatus, ProtocolError> {
        self.begin()?;
        tracing::info!(
            job_id = %self.inner.id,
            kind = %self.inner.kind,
            resuming = self.is_resuming(),
            steps = self.step_count(),
            "job started"
        );

        let mut index = 0;
        loop {
            let step = match self.next_step(index) {
                Ok(step) => step,
                Err(status) => return Ok(status),
            };

            let ctx = StepContext::new(self.clone());
            let started = Instant::now();
            let result = AssertUnwindSafe(self.dispatch(&ctx, &step)).catch_unwind().await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let result = match result {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(payload) => Err(format!("step '{}' panicked: {}", step.name(), panic_message(payload))),
            };

            match self.finish_step(index, &step, result, elapsed_ms) {
                Some(status) => return Ok(status),
                None => index += 1,
            }
        }
    }

    fn begin(&self) -> Result<(), ProtocolError> {
        let mut state = self.inner.state.lock();
        if state.status.is_active() || state.status == JobStatus::Saved {
            return Err(ProtocolError::InvalidState { op: "run", status: state.status });
        }
        for key in self.inner.kind.required_parameters() {
            if !state.parameters.contains(key) {
                return Err(ProtocolError::MissingParameter(key.to_string()));
            }
        }

        state.resuming = state.status == JobStatus::Stopped && state.can_resume;
        state.can_resume = false;
        state.active_step = None;
        state.message = None;
        state.detached.clear();
        if !state.resuming {
            state.warnings.clear();
            state.step_history.clear();
            state.remote_id = None;
        }
        if !state.resuming || state.started_at.is_none() {
            state.started_at = Some(Instant::now());
        }
        self.inner.stop_requested.store(false, Ordering::SeqCst);
        self.set_status(&mut state, JobStatus::Running);
        Ok(())
    }

    /// Claim step `index`, or end the run (stop request, kill, or no steps left).
    fn next_step(&self, index: usize) -> Result<JobStep, JobStatus> {
        let mut state = self.inner.state.lock();
        if state.status == JobStatus::KillPending {
            self.set_status(&mut state, JobStatus::Killed);
            tracing::info!(job_id = %self.inner.id, "job killed");
            return Err(JobStatus::Killed);
        }
        // Running out of steps wins over a late stop request
        let Some(step) = state.steps.get(index).cloned() else {
            state.active_step = None;
            state.resuming = false;
            self.set_status(&mut state, JobStatus::Done);
            tracing::info!(job_id = %self.inner.id, warnings = state.warnings.len(), "job done");
            return Err(JobStatus::Done);
        };
        if self.inner.stop_requested.load(Ordering::SeqCst) {
            self.stop_at(&mut state, index);
            return Err(JobStatus::Stopped);
        }

        state.active_step = Some(index);
        if state.status == JobStatus::Warning {
            self.set_status(&mut state, JobStatus::Running);
        }
        state.step_history.push(StepRecord::started(step.name(), step.kind(), epoch_ms()));
        tracing::info!(job_id = %self.inner.id, step = step.name(), index, "step started");
        Ok(step)
    }

    /// Drop the steps before `index` and park the job as Stopped.
    fn stop_at(&self, state: &mut JobState, index: usize) {
        state.steps.drain(..index.min(state.steps.len()));
        state.active_step = None;
        state.can_resume = true;
        self.set_status(state, JobStatus::Stopped);
        tracing::info!(job_id = %self.inner.id, remaining = state.steps.len(), "job stopped");
    }

    /// Apply a step's result. Returns the final status when the run ends here.
    fn finish_step(
        &self,
        index: usize,
        step: &JobStep,
        result: Result<StepOutcome, String>,
        elapsed_ms: u64,
    ) -> Option<JobStatus> {
        let mut state = self.inner.state.lock();
        state.killer = None;
        let now = epoch_ms();

        if state.status == JobStatus::KillPending {
            if let Some(record) = state.step_history.last_mut() {
                record.finish(StepRecordOutcome::Failed("killed".to_string()), now);
            }
            self.set_status(&mut state, JobStatus::Killed);
            tracing::info!(job_id = %self.inner.id, step = step.name(), "job killed");
            return Some(JobStatus::Killed);
        }

        match result {
            Err(message) => {
                tracing::error!(job_id = %self.inner.id, step = step.name(), elapsed_ms, error = %message, "step error");
                if let Some(record) = state.step_history.last_mut() {
                    record.finish(StepRecordOutcome::Failed(message.clone()), now);
                }
                state.message = Some(message);
                self.set_status(&mut state, JobStatus::Failed);
                Some(JobStatus::Failed)
            }
            Ok(StepOutcome::Completed(output)) => {
                tracing::info!(job_id = %self.inner.id, step = step.name(), elapsed_ms, "step completed");
                if let Some(record) = state.step_history.last_mut() {
                    record.stdout = output.stdout;
                    record.stderr = output.stderr;
                    record.finish(StepRecordOutcome::Completed, now);
                }
                None
            }
            Ok(StepOutcome::Failed(message)) => {
                if let Some(record) = state.step_history.last_mut() {
                    record.finish(StepRecordOutcome::Failed(message.clone()), now);
                }
                if step.is_kill_on_error() {
                    tracing::error!(job_id = %self.inner.id, step = step.name(), elapsed_ms, error = %message, "step failed");
                    state.message = Some(message);
                    self.set_status(&mut state, JobStatus::Failed);
                    return Some(JobStatus::Failed);
                }
                tracing::warn!(job_id = %self.inner.id, step = step.name(), elapsed_ms, error = %message, "step failed, continuing");
                if step.is_warn_on_error() {
                    state.warnings.push(message.clone());
                    state.message = Some(message);
                    self.set_status(&mut state, JobStatus::Warning);
                }
                None
            }
            Ok(StepOutcome::Stopped) => {
                if let Some(record) = state.step_history.last_mut() {
                    record.finish(StepRecordOutcome::Stopped, now);
                }
                self.stop_at(&mut state, index);
                Some(JobStatus::Stopped)
            }
        }
    }

    async fn dispatch(&self, ctx: &StepContext, step: &JobStep) -> Result<StepOutcome, StepError> {
        let executor = &self.inner.executor;
        match step.action() {
            StepAction::AllocateScratch { path } => {
                executor.allocate_scratch(ctx, path.as_deref()).await
            }
            StepAction::DeleteFile { path } => executor.delete_file(ctx, path).await,
            StepAction::CopyOutFile { local, remote } => executor.copy_out(ctx, local, remote).await,
            StepAction::RunApp(app) => executor.run_app(ctx, app, false).await,
            StepAction::RunAppViaShell(app) => executor.run_app(ctx, app, true).await,
            StepAction::CopyBackFile { remote, local } => {
                executor.copy_back(ctx, remote, local).await
            }
            StepAction::CleanScratch => executor.clean_scratch(ctx).await,
            StepAction::Callback(callback) => {
                let callback = callback.clone();
                match tokio::task::spawn_blocking(move || callback.call()).await {
                    Ok((code, message)) => Ok(StepOutcome::from_code(code, message)),
                    Err(e) => Err(StepError::CallbackPanicked {
                        name: step.name().to_string(),
                        message: if e.is_panic() {
                            panic_message(e.into_panic())
                        } else {
                            e.to_string()
                        },
                    }),
                }
            }
        }
    }

    // ── Control ─────────────────────────────────────────────────────────

    /// Ask the worker to stop and wait for it to acknowledge.
    ///
    /// Waits up to twice the poll interval. Stopping a Stopped job is a
    /// no-op; a job that is not running cannot be stopped.
    pub async fn stop(&self) -> Result<(), ProtocolError> {
        let status = self.status();
        if status == JobStatus::Stopped {
            return Ok(());
        }
        if !status.is_active() {
            return Err(ProtocolError::InvalidState { op: "stop", status });
        }

        let mut rx = self.subscribe();
        self.inner.stop_requested.store(true, Ordering::SeqCst);
        tracing::info!(job_id = %self.inner.id, "stop requested");

        let limit = self.poll_interval() * 2;
        // The watch guard must be released before the state lock is taken again
        let settled = tokio::time::timeout(limit, rx.wait_for(|s| !s.is_active()))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        if !settled {
            tracing::warn!(job_id = %self.inner.id, timeout_ms = limit.as_millis() as u64, "stop timed out");
            return Err(ProtocolError::StopTimeout);
        }
        match self.status() {
            JobStatus::Stopped => Ok(()),
            other => Err(ProtocolError::Finished(other)),
        }
    }

    /// Abort the active step. Does nothing when no step is running.
    pub async fn kill(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.active_step.is_none()
                || !state.status.is_active()
                || state.status == JobStatus::KillPending
            {
                return;
            }
            self.set_status(&mut state, JobStatus::KillPending);
        }
        tracing::info!(job_id = %self.inner.id, "kill requested");

        let ctx = StepContext::new(self.clone());
        let cancelled = match self.inner.executor.cancel(&ctx).await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                tracing::warn!(job_id = %self.inner.id, error = %e, "cancel failed");
                false
            }
        };
        if !cancelled {
            // The step may have finished while cancel ran; its pid could be reused by now
            let killer = self.inner.state.lock().killer;
            if let Some(killer) = killer {
                if let Err(e) = killer.kill() {
                    tracing::warn!(job_id = %self.inner.id, error = %e, "failed to kill process");
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
