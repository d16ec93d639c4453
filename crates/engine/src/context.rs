// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! What a step handler may see and change of the job running it.

use crate::error::StepError;
use crate::job::Job;
use qj_adapters::ProcessKiller;
use qj_core::{params, JobId, JobKind, JobStatus, Parameters};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Upper bound between stop/kill checks while a handler waits.
const CHECK_INTERVAL: Duration = Duration::from_millis(100);

pub struct StepContext {
    job: Job,
}

impl StepContext {
    pub(crate) fn new(job: Job) -> Self {
        Self { job }
    }

    pub fn job_id(&self) -> &JobId {
        self.job.id()
    }

    pub fn job_name(&self) -> String {
        self.job.name()
    }

    pub fn kind(&self) -> JobKind {
        self.job.kind()
    }

    pub fn parameters(&self) -> Parameters {
        self.job.parameters()
    }

    pub fn parameter(&self, key: &str) -> Option<String> {
        self.job.parameter(key)
    }

    pub fn require(&self, key: &str) -> Result<String, StepError> {
        self.parameter(key).ok_or_else(|| StepError::MissingParameter(key.to_string()))
    }

    /// Parse an optional parameter; a present but malformed value is an error.
    pub fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, StepError> {
        match self.parameter(key) {
            None => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|_| StepError::InvalidParameter {
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.job.inner.stop_requested.load(Ordering::SeqCst)
    }

    pub fn kill_pending(&self) -> bool {
        self.job.status() == JobStatus::KillPending
    }

    /// True while re-running the remainder of a stopped job
    pub fn is_resuming(&self) -> bool {
        self.job.is_resuming()
    }

    pub fn poll_interval(&self) -> Duration {
        self.job.poll_interval()
    }

    /// How often to look at the stop and kill flags while waiting.
    pub fn check_interval(&self) -> Duration {
        self.poll_interval().min(CHECK_INTERVAL)
    }

    /// Sleep one poll interval, waking early on a stop or kill request.
    pub async fn pause(&self) {
        let deadline = tokio::time::Instant::now() + self.poll_interval();
        while tokio::time::Instant::now() < deadline {
            if self.stop_requested() || self.kill_pending() {
                return;
            }
            tokio::time::sleep(self.check_interval()).await;
        }
    }

    /// Register the process `Job::kill` should terminate.
    pub fn attach_killer(&self, killer: ProcessKiller) {
        self.job.inner.state.lock().killer = Some(killer);
    }

    pub fn detach_killer(&self) {
        self.job.inner.state.lock().killer = None;
    }

    /// Fire the attached killer, if any.
    pub fn fire_killer(&self) {
        let killer = self.job.inner.state.lock().killer;
        if let Some(killer) = killer {
            if let Err(e) = killer.kill() {
                tracing::warn!(job_id = %self.job.id(), error = %e, "failed to kill process");
            }
        }
    }

    pub fn remote_id(&self) -> Option<String> {
        self.job.remote_id()
    }

    pub fn set_remote_id(&self, remote_id: Option<String>) {
        self.job.inner.state.lock().remote_id = remote_id;
    }

    /// The job's local directory: `local_dir`, else the current directory.
    pub fn local_dir(&self) -> PathBuf {
        match self.parameter(params::LOCAL_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Working directory chosen by the allocate-scratch step.
    pub fn scratch(&self) -> Option<String> {
        self.job.inner.state.lock().scratch.clone()
    }

    /// Whether the scratch directory was created by this job.
    pub fn scratch_allocated(&self) -> bool {
        self.job.inner.state.lock().scratch_allocated
    }

    pub fn set_scratch(&self, dir: impl Into<String>, allocated: bool) {
        let mut state = self.job.inner.state.lock();
        state.scratch = Some(dir.into());
        state.scratch_allocated = allocated;
    }

    pub fn clear_scratch(&self) {
        let mut state = self.job.inner.state.lock();
        state.scratch = None;
        state.scratch_allocated = false;
    }
}
