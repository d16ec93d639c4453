// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Saving a stopped job and loading it back to resume.
//!
//! A snapshot holds the unexecuted steps plus whatever the executors need
//! to pick up where they left off (scratch directory, submitted job id).
//! Callback steps are recorded by name and position only; a loaded job
//! runs a failing placeholder in their place until the collaborator hands
//! the function back with [`Job::reattach_callback`].

use crate::error::{ProtocolError, SnapshotError};
use crate::executor::{self, StepExecutor};
use crate::job::{Job, JobState};
use chrono::{DateTime, Utc};
use qj_core::{Defaults, JobId, JobKind, JobStatus, JobStep, Parameters, StepRecord, StepSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Current snapshot schema version
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of a stopped job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Schema version
    #[serde(rename = "v")]
    pub version: u32,
    pub id: JobId,
    pub name: String,
    pub kind: JobKind,
    pub parameters: Parameters,
    /// Steps not yet executed, first one next, callbacks left out
    pub steps: Vec<StepSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub callbacks: Vec<DetachedCallback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch: Option<String>,
    #[serde(default)]
    pub scratch_allocated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub step_history: Vec<StepRecord>,
    pub created_at: DateTime<Utc>,
}

/// A callback step left out of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedCallback {
    /// Position among the unexecuted steps, callbacks included
    pub index: usize,
    pub name: String,
    pub kill_on_error: bool,
    pub warn_on_error: bool,
}

impl DetachedCallback {
    /// Stand-in step that fails until the real callback is reattached.
    fn placeholder(&self) -> JobStep {
        let message = format!("callback '{}' was not reattached after loading", self.name);
        JobStep::callback(self.name.clone(), move || (1, message.clone()))
            .kill_on_error(self.kill_on_error)
            .warn_on_error(self.warn_on_error)
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }
    bak(1)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SnapshotError + '_ {
    move |source| SnapshotError::Io { path: path.to_path_buf(), source }
}

impl JobSnapshot {
    /// Capture a Stopped job.
    pub fn capture(job: &Job) -> Result<Self, SnapshotError> {
        let state = job.inner.state.lock();
        if state.status != JobStatus::Stopped {
            return Err(ProtocolError::InvalidState { op: "save", status: state.status }.into());
        }
        let mut steps = Vec::with_capacity(state.steps.len());
        let mut callbacks = Vec::new();
        for (index, step) in state.steps.iter().enumerate() {
            if step.is_persistable() {
                steps.push(StepSpec::try_from(step)?);
            } else {
                callbacks.push(DetachedCallback {
                    index,
                    name: step.name().to_string(),
                    kill_on_error: step.is_kill_on_error(),
                    warn_on_error: step.is_warn_on_error(),
                });
            }
        }
        Ok(Self {
            version: CURRENT_SNAPSHOT_VERSION,
            id: job.id().clone(),
            name: state.name.clone(),
            kind: job.kind(),
            parameters: state.parameters.clone(),
            steps,
            callbacks,
            remote_id: state.remote_id.clone(),
            scratch: state.scratch.clone(),
            scratch_allocated: state.scratch_allocated,
            message: state.message.clone(),
            warnings: state.warnings.clone(),
            step_history: state.step_history.clone(),
            created_at: Utc::now(),
        })
    }

    /// Write to `path` atomically, keeping the previous file as a backup.
    pub fn write(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json).map_err(io_error(&tmp))?;
        if path.exists() {
            let bak = rotate_bak_path(path);
            fs::rename(path, &bak).map_err(io_error(path))?;
        }
        fs::rename(&tmp, path).map_err(io_error(path))
    }

    pub fn read(path: &Path) -> Result<Self, SnapshotError> {
        let bytes = fs::read(path).map_err(io_error(path))?;
        let snapshot: Self = serde_json::from_slice(&bytes)?;
        if snapshot.version != CURRENT_SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        Ok(snapshot)
    }

    /// Rebuild a Stopped job ready to resume.
    pub fn into_job(self, executor: Arc<dyn StepExecutor>) -> Job {
        let mut state = JobState::new(self.name);
        state.steps = self.steps.into_iter().map(JobStep::from).collect();
        for callback in &self.callbacks {
            let index = callback.index.min(state.steps.len());
            state.steps.insert(index, callback.placeholder());
            state.detached.push(index);
        }
        state.status = JobStatus::Stopped;
        state.can_resume = true;
        state.parameters = self.parameters;
        state.remote_id = self.remote_id;
        state.scratch = self.scratch;
        state.scratch_allocated = self.scratch_allocated;
        state.message = self.message;
        state.warnings = self.warnings;
        state.step_history = self.step_history;
        Job::restore(self.id, self.kind, executor, state)
    }
}

impl Job {
    /// Persist a Stopped job to `path`. The job becomes Saved.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let snapshot = JobSnapshot::capture(self)?;
        snapshot.write(path)?;
        let mut state = self.inner.state.lock();
        state.can_resume = false;
        self.set_status(&mut state, JobStatus::Saved);
        tracing::info!(
            job_id = %self.id(),
            path = %path.display(),
            steps = snapshot.steps.len(),
            callbacks = snapshot.callbacks.len(),
            "job saved"
        );
        Ok(())
    }

    /// Load a saved job with the built-in back end for its kind.
    pub fn load(path: &Path, defaults: &Defaults) -> Result<Self, SnapshotError> {
        let snapshot = JobSnapshot::read(path)?;
        let executor = executor::for_kind(snapshot.kind, defaults);
        Ok(snapshot.into_job(executor))
    }

    /// Load a saved job onto a specific back end.
    pub fn load_with(path: &Path, executor: Arc<dyn StepExecutor>) -> Result<Self, SnapshotError> {
        Ok(JobSnapshot::read(path)?.into_job(executor))
    }

    /// Names of callback steps still waiting for [`Job::reattach_callback`].
    pub fn detached_callbacks(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        state.detached.iter().filter_map(|&i| state.steps.get(i)).map(|s| s.name().to_string()).collect()
    }

    /// Put a callback back in place of the first detached step named `name`.
    ///
    /// The step keeps the error flags it was saved with.
    pub fn reattach_callback(
        &self,
        name: &str,
        f: impl Fn() -> (i32, String) + Send + Sync + 'static,
    ) -> Result<(), ProtocolError> {
        let mut state = self.inner.state.lock();
        if state.status.is_active() {
            return Err(ProtocolError::InvalidState { op: "reattach a callback to", status: state.status });
        }
        let slot = state
            .detached
            .iter()
            .position(|&i| state.steps.get(i).is_some_and(|s| s.name() == name))
            .ok_or_else(|| ProtocolError::UnknownCallback(name.to_string()))?;
        let index = state.detached.remove(slot);
        let saved = &state.steps[index];
        let step = JobStep::callback(name, f)
            .kill_on_error(saved.is_kill_on_error())
            .warn_on_error(saved.is_warn_on_error());
        state.steps[index] = step;
        Ok(())
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
