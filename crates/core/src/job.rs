// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job status, kinds, parameters and step history records.

use crate::id::JobId;
use crate::step::StepKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// Lifecycle status of a job.
///
/// `Idle → Running → {Done | Failed | Stopped | Killed}`. `Warning` is a
/// sub-state of `Running` (the loop keeps going); `KillPending` is the
/// window between a kill request and the active step returning. `Saved` is
/// reached only from `Stopped` by persisting the job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    KillPending,
    Killed,
    Failed,
    Warning,
    Stopped,
    Done,
    Saved,
}

impl JobStatus {
    /// The run loop is executing (possibly with a warning or a pending kill).
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::Warning | JobStatus::KillPending)
    }

    /// No further execution will happen without a new job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Killed | JobStatus::Saved)
    }

    /// Terminal states that count as a failure for `on_complete`.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Killed)
    }
}

crate::simple_display! {
    JobStatus {
        Idle => "idle",
        Running => "running",
        KillPending => "kill pending",
        Killed => "killed",
        Failed => "failed",
        Warning => "warning",
        Stopped => "stopped",
        Done => "done",
        Saved => "saved",
    }
}

/// Execution environment a job targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    #[default]
    Local,
    /// Steps run over an SSH-like transport
    Remote,
    /// Run step submits to a queuing system on a remote host and polls
    RemoteBatch,
    /// Run step submits to a grid submission service and polls
    Grid,
}

crate::simple_display! {
    JobKind {
        Local => "local",
        Remote => "remote",
        RemoteBatch => "remote_batch",
        Grid => "grid",
    }
}

/// Well-known parameter keys.
pub mod params {
    pub const LOCAL_DIR: &str = "local_dir";
    pub const SCRATCH_DIR: &str = "scratch_dir";
    pub const PROGRAM: &str = "program";
    pub const EXECUTABLE: &str = "executable";
    pub const PROCESSORS: &str = "processors";
    pub const MEMORY: &str = "memory";
    pub const POLL_INTERVAL_MS: &str = "poll_interval_ms";

    pub const HOST: &str = "host";
    pub const USER: &str = "user";
    pub const PORT: &str = "port";
    pub const REMOTE_DIR: &str = "remote_dir";
    pub const KILL_COMMAND: &str = "kill_command";

    pub const QUEUE: &str = "queue";
    pub const WALL_TIME: &str = "wall_time";
    pub const ACCOUNT: &str = "account";
    pub const CONTACT: &str = "contact";

    pub(crate) const COMMON: &[&str] =
        &[LOCAL_DIR, SCRATCH_DIR, PROGRAM, EXECUTABLE, PROCESSORS, MEMORY, POLL_INTERVAL_MS];
    pub(crate) const REMOTE: &[&str] = &[HOST, USER, PORT, REMOTE_DIR, KILL_COMMAND];
    pub(crate) const BATCH: &[&str] = &[HOST, USER, PORT, REMOTE_DIR, QUEUE, WALL_TIME, ACCOUNT];
    pub(crate) const GRID: &[&str] = &[CONTACT, REMOTE_DIR, QUEUE, WALL_TIME, ACCOUNT];
}

impl JobKind {
    /// Whether `key` is a meaningful parameter for this kind of job.
    pub fn accepts(&self, key: &str) -> bool {
        if params::COMMON.contains(&key) {
            return true;
        }
        match self {
            JobKind::Local => false,
            JobKind::Remote => params::REMOTE.contains(&key),
            JobKind::RemoteBatch => params::BATCH.contains(&key),
            JobKind::Grid => params::GRID.contains(&key),
        }
    }

    /// Parameters that must be present before the job may run.
    pub fn required_parameters(&self) -> &'static [&'static str] {
        match self {
            JobKind::Local => &[],
            JobKind::Remote | JobKind::RemoteBatch => &[params::HOST],
            JobKind::Grid => &[params::CONTACT],
        }
    }

    /// Interval between cancellation checks and status polls.
    pub fn default_poll_interval(&self) -> Duration {
        match self {
            JobKind::Local | JobKind::Remote => Duration::from_secs(5),
            JobKind::RemoteBatch | JobKind::Grid => Duration::from_secs(30),
        }
    }

    /// Whether the run step is handed to an external queue and polled.
    pub fn is_batch(&self) -> bool {
        matches!(self, JobKind::RemoteBatch | JobKind::Grid)
    }
}

/// Execution-environment configuration: string key to string value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, String>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parse a value, treating unparsable values as absent.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn get_duration_ms(&self, key: &str) -> Option<Duration> {
        self.get_parsed::<u64>(key).map(Duration::from_millis)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Insert only when `key` is not already set. Returns whether it was inserted.
    pub fn insert_missing(&mut self, key: &str, value: impl Into<String>) -> bool {
        if self.0.contains_key(key) {
            return false;
        }
        self.0.insert(key.to_string(), value.into());
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Outcome recorded in a step's history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRecordOutcome {
    Running,
    Completed,
    Failed(String),
    Stopped,
}

crate::simple_display! {
    StepRecordOutcome {
        Running => "running",
        Completed => "completed",
        Failed(..) => "failed",
        Stopped => "stopped",
    }
}

/// Record of one step execution (for step history)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub kind: StepKind,
    pub started_at_ms: u64,
    pub finished_at_ms: Option<u64>,
    pub outcome: StepRecordOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl StepRecord {
    pub fn started(name: impl Into<String>, kind: StepKind, epoch_ms: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            started_at_ms: epoch_ms,
            finished_at_ms: None,
            outcome: StepRecordOutcome::Running,
            stdout: None,
            stderr: None,
        }
    }

    pub fn finish(&mut self, outcome: StepRecordOutcome, epoch_ms: u64) {
        if self.finished_at_ms.is_none() {
            self.finished_at_ms = Some(epoch_ms);
            self.outcome = outcome;
        }
    }
}

/// Point-in-time view of a job handed to progress monitors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProgress {
    pub id: JobId,
    pub name: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub active_step: Option<usize>,
    pub active_step_name: Option<String>,
    pub step_count: usize,
    pub message: Option<String>,
    pub elapsed: Duration,
}

/// Milliseconds since the Unix epoch, for step history timestamps.
pub fn epoch_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
