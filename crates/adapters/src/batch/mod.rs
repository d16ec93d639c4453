// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Submission services for queued and grid execution.
//!
//! A [`SubmissionService`] stages files to a remote working directory,
//! submits a command for deferred execution and reports its state by id.

mod grid;
mod queue;

pub use grid::GridService;
pub use queue::QueueService;

use crate::subprocess::ProcessError;
use crate::transport::TransportError;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from submission services
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("submission rejected: {0}")]
    Rejected(String),
    #[error("unexpected reply from {program}: {reply}")]
    BadReply { program: String, reply: String },
    #[error("{program} failed: {message}")]
    Command { program: String, message: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// State of a submitted job as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Pending,
    Running,
    Done,
    Failed(String),
}

impl RemoteStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, RemoteStatus::Done | RemoteStatus::Failed(_))
    }
}

qj_core::simple_display! {
    RemoteStatus {
        Pending => "pending",
        Running => "running",
        Done => "done",
        Failed(..) => "failed",
    }
}

/// What to run and with which resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobDescription {
    pub name: String,
    /// Remote working directory
    pub directory: String,
    pub command: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub processors: Option<u32>,
    pub memory: Option<String>,
    pub queue: Option<String>,
    pub wall_time: Option<String>,
    pub account: Option<String>,
}

/// Adapter for a deferred-execution service
#[async_trait]
pub trait SubmissionService: Send + Sync + 'static {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Create the remote working directory.
    async fn prepare(&self, directory: &str) -> Result<(), BatchError>;

    async fn stage_in(&self, local: &Path, remote: &str) -> Result<(), BatchError>;

    async fn stage_out(&self, remote: &str, local: &Path) -> Result<(), BatchError>;

    async fn remove(&self, remote: &str, recursive: bool) -> Result<(), BatchError>;

    /// Submit and return the service's id for the job.
    async fn submit(&self, job: &JobDescription) -> Result<String, BatchError>;

    async fn poll(&self, remote_id: &str) -> Result<RemoteStatus, BatchError>;

    async fn cancel(&self, remote_id: &str) -> Result<(), BatchError>;
}

/// Last whitespace-separated token of `reply`.
pub(crate) fn last_token(reply: &str) -> Option<&str> {
    reply.split_whitespace().last()
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{BatchError, JobDescription, RemoteStatus, SubmissionService};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    /// Recorded submission service operation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum BatchCall {
        Prepare(String),
        StageIn { local: String, remote: String },
        StageOut { remote: String, local: String },
        Remove { remote: String, recursive: bool },
        Submit(JobDescription),
        Poll(String),
        Cancel(String),
    }

    struct FakeBatchState {
        calls: Vec<BatchCall>,
        statuses: VecDeque<Result<RemoteStatus, String>>,
        submitted: u32,
        reject_submit: Option<String>,
        submit_delay: Duration,
        cancelled: bool,
    }

    /// Scripted submission service backed by the local filesystem.
    ///
    /// Each `poll` consumes the next scripted status; once the script runs
    /// out the job reports `Running` until cancelled, then `Done`.
    #[derive(Clone)]
    pub struct FakeSubmissionService {
        inner: Arc<Mutex<FakeBatchState>>,
    }

    impl Default for FakeSubmissionService {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeBatchState {
                    calls: Vec::new(),
                    statuses: VecDeque::new(),
                    submitted: 0,
                    reject_submit: None,
                    submit_delay: Duration::ZERO,
                    cancelled: false,
                })),
            }
        }
    }

    impl FakeSubmissionService {
        pub fn new() -> Self {
            Self::default()
        }

        /// Service whose polls return `statuses` in order
        pub fn with_statuses(statuses: impl IntoIterator<Item = RemoteStatus>) -> Self {
            let fake = Self::default();
            fake.inner.lock().statuses.extend(statuses.into_iter().map(Ok));
            fake
        }

        /// Queue a poll failure
        pub fn push_poll_error(&self, message: &str) {
            self.inner.lock().statuses.push_back(Err(message.to_string()));
        }

        pub fn push_status(&self, status: RemoteStatus) {
            self.inner.lock().statuses.push_back(Ok(status));
        }

        pub fn reject_submissions(&self, reason: &str) {
            self.inner.lock().reject_submit = Some(reason.to_string());
        }

        /// Make every `submit` take `delay` before it answers
        pub fn delay_submissions(&self, delay: Duration) {
            self.inner.lock().submit_delay = delay;
        }

        pub fn calls(&self) -> Vec<BatchCall> {
            self.inner.lock().calls.clone()
        }

        pub fn submit_count(&self) -> usize {
            self.calls().iter().filter(|c| matches!(c, BatchCall::Submit(_))).count()
        }

        pub fn was_cancelled(&self) -> bool {
            self.inner.lock().cancelled
        }

        fn record(&self, call: BatchCall) {
            self.inner.lock().calls.push(call);
        }

        fn copy(from: &Path, to: &Path) -> Result<(), BatchError> {
            std::fs::copy(from, to).map(|_| ()).map_err(|e| BatchError::Command {
                program: "fake-copy".to_string(),
                message: format!("{}: {}", from.display(), e),
            })
        }
    }

    #[async_trait]
    impl SubmissionService for FakeSubmissionService {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn prepare(&self, directory: &str) -> Result<(), BatchError> {
            self.record(BatchCall::Prepare(directory.to_string()));
            std::fs::create_dir_all(directory).map_err(|e| BatchError::Command {
                program: "fake-mkdir".to_string(),
                message: e.to_string(),
            })
        }

        async fn stage_in(&self, local: &Path, remote: &str) -> Result<(), BatchError> {
            self.record(BatchCall::StageIn {
                local: local.display().to_string(),
                remote: remote.to_string(),
            });
            Self::copy(local, Path::new(remote))
        }

        async fn stage_out(&self, remote: &str, local: &Path) -> Result<(), BatchError> {
            self.record(BatchCall::StageOut {
                remote: remote.to_string(),
                local: local.display().to_string(),
            });
            Self::copy(Path::new(remote), local)
        }

        async fn remove(&self, remote: &str, recursive: bool) -> Result<(), BatchError> {
            self.record(BatchCall::Remove { remote: remote.to_string(), recursive });
            let path = Path::new(remote);
            let result = if recursive {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            result.map_err(|e| BatchError::Command {
                program: "fake-rm".to_string(),
                message: e.to_string(),
            })
        }

        async fn submit(&self, job: &JobDescription) -> Result<String, BatchError> {
            self.record(BatchCall::Submit(job.clone()));
            let delay = self.inner.lock().submit_delay;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut inner = self.inner.lock();
            if let Some(reason) = &inner.reject_submit {
                return Err(BatchError::Rejected(reason.clone()));
            }
            inner.submitted += 1;
            Ok(format!("fake-{}", inner.submitted))
        }

        async fn poll(&self, remote_id: &str) -> Result<RemoteStatus, BatchError> {
            self.record(BatchCall::Poll(remote_id.to_string()));
            let mut inner = self.inner.lock();
            match inner.statuses.pop_front() {
                Some(Ok(status)) => Ok(status),
                Some(Err(message)) => {
                    Err(BatchError::Command { program: "fake-poll".to_string(), message })
                }
                None if inner.cancelled => Ok(RemoteStatus::Done),
                None => Ok(RemoteStatus::Running),
            }
        }

        async fn cancel(&self, remote_id: &str) -> Result<(), BatchError> {
            self.record(BatchCall::Cancel(remote_id.to_string()));
            self.inner.lock().cancelled = true;
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{BatchCall, FakeSubmissionService};

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
