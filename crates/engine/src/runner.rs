// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background worker driving one job.

use crate::error::ProtocolError;
use crate::job::Job;
use qj_core::JobStatus;
use tokio::task::JoinHandle;

/// Runs a job's step loop on its own task.
///
/// The caller keeps the [`Job`] handle to watch, stop or kill it while the
/// worker runs.
#[derive(Debug)]
pub struct JobRunner {
    job: Job,
    handle: JoinHandle<Result<JobStatus, ProtocolError>>,
}

impl JobRunner {
    /// Spawn a worker executing `job`.
    pub fn start(job: Job) -> Self {
        let worker = job.clone();
        let handle = tokio::spawn(async move { worker.run().await });
        tracing::debug!(job_id = %job.id(), "worker spawned");
        Self { job, handle }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// The worker has not returned yet
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Wait for the worker and return the job's final status.
    pub async fn join(self) -> Result<JobStatus, ProtocolError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(job_id = %self.job.id(), error = %e, "worker task failed");
                Ok(self.job.status())
            }
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
