// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared list of jobs the monitor watches.

use crate::job::Job;
use parking_lot::RwLock;
use qj_core::JobId;
use std::sync::Arc;

/// Cheap-clone registry of known jobs, in registration order.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<Vec<Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job. Registering the same job twice is a no-op.
    pub fn register(&self, job: Job) {
        let mut jobs = self.jobs.write();
        if jobs.iter().any(|j| j.id() == job.id()) {
            return;
        }
        tracing::debug!(job_id = %job.id(), "job registered");
        jobs.push(job);
    }

    pub fn unregister(&self, id: &JobId) -> Option<Job> {
        let mut jobs = self.jobs.write();
        let index = jobs.iter().position(|j| j.id() == id)?;
        Some(jobs.remove(index))
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().iter().find(|j| j.id() == id).cloned()
    }

    pub fn list(&self) -> Vec<Job> {
        self.jobs.read().clone()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
