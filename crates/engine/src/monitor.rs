// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic progress reporting and completion callbacks.
//!
//! The monitor runs on its own task so that progress and completion
//! callbacks never execute on a job's worker.

use crate::registry::JobRegistry;
use qj_core::JobStatus;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_millis(200);

pub struct Monitor {
    registry: JobRegistry,
    interval: Duration,
}

impl Monitor {
    pub fn new(registry: JobRegistry) -> Self {
        Self { registry, interval: DEFAULT_MONITOR_INTERVAL }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One pass over the registry.
    ///
    /// Active jobs get a progress report. Jobs that ended Done, Failed or
    /// Killed get a final report and their completion callback, which
    /// fires at most once per job.
    pub fn tick(&self) {
        for job in self.registry.list() {
            let status = job.status();
            if status.is_active() {
                job.report_progress();
                continue;
            }
            if matches!(status, JobStatus::Done | JobStatus::Failed | JobStatus::Killed) {
                let Some(on_complete) = job.take_on_complete() else {
                    continue;
                };
                job.report_progress();
                tracing::info!(job_id = %job.id(), %status, "job complete");
                on_complete(status.is_failure());
            }
        }
    }

    /// Run [`Monitor::tick`] every interval on a background task.
    pub fn spawn(self) -> MonitorHandle {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.tick(),
                    _ = cancel.cancelled() => break,
                }
            }
            // Deliver completions that landed after the last tick
            self.tick();
            tracing::debug!("monitor stopped");
        });
        MonitorHandle { token, handle }
    }
}

/// Handle to a spawned monitor task.
pub struct MonitorHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "monitor task failed");
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
