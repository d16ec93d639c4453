// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qj-engine: job run loop, step executors, monitoring and persistence

mod context;
mod error;
pub mod executor;
mod job;
mod monitor;
mod registry;
mod runner;
mod snapshot;

pub use context::StepContext;
pub use error::{ProtocolError, SnapshotError, StepError};
pub use executor::{BatchExecutor, LocalExecutor, RemoteExecutor, StepExecutor};
pub use job::Job;
pub use monitor::{Monitor, MonitorHandle, DEFAULT_MONITOR_INTERVAL};
pub use registry::JobRegistry;
pub use runner::JobRunner;
pub use snapshot::{DetachedCallback, JobSnapshot, CURRENT_SNAPSHOT_VERSION};
